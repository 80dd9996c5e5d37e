//! Application wiring: shared state and request dispatch.
//!
//! [`App`] runs every request through [`LoggerMiddleware`] and then a
//! dispatcher that serves the greeting route and nothing else:
//!
//! | Request                         | Response                    |
//! |---------------------------------|-----------------------------|
//! | `GET {route}`                   | greeting endpoint           |
//! | any other method on `{route}`   | `405`, `Allow: GET`         |
//! | any other path                  | `404`                       |
//!
//! A trailing slash on the request path is ignored.

use std::sync::Arc;

use crate::cache::DistributedCache;
use crate::context::Context;
use crate::greeting::{self, GreetingHandler};
use crate::middleware::{BoxResponse, LoggerMiddleware, MiddlewareHandler, Next, from_middleware};
use crate::{Method, Request, Response, StatusCode};

/// Process-wide state shared by every request.
///
/// Built once at startup; requests only ever see it through `&AppState`.
pub struct AppState {
    greeter: GreetingHandler,
    route: String,
}

impl AppState {
    pub fn new(cache: Arc<dyn DistributedCache>, route: impl Into<String>) -> Self {
        Self {
            greeter: GreetingHandler::new(cache),
            route: normalize(&route.into()).to_owned(),
        }
    }

    pub fn greeter(&self) -> &GreetingHandler {
        &self.greeter
    }

    pub fn route(&self) -> &str {
        &self.route
    }
}

/// The request pipeline.
pub struct App {
    state: Arc<AppState>,
    chain: Arc<[MiddlewareHandler]>,
}

impl App {
    pub fn new(state: AppState) -> Self {
        let dispatcher: MiddlewareHandler =
            Arc::new(|ctx: Context, _next: Next| -> BoxResponse { Box::pin(dispatch(ctx)) });

        Self {
            state: Arc::new(state),
            chain: Arc::from(vec![from_middleware(Arc::new(LoggerMiddleware)), dispatcher]),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Runs `request` through the pipeline.
    pub async fn handle(&self, request: Request) -> Response {
        let ctx = Context::new(request, Arc::clone(&self.state));
        Next::new(Arc::clone(&self.chain)).run(ctx).await
    }
}

async fn dispatch(ctx: Context) -> Response {
    if normalize(ctx.request().path()) != ctx.state().route() {
        return Response::new(StatusCode::NotFound);
    }
    if ctx.request().method() != &Method::Get {
        return Response::new(StatusCode::MethodNotAllowed).header("Allow", "GET");
    }
    greeting::http_get(ctx).await
}

fn normalize(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}
