//! Middleware pipeline — composable before/after request logic.
//!
//! Each middleware wraps the next layer and may inspect the request,
//! short-circuit with its own response, or decorate the downstream response.
//! The innermost layer is the endpoint dispatcher installed by
//! [`App`](crate::app::App).
//!
//! ## Core types
//!
//! - [`Middleware`] — trait implemented by all middleware.
//! - [`Next`] — cursor into the remaining chain; call [`Next::run`] to advance.
//! - [`MiddlewareHandler`] — type-erased, cheaply-cloneable middleware function.
//! - [`LoggerMiddleware`] — one structured log record per request.

use std::{future::Future, pin::Pin, sync::Arc};
use tokio::time::Instant;

use crate::{Response, StatusCode, context::Context};

/// Boxed future returned by every layer of the pipeline.
pub type BoxResponse = Pin<Box<dyn Future<Output = Response> + Send>>;

/// A type-erased, reference-counted middleware function.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use greeting_cache::{context::Context, middleware::{BoxResponse, MiddlewareHandler, Next}};
///
/// let pass_through: MiddlewareHandler = Arc::new(|ctx: Context, next: Next| {
///     Box::pin(async move { next.run(ctx).await }) as BoxResponse
/// });
/// ```
pub type MiddlewareHandler = Arc<dyn Fn(Context, Next) -> BoxResponse + Send + Sync + 'static>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is consumed by [`run`](Self::run), so a middleware can forward a
/// request at most once.
pub struct Next {
    chain: Arc<[MiddlewareHandler]>,
    index: usize,
}

impl Next {
    /// Creates a cursor positioned at the start of `chain`.
    pub fn new(chain: Arc<[MiddlewareHandler]>) -> Self {
        Self { chain, index: 0 }
    }

    /// Invokes the next layer and returns its response.
    ///
    /// An exhausted chain answers `500 Internal Server Error`: it means the
    /// pipeline was assembled without a terminal handler.
    pub async fn run(mut self, ctx: Context) -> Response {
        match self.chain.get(self.index).cloned() {
            Some(handler) => {
                self.index += 1;
                handler(ctx, self).await
            }
            None => Response::new(StatusCode::InternalServerError),
        }
    }
}

/// The core middleware trait.
///
/// Implementations are shared across Tokio tasks and must not hold `&mut`
/// references to shared state across an `.await` point.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: Context, next: Next) -> BoxResponse;
}

/// Logs method, path, status and elapsed time once the downstream layers
/// have produced a response.
///
/// Only the path is recorded; query strings carry caller-supplied names and
/// are left out.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxResponse {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().to_string();
            let path = ctx.request().path().to_owned();

            let response = next.run(ctx).await;

            tracing::info!(
                %method,
                %path,
                status = response.status().as_u16(),
                elapsed_us = start.elapsed().as_micros() as u64,
                "request served"
            );

            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Request;
    use crate::app::AppState;
    use crate::cache::InMemoryCache;

    fn context() -> Context {
        let (request, _) = Request::parse(b"GET /api/httpget HTTP/1.1\r\n\r\n").unwrap();
        let state = AppState::new(Arc::new(InMemoryCache::new()), "/api/httpget");
        Context::new(request, Arc::new(state))
    }

    fn respond_with(status: StatusCode) -> MiddlewareHandler {
        Arc::new(move |_ctx: Context, _next: Next| {
            Box::pin(async move { Response::new(status) }) as BoxResponse
        })
    }

    struct ShortCircuit;

    impl Middleware for ShortCircuit {
        fn handle(&self, _ctx: Context, _next: Next) -> BoxResponse {
            Box::pin(async { Response::new(StatusCode::NotFound) })
        }
    }

    #[tokio::test]
    async fn empty_chain_is_a_server_error() {
        let next = Next::new(Arc::from(Vec::new()));
        let response = next.run(context()).await;
        assert_eq!(response.status(), StatusCode::InternalServerError);
    }

    #[tokio::test]
    async fn logger_passes_response_through() {
        let chain: Arc<[MiddlewareHandler]> = Arc::from(vec![
            from_middleware(Arc::new(LoggerMiddleware)),
            respond_with(StatusCode::NoContent),
        ]);
        let response = Next::new(chain).run(context()).await;
        assert_eq!(response.status(), StatusCode::NoContent);
    }

    #[tokio::test]
    async fn short_circuit_skips_later_layers() {
        let chain: Arc<[MiddlewareHandler]> = Arc::from(vec![
            from_middleware(Arc::new(ShortCircuit)),
            respond_with(StatusCode::Ok),
        ]);
        let response = Next::new(chain).run(context()).await;
        assert_eq!(response.status(), StatusCode::NotFound);
    }
}
