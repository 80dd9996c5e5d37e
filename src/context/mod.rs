//! Per-request context.
//!
//! A [`Context`] pairs the parsed [`Request`] with the process-wide
//! [`AppState`] handle, so middleware and the endpoint receive shared
//! resources explicitly instead of reaching for globals.

use std::sync::Arc;

use crate::Request;
use crate::app::AppState;

pub struct Context {
    request: Request,
    state: Arc<AppState>,
}

impl Context {
    pub fn new(request: Request, state: Arc<AppState>) -> Self {
        Self { request, state }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Shared state, identical for every request served by the process.
    pub fn state(&self) -> &AppState {
        &self.state
    }
}
