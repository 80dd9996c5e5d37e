//! # greeting-cache
//!
//! A single HTTP endpoint that greets a caller by name, memoizing each
//! greeting in a distributed cache.
//!
//! ```text
//! GET /api/httpget?name=Ada  →  200 "Hello, Ada."
//! ```
//!
//! The first request for a name computes the greeting and writes it to the
//! cache; later requests for the same name are answered from the cache. See
//! [`greeting`] for the exact read-through rules.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use greeting_cache::app::{App, AppState};
//! use greeting_cache::cache::InMemoryCache;
//! use greeting_cache::server::{Server, shutdown_signal};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let app = Arc::new(App::new(AppState::new(
//!         Arc::new(InMemoryCache::new()),
//!         "/api/httpget",
//!     )));
//!     let server = Server::bind("127.0.0.1:7071").await?;
//!     server
//!         .run(
//!             move |req| {
//!                 let app = Arc::clone(&app);
//!                 async move { app.handle(req).await }
//!             },
//!             shutdown_signal(),
//!         )
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod cache;
pub mod config;
pub mod context;
pub mod greeting;
pub mod http;
pub mod middleware;
pub mod server;
pub mod telemetry;

pub use http::{Headers, Method, Request, Response, StatusCode};
pub use server::{Server, ServerError};
