//! The greeting endpoint: a read-through, write-through cache in front of a
//! pure greeting computation.
//!
//! For a request name `n` the handler reads key `n` from the distributed
//! cache and returns the stored value on a hit. On a miss it computes the
//! greeting, writes it back under the same key, and returns it.
//!
//! An absent name and an empty name are the same key, `""`. The `"World"`
//! fallback is applied when computing the greeting, never to the key.
//!
//! Concurrent misses for one key may each compute and write; the writes carry
//! identical values, so the last one winning is harmless.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info};

use crate::cache::{CacheError, DistributedCache};
use crate::context::Context;
use crate::http::{Response, StatusCode};

/// Name greeted when the request supplies none.
pub const DEFAULT_NAME: &str = "World";

const JSON: &str = "application/json";

/// The single failure kind surfaced by [`GreetingHandler::handle`].
///
/// Callers cannot tell an unreachable cache from any other fault; the cause
/// is kept only so it can be logged.
#[derive(Debug, Error)]
#[error("greeting request failed: {source}")]
pub struct HandlerError {
    #[from]
    source: CacheError,
}

/// Computes the greeting for `name`.
///
/// # Examples
///
/// ```
/// use greeting_cache::greeting::greeting_for;
///
/// assert_eq!(greeting_for("Ada"), "Hello, Ada.");
/// assert_eq!(greeting_for(""), "Hello, World.");
/// ```
pub fn greeting_for(name: &str) -> String {
    let name = if name.is_empty() { DEFAULT_NAME } else { name };
    format!("Hello, {name}.")
}

/// Serves greetings through a shared [`DistributedCache`].
///
/// Holds no per-request state; one instance serves every request.
#[derive(Clone)]
pub struct GreetingHandler {
    cache: Arc<dyn DistributedCache>,
}

impl GreetingHandler {
    pub fn new(cache: Arc<dyn DistributedCache>) -> Self {
        Self { cache }
    }

    /// Returns the greeting for `name`, from the cache when present.
    ///
    /// # Errors
    ///
    /// Any cache read or write failure becomes a [`HandlerError`]. A failed
    /// read never falls back to computing the greeting.
    pub async fn handle(&self, name: Option<&str>) -> Result<String, HandlerError> {
        let key = name.unwrap_or_default();

        if let Some(cached) = self.cache.get(key).await? {
            info!(greeting = %cached, "served greeting from cache");
            return Ok(cached);
        }

        let greeting = greeting_for(key);
        self.cache.set(key, &greeting).await?;
        info!(greeting = %greeting, "computed and cached greeting");

        Ok(greeting)
    }
}

/// HTTP adapter for `GET {route}?name=…`.
///
/// Replies `200` with the greeting as plain text, or as a JSON string when
/// the client asks for `application/json`. Every failure is logged here and
/// answered with a bodiless `500`.
pub async fn http_get(ctx: Context) -> Response {
    let request = ctx.request();
    let result = ctx
        .state()
        .greeter()
        .handle(request.query_param("name"))
        .await;

    let greeting = match result {
        Ok(greeting) => greeting,
        Err(e) => {
            error!(error = %e, "greeting endpoint failed");
            return Response::new(StatusCode::InternalServerError);
        }
    };

    if !request.accepts(JSON) {
        return Response::new(StatusCode::Ok).body(greeting);
    }
    match Response::new(StatusCode::Ok).json(&greeting) {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "failed to encode greeting as JSON");
            Response::new(StatusCode::InternalServerError)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use redis::ErrorKind;
    use tracing_subscriber::fmt::MakeWriter;

    use crate::app::AppState;
    use crate::cache::InMemoryCache;
    use crate::http::Request;

    /// Records every call before delegating to an in-memory store.
    #[derive(Default)]
    struct SpyCache {
        inner: InMemoryCache,
        gets: std::sync::Mutex<Vec<String>>,
        sets: AtomicUsize,
    }

    impl SpyCache {
        fn keys_read(&self) -> Vec<String> {
            self.gets.lock().unwrap().clone()
        }

        fn writes(&self) -> usize {
            self.sets.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DistributedCache for SpyCache {
        async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            self.gets.lock().unwrap().push(key.to_owned());
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
            self.sets.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value).await
        }
    }

    /// Fails reads, writes, or both.
    struct BrokenCache {
        fail_get: bool,
        fail_set: bool,
        sets: AtomicUsize,
    }

    impl BrokenCache {
        fn new(fail_get: bool, fail_set: bool) -> Self {
            Self {
                fail_get,
                fail_set,
                sets: AtomicUsize::new(0),
            }
        }
    }

    fn unreachable_cache() -> CacheError {
        CacheError::Redis(redis::RedisError::from((
            ErrorKind::IoError,
            "connection refused",
        )))
    }

    #[async_trait]
    impl DistributedCache for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            if self.fail_get {
                Err(unreachable_cache())
            } else {
                Ok(None)
            }
        }

        async fn set(&self, _key: &str, _value: &str) -> Result<(), CacheError> {
            self.sets.fetch_add(1, Ordering::SeqCst);
            if self.fail_set {
                Err(unreachable_cache())
            } else {
                Ok(())
            }
        }
    }

    /// Collects formatted log lines in memory.
    #[derive(Clone, Default)]
    struct LogCapture(Arc<std::sync::Mutex<Vec<u8>>>);

    impl LogCapture {
        fn install(&self) -> tracing::subscriber::DefaultGuard {
            let subscriber = tracing_subscriber::fmt()
                .with_writer(self.clone())
                .with_ansi(false)
                .finish();
            tracing::subscriber::set_default(subscriber)
        }

        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl std::io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogCapture {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn greeting_uses_default_only_for_empty_names() {
        assert_eq!(greeting_for("Ada"), "Hello, Ada.");
        assert_eq!(greeting_for(" "), "Hello,  .");
        assert_eq!(greeting_for(""), "Hello, World.");
    }

    #[tokio::test]
    async fn miss_computes_and_populates() {
        let cache = Arc::new(SpyCache::default());
        let handler = GreetingHandler::new(cache.clone());

        assert_eq!(handler.handle(Some("Ada")).await.unwrap(), "Hello, Ada.");
        assert_eq!(cache.inner.peek("Ada").await.as_deref(), Some("Hello, Ada."));
        assert_eq!(cache.writes(), 1);
    }

    #[tokio::test]
    async fn hit_returns_cached_value_without_writing() {
        let cache = Arc::new(SpyCache::default());
        cache.inner.set("Ada", "Hello, Ada.").await.unwrap();
        let handler = GreetingHandler::new(cache.clone());

        assert_eq!(handler.handle(Some("Ada")).await.unwrap(), "Hello, Ada.");
        assert_eq!(cache.writes(), 0);
    }

    #[tokio::test]
    async fn hit_serves_whatever_is_stored() {
        let cache = Arc::new(SpyCache::default());
        cache.inner.set("Ada", "Bonjour, Ada.").await.unwrap();
        let handler = GreetingHandler::new(cache.clone());

        assert_eq!(handler.handle(Some("Ada")).await.unwrap(), "Bonjour, Ada.");
    }

    #[tokio::test]
    async fn repeated_calls_agree() {
        let cache = Arc::new(SpyCache::default());
        let handler = GreetingHandler::new(cache.clone());

        let first = handler.handle(Some("Grace")).await.unwrap();
        let second = handler.handle(Some("Grace")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.writes(), 1);
        assert_eq!(cache.keys_read(), vec!["Grace", "Grace"]);
    }

    #[tokio::test]
    async fn absent_and_empty_names_share_the_empty_key() {
        let cache = Arc::new(SpyCache::default());
        let handler = GreetingHandler::new(cache.clone());

        assert_eq!(handler.handle(None).await.unwrap(), "Hello, World.");
        assert_eq!(handler.handle(Some("")).await.unwrap(), "Hello, World.");

        assert_eq!(cache.keys_read(), vec!["", ""]);
        assert_eq!(cache.writes(), 1);
        assert_eq!(cache.inner.peek("").await.as_deref(), Some("Hello, World."));
        assert_eq!(cache.inner.peek(DEFAULT_NAME).await, None);
    }

    #[tokio::test]
    async fn miss_and_hit_log_the_greeting() {
        let logs = LogCapture::default();
        let _guard = logs.install();
        let handler = GreetingHandler::new(Arc::new(InMemoryCache::new()));

        handler.handle(Some("Ada")).await.unwrap();
        handler.handle(Some("Ada")).await.unwrap();

        let output = logs.contents();
        let miss = output.find("computed and cached greeting").unwrap();
        let hit = output.find("served greeting from cache").unwrap();
        assert!(miss < hit);
        assert_eq!(output.matches("greeting=Hello, Ada.").count(), 2);
        assert!(output.contains(" INFO "));
    }

    #[tokio::test]
    async fn read_failure_skips_computation() {
        let cache = Arc::new(BrokenCache::new(true, false));
        let handler = GreetingHandler::new(cache.clone());

        let err = handler.handle(Some("Ada")).await.unwrap_err();
        assert!(matches!(err.source, CacheError::Redis(_)));
        assert_eq!(cache.sets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn write_failure_is_an_error() {
        let cache = Arc::new(BrokenCache::new(false, true));
        let handler = GreetingHandler::new(cache.clone());

        assert!(handler.handle(Some("Ada")).await.is_err());
        assert_eq!(cache.sets.load(Ordering::SeqCst), 1);
    }

    fn context(cache: Arc<dyn DistributedCache>, raw: &str) -> Context {
        let (request, _) = Request::parse(raw.as_bytes()).unwrap();
        Context::new(request, Arc::new(AppState::new(cache, "/api/httpget")))
    }

    #[tokio::test]
    async fn endpoint_answers_plain_text() {
        let ctx = context(
            Arc::new(InMemoryCache::new()),
            "GET /api/httpget?name=Ada HTTP/1.1\r\n\r\n",
        );
        let response = http_get(ctx).await;
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.payload(), b"Hello, Ada.");
    }

    #[tokio::test]
    async fn endpoint_answers_json_when_asked() {
        let ctx = context(
            Arc::new(InMemoryCache::new()),
            "GET /api/httpget HTTP/1.1\r\nAccept: application/json\r\n\r\n",
        );
        let response = http_get(ctx).await;
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.payload(), br#""Hello, World.""#);
        assert_eq!(response.headers().get("content-type"), Some("application/json"));
    }

    #[tokio::test]
    async fn endpoint_hides_failure_details() {
        let ctx = context(
            Arc::new(BrokenCache::new(true, true)),
            "GET /api/httpget?name=Ada HTTP/1.1\r\n\r\n",
        );
        let logs = LogCapture::default();
        let _guard = logs.install();

        let response = http_get(ctx).await;
        assert_eq!(response.status(), StatusCode::InternalServerError);
        assert!(response.payload().is_empty());

        let output = logs.contents();
        assert_eq!(output.matches("greeting endpoint failed").count(), 1);
        assert!(output.contains(" ERROR "));
        assert!(output.contains("connection refused"));
    }
}
