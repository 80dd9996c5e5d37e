//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and dispatches HTTP/1.1 requests to a handler
//! function, keeping connections alive between requests. Serving stops when
//! the shutdown future passed to [`Server::run`] completes: the listener is
//! closed, idle connections are dropped, and in-flight requests finish with
//! `Connection: close` before `run` returns.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Maximum size of a buffered HTTP request (1 MiB). The endpoint takes no body.
const MAX_REQUEST_SIZE: usize = 1024 * 1024;

const INITIAL_BUF_SIZE: usize = 4096;

/// The HTTP server.
///
/// # Examples
///
/// ```rust,no_run
/// use greeting_cache::server::{Server, shutdown_signal};
/// use greeting_cache::http::{Response, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::bind("127.0.0.1:7071").await?;
///     server
///         .run(
///             |_req| async { Response::new(StatusCode::Ok).body("Hello!") },
///             shutdown_signal(),
///         )
///         .await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves requests with `handler` until `shutdown` completes.
    ///
    /// The handler is shared across all connection tasks, so it must be
    /// `Send + Sync + 'static`. Returns once every connection task has
    /// finished.
    ///
    /// # Errors
    ///
    /// Currently infallible after binding; accept errors are logged and the
    /// loop continues.
    pub async fn run<H, F>(
        self,
        handler: H,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        info!(address = %self.local_addr, "listening");

        loop {
            let (stream, peer_addr) = tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                        continue;
                    }
                },
                () = &mut shutdown => break,
                Some(_) = connections.join_next(), if !connections.is_empty() => continue,
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);
            let stop_rx = stop_rx.clone();

            connections.spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, handler, stop_rx).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }

        info!(open = connections.len(), "shutting down; draining connections");
        drop(self.listener);
        let _ = stop_tx.send(true);
        while connections.join_next().await.is_some() {}
        info!("server stopped");

        Ok(())
    }
}

/// Completes on Ctrl-C, or on `SIGTERM` on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl-C"),
        () = terminate => info!("received SIGTERM"),
    }
}

/// Handles a single TCP connection over its lifetime.
///
/// Serves every complete request already buffered before reading more, so
/// pipelined requests are answered in order. Stops when the peer closes the
/// connection, asks for `Connection: close`, or shutdown is signalled. A
/// shutdown that arrives while a request is being processed lets that
/// request finish.
async fn handle_connection<H, F>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
    mut stop: watch::Receiver<bool>,
) -> Result<(), std::io::Error>
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        if *stop.borrow() {
            debug!(peer = %peer_addr, "shutdown, closing idle connection");
            break;
        }

        match Request::parse(&buf) {
            Ok((request, body_offset)) => {
                let content_length = request.content_length().unwrap_or(0);
                let Some(total_needed) = body_offset
                    .checked_add(content_length)
                    .filter(|&total| total <= MAX_REQUEST_SIZE)
                else {
                    warn!(
                        peer = %peer_addr,
                        content_length,
                        "declared request too large, sending 413"
                    );
                    reject(&mut stream, StatusCode::PayloadTooLarge).await?;
                    break;
                };

                if buf.len() >= total_needed {
                    debug!(
                        peer = %peer_addr,
                        method = %request.method(),
                        path = %request.path(),
                        "dispatching request"
                    );

                    let keep_alive = request.is_keep_alive();
                    let response = handler(request).await;
                    let keep_alive = keep_alive && !*stop.borrow();

                    stream
                        .write_all(&response.keep_alive(keep_alive).into_bytes())
                        .await?;
                    stream.flush().await?;

                    let _ = buf.split_to(total_needed);

                    if !keep_alive {
                        debug!(peer = %peer_addr, "closing connection");
                        break;
                    }
                    continue;
                }
            }
            Err(RequestError::Incomplete) => {}
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request, sending 400");
                reject(&mut stream, StatusCode::BadRequest).await?;
                break;
            }
        }

        let bytes_read = tokio::select! {
            read = stream.read_buf(&mut buf) => read?,
            _ = stop.changed() => continue,
        };

        if bytes_read == 0 {
            debug!(peer = %peer_addr, "connection closed by peer");
            break;
        }

        if buf.len() > MAX_REQUEST_SIZE {
            warn!(peer = %peer_addr, "request too large, sending 413");
            reject(&mut stream, StatusCode::PayloadTooLarge).await?;
            break;
        }
    }

    Ok(())
}

/// Writes a bodiless error response that closes the connection.
async fn reject(stream: &mut TcpStream, status: StatusCode) -> Result<(), std::io::Error> {
    let response = Response::new(status).keep_alive(false);
    stream.write_all(&response.into_bytes()).await
}
