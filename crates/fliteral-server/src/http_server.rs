//! HTTP Server for the function host
//!
//! This module provides the HTTP/1.1 server built on hyper. The server:
//! - Listens on a TCP socket for incoming connections
//! - Spawns a tokio task for each connection
//! - Hands every request to the [`FunctionRouter`]
//!
//! The header read timeout of each connection equals the request timeout.
//!
//! # Example
//!
//! ```no_run
//! use fliteral_server::{FunctionHost, HttpServer, ServerConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let host = Arc::new(FunctionHost::new(ServerConfig::new("./functions")).unwrap());
//!     let server = HttpServer::new(host);
//!     server.run("127.0.0.1:8080".parse().unwrap()).await.unwrap();
//! }
//! ```

use fliteral_common::{FliteralError, Result};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioIo, TokioTimer};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::host::FunctionHost;
use crate::http_router::FunctionRouter;

pub struct HttpServer {
    router: Arc<FunctionRouter>,
}

impl HttpServer {
    pub fn new(host: Arc<FunctionHost>) -> Self {
        Self {
            router: Arc::new(FunctionRouter::new(host)),
        }
    }

    /// Binds `addr` and serves until the task is dropped.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the address cannot be bound.
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| FliteralError::Transport(format!("Failed to bind to {}: {}", addr, e)))?;
        self.serve(listener).await
    }

    /// Serves connections from an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| FliteralError::Transport(format!("Failed to get local address: {}", e)))?;
        tracing::info!("HTTP server listening on {}", local_addr);

        let header_read_timeout = self.router.host().config().timeout;

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let io = TokioIo::new(stream);
            let router = Arc::clone(&self.router);

            tokio::task::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let router = Arc::clone(&router);
                    async move { Ok::<_, Infallible>(router.route(req).await) }
                });

                if let Err(err) = http1::Builder::new()
                    .timer(TokioTimer::new())
                    .header_read_timeout(header_read_timeout)
                    .serve_connection(io, service)
                    .await
                {
                    tracing::debug!(%peer, "Error serving connection: {}", err);
                }
            });
        }
    }
}
