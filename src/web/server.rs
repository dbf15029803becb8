//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::routes::{router, AppState};
use crate::error::{MarqueeError, Result};

/// HTTP server for the form endpoints.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Handler state
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self { addr, state }
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;

        info!(addr = %self.addr, "Starting HTTP server for form endpoints");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                MarqueeError::Server(e.to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::RateLimiter;
    use std::sync::Arc;

    #[test]
    fn test_server_creation() {
        let addr: SocketAddr = "127.0.0.1:3000".parse().unwrap();
        let _server = HttpServer::new(addr, AppState::new(Arc::new(RateLimiter::new())));
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_server() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = HttpServer::new(addr, AppState::new(Arc::new(RateLimiter::new())));

        let result = server.serve_with_shutdown(async {}).await;
        assert!(result.is_ok());
    }
}
