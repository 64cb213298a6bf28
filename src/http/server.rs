//! HTTP server hosting the throttled routes.

use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::layer::RateLimitLayer;
use crate::error::{Result, ThrottleError};
use crate::ratelimit::RateLimiter;

/// HTTP server that puts every route behind the rate limiter.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The rate limiter instance
    rate_limiter: Arc<RateLimiter>,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, rate_limiter: Arc<RateLimiter>) -> Self {
        Self { addr, rate_limiter }
    }

    /// Build the router, with the rate limit layer wrapping all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/info", get(info_handler))
            .layer(RateLimitLayer::new(Arc::clone(&self.rate_limiter)))
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            ThrottleError::Io(e)
        })?;

        info!(addr = %self.addr, "Starting HTTP server with graceful shutdown");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            ThrottleError::Io(e)
        })
    }
}

async fn info_handler() -> String {
    format!("This is throttle {}\n", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode};
    use std::time::Duration;
    use tower::ServiceExt;

    fn info_request(peer: SocketAddr) -> Request<Body> {
        let mut request = Request::builder().uri("/info").body(Body::empty()).unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));
        request
    }

    #[test]
    fn test_server_creation() {
        let addr: SocketAddr = "127.0.0.1:3002".parse().unwrap();
        let rate_limiter = Arc::new(RateLimiter::new(10, Duration::from_secs(60)));
        let _server = HttpServer::new(addr, rate_limiter);
    }

    #[tokio::test]
    async fn test_router_throttles_info() {
        let addr: SocketAddr = "127.0.0.1:3002".parse().unwrap();
        let rate_limiter = Arc::new(RateLimiter::new(1, Duration::from_secs(60)));
        let server = HttpServer::new(addr, rate_limiter.clone());
        let peer: SocketAddr = "198.51.100.4:40000".parse().unwrap();

        let first = server.router().oneshot(info_request(peer)).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.headers()["x-ratelimit-remaining"], "0");

        let body = axum::body::to_bytes(first.into_body(), usize::MAX).await.unwrap();
        assert!(body.starts_with(b"This is throttle"));

        let second = server.router().oneshot(info_request(peer)).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key("retry-after"));
        assert_eq!(rate_limiter.len(), 1);
    }

    #[tokio::test]
    async fn test_serve_shuts_down_on_signal() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let rate_limiter = Arc::new(RateLimiter::new(10, Duration::from_secs(60)));
        let server = HttpServer::new(addr, rate_limiter);

        let result = server.serve_with_shutdown(async {}).await;
        assert!(result.is_ok());
    }
}
