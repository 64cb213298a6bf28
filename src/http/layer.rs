//! Tower middleware that throttles requests per client.

use axum::extract::ConnectInfo;
use axum::http::header::{HeaderName, HeaderValue, CONTENT_TYPE, RETRY_AFTER, X_CONTENT_TYPE_OPTIONS};
use axum::http::{HeaderMap, Request, Response, StatusCode};
use futures::future::BoxFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};

use super::identity::client_identity;
use crate::ratelimit::{RateLimitDecision, RateLimiter};

/// Configured requests per window.
pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// Tokens left after this request.
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
/// Unix time (seconds) at which the current window resets.
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Layer that wraps a service with [`RateLimitService`].
#[derive(Debug, Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter>,
}

impl RateLimitLayer {
    /// Create a layer backed by a shared limiter.
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl<S> tower::Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: Arc::clone(&self.limiter),
        }
    }
}

/// Service that consults the limiter before calling `inner`.
///
/// Every response carries `X-RateLimit-Limit`, `X-RateLimit-Remaining` and
/// `X-RateLimit-Reset`. Denied requests get `429 Too Many Requests` with a
/// `Retry-After` header and never reach `inner`.
#[derive(Debug, Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
}

impl<S, ReqBody, ResBody> tower::Service<Request<ReqBody>> for RateLimitService<S>
where
    S: tower::Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ResBody: From<String> + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string());
        let identity = client_identity(request.headers(), peer.as_deref());

        let decision = self.limiter.allow(&identity);
        let reset_at = decision.reset_at(self.limiter.window_nanos());
        let rate = self.limiter.rate();

        if !decision.allowed {
            let retry_after = retry_after_secs(reset_at, self.limiter.now_nanos());
            let response = too_many_requests(rate, &decision, reset_at, retry_after);
            return Box::pin(futures::future::ready(Ok(response)));
        }

        let future = self.inner.call(request);
        Box::pin(async move {
            let mut response = future.await?;
            set_limit_headers(response.headers_mut(), rate, &decision, reset_at);
            Ok(response)
        })
    }
}

fn set_limit_headers(headers: &mut HeaderMap, rate: u64, decision: &RateLimitDecision, reset_at: i64) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(rate));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(reset_at.div_euclid(NANOS_PER_SEC)));
}

/// Whole seconds until `reset_at`, never negative.
fn retry_after_secs(reset_at: i64, now: i64) -> i64 {
    reset_at.saturating_sub(now).max(0) / NANOS_PER_SEC
}

fn too_many_requests<B: From<String>>(
    rate: u64,
    decision: &RateLimitDecision,
    reset_at: i64,
    retry_after: i64,
) -> Response<B> {
    let body = format!("Rate limit exceeded; try again in {retry_after} seconds\n");
    let mut response = Response::new(B::from(body));
    *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;

    let headers = response.headers_mut();
    set_limit_headers(headers, rate, decision, reset_at);
    headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    response
}
