use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::identity::Identity;
use crate::{
    AppState,
    config::FailurePolicy,
    error::AppError,
    limiter::{CheckResult, LimitConfig},
};

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Admission control for every inbound request.
///
/// Resolves exactly one `(key, limit)` pair, runs the limiter, and either
/// forwards the request or answers 429. The resolved [`Identity`] is left in
/// the request extensions for downstream handlers. When the store fails, the
/// configured [`FailurePolicy`] decides between admitting and rejecting.
pub async fn rate_limit(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    // Pick the identity and its profile
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    let identity = Identity::resolve(req.headers(), peer, &state.config.token_header);
    let key = identity.key();
    let limit = *identity.limit(&state.config);
    req.extensions_mut().insert(identity);

    // Store failures fall to the configured policy
    let result = match state.limiter.check(&key, &limit).await {
        Ok(result) => result,
        Err(err) => {
            return match state.config.failure_policy {
                FailurePolicy::Open => {
                    tracing::error!(key = %key, error = %err, "Rate limiter unavailable, admitting request");
                    next.run(req).await
                }
                FailurePolicy::Closed => {
                    tracing::error!(key = %key, error = %err, "Rate limiter unavailable, rejecting request");
                    AppError::StoreUnavailable.into_response()
                }
            };
        }
    };

    // Forward or reject; both carry the rate headers
    let mut response = if result.allowed {
        next.run(req).await
    } else {
        tracing::info!(
            key = %key,
            blocked = result.blocked,
            "Request rejected by rate limiter"
        );
        AppError::RateLimited {
            retry_after_secs: limit.retry_after_secs(),
        }
        .into_response()
    };

    insert_rate_headers(response.headers_mut(), &limit, &result);
    response
}

fn insert_rate_headers(headers: &mut HeaderMap, limit: &LimitConfig, result: &CheckResult) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(limit.requests_per_second));
    headers.insert(REMAINING_HEADER, HeaderValue::from(result.remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(result.reset_time.timestamp()));
}
