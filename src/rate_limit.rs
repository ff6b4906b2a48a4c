//! Rate limiting for authentication endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down password
//! guessing and signup spam.

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderName, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use serde::Serialize;
use std::{num::NonZeroU32, sync::Arc};
use tracing::warn;

use crate::auth::extract_client_ip;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// A limiter together with the message shown when it trips.
#[derive(Clone)]
pub struct LimitedRoute {
    limiter: Arc<IpLimiter>,
    ip_header: Option<HeaderName>,
    message: &'static str,
}

/// Rate limiting configuration for authentication endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Login: 1 request per second per IP, bursts of 10
    pub login: LimitedRoute,
    /// Registration: 10 requests per minute per IP
    pub register: LimitedRoute,
    /// OAuth start/callback: 10 requests per second per IP
    pub oauth: LimitedRoute,
}

const LOGIN_PER_SEC: u32 = 1;
const LOGIN_BURST: u32 = 10;
const REGISTER_PER_MIN: u32 = 10;
const OAUTH_PER_SEC: u32 = 10;

fn nonzero(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN)
}

impl RateLimitConfig {
    /// Create rate limiters with default quotas.
    pub fn new(ip_header: Option<HeaderName>) -> Self {
        let route = |quota: Quota, message: &'static str| LimitedRoute {
            limiter: Arc::new(RateLimiter::keyed(quota)),
            ip_header: ip_header.clone(),
            message,
        };

        Self {
            login: route(
                Quota::per_second(nonzero(LOGIN_PER_SEC)).allow_burst(nonzero(LOGIN_BURST)),
                "Too many login attempts. Please wait before trying again.",
            ),
            register: route(
                Quota::per_minute(nonzero(REGISTER_PER_MIN)),
                "Too many signup attempts. Please wait before trying again.",
            ),
            oauth: route(
                Quota::per_second(nonzero(OAUTH_PER_SEC)),
                "Too many requests. Please try again later.",
            ),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
}

fn reject(status: StatusCode, error: &'static str) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

/// Middleware enforcing a [`LimitedRoute`]. Use with `from_fn_with_state`.
pub async fn rate_limit(State(route): State<LimitedRoute>, request: Request, next: Next) -> Response {
    let ip = match extract_client_ip(&request, route.ip_header.as_ref()) {
        Ok(ip) => ip,
        Err(e) => {
            warn!(reason = e, "Unable to determine client IP");
            return reject(StatusCode::FORBIDDEN, "Unable to determine client IP.");
        }
    };

    match route.limiter.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            warn!(ip = %ip, "Rate limit exceeded");
            reject(StatusCode::TOO_MANY_REQUESTS, route.message)
        }
    }
}
