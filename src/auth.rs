//! Token gate for the admin digest endpoints.
//!
//! Admin routes are invisible without the right token: a missing, wrong or
//! unconfigured token gets the same 404 as an unknown path.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use std::sync::Arc;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Admin configuration
#[derive(Debug, Clone, Default)]
pub struct AdminConfig {
    /// Shared secret for admin routes (None = admin routes disabled)
    pub token: Option<String>,
}

impl AdminConfig {
    /// Load admin config from environment variables
    pub fn from_env() -> Self {
        let token = std::env::var("ADMIN_TOKEN")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        if token.is_some() {
            tracing::info!("Admin endpoints enabled");
        } else {
            tracing::info!("Admin endpoints disabled (set ADMIN_TOKEN to enable)");
        }
        Self { token }
    }

    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    /// Compare digests so timing does not leak the token length or prefix
    pub fn validate(&self, candidate: &str) -> bool {
        match &self.token {
            Some(token) => constant_time_eq(
                &Sha256::digest(token.as_bytes()),
                &Sha256::digest(candidate.as_bytes()),
            ),
            None => false,
        }
    }
}

/// Constant-time byte comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

fn query_param<'a>(request: &'a Request<Body>, key: &str) -> Option<&'a str> {
    request.uri().query()?.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then_some(v)
    })
}

/// Token from `?token=` or the `X-Admin-Token` header
fn presented_token(request: &Request<Body>) -> Option<&str> {
    query_param(request, "token").or_else(|| {
        request
            .headers()
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
    })
}

/// Middleware guarding `/admin/*`
pub async fn admin_auth_middleware(
    State(config): State<Arc<AdminConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let allowed = presented_token(&request).is_some_and(|t| config.validate(t));
    if !allowed {
        tracing::warn!(uri = %request.uri().path(), "Rejected admin request");
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    }
    next.run(request).await
}
