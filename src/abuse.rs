//! Anti-abuse protection for the game socket
//!
//! - Fixed-window rate limiting per (client address, action)
//! - Client address resolution behind a reverse proxy

use axum::http::HeaderMap;
use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{sync::RwLock, time::Instant};

/// Per-action budget: at most `max` actions per `window`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionLimit {
    pub max: u32,
    pub window: Duration,
}

impl ActionLimit {
    const fn per_minute(max: u32) -> Self {
        Self {
            max,
            window: Duration::from_secs(60),
        }
    }

    const fn per_ten_minutes(max: u32) -> Self {
        Self {
            max,
            window: Duration::from_secs(10 * 60),
        }
    }
}

/// Budget for a socket action. Room creation is limited far more tightly
/// than response submission. Unknown actions are not limited.
pub fn limit_for(action: &str) -> Option<ActionLimit> {
    let limit = match action {
        "room:create" => ActionLimit::per_ten_minutes(10),
        "room:join" => ActionLimit::per_ten_minutes(60),
        "room:peek" => ActionLimit::per_minute(180),
        "room:resume" => ActionLimit::per_minute(60),
        "room:leave" => ActionLimit::per_minute(30),
        "player:update" => ActionLimit::per_minute(30),
        "theme:finalize" => ActionLimit::per_minute(10),
        "game:resume" => ActionLimit::per_minute(10),
        "turn:selectDare" => ActionLimit::per_minute(30),
        "turn:submit" => ActionLimit::per_minute(240),
        "turn:pass" => ActionLimit::per_minute(30),
        "turn:complete" => ActionLimit::per_minute(30),
        "menu:addDare" => ActionLimit::per_minute(20),
        "idle:escalate" => ActionLimit::per_minute(10),
        "absent:response" => ActionLimit::per_minute(60),
        _ => return None,
    };
    Some(limit)
}

/// Rate limiter state
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    /// Map of "{ip}|{action}" to (count, reset deadline)
    requests: Arc<RwLock<HashMap<String, (u32, Instant)>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one action against `key`.
    /// Returns true if allowed, false if rate limited.
    pub async fn check(&self, key: &str, limit: ActionLimit) -> bool {
        let now = Instant::now();
        let mut requests = self.requests.write().await;

        match requests.get_mut(key) {
            Some((count, reset_at)) => {
                if now >= *reset_at {
                    *count = 1;
                    *reset_at = now + limit.window;
                    true
                } else if *count >= limit.max {
                    false
                } else {
                    *count += 1;
                    true
                }
            }
            None => {
                requests.insert(key.to_string(), (1, now + limit.window));
                true
            }
        }
    }

    /// Check an action from `ip` against its budget from [`limit_for`]
    pub async fn check_action(&self, ip: &str, action: &str) -> bool {
        match limit_for(action) {
            Some(limit) => self.check(&format!("{}|{}", ip, action), limit).await,
            None => true,
        }
    }

    /// Drop windows whose deadline has passed (call periodically)
    pub async fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut requests = self.requests.write().await;
        let before = requests.len();
        requests.retain(|_, (_, reset_at)| now < *reset_at);
        before - requests.len()
    }

    pub async fn len(&self) -> usize {
        self.requests.read().await.len()
    }
}

/// Anti-abuse configuration
#[derive(Debug, Clone)]
pub struct AbuseConfig {
    /// Rate limiter (None = disabled)
    pub rate_limiter: Option<RateLimiter>,
}

impl Default for AbuseConfig {
    fn default() -> Self {
        Self {
            rate_limiter: Some(RateLimiter::new()),
        }
    }
}

impl AbuseConfig {
    /// Load config from environment variables
    pub fn from_env() -> Self {
        let rate_limit_enabled = std::env::var("ABUSE_RATE_LIMIT")
            .map(|v| v != "0" && v.to_lowercase() != "false")
            .unwrap_or(true);

        tracing::info!(rate_limit_enabled, "Anti-abuse config loaded");

        Self {
            rate_limiter: rate_limit_enabled.then(RateLimiter::new),
        }
    }

    /// Whether `ip` may perform `action` right now
    pub async fn allow(&self, ip: &str, action: &str) -> bool {
        match &self.rate_limiter {
            Some(limiter) => limiter.check_action(ip, action).await,
            None => true,
        }
    }
}

/// Client address: first `X-Forwarded-For` entry, else the TCP peer
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}
