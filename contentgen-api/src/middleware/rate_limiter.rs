//! Fixed-window rate limiting keyed by client IP and route scope.
//!
//! Every scope carries one or more windows (`5/minute;20/hour`). A request
//! increments the counter of each window; the first window found over its
//! limit rejects the request with 429.

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::RateLimitsConfig;
use crate::models::error::ApiError;

#[derive(Error, Debug)]
pub enum CounterStoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// One `N/unit` rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub limit: u64,
    pub window: Duration,
    pub unit: &'static str,
}

impl RateLimitRule {
    /// Parse a single `N/unit` item, e.g. `5/minute` or `100/hours`
    pub fn parse(raw: &str) -> Result<Self, String> {
        let (count, unit) = raw
            .trim()
            .split_once('/')
            .ok_or_else(|| format!("expected N/unit, got '{}'", raw.trim()))?;
        let limit: u64 = count
            .trim()
            .parse()
            .map_err(|_| format!("invalid request count '{}'", count.trim()))?;
        if limit == 0 {
            return Err("request count must be at least 1".to_string());
        }
        let unit = unit.trim().to_lowercase();
        let (unit, secs) = match unit.trim_end_matches('s') {
            "second" => ("second", 1),
            "minute" => ("minute", 60),
            "hour" => ("hour", 3600),
            "day" => ("day", 86_400),
            _ => return Err(format!("unknown time unit '{}'", unit)),
        };
        Ok(Self {
            limit,
            window: Duration::from_secs(secs),
            unit,
        })
    }

    /// Parse `;`-separated rules
    pub fn parse_list(raw: &str) -> Result<Vec<Self>, String> {
        let rules = raw
            .split(';')
            .filter(|item| !item.trim().is_empty())
            .map(Self::parse)
            .collect::<Result<Vec<_>, _>>()?;
        if rules.is_empty() {
            return Err("no rate limit rules given".to_string());
        }
        Ok(rules)
    }

    fn describe(&self) -> String {
        format!("{} per 1 {}", self.limit, self.unit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitScope {
    Login,
    PublicAi,
    ProtectedAi,
}

impl RateLimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitScope::Login => "login",
            RateLimitScope::PublicAi => "public_ai",
            RateLimitScope::ProtectedAi => "protected_ai",
        }
    }
}

/// Counter value after a hit and seconds until its window closes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHit {
    pub count: u64,
    pub ttl_secs: u64,
}

/// Backing store for window counters
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key`, starting a window of `window` on the first hit
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowHit, CounterStoreError>;
}


#[cfg(test)]
pub use memory::MemoryCounterStore;

/// Outcome of a rate limit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed {
        limit: u64,
        remaining: u64,
    },
    Limited {
        retry_after_secs: u64,
        limit: u64,
        rule: String,
    },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed { .. })
    }

    pub fn headers(&self) -> Vec<(&'static str, String)> {
        match self {
            RateLimitResult::Allowed { limit, remaining } => vec![
                ("x-ratelimit-limit", limit.to_string()),
                ("x-ratelimit-remaining", remaining.to_string()),
            ],
            RateLimitResult::Limited {
                retry_after_secs,
                limit,
                ..
            } => vec![
                ("x-ratelimit-limit", limit.to_string()),
                ("x-ratelimit-remaining", "0".to_string()),
                ("retry-after", retry_after_secs.to_string()),
            ],
        }
    }

    fn apply(&self, headers: &mut HeaderMap) {
        for (name, value) in self.headers() {
            if let Ok(value) = HeaderValue::from_str(&value) {
                headers.insert(HeaderName::from_static(name), value);
            }
        }
    }
}

/// Rules per scope over a shared counter store
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    enabled: bool,
    rules: HashMap<RateLimitScope, Vec<RateLimitRule>>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, config: &RateLimitsConfig) -> Result<Self, String> {
        let mut rules = HashMap::new();
        rules.insert(RateLimitScope::Login, RateLimitRule::parse_list(&config.login)?);
        rules.insert(
            RateLimitScope::PublicAi,
            RateLimitRule::parse_list(&config.public_ai)?,
        );
        rules.insert(
            RateLimitScope::ProtectedAi,
            RateLimitRule::parse_list(&config.protected_ai)?,
        );
        Ok(Self {
            store,
            enabled: config.enabled,
            rules,
        })
    }

    /// Count a request from `client` against every window of `scope`.
    ///
    /// Store failures let the request through.
    pub async fn check(&self, scope: RateLimitScope, client: &str) -> RateLimitResult {
        let rules = match self.rules.get(&scope) {
            Some(rules) if self.enabled => rules,
            _ => {
                return RateLimitResult::Allowed {
                    limit: 0,
                    remaining: 0,
                }
            }
        };

        let mut tightest: Option<(u64, u64)> = None;
        for rule in rules {
            let key = format!(
                "rate_limit:{}:{}:{}",
                scope.as_str(),
                rule.window.as_secs(),
                client
            );
            let hit = match self.store.hit(&key, rule.window).await {
                Ok(hit) => hit,
                Err(e) => {
                    warn!("Rate limit store unavailable, allowing request: {}", e);
                    continue;
                }
            };

            if hit.count > rule.limit {
                debug!(scope = scope.as_str(), client, "Rate limit exceeded");
                return RateLimitResult::Limited {
                    retry_after_secs: hit.ttl_secs,
                    limit: rule.limit,
                    rule: rule.describe(),
                };
            }

            let remaining = rule.limit - hit.count;
            if tightest.map_or(true, |(_, r)| remaining < r) {
                tightest = Some((rule.limit, remaining));
            }
        }

        let (limit, remaining) = tightest.unwrap_or((0, 0));
        RateLimitResult::Allowed { limit, remaining }
    }
}

/// Limiter bound to one scope, used as middleware state
#[derive(Clone)]
pub struct ScopedLimiter {
    pub limiter: Arc<RateLimiter>,
    pub scope: RateLimitScope,
}

impl ScopedLimiter {
    pub fn new(limiter: Arc<RateLimiter>, scope: RateLimitScope) -> Self {
        Self { limiter, scope }
    }
}

/// Client address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the peer
pub fn client_ip(request: &Request<Body>) -> String {
    let headers = request.headers();
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit_middleware(
    State(scoped): State<ScopedLimiter>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = client_ip(&request);
    let result = scoped.limiter.check(scoped.scope, &client).await;

    match &result {
        RateLimitResult::Allowed { limit, .. } => {
            let mut response = next.run(request).await;
            if *limit > 0 {
                result.apply(response.headers_mut());
            }
            response
        }
        RateLimitResult::Limited { rule, .. } => {
            let mut response = ApiError::RateLimitExceeded(rule.clone()).into_response();
            result.apply(response.headers_mut());
            response
        }
    }
}
