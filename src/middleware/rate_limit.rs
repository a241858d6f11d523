//! Per-client, per-route admission control.
//!
//! Each `(client IP, route)` key keeps a sliding-window log of the requests
//! it was charged for. A request is admitted only while every rule of the
//! route's policy is under its limit, and it is only charged once the inner
//! service has answered with something other than 503.

use std::collections::VecDeque;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::api::Envelope;
use crate::error::ApiError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitParseError {
    #[error("empty rate limit policy")]
    Empty,

    #[error("invalid rate limit rule '{0}'")]
    InvalidRule(String),

    #[error("unknown rate limit unit '{0}'")]
    UnknownUnit(String),
}

/// At most `max` requests per `window`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max: u32,
    pub window: Duration,
}

impl RateLimit {
    fn parse(rule: &str) -> Result<Self, RateLimitParseError> {
        let invalid = || RateLimitParseError::InvalidRule(rule.to_string());

        let (count, unit) = rule
            .split_once('/')
            .or_else(|| rule.split_once(" per "))
            .ok_or_else(invalid)?;
        let max: u32 = count.trim().parse().map_err(|_| invalid())?;
        if max == 0 {
            return Err(invalid());
        }

        let unit = unit.trim().to_ascii_lowercase();
        let secs = match unit.trim_end_matches('s') {
            "second" | "sec" => 1,
            "minute" | "min" => 60,
            "hour" => 60 * 60,
            "day" => 24 * 60 * 60,
            _ => return Err(RateLimitParseError::UnknownUnit(unit)),
        };

        Ok(Self {
            max,
            window: Duration::from_secs(secs),
        })
    }
}

/// One or more rules, all of which must pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    rules: Vec<RateLimit>,
}

impl RateLimitPolicy {
    /// Parses `"120/minute;5/second"`. Rules may also be separated by commas
    /// and written as `"5 per second"`.
    pub fn parse(policy: &str) -> Result<Self, RateLimitParseError> {
        let rules = policy
            .split([';', ','])
            .map(str::trim)
            .filter(|rule| !rule.is_empty())
            .map(RateLimit::parse)
            .collect::<Result<Vec<_>, _>>()?;

        if rules.is_empty() {
            return Err(RateLimitParseError::Empty);
        }
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[RateLimit] {
        &self.rules
    }

    fn longest_window(&self) -> Duration {
        self.rules
            .iter()
            .map(|rule| rule.window)
            .max()
            .unwrap_or_default()
    }
}

pub type LimitKey = (IpAddr, &'static str);

/// Shared request log for every rate-limited route
#[derive(Debug, Default)]
pub struct RateLimiter {
    log: DashMap<LimitKey, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks every rule without charging. On rejection returns how long until
    /// the tightest rule frees a slot.
    pub fn admit(&self, key: &LimitKey, policy: &RateLimitPolicy) -> Result<(), Duration> {
        let Some(entries) = self.log.get(key) else {
            return Ok(());
        };

        let now = Instant::now();
        let mut retry_after: Option<Duration> = None;
        for rule in policy.rules() {
            let in_window: Vec<&Instant> = entries
                .iter()
                .filter(|at| now.duration_since(**at) < rule.window)
                .collect();
            if in_window.len() >= rule.max as usize {
                // the slot frees up when the oldest entry that still counts ages out
                let oldest = in_window[in_window.len() - rule.max as usize];
                let wait = rule.window.saturating_sub(now.duration_since(*oldest));
                retry_after = Some(retry_after.map_or(wait, |w| w.max(wait)));
            }
        }

        match retry_after {
            Some(wait) => Err(wait),
            None => Ok(()),
        }
    }

    /// Charges one request against `key`
    pub fn record(&self, key: LimitKey, policy: &RateLimitPolicy) {
        let now = Instant::now();
        let keep = policy.longest_window();
        let mut entries = self.log.entry(key).or_default();
        while entries
            .front()
            .is_some_and(|at| now.duration_since(*at) >= keep)
        {
            entries.pop_front();
        }
        entries.push_back(now);
    }

    /// Drops keys with no request inside `max_idle`
    pub fn purge_idle(&self, max_idle: Duration) {
        let now = Instant::now();
        self.log.retain(|(ip, route), entries| {
            let active = entries
                .back()
                .is_some_and(|at| now.duration_since(*at) < max_idle);
            if !active {
                debug!(ip = %ip, route = %route, "Removing idle rate limit entry");
            }
            active
        });
    }

    pub fn tracked_keys(&self) -> usize {
        self.log.len()
    }
}

/// Periodically purges idle keys
pub async fn purge_task(limiter: Arc<RateLimiter>, every: Duration, max_idle: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        limiter.purge_idle(max_idle);
    }
}

/// Middleware state for one route (or route group)
#[derive(Clone)]
pub struct RouteLimit {
    pub route: &'static str,
    pub policy: Arc<RateLimitPolicy>,
    pub limiter: Arc<RateLimiter>,
    pub envelope: Envelope,
    pub trust_forwarded_for: bool,
}

/// Client address: the peer address, unless forwarded headers are trusted
pub fn client_ip(request: &Request, trust_forwarded_for: bool) -> IpAddr {
    let headers = request.headers();
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|first| first.trim().parse::<IpAddr>().ok());
        if let Some(ip) = forwarded {
            return ip;
        }

        let real_ip = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<IpAddr>().ok());
        if let Some(ip) = real_ip {
            return ip;
        }
    }

    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip();
    }

    IpAddr::from([127, 0, 0, 1])
}

pub async fn enforce_rate_limit(
    State(limit): State<RouteLimit>,
    request: Request,
    next: Next,
) -> Response {
    let key = (client_ip(&request, limit.trust_forwarded_for), limit.route);

    if let Err(wait) = limit.limiter.admit(&key, &limit.policy) {
        let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
        warn!(ip = %key.0, route = limit.route, retry_after_secs = secs, "Rate limit exceeded");

        let denied = ApiError::too_many_requests(format!("retry after {}s", secs));
        let mut response = limit.envelope.from_error(&denied).into_response();
        if let Ok(value) = HeaderValue::from_str(&secs.max(1).to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        return response;
    }

    let response = next.run(request).await;
    if response.status() != StatusCode::SERVICE_UNAVAILABLE {
        limit.limiter.record(key, &limit.policy);
    }
    response
}
