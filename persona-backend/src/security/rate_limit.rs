//! Per-address request limiting
//!
//! Each named limit keeps one governor token bucket per peer address. A limit
//! of N per window allows a burst of N and refills one request every window / N.

use dashmap::DashMap;
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter as GovRateLimiter};
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::time::{Duration, Instant};
use strum::{AsRefStr, Display};

/// Route groups that carry their own limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RateLimitKind {
    Login,
    Api,
    Chat,
    Upload,
    AdminAction,
}

impl RateLimitKind {
    pub fn default_limit(&self) -> RateLimit {
        match self {
            Self::Login => RateLimit::new(5, Duration::from_secs(15 * 60)),
            Self::Api => RateLimit::new(100, Duration::from_secs(3600)),
            Self::Chat => RateLimit::new(30, Duration::from_secs(60)),
            Self::Upload => RateLimit::new(10, Duration::from_secs(3600)),
            Self::AdminAction => RateLimit::new(50, Duration::from_secs(3600)),
        }
    }
}

/// `max_requests` allowed per `window`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimit {
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self { max_requests, window }
    }

    /// Parse the human form used in configuration: "30 per minute", "5 per 15 minutes"
    pub fn parse(s: &str) -> Result<Self, String> {
        let lower = s.trim().to_lowercase();
        let mut parts = lower.split_whitespace();

        let max_requests: u32 = parts
            .next()
            .ok_or_else(|| "empty rate limit".to_string())?
            .parse()
            .map_err(|_| format!("invalid request count in '{}'", s))?;

        match parts.next() {
            Some("per") | Some("/") => {}
            _ => return Err(format!("expected 'per' in '{}'", s)),
        }

        let (multiplier, unit) = match (parts.next(), parts.next()) {
            (Some(n), Some(unit)) => {
                let n: u64 = n
                    .parse()
                    .map_err(|_| format!("invalid window length in '{}'", s))?;
                (n, unit)
            }
            (Some(unit), None) => (1, unit),
            _ => return Err(format!("missing window unit in '{}'", s)),
        };

        if parts.next().is_some() {
            return Err(format!("unexpected trailing text in '{}'", s));
        }

        let unit_secs = match unit.trim_end_matches('s') {
            "second" | "sec" => 1,
            "minute" | "min" => 60,
            "hour" => 3600,
            "day" => 86400,
            other => return Err(format!("unknown window unit '{}'", other)),
        };

        if max_requests == 0 || multiplier == 0 {
            return Err(format!("rate limit '{}' must be positive", s));
        }

        Ok(Self::new(max_requests, Duration::from_secs(multiplier * unit_secs)))
    }

    /// Token bucket holding `max_requests`, refilled evenly across `window`
    pub fn quota(&self) -> Quota {
        let burst = NonZeroU32::new(self.max_requests).unwrap_or(NonZeroU32::MIN);
        let mut period = self.window / burst.get();
        if period.is_zero() {
            period = Duration::from_nanos(1);
        }
        Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst)
    }
}

struct Bucket {
    limiter: DefaultDirectRateLimiter,
    limit: RateLimit,
    last_hit: Instant,
}

impl Bucket {
    fn new(limit: RateLimit) -> Self {
        Self {
            limiter: GovRateLimiter::direct(limit.quota()),
            limit,
            last_hit: Instant::now(),
        }
    }
}

/// Shared limiter state for every route group, one bucket per (group, peer address)
pub struct RateLimiter {
    buckets: DashMap<(RateLimitKind, IpAddr), Bucket>,
    clock: DefaultClock,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
            clock: DefaultClock::default(),
        }
    }

    /// Count one hit; `Err` carries the seconds until the next request is allowed
    pub fn check(&self, kind: RateLimitKind, ip: IpAddr, limit: RateLimit) -> Result<(), u64> {
        let mut bucket = self
            .buckets
            .entry((kind, ip))
            .or_insert_with(|| Bucket::new(limit));

        if bucket.limit != limit {
            *bucket = Bucket::new(limit);
        }
        bucket.last_hit = Instant::now();

        bucket.limiter.check().map_err(|not_until| {
            let wait = not_until.wait_time_from(self.clock.now());
            (wait.as_secs_f64().ceil() as u64).max(1)
        })
    }

    /// Drop buckets idle long enough to have refilled completely
    pub fn purge_expired(&self) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, b| b.last_hit.elapsed() < b.limit.window);
        before - self.buckets.len()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
