//! Login rate limiting
//!
//! Two sliding windows guard the login endpoint:
//! - failed attempts per email address: 5 per 15 minutes
//! - login requests per client IP: 10 per minute
//!
//! State is in memory only; [`LoginRateLimiter::cleanup`] is run
//! periodically from `main` to drop stale keys.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::net::IpAddr;
use tokio::sync::RwLock;

pub const MAX_FAILED_LOGINS: usize = 5;
pub const FAILED_LOGIN_WINDOW_MINUTES: i64 = 15;
pub const MAX_IP_REQUESTS: usize = 10;
pub const IP_WINDOW_MINUTES: i64 = 1;

/// Timestamps of recent events per key, bounded by a time window
struct SlidingWindow<K> {
    limit: usize,
    window: Duration,
    events: RwLock<HashMap<K, Vec<DateTime<Utc>>>>,
}

impl<K: Eq + Hash> SlidingWindow<K> {
    fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            events: RwLock::new(HashMap::new()),
        }
    }

    async fn is_limited(&self, key: &K) -> bool {
        let cutoff = Utc::now() - self.window;
        let events = self.events.read().await;
        events
            .get(key)
            .map(|times| times.iter().filter(|t| **t > cutoff).count() >= self.limit)
            .unwrap_or(false)
    }

    async fn record(&self, key: K) {
        let now = Utc::now();
        let cutoff = now - self.window;
        let mut events = self.events.write().await;
        let times = events.entry(key).or_default();
        times.retain(|t| *t > cutoff);
        times.push(now);
    }

    async fn clear(&self, key: &K) {
        self.events.write().await.remove(key);
    }

    async fn prune(&self) {
        let cutoff = Utc::now() - self.window;
        self.events.write().await.retain(|_, times| {
            times.retain(|t| *t > cutoff);
            !times.is_empty()
        });
    }

    async fn len(&self) -> usize {
        self.events.read().await.len()
    }
}

pub struct LoginRateLimiter {
    by_email: SlidingWindow<String>,
    by_ip: SlidingWindow<IpAddr>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self {
            by_email: SlidingWindow::new(
                MAX_FAILED_LOGINS,
                Duration::minutes(FAILED_LOGIN_WINDOW_MINUTES),
            ),
            by_ip: SlidingWindow::new(MAX_IP_REQUESTS, Duration::minutes(IP_WINDOW_MINUTES)),
        }
    }

    /// Emails compare case-insensitively
    pub async fn is_email_limited(&self, email: &str) -> bool {
        self.by_email.is_limited(&email.to_lowercase()).await
    }

    pub async fn record_failed_attempt(&self, email: &str) {
        self.by_email.record(email.to_lowercase()).await;
    }

    /// Forget failures after a successful login
    pub async fn clear_email(&self, email: &str) {
        self.by_email.clear(&email.to_lowercase()).await;
    }

    pub async fn is_ip_limited(&self, ip: IpAddr) -> bool {
        self.by_ip.is_limited(&ip).await
    }

    pub async fn record_ip_request(&self, ip: IpAddr) {
        self.by_ip.record(ip).await;
    }

    /// Drop expired timestamps and keys with nothing left
    pub async fn cleanup(&self) {
        self.by_email.prune().await;
        self.by_ip.prune().await;
        // Read before logging; a tracing value must not be held across an await
        let emails = self.by_email.len().await;
        let ips = self.by_ip.len().await;
        tracing::debug!(emails, ips, "Pruned login rate limiter");
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
