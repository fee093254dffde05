//! Rate limiter for authentication endpoints
//!
//! Sliding windows kept in memory:
//! - failed logins per email (5 per 15 minutes)
//! - auth requests per IP address (10 per minute)
//! - magic-link requests per email (3 per 10 minutes)

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::net::IpAddr;
use tokio::sync::RwLock;

/// Timestamps of recent events per key, capped at `limit` within `window`
struct SlidingWindow<K> {
    events: RwLock<HashMap<K, Vec<DateTime<Utc>>>>,
    limit: usize,
    window: Duration,
}

impl<K: Eq + Hash> SlidingWindow<K> {
    fn new(limit: usize, window: Duration) -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            limit,
            window,
        }
    }

    async fn is_limited(&self, key: K) -> bool {
        let cutoff = Utc::now() - self.window;
        let mut events = self.events.write().await;
        let times = events.entry(key).or_default();
        times.retain(|t| *t > cutoff);
        times.len() >= self.limit
    }

    async fn record(&self, key: K) {
        self.events.write().await.entry(key).or_default().push(Utc::now());
    }

    async fn clear(&self, key: &K) {
        self.events.write().await.remove(key);
    }

    async fn cleanup(&self) -> usize {
        let cutoff = Utc::now() - self.window;
        let mut events = self.events.write().await;
        let before = events.len();
        events.retain(|_, times| {
            times.retain(|t| *t > cutoff);
            !times.is_empty()
        });
        before - events.len()
    }
}

/// Rate limiter shared by the login and magic-link handlers
pub struct AuthRateLimiter {
    failed_logins: SlidingWindow<String>,
    ip_requests: SlidingWindow<IpAddr>,
    magic_links: SlidingWindow<String>,
}

impl AuthRateLimiter {
    pub fn new() -> Self {
        Self {
            failed_logins: SlidingWindow::new(5, Duration::minutes(15)),
            ip_requests: SlidingWindow::new(10, Duration::minutes(1)),
            magic_links: SlidingWindow::new(3, Duration::minutes(10)),
        }
    }

    /// True once an email has 5 failed logins in the last 15 minutes
    pub async fn is_email_limited(&self, email: &str) -> bool {
        self.failed_logins.is_limited(email.to_lowercase()).await
    }

    pub async fn record_failed_login(&self, email: &str) {
        self.failed_logins.record(email.to_lowercase()).await;
    }

    /// Forget failures after a successful login
    pub async fn clear_failed_logins(&self, email: &str) {
        self.failed_logins.clear(&email.to_lowercase()).await;
    }

    /// True once an IP has made 10 auth requests in the last minute
    pub async fn is_ip_limited(&self, ip: IpAddr) -> bool {
        self.ip_requests.is_limited(ip).await
    }

    pub async fn record_ip_request(&self, ip: IpAddr) {
        self.ip_requests.record(ip).await;
    }

    /// Check and count a magic-link request. Returns false when the email
    /// already had 3 requests in the last 10 minutes.
    pub async fn try_magic_link(&self, email: &str) -> bool {
        let key = email.to_lowercase();
        if self.magic_links.is_limited(key.clone()).await {
            return false;
        }
        self.magic_links.record(key).await;
        true
    }

    /// Drop expired entries, returning how many keys were removed
    pub async fn cleanup(&self) -> usize {
        self.failed_logins.cleanup().await
            + self.ip_requests.cleanup().await
            + self.magic_links.cleanup().await
    }
}

impl Default for AuthRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[tokio::test]
    async fn test_failed_login_limit() {
        let limiter = AuthRateLimiter::new();

        for _ in 0..4 {
            assert!(!limiter.is_email_limited("user@example.com").await);
            limiter.record_failed_login("user@example.com").await;
        }
        limiter.record_failed_login("USER@example.com").await;
        assert!(limiter.is_email_limited("user@example.com").await);

        limiter.clear_failed_logins("User@Example.com").await;
        assert!(!limiter.is_email_limited("user@example.com").await);
    }

    #[tokio::test]
    async fn test_ip_limit() {
        let limiter = AuthRateLimiter::new();
        let ip = IpAddr::from_str("10.1.2.3").unwrap();
        let other = IpAddr::from_str("10.1.2.4").unwrap();

        for _ in 0..10 {
            assert!(!limiter.is_ip_limited(ip).await);
            limiter.record_ip_request(ip).await;
        }
        assert!(limiter.is_ip_limited(ip).await);
        assert!(!limiter.is_ip_limited(other).await);
    }

    #[tokio::test]
    async fn test_magic_link_limit() {
        let limiter = AuthRateLimiter::new();
        assert!(limiter.try_magic_link("a@example.com").await);
        assert!(limiter.try_magic_link("a@example.com").await);
        assert!(limiter.try_magic_link("A@example.com").await);
        assert!(!limiter.try_magic_link("a@example.com").await);
        assert!(limiter.try_magic_link("b@example.com").await);
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_stale_keys() {
        let window: SlidingWindow<&str> = SlidingWindow::new(5, Duration::milliseconds(20));
        window.record("stale").await;
        tokio::time::sleep(std::time::Duration::from_millis(40)).await;
        window.record("fresh").await;

        assert_eq!(window.cleanup().await, 1);
        assert_eq!(window.events.read().await.len(), 1);
    }
}
