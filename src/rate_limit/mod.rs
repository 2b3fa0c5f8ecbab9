// Fixed-window rate limiting for the /api surface.
//
// One bucket per client identity. State is in-memory only (resets on restart)
// and is not coordinated across instances.

use axum::http::HeaderMap;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default admissions per window
pub const DEFAULT_CAPACITY: u32 = 80;

/// Default window length
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Identity shared by callers with no forwarded or peer address
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Expired buckets are swept every this many admissions
const PURGE_EVERY: u64 = 1024;

/// Counter for a single identity's current window.
struct WindowBucket {
    count: u32,
    reset_at: Instant,
}

impl WindowBucket {
    fn open(now: Instant, window: Duration) -> Self {
        Self {
            count: 1,
            reset_at: now + window,
        }
    }
}

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Limited { retry_after_secs: u64 },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

/// Per-identity fixed-window rate limiter.
///
/// Buckets are created lazily on first request. The check and the increment
/// for one identity happen under that entry's shard lock, so concurrent
/// requests can never push a window past its capacity.
pub struct RateLimiter {
    buckets: DashMap<String, WindowBucket>,
    capacity: u32,
    window: Duration,
    admissions: AtomicU64,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_WINDOW)
    }
}

impl RateLimiter {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            buckets: DashMap::new(),
            capacity,
            window,
            admissions: AtomicU64::new(0),
        }
    }

    /// Check and count one request for `identity`.
    pub fn admit(&self, identity: &str) -> Admission {
        self.admit_at(identity, Instant::now())
    }

    /// [`admit`](Self::admit) against a fixed clock.
    pub fn admit_at(&self, identity: &str, now: Instant) -> Admission {
        // Sweep before taking the entry lock; retain() locks every shard
        if self.admissions.fetch_add(1, Ordering::Relaxed) % PURGE_EVERY == PURGE_EVERY - 1 {
            self.purge_expired(now);
        }

        match self.buckets.entry(identity.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(WindowBucket::open(now, self.window));
                Admission::Allowed
            }
            Entry::Occupied(mut occupied) => {
                let bucket = occupied.get_mut();

                // A bucket past its window is replaced, not incremented
                if now >= bucket.reset_at {
                    *bucket = WindowBucket::open(now, self.window);
                    return Admission::Allowed;
                }

                if bucket.count >= self.capacity {
                    let remaining_ms = (bucket.reset_at - now).as_millis() as u64;
                    return Admission::Limited {
                        retry_after_secs: remaining_ms.div_ceil(1000).max(1),
                    };
                }

                bucket.count += 1;
                Admission::Allowed
            }
        }
    }

    /// Drop every bucket whose window has ended.
    pub fn purge_expired(&self, now: Instant) {
        self.buckets.retain(|_, bucket| now < bucket.reset_at);
    }

    /// Number of tracked identities
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Derive the rate-limit identity for a request.
///
/// Prefers the first `X-Forwarded-For` entry, then the peer address. Callers
/// with neither share the [`UNKNOWN_IDENTITY`] bucket.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|first| !first.is_empty());

    if let Some(first) = forwarded {
        return first.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_full_window_then_reject_then_reset() {
        let limiter = RateLimiter::default();
        let start = Instant::now();

        for i in 0..80 {
            let now = start + Duration::from_millis(i * 10);
            assert_eq!(limiter.admit_at("1.2.3.4", now), Admission::Allowed, "request {}", i + 1);
        }

        // 81st request in the same window
        match limiter.admit_at("1.2.3.4", start + Duration::from_secs(1)) {
            Admission::Limited { retry_after_secs } => assert_eq!(retry_after_secs, 59),
            other => panic!("expected rejection, got {:?}", other),
        }

        // First request of the next window
        let next_window = start + DEFAULT_WINDOW + Duration::from_millis(1);
        assert_eq!(limiter.admit_at("1.2.3.4", next_window), Admission::Allowed);
    }

    #[test]
    fn test_retry_after_is_at_least_one_second() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let start = Instant::now();

        assert!(limiter.admit_at("ip", start).is_allowed());

        // 100ms before the window closes still rounds up to one second
        let almost = start + Duration::from_millis(59_900);
        assert_eq!(
            limiter.admit_at("ip", almost),
            Admission::Limited { retry_after_secs: 1 }
        );
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let start = Instant::now();

        assert!(limiter.admit_at("ip", start).is_allowed());
        assert_eq!(
            limiter.admit_at("ip", start + Duration::from_millis(500)),
            Admission::Limited { retry_after_secs: 60 }
        );
    }

    #[test]
    fn test_separate_buckets_per_identity() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        // Drain one identity
        assert!(limiter.admit_at("a", now).is_allowed());
        assert!(!limiter.admit_at("a", now).is_allowed());
        // Another is unaffected
        assert!(limiter.admit_at("b", now).is_allowed());
        assert_eq!(limiter.len(), 2);
    }

    #[test]
    fn test_purge_expired() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        let start = Instant::now();

        limiter.admit_at("old", start);
        limiter.admit_at("new", start + Duration::from_secs(30));

        limiter.purge_expired(start + Duration::from_secs(61));
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn test_concurrent_admissions_never_exceed_capacity() {
        let limiter = std::sync::Arc::new(RateLimiter::new(80, Duration::from_secs(60)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = std::sync::Arc::clone(&limiter);
                std::thread::spawn(move || {
                    (0..50).filter(|_| limiter.admit("shared").is_allowed()).count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 80);
    }

    #[test]
    fn test_identity_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" 203.0.113.7 , 10.0.0.1"),
        );
        let peer: SocketAddr = "127.0.0.1:5555".parse().unwrap();

        assert_eq!(client_identity(&headers, Some(peer)), "203.0.113.7");
    }

    #[test]
    fn test_identity_falls_back_to_peer_then_unknown() {
        let peer: SocketAddr = "192.0.2.1:40000".parse().unwrap();

        let mut empty_forwarded = HeaderMap::new();
        empty_forwarded.insert("x-forwarded-for", HeaderValue::from_static(""));

        assert_eq!(client_identity(&HeaderMap::new(), Some(peer)), "192.0.2.1");
        assert_eq!(client_identity(&empty_forwarded, Some(peer)), "192.0.2.1");
        assert_eq!(client_identity(&HeaderMap::new(), None), UNKNOWN_IDENTITY);
    }
}
