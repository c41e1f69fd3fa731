//! Layer 5: anomaly detection. Hourly send-rate counters and
//! new-recipient flagging.
//!
//! Counters live in a shared key/value store with expiry, keyed
//! `rate:<actor>:<YYYYMMDDHH>` (UTC hour buckets). The TTL is set only on
//! the first increment of a bucket so the window expires exactly one hour
//! after it opens.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use asupersync::{Cx, Outcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use ghostpost_core::Severity;
use ghostpost_db::{DbPool, queries};

use crate::audit;
use crate::error::GuardError;

/// Counter TTL: one hour.
pub const RATE_TTL_SECONDS: u64 = 3600;

/// Format the UTC hour bucket for a timestamp.
#[must_use]
pub fn hour_bucket(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d%H").to_string()
}

/// Build the counter key for an actor in a bucket.
#[must_use]
pub fn rate_key(actor: &str, bucket: &str) -> String {
    format!("rate:{actor}:{bucket}")
}

/// Shared counter store with atomic increment and key expiry.
///
/// Matches the semantics of a Redis-style KV: `INCR` returns the new
/// value, `EXPIRE` arms a TTL, expired keys read as absent.
pub trait CounterStore: Send + Sync {
    /// Current value of a key; 0 when absent or expired.
    fn get(&self, cx: &Cx, key: &str) -> impl Future<Output = Outcome<i64, GuardError>> + Send;

    /// Atomic increment returning the new value.
    fn incr(&self, cx: &Cx, key: &str) -> impl Future<Output = Outcome<i64, GuardError>> + Send;

    /// Arm a TTL on a key.
    fn expire(
        &self,
        cx: &Cx,
        key: &str,
        ttl: Duration,
    ) -> impl Future<Output = Outcome<(), GuardError>> + Send;
}

#[derive(Debug)]
struct CounterEntry {
    count: i64,
    expires_at: Option<Instant>,
}

impl CounterEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// In-memory counter store. The shared-process deployment points this
/// trait at an external KV; tests and the single-process CLI use this.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    entries: Mutex<HashMap<String, CounterEntry>>,
}

impl MemoryCounterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, CounterEntry>) -> T) -> T {
        let mut guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

impl CounterStore for MemoryCounterStore {
    async fn get(&self, _cx: &Cx, key: &str) -> Outcome<i64, GuardError> {
        let now = Instant::now();
        Outcome::Ok(self.with_entries(|entries| {
            match entries.get(key) {
                Some(entry) if entry.is_expired(now) => {
                    entries.remove(key);
                    0
                }
                Some(entry) => entry.count,
                None => 0,
            }
        }))
    }

    async fn incr(&self, _cx: &Cx, key: &str) -> Outcome<i64, GuardError> {
        let now = Instant::now();
        Outcome::Ok(self.with_entries(|entries| {
            let entry = entries.entry(key.to_string()).or_insert(CounterEntry {
                count: 0,
                expires_at: None,
            });
            if entry.is_expired(now) {
                entry.count = 0;
                entry.expires_at = None;
            }
            entry.count += 1;
            entry.count
        }))
    }

    async fn expire(&self, _cx: &Cx, key: &str, ttl: Duration) -> Outcome<(), GuardError> {
        let deadline = Instant::now() + ttl;
        self.with_entries(|entries| {
            if let Some(entry) = entries.get_mut(key) {
                entry.expires_at = Some(deadline);
            }
        });
        Outcome::Ok(())
    }
}

/// Result of a send-rate check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateCheck {
    pub allowed: bool,
    pub count: i64,
    pub limit: i64,
}

/// Check the hourly send rate for an actor. `count == limit` is blocked.
pub async fn check_send_rate<C: CounterStore>(
    cx: &Cx,
    store: &C,
    actor: &str,
    limit: i64,
) -> Outcome<RateCheck, GuardError> {
    let key = rate_key(actor, &hour_bucket(Utc::now()));
    let count = match store.get(cx, &key).await {
        Outcome::Ok(count) => count,
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };
    Outcome::Ok(RateCheck {
        allowed: count < limit,
        count,
        limit,
    })
}

/// Increment the send counter for the current hour, arming the TTL on the
/// bucket's first increment only. Returns the new count.
pub async fn increment_send_rate<C: CounterStore>(
    cx: &Cx,
    store: &C,
    actor: &str,
) -> Outcome<i64, GuardError> {
    let key = rate_key(actor, &hour_bucket(Utc::now()));
    let count = match store.incr(cx, &key).await {
        Outcome::Ok(count) => count,
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };
    if count == 1 {
        match store
            .expire(cx, &key, Duration::from_secs(RATE_TTL_SECONDS))
            .await
        {
            Outcome::Ok(()) => {}
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
    }
    Outcome::Ok(count)
}

/// True iff no contact row matches the address.
pub async fn check_new_recipient(
    cx: &Cx,
    pool: &DbPool,
    to_address: &str,
) -> Outcome<bool, GuardError> {
    match queries::contact_exists(cx, pool, to_address).await {
        Outcome::Ok(exists) => Outcome::Ok(!exists),
        Outcome::Err(e) => Outcome::Err(GuardError::Db(e)),
        Outcome::Cancelled(r) => Outcome::Cancelled(r),
        Outcome::Panicked(p) => Outcome::Panicked(p),
    }
}

/// One detected anomaly.
#[derive(Debug, Clone, Serialize)]
pub struct Anomaly {
    pub kind: &'static str,
    pub severity: Severity,
    pub details: String,
}

/// Run all anomaly checks for an outbound send.
///
/// Rate-limit violations record a high-severity security event; a new
/// recipient alone is a medium anomaly without an event.
pub async fn check_anomalies<C: CounterStore>(
    cx: &Cx,
    pool: &DbPool,
    store: &C,
    to_address: &str,
    actor: &str,
    rate_limit: i64,
) -> Outcome<Vec<Anomaly>, GuardError> {
    let mut anomalies = Vec::new();

    let rate = match check_send_rate(cx, store, actor, rate_limit).await {
        Outcome::Ok(rate) => rate,
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };
    if !rate.allowed {
        anomalies.push(Anomaly {
            kind: "rate_limit_exceeded",
            severity: Severity::High,
            details: format!("Send rate {}/{} per hour exceeded", rate.count, rate.limit),
        });
        audit::log_security_event_best_effort(
            cx,
            pool,
            "rate_limit_exceeded",
            Severity::High,
            json!({"actor": actor, "count": rate.count, "limit": rate.limit}),
            None,
            None,
            false,
        )
        .await;
    }

    let is_new = match check_new_recipient(cx, pool, to_address).await {
        Outcome::Ok(is_new) => is_new,
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };
    if is_new {
        anomalies.push(Anomaly {
            kind: "new_recipient",
            severity: Severity::Medium,
            details: format!("Never-before-seen recipient: {to_address}"),
        });
    }

    Outcome::Ok(anomalies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;

    fn run<T>(f: impl Future<Output = T>) -> T {
        let rt = RuntimeBuilder::current_thread().build().expect("runtime");
        rt.block_on(f)
    }

    fn ok<T: std::fmt::Debug, E: std::fmt::Debug>(out: Outcome<T, E>) -> T {
        match out {
            Outcome::Ok(v) => v,
            other => panic!("expected Ok, got {other:?}"),
        }
    }

    #[test]
    fn bucket_format() {
        let dt = DateTime::parse_from_rfc3339("2024-03-01T14:05:09Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(hour_bucket(dt), "2024030114");
        assert_eq!(rate_key("agent", &hour_bucket(dt)), "rate:agent:2024030114");
    }

    #[test]
    fn rate_boundary_is_blocked() {
        let store = MemoryCounterStore::new();
        let cx = Cx::for_testing();
        run(async {
            for _ in 0..20 {
                ok(increment_send_rate(&cx, &store, "agent").await);
            }
            let rate = ok(check_send_rate(&cx, &store, "agent", 20).await);
            assert_eq!(rate.count, 20);
            assert!(!rate.allowed, "count == limit must block");

            let rate = ok(check_send_rate(&cx, &store, "agent", 21).await);
            assert!(rate.allowed);
        });
    }

    #[test]
    fn absent_counter_reads_zero() {
        let store = MemoryCounterStore::new();
        let cx = Cx::for_testing();
        run(async {
            let rate = ok(check_send_rate(&cx, &store, "nobody", 20).await);
            assert_eq!(rate.count, 0);
            assert!(rate.allowed);
        });
    }

    #[test]
    fn increment_returns_new_count() {
        let store = MemoryCounterStore::new();
        let cx = Cx::for_testing();
        run(async {
            assert_eq!(ok(increment_send_rate(&cx, &store, "agent").await), 1);
            assert_eq!(ok(increment_send_rate(&cx, &store, "agent").await), 2);
            assert_eq!(ok(increment_send_rate(&cx, &store, "other").await), 1);
        });
    }

    #[test]
    fn expired_keys_read_as_absent() {
        let store = MemoryCounterStore::new();
        let cx = Cx::for_testing();
        run(async {
            ok(store.incr(&cx, "rate:x:2020010100").await);
            ok(store
                .expire(&cx, "rate:x:2020010100", Duration::from_secs(0))
                .await);
            assert_eq!(ok(store.get(&cx, "rate:x:2020010100").await), 0);
            // A fresh increment starts over at 1.
            assert_eq!(ok(store.incr(&cx, "rate:x:2020010100").await), 1);
        });
    }

    /// Counts `expire` calls to verify TTL is armed only on first increment.
    struct TtlSpy {
        inner: MemoryCounterStore,
        expire_calls: std::sync::atomic::AtomicUsize,
    }

    impl CounterStore for TtlSpy {
        async fn get(&self, cx: &Cx, key: &str) -> Outcome<i64, GuardError> {
            self.inner.get(cx, key).await
        }

        async fn incr(&self, cx: &Cx, key: &str) -> Outcome<i64, GuardError> {
            self.inner.incr(cx, key).await
        }

        async fn expire(&self, cx: &Cx, key: &str, ttl: Duration) -> Outcome<(), GuardError> {
            self.expire_calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.expire(cx, key, ttl).await
        }
    }

    #[test]
    fn ttl_armed_only_on_first_increment() {
        let spy = TtlSpy {
            inner: MemoryCounterStore::new(),
            expire_calls: std::sync::atomic::AtomicUsize::new(0),
        };
        let cx = Cx::for_testing();
        run(async {
            for _ in 0..5 {
                ok(increment_send_rate(&cx, &spy, "agent").await);
            }
            assert_eq!(
                spy.expire_calls.load(std::sync::atomic::Ordering::SeqCst),
                1,
                "exactly one EXPIRE per bucket"
            );
        });
    }
}
