//! Timestamp conversion utilities.
//!
//! Timestamps are stored as `i64` microseconds since the Unix epoch. This
//! module converts to/from chrono types and protects stored timestamps
//! against backward wall-clock jumps (NTP corrections, VM migration).

#![allow(clippy::missing_const_for_fn)]

use chrono::{NaiveDateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Microseconds per second
const MICROS_PER_SECOND: i64 = 1_000_000;

/// Backward jump threshold: 1 second in microseconds.
const BACKWARD_JUMP_THRESHOLD_US: i64 = 1_000_000;

/// Last observed wall-clock value (microseconds since epoch).
static LAST_SYSTEM_TIME_US: AtomicI64 = AtomicI64::new(0);

/// Convert chrono `NaiveDateTime` to microseconds since Unix epoch.
#[inline]
#[must_use]
pub fn naive_to_micros(dt: NaiveDateTime) -> i64 {
    dt.and_utc().timestamp_micros()
}

/// Convert microseconds since Unix epoch to chrono `NaiveDateTime`.
///
/// Values outside chrono's representable range clamp to the range bounds
/// instead of panicking.
#[inline]
#[must_use]
pub fn micros_to_naive(micros: i64) -> NaiveDateTime {
    let secs = micros.div_euclid(MICROS_PER_SECOND);
    let sub_micros = micros.rem_euclid(MICROS_PER_SECOND);
    let nsecs = u32::try_from(sub_micros * 1000).unwrap_or(0);
    Utc.timestamp_opt(secs, nsecs)
        .single()
        .unwrap_or(if micros < 0 {
            chrono::DateTime::<Utc>::MIN_UTC
        } else {
            chrono::DateTime::<Utc>::MAX_UTC
        })
        .naive_utc()
}

/// Format stored micros as `YYYY-MM-DD HH:MM UTC` for context files.
#[must_use]
pub fn micros_to_display(micros: i64) -> String {
    micros_to_naive(micros)
        .format("%Y-%m-%d %H:%M UTC")
        .to_string()
}

/// Format stored micros as an ISO-8601 UTC string.
#[must_use]
pub fn micros_to_iso(micros: i64) -> String {
    micros_to_naive(micros)
        .and_utc()
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Format stored micros as `YYYY-MM-DD`.
#[must_use]
pub fn micros_to_date(micros: i64) -> String {
    micros_to_naive(micros).format("%Y-%m-%d").to_string()
}

/// Get current time as microseconds since Unix epoch.
///
/// If the wall clock jumped backward by more than 1 second, returns the
/// last observed value so stored timestamps never regress.
#[inline]
#[must_use]
pub fn now_micros() -> i64 {
    let current = Utc::now().timestamp_micros();
    let last = LAST_SYSTEM_TIME_US.load(Ordering::Relaxed);

    if last != 0 && current - last < -BACKWARD_JUMP_THRESHOLD_US {
        return last;
    }

    LAST_SYSTEM_TIME_US.store(current, Ordering::Relaxed);
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_conversion() {
        let now = now_micros();
        let naive = micros_to_naive(now);
        assert_eq!(naive_to_micros(naive), now);
    }

    #[test]
    fn extreme_values_do_not_panic() {
        let _ = micros_to_naive(i64::MAX);
        let _ = micros_to_naive(i64::MIN);
        let _ = micros_to_naive(0);
    }

    #[test]
    fn display_format() {
        // 2024-03-01 12:30:00 UTC
        let micros = naive_to_micros(
            chrono::NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(12, 30, 0)
                .unwrap(),
        );
        assert_eq!(micros_to_display(micros), "2024-03-01 12:30 UTC");
        assert_eq!(micros_to_date(micros), "2024-03-01");
        assert_eq!(micros_to_iso(micros), "2024-03-01T12:30:00Z");
    }

    #[test]
    fn now_is_monotonic_across_calls() {
        let a = now_micros();
        let b = now_micros();
        assert!(b >= a);
    }
}
