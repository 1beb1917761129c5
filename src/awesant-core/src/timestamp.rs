// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use chrono::{DateTime, Timelike, Utc};

/// Formats `@timestamp` values (`YYYY-MM-DDTHH:MM:SS.mmmZ`, UTC).
///
/// The second-resolution prefix is cached and only re-rendered when the
/// wall clock crosses an integral second; the millisecond suffix is cheap
/// to append per call.
#[derive(Debug, Default)]
pub struct TimestampCache {
    last_sec: i64,
    prefix: String,
}

impl TimestampCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current timestamp, cached per integral second.
    pub fn now(&mut self) -> String {
        self.format(Utc::now())
    }

    fn format(&mut self, now: DateTime<Utc>) -> String {
        let sec = now.timestamp();
        if sec != self.last_sec || self.prefix.is_empty() {
            self.prefix = now.format("%Y-%m-%dT%H:%M:%S").to_string();
            self.last_sec = sec;
        }
        let millis = now.nanosecond() / 1_000_000;
        format!("{}.{:03}Z", self.prefix, millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formats_iso8601_with_millis() {
        let mut cache = TimestampCache::new();
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 12, 34, 56).unwrap()
            + chrono::Duration::milliseconds(789);
        assert_eq!(cache.format(ts), "2026-03-01T12:34:56.789Z");
    }

    #[test]
    fn reuses_prefix_within_a_second() {
        let mut cache = TimestampCache::new();
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 1).unwrap();
        let a = cache.format(base + chrono::Duration::milliseconds(1));
        let prefix = cache.prefix.clone();
        let b = cache.format(base + chrono::Duration::milliseconds(999));
        assert_eq!(cache.prefix, prefix);
        assert_eq!(a, "2026-03-01T00:00:01.001Z");
        assert_eq!(b, "2026-03-01T00:00:01.999Z");
    }

    #[test]
    fn rolls_prefix_across_seconds() {
        let mut cache = TimestampCache::new();
        let first = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 1).unwrap();
        let second = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 2).unwrap();
        assert_eq!(cache.format(first), "2026-03-01T00:00:01.000Z");
        assert_eq!(cache.format(second), "2026-03-01T00:00:02.000Z");
    }
}
