// Copyright The XPU Manager Authors
// SPDX-License-Identifier: MIT

//! Per-session rolling statistics records.

use crate::Timestamp;

/// Running min/avg/max over the samples observed since the last
/// read-and-reset for one (session, device) or (session, device, handle)
/// slot.
///
/// The average is the streaming arithmetic mean
/// `avg' = avg * (n - 1) / n + x / n` where `n` is the tick count of the
/// slot, including ticks on which the value was absent.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingStats {
    /// Number of ticks observed, absent ticks included.
    pub count: u64,
    /// Smallest value observed.
    pub min: u64,
    /// Largest value observed.
    pub max: u64,
    /// Streaming arithmetic mean of the observed values.
    pub avg: f64,
    /// Tick timestamp that seeded the slot.
    pub start_time: Timestamp,
    /// Tick timestamp of the most recent observation.
    pub latest_time: Timestamp,
    /// Whether the most recent tick carried a value.
    pub has_data: bool,
}

impl RollingStats {
    /// Seeds a slot from its first observed value.
    #[must_use]
    pub fn seed(value: u64, ts: Timestamp) -> Self {
        RollingStats {
            count: 1,
            min: value,
            max: value,
            avg: value as f64,
            start_time: ts,
            latest_time: ts,
            has_data: true,
        }
    }

    /// Folds one tick into the slot.
    ///
    /// An absent value bumps the tick count and clears the presence flag
    /// but leaves min/avg/max untouched.
    pub fn observe(&mut self, value: Option<u64>, ts: Timestamp) {
        self.count += 1;
        if let Some(v) = value {
            self.has_data = true;
            if v < self.min {
                self.min = v;
            }
            if v > self.max {
                self.max = v;
            }
            let n = self.count as f64;
            self.avg = self.avg * (n - 1.0) / n + v as f64 / n;
        } else {
            self.has_data = false;
        }
        self.latest_time = ts;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn streaming_mean_matches_arithmetic_mean() {
        let mut stats = RollingStats::seed(40, 1000);
        stats.observe(Some(50), 2000);
        stats.observe(Some(60), 3000);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min, 40);
        assert_eq!(stats.max, 60);
        assert!((stats.avg - 50.0).abs() < 1e-9);
        assert_eq!(stats.start_time, 1000);
        assert_eq!(stats.latest_time, 3000);
    }

    #[test]
    fn absent_tick_keeps_extrema() {
        let mut stats = RollingStats::seed(10, 1000);
        stats.observe(None, 2000);
        assert_eq!(stats.count, 2);
        assert_eq!(stats.min, 10);
        assert_eq!(stats.max, 10);
        assert!(!stats.has_data);
        stats.observe(Some(30), 3000);
        assert!(stats.has_data);
        assert_eq!(stats.max, 30);
    }
}
