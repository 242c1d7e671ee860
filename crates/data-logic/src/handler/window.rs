// Copyright The XPU Manager Authors
// SPDX-License-Identifier: MIT

//! Trailing-window average over recent samples.
//!
//! Used where the public surface wants min/avg/max over a short time
//! window instead of a per-session statistics slot. The window holds
//! shared sample handles and drops entries older than the configured
//! age limit on every insert.

use std::collections::VecDeque;
use std::sync::Arc;
use xpum_metrics::{DeviceId, Sample, Timestamp};

/// Min/avg/max over the window contents for one device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    /// Number of window samples carrying a value for the device.
    pub count: u64,
    /// Smallest value in the window.
    pub min: u64,
    /// Largest value in the window.
    pub max: u64,
    /// Arithmetic mean of the window values.
    pub avg: f64,
    /// Tick timestamp of the oldest contributing sample.
    pub start_time: Timestamp,
    /// Tick timestamp of the newest contributing sample.
    pub latest_time: Timestamp,
}

pub(crate) fn push_and_prune(
    window: &mut VecDeque<Arc<Sample>>,
    sample: Arc<Sample>,
    age_limit_ms: u64,
) {
    let now = sample.ts_ms;
    window.push_back(sample);
    while let Some(front) = window.front() {
        if now.saturating_sub(front.ts_ms) > age_limit_ms {
            let _ = window.pop_front();
        } else {
            break;
        }
    }
}

pub(crate) fn window_stats(window: &VecDeque<Arc<Sample>>, device: DeviceId) -> Option<WindowStats> {
    let mut stats: Option<WindowStats> = None;
    for sample in window {
        let Some(value) = sample.device(device).and_then(|m| m.current) else {
            continue;
        };
        match stats.as_mut() {
            None => {
                stats = Some(WindowStats {
                    count: 1,
                    min: value,
                    max: value,
                    avg: value as f64,
                    start_time: sample.ts_ms,
                    latest_time: sample.ts_ms,
                });
            }
            Some(stats) => {
                stats.count += 1;
                stats.min = stats.min.min(value);
                stats.max = stats.max.max(value);
                let n = stats.count as f64;
                stats.avg = stats.avg * (n - 1.0) / n + value as f64 / n;
                stats.latest_time = sample.ts_ms;
            }
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use xpum_metrics::DeviceMetric;

    fn sample(ts: u64, value: u64) -> Arc<Sample> {
        let mut devices = BTreeMap::new();
        let _ = devices.insert(0, DeviceMetric::scalar(value));
        Arc::new(Sample::new(ts, devices))
    }

    #[test]
    fn old_samples_age_out() {
        let mut window = VecDeque::new();
        push_and_prune(&mut window, sample(1_000, 10), 5_000);
        push_and_prune(&mut window, sample(4_000, 20), 5_000);
        push_and_prune(&mut window, sample(10_000, 30), 5_000);
        assert_eq!(window.len(), 2);

        let stats = window_stats(&window, 0).expect("stats");
        assert_eq!(stats.count, 2);
        assert_eq!(stats.min, 20);
        assert_eq!(stats.max, 30);
        assert!((stats.avg - 25.0).abs() < 1e-9);
        assert_eq!(stats.start_time, 4_000);
        assert_eq!(stats.latest_time, 10_000);
    }

    #[test]
    fn unknown_device_has_no_stats() {
        let mut window = VecDeque::new();
        push_and_prune(&mut window, sample(1_000, 10), 5_000);
        assert_eq!(window_stats(&window, 9), None);
    }
}
