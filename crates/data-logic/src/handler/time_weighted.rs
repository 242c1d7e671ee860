// Copyright The XPU Manager Authors
// SPDX-License-Identifier: MIT

//! Counter-rollover detection and time-weighted rate derivation.
//!
//! Raw counters arrive with a device-supplied timestamp; the derived
//! value is `Δraw / Δraw_ts` in device units. A rollover at whole-device
//! level discards the entire previous sample so the next tick re-seeds;
//! a rollover on a single tile masks only that tile.

use crate::handler::DerivedDevice;
use std::collections::HashMap;
use xpum_metrics::{DeviceId, Sample};

/// Outcome of one derivation pass.
#[derive(Debug, Default)]
pub(crate) struct Derivation {
    /// Derived per-device values for this tick.
    pub overlay: HashMap<DeviceId, DerivedDevice>,
    /// Whether a whole-device rollover was detected; the caller must
    /// discard the previous sample and skip derivation this tick.
    pub drop_previous: bool,
}

pub(crate) fn derive_rates(previous: &Sample, latest: &Sample) -> Derivation {
    // Whole-device rollover check first: any regressing device counter
    // invalidates the previous sample wholesale.
    for (device, metric) in &latest.devices {
        let Some(cur) = metric.raw else { continue };
        let Some(prev) = previous.device(*device).and_then(|m| m.raw) else {
            continue;
        };
        if prev.value > cur.value {
            return Derivation {
                overlay: HashMap::new(),
                drop_previous: true,
            };
        }
    }

    let mut overlay = HashMap::new();
    for (device, metric) in &latest.devices {
        let Some(prev_metric) = previous.device(*device) else {
            continue;
        };
        let mut derived = DerivedDevice::default();

        if let (Some(cur), Some(prev)) = (metric.raw, prev_metric.raw) {
            if let Some(rate) = rate_between(prev.value, cur.value, prev.timestamp, cur.timestamp) {
                derived.current = Some(rate);
            }
        }

        for (tile, sub) in &metric.subdevices {
            let Some(cur) = sub.raw else { continue };
            let Some(prev) = prev_metric.subdevices.get(tile).and_then(|s| s.raw) else {
                continue;
            };
            if prev.value > cur.value {
                // Tile-level rollover: mask this tile, peers survive.
                continue;
            }
            if let Some(rate) = rate_between(prev.value, cur.value, prev.timestamp, cur.timestamp) {
                let _ = derived.subdevices.insert(*tile, rate);
            }
        }

        if derived.current.is_some() || !derived.subdevices.is_empty() {
            let _ = overlay.insert(*device, derived);
        }
    }
    Derivation {
        overlay,
        drop_previous: false,
    }
}

fn rate_between(prev: u64, cur: u64, prev_ts: u64, cur_ts: u64) -> Option<u64> {
    let dt = cur_ts.checked_sub(prev_ts).filter(|dt| *dt != 0)?;
    Some((cur - prev) / dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use xpum_metrics::{DeviceMetric, RawCounter, SubdeviceMetric};

    fn raw_sample(ts: u64, value: u64, raw_ts: u64) -> Sample {
        let mut devices = BTreeMap::new();
        let _ = devices.insert(0, DeviceMetric::raw_counter(value, raw_ts));
        Sample::new(ts, devices)
    }

    #[test]
    fn derives_rate_from_counter_deltas() {
        let derivation = derive_rates(&raw_sample(1000, 100, 1), &raw_sample(2000, 160, 4));
        assert!(!derivation.drop_previous);
        assert_eq!(derivation.overlay[&0].current, Some(20));
    }

    #[test]
    fn whole_device_rollover_drops_previous() {
        let derivation = derive_rates(&raw_sample(1000, 100, 1), &raw_sample(2000, 50, 2));
        assert!(derivation.drop_previous);
        assert!(derivation.overlay.is_empty());
    }

    #[test]
    fn tile_rollover_masks_only_that_tile() {
        let tile = |value, raw_ts| SubdeviceMetric {
            current: None,
            raw: Some(RawCounter { value, timestamp: raw_ts }),
        };
        let mut devices = BTreeMap::new();
        let _ = devices.insert(
            0,
            DeviceMetric {
                subdevices: [(0, tile(100, 1)), (1, tile(10, 1))].into_iter().collect(),
                ..DeviceMetric::default()
            },
        );
        let previous = Sample::new(1000, devices);

        let mut devices = BTreeMap::new();
        let _ = devices.insert(
            0,
            DeviceMetric {
                subdevices: [(0, tile(40, 2)), (1, tile(30, 2))].into_iter().collect(),
                ..DeviceMetric::default()
            },
        );
        let latest = Sample::new(2000, devices);

        let derivation = derive_rates(&previous, &latest);
        assert!(!derivation.drop_previous);
        let derived = &derivation.overlay[&0];
        assert_eq!(derived.subdevices.get(&0), None);
        assert_eq!(derived.subdevices.get(&1), Some(&20));
    }

    #[test]
    fn zero_time_delta_derives_nothing() {
        let derivation = derive_rates(&raw_sample(1000, 100, 5), &raw_sample(2000, 200, 5));
        assert!(derivation.overlay.is_empty());
    }
}
