// Copyright The XPU Manager Authors
// SPDX-License-Identifier: MIT

//! Per-engine utilization derivation.
//!
//! Each engine handle carries a monotonic active-time counter and a
//! hardware timestamp. Utilization over the tick is
//! `scale * 100 * Δactive / Δts`, clamped to `scale * 100`; a handle
//! present only in the latest sample contributes nothing this tick.

use crate::handler::DerivedDevice;
use std::collections::HashMap;
use xpum_metrics::{DeviceId, Sample};

pub(crate) fn derive_engine_utilization(
    previous: &Sample,
    latest: &Sample,
    scale: u64,
) -> HashMap<DeviceId, DerivedDevice> {
    let cap = scale * 100;
    let mut overlay = HashMap::new();
    for (device, metric) in &latest.devices {
        let Some(prev_metric) = previous.device(*device) else {
            continue;
        };
        let mut derived = DerivedDevice::default();
        for (handle, engine) in &metric.engines {
            let Some(prev_engine) = prev_metric.engines.get(handle) else {
                continue;
            };
            let Some(util) = utilization(
                prev_engine.active_time,
                engine.active_time,
                prev_engine.timestamp,
                engine.timestamp,
                cap,
            ) else {
                continue;
            };
            let _ = derived.handles.insert(*handle, util);
            derived.scale = Some(scale);
        }
        if !derived.handles.is_empty() {
            let _ = overlay.insert(*device, derived);
        }
    }
    overlay
}

/// Clamped activity ratio shared by the engine, engine-group and GPU
/// utilization handlers.
pub(crate) fn utilization(
    prev_active: u64,
    cur_active: u64,
    prev_ts: u64,
    cur_ts: u64,
    cap: u64,
) -> Option<u64> {
    let dt = cur_ts.checked_sub(prev_ts).filter(|dt| *dt != 0)?;
    let da = cur_active.saturating_sub(prev_active);
    let util = (u128::from(cap) * u128::from(da) / u128::from(dt)) as u64;
    Some(util.min(cap))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use xpum_metrics::{DeviceMetric, EngineMetric, EngineType};

    fn engine_sample(ts: u64, active: u64, hw_ts: u64) -> Sample {
        let engine = EngineMetric {
            engine_type: EngineType::Compute,
            on_subdevice: false,
            subdevice_id: 0,
            active_time: active,
            timestamp: hw_ts,
        };
        let mut devices = BTreeMap::new();
        let _ = devices.insert(
            0,
            DeviceMetric {
                engines: [(0x10, engine)].into_iter().collect(),
                ..DeviceMetric::default()
            },
        );
        Sample::new(ts, devices)
    }

    #[test]
    fn half_busy_engine_reports_half_utilization() {
        let overlay =
            derive_engine_utilization(&engine_sample(1000, 0, 0), &engine_sample(2000, 500, 1000), 100);
        assert_eq!(overlay[&0].handles[&0x10], 5_000);
        assert_eq!(overlay[&0].scale, Some(100));
    }

    #[test]
    fn utilization_clamps_at_one_hundred_percent() {
        let overlay =
            derive_engine_utilization(&engine_sample(1000, 0, 0), &engine_sample(2000, 2_000, 1_000), 100);
        assert_eq!(overlay[&0].handles[&0x10], 10_000);
    }

    #[test]
    fn new_handle_contributes_nothing_this_tick() {
        let empty = Sample::new(1000, BTreeMap::new());
        let overlay = derive_engine_utilization(&empty, &engine_sample(2000, 100, 100), 100);
        assert!(overlay.is_empty());
    }
}
