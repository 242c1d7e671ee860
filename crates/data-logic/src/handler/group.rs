// Copyright The XPU Manager Authors
// SPDX-License-Identifier: MIT

//! Engine-group and GPU utilization derivation.
//!
//! The math matches the per-engine handler, but the input is the group
//! activity records and the result lands as a whole-device or per-tile
//! scalar depending on where the group lives. The GPU-utilization family
//! is the same computation restricted to the all-engines group.

use crate::handler::DerivedDevice;
use crate::handler::engine::utilization;
use std::collections::HashMap;
use xpum_metrics::{DeviceId, EngineGroup, Sample};

pub(crate) fn derive_group_utilization(
    previous: &Sample,
    latest: &Sample,
    group: EngineGroup,
    scale: u64,
) -> HashMap<DeviceId, DerivedDevice> {
    let cap = scale * 100;
    let mut overlay = HashMap::new();
    for (device, metric) in &latest.devices {
        let Some(prev_metric) = previous.device(*device) else {
            continue;
        };
        let mut derived = DerivedDevice::default();
        for (handle, activity) in &metric.activities {
            if activity.group != group {
                continue;
            }
            let Some(prev_activity) = prev_metric.activities.get(handle) else {
                continue;
            };
            let Some(util) = utilization(
                prev_activity.active_time,
                activity.active_time,
                prev_activity.timestamp,
                activity.timestamp,
                cap,
            ) else {
                continue;
            };
            derived.scale = Some(scale);
            if activity.on_subdevice {
                let _ = derived.subdevices.insert(activity.subdevice_id, util);
            } else {
                derived.current = Some(util);
            }
        }
        if derived.scale.is_some() {
            let _ = overlay.insert(*device, derived);
        }
    }
    overlay
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use xpum_metrics::{DeviceMetric, GroupActivity};

    fn group_sample(ts: u64, records: &[(u64, GroupActivity)]) -> Sample {
        let mut devices = BTreeMap::new();
        let _ = devices.insert(
            0,
            DeviceMetric {
                activities: records.iter().copied().collect(),
                ..DeviceMetric::default()
            },
        );
        Sample::new(ts, devices)
    }

    fn activity(group: EngineGroup, on_tile: Option<u32>, active: u64, hw_ts: u64) -> GroupActivity {
        GroupActivity {
            group,
            on_subdevice: on_tile.is_some(),
            subdevice_id: on_tile.unwrap_or(0),
            active_time: active,
            timestamp: hw_ts,
        }
    }

    #[test]
    fn group_result_lands_where_the_group_lives() {
        let previous = group_sample(
            1000,
            &[
                (1, activity(EngineGroup::ComputeAll, None, 0, 0)),
                (2, activity(EngineGroup::ComputeAll, Some(1), 0, 0)),
                (3, activity(EngineGroup::MediaAll, None, 0, 0)),
            ],
        );
        let latest = group_sample(
            2000,
            &[
                (1, activity(EngineGroup::ComputeAll, None, 250, 1000)),
                (2, activity(EngineGroup::ComputeAll, Some(1), 750, 1000)),
                (3, activity(EngineGroup::MediaAll, None, 1000, 1000)),
            ],
        );

        let overlay =
            derive_group_utilization(&previous, &latest, EngineGroup::ComputeAll, 100);
        let derived = &overlay[&0];
        assert_eq!(derived.current, Some(2_500));
        assert_eq!(derived.subdevices.get(&1), Some(&7_500));
        // The media group is someone else's family.
        assert_eq!(derived.subdevices.len(), 1);
    }

    #[test]
    fn identical_hardware_timestamps_are_skipped() {
        let previous = group_sample(1000, &[(1, activity(EngineGroup::All, None, 0, 500))]);
        let latest = group_sample(2000, &[(1, activity(EngineGroup::All, None, 900, 500))]);
        let overlay = derive_group_utilization(&previous, &latest, EngineGroup::All, 100);
        assert!(overlay.is_empty());
    }
}
