// Copyright The XPU Manager Authors
// SPDX-License-Identifier: MIT

//! Immutable per-tick measurement records.

use crate::family::{EngineGroup, EngineType};
use crate::{DeviceId, HandleId, TileId, Timestamp};
use std::collections::BTreeMap;

/// In-band sentinel meaning "no sample" on wire shapes that cannot carry
/// an optional value.
pub const ABSENT: u64 = u64::MAX;

/// Converts an optional value to the on-wire sentinel encoding.
#[must_use]
pub fn to_wire(value: Option<u64>) -> u64 {
    value.unwrap_or(ABSENT)
}

/// Converts an on-wire value back to an optional, mapping the sentinel to
/// `None`.
#[must_use]
pub fn from_wire(value: u64) -> Option<u64> {
    (value != ABSENT).then_some(value)
}

/// A raw monotonic counter paired with its device-supplied timestamp.
///
/// The timestamp is in device units and is distinct from the wall-clock
/// tick timestamp carried by the enclosing [`Sample`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawCounter {
    /// Accumulated counter value.
    pub value: u64,
    /// Device-supplied timestamp of the counter read.
    pub timestamp: Timestamp,
}

/// Scalar measurement of one sub-device (tile).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubdeviceMetric {
    /// Instantaneous value, if the tile produced one this tick.
    pub current: Option<u64>,
    /// Raw counter backing a derived rate, if any.
    pub raw: Option<RawCounter>,
}

/// Raw activity counters of one engine handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineMetric {
    /// Engine type reported by the device runtime.
    pub engine_type: EngineType,
    /// Whether the engine belongs to a specific tile.
    pub on_subdevice: bool,
    /// Tile the engine belongs to; meaningful when `on_subdevice`.
    pub subdevice_id: TileId,
    /// Monotonic active time in device units.
    pub active_time: u64,
    /// Device-supplied timestamp of the activity read.
    pub timestamp: Timestamp,
}

/// Raw rx/tx counters of one fabric-port handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMetric {
    /// Accumulated received bytes.
    pub rx_counter: u64,
    /// Accumulated transmitted bytes.
    pub tx_counter: u64,
    /// Device-supplied timestamp of the counter read.
    pub timestamp: Timestamp,
    /// Local attach point (tile) of the port.
    pub attach_id: TileId,
    /// Fabric id of the remote device the port connects to.
    pub remote_fabric_id: u32,
    /// Attach point (tile) on the remote device.
    pub remote_attach_id: TileId,
}

/// Activity counters of one engine group, used by the group- and
/// GPU-utilization math.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupActivity {
    /// Which engine group the record covers.
    pub group: EngineGroup,
    /// Whether the group is scoped to a single tile.
    pub on_subdevice: bool,
    /// Tile the group belongs to; meaningful when `on_subdevice`.
    pub subdevice_id: TileId,
    /// Monotonic active time in device units.
    pub active_time: u64,
    /// Device-supplied timestamp of the activity read.
    pub timestamp: Timestamp,
}

/// All values one device reported for one family at one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceMetric {
    /// Power-of-ten divisor the consumer applies to transmitted values.
    /// Carried with the data, not the family declaration; handlers
    /// override it when they derive scaled values.
    pub scale: u64,
    /// Whole-device instantaneous value.
    pub current: Option<u64>,
    /// Whole-device raw counter backing a derived rate.
    pub raw: Option<RawCounter>,
    /// Per-tile scalar values.
    pub subdevices: BTreeMap<TileId, SubdeviceMetric>,
    /// Per-engine activity records (engine-utilization family).
    pub engines: BTreeMap<HandleId, EngineMetric>,
    /// Per-fabric-port counter records (fabric-throughput family).
    pub ports: BTreeMap<HandleId, PortMetric>,
    /// Engine-group activity records (group/GPU-utilization families).
    pub activities: BTreeMap<HandleId, GroupActivity>,
    /// Per-handle scalar values reported directly by the probe for
    /// collection families.
    pub handles: BTreeMap<HandleId, u64>,
}

impl Default for DeviceMetric {
    fn default() -> Self {
        DeviceMetric {
            scale: 1,
            current: None,
            raw: None,
            subdevices: BTreeMap::new(),
            engines: BTreeMap::new(),
            ports: BTreeMap::new(),
            activities: BTreeMap::new(),
            handles: BTreeMap::new(),
        }
    }
}

impl DeviceMetric {
    /// A metric carrying a single whole-device value.
    #[must_use]
    pub fn scalar(current: u64) -> Self {
        DeviceMetric {
            current: Some(current),
            ..DeviceMetric::default()
        }
    }

    /// A metric carrying a whole-device raw counter.
    #[must_use]
    pub fn raw_counter(value: u64, timestamp: Timestamp) -> Self {
        DeviceMetric {
            raw: Some(RawCounter { value, timestamp }),
            ..DeviceMetric::default()
        }
    }

    /// Whether the device reported a whole-device value this tick.
    #[must_use]
    pub fn has_data_on_device(&self) -> bool {
        self.current.is_some()
    }
}

/// Immutable snapshot of one metric family across all devices for one
/// polling tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sample {
    /// Wall-clock tick timestamp in milliseconds.
    pub ts_ms: Timestamp,
    /// Per-device measurements; a device missing here simply produced no
    /// sample this tick.
    pub devices: BTreeMap<DeviceId, DeviceMetric>,
}

impl Sample {
    /// Creates a sample for one tick.
    #[must_use]
    pub fn new(ts_ms: Timestamp, devices: BTreeMap<DeviceId, DeviceMetric>) -> Self {
        Sample { ts_ms, devices }
    }

    /// Looks up the measurement of one device.
    #[must_use]
    pub fn device(&self, device: DeviceId) -> Option<&DeviceMetric> {
        self.devices.get(&device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn wire_sentinel_round_trip() {
        assert_eq!(to_wire(Some(42)), 42);
        assert_eq!(to_wire(None), ABSENT);
        assert_eq!(from_wire(42), Some(42));
        assert_eq!(from_wire(ABSENT), None);
    }

    #[test]
    fn scalar_constructor_marks_device_data() {
        assert!(DeviceMetric::scalar(7).has_data_on_device());
        assert!(!DeviceMetric::raw_counter(7, 1).has_data_on_device());
    }
}
