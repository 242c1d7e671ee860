// Copyright The XPU Manager Authors
// SPDX-License-Identifier: MIT

//! Wire-level shapes returned by the query facade.
//!
//! These are the records the RPC layer serializes; absent values are
//! omitted rather than transmitted as sentinels.

use serde::{Deserialize, Serialize};
use xpum_metrics::{DeviceId, EngineType, FabricThroughputKind, MetricFamily, TileId, Timestamp};

/// One latest-value data point of one family.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricEntry {
    /// Family of the data point.
    pub family: MetricFamily,
    /// Whether the family has counter semantics.
    pub is_counter: bool,
    /// Transmitted value; divide by `scale` for natural units.
    pub value: u64,
    /// Wall-clock timestamp of the tick the value came from.
    pub timestamp: Timestamp,
    /// Power-of-ten divisor of `value`.
    pub scale: u64,
}

/// Latest values of one device or one tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceMetricsRow {
    /// Device the row belongs to.
    pub device_id: DeviceId,
    /// Tile the row belongs to; `None` for the whole-device row.
    pub tile_id: Option<TileId>,
    /// One entry per family with data.
    pub data: Vec<MetricEntry>,
}

/// One statistics data point of one family.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatsEntry {
    /// Family of the data point.
    pub family: MetricFamily,
    /// Whether the family has counter semantics.
    pub is_counter: bool,
    /// Power-of-ten divisor of the transmitted values.
    pub scale: u64,
    /// Ticks folded into the reported window.
    pub count: u64,
    /// Latest value; for counters, the delta accumulated over the
    /// window.
    pub value: u64,
    /// Smallest value of the window; zero for counters.
    pub min: u64,
    /// Largest value of the window; zero for counters.
    pub max: u64,
    /// Mean value of the window; zero for counters.
    pub avg: f64,
    /// Accumulated total for counter families.
    pub accumulated: Option<u64>,
}

/// Statistics of one device or one tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatsRow {
    /// Device the row belongs to.
    pub device_id: DeviceId,
    /// Tile the row belongs to; `None` for the whole-device row.
    pub tile_id: Option<TileId>,
    /// One entry per family with data.
    pub data: Vec<StatsEntry>,
}

/// Result of a device-statistics query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    /// Start of the reported half-open window.
    pub begin: Timestamp,
    /// End of the reported window ("now").
    pub end: Timestamp,
    /// Whole-device row followed by one row per tile.
    pub rows: Vec<DeviceStatsRow>,
}

/// Statistics of one engine over the reported window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineStatsRow {
    /// Device the engine belongs to.
    pub device_id: DeviceId,
    /// Public engine index.
    pub engine_index: u32,
    /// Engine type.
    pub engine_type: EngineType,
    /// Tile the engine lives on, if tile-scoped.
    pub tile_id: Option<TileId>,
    /// Power-of-ten divisor of the transmitted values.
    pub scale: u64,
    /// Latest utilization value.
    pub value: u64,
    /// Smallest utilization of the window.
    pub min: u64,
    /// Largest utilization of the window.
    pub max: u64,
    /// Mean utilization of the window.
    pub avg: f64,
    /// Ticks folded into the window.
    pub count: u64,
}

/// Result of an engine-statistics query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatsReport {
    /// Start of the reported half-open window.
    pub begin: Timestamp,
    /// End of the reported window ("now").
    pub end: Timestamp,
    /// One row per publicly mapped engine.
    pub rows: Vec<EngineStatsRow>,
}

/// Latest utilization of one engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineMetricRow {
    /// Device the engine belongs to.
    pub device_id: DeviceId,
    /// Public engine index.
    pub engine_index: u32,
    /// Engine type.
    pub engine_type: EngineType,
    /// Tile the engine lives on, if tile-scoped.
    pub tile_id: Option<TileId>,
    /// Power-of-ten divisor of `value`.
    pub scale: u64,
    /// Latest utilization value.
    pub value: u64,
}

/// Statistics of one direction of one fabric link.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FabricStatsRow {
    /// Local device.
    pub device_id: DeviceId,
    /// Local attach point (tile).
    pub tile_id: TileId,
    /// Remote device resolved from the fabric id.
    pub remote_device_id: DeviceId,
    /// Remote attach point (tile).
    pub remote_tile_id: TileId,
    /// Which per-link signal the row carries.
    pub kind: FabricThroughputKind,
    /// Power-of-ten divisor of the transmitted values; 1 for counters.
    pub scale: u64,
    /// Latest value; for counter kinds, the delta accumulated over the
    /// window.
    pub value: u64,
    /// Smallest value of the window; zero for counter kinds.
    pub min: u64,
    /// Largest value of the window; zero for counter kinds.
    pub max: u64,
    /// Mean value of the window; zero for counter kinds.
    pub avg: f64,
    /// Accumulated total for counter kinds.
    pub accumulated: Option<u64>,
    /// Ticks folded into the window.
    pub count: u64,
}

/// Result of a fabric-statistics query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FabricStatsReport {
    /// Start of the reported half-open window.
    pub begin: Timestamp,
    /// End of the reported window ("now").
    pub end: Timestamp,
    /// One row per link direction.
    pub rows: Vec<FabricStatsRow>,
}

/// Latest value of one direction of one fabric link.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FabricMetricRow {
    /// Local device.
    pub device_id: DeviceId,
    /// Local attach point (tile).
    pub tile_id: TileId,
    /// Remote device resolved from the fabric id.
    pub remote_device_id: DeviceId,
    /// Remote attach point (tile).
    pub remote_tile_id: TileId,
    /// Which per-link signal the row carries.
    pub kind: FabricThroughputKind,
    /// Power-of-ten divisor of `value`; 1 for counters.
    pub scale: u64,
    /// Latest value.
    pub value: u64,
}

/// One fabric link of a device with its remote end resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FabricLinkRow {
    /// Local attach point (tile).
    pub tile_id: TileId,
    /// Remote device resolved from the fabric id.
    pub remote_device_id: DeviceId,
    /// Remote attach point (tile).
    pub remote_tile_id: TileId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn stats_entries_serialize_for_the_rpc_layer() {
        let entry = StatsEntry {
            family: MetricFamily::Temperature,
            is_counter: false,
            scale: 1,
            count: 3,
            value: 60,
            min: 40,
            max: 60,
            avg: 50.0,
            accumulated: None,
        };
        let json = serde_json::to_string(&entry).expect("serialize");
        let back: StatsEntry = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, entry);
        assert!(json.contains("\"family\":\"Temperature\""));
    }

    #[test]
    fn fabric_rows_carry_their_link_kind() {
        let row = FabricStatsRow {
            device_id: 0,
            tile_id: 1,
            remote_device_id: 2,
            remote_tile_id: 0,
            kind: FabricThroughputKind::ReceivedCounter,
            scale: 1,
            value: 10,
            min: 0,
            max: 0,
            avg: 0.0,
            accumulated: Some(10),
            count: 1,
        };
        let json = serde_json::to_string(&row).expect("serialize");
        assert!(json.contains("\"kind\":\"ReceivedCounter\""));
    }
}
