// Copyright The XPU Manager Authors
// SPDX-License-Identifier: MIT

//! Metric-family taxonomy and measurement data model.
//!
//! Data Model:
//! - metric family
//!   - sample (one polling tick, all devices)
//!     - device metric
//!       - whole-device scalar / raw counter
//!       - sub-device scalars / raw counters
//!       - engine, fabric-port and engine-group fan-out records
//!
//! A sample is immutable after publication and shared behind an `Arc`
//! between the handler layer, the trailing-average window and the
//! raw-trace caches. Values derived from consecutive samples (rates,
//! utilizations) are kept by the handlers, never written back into a
//! published sample.

pub mod family;
pub mod sample;
pub mod stats;

pub use family::{EngineGroup, EngineType, FabricThroughputKind, Fanout, MetricFamily};
pub use sample::{
    DeviceMetric, EngineMetric, GroupActivity, PortMetric, RawCounter, Sample, SubdeviceMetric,
};
pub use stats::RollingStats;

/// Identifier of a whole GPU package.
pub type DeviceId = u32;

/// Identifier of a GPU tile within a multi-tile package.
pub type TileId = u32;

/// Opaque per-engine, per-fabric-port or synthetic fan-out identifier.
pub type HandleId = u64;

/// Wall-clock or hardware timestamp in milliseconds / device units.
pub type Timestamp = u64;
