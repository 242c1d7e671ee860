// Copyright The XPU Manager Authors
// SPDX-License-Identifier: MIT

//! Dump-task descriptors.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use xpum_metrics::{DeviceId, MetricFamily, TileId, Timestamp};

/// Formatting options of a dump task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpOptions {
    /// Emit the timestamp column as ISO-8601 local time instead of
    /// epoch milliseconds.
    pub show_date: bool,
}

/// Externally visible descriptor of a dump task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpTask {
    /// Task id.
    pub task_id: u32,
    /// Device the task dumps.
    pub device_id: DeviceId,
    /// Tile the task dumps; `None` dumps the whole-device row.
    pub tile_id: Option<TileId>,
    /// Families selected as CSV columns, in column order.
    pub families: Vec<MetricFamily>,
    /// Wall-clock start time.
    pub begin_time: Timestamp,
    /// Path of the file being written.
    pub file_path: PathBuf,
}
