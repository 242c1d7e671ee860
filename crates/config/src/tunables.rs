// Copyright The XPU Manager Authors
// SPDX-License-Identifier: MIT

//! Numeric limits of the data-logic pipeline.

use serde::{Deserialize, Serialize};

/// Limits and scale factors applied across the pipeline.
///
/// Production uses [`Tunables::default`]; tests shrink individual limits
/// to keep scenarios small.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tunables {
    /// Number of independent statistics sessions kept per family.
    pub max_statistics_sessions: u64,
    /// Age limit in milliseconds for the trailing-average window.
    pub data_handler_cache_time_limit_ms: u64,
    /// Maximum number of raw-data collection tasks.
    pub raw_data_collection_task_max: usize,
    /// Row cap per (task, family) raw-data cache; reaching it stops the
    /// task.
    pub cache_size_limit: usize,
    /// Power-of-ten divisor applied to transmitted measurement values.
    pub measurement_data_scale: u64,
    /// Interval in milliseconds between dump-file rows.
    pub dump_interval_ms: u64,
}

impl Default for Tunables {
    fn default() -> Self {
        Tunables {
            max_statistics_sessions: 4,
            data_handler_cache_time_limit_ms: 60_000,
            raw_data_collection_task_max: 16,
            cache_size_limit: 8_192,
            measurement_data_scale: 100,
            dump_interval_ms: 1_000,
        }
    }
}

impl Tunables {
    /// Largest value a utilization family may report:
    /// 100 percent at the transmitted scale.
    #[must_use]
    pub fn utilization_cap(&self) -> u64 {
        self.measurement_data_scale * 100
    }
}
