// Copyright The XPU Manager Authors
// SPDX-License-Identifier: MIT

//! Bounded per-task caches of raw samples.
//!
//! A client starts a collection task for one device and a family list;
//! every stored sample then appends one row per (device, tile) value to
//! the task's per-family cache. A cache reaching its row cap stops the
//! task; rows survive until the slot is recycled by a later task.

use crate::error::Error;
use crate::handler::MetricSnapshot;
use crate::now_ms;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::info;
use xpum_config::Tunables;
use xpum_metrics::{DeviceId, MetricFamily, TileId, Timestamp};

/// One cached raw-sample value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRow {
    /// Device the value belongs to.
    pub device_id: DeviceId,
    /// Family the value belongs to.
    pub family: MetricFamily,
    /// Wall-clock timestamp of the tick.
    pub timestamp: Timestamp,
    /// Composed value of the tick.
    pub value: u64,
    /// Whether the row carries a tile value.
    pub is_subdevice: bool,
    /// Tile id; meaningful when `is_subdevice`.
    pub subdevice_id: TileId,
}

/// Externally visible descriptor of a collection task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceTaskInfo {
    /// Slot id of the task.
    pub task_id: u32,
    /// Device the task collects for.
    pub device_id: DeviceId,
    /// Families the task collects.
    pub families: Vec<MetricFamily>,
    /// Whether the task still accepts rows.
    pub running: bool,
    /// Wall-clock start time.
    pub start_time: Timestamp,
    /// Wall-clock stop time, once stopped.
    pub stop_time: Option<Timestamp>,
}

#[derive(Debug)]
struct TaskState {
    info: TraceTaskInfo,
    rows: HashMap<MetricFamily, VecDeque<TraceRow>>,
}

/// Bounded set of raw-data collection tasks.
#[derive(Debug)]
pub struct RawTraceManager {
    max_tasks: usize,
    cache_limit: usize,
    tasks: Mutex<VecDeque<TaskState>>,
}

impl RawTraceManager {
    /// Creates an empty manager with the configured bounds.
    #[must_use]
    pub fn new(tunables: &Tunables) -> Self {
        RawTraceManager {
            max_tasks: tunables.raw_data_collection_task_max,
            cache_limit: tunables.cache_size_limit,
            tasks: Mutex::new(VecDeque::new()),
        }
    }

    /// Starts a collection task and returns its slot id.
    ///
    /// When every slot is occupied the oldest stopped task is evicted
    /// and its slot reused; with only running tasks left the start is
    /// refused.
    pub fn start(&self, device: DeviceId, families: Vec<MetricFamily>) -> Result<u32, Error> {
        let mut tasks = self.tasks.lock();
        let task_id = if tasks.len() < self.max_tasks {
            tasks.len() as u32
        } else {
            let evicted = tasks
                .iter()
                .position(|task| !task.info.running)
                .ok_or(Error::TooManyTraceTasks {
                    max: self.max_tasks,
                })?;
            let slot = tasks
                .remove(evicted)
                .map(|task| task.info.task_id)
                .unwrap_or_default();
            slot
        };
        info!(task_id, device, ?families, "starting raw-data collection task");
        tasks.push_back(TaskState {
            info: TraceTaskInfo {
                task_id,
                device_id: device,
                families,
                running: true,
                start_time: now_ms(),
                stop_time: None,
            },
            rows: HashMap::new(),
        });
        Ok(task_id)
    }

    /// Stops a running task, keeping its rows readable.
    pub fn stop(&self, task_id: u32) -> Result<(), Error> {
        let mut tasks = self.tasks.lock();
        let task = tasks
            .iter_mut()
            .find(|task| task.info.task_id == task_id)
            .ok_or(Error::TraceTaskNotFound { task_id })?;
        if task.info.running {
            task.info.running = false;
            task.info.stop_time = Some(now_ms());
            info!(task_id, "stopped raw-data collection task");
        }
        Ok(())
    }

    /// Descriptor of one task.
    #[must_use]
    pub fn task(&self, task_id: u32) -> Option<TraceTaskInfo> {
        let tasks = self.tasks.lock();
        tasks
            .iter()
            .find(|task| task.info.task_id == task_id)
            .map(|task| task.info.clone())
    }

    /// Descriptors of every known task.
    #[must_use]
    pub fn tasks(&self) -> Vec<TraceTaskInfo> {
        let tasks = self.tasks.lock();
        tasks.iter().map(|task| task.info.clone()).collect()
    }

    /// Cached rows of one (task, family).
    #[must_use]
    pub fn cached_rows(&self, task_id: u32, family: MetricFamily) -> Vec<TraceRow> {
        let tasks = self.tasks.lock();
        tasks
            .iter()
            .find(|task| task.info.task_id == task_id)
            .and_then(|task| task.rows.get(&family))
            .map(|rows| rows.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Cached rows of every family of a stopped task, in family order.
    #[must_use]
    pub fn cached_all(&self, task_id: u32) -> Vec<Vec<TraceRow>> {
        let families = {
            let tasks = self.tasks.lock();
            tasks
                .iter()
                .find(|task| task.info.task_id == task_id && !task.info.running)
                .map(|task| task.info.families.clone())
                .unwrap_or_default()
        };
        families
            .into_iter()
            .map(|family| self.cached_rows(task_id, family))
            .collect()
    }

    /// Feeds one handled tick into every matching running task.
    pub fn record(&self, family: MetricFamily, ts: Timestamp, snapshots: &[MetricSnapshot]) {
        let mut tasks = self.tasks.lock();
        for task in tasks.iter_mut() {
            if !task.info.running || !task.info.families.contains(&family) {
                continue;
            }
            let Some(snapshot) = snapshots.iter().find(|s| s.device() == task.info.device_id)
            else {
                continue;
            };
            let rows = task.rows.entry(family).or_default();
            let mut full = rows.len() >= self.cache_limit;
            if !full {
                if let Some(value) = snapshot.current() {
                    rows.push_back(TraceRow {
                        device_id: task.info.device_id,
                        family,
                        timestamp: ts,
                        value,
                        is_subdevice: false,
                        subdevice_id: 0,
                    });
                    full = rows.len() >= self.cache_limit;
                }
            }
            if !full {
                for (tile, value) in snapshot.subdevice_values() {
                    rows.push_back(TraceRow {
                        device_id: task.info.device_id,
                        family,
                        timestamp: ts,
                        value,
                        is_subdevice: true,
                        subdevice_id: tile,
                    });
                    if rows.len() >= self.cache_limit {
                        full = true;
                        break;
                    }
                }
            }
            if full {
                task.info.running = false;
                task.info.stop_time = Some(now_ms());
                info!(
                    task_id = task.info.task_id,
                    ?family,
                    "raw-data cache full, stopping collection task"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{DataHandler, HandlerKind};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use xpum_metrics::{DeviceMetric, Sample};

    fn small_manager(max_tasks: usize, cache_limit: usize) -> RawTraceManager {
        RawTraceManager::new(&Tunables {
            raw_data_collection_task_max: max_tasks,
            cache_size_limit: cache_limit,
            ..Tunables::default()
        })
    }

    #[test]
    fn full_slots_refuse_until_a_task_stops() {
        let manager = small_manager(2, 100);
        let first = manager.start(0, vec![MetricFamily::Temperature]).expect("first");
        let _second = manager.start(0, vec![MetricFamily::Power]).expect("second");

        let error = manager
            .start(0, vec![MetricFamily::Frequency])
            .expect_err("all slots running");
        assert!(matches!(error, Error::TooManyTraceTasks { max: 2 }));

        manager.stop(first).expect("stop");
        let reused = manager
            .start(1, vec![MetricFamily::Frequency])
            .expect("slot recycled");
        assert_eq!(reused, first);
        // The recycled slot starts with an empty cache.
        assert!(manager.cached_rows(reused, MetricFamily::Temperature).is_empty());
    }

    #[test]
    fn stopping_an_unknown_task_is_an_error() {
        let manager = small_manager(2, 100);
        assert!(matches!(
            manager.stop(7),
            Err(Error::TraceTaskNotFound { task_id: 7 })
        ));
    }

    #[test]
    fn rows_are_capped_and_cap_stops_the_task() {
        let manager = small_manager(2, 3);
        let handler = DataHandler::new(
            MetricFamily::Temperature,
            HandlerKind::Stats,
            &Tunables::default(),
        );
        let task_id = manager.start(0, vec![MetricFamily::Temperature]).expect("task");

        for tick in 0..5u64 {
            let mut devices = BTreeMap::new();
            let _ = devices.insert(0, DeviceMetric::scalar(40 + tick));
            let sample = Arc::new(Sample::new(1000 + tick, devices));
            handler.pre_handle(&sample);
            handler.handle(&sample);
            manager.record(MetricFamily::Temperature, sample.ts_ms, &handler.latest_all());
        }

        let rows = manager.cached_rows(task_id, MetricFamily::Temperature);
        assert_eq!(rows.len(), 3);
        let task = manager.task(task_id).expect("task");
        assert!(!task.running);
        assert!(task.stop_time.is_some());
    }
}
