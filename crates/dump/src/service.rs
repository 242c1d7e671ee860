// Copyright The XPU Manager Authors
// SPDX-License-Identifier: MIT

//! Dump-task lifecycle and the worker that appends rows.

use crate::error::Error;
use crate::format;
use crate::task::{DumpOptions, DumpTask};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};
use xpum_config::Tunables;
use xpum_data_logic::{DataLogic, DeviceInventory, now_ms};
use xpum_metrics::{DeviceId, Fanout, MetricFamily, TileId};

struct ActiveTask {
    task: DumpTask,
    options: DumpOptions,
    writer: BufWriter<File>,
}

#[derive(Default)]
struct ServiceState {
    tasks: HashMap<u32, ActiveTask>,
    next_id: u32,
}

/// Long-running facility appending CSV rows from the latest-metrics
/// surface.
pub struct DumpService {
    logic: Arc<DataLogic>,
    inventory: Arc<dyn DeviceInventory>,
    interval: Duration,
    state: Mutex<ServiceState>,
}

impl DumpService {
    /// Creates the service; the worker is spawned separately with
    /// [`DumpService::spawn_worker`].
    #[must_use]
    pub fn new(
        logic: Arc<DataLogic>,
        inventory: Arc<dyn DeviceInventory>,
        tunables: &Tunables,
    ) -> Self {
        DumpService {
            logic,
            inventory,
            interval: Duration::from_millis(tunables.dump_interval_ms),
            state: Mutex::new(ServiceState::default()),
        }
    }

    /// Opens the dump file, writes the header row and registers the
    /// task.
    ///
    /// Families without a scalar surface are dropped from the column
    /// list; per-engine and fabric data have their own query calls.
    pub fn start_task(
        &self,
        device: DeviceId,
        tile: Option<TileId>,
        families: &[MetricFamily],
        path: &Path,
        options: DumpOptions,
    ) -> Result<DumpTask, Error> {
        if !self.inventory.contains(device) {
            return Err(Error::DeviceNotFound { device });
        }
        if let Some(tile) = tile {
            if tile >= self.inventory.tile_count(device) {
                return Err(Error::TileNotFound { device, tile });
            }
        }
        let families: Vec<MetricFamily> = families
            .iter()
            .copied()
            .filter(|family| {
                let scalar = family.fanout() == Fanout::Scalar;
                if !scalar {
                    debug!(?family, "dropping fan-out family from dump columns");
                }
                scalar
            })
            .collect();

        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "{}", format::header(&families, tile.is_some()))?;
        writer.flush()?;

        let mut state = self.state.lock();
        let task_id = state.next_id;
        state.next_id += 1;
        let task = DumpTask {
            task_id,
            device_id: device,
            tile_id: tile,
            families,
            begin_time: now_ms(),
            file_path: path.to_path_buf(),
        };
        info!(task_id, device, ?tile, path = %path.display(), "started dump task");
        let _ = state.tasks.insert(
            task_id,
            ActiveTask {
                task: task.clone(),
                options,
                writer,
            },
        );
        Ok(task)
    }

    /// Flushes, closes and unregisters a task.
    pub fn stop_task(&self, task_id: u32) -> Result<DumpTask, Error> {
        let mut state = self.state.lock();
        let mut active = state
            .tasks
            .remove(&task_id)
            .ok_or(Error::TaskNotFound { task_id })?;
        active.writer.flush()?;
        info!(task_id, "stopped dump task");
        Ok(active.task)
    }

    /// Descriptors of the active tasks.
    #[must_use]
    pub fn list_tasks(&self) -> Vec<DumpTask> {
        let state = self.state.lock();
        let mut tasks: Vec<DumpTask> = state.tasks.values().map(|a| a.task.clone()).collect();
        tasks.sort_by_key(|task| task.task_id);
        tasks
    }

    /// Appends one row per active task from the latest metrics.
    pub fn run_once(&self) {
        let mut state = self.state.lock();
        let now = now_ms();
        for active in state.tasks.values_mut() {
            let rows = match self.logic.get_latest_metrics(active.task.device_id) {
                Ok(rows) => rows,
                Err(error) => {
                    debug!(%error, task_id = active.task.task_id, "skipping dump row");
                    continue;
                }
            };
            let Some(row) = rows.iter().find(|row| row.tile_id == active.task.tile_id) else {
                continue;
            };

            let mut columns = vec![
                format::timestamp(now, active.options.show_date),
                active.task.device_id.to_string(),
            ];
            if let Some(tile) = active.task.tile_id {
                columns.push(tile.to_string());
            }
            for family in &active.task.families {
                let entry = row.data.iter().find(|entry| entry.family == *family);
                columns.push(format::value(
                    entry.map(|e| e.value),
                    entry.map_or(1, |e| e.scale),
                ));
            }
            if let Err(error) = writeln!(active.writer, "{}", columns.join(", "))
                .and_then(|()| active.writer.flush())
            {
                warn!(%error, task_id = active.task.task_id, "dump row write failed");
            }
        }
    }

    /// Spawns the worker thread that appends rows once per sampling
    /// interval until the handle is shut down.
    pub fn spawn_worker(self: &Arc<Self>) -> Result<WorkerHandle, Error> {
        let stop = Arc::new(AtomicBool::new(false));
        let service = Arc::clone(self);
        let flag = Arc::clone(&stop);
        let interval = self.interval;
        let handle = thread::Builder::new()
            .name("xpum-dump".to_owned())
            .spawn(move || {
                while !flag.load(Ordering::Relaxed) {
                    thread::sleep(interval);
                    if flag.load(Ordering::Relaxed) {
                        break;
                    }
                    service.run_once();
                }
            })?;
        Ok(WorkerHandle {
            stop,
            handle: Some(handle),
        })
    }
}

/// Cooperative stop handle of the dump worker thread.
pub struct WorkerHandle {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Signals the worker to stop and waits for it to exit.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("dump worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
