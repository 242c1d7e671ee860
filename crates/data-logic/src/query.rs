// Copyright The XPU Manager Authors
// SPDX-License-Identifier: MIT

//! The query facade consumed by the RPC layer.
//!
//! Every operation validates the device first, then applies the
//! process-wide enabled set and the per-device capability set, and
//! finally reads the family handlers. Statistics queries exchange the
//! per-(session, device) timestamp so the caller learns the half-open
//! window `(begin, now]` its numbers cover.

use crate::device::DeviceInventory;
use crate::error::Error;
use crate::handler::{DataHandler, FabricLinkKey, MetricSnapshot, StatsSnapshot};
use crate::now_ms;
use crate::registry::DataHandlerManager;
use crate::trace::TraceRow;
use crate::types::{
    DeviceMetricsRow, DeviceStatsRow, EngineMetricRow, EngineStatsReport, EngineStatsRow,
    FabricLinkRow, FabricMetricRow, FabricStatsReport, FabricStatsRow, MetricEntry, StatsEntry,
    StatsReport,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use xpum_config::Tunables;
use xpum_metrics::{
    DeviceId, DeviceMetric, FabricThroughputKind, MetricFamily, TileId, Timestamp,
};

/// The data-logic service: sample intake plus the query surface.
pub struct DataLogic {
    manager: DataHandlerManager,
    inventory: Arc<dyn DeviceInventory>,
    max_sessions: u64,
}

impl DataLogic {
    /// Wires the facade over a handler registry and a device inventory.
    #[must_use]
    pub fn new(
        manager: DataHandlerManager,
        inventory: Arc<dyn DeviceInventory>,
        tunables: &Tunables,
    ) -> Self {
        DataLogic {
            manager,
            inventory,
            max_sessions: tunables.max_statistics_sessions,
        }
    }

    /// The handler registry backing this facade.
    #[must_use]
    pub fn manager(&self) -> &DataHandlerManager {
        &self.manager
    }

    /// Accepts one tick of one family from the polling probe.
    pub fn store_sample(
        &self,
        family: MetricFamily,
        ts_ms: Timestamp,
        devices: BTreeMap<DeviceId, DeviceMetric>,
    ) {
        self.manager.store_sample(family, ts_ms, devices);
    }

    fn check_device(&self, device: DeviceId) -> Result<(), Error> {
        if self.inventory.contains(device) {
            Ok(())
        } else {
            Err(Error::DeviceNotFound { device })
        }
    }

    fn check_session(&self, session: u64) -> Result<(), Error> {
        if session < self.max_sessions {
            Ok(())
        } else {
            Err(Error::InvalidSession {
                session,
                max: self.max_sessions,
            })
        }
    }

    fn check_fanout_family(&self, device: DeviceId, family: MetricFamily) -> Result<(), Error> {
        if !self.manager.enabled().is_enabled(family) {
            return Err(Error::MetricNotEnabled { family });
        }
        if !self.inventory.supports(device, family) {
            return Err(Error::MetricNotSupported { family, device });
        }
        Ok(())
    }

    /// Enabled scalar families the device is capable of; the fan-out
    /// families have their own query calls.
    fn scalar_families(&self, device: DeviceId) -> Vec<MetricFamily> {
        self.manager
            .enabled()
            .families()
            .filter(|family| {
                !matches!(
                    family,
                    MetricFamily::EngineUtilization | MetricFamily::FabricThroughput
                )
            })
            .filter(|family| self.inventory.supports(device, *family))
            .collect()
    }

    fn handler(&self, family: MetricFamily) -> Option<&Arc<DataHandler>> {
        self.manager.handler(family)
    }

    /// Latest values of every enabled family: one whole-device row plus
    /// one row per tile.
    pub fn get_latest_metrics(&self, device: DeviceId) -> Result<Vec<DeviceMetricsRow>, Error> {
        self.check_device(device)?;
        let snapshots: Vec<MetricSnapshot> = self
            .scalar_families(device)
            .into_iter()
            .filter_map(|family| self.handler(family).and_then(|h| h.latest(device)))
            .collect();
        Ok(metric_rows(device, self.inventory.tile_count(device), &snapshots, None))
    }

    /// Latest values without session state, with the engine-group
    /// utilizations flattened into a derived GPU-utilization signal by
    /// taking the maximum across the groups present.
    pub fn get_realtime_metrics(&self, device: DeviceId) -> Result<Vec<DeviceMetricsRow>, Error> {
        self.check_device(device)?;
        let snapshots: Vec<MetricSnapshot> = self
            .scalar_families(device)
            .into_iter()
            .filter_map(|family| self.handler(family).and_then(|h| h.latest(device)))
            .collect();

        let mut gpu = GpuUtilizationMax::default();
        for snapshot in &snapshots {
            if snapshot.family().is_engine_group_utilization() {
                gpu.fold(snapshot);
            }
        }
        Ok(metric_rows(
            device,
            self.inventory.tile_count(device),
            &snapshots,
            gpu.into_override(),
        ))
    }

    /// Realtime metrics of several devices, concatenated.
    pub fn get_realtime_metrics_ex(
        &self,
        devices: &[DeviceId],
    ) -> Result<Vec<DeviceMetricsRow>, Error> {
        let mut rows = Vec::new();
        for device in devices {
            rows.extend(self.get_realtime_metrics(*device)?);
        }
        Ok(rows)
    }

    /// Rolling statistics of every enabled family since the session's
    /// previous read; reading resets the window.
    pub fn get_stats(&self, device: DeviceId, session: u64) -> Result<StatsReport, Error> {
        self.check_device(device)?;
        self.check_session(session)?;
        let snapshots: Vec<StatsSnapshot> = self
            .scalar_families(device)
            .into_iter()
            .filter_map(|family| {
                self.handler(family)
                    .and_then(|h| h.latest_stats(device, session))
            })
            .collect();
        let begin = self.manager.stats_sessions().exchange(session, device);
        let end = now_ms();

        let mut rows = Vec::new();
        let device_data: Vec<StatsEntry> = snapshots
            .iter()
            .filter_map(|snapshot| {
                let current = snapshot.current?;
                let stats = snapshot.stats.as_ref()?;
                Some(stats_entry(
                    snapshot.family,
                    snapshot.scale,
                    current,
                    stats.count,
                    stats.min,
                    stats.max,
                    stats.avg,
                ))
            })
            .collect();
        rows.push(DeviceStatsRow {
            device_id: device,
            tile_id: None,
            data: device_data,
        });

        for tile in 0..self.inventory.tile_count(device) {
            let data: Vec<StatsEntry> = snapshots
                .iter()
                .filter_map(|snapshot| {
                    let sub = snapshot.subdevices.get(&tile)?;
                    Some(stats_entry(
                        snapshot.family,
                        snapshot.scale,
                        sub.current,
                        sub.stats.count,
                        sub.stats.min,
                        sub.stats.max,
                        sub.stats.avg,
                    ))
                })
                .collect();
            rows.push(DeviceStatsRow {
                device_id: device,
                tile_id: Some(tile),
                data,
            });
        }
        Ok(StatsReport { begin, end, rows })
    }

    /// Per-engine utilization statistics since the session's previous
    /// read; reading resets the window.
    pub fn get_engine_stats(
        &self,
        device: DeviceId,
        session: u64,
    ) -> Result<EngineStatsReport, Error> {
        self.check_device(device)?;
        self.check_session(session)?;
        let begin = self.manager.engine_sessions().exchange(session, device);
        let end = now_ms();
        self.check_fanout_family(device, MetricFamily::EngineUtilization)?;

        let snapshot = self
            .handler(MetricFamily::EngineUtilization)
            .and_then(|h| h.latest_handle_stats(device, session));
        let Some(snapshot) = snapshot else {
            return Ok(EngineStatsReport {
                begin,
                end,
                rows: Vec::new(),
            });
        };
        if snapshot.timestamp < begin {
            // Nothing newer than the previous read: report stale as empty.
            return Ok(EngineStatsReport {
                begin,
                end,
                rows: Vec::new(),
            });
        }

        let mut rows = Vec::new();
        for (handle, stats) in &snapshot.handles {
            let Some((engine_index, fallback_type)) = self.inventory.engine_index(device, *handle)
            else {
                continue;
            };
            let engine = snapshot.engine(*handle);
            rows.push(EngineStatsRow {
                device_id: device,
                engine_index,
                engine_type: engine.map_or(fallback_type, |e| e.engine_type),
                tile_id: engine.and_then(|e| e.on_subdevice.then_some(e.subdevice_id)),
                scale: snapshot.scale,
                value: stats.current,
                min: stats.stats.min,
                max: stats.stats.max,
                avg: stats.stats.avg,
                count: stats.stats.count,
            });
        }
        Ok(EngineStatsReport { begin, end, rows })
    }

    /// Latest per-engine utilizations without touching session state.
    pub fn get_engine_utilizations(&self, device: DeviceId) -> Result<Vec<EngineMetricRow>, Error> {
        self.check_device(device)?;
        self.check_fanout_family(device, MetricFamily::EngineUtilization)?;
        let snapshot = self
            .handler(MetricFamily::EngineUtilization)
            .and_then(|h| h.latest(device));
        let Some(snapshot) = snapshot else {
            return Ok(Vec::new());
        };

        let mut rows = Vec::new();
        for (handle, value) in snapshot.handle_values() {
            let Some((engine_index, fallback_type)) = self.inventory.engine_index(device, handle)
            else {
                continue;
            };
            let engine = snapshot.engine(handle);
            rows.push(EngineMetricRow {
                device_id: device,
                engine_index,
                engine_type: engine.map_or(fallback_type, |e| e.engine_type),
                tile_id: engine.and_then(|e| e.on_subdevice.then_some(e.subdevice_id)),
                scale: snapshot.scale(),
                value,
            });
        }
        Ok(rows)
    }

    /// Per-link fabric throughput statistics since the session's
    /// previous read; reading resets the window.
    pub fn get_fabric_stats(
        &self,
        device: DeviceId,
        session: u64,
    ) -> Result<FabricStatsReport, Error> {
        self.check_device(device)?;
        self.check_session(session)?;
        self.check_fanout_family(device, MetricFamily::FabricThroughput)?;

        let snapshot = self
            .handler(MetricFamily::FabricThroughput)
            .and_then(|h| h.latest_handle_stats(device, session));
        let begin = self.manager.fabric_sessions().exchange(session, device);
        let end = now_ms();
        let Some(snapshot) = snapshot else {
            return Ok(FabricStatsReport {
                begin,
                end,
                rows: Vec::new(),
            });
        };
        if snapshot.timestamp < begin {
            return Ok(FabricStatsReport {
                begin,
                end,
                rows: Vec::new(),
            });
        }

        let mut rows = Vec::new();
        for (handle, stats) in &snapshot.handles {
            let key = FabricLinkKey::from_handle(*handle);
            let remote_device_id = self
                .inventory
                .device_by_fabric_id(key.remote_fabric_id)
                .ok_or(Error::RemoteFabricUnknown {
                    fabric_id: key.remote_fabric_id,
                })?;
            let counter = matches!(
                key.kind,
                FabricThroughputKind::ReceivedCounter | FabricThroughputKind::TransmittedCounter
            );
            rows.push(FabricStatsRow {
                device_id: device,
                tile_id: key.attach_id,
                remote_device_id,
                remote_tile_id: key.remote_attach_id,
                kind: key.kind,
                scale: if counter { 1 } else { snapshot.scale },
                value: if counter {
                    stats.current.saturating_sub(stats.stats.min)
                } else {
                    stats.current
                },
                min: if counter { 0 } else { stats.stats.min },
                max: if counter { 0 } else { stats.stats.max },
                avg: if counter { 0.0 } else { stats.stats.avg },
                accumulated: counter.then_some(stats.current),
                count: stats.stats.count,
            });
        }
        Ok(FabricStatsReport { begin, end, rows })
    }

    /// Fabric statistics of several devices, concatenated; the window of
    /// the first device is reported.
    pub fn get_fabric_stats_ex(
        &self,
        devices: &[DeviceId],
        session: u64,
    ) -> Result<FabricStatsReport, Error> {
        let mut combined: Option<FabricStatsReport> = None;
        for device in devices {
            let report = self.get_fabric_stats(*device, session)?;
            match combined.as_mut() {
                None => combined = Some(report),
                Some(combined) => combined.rows.extend(report.rows),
            }
        }
        Ok(combined.unwrap_or(FabricStatsReport {
            begin: 0,
            end: now_ms(),
            rows: Vec::new(),
        }))
    }

    /// Latest per-link fabric throughput without touching session state.
    pub fn get_fabric_throughput(&self, device: DeviceId) -> Result<Vec<FabricMetricRow>, Error> {
        self.check_device(device)?;
        self.check_fanout_family(device, MetricFamily::FabricThroughput)?;
        let snapshot = self
            .handler(MetricFamily::FabricThroughput)
            .and_then(|h| h.latest(device));
        let Some(snapshot) = snapshot else {
            return Ok(Vec::new());
        };

        let mut rows = Vec::new();
        for (handle, value) in snapshot.handle_values() {
            let key = FabricLinkKey::from_handle(handle);
            let remote_device_id = self
                .inventory
                .device_by_fabric_id(key.remote_fabric_id)
                .ok_or(Error::RemoteFabricUnknown {
                    fabric_id: key.remote_fabric_id,
                })?;
            let counter = matches!(
                key.kind,
                FabricThroughputKind::ReceivedCounter | FabricThroughputKind::TransmittedCounter
            );
            rows.push(FabricMetricRow {
                device_id: device,
                tile_id: key.attach_id,
                remote_device_id,
                remote_tile_id: key.remote_attach_id,
                kind: key.kind,
                scale: if counter { 1 } else { snapshot.scale() },
                value,
            });
        }
        Ok(rows)
    }

    /// Fabric links of a device with their remote ends resolved.
    pub fn get_fabric_link_info(&self, device: DeviceId) -> Result<Vec<FabricLinkRow>, Error> {
        self.check_device(device)?;
        self.inventory
            .fabric_links(device)
            .into_iter()
            .map(|link| {
                let remote_device_id = self
                    .inventory
                    .device_by_fabric_id(link.remote_fabric_id)
                    .ok_or(Error::RemoteFabricUnknown {
                        fabric_id: link.remote_fabric_id,
                    })?;
                Ok(FabricLinkRow {
                    tile_id: link.attach_id,
                    remote_device_id,
                    remote_tile_id: link.remote_attach_id,
                })
            })
            .collect()
    }

    /// Starts a raw-data collection task for a device.
    pub fn start_raw_data_collection(
        &self,
        device: DeviceId,
        families: Vec<MetricFamily>,
    ) -> Result<u32, Error> {
        self.check_device(device)?;
        self.manager.traces().start(device, families)
    }

    /// Stops a raw-data collection task; cached rows stay readable.
    pub fn stop_raw_data_collection(&self, task_id: u32) -> Result<(), Error> {
        self.manager.traces().stop(task_id)
    }

    /// Cached rows of one (task, family).
    #[must_use]
    pub fn get_cached_raw_data(&self, task_id: u32, family: MetricFamily) -> Vec<TraceRow> {
        self.manager.traces().cached_rows(task_id, family)
    }

    /// Cached rows of every family of a stopped task.
    #[must_use]
    pub fn get_cached_raw_data_all(&self, task_id: u32) -> Vec<Vec<TraceRow>> {
        self.manager.traces().cached_all(task_id)
    }
}

fn stats_entry(
    family: MetricFamily,
    scale: u64,
    current: u64,
    count: u64,
    min: u64,
    max: u64,
    avg: f64,
) -> StatsEntry {
    if family.is_counter() {
        StatsEntry {
            family,
            is_counter: true,
            scale,
            count,
            value: current.saturating_sub(min),
            min: 0,
            max: 0,
            avg: 0.0,
            accumulated: Some(current),
        }
    } else {
        StatsEntry {
            family,
            is_counter: false,
            scale,
            count,
            value: current,
            min,
            max,
            avg,
            accumulated: None,
        }
    }
}

/// Derived GPU-utilization values for a realtime query: the maximum
/// across the engine-group utilizations present.
#[derive(Debug, Default)]
struct GpuUtilizationMax {
    device: Option<u64>,
    tiles: BTreeMap<TileId, u64>,
    scale: u64,
    timestamp: Timestamp,
}

impl GpuUtilizationMax {
    fn fold(&mut self, snapshot: &MetricSnapshot) {
        if let Some(value) = snapshot.current() {
            self.device = Some(self.device.map_or(value, |v| v.max(value)));
            self.scale = snapshot.scale();
            self.timestamp = snapshot.timestamp();
        }
        for (tile, value) in snapshot.subdevice_values() {
            let slot = self.tiles.entry(tile).or_insert(value);
            *slot = (*slot).max(value);
            self.scale = snapshot.scale();
            self.timestamp = snapshot.timestamp();
        }
    }

    fn into_override(self) -> Option<GpuUtilizationMax> {
        if self.device.is_some() || !self.tiles.is_empty() {
            Some(self)
        } else {
            None
        }
    }
}

fn metric_rows(
    device: DeviceId,
    tile_count: u32,
    snapshots: &[MetricSnapshot],
    gpu_override: Option<GpuUtilizationMax>,
) -> Vec<DeviceMetricsRow> {
    struct Flattened {
        family: MetricFamily,
        timestamp: Timestamp,
        scale: u64,
        current: Option<u64>,
        subdevices: BTreeMap<TileId, u64>,
    }

    let flattened: Vec<Flattened> = snapshots
        .iter()
        .filter(|snapshot| {
            // The flattened group maximum replaces the raw signal.
            gpu_override.is_none() || snapshot.family() != MetricFamily::GpuUtilization
        })
        .map(|snapshot| Flattened {
            family: snapshot.family(),
            timestamp: snapshot.timestamp(),
            scale: snapshot.scale(),
            current: snapshot.current(),
            subdevices: snapshot.subdevice_values(),
        })
        .collect();

    let entry = |family: MetricFamily, value: u64, timestamp: Timestamp, scale: u64| MetricEntry {
        family,
        is_counter: family.is_counter(),
        value,
        timestamp,
        scale,
    };

    let mut rows = Vec::new();
    let mut device_data: Vec<MetricEntry> = flattened
        .iter()
        .filter_map(|f| f.current.map(|value| entry(f.family, value, f.timestamp, f.scale)))
        .collect();
    if let Some(gpu) = &gpu_override {
        if let Some(value) = gpu.device {
            device_data.push(entry(MetricFamily::GpuUtilization, value, gpu.timestamp, gpu.scale));
        }
    }
    rows.push(DeviceMetricsRow {
        device_id: device,
        tile_id: None,
        data: device_data,
    });

    for tile in 0..tile_count {
        let mut data: Vec<MetricEntry> = flattened
            .iter()
            .filter_map(|f| {
                f.subdevices
                    .get(&tile)
                    .map(|value| entry(f.family, *value, f.timestamp, f.scale))
            })
            .collect();
        if let Some(gpu) = &gpu_override {
            if let Some(value) = gpu.tiles.get(&tile) {
                data.push(entry(MetricFamily::GpuUtilization, *value, gpu.timestamp, gpu.scale));
            }
        }
        rows.push(DeviceMetricsRow {
            device_id: device,
            tile_id: Some(tile),
            data,
        });
    }
    rows
}
