// Copyright The XPU Manager Authors
// SPDX-License-Identifier: MIT

//! Per-metric-family stateful processors.
//!
//! A handler owns the previous/latest sample pair, the derived-value
//! overlay of the current tick and the per-session rolling statistics of
//! its family. The registry invokes [`DataHandler::pre_handle`] and
//! [`DataHandler::handle`] for every stored sample; consumers read back
//! through the `latest*` accessors. All state sits behind one mutex per
//! handler, which is never held across a sink or I/O call.

pub mod collection;
pub mod engine;
pub mod fabric;
pub mod group;
pub mod scalar;
pub mod time_weighted;
pub mod window;

pub use fabric::FabricLinkKey;
pub use window::WindowStats;

use crate::handler::collection::HandleSessionStats;
use crate::handler::scalar::ScalarSessionStats;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tracing::trace;
use xpum_config::Tunables;
use xpum_metrics::{
    DeviceId, DeviceMetric, EngineMetric, HandleId, MetricFamily, RollingStats, Sample, TileId,
    Timestamp,
};

/// Family-specific processing applied by a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// Instantaneous gauges: rolling statistics only.
    Stats,
    /// Raw-counter families presented as an average rate.
    TimeWeightedAvg,
    /// Monotonic cumulative counters with rollover recovery.
    Counter,
    /// Per-engine utilization from activity counters.
    EngineUtil,
    /// Engine-group utilization from group activity records.
    EngineGroupUtil,
    /// Whole-GPU utilization from the all-engines group.
    GpuUtil,
    /// Per-link fabric throughput from port counters.
    FabricThroughput,
    /// Trailing-window average instead of per-session statistics.
    Avg,
    /// Performance-counter collections.
    PerfMetrics,
    /// Generic per-handle collection statistics.
    MetricCollectionStats,
}

/// Values derived from the previous/latest sample pair for one device.
///
/// Samples are immutable once published, so rates and utilizations live
/// here and are composed with the sample on read.
#[derive(Debug, Clone, Default)]
pub(crate) struct DerivedDevice {
    /// Derived whole-device value.
    pub current: Option<u64>,
    /// Scale override for derived values.
    pub scale: Option<u64>,
    /// Derived per-tile values.
    pub subdevices: BTreeMap<TileId, u64>,
    /// Derived per-handle values.
    pub handles: BTreeMap<HandleId, u64>,
}

#[derive(Debug)]
struct HandlerState {
    previous: Option<Arc<Sample>>,
    latest: Option<Arc<Sample>>,
    derived: HashMap<DeviceId, DerivedDevice>,
    scalar_stats: ScalarSessionStats,
    handle_stats: HandleSessionStats,
    window: VecDeque<Arc<Sample>>,
}

/// Stateful processor for one metric family.
#[derive(Debug)]
pub struct DataHandler {
    family: MetricFamily,
    kind: HandlerKind,
    scale: u64,
    window_limit_ms: u64,
    state: Mutex<HandlerState>,
}

impl DataHandler {
    /// Creates the handler for a family.
    #[must_use]
    pub fn new(family: MetricFamily, kind: HandlerKind, tunables: &Tunables) -> Self {
        DataHandler {
            family,
            kind,
            scale: tunables.measurement_data_scale,
            window_limit_ms: tunables.data_handler_cache_time_limit_ms,
            state: Mutex::new(HandlerState {
                previous: None,
                latest: None,
                derived: HashMap::new(),
                scalar_stats: ScalarSessionStats::new(tunables.max_statistics_sessions),
                handle_stats: HandleSessionStats::new(tunables.max_statistics_sessions),
                window: VecDeque::new(),
            }),
        }
    }

    /// The family this handler processes.
    #[must_use]
    pub fn family(&self) -> MetricFamily {
        self.family
    }

    /// The processing kind of this handler.
    #[must_use]
    pub fn kind(&self) -> HandlerKind {
        self.kind
    }

    /// Rotates previous/latest under the handler lock.
    ///
    /// Do not put anything slow here: this runs on the probe thread with
    /// the lock held. The sink call belongs to the registry, after this
    /// returns and the lock is released.
    pub fn pre_handle(&self, sample: &Arc<Sample>) {
        let mut state = self.state.lock();
        state.previous = state.latest.take();
        state.latest = Some(Arc::clone(sample));
        state.derived.clear();
    }

    /// Runs the family-specific math and folds the tick into the rolling
    /// statistics.
    pub fn handle(&self, sample: &Arc<Sample>) {
        let mut state = self.state.lock();
        match self.kind {
            HandlerKind::Stats => {
                update_scalar_stats(&mut state, sample);
            }
            HandlerKind::TimeWeightedAvg | HandlerKind::Counter => {
                if let Some(previous) = state.previous.clone() {
                    let derivation = time_weighted::derive_rates(&previous, sample);
                    if derivation.drop_previous {
                        state.previous = None;
                    } else {
                        state.derived = derivation.overlay;
                    }
                }
                update_scalar_stats(&mut state, sample);
            }
            HandlerKind::EngineUtil => {
                let Some(previous) = state.previous.clone() else {
                    return;
                };
                state.derived = engine::derive_engine_utilization(&previous, sample, self.scale);
                update_handle_stats_from_derived(&mut state, sample);
            }
            HandlerKind::EngineGroupUtil | HandlerKind::GpuUtil => {
                let Some(previous) = state.previous.clone() else {
                    return;
                };
                let Some(group) = self.family.engine_group() else {
                    return;
                };
                state.derived =
                    group::derive_group_utilization(&previous, sample, group, self.scale);
                update_scalar_stats(&mut state, sample);
            }
            HandlerKind::FabricThroughput => {
                let Some(previous) = state.previous.clone() else {
                    return;
                };
                state.derived = fabric::derive_fabric_throughput(&previous, sample, self.scale);
                update_handle_stats_from_derived(&mut state, sample);
            }
            HandlerKind::Avg => {
                window::push_and_prune(&mut state.window, Arc::clone(sample), self.window_limit_ms);
            }
            HandlerKind::PerfMetrics => {
                for (device, metric) in &sample.devices {
                    trace!(
                        family = ?self.family,
                        device,
                        groups = metric.handles.len(),
                        "performance metrics tick"
                    );
                }
                update_handle_stats_from_sample(&mut state, sample);
            }
            HandlerKind::MetricCollectionStats => {
                update_handle_stats_from_sample(&mut state, sample);
            }
        }
    }

    /// Latest composed values of one device, without touching session
    /// state.
    #[must_use]
    pub fn latest(&self, device: DeviceId) -> Option<MetricSnapshot> {
        let state = self.state.lock();
        self.snapshot(&state, device)
    }

    /// Latest composed values of every device in the newest sample.
    #[must_use]
    pub fn latest_all(&self) -> Vec<MetricSnapshot> {
        let state = self.state.lock();
        let Some(sample) = state.latest.clone() else {
            return Vec::new();
        };
        sample
            .devices
            .keys()
            .filter_map(|device| self.snapshot(&state, *device))
            .collect()
    }

    fn snapshot(&self, state: &HandlerState, device: DeviceId) -> Option<MetricSnapshot> {
        let sample = state.latest.as_ref()?;
        let metric = sample.devices.get(&device)?.clone();
        let window = if self.kind == HandlerKind::Avg {
            window::window_stats(&state.window, device)
        } else {
            None
        };
        Some(MetricSnapshot {
            family: self.family,
            device,
            timestamp: sample.ts_ms,
            metric,
            derived: state.derived.get(&device).cloned(),
            window,
        })
    }

    /// Composite of the latest value and the accumulated scalar
    /// statistics of (session, device); resets that slot so the next
    /// call starts a new window.
    #[must_use]
    pub fn latest_stats(&self, device: DeviceId, session: u64) -> Option<StatsSnapshot> {
        let mut state = self.state.lock();
        let snapshot = self.snapshot(&state, device)?;
        let ts = snapshot.timestamp;
        let current = snapshot.current();
        let tiles = snapshot.subdevice_values();

        if self.kind == HandlerKind::Avg {
            let stats = snapshot.window.map(|w| RollingStats {
                count: w.count,
                min: w.min,
                max: w.max,
                avg: w.avg,
                start_time: w.start_time,
                latest_time: w.latest_time,
                has_data: true,
            });
            return Some(StatsSnapshot {
                family: self.family,
                device,
                timestamp: ts,
                scale: snapshot.scale(),
                current,
                stats: stats.or_else(|| current.map(|v| RollingStats::seed(v, ts))),
                subdevices: BTreeMap::new(),
            });
        }

        let slot = state.scalar_stats.take(session, device);
        let device_stats = slot
            .as_ref()
            .and_then(|s| s.device.clone())
            .or_else(|| current.map(|v| RollingStats::seed(v, ts)));
        let subdevices = tiles
            .into_iter()
            .map(|(tile, value)| {
                let stats = slot
                    .as_ref()
                    .and_then(|s| s.subdevices.get(&tile).cloned())
                    .unwrap_or_else(|| RollingStats::seed(value, ts));
                (tile, SubdeviceStats { current: value, stats })
            })
            .collect();
        Some(StatsSnapshot {
            family: self.family,
            device,
            timestamp: ts,
            scale: snapshot.scale(),
            current,
            stats: device_stats,
            subdevices,
        })
    }

    /// Composite of the latest per-handle values and the accumulated
    /// per-handle statistics of (session, device); resets that slot.
    #[must_use]
    pub fn latest_handle_stats(&self, device: DeviceId, session: u64) -> Option<HandleStatsSnapshot> {
        let mut state = self.state.lock();
        let snapshot = self.snapshot(&state, device)?;
        let ts = snapshot.timestamp;
        let values = snapshot.handle_values();
        let mut slot = state.handle_stats.take(session, device).unwrap_or_default();
        let handles = values
            .into_iter()
            .map(|(handle, current)| {
                let stats = slot
                    .remove(&handle)
                    .unwrap_or_else(|| RollingStats::seed(current, ts));
                (handle, HandleStats { current, stats })
            })
            .collect();
        Some(HandleStatsSnapshot {
            family: self.family,
            device,
            timestamp: ts,
            scale: snapshot.scale(),
            metric: snapshot.metric,
            handles,
        })
    }
}

fn update_scalar_stats(state: &mut HandlerState, sample: &Arc<Sample>) {
    let HandlerState {
        derived,
        scalar_stats,
        ..
    } = state;
    for (device, metric) in &sample.devices {
        let overlay = derived.get(device);
        let current = overlay.and_then(|d| d.current).or(metric.current);
        let mut tiles: BTreeMap<TileId, u64> = metric
            .subdevices
            .iter()
            .filter_map(|(tile, sub)| sub.current.map(|v| (*tile, v)))
            .collect();
        if let Some(overlay) = overlay {
            for (tile, value) in &overlay.subdevices {
                let _ = tiles.insert(*tile, *value);
            }
        }
        scalar_stats.update(sample.ts_ms, *device, current, &tiles);
    }
}

fn update_handle_stats_from_derived(state: &mut HandlerState, sample: &Arc<Sample>) {
    let HandlerState {
        derived,
        handle_stats,
        ..
    } = state;
    for device in sample.devices.keys() {
        if let Some(overlay) = derived.get(device) {
            handle_stats.update(sample.ts_ms, *device, &overlay.handles);
        }
    }
}

fn update_handle_stats_from_sample(state: &mut HandlerState, sample: &Arc<Sample>) {
    for (device, metric) in &sample.devices {
        state.handle_stats.update(sample.ts_ms, *device, &metric.handles);
    }
}

/// Latest composed values of one device for one family.
#[derive(Debug, Clone)]
pub struct MetricSnapshot {
    family: MetricFamily,
    device: DeviceId,
    timestamp: Timestamp,
    metric: DeviceMetric,
    derived: Option<DerivedDevice>,
    window: Option<WindowStats>,
}

impl MetricSnapshot {
    /// The family the snapshot belongs to.
    #[must_use]
    pub fn family(&self) -> MetricFamily {
        self.family
    }

    /// The device the snapshot belongs to.
    #[must_use]
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Wall-clock timestamp of the underlying tick.
    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Scale of the transmitted values.
    #[must_use]
    pub fn scale(&self) -> u64 {
        self.derived
            .as_ref()
            .and_then(|d| d.scale)
            .unwrap_or(self.metric.scale)
    }

    /// Whole-device value, derived values taking precedence.
    #[must_use]
    pub fn current(&self) -> Option<u64> {
        self.derived
            .as_ref()
            .and_then(|d| d.current)
            .or(self.metric.current)
    }

    /// Composed per-tile values.
    #[must_use]
    pub fn subdevice_values(&self) -> BTreeMap<TileId, u64> {
        let mut tiles: BTreeMap<TileId, u64> = self
            .metric
            .subdevices
            .iter()
            .filter_map(|(tile, sub)| sub.current.map(|v| (*tile, v)))
            .collect();
        if let Some(derived) = &self.derived {
            for (tile, value) in &derived.subdevices {
                let _ = tiles.insert(*tile, *value);
            }
        }
        tiles
    }

    /// Composed per-handle values.
    #[must_use]
    pub fn handle_values(&self) -> BTreeMap<HandleId, u64> {
        match &self.derived {
            Some(derived) if !derived.handles.is_empty() => derived.handles.clone(),
            _ => self.metric.handles.clone(),
        }
    }

    /// Engine fan-out record behind a handle, if any.
    #[must_use]
    pub fn engine(&self, handle: HandleId) -> Option<&EngineMetric> {
        self.metric.engines.get(&handle)
    }

    /// The raw per-device record of the underlying sample.
    #[must_use]
    pub fn metric(&self) -> &DeviceMetric {
        &self.metric
    }

    /// Trailing-window statistics, for Avg-kind handlers.
    #[must_use]
    pub fn window(&self) -> Option<WindowStats> {
        self.window
    }
}

/// Composite scalar statistics returned by [`DataHandler::latest_stats`].
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    /// The family the statistics belong to.
    pub family: MetricFamily,
    /// The device the statistics belong to.
    pub device: DeviceId,
    /// Wall-clock timestamp of the newest tick.
    pub timestamp: Timestamp,
    /// Scale of the transmitted values.
    pub scale: u64,
    /// Latest composed whole-device value.
    pub current: Option<u64>,
    /// Whole-device rolling statistics of the reported window.
    pub stats: Option<RollingStats>,
    /// Per-tile values and statistics.
    pub subdevices: BTreeMap<TileId, SubdeviceStats>,
}

/// Per-tile slice of a [`StatsSnapshot`].
#[derive(Debug, Clone)]
pub struct SubdeviceStats {
    /// Latest composed tile value.
    pub current: u64,
    /// Tile rolling statistics of the reported window.
    pub stats: RollingStats,
}

/// Composite per-handle statistics returned by
/// [`DataHandler::latest_handle_stats`].
#[derive(Debug, Clone)]
pub struct HandleStatsSnapshot {
    /// The family the statistics belong to.
    pub family: MetricFamily,
    /// The device the statistics belong to.
    pub device: DeviceId,
    /// Wall-clock timestamp of the newest tick.
    pub timestamp: Timestamp,
    /// Scale of the transmitted values.
    pub scale: u64,
    /// The raw per-device record of the underlying sample, for fan-out
    /// metadata lookups.
    pub metric: DeviceMetric,
    /// Per-handle values and statistics.
    pub handles: BTreeMap<HandleId, HandleStats>,
}

impl HandleStatsSnapshot {
    /// Engine fan-out record behind a handle, if any.
    #[must_use]
    pub fn engine(&self, handle: HandleId) -> Option<&EngineMetric> {
        self.metric.engines.get(&handle)
    }
}

/// Per-handle slice of a [`HandleStatsSnapshot`].
#[derive(Debug, Clone)]
pub struct HandleStats {
    /// Latest derived value of the handle.
    pub current: u64,
    /// Rolling statistics of the reported window.
    pub stats: RollingStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use xpum_metrics::SubdeviceMetric;

    fn scalar_sample(ts: Timestamp, value: u64) -> Arc<Sample> {
        let mut devices = BTreeMap::new();
        let _ = devices.insert(0, DeviceMetric::scalar(value));
        Arc::new(Sample::new(ts, devices))
    }

    fn store(handler: &DataHandler, sample: &Arc<Sample>) {
        handler.pre_handle(sample);
        handler.handle(sample);
    }

    #[test]
    fn pre_handle_rotates_previous_and_latest() {
        let handler = DataHandler::new(
            MetricFamily::Temperature,
            HandlerKind::Stats,
            &Tunables::default(),
        );
        store(&handler, &scalar_sample(1000, 40));
        store(&handler, &scalar_sample(2000, 50));
        let snapshot = handler.latest(0).expect("snapshot");
        assert_eq!(snapshot.current(), Some(50));
        assert_eq!(snapshot.timestamp(), 2000);
    }

    #[test]
    fn collection_kind_tracks_per_handle_windows() {
        let handler = DataHandler::new(
            MetricFamily::PerfMetrics,
            HandlerKind::MetricCollectionStats,
            &Tunables::default(),
        );
        for (ts, a, b) in [(1000, 10, 70), (2000, 30, 50)] {
            let mut devices = BTreeMap::new();
            let _ = devices.insert(
                0,
                DeviceMetric {
                    handles: [(1, a), (2, b)].into_iter().collect(),
                    ..DeviceMetric::default()
                },
            );
            store(&handler, &Arc::new(Sample::new(ts, devices)));
        }

        let snapshot = handler.latest_handle_stats(0, 0).expect("snapshot");
        assert_eq!(snapshot.handles[&1].current, 30);
        assert_eq!(snapshot.handles[&1].stats.min, 10);
        assert_eq!(snapshot.handles[&1].stats.max, 30);
        assert_eq!(snapshot.handles[&2].stats.count, 2);

        // The read reset the slot: the next read is a count=1 record.
        let snapshot = handler.latest_handle_stats(0, 0).expect("snapshot");
        assert_eq!(snapshot.handles[&1].stats.count, 1);
        assert_eq!(snapshot.handles[&1].stats.min, 30);
    }

    #[test]
    fn derived_overlay_is_cleared_on_rotation() {
        let handler = DataHandler::new(
            MetricFamily::MemoryRead,
            HandlerKind::Counter,
            &Tunables::default(),
        );
        let raw = |ts, value, raw_ts| {
            let mut devices = BTreeMap::new();
            let _ = devices.insert(0, DeviceMetric::raw_counter(value, raw_ts));
            Arc::new(Sample::new(ts, devices))
        };
        store(&handler, &raw(1000, 100, 1));
        store(&handler, &raw(2000, 160, 4));
        let snapshot = handler.latest(0).expect("snapshot");
        assert_eq!(snapshot.current(), Some(20));

        // Rotation alone leaves the new tick underived until handle().
        handler.pre_handle(&raw(3000, 200, 5));
        let snapshot = handler.latest(0).expect("snapshot");
        assert_eq!(snapshot.current(), None);
    }

    #[test]
    fn stats_kind_folds_tiles_into_the_session_slot() {
        let handler = DataHandler::new(
            MetricFamily::Temperature,
            HandlerKind::Stats,
            &Tunables::default(),
        );
        let mut devices = BTreeMap::new();
        let _ = devices.insert(
            0,
            DeviceMetric {
                current: Some(30),
                subdevices: [(
                    1,
                    SubdeviceMetric {
                        current: Some(35),
                        raw: None,
                    },
                )]
                .into_iter()
                .collect(),
                ..DeviceMetric::default()
            },
        );
        store(&handler, &Arc::new(Sample::new(1000, devices)));

        let snapshot = handler.latest_stats(0, 0).expect("snapshot");
        assert_eq!(snapshot.current, Some(30));
        assert_eq!(snapshot.subdevices[&1].current, 35);
        assert_eq!(snapshot.subdevices[&1].stats.count, 1);
    }
}
