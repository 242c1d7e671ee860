// Copyright The XPU Manager Authors
// SPDX-License-Identifier: MIT

//! The handler registry: routes every stored sample to its family's
//! handler and owns the session-timestamp tables and the raw-trace
//! manager.
//!
//! Handlers are created once at construction; lookup afterwards is
//! lock-free. Each handler serializes its own work behind its own
//! mutex, so ticks of different families proceed in parallel.

use crate::handler::{DataHandler, HandlerKind};
use crate::session::SessionTable;
use crate::sink::Sink;
use crate::trace::RawTraceManager;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{trace, warn};
use xpum_config::{EnabledMetrics, Tunables};
use xpum_metrics::{DeviceId, DeviceMetric, MetricFamily, Sample, Timestamp};

/// Handler kind collecting a family's samples.
///
/// This is the routing table of the pipeline: gauges take plain rolling
/// statistics, counter-backed families derive rates first, fan-out
/// families keep per-handle records.
#[must_use]
pub fn handler_kind(family: MetricFamily) -> HandlerKind {
    match family {
        MetricFamily::Power
        | MetricFamily::MemoryBandwidth
        | MetricFamily::MemoryReadThroughput
        | MetricFamily::MemoryWriteThroughput
        | MetricFamily::FrequencyThrottle => HandlerKind::TimeWeightedAvg,
        MetricFamily::MemoryRead
        | MetricFamily::MemoryWrite
        | MetricFamily::PcieRead
        | MetricFamily::PcieWrite => HandlerKind::Counter,
        MetricFamily::EngineUtilization => HandlerKind::EngineUtil,
        MetricFamily::GpuUtilization => HandlerKind::GpuUtil,
        MetricFamily::EngineGroupComputeAllUtilization
        | MetricFamily::EngineGroupMediaAllUtilization
        | MetricFamily::EngineGroupCopyAllUtilization
        | MetricFamily::EngineGroupRenderAllUtilization
        | MetricFamily::EngineGroup3dAllUtilization => HandlerKind::EngineGroupUtil,
        MetricFamily::FabricThroughput => HandlerKind::FabricThroughput,
        MetricFamily::MemoryUtilization => HandlerKind::Avg,
        MetricFamily::PerfMetrics => HandlerKind::PerfMetrics,
        _ => HandlerKind::Stats,
    }
}

/// Owns one handler per family and routes incoming samples.
pub struct DataHandlerManager {
    handlers: HashMap<MetricFamily, Arc<DataHandler>>,
    sink: Arc<dyn Sink>,
    enabled: EnabledMetrics,
    stats_sessions: SessionTable,
    engine_sessions: SessionTable,
    fabric_sessions: SessionTable,
    traces: RawTraceManager,
}

impl DataHandlerManager {
    /// Creates the registry with one handler per known family.
    #[must_use]
    pub fn new(enabled: EnabledMetrics, tunables: &Tunables, sink: Arc<dyn Sink>) -> Self {
        let handlers = MetricFamily::ALL
            .iter()
            .map(|family| {
                (
                    *family,
                    Arc::new(DataHandler::new(*family, handler_kind(*family), tunables)),
                )
            })
            .collect();
        DataHandlerManager {
            handlers,
            sink,
            enabled,
            stats_sessions: SessionTable::new(),
            engine_sessions: SessionTable::new(),
            fabric_sessions: SessionTable::new(),
            traces: RawTraceManager::new(tunables),
        }
    }

    /// The handler of a family.
    #[must_use]
    pub fn handler(&self, family: MetricFamily) -> Option<&Arc<DataHandler>> {
        self.handlers.get(&family)
    }

    /// Accepts one tick of one family from the polling probe.
    ///
    /// The sample is rotated into the handler under its lock, persisted
    /// through the sink with the lock released, run through the
    /// family-specific math and finally offered to the raw-trace tasks.
    /// Disabled and unregistered families are dropped.
    pub fn store_sample(
        &self,
        family: MetricFamily,
        ts_ms: Timestamp,
        devices: BTreeMap<DeviceId, DeviceMetric>,
    ) {
        if !self.enabled.is_enabled(family) {
            trace!(?family, "dropping sample for disabled family");
            return;
        }
        let Some(handler) = self.handlers.get(&family) else {
            trace!(?family, "dropping sample for unregistered family");
            return;
        };

        let sample = Arc::new(Sample::new(ts_ms, devices));
        handler.pre_handle(&sample);
        if let Err(error) = self.sink.store(family, ts_ms, &sample) {
            warn!(%error, ?family, "sink failure swallowed");
        }
        handler.handle(&sample);
        self.traces.record(family, ts_ms, &handler.latest_all());
    }

    /// The enabled-metric set the registry routes by.
    #[must_use]
    pub fn enabled(&self) -> &EnabledMetrics {
        &self.enabled
    }

    /// Session timestamps of the device-stats queries.
    #[must_use]
    pub fn stats_sessions(&self) -> &SessionTable {
        &self.stats_sessions
    }

    /// Session timestamps of the engine-stats queries.
    #[must_use]
    pub fn engine_sessions(&self) -> &SessionTable {
        &self.engine_sessions
    }

    /// Session timestamps of the fabric-stats queries.
    #[must_use]
    pub fn fabric_sessions(&self) -> &SessionTable {
        &self.fabric_sessions
    }

    /// The raw-trace manager fed by every stored sample.
    #[must_use]
    pub fn traces(&self) -> &RawTraceManager {
        &self.traces
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::NoopSink;
    use pretty_assertions::assert_eq;

    fn manager(enabled: EnabledMetrics) -> DataHandlerManager {
        DataHandlerManager::new(enabled, &Tunables::default(), Arc::new(NoopSink))
    }

    fn temperature_tick(manager: &DataHandlerManager, ts: Timestamp, value: u64) {
        let mut devices = BTreeMap::new();
        let _ = devices.insert(0, DeviceMetric::scalar(value));
        manager.store_sample(MetricFamily::Temperature, ts, devices);
    }

    #[test]
    fn routes_samples_to_the_family_handler() {
        let manager = manager(EnabledMetrics::all());
        temperature_tick(&manager, 1000, 42);
        let snapshot = manager
            .handler(MetricFamily::Temperature)
            .and_then(|h| h.latest(0))
            .expect("snapshot");
        assert_eq!(snapshot.current(), Some(42));
        assert_eq!(snapshot.timestamp(), 1000);
    }

    #[test]
    fn disabled_family_is_dropped_on_store() {
        let manager = manager(EnabledMetrics::from_spec("4"));
        temperature_tick(&manager, 1000, 42);
        assert!(
            manager
                .handler(MetricFamily::Temperature)
                .and_then(|h| h.latest(0))
                .is_none()
        );
    }

    #[test]
    fn every_family_has_a_handler_of_its_kind() {
        let manager = manager(EnabledMetrics::all());
        for family in MetricFamily::ALL {
            let handler = manager.handler(*family).expect("handler");
            assert_eq!(handler.kind(), handler_kind(*family));
            assert_eq!(handler.family(), *family);
        }
    }
}
