// Copyright The XPU Manager Authors
// SPDX-License-Identifier: MIT

//! Metric families and their fixed semantics.
//!
//! Every family carries a stable integer index (the mapping used by the
//! `XPUM_METRICS` enablement list and by on-wire stats records), a
//! counter/gauge flag, a fan-out shape and a human-readable unit label.

use serde::{Deserialize, Serialize};

/// How a family's per-device data fans out below the whole-device scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Fanout {
    /// Whole-device scalar, optionally split per sub-device.
    Scalar,
    /// One value per engine handle.
    Engine,
    /// One value per fabric-port handle, aggregated into synthetic link ids.
    Fabric,
    /// One value per performance-counter handle.
    Perf,
}

/// Engine type reported for per-engine utilization rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineType {
    /// Compute (EU array) engine.
    Compute,
    /// Render engine.
    Render,
    /// Media decode engine.
    Decode,
    /// Media encode engine.
    Encode,
    /// Blitter / copy engine.
    Copy,
    /// Media enhancement engine.
    MediaEnhancement,
    /// 3D engine.
    ThreeD,
    /// Engine type not known to the device runtime.
    Unknown,
}

/// Engine-group identifier attached to group activity records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineGroup {
    /// All engines combined; feeds the GPU-utilization family.
    All,
    /// All compute engines.
    ComputeAll,
    /// All media engines.
    MediaAll,
    /// All copy engines.
    CopyAll,
    /// All render engines.
    RenderAll,
    /// All 3D engines.
    ThreeDAll,
}

/// Direction/kind of a synthetic fabric-throughput metric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FabricThroughputKind {
    /// Received throughput (rate).
    Received,
    /// Transmitted throughput (rate).
    Transmitted,
    /// Accumulated received byte counter.
    ReceivedCounter,
    /// Accumulated transmitted byte counter.
    TransmittedCounter,
}

macro_rules! metric_families {
    ($( $(#[$doc:meta])* $name:ident = $idx:literal ),+ $(,)?) => {
        /// A kind of measurement collected from the GPU runtime.
        ///
        /// The discriminants are the stable indices understood by the
        /// `XPUM_METRICS` environment list; they must never be reordered.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[repr(u32)]
        pub enum MetricFamily {
            $( $(#[$doc])* $name = $idx, )+
        }

        impl MetricFamily {
            /// Every family, in stable-index order.
            pub const ALL: &'static [MetricFamily] = &[ $( MetricFamily::$name, )+ ];

            /// Number of known families.
            pub const COUNT: usize = Self::ALL.len();

            /// Resolves a stable index back to a family, if known.
            #[must_use]
            pub fn from_index(index: u32) -> Option<MetricFamily> {
                match index {
                    $( $idx => Some(MetricFamily::$name), )+
                    _ => None,
                }
            }
        }
    };
}

metric_families! {
    /// Whole-GPU utilization derived from the all-engines activity group.
    GpuUtilization = 0,
    /// Execution-unit active ratio.
    EuActive = 1,
    /// Execution-unit stall ratio.
    EuStall = 2,
    /// Execution-unit idle ratio.
    EuIdle = 3,
    /// Average power draw derived from the energy counter.
    Power = 4,
    /// Accumulated energy counter.
    Energy = 5,
    /// GPU core frequency.
    Frequency = 6,
    /// GPU core temperature.
    Temperature = 7,
    /// Device memory in use.
    MemoryUsed = 8,
    /// Device memory utilization ratio.
    MemoryUtilization = 9,
    /// Memory bandwidth ratio derived from activity counters.
    MemoryBandwidth = 10,
    /// Accumulated memory read byte counter.
    MemoryRead = 11,
    /// Accumulated memory write byte counter.
    MemoryWrite = 12,
    /// Memory read throughput derived from the read counter.
    MemoryReadThroughput = 13,
    /// Memory write throughput derived from the write counter.
    MemoryWriteThroughput = 14,
    /// Utilization of the compute-all engine group.
    EngineGroupComputeAllUtilization = 15,
    /// Utilization of the media-all engine group.
    EngineGroupMediaAllUtilization = 16,
    /// Utilization of the copy-all engine group.
    EngineGroupCopyAllUtilization = 17,
    /// Utilization of the render-all engine group.
    EngineGroupRenderAllUtilization = 18,
    /// Utilization of the 3D-all engine group.
    EngineGroup3dAllUtilization = 19,
    /// RAS counter: engine resets.
    RasErrorCatReset = 20,
    /// RAS counter: programming errors.
    RasErrorCatProgrammingErrors = 21,
    /// RAS counter: driver errors.
    RasErrorCatDriverErrors = 22,
    /// RAS counter: correctable cache errors.
    RasErrorCatCacheErrorsCorrectable = 23,
    /// RAS counter: uncorrectable cache errors.
    RasErrorCatCacheErrorsUncorrectable = 24,
    /// RAS counter: correctable display errors.
    RasErrorCatDisplayErrorsCorrectable = 25,
    /// RAS counter: uncorrectable display errors.
    RasErrorCatDisplayErrorsUncorrectable = 26,
    /// RAS counter: correctable non-compute errors.
    RasErrorCatNonComputeErrorsCorrectable = 27,
    /// RAS counter: uncorrectable non-compute errors.
    RasErrorCatNonComputeErrorsUncorrectable = 28,
    /// Device memory temperature.
    MemoryTemperature = 29,
    /// Ratio of time the GPU spent frequency-throttled.
    FrequencyThrottle = 30,
    /// Reason bitmask for the current frequency throttle.
    FrequencyThrottleReasonGpu = 31,
    /// PCIe read throughput.
    PcieReadThroughput = 32,
    /// PCIe write throughput.
    PcieWriteThroughput = 33,
    /// Accumulated PCIe read counter.
    PcieRead = 34,
    /// Accumulated PCIe write counter.
    PcieWrite = 35,
    /// Per-engine utilization.
    EngineUtilization = 36,
    /// Per-link fabric throughput.
    FabricThroughput = 37,
    /// Media engine frequency.
    MediaEngineFrequency = 38,
    /// Frequency requested by the driver.
    RequestFrequency = 39,
    /// Performance-counter (metric group) collections.
    PerfMetrics = 40,
}

impl MetricFamily {
    /// Stable integer index of this family.
    #[must_use]
    pub fn index(self) -> u32 {
        self as u32
    }

    /// Whether the raw signal is a monotonic cumulative quantity.
    ///
    /// Counter families are reported with accumulated/delta semantics by
    /// the query layer instead of min/avg/max.
    #[must_use]
    pub fn is_counter(self) -> bool {
        matches!(
            self,
            MetricFamily::Energy
                | MetricFamily::MemoryRead
                | MetricFamily::MemoryWrite
                | MetricFamily::PcieRead
                | MetricFamily::PcieWrite
        )
    }

    /// Fan-out shape of the family's per-device data.
    #[must_use]
    pub fn fanout(self) -> Fanout {
        match self {
            MetricFamily::EngineUtilization => Fanout::Engine,
            MetricFamily::FabricThroughput => Fanout::Fabric,
            MetricFamily::PerfMetrics => Fanout::Perf,
            _ => Fanout::Scalar,
        }
    }

    /// Whether per-tile values are expected for this family.
    #[must_use]
    pub fn has_subdevice(self) -> bool {
        !matches!(
            self,
            MetricFamily::PcieReadThroughput
                | MetricFamily::PcieWriteThroughput
                | MetricFamily::PcieRead
                | MetricFamily::PcieWrite
        )
    }

    /// Engine group backing an engine-group-utilization family.
    #[must_use]
    pub fn engine_group(self) -> Option<EngineGroup> {
        match self {
            MetricFamily::GpuUtilization => Some(EngineGroup::All),
            MetricFamily::EngineGroupComputeAllUtilization => Some(EngineGroup::ComputeAll),
            MetricFamily::EngineGroupMediaAllUtilization => Some(EngineGroup::MediaAll),
            MetricFamily::EngineGroupCopyAllUtilization => Some(EngineGroup::CopyAll),
            MetricFamily::EngineGroupRenderAllUtilization => Some(EngineGroup::RenderAll),
            MetricFamily::EngineGroup3dAllUtilization => Some(EngineGroup::ThreeDAll),
            _ => None,
        }
    }

    /// Families whose realtime values fold into the derived GPU utilization.
    #[must_use]
    pub fn is_engine_group_utilization(self) -> bool {
        matches!(
            self,
            MetricFamily::EngineGroupComputeAllUtilization
                | MetricFamily::EngineGroupMediaAllUtilization
                | MetricFamily::EngineGroupCopyAllUtilization
                | MetricFamily::EngineGroupRenderAllUtilization
                | MetricFamily::EngineGroup3dAllUtilization
        )
    }

    /// Human-readable label used for dump-file column headers.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            MetricFamily::GpuUtilization => "GPU Utilization (%)",
            MetricFamily::EuActive => "GPU EU Array Active (%)",
            MetricFamily::EuStall => "GPU EU Array Stall (%)",
            MetricFamily::EuIdle => "GPU EU Array Idle (%)",
            MetricFamily::Power => "GPU Power (W)",
            MetricFamily::Energy => "GPU Energy Consumed (J)",
            MetricFamily::Frequency => "GPU Frequency (MHz)",
            MetricFamily::Temperature => "GPU Core Temperature (Celsius Degree)",
            MetricFamily::MemoryUsed => "GPU Memory Used (MiB)",
            MetricFamily::MemoryUtilization => "GPU Memory Utilization (%)",
            MetricFamily::MemoryBandwidth => "GPU Memory Bandwidth Utilization (%)",
            MetricFamily::MemoryRead => "GPU Memory Read (kB)",
            MetricFamily::MemoryWrite => "GPU Memory Write (kB)",
            MetricFamily::MemoryReadThroughput => "GPU Memory Read Throughput (kB/s)",
            MetricFamily::MemoryWriteThroughput => "GPU Memory Write Throughput (kB/s)",
            MetricFamily::EngineGroupComputeAllUtilization => {
                "Compute Engine Group Utilization (%)"
            }
            MetricFamily::EngineGroupMediaAllUtilization => "Media Engine Group Utilization (%)",
            MetricFamily::EngineGroupCopyAllUtilization => "Copy Engine Group Utilization (%)",
            MetricFamily::EngineGroupRenderAllUtilization => "Render Engine Group Utilization (%)",
            MetricFamily::EngineGroup3dAllUtilization => "3D Engine Group Utilization (%)",
            MetricFamily::RasErrorCatReset => "Reset Counter",
            MetricFamily::RasErrorCatProgrammingErrors => "Programming Errors",
            MetricFamily::RasErrorCatDriverErrors => "Driver Errors",
            MetricFamily::RasErrorCatCacheErrorsCorrectable => "Cache Errors Correctable",
            MetricFamily::RasErrorCatCacheErrorsUncorrectable => "Cache Errors Uncorrectable",
            MetricFamily::RasErrorCatDisplayErrorsCorrectable => "Display Errors Correctable",
            MetricFamily::RasErrorCatDisplayErrorsUncorrectable => "Display Errors Uncorrectable",
            MetricFamily::RasErrorCatNonComputeErrorsCorrectable => {
                "Non Compute Errors Correctable"
            }
            MetricFamily::RasErrorCatNonComputeErrorsUncorrectable => {
                "Non Compute Errors Uncorrectable"
            }
            MetricFamily::MemoryTemperature => "GPU Memory Temperature (Celsius Degree)",
            MetricFamily::FrequencyThrottle => "GPU Frequency Throttle Ratio (%)",
            MetricFamily::FrequencyThrottleReasonGpu => "GPU Frequency Throttle Reason",
            MetricFamily::PcieReadThroughput => "PCIe Read Throughput (kB/s)",
            MetricFamily::PcieWriteThroughput => "PCIe Write Throughput (kB/s)",
            MetricFamily::PcieRead => "PCIe Read (kB)",
            MetricFamily::PcieWrite => "PCIe Write (kB)",
            MetricFamily::EngineUtilization => "Engine Utilization (%)",
            MetricFamily::FabricThroughput => "Fabric Throughput (MB/s)",
            MetricFamily::MediaEngineFrequency => "Media Engine Frequency (MHz)",
            MetricFamily::RequestFrequency => "GPU Request Frequency (MHz)",
            MetricFamily::PerfMetrics => "Performance Metrics",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn indices_are_stable_and_dense_enough() {
        assert_eq!(MetricFamily::GpuUtilization.index(), 0);
        assert_eq!(MetricFamily::Power.index(), 4);
        assert_eq!(MetricFamily::Energy.index(), 5);
        assert_eq!(MetricFamily::FabricThroughput.index(), 37);
        for family in MetricFamily::ALL {
            assert_eq!(MetricFamily::from_index(family.index()), Some(*family));
        }
        assert_eq!(MetricFamily::from_index(4096), None);
    }

    #[test]
    fn fanout_families_are_not_counters() {
        for family in MetricFamily::ALL {
            if family.fanout() != Fanout::Scalar {
                assert!(!family.is_counter(), "{family:?}");
            }
        }
    }

    #[test]
    fn group_families_map_to_their_groups() {
        assert_eq!(
            MetricFamily::EngineGroupCopyAllUtilization.engine_group(),
            Some(EngineGroup::CopyAll)
        );
        assert_eq!(MetricFamily::GpuUtilization.engine_group(), Some(EngineGroup::All));
        assert_eq!(MetricFamily::Temperature.engine_group(), None);
        assert!(!MetricFamily::GpuUtilization.is_engine_group_utilization());
    }
}
