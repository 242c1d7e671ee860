// Copyright The XPU Manager Authors
// SPDX-License-Identifier: MIT

//! Persist hook invoked for every stored sample.
//!
//! The registry calls the sink with the handler lock released; a slow or
//! failing sink therefore never blocks producers or consumers on the
//! handler mutex. Sink failures are logged and swallowed.

use std::sync::Arc;
use thiserror::Error;
use tracing::trace;
use xpum_metrics::{MetricFamily, Sample, Timestamp};

/// Failure reported by a [`Sink`] implementation.
#[derive(Error, Debug)]
#[error("Failed to persist measurement data: {details}")]
pub struct SinkError {
    /// Human-readable failure details.
    pub details: String,
}

/// Persistence hook for raw samples.
///
/// Implementations must be thread-safe; the registry may invoke the sink
/// concurrently for different families.
pub trait Sink: Send + Sync {
    /// Persists one per-family sample.
    fn store(&self, family: MetricFamily, ts_ms: Timestamp, sample: &Arc<Sample>)
    -> Result<(), SinkError>;
}

/// The default sink: logs the call and discards the data.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl Sink for NoopSink {
    fn store(
        &self,
        family: MetricFamily,
        ts_ms: Timestamp,
        sample: &Arc<Sample>,
    ) -> Result<(), SinkError> {
        trace!(
            ?family,
            ts_ms,
            devices = sample.devices.len(),
            "discarding measurement data"
        );
        Ok(())
    }
}
