// Copyright The XPU Manager Authors
// SPDX-License-Identifier: MIT

//! Errors surfaced by the data-logic pipeline and their wire-level codes.

use thiserror::Error;
use xpum_metrics::{DeviceId, MetricFamily, TileId};

/// Errors that can occur in the data-logic pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// The addressed device is not present in the device inventory.
    #[error("Device {device} not found")]
    DeviceNotFound {
        /// The device that was addressed.
        device: DeviceId,
    },

    /// The addressed tile does not exist on the device.
    #[error("Tile {tile} not found on device {device}")]
    TileNotFound {
        /// The device that was addressed.
        device: DeviceId,
        /// The tile that was addressed.
        tile: TileId,
    },

    /// The metric family is not in the process-wide enabled set.
    #[error("Metric {family:?} is not enabled")]
    MetricNotEnabled {
        /// The family that was requested.
        family: MetricFamily,
    },

    /// The device does not have the capability backing the family.
    #[error("Metric {family:?} is not supported on device {device}")]
    MetricNotSupported {
        /// The family that was requested.
        family: MetricFamily,
        /// The device that was addressed.
        device: DeviceId,
    },

    /// The session id is outside the configured session range.
    #[error("Session {session} is out of range (max {max})")]
    InvalidSession {
        /// The session id that was requested.
        session: u64,
        /// Number of configured sessions.
        max: u64,
    },

    /// All raw-data collection task slots hold running tasks.
    #[error("All {max} raw-data collection task slots are in use")]
    TooManyTraceTasks {
        /// Number of configured task slots.
        max: usize,
    },

    /// No raw-data collection task with the given id exists.
    #[error("Raw-data collection task {task_id} does not exist")]
    TraceTaskNotFound {
        /// The task id that was addressed.
        task_id: u32,
    },

    /// A remote fabric id could not be resolved to a device.
    #[error("No device is known for fabric id {fabric_id}")]
    RemoteFabricUnknown {
        /// The unresolved fabric id.
        fabric_id: u32,
    },

    /// Failure inside the pipeline that has no more specific kind.
    #[error("Internal error: {details}")]
    Internal {
        /// Human-readable failure details.
        details: String,
    },
}

/// Wire-level result codes of the RPC surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorCode {
    /// The operation succeeded.
    Ok,
    /// The addressed device is not present.
    DeviceNotFound,
    /// The addressed tile is not present.
    TileNotFound,
    /// The addressed device group is not present.
    GroupNotFound,
    /// The caller-provided buffer is smaller than the result count.
    BufferTooSmall,
    /// The metric is not supported by the device.
    MetricNotSupported,
    /// The metric is not in the enabled set.
    MetricNotEnabled,
    /// Any other failure.
    GenericError,
}

impl From<&Error> for ErrorCode {
    fn from(error: &Error) -> Self {
        match error {
            Error::DeviceNotFound { .. } => ErrorCode::DeviceNotFound,
            Error::TileNotFound { .. } => ErrorCode::TileNotFound,
            Error::MetricNotEnabled { .. } => ErrorCode::MetricNotEnabled,
            Error::MetricNotSupported { .. } => ErrorCode::MetricNotSupported,
            Error::InvalidSession { .. }
            | Error::TooManyTraceTasks { .. }
            | Error::TraceTaskNotFound { .. }
            | Error::RemoteFabricUnknown { .. }
            | Error::Internal { .. } => ErrorCode::GenericError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_error_kinds() {
        assert_eq!(
            ErrorCode::from(&Error::DeviceNotFound { device: 3 }),
            ErrorCode::DeviceNotFound
        );
        assert_eq!(
            ErrorCode::from(&Error::RemoteFabricUnknown { fabric_id: 9 }),
            ErrorCode::GenericError
        );
    }
}
