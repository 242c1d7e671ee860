// Copyright The XPU Manager Authors
// SPDX-License-Identifier: MIT

//! Error types for the dump-file module.

use thiserror::Error;
use xpum_metrics::{DeviceId, TileId};

/// Errors that can occur while managing dump-file tasks.
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

    /// No dump task with the given id exists.
    #[error("Dump task {task_id} does not exist")]
    TaskNotFound {
        /// The task id that was addressed.
        task_id: u32,
    },

    /// The dump file could not be created or written.
    #[error("Dump file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
