// Copyright The XPU Manager Authors
// SPDX-License-Identifier: MIT

//! The data-logic pipeline: the stages that turn raw per-metric samples
//! into latest values, per-session rolling statistics, rate conversions
//! and the query surface consumed by the RPC layer.
//!
//! Data flow:
//! - the polling probe calls [`DataLogic::store_sample`] once per tick
//!   per family;
//! - the handler registry routes the sample to the family's handler,
//!   which rotates previous/latest, runs family-specific math and folds
//!   the result into per-session rolling statistics;
//! - the raw-trace manager feeds active collection tasks from the same
//!   sample;
//! - query operations read back latest values and read-and-reset
//!   statistics windows.
//!
//! Producers and consumers run on parallel threads; each handler owns
//! one mutex guarding its previous/latest samples and statistics, and
//! the persistence sink is always invoked outside that mutex.

pub mod device;
pub mod error;
pub mod handler;
pub mod query;
pub mod registry;
pub mod session;
pub mod sink;
pub mod trace;
pub mod types;

pub use device::{DeviceInventory, FabricLink, StaticInventory};
pub use error::{Error, ErrorCode};
pub use query::DataLogic;
pub use registry::DataHandlerManager;
pub use sink::{NoopSink, Sink};

use xpum_metrics::Timestamp;

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> Timestamp {
    chrono::Utc::now().timestamp_millis().max(0) as Timestamp
}
