// Copyright The XPU Manager Authors
// SPDX-License-Identifier: MIT

//! Process-wide configuration for the XPU manager core.
//!
//! Configuration is established once at daemon startup: the enabled
//! metric set is parsed from the `XPUM_METRICS` environment variable and
//! the numeric tunables come from [`Tunables::default`] unless a test or
//! embedder overrides them. Nothing here is consulted per sample; the
//! hot path reads precomputed booleans.

pub mod enabled;
pub mod error;
pub mod tunables;

pub use enabled::{EnabledMetrics, METRICS_ENV};
pub use error::Error;
pub use tunables::Tunables;
