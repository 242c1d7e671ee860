// Copyright The XPU Manager Authors
// SPDX-License-Identifier: MIT

//! Error types for the configuration module.

use thiserror::Error;

/// Errors that can occur while reading configuration.
#[derive(Error, Debug)]
pub enum Error {
    /// A token of the enabled-metric list is neither an index nor an
    /// index range.
    #[error("Invalid metrics list token '{token}': {details}")]
    InvalidMetricsList {
        /// The token that failed to parse.
        token: String,
        /// Human-readable details of the parsing failure.
        details: String,
    },
}
