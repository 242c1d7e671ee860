// Copyright The XPU Manager Authors
// SPDX-License-Identifier: MIT

//! The process-wide enabled-metric set.

use crate::error::Error;
use tracing::warn;
use xpum_metrics::MetricFamily;

/// Environment variable holding the enabled-metric index list, e.g.
/// `0,4-7,27-29`.
pub const METRICS_ENV: &str = "XPUM_METRICS";

/// Which metric families are collected and returned by this process.
///
/// Lookups are a per-family boolean so the sample path never re-parses
/// the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnabledMetrics {
    flags: [bool; MetricFamily::COUNT],
}

impl Default for EnabledMetrics {
    fn default() -> Self {
        Self::all()
    }
}

impl EnabledMetrics {
    /// Every known family enabled.
    #[must_use]
    pub fn all() -> Self {
        EnabledMetrics {
            flags: [true; MetricFamily::COUNT],
        }
    }

    /// No family enabled.
    #[must_use]
    pub fn none() -> Self {
        EnabledMetrics {
            flags: [false; MetricFamily::COUNT],
        }
    }

    /// Reads the set from [`METRICS_ENV`].
    ///
    /// An unset variable enables everything; an unparsable list disables
    /// everything.
    #[must_use]
    pub fn from_env() -> Self {
        match std::env::var(METRICS_ENV) {
            Ok(spec) => Self::from_spec(&spec),
            Err(_) => Self::all(),
        }
    }

    /// Parses an index list, falling back to the empty set on any
    /// unrecognized token.
    #[must_use]
    pub fn from_spec(spec: &str) -> Self {
        match Self::parse_spec(spec) {
            Ok(set) => set,
            Err(error) => {
                warn!(%error, "disabling all metrics: bad {METRICS_ENV} value");
                Self::none()
            }
        }
    }

    /// Parses a comma-separated index list with hyphen ranges.
    ///
    /// Indices that map to no known family are ignored; malformed tokens
    /// are an error.
    pub fn parse_spec(spec: &str) -> Result<Self, Error> {
        let mut set = Self::none();
        for token in spec.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            match token.split_once('-') {
                Some((lo, hi)) => {
                    let lo = parse_index(token, lo)?;
                    let hi = parse_index(token, hi)?;
                    if lo > hi {
                        return Err(Error::InvalidMetricsList {
                            token: token.to_owned(),
                            details: "range bounds are reversed".to_owned(),
                        });
                    }
                    for index in lo..=hi {
                        set.insert_index(index);
                    }
                }
                None => {
                    let index = parse_index(token, token)?;
                    set.insert_index(index);
                }
            }
        }
        Ok(set)
    }

    fn insert_index(&mut self, index: u32) {
        if let Some(family) = MetricFamily::from_index(index) {
            self.flags[family.index() as usize] = true;
        }
    }

    /// Whether a family is collected and returned.
    #[must_use]
    pub fn is_enabled(&self, family: MetricFamily) -> bool {
        self.flags[family.index() as usize]
    }

    /// Enabled families in stable-index order.
    pub fn families(&self) -> impl Iterator<Item = MetricFamily> + '_ {
        MetricFamily::ALL
            .iter()
            .copied()
            .filter(|family| self.is_enabled(*family))
    }
}

fn parse_index(token: &str, digits: &str) -> Result<u32, Error> {
    digits
        .trim()
        .parse::<u32>()
        .map_err(|e| Error::InvalidMetricsList {
            token: token.to_owned(),
            details: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_indices_and_ranges() {
        let set = EnabledMetrics::from_spec("0,4-5, 37");
        assert!(set.is_enabled(MetricFamily::GpuUtilization));
        assert!(set.is_enabled(MetricFamily::Power));
        assert!(set.is_enabled(MetricFamily::Energy));
        assert!(set.is_enabled(MetricFamily::FabricThroughput));
        assert!(!set.is_enabled(MetricFamily::Temperature));
    }

    #[test]
    fn unrecognized_token_disables_all() {
        let set = EnabledMetrics::from_spec("0,power");
        assert_eq!(set, EnabledMetrics::none());
        let set = EnabledMetrics::from_spec("7-4");
        assert_eq!(set, EnabledMetrics::none());
    }

    #[test]
    fn out_of_range_indices_are_ignored() {
        let set = EnabledMetrics::from_spec("4,4000");
        assert!(set.is_enabled(MetricFamily::Power));
        assert_eq!(set.families().count(), 1);
    }

    #[test]
    fn empty_spec_enables_nothing() {
        assert_eq!(EnabledMetrics::from_spec(""), EnabledMetrics::none());
    }
}
