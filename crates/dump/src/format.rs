// Copyright The XPU Manager Authors
// SPDX-License-Identifier: MIT

//! CSV formatting of dump rows.

use chrono::{Local, TimeZone};
use xpum_metrics::{MetricFamily, Timestamp};

/// Header row: `Timestamp, DeviceId[, TileId]` followed by one
/// unit-annotated label per selected family.
#[must_use]
pub fn header(families: &[MetricFamily], tile_mode: bool) -> String {
    let mut columns = vec!["Timestamp".to_owned(), "DeviceId".to_owned()];
    if tile_mode {
        columns.push("TileId".to_owned());
    }
    columns.extend(families.iter().map(|family| family.label().to_owned()));
    columns.join(", ")
}

/// The timestamp column: ISO-8601 local time with millisecond precision
/// when `show_date`, epoch milliseconds otherwise.
#[must_use]
pub fn timestamp(ts_ms: Timestamp, show_date: bool) -> String {
    if show_date {
        match Local.timestamp_millis_opt(ts_ms as i64).single() {
            Some(time) => time.format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
            None => ts_ms.to_string(),
        }
    } else {
        ts_ms.to_string()
    }
}

/// One value cell with the scale divided out; `None` is an empty field.
#[must_use]
pub fn value(value: Option<u64>, scale: u64) -> String {
    match value {
        None => String::new(),
        Some(v) if scale <= 1 => v.to_string(),
        Some(v) => {
            let decimals = scale.ilog10() as usize;
            format!("{:.*}", decimals, v as f64 / scale as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn header_annotates_units_and_tile_mode() {
        let families = [MetricFamily::Temperature, MetricFamily::Power];
        assert_eq!(
            header(&families, false),
            "Timestamp, DeviceId, GPU Core Temperature (Celsius Degree), GPU Power (W)"
        );
        assert!(header(&families, true).starts_with("Timestamp, DeviceId, TileId,"));
    }

    #[test]
    fn values_divide_out_the_scale() {
        assert_eq!(value(Some(42), 1), "42");
        assert_eq!(value(Some(12_345), 100), "123.45");
        assert_eq!(value(Some(7_500), 100), "75.00");
        assert_eq!(value(None, 100), "");
    }

    #[test]
    fn epoch_timestamps_pass_through() {
        assert_eq!(timestamp(1234, false), "1234");
        // Local-time rendering carries millisecond precision.
        assert!(timestamp(1_700_000_000_123, true).ends_with(".123"));
    }
}
