// Copyright The XPU Manager Authors
// SPDX-License-Identifier: MIT

//! Per-(session, device) "last read" timestamp tables.
//!
//! Query operations report a half-open window `(begin, now]`: `begin` is
//! whatever the previous read stored, atomically replaced by "now" in
//! the same critical section.

use crate::now_ms;
use parking_lot::Mutex;
use std::collections::HashMap;
use xpum_metrics::{DeviceId, Timestamp};

/// One timestamp table; the registry keeps three of them (stats, engine
/// stats, fabric stats).
#[derive(Debug, Default)]
pub struct SessionTable {
    entries: Mutex<HashMap<(u64, DeviceId), Timestamp>>,
}

impl SessionTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the (session, device) entry to the current time.
    pub fn touch(&self, session: u64, device: DeviceId) {
        let mut entries = self.entries.lock();
        let _ = entries.insert((session, device), now_ms());
    }

    /// Returns the previously stored entry and replaces it with the
    /// current time in one critical section.
    ///
    /// A slot that was never touched reads as 0, so a first query covers
    /// the full history since startup.
    pub fn exchange(&self, session: u64, device: DeviceId) -> Timestamp {
        let mut entries = self.entries.lock();
        entries.insert((session, device), now_ms()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn first_exchange_returns_zero() {
        let table = SessionTable::new();
        assert_eq!(table.exchange(1, 0), 0);
    }

    #[test]
    fn exchange_returns_previous_now() {
        let table = SessionTable::new();
        let before = now_ms();
        let _ = table.exchange(1, 0);
        let begin = table.exchange(1, 0);
        let after = now_ms();
        assert!(begin >= before && begin <= after);
    }

    #[test]
    fn sessions_and_devices_are_independent() {
        let table = SessionTable::new();
        table.touch(1, 0);
        assert_eq!(table.exchange(2, 0), 0);
        assert_eq!(table.exchange(1, 1), 0);
        assert_ne!(table.exchange(1, 0), 0);
    }
}
