// Copyright The XPU Manager Authors
// SPDX-License-Identifier: MIT

//! Per-session rolling statistics for fan-out families.
//!
//! The same shape serves engines, fabric links and performance-counter
//! collections: one rolling record per (session, device, handle).

use std::collections::{BTreeMap, HashMap};
use xpum_metrics::{DeviceId, HandleId, RollingStats, Timestamp};

/// Rolling statistics of all sessions for one fan-out family.
#[derive(Debug)]
pub struct HandleSessionStats {
    sessions: Vec<HashMap<DeviceId, BTreeMap<HandleId, RollingStats>>>,
}

impl HandleSessionStats {
    /// Creates empty statistics for `max_sessions` sessions.
    #[must_use]
    pub fn new(max_sessions: u64) -> Self {
        HandleSessionStats {
            sessions: (0..max_sessions).map(|_| HashMap::new()).collect(),
        }
    }

    /// Folds one tick of per-handle values into every session.
    pub fn update(&mut self, ts: Timestamp, device: DeviceId, values: &BTreeMap<HandleId, u64>) {
        if values.is_empty() {
            return;
        }
        for session in &mut self.sessions {
            let slots = session.entry(device).or_default();
            for (handle, value) in values {
                match slots.get_mut(handle) {
                    Some(stats) => stats.observe(Some(*value), ts),
                    None => {
                        let _ = slots.insert(*handle, RollingStats::seed(*value, ts));
                    }
                }
            }
        }
    }

    /// Removes and returns the per-handle records of (session, device),
    /// starting a fresh window for subsequent ticks.
    pub fn take(
        &mut self,
        session: u64,
        device: DeviceId,
    ) -> Option<BTreeMap<HandleId, RollingStats>> {
        self.sessions.get_mut(session as usize)?.remove(&device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn handles_accumulate_and_reset_per_device() {
        let mut stats = HandleSessionStats::new(2);
        let values: BTreeMap<HandleId, u64> = [(1, 10), (2, 90)].into_iter().collect();
        stats.update(1000, 0, &values);
        let values: BTreeMap<HandleId, u64> = [(1, 30)].into_iter().collect();
        stats.update(2000, 0, &values);

        let slots = stats.take(0, 0).expect("records");
        assert_eq!(slots[&1].count, 2);
        assert_eq!(slots[&1].min, 10);
        assert_eq!(slots[&1].max, 30);
        assert_eq!(slots[&2].count, 1);

        // A handle first seen after the reset seeds a new record.
        let values: BTreeMap<HandleId, u64> = [(3, 7)].into_iter().collect();
        stats.update(3000, 0, &values);
        let slots = stats.take(0, 0).expect("records");
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[&3].count, 1);
    }

    #[test]
    fn empty_tick_is_a_no_op() {
        let mut stats = HandleSessionStats::new(1);
        stats.update(1000, 0, &BTreeMap::new());
        assert_eq!(stats.take(0, 0), None);
    }
}
