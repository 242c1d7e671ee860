// Copyright The XPU Manager Authors
// SPDX-License-Identifier: MIT

//! Per-session rolling statistics for scalar families.
//!
//! One slot per (session, device) with nested per-tile records. Slots
//! seed on the first present value, count every tick afterwards (absent
//! ticks update the count only) and are removed wholesale on
//! read-and-reset.

use std::collections::{BTreeMap, HashMap};
use xpum_metrics::{DeviceId, RollingStats, TileId, Timestamp};

/// Statistics slot of one (session, device) pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceSlot {
    /// Whole-device rolling statistics; `None` until a value was seen.
    pub device: Option<RollingStats>,
    /// Per-tile rolling statistics; tiles only count present ticks.
    pub subdevices: BTreeMap<TileId, RollingStats>,
}

/// Rolling statistics of all sessions for one scalar family.
#[derive(Debug)]
pub struct ScalarSessionStats {
    sessions: Vec<HashMap<DeviceId, DeviceSlot>>,
}

impl ScalarSessionStats {
    /// Creates empty statistics for `max_sessions` sessions.
    #[must_use]
    pub fn new(max_sessions: u64) -> Self {
        ScalarSessionStats {
            sessions: (0..max_sessions).map(|_| HashMap::new()).collect(),
        }
    }

    /// Folds one tick of one device into every session.
    pub fn update(
        &mut self,
        ts: Timestamp,
        device: DeviceId,
        current: Option<u64>,
        subdevices: &BTreeMap<TileId, u64>,
    ) {
        for session in &mut self.sessions {
            match session.get_mut(&device) {
                Some(slot) => {
                    match slot.device.as_mut() {
                        Some(stats) => stats.observe(current, ts),
                        None => {
                            if let Some(value) = current {
                                slot.device = Some(RollingStats::seed(value, ts));
                            }
                        }
                    }
                    observe_subdevices(slot, subdevices, ts);
                }
                None => {
                    if current.is_none() && subdevices.is_empty() {
                        continue;
                    }
                    let mut slot = DeviceSlot {
                        device: current.map(|value| RollingStats::seed(value, ts)),
                        subdevices: BTreeMap::new(),
                    };
                    observe_subdevices(&mut slot, subdevices, ts);
                    let _ = session.insert(device, slot);
                }
            }
        }
    }

    /// Removes and returns the (session, device) slot, starting a fresh
    /// window for subsequent ticks.
    pub fn take(&mut self, session: u64, device: DeviceId) -> Option<DeviceSlot> {
        self.sessions.get_mut(session as usize)?.remove(&device)
    }
}

fn observe_subdevices(slot: &mut DeviceSlot, subdevices: &BTreeMap<TileId, u64>, ts: Timestamp) {
    for (tile, value) in subdevices {
        match slot.subdevices.get_mut(tile) {
            Some(stats) => stats.observe(Some(*value), ts),
            None => {
                let _ = slot.subdevices.insert(*tile, RollingStats::seed(*value, ts));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn no_tiles() -> BTreeMap<TileId, u64> {
        BTreeMap::new()
    }

    #[test]
    fn sessions_accumulate_independently() {
        let mut stats = ScalarSessionStats::new(2);
        stats.update(1000, 0, Some(100), &no_tiles());
        stats.update(2000, 0, Some(200), &no_tiles());

        let slot = stats.take(0, 0).expect("slot for session 0");
        let device = slot.device.expect("device stats");
        assert_eq!(device.count, 2);
        assert!((device.avg - 150.0).abs() < 1e-9);

        // Session 1 was untouched by the reset of session 0.
        let slot = stats.take(1, 0).expect("slot for session 1");
        assert_eq!(slot.device.expect("device stats").count, 2);
    }

    #[test]
    fn reset_starts_a_fresh_window() {
        let mut stats = ScalarSessionStats::new(1);
        stats.update(1000, 0, Some(10), &no_tiles());
        let _ = stats.take(0, 0);
        stats.update(2000, 0, Some(30), &no_tiles());
        let slot = stats.take(0, 0).expect("slot reseeded");
        let device = slot.device.expect("device stats");
        assert_eq!(device.count, 1);
        assert_eq!(device.min, 30);
        assert_eq!(device.start_time, 2000);
    }

    #[test]
    fn absent_tick_does_not_seed() {
        let mut stats = ScalarSessionStats::new(1);
        stats.update(1000, 0, None, &no_tiles());
        assert_eq!(stats.take(0, 0), None);
    }

    #[test]
    fn tiles_track_their_own_extrema() {
        let mut stats = ScalarSessionStats::new(1);
        let tiles: BTreeMap<TileId, u64> = [(0, 5), (1, 50)].into_iter().collect();
        stats.update(1000, 0, Some(20), &tiles);
        let tiles: BTreeMap<TileId, u64> = [(0, 15)].into_iter().collect();
        stats.update(2000, 0, Some(30), &tiles);

        let slot = stats.take(0, 0).expect("slot");
        assert_eq!(slot.subdevices[&0].min, 5);
        assert_eq!(slot.subdevices[&0].max, 15);
        assert_eq!(slot.subdevices[&0].count, 2);
        assert_eq!(slot.subdevices[&1].count, 1);
    }
}
