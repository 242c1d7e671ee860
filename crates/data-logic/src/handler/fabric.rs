// Copyright The XPU Manager Authors
// SPDX-License-Identifier: MIT

//! Fabric-throughput derivation and per-link aggregation.
//!
//! Per-port rates are derived from the rx/tx byte counters, then ports
//! are aggregated into (attach, remote fabric, remote attach) links.
//! Each link publishes four synthetic metric ids: rx and tx rates plus
//! the accumulated rx and tx counters.

use crate::handler::DerivedDevice;
use std::collections::{BTreeMap, HashMap};
use xpum_metrics::{DeviceId, FabricThroughputKind, HandleId, Sample, TileId};

/// Synthetic metric id of one direction of one fabric link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FabricLinkKey {
    /// Local attach point (tile).
    pub attach_id: TileId,
    /// Fabric id of the remote device.
    pub remote_fabric_id: u32,
    /// Attach point (tile) on the remote device.
    pub remote_attach_id: TileId,
    /// Which of the four per-link signals this id carries.
    pub kind: FabricThroughputKind,
}

impl FabricLinkKey {
    /// Packs the key into the opaque handle id used by the statistics
    /// tables.
    #[must_use]
    pub fn to_handle(self) -> HandleId {
        let kind = match self.kind {
            FabricThroughputKind::Received => 0u64,
            FabricThroughputKind::Transmitted => 1,
            FabricThroughputKind::ReceivedCounter => 2,
            FabricThroughputKind::TransmittedCounter => 3,
        };
        (u64::from(self.attach_id & 0xFF) << 48)
            | (u64::from(self.remote_attach_id & 0xFF) << 40)
            | (kind << 32)
            | u64::from(self.remote_fabric_id)
    }

    /// Unpacks a handle id produced by [`FabricLinkKey::to_handle`].
    #[must_use]
    pub fn from_handle(handle: HandleId) -> Self {
        let kind = match (handle >> 32) & 0xFF {
            0 => FabricThroughputKind::Received,
            1 => FabricThroughputKind::Transmitted,
            2 => FabricThroughputKind::ReceivedCounter,
            _ => FabricThroughputKind::TransmittedCounter,
        };
        FabricLinkKey {
            attach_id: ((handle >> 48) & 0xFF) as TileId,
            remote_attach_id: ((handle >> 40) & 0xFF) as TileId,
            kind,
            remote_fabric_id: (handle & 0xFFFF_FFFF) as u32,
        }
    }
}

pub(crate) fn derive_fabric_throughput(
    previous: &Sample,
    latest: &Sample,
    scale: u64,
) -> HashMap<DeviceId, DerivedDevice> {
    let mut overlay = HashMap::new();
    for (device, metric) in &latest.devices {
        let Some(prev_metric) = previous.device(*device) else {
            continue;
        };

        // Per-link accumulators over the ports present in both samples.
        let mut links: BTreeMap<(TileId, u32, TileId), [u64; 4]> = BTreeMap::new();
        for (handle, port) in &metric.ports {
            let Some(prev_port) = prev_metric.ports.get(handle) else {
                continue;
            };
            let link = links
                .entry((port.attach_id, port.remote_fabric_id, port.remote_attach_id))
                .or_default();
            if let Some(dt) = port
                .timestamp
                .checked_sub(prev_port.timestamp)
                .filter(|dt| *dt != 0)
            {
                let drx = port.rx_counter.saturating_sub(prev_port.rx_counter);
                let dtx = port.tx_counter.saturating_sub(prev_port.tx_counter);
                let factor = u128::from(scale) * 1_000_000;
                link[0] += (factor * u128::from(drx) / u128::from(dt)) as u64;
                link[1] += (factor * u128::from(dtx) / u128::from(dt)) as u64;
            }
            link[2] += port.rx_counter;
            link[3] += port.tx_counter;
        }

        if links.is_empty() {
            continue;
        }
        let mut derived = DerivedDevice {
            scale: Some(scale),
            ..DerivedDevice::default()
        };
        for ((attach_id, remote_fabric_id, remote_attach_id), sums) in links {
            let kinds = [
                FabricThroughputKind::Received,
                FabricThroughputKind::Transmitted,
                FabricThroughputKind::ReceivedCounter,
                FabricThroughputKind::TransmittedCounter,
            ];
            for (kind, value) in kinds.into_iter().zip(sums) {
                let key = FabricLinkKey {
                    attach_id,
                    remote_fabric_id,
                    remote_attach_id,
                    kind,
                };
                let _ = derived.handles.insert(key.to_handle(), value);
            }
        }
        let _ = overlay.insert(*device, derived);
    }
    overlay
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use xpum_metrics::{DeviceMetric, PortMetric};

    fn port(rx: u64, tx: u64, ts: u64) -> PortMetric {
        PortMetric {
            rx_counter: rx,
            tx_counter: tx,
            timestamp: ts,
            attach_id: 0,
            remote_fabric_id: 7,
            remote_attach_id: 1,
        }
    }

    fn sample(ts: u64, ports: &[(u64, PortMetric)]) -> Sample {
        let mut devices = BTreeMap::new();
        let _ = devices.insert(
            0,
            DeviceMetric {
                ports: ports.iter().copied().collect(),
                ..DeviceMetric::default()
            },
        );
        Sample::new(ts, devices)
    }

    #[test]
    fn link_key_round_trips_through_handles() {
        let key = FabricLinkKey {
            attach_id: 1,
            remote_fabric_id: 0xDEAD,
            remote_attach_id: 0,
            kind: FabricThroughputKind::TransmittedCounter,
        };
        assert_eq!(FabricLinkKey::from_handle(key.to_handle()), key);
    }

    #[test]
    fn ports_of_one_link_sum_rates_and_counters() {
        let previous = sample(1000, &[(1, port(0, 0, 0)), (2, port(100, 50, 0))]);
        let latest = sample(
            2000,
            &[(1, port(3_000_000, 1_000_000, 1_000_000)), (2, port(100, 50, 1_000_000))],
        );
        let overlay = derive_fabric_throughput(&previous, &latest, 100);
        let derived = &overlay[&0];

        let key = |kind| {
            FabricLinkKey {
                attach_id: 0,
                remote_fabric_id: 7,
                remote_attach_id: 1,
                kind,
            }
            .to_handle()
        };
        // 3 MB over 1 s of device time, scaled: 100 * 1e6 * 3e6 / 1e6.
        assert_eq!(
            derived.handles[&key(FabricThroughputKind::Received)],
            300_000_000
        );
        assert_eq!(
            derived.handles[&key(FabricThroughputKind::Transmitted)],
            100_000_000
        );
        assert_eq!(
            derived.handles[&key(FabricThroughputKind::ReceivedCounter)],
            3_000_100
        );
        assert_eq!(
            derived.handles[&key(FabricThroughputKind::TransmittedCounter)],
            1_000_050
        );
    }
}
