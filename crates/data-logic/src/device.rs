// Copyright The XPU Manager Authors
// SPDX-License-Identifier: MIT

//! Boundary to the device manager.
//!
//! Discovery and hardware access live outside this crate; the query
//! layer only needs the read-side facts collected at discovery time:
//! which devices and tiles exist, which metric capabilities each device
//! has, how engine handles map to public engine indices and how fabric
//! ids resolve to devices.

use std::collections::HashMap;
use xpum_metrics::{DeviceId, EngineType, HandleId, MetricFamily, TileId};

/// One fabric link of a device, as enumerated at discovery time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FabricLink {
    /// Local attach point (tile).
    pub attach_id: TileId,
    /// Fabric id of the remote device.
    pub remote_fabric_id: u32,
    /// Attach point (tile) on the remote device.
    pub remote_attach_id: TileId,
}

/// Read-side view of the device manager.
pub trait DeviceInventory: Send + Sync {
    /// Whether the device is present.
    fn contains(&self, device: DeviceId) -> bool;

    /// All present devices.
    fn devices(&self) -> Vec<DeviceId>;

    /// Number of tiles of the device; zero for single-tile packages that
    /// expose no sub-devices.
    fn tile_count(&self, device: DeviceId) -> u32;

    /// Whether the device has the capability backing a family.
    fn supports(&self, device: DeviceId, family: MetricFamily) -> bool;

    /// Public engine index and type for an engine handle, if the device
    /// manager maps the handle to a public engine.
    fn engine_index(&self, device: DeviceId, handle: HandleId) -> Option<(u32, EngineType)>;

    /// Number of public engines of the device.
    fn engine_count(&self, device: DeviceId) -> u32;

    /// Resolves a fabric id to the device carrying it.
    fn device_by_fabric_id(&self, fabric_id: u32) -> Option<DeviceId>;

    /// Fabric links of the device.
    fn fabric_links(&self, device: DeviceId) -> Vec<FabricLink>;
}

/// In-memory inventory populated at discovery time.
#[derive(Debug, Default)]
pub struct StaticInventory {
    devices: HashMap<DeviceId, DeviceEntry>,
    fabric_ids: HashMap<u32, DeviceId>,
}

#[derive(Debug, Default)]
struct DeviceEntry {
    tile_count: u32,
    capabilities: Vec<MetricFamily>,
    engines: HashMap<HandleId, (u32, EngineType)>,
    links: Vec<FabricLink>,
}

impl StaticInventory {
    /// Creates an empty inventory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a device with its tile count and capability set.
    pub fn add_device(&mut self, device: DeviceId, tile_count: u32, capabilities: &[MetricFamily]) {
        let _ = self.devices.insert(
            device,
            DeviceEntry {
                tile_count,
                capabilities: capabilities.to_vec(),
                ..DeviceEntry::default()
            },
        );
    }

    /// Maps an engine handle of a device to a public engine index.
    pub fn add_engine(
        &mut self,
        device: DeviceId,
        handle: HandleId,
        index: u32,
        engine_type: EngineType,
    ) {
        if let Some(entry) = self.devices.get_mut(&device) {
            let _ = entry.engines.insert(handle, (index, engine_type));
        }
    }

    /// Assigns a fabric id to a device and records a link.
    pub fn add_fabric_id(&mut self, fabric_id: u32, device: DeviceId) {
        let _ = self.fabric_ids.insert(fabric_id, device);
    }

    /// Records a fabric link of a device.
    pub fn add_fabric_link(&mut self, device: DeviceId, link: FabricLink) {
        if let Some(entry) = self.devices.get_mut(&device) {
            entry.links.push(link);
        }
    }
}

impl DeviceInventory for StaticInventory {
    fn contains(&self, device: DeviceId) -> bool {
        self.devices.contains_key(&device)
    }

    fn devices(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.devices.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn tile_count(&self, device: DeviceId) -> u32 {
        self.devices.get(&device).map_or(0, |e| e.tile_count)
    }

    fn supports(&self, device: DeviceId, family: MetricFamily) -> bool {
        self.devices
            .get(&device)
            .is_some_and(|e| e.capabilities.contains(&family))
    }

    fn engine_index(&self, device: DeviceId, handle: HandleId) -> Option<(u32, EngineType)> {
        self.devices.get(&device)?.engines.get(&handle).copied()
    }

    fn engine_count(&self, device: DeviceId) -> u32 {
        self.devices.get(&device).map_or(0, |e| e.engines.len() as u32)
    }

    fn device_by_fabric_id(&self, fabric_id: u32) -> Option<DeviceId> {
        self.fabric_ids.get(&fabric_id).copied()
    }

    fn fabric_links(&self, device: DeviceId) -> Vec<FabricLink> {
        self.devices.get(&device).map_or_else(Vec::new, |e| e.links.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn inventory_answers_capability_and_mapping_queries() {
        let mut inventory = StaticInventory::new();
        inventory.add_device(0, 2, &[MetricFamily::Temperature, MetricFamily::Power]);
        inventory.add_engine(0, 0x10, 3, EngineType::Compute);
        inventory.add_fabric_id(7, 0);

        assert!(inventory.contains(0));
        assert!(!inventory.contains(1));
        assert_eq!(inventory.tile_count(0), 2);
        assert!(inventory.supports(0, MetricFamily::Power));
        assert!(!inventory.supports(0, MetricFamily::FabricThroughput));
        assert_eq!(inventory.engine_index(0, 0x10), Some((3, EngineType::Compute)));
        assert_eq!(inventory.engine_index(0, 0x11), None);
        assert_eq!(inventory.device_by_fabric_id(7), Some(0));
    }
}
