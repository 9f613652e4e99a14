//! Device storage.
//!
//! The store gives last-write-wins consistency and no serialization across
//! concurrent updates to the same record; conflicting writers must be
//! serialized externally, which the manager does with a keyed lock.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::SigdevError;
use crate::types::{Device, DeviceFilter};

/// Contract for device persistence. The interface stays identical whether the
/// backing store is an in-memory map or a database, so either can be swapped
/// without changing the manager.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Persists a new device. Errors if the id is already taken.
    async fn create(&self, device: Device) -> Result<Device, SigdevError>;

    /// Exact-match lookup by id.
    async fn get(&self, id: Uuid) -> Result<Device, SigdevError>;

    /// Devices matching `filter`, ordered by creation time.
    async fn list(&self, filter: DeviceFilter) -> Result<Vec<Device>, SigdevError>;

    /// Full-record replace. The caller supplies the complete updated record,
    /// including unchanged fields. Errors if the id has no record.
    async fn update(&self, device: Device) -> Result<(), SigdevError>;

    /// Removes a device. Succeeds even if absent.
    async fn delete(&self, id: Uuid) -> Result<(), SigdevError>;

    /// Number of devices matching `filter` (limit/offset ignored).
    async fn count(&self, filter: DeviceFilter) -> Result<u64, SigdevError>;
}

/// In-memory device store backed by a map.
pub struct MemoryDeviceStore {
    devices: RwLock<HashMap<Uuid, Device>>,
}

impl Default for MemoryDeviceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDeviceStore {
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
        }
    }
}

fn matches_filter(device: &Device, filter: &DeviceFilter) -> bool {
    filter.ids.is_empty() || filter.ids.contains(&device.id)
}

#[async_trait]
impl DeviceStore for MemoryDeviceStore {
    async fn create(&self, mut device: Device) -> Result<Device, SigdevError> {
        let mut devices = self.devices.write().await;

        if devices.contains_key(&device.id) {
            return Err(SigdevError::DeviceExists(device.id));
        }

        let now = Utc::now();
        device.created_at = now;
        device.updated_at = now;

        devices.insert(device.id, device.clone());
        Ok(device)
    }

    async fn get(&self, id: Uuid) -> Result<Device, SigdevError> {
        let devices = self.devices.read().await;
        devices.get(&id).cloned().ok_or(SigdevError::NotFound(id))
    }

    async fn list(&self, filter: DeviceFilter) -> Result<Vec<Device>, SigdevError> {
        let devices = self.devices.read().await;

        let mut matched: Vec<Device> = devices
            .values()
            .filter(|device| matches_filter(device, &filter))
            .cloned()
            .collect();

        // Secondary sort on id keeps ordering stable for equal timestamps.
        matched.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let start = filter.offset.min(matched.len());
        let end = match filter.limit {
            Some(limit) => (start + limit).min(matched.len()),
            None => matched.len(),
        };

        Ok(matched[start..end].to_vec())
    }

    async fn update(&self, mut device: Device) -> Result<(), SigdevError> {
        let mut devices = self.devices.write().await;

        let existing = devices
            .get(&device.id)
            .ok_or(SigdevError::NotFound(device.id))?;

        device.created_at = existing.created_at;
        device.updated_at = Utc::now();

        devices.insert(device.id, device);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), SigdevError> {
        let mut devices = self.devices.write().await;
        devices.remove(&id);
        Ok(())
    }

    async fn count(&self, filter: DeviceFilter) -> Result<u64, SigdevError> {
        let devices = self.devices.read().await;
        let count = devices
            .values()
            .filter(|device| matches_filter(device, &filter))
            .count();
        Ok(count as u64)
    }
}
