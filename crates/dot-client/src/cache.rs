//! Device list cache with explicit staleness.

use std::sync::RwLock;

use chrono::{DateTime, TimeDelta, Utc};

use crate::api::models::Device;

/// A device list together with when it was fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedDevices {
    pub devices: Vec<Device>,
    pub fetched_at: DateTime<Utc>,
    pub ttl: TimeDelta,
}

impl CachedDevices {
    /// A TTL reaching past the representable range never goes stale.
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        self.fetched_at
            .checked_add_signed(self.ttl)
            .is_some_and(|deadline| now >= deadline)
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.devices.iter().any(|d| d.id == device_id)
    }

    pub fn get(&self, device_id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == device_id)
    }
}

pub(crate) struct DeviceCache {
    ttl: TimeDelta,
    entry: RwLock<Option<CachedDevices>>,
}

impl DeviceCache {
    pub(crate) fn new(ttl: TimeDelta) -> Self {
        Self {
            ttl,
            entry: RwLock::new(None),
        }
    }

    pub(crate) fn store(&self, devices: Vec<Device>, now: DateTime<Utc>) {
        let mut entry = self.entry.write().unwrap_or_else(|p| p.into_inner());
        *entry = Some(CachedDevices {
            devices,
            fetched_at: now,
            ttl: self.ttl,
        });
    }

    pub(crate) fn snapshot(&self) -> Option<CachedDevices> {
        self.entry
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Fresh snapshot only; `None` when empty or past its TTL.
    pub(crate) fn fresh(&self, now: DateTime<Utc>) -> Option<CachedDevices> {
        self.snapshot().filter(|c| !c.is_stale_at(now))
    }

    pub(crate) fn clear(&self) {
        *self.entry.write().unwrap_or_else(|p| p.into_inner()) = None;
    }
}
