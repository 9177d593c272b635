//! Device registry: attributes, liveness and latency per connected device.

use crate::latency::LatencyWindow;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::time::Instant;
use unison_core::config::{DEFAULT_ACTIVE_TIMEOUT, DEFAULT_LATENCY_WINDOW, DEFAULT_SYNC_BUFFER};
use unison_core::{CoordinatorConfig, DeviceId, DeviceInfo};
use unison_protocol::DeviceSummary;

const DEFAULT_VOLUME: f64 = 1.0;

#[derive(Debug)]
struct DeviceEntry {
    info: DeviceInfo,
    enabled: bool,
    volume: f64,
    last_seen: Instant,
    latency: LatencyWindow,
}

#[derive(Debug, Default)]
struct Inner {
    devices: HashMap<DeviceId, DeviceEntry>,
    /// Insertion order of `devices`.
    order: Vec<DeviceId>,
}

impl Inner {
    fn iter(&self) -> impl Iterator<Item = (&DeviceId, &DeviceEntry)> {
        self.order
            .iter()
            .filter_map(move |id| self.devices.get(id).map(|entry| (id, entry)))
    }
}

/// A registered device, annotated with its current average latency.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub id: DeviceId,
    pub info: DeviceInfo,
    pub enabled: bool,
    pub volume: f64,
    pub last_seen: Instant,
    pub average_latency: f64,
}

impl Device {
    fn from_entry(id: &DeviceId, entry: &DeviceEntry) -> Self {
        Self {
            id: id.clone(),
            info: entry.info.clone(),
            enabled: entry.enabled,
            volume: entry.volume,
            last_seen: entry.last_seen,
            average_latency: entry.latency.average(),
        }
    }

    /// Entry for a `device_list` message.
    pub fn summary(&self) -> DeviceSummary {
        DeviceSummary {
            id: self.id.clone(),
            name: self.info.name.clone(),
            platform: self.info.platform.clone(),
            capabilities: self.info.capabilities.clone(),
            average_latency: self.average_latency,
            volume: self.volume,
            enabled: self.enabled,
            reported_latency: self.info.reported_latency,
        }
    }
}

/// Sole owner of device state.
///
/// All operations take `&self` and are safe to call from concurrent
/// connection handlers.
#[derive(Debug)]
pub struct DeviceRegistry {
    inner: RwLock<Inner>,
    latency_window: usize,
    active_timeout: Duration,
    sync_buffer: f64,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            latency_window: DEFAULT_LATENCY_WINDOW,
            active_timeout: DEFAULT_ACTIVE_TIMEOUT,
            sync_buffer: DEFAULT_SYNC_BUFFER.as_secs_f64(),
        }
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &CoordinatorConfig) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            latency_window: config.latency_window,
            active_timeout: config.active_timeout,
            sync_buffer: config.sync_buffer_secs(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    fn is_active(&self, entry: &DeviceEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.last_seen) < self.active_timeout
    }

    /// Insert or replace a device's announced attributes and refresh last-seen.
    ///
    /// Returns true when the device was not registered before. Volume,
    /// enabled flag and latency window of a known device are kept, as is
    /// its position in the ordering.
    pub fn upsert(&self, id: &DeviceId, info: DeviceInfo) -> bool {
        let now = Instant::now();
        let mut inner = self.write();
        if let Some(entry) = inner.devices.get_mut(id) {
            entry.info = info;
            entry.last_seen = now;
            return false;
        }
        inner.devices.insert(
            id.clone(),
            DeviceEntry {
                info,
                enabled: true,
                volume: DEFAULT_VOLUME,
                last_seen: now,
                latency: LatencyWindow::new(self.latency_window),
            },
        );
        inner.order.push(id.clone());
        true
    }

    /// Delete a device and its latency window. Returns whether it existed.
    pub fn remove(&self, id: &DeviceId) -> bool {
        let mut inner = self.write();
        if inner.devices.remove(id).is_none() {
            return false;
        }
        inner.order.retain(|d| d != id);
        true
    }

    /// Refresh last-seen without touching attributes. Unknown ids are ignored.
    pub fn touch(&self, id: &DeviceId) -> bool {
        match self.write().devices.get_mut(id) {
            Some(entry) => {
                entry.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.read().devices.contains_key(id)
    }

    pub fn get(&self, id: &DeviceId) -> Option<Device> {
        self.read()
            .devices
            .get(id)
            .map(|entry| Device::from_entry(id, entry))
    }

    /// First registered device announcing `name`.
    pub fn find_by_name(&self, name: &str) -> Option<Device> {
        self.read()
            .iter()
            .find(|(_, entry)| entry.info.name == name)
            .map(|(id, entry)| Device::from_entry(id, entry))
    }

    /// Registered devices, active or not.
    pub fn len(&self) -> usize {
        self.read().devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().devices.is_empty()
    }

    pub fn active_count(&self) -> usize {
        let now = Instant::now();
        self.read()
            .iter()
            .filter(|(_, entry)| self.is_active(entry, now))
            .count()
    }

    /// Devices seen within the liveness window, in insertion order.
    pub fn active_devices(&self) -> Vec<Device> {
        let now = Instant::now();
        self.read()
            .iter()
            .filter(|(_, entry)| self.is_active(entry, now))
            .map(|(id, entry)| Device::from_entry(id, entry))
            .collect()
    }

    pub fn active_ids(&self) -> Vec<DeviceId> {
        let now = Instant::now();
        self.read()
            .iter()
            .filter(|(_, entry)| self.is_active(entry, now))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Append a latency sample. Unknown devices are ignored.
    pub fn record_latency(&self, id: &DeviceId, sample: f64) -> bool {
        match self.write().devices.get_mut(id) {
            Some(entry) => {
                entry.latency.push(sample);
                true
            }
            None => false,
        }
    }

    /// Mean of the device's window; 0.0 when empty or unknown.
    pub fn average_latency(&self, id: &DeviceId) -> f64 {
        self.read()
            .devices
            .get(id)
            .map(|entry| entry.latency.average())
            .unwrap_or(0.0)
    }

    /// Worst average latency among active devices; 0.0 if none.
    pub fn max_active_latency(&self) -> f64 {
        let now = Instant::now();
        self.read()
            .iter()
            .filter(|(_, entry)| self.is_active(entry, now))
            .map(|(_, entry)| entry.latency.average())
            .fold(0.0, f64::max)
    }

    /// Lead needed so the slowest active device can act on a prepare in time.
    pub fn synchronization_delay(&self) -> f64 {
        self.max_active_latency() + self.sync_buffer
    }

    /// Purge devices silent for longer than `timeout`; returns their ids.
    pub fn sweep_inactive(&self, timeout: Duration) -> Vec<DeviceId> {
        let now = Instant::now();
        let mut inner = self.write();
        let purged: Vec<DeviceId> = inner
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.last_seen) > timeout)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &purged {
            inner.devices.remove(id);
        }
        if !purged.is_empty() {
            inner.order.retain(|id| !purged.contains(id));
            tracing::debug!("Purged {} inactive devices", purged.len());
        }
        purged
    }

    /// Set volume, clamped to [0, 1]. Returns whether the device exists.
    pub fn set_volume(&self, id: &DeviceId, volume: f64) -> bool {
        let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        match self.write().devices.get_mut(id) {
            Some(entry) => {
                entry.volume = volume;
                true
            }
            None => false,
        }
    }

    /// Volume of the device; 1.0 when unknown.
    pub fn volume(&self, id: &DeviceId) -> f64 {
        self.read()
            .devices
            .get(id)
            .map(|entry| entry.volume)
            .unwrap_or(DEFAULT_VOLUME)
    }

    pub fn set_enabled(&self, id: &DeviceId, enabled: bool) -> bool {
        match self.write().devices.get_mut(id) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Enabled flag of the device; false when unknown.
    pub fn is_enabled(&self, id: &DeviceId) -> bool {
        self.read()
            .devices
            .get(id)
            .map(|entry| entry.enabled)
            .unwrap_or(false)
    }
}
