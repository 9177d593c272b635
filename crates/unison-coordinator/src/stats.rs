//! Dispatch statistics for monitoring send failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use unison_core::DeviceId;

/// Per-device send counters (lock-free atomics).
#[derive(Debug, Default)]
pub struct DeviceDispatchStats {
    pub sent: AtomicU64,
    pub failed: AtomicU64,
}

impl DeviceDispatchStats {
    fn snapshot(&self) -> DeviceStatsSnapshot {
        DeviceStatsSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Live dispatch statistics shared by the dispatcher and observers.
///
/// Aggregate counters are atomics. Per-device entries are created on the
/// first send to a device and dropped by `forget`.
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Broadcasts issued.
    pub broadcasts: AtomicU64,
    /// Chunks handed to the dispatcher.
    pub chunks_dispatched: AtomicU64,
    /// Successful per-device sends (broadcast and unicast).
    pub sent: AtomicU64,
    /// Failed or timed-out per-device sends.
    pub failed: AtomicU64,
    devices: RwLock<HashMap<DeviceId, Arc<DeviceDispatchStats>>>,
}

impl DispatchStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Counters for `id`, created on first use.
    pub fn device(&self, id: &DeviceId) -> Arc<DeviceDispatchStats> {
        if let Some(stats) = self
            .devices
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
        {
            return Arc::clone(stats);
        }
        let mut devices = self.devices.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(devices.entry(id.clone()).or_default())
    }

    pub fn record_success(&self, id: &DeviceId) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        self.device(id).sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, id: &DeviceId) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.device(id).failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop the per-device entry of a disconnected device.
    pub fn forget(&self, id: &DeviceId) {
        self.devices
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
    }

    /// Get a snapshot of current stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        let devices = self
            .devices
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(id, stats)| (id.clone(), stats.snapshot()))
            .collect();
        StatsSnapshot {
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            chunks_dispatched: self.chunks_dispatched.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            devices,
        }
    }
}

/// Point-in-time snapshot of per-device statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStatsSnapshot {
    pub sent: u64,
    pub failed: u64,
}

/// Point-in-time snapshot of dispatch statistics.
#[derive(Debug, Clone, Default)]
pub struct StatsSnapshot {
    pub broadcasts: u64,
    pub chunks_dispatched: u64,
    pub sent: u64,
    pub failed: u64,
    pub devices: HashMap<DeviceId, DeviceStatsSnapshot>,
}

impl StatsSnapshot {
    /// Failed sends as a percentage of all attempts.
    pub fn failure_percent(&self) -> f64 {
        let attempts = self.sent + self.failed;
        if attempts == 0 {
            0.0
        } else {
            (self.failed as f64 / attempts as f64) * 100.0
        }
    }

    pub fn device(&self, id: &DeviceId) -> DeviceStatsSnapshot {
        self.devices.get(id).copied().unwrap_or_default()
    }
}
