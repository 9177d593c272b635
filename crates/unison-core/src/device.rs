//! Device identification and static attributes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix of coordinator-assigned device identifiers.
const CLIENT_ID_PREFIX: &str = "client_";

/// Opaque session-scoped device identifier.
///
/// Assigned by the coordinator when a connection is accepted and never
/// reused while the process runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

/// Static attributes announced by a device in its `device_info` message.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    /// Human-readable display name.
    pub name: String,
    /// Platform tag (e.g. "android", "ios", "linux").
    pub platform: String,
    /// Declared capability set.
    pub capabilities: Vec<String>,
    /// Latency the device reports for itself, in seconds.
    pub reported_latency: f64,
}

impl DeviceId {
    /// Build the identifier for the `n`th accepted connection.
    pub fn sequential(n: u64) -> Self {
        Self(format!("{}{}", CLIENT_ID_PREFIX, n))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            name: "Unknown Device".to_string(),
            platform: "unknown".to_string(),
            capabilities: Vec::new(),
            reported_latency: 0.0,
        }
    }
}

impl DeviceInfo {
    pub fn new(name: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            platform: platform.into(),
            ..Default::default()
        }
    }
}
