//! Coordinator configuration.

use crate::error::ConfigError;
use std::path::PathBuf;
use std::time::Duration;

/// Latency samples retained per device.
pub const DEFAULT_LATENCY_WINDOW: usize = 10;
/// Devices silent longer than this are left out of the active view.
pub const DEFAULT_ACTIVE_TIMEOUT: Duration = Duration::from_secs(30);
/// Devices silent longer than this are purged by the liveness sweep.
pub const DEFAULT_PURGE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);
/// Fixed buffer on top of the worst active latency.
pub const DEFAULT_SYNC_BUFFER: Duration = Duration::from_millis(100);
/// Fixed lead between the start command and the synchronized start.
pub const DEFAULT_START_LEAD: Duration = Duration::from_secs(2);
pub const DEFAULT_CHUNK_BYTES: usize = 4096;
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(250);
pub const DEFAULT_SOURCE: &str = "default_audio.wav";

/// Tunables for the registry, session and dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    pub latency_window: usize,
    pub active_timeout: Duration,
    pub purge_timeout: Duration,
    pub sweep_interval: Duration,
    pub sync_buffer: Duration,
    pub start_lead: Duration,
    /// Chunk byte budget (before payload encoding).
    pub chunk_bytes: usize,
    /// Upper bound on a single per-device send.
    pub send_timeout: Duration,
    /// Source used when a start command names none.
    pub default_source: String,
    /// Directory that relative source references resolve against.
    pub media_root: PathBuf,
    /// Synthesize a test tone when a referenced file does not exist.
    pub test_tone_fallback: bool,
    pub fade_in: Duration,
    pub fade_out: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            latency_window: DEFAULT_LATENCY_WINDOW,
            active_timeout: DEFAULT_ACTIVE_TIMEOUT,
            purge_timeout: DEFAULT_PURGE_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            sync_buffer: DEFAULT_SYNC_BUFFER,
            start_lead: DEFAULT_START_LEAD,
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            default_source: DEFAULT_SOURCE.to_string(),
            media_root: PathBuf::from("."),
            test_tone_fallback: false,
            fade_in: Duration::ZERO,
            fade_out: Duration::ZERO,
        }
    }
}

impl CoordinatorConfig {
    /// Check invariants between fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.latency_window == 0 {
            return Err(ConfigError::InvalidValue {
                field: "latency_window",
                reason: "must hold at least one sample".to_string(),
            });
        }
        if self.active_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "active_timeout",
                reason: "must be positive".to_string(),
            });
        }
        if self.purge_timeout < self.active_timeout {
            return Err(ConfigError::InvalidValue {
                field: "purge_timeout",
                reason: format!(
                    "{:?} is shorter than active_timeout {:?}",
                    self.purge_timeout, self.active_timeout
                ),
            });
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "sweep_interval",
                reason: "must be positive".to_string(),
            });
        }
        if self.chunk_bytes < crate::audio::SAMPLE_WIDTH_BYTES {
            return Err(ConfigError::InvalidValue {
                field: "chunk_bytes",
                reason: format!(
                    "{} bytes cannot hold a single sample",
                    self.chunk_bytes
                ),
            });
        }
        if self.send_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "send_timeout",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Sync buffer in seconds.
    pub fn sync_buffer_secs(&self) -> f64 {
        self.sync_buffer.as_secs_f64()
    }

    /// Start lead in seconds.
    pub fn start_lead_secs(&self) -> f64 {
        self.start_lead.as_secs_f64()
    }
}
