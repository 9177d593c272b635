//! Coordinator builder for configuration.

use crate::{Coordinator, EventHandler, NoOpHandler};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use unison_audio::{FileSourceResolver, SourceResolver};
use unison_core::error::Result;
use unison_core::CoordinatorConfig;
use unison_timing::Clock;

/// Builder for configuring a [`Coordinator`].
pub struct CoordinatorBuilder {
    config: CoordinatorConfig,
    resolver: Option<Arc<dyn SourceResolver>>,
    event_handler: Option<Arc<dyn EventHandler>>,
    clock: Option<Clock>,
}

impl CoordinatorBuilder {
    /// Create new builder with defaults.
    pub fn new() -> Self {
        Self {
            config: CoordinatorConfig::default(),
            resolver: None,
            event_handler: None,
            clock: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Directory that relative source references resolve against.
    pub fn media_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.media_root = root.into();
        self
    }

    pub fn default_source(mut self, source: impl Into<String>) -> Self {
        self.config.default_source = source.into();
        self
    }

    /// Set the chunk byte budget.
    pub fn chunk_bytes(mut self, bytes: usize) -> Self {
        self.config.chunk_bytes = bytes;
        self
    }

    /// Set the fixed lead added on top of the synchronization delay.
    pub fn start_lead(mut self, lead: Duration) -> Self {
        self.config.start_lead = lead;
        self
    }

    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.config.send_timeout = timeout;
        self
    }

    /// Stream a test tone when a referenced file does not exist.
    pub fn test_tone_fallback(mut self, enabled: bool) -> Self {
        self.config.test_tone_fallback = enabled;
        self
    }

    /// Use a custom codec instead of the file-backed resolver.
    pub fn resolver(mut self, resolver: impl SourceResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Set event handler.
    pub fn event_handler(mut self, handler: impl EventHandler + 'static) -> Self {
        self.event_handler = Some(Arc::new(handler));
        self
    }

    /// Anchor the coordinator's wall clock explicitly.
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the coordinator.
    pub fn build(self) -> Result<Arc<Coordinator>> {
        self.config.validate()?;

        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(FileSourceResolver::from_config(&self.config)));
        let events = self
            .event_handler
            .unwrap_or_else(|| Arc::new(NoOpHandler));
        let clock = self.clock.unwrap_or_default();

        tracing::debug!("Building coordinator with {:?}", self.config);
        Ok(Arc::new(Coordinator::new(self.config, clock, resolver, events)))
    }
}

impl Default for CoordinatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unison_core::{ConfigError, DecodedAudio, Error};

    mod builder {
        use super::*;

        #[test]
        fn new_has_defaults() {
            let builder = CoordinatorBuilder::new();
            assert_eq!(builder.config, CoordinatorConfig::default());
            assert!(builder.resolver.is_none());
            assert!(builder.event_handler.is_none());
        }

        #[test]
        fn setters_update_config() {
            let builder = CoordinatorBuilder::new()
                .media_root("/srv/media")
                .chunk_bytes(8192)
                .start_lead(Duration::from_millis(500))
                .test_tone_fallback(true)
                .default_source("intro.flac");

            assert_eq!(builder.config.media_root, PathBuf::from("/srv/media"));
            assert_eq!(builder.config.chunk_bytes, 8192);
            assert_eq!(builder.config.start_lead, Duration::from_millis(500));
            assert!(builder.config.test_tone_fallback);
            assert_eq!(builder.config.default_source, "intro.flac");
        }

        #[test]
        fn resolver_is_stored() {
            let builder = CoordinatorBuilder::new().resolver(|_: &str| -> Result<DecodedAudio> {
                Ok(DecodedAudio::new(Vec::new(), 44_100, 2))
            });
            assert!(builder.resolver.is_some());
        }
    }

    mod build {
        use super::*;

        #[tokio::test]
        async fn builds_with_defaults() {
            let coordinator = CoordinatorBuilder::new().build().unwrap();
            assert_eq!(coordinator.config().chunk_bytes, 4096);
            assert_eq!(coordinator.connection_count(), 0);
        }

        #[test]
        fn rejects_invalid_config() {
            let result = CoordinatorBuilder::new().chunk_bytes(0).build();
            assert!(matches!(
                result,
                Err(Error::Config(ConfigError::InvalidValue {
                    field: "chunk_bytes",
                    ..
                }))
            ));
        }

        #[tokio::test]
        async fn uses_supplied_clock() {
            let coordinator = CoordinatorBuilder::new()
                .clock(Clock::with_wall_origin(123.0))
                .build()
                .unwrap();
            let now = coordinator.clock().now_wall();
            assert!((123.0..124.0).contains(&now));
        }
    }
}
