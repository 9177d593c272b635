//! # unison-coordinator
//!
//! Synchronized multi-device playback coordinator.
//!
//! This crate provides:
//! - The device registry with per-device latency tracking
//! - The streaming session state machine
//! - Broadcast fan-out to device connections
//! - A WebSocket transport for the device channel
//!
//! ## Example
//!
//! ```ignore
//! use unison_coordinator::{ws, CoordinatorBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let coordinator = CoordinatorBuilder::new()
//!         .media_root("/srv/media")
//!         .build()?;
//!     coordinator.spawn_maintenance();
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     ws::serve(listener, coordinator, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!     Ok(())
//! }
//! ```

mod builder;
mod coordinator;
mod dispatcher;
mod events;
mod latency;
mod registry;
mod session;
mod stats;
pub mod ws;

pub use builder::CoordinatorBuilder;
pub use coordinator::Coordinator;
pub use dispatcher::{BroadcastReport, DeviceSink, Dispatcher};
pub use events::{CallbackHandler, CoordinatorEvent, EventHandler, NoOpHandler};
pub use latency::LatencyWindow;
pub use registry::{Device, DeviceRegistry};
pub use session::{SessionController, SessionState, StartOutcome, StreamingSession};
pub use stats::{DeviceStatsSnapshot, DispatchStats, StatsSnapshot};

// Re-export commonly used types
pub use unison_audio::SourceResolver;
pub use unison_core::{CoordinatorConfig, DecodedAudio, DeviceId, DeviceInfo, Error, Result};
pub use unison_protocol::{ClientMessage, DeviceSummary, ServerMessage};
pub use unison_timing::Clock;
