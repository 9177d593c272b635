//! Coordinator events and handlers.

use async_trait::async_trait;
use unison_core::DeviceId;

/// Events emitted by the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    /// Connection accepted and identifier assigned.
    DeviceConnected(DeviceId),
    /// Device announced or changed its attributes.
    DeviceUpdated(DeviceId),
    /// Connection closed.
    DeviceDisconnected(DeviceId),
    /// Liveness sweep purged silent devices.
    DevicesPurged(Vec<DeviceId>),
    /// Prepare announced; chunk delivery scheduled.
    SessionStarted {
        source: String,
        start_timestamp: f64,
    },
    /// Every chunk was delivered.
    SessionCompleted { chunks_sent: usize },
    /// Session stopped on request.
    SessionStopped,
    /// Session could not be started.
    SessionFailed(String),
    /// Inbound message could not be parsed.
    MalformedMessage { device: DeviceId, reason: String },
}

/// Handler for coordinator events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Called when an event occurs.
    async fn on_event(&self, event: CoordinatorEvent);
}

/// No-op event handler.
pub struct NoOpHandler;

#[async_trait]
impl EventHandler for NoOpHandler {
    async fn on_event(&self, _event: CoordinatorEvent) {}
}

/// Callback-based event handler.
pub struct CallbackHandler<F>
where
    F: Fn(CoordinatorEvent) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackHandler<F>
where
    F: Fn(CoordinatorEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

#[async_trait]
impl<F> EventHandler for CallbackHandler<F>
where
    F: Fn(CoordinatorEvent) + Send + Sync,
{
    async fn on_event(&self, event: CoordinatorEvent) {
        (self.callback)(event);
    }
}
