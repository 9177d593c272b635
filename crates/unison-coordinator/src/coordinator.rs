//! Coordinator context: owns the registry, dispatcher and session.

use crate::dispatcher::{DeviceSink, Dispatcher};
use crate::events::{CoordinatorEvent, EventHandler};
use crate::registry::DeviceRegistry;
use crate::session::{SessionController, SessionState, StartOutcome};
use crate::stats::{DispatchStats, StatsSnapshot};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use unison_audio::SourceResolver;
use unison_core::{CoordinatorConfig, DeviceId, DeviceInfo};
use unison_protocol::{decode_client, ClientMessage, DeviceSummary, ServerMessage};
use unison_timing::Clock;

/// Synchronized playback coordinator.
///
/// Constructed once at service start and shared by every connection
/// handler. Connection handlers call [`connect`](Self::connect),
/// [`handle_text`](Self::handle_text) and [`disconnect`](Self::disconnect).
pub struct Coordinator {
    config: CoordinatorConfig,
    clock: Clock,
    registry: Arc<DeviceRegistry>,
    dispatcher: Arc<Dispatcher>,
    session: SessionController,
    events: Arc<dyn EventHandler>,
    stats: Arc<DispatchStats>,
    next_id: AtomicU64,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl Coordinator {
    pub(crate) fn new(
        config: CoordinatorConfig,
        clock: Clock,
        resolver: Arc<dyn SourceResolver>,
        events: Arc<dyn EventHandler>,
    ) -> Self {
        let registry = Arc::new(DeviceRegistry::from_config(&config));
        let stats = DispatchStats::new();
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&stats),
            config.send_timeout,
        ));
        let session = SessionController::new(
            &config,
            clock,
            Arc::clone(&registry),
            Arc::clone(&dispatcher),
            resolver,
            Arc::clone(&events),
        );
        Self {
            config,
            clock,
            registry,
            dispatcher,
            session,
            events,
            stats,
            next_id: AtomicU64::new(0),
            maintenance: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn connection_count(&self) -> usize {
        self.dispatcher.connection_count()
    }

    /// Current `device_list` entries.
    pub fn device_list(&self) -> Vec<DeviceSummary> {
        self.registry
            .active_devices()
            .iter()
            .map(|device| device.summary())
            .collect()
    }

    async fn broadcast_device_list(&self) {
        let devices = self.device_list();
        self.dispatcher
            .broadcast(&ServerMessage::DeviceList { devices })
            .await;
    }

    /// Accept a new connection and assign its identifier.
    ///
    /// The newcomer receives the welcome and the current device list; the
    /// list is then re-announced to everyone else.
    pub async fn connect(&self, sink: Arc<dyn DeviceSink>) -> DeviceId {
        let id = DeviceId::sequential(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.dispatcher.attach(id.clone(), sink);
        tracing::info!("Device {} connected", id);

        if let Err(e) = self
            .dispatcher
            .unicast(&id, &ServerMessage::welcome(id.clone()))
            .await
        {
            tracing::warn!("Failed to welcome {}: {}", id, e);
        }
        let devices = self.device_list();
        if let Err(e) = self
            .dispatcher
            .unicast(&id, &ServerMessage::DeviceList { devices })
            .await
        {
            tracing::debug!("Failed to send device list to {}: {}", id, e);
        }
        self.broadcast_device_list().await;

        self.events
            .on_event(CoordinatorEvent::DeviceConnected(id.clone()))
            .await;
        id
    }

    /// Forget a closed connection and its device.
    pub async fn disconnect(&self, id: &DeviceId) {
        let was_connected = self.dispatcher.detach(id);
        let was_registered = self.registry.remove(id);
        self.stats.forget(id);
        if !was_connected && !was_registered {
            return;
        }
        tracing::info!("Device {} disconnected", id);

        self.broadcast_device_list().await;
        self.events
            .on_event(CoordinatorEvent::DeviceDisconnected(id.clone()))
            .await;
    }

    /// Handle one inbound text frame from `id`.
    ///
    /// Malformed frames are logged and otherwise ignored.
    pub async fn handle_text(&self, id: &DeviceId, text: &str) {
        self.registry.touch(id);
        match decode_client(text) {
            Ok(message) => self.handle_message(id, message).await,
            Err(e) => self.reject(id, e.to_string()).await,
        }
    }

    /// Log and report an inbound frame that cannot be handled.
    pub async fn reject(&self, id: &DeviceId, reason: String) {
        tracing::warn!("Ignoring message from {}: {}", id, reason);
        self.events
            .on_event(CoordinatorEvent::MalformedMessage {
                device: id.clone(),
                reason,
            })
            .await;
    }

    /// Dispatch a parsed message from `id`.
    pub async fn handle_message(&self, id: &DeviceId, message: ClientMessage) {
        tracing::debug!("{} from {}", message.kind(), id);
        match message {
            ClientMessage::DeviceInfo {
                device_name,
                platform,
                capabilities,
                latency,
            } => {
                let info = DeviceInfo {
                    name: device_name,
                    platform,
                    capabilities,
                    reported_latency: latency,
                };
                if self.registry.upsert(id, info) {
                    tracing::info!("Device {} registered", id);
                }
                self.events
                    .on_event(CoordinatorEvent::DeviceUpdated(id.clone()))
                    .await;
                self.broadcast_device_list().await;
            }
            ClientMessage::StartStreaming { audio_file } => {
                match self.session.start(audio_file.as_deref()).await {
                    Ok(StartOutcome::Started(_)) | Ok(StartOutcome::Cancelled) => {}
                    Ok(StartOutcome::AlreadyActive) => {
                        tracing::debug!("Start from {} ignored: session already active", id);
                    }
                    Err(e) => tracing::error!("Start requested by {} failed: {}", id, e),
                }
            }
            ClientMessage::StopStreaming => {
                self.session.stop().await;
            }
            ClientMessage::SyncRequest => {
                let response = ServerMessage::SyncResponse {
                    server_timestamp: self.clock.now_wall(),
                    client_id: id.clone(),
                };
                if let Err(e) = self.dispatcher.unicast(id, &response).await {
                    tracing::debug!("Sync response to {} not sent: {}", id, e);
                }
            }
            ClientMessage::AudioChunkAck {
                chunk_id,
                timestamp,
            } => self.record_ack(id, chunk_id, timestamp),
            ClientMessage::SetVolume { device_id, volume } => {
                if self.registry.set_volume(&device_id, volume) {
                    self.broadcast_device_list().await;
                } else {
                    tracing::debug!("Volume for unknown device {} ignored", device_id);
                }
            }
            ClientMessage::SetEnabled { device_id, enabled } => {
                if self.registry.set_enabled(&device_id, enabled) {
                    self.broadcast_device_list().await;
                } else {
                    tracing::debug!("Enable for unknown device {} ignored", device_id);
                }
            }
        }
    }

    fn record_ack(&self, id: &DeviceId, chunk_id: Option<u64>, timestamp: Option<f64>) {
        let (Some(chunk_id), Some(timestamp)) = (chunk_id, timestamp) else {
            return;
        };
        let latency = self.clock.now_wall() - timestamp;
        if !latency.is_finite() || latency < 0.0 {
            tracing::debug!(
                "Discarding latency sample {:.4}s from {} for chunk {}",
                latency,
                id,
                chunk_id
            );
            return;
        }
        self.registry.record_latency(id, latency);
    }

    /// Purge silent devices; re-announces the list when any were removed.
    pub async fn sweep(&self) -> usize {
        let purged = self.registry.sweep_inactive(self.config.purge_timeout);
        if purged.is_empty() {
            return 0;
        }
        for id in &purged {
            self.stats.forget(id);
        }
        tracing::info!("Purged {} inactive devices", purged.len());
        let count = purged.len();
        self.broadcast_device_list().await;
        self.events
            .on_event(CoordinatorEvent::DevicesPurged(purged))
            .await;
        count
    }

    /// Run the liveness sweep every `sweep_interval` until shutdown.
    pub fn spawn_maintenance(self: &Arc<Self>) {
        let coordinator = Arc::clone(self);
        let period = self.config.sweep_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                coordinator.sweep().await;
            }
        });

        let mut slot = self.maintenance.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    /// Stop any active session and the maintenance task.
    pub async fn shutdown(&self) {
        if self.session.stop().await {
            tracing::info!("Stopped active session for shutdown");
        }
        let handle = self
            .maintenance
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}
