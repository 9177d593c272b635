//! Broadcast dispatcher: fans messages out to live device connections.

use crate::registry::DeviceRegistry;
use crate::stats::DispatchStats;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinSet;
use unison_audio::{AudioChunk, ChunkSink};
use unison_core::{DeviceId, SendError};
use unison_protocol::{encode_samples, encode_server, ServerMessage};

/// Outbound half of one device's message channel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceSink: Send + Sync {
    /// Send one text frame.
    async fn send_text(&self, text: Arc<str>) -> Result<(), SendError>;

    /// Queue one text frame without waiting; a full queue fails with
    /// [`SendError::Full`].
    fn try_send_text(&self, text: Arc<str>) -> Result<(), SendError>;
}

/// Per-device result of one broadcast.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BroadcastReport {
    pub delivered: Vec<DeviceId>,
    pub failed: Vec<(DeviceId, SendError)>,
}

impl BroadcastReport {
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

/// Connection table plus fan-out.
///
/// Broadcast targets are connections whose device is in the registry's
/// active set. Each send runs as its own task bounded by `send_timeout`,
/// so one stalled device cannot hold back the others.
pub struct Dispatcher {
    registry: Arc<DeviceRegistry>,
    connections: RwLock<HashMap<DeviceId, Arc<dyn DeviceSink>>>,
    stats: Arc<DispatchStats>,
    send_timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: Arc<DeviceRegistry>, stats: Arc<DispatchStats>, send_timeout: Duration) -> Self {
        Self {
            registry,
            connections: RwLock::new(HashMap::new()),
            stats,
            send_timeout,
        }
    }

    /// Attach the live connection of `id`, replacing any previous one.
    pub fn attach(&self, id: DeviceId, sink: Arc<dyn DeviceSink>) {
        self.connections
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, sink);
    }

    /// Drop the connection of `id`. Returns whether one was attached.
    pub fn detach(&self, id: &DeviceId) -> bool {
        self.connections
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .is_some()
    }

    pub fn is_connected(&self, id: &DeviceId) -> bool {
        self.connections
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn stats(&self) -> &Arc<DispatchStats> {
        &self.stats
    }

    fn connection(&self, id: &DeviceId) -> Option<Arc<dyn DeviceSink>> {
        self.connections
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    fn targets(&self) -> Vec<(DeviceId, Arc<dyn DeviceSink>)> {
        let active = self.registry.active_ids();
        let connections = self.connections.read().unwrap_or_else(|e| e.into_inner());
        active
            .into_iter()
            .filter_map(|id| connections.get(&id).cloned().map(|sink| (id, sink)))
            .collect()
    }

    /// Send `message` to every active, connected device.
    ///
    /// Never fails as a whole; per-device failures are logged, counted and
    /// returned in the report.
    pub async fn broadcast(&self, message: &ServerMessage) -> BroadcastReport {
        let text = match encode_server(message) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Dropping {} broadcast: {}", message.kind(), e);
                return BroadcastReport::default();
            }
        };
        self.stats.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.fan_out(message.kind(), text).await
    }

    /// Queue `message` for every active, connected device without waiting.
    ///
    /// Used on the paced chunk path: a device whose queue is full loses
    /// this frame instead of delaying everyone else.
    pub fn offer(&self, message: &ServerMessage) -> BroadcastReport {
        let text = match encode_server(message) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Dropping {} broadcast: {}", message.kind(), e);
                return BroadcastReport::default();
            }
        };
        self.stats.broadcasts.fetch_add(1, Ordering::Relaxed);

        let mut report = BroadcastReport::default();
        for (id, sink) in self.targets() {
            match sink.try_send_text(Arc::clone(&text)) {
                Ok(()) => {
                    self.stats.record_success(&id);
                    report.delivered.push(id);
                }
                Err(e) => {
                    tracing::debug!("Dropped {} for {}: {}", message.kind(), id, e);
                    self.stats.record_failure(&id);
                    report.failed.push((id, e));
                }
            }
        }
        report
    }

    async fn fan_out(&self, kind: &'static str, text: Arc<str>) -> BroadcastReport {
        let mut tasks = JoinSet::new();
        for (id, sink) in self.targets() {
            let text = Arc::clone(&text);
            let limit = self.send_timeout;
            tasks.spawn(async move {
                let result = match tokio::time::timeout(limit, sink.send_text(text)).await {
                    Ok(result) => result,
                    Err(_) => Err(SendError::Timeout),
                };
                (id, result)
            });
        }

        let mut report = BroadcastReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, Ok(()))) => {
                    self.stats.record_success(&id);
                    report.delivered.push(id);
                }
                Ok((id, Err(e))) => {
                    tracing::warn!("Failed to send {} to {}: {}", kind, id, e);
                    self.stats.record_failure(&id);
                    report.failed.push((id, e));
                }
                Err(e) => tracing::warn!("Send task for {} failed: {}", kind, e),
            }
        }
        report
    }

    /// Send `message` to one connected device.
    pub async fn unicast(&self, id: &DeviceId, message: &ServerMessage) -> Result<(), SendError> {
        let sink = self
            .connection(id)
            .ok_or_else(|| SendError::NotConnected(id.to_string()))?;
        let text = encode_server(message).map_err(|e| SendError::Transport(e.to_string()))?;

        let result = match tokio::time::timeout(self.send_timeout, sink.send_text(text)).await {
            Ok(result) => result,
            Err(_) => Err(SendError::Timeout),
        };
        match &result {
            Ok(()) => self.stats.record_success(id),
            Err(e) => {
                tracing::warn!("Failed to send {} to {}: {}", message.kind(), id, e);
                self.stats.record_failure(id);
            }
        }
        result
    }
}

#[async_trait]
impl ChunkSink for Dispatcher {
    async fn deliver(&self, chunk: AudioChunk) {
        let message = ServerMessage::AudioChunk {
            chunk_id: chunk.index,
            timestamp: chunk.target_timestamp,
            data: encode_samples(chunk.samples()),
            is_final: chunk.is_final,
        };
        self.stats.chunks_dispatched.fetch_add(1, Ordering::Relaxed);
        let report = self.offer(&message);
        if !report.failed.is_empty() {
            tracing::warn!(
                "Chunk {}: {} delivered, {} failed",
                chunk.index,
                report.delivered.len(),
                report.failed.len()
            );
        }
    }
}
