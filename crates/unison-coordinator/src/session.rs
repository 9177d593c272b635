//! Streaming session state machine.

use crate::dispatcher::Dispatcher;
use crate::events::{CoordinatorEvent, EventHandler};
use crate::registry::DeviceRegistry;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use unison_audio::{ChunkScheduler, DeliveryOutcome, SourceResolver};
use unison_core::error::{DecodeError, Result};
use unison_core::{CoordinatorConfig, DecodedAudio};
use unison_protocol::ServerMessage;
use unison_timing::Clock;
use uuid::Uuid;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session.
    Idle,
    /// Decoding the source and announcing the start.
    Preparing,
    /// Chunk delivery scheduled or running.
    Streaming,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Preparing,
            2 => Self::Streaming,
            _ => Self::Idle,
        }
    }
}

/// Descriptor of the running session.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamingSession {
    pub id: Uuid,
    pub source: String,
    /// Synchronized start, in wall-clock seconds.
    pub start_timestamp: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_count: usize,
}

/// Result of a start request.
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Started(StreamingSession),
    /// A session was already preparing or streaming; nothing changed.
    AlreadyActive,
    /// Stopped while the source was being decoded.
    Cancelled,
}

enum Slot {
    Idle,
    Preparing {
        id: Uuid,
    },
    Streaming {
        session: StreamingSession,
        running: watch::Sender<bool>,
    },
}

impl Slot {
    fn state(&self) -> SessionState {
        match self {
            Self::Idle => SessionState::Idle,
            Self::Preparing { .. } => SessionState::Preparing,
            Self::Streaming { .. } => SessionState::Streaming,
        }
    }

    fn is_current(&self, session_id: Uuid) -> bool {
        match self {
            Self::Idle => false,
            Self::Preparing { id } => *id == session_id,
            Self::Streaming { session, .. } => session.id == session_id,
        }
    }
}

struct SessionInner {
    slot: Mutex<Slot>,
    state_cache: AtomicU8,
    registry: Arc<DeviceRegistry>,
    dispatcher: Arc<Dispatcher>,
    resolver: Arc<dyn SourceResolver>,
    events: Arc<dyn EventHandler>,
    clock: Clock,
    chunk_bytes: usize,
    start_lead: f64,
    default_source: String,
}

impl SessionInner {
    fn replace(&self, slot: &mut Slot, next: Slot) -> Slot {
        self.state_cache.store(next.state() as u8, Ordering::Relaxed);
        std::mem::replace(slot, next)
    }

    /// Called by the delivery task when its loop ends.
    async fn finish(&self, session_id: Uuid, outcome: DeliveryOutcome) {
        let mut slot = self.slot.lock().await;
        if !slot.is_current(session_id) {
            // Stopped, and possibly replaced, while the loop was winding down
            return;
        }
        self.replace(&mut slot, Slot::Idle);
        drop(slot);

        match outcome {
            DeliveryOutcome::Completed { chunks_sent } => {
                tracing::info!("Session {} completed after {} chunks", session_id, chunks_sent);
                self.events
                    .on_event(CoordinatorEvent::SessionCompleted { chunks_sent })
                    .await;
            }
            DeliveryOutcome::Stopped { chunks_sent } => {
                tracing::debug!("Session {} ended early after {} chunks", session_id, chunks_sent);
            }
        }
    }
}

/// Owner of the at-most-one streaming session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<SessionInner>,
}

impl SessionController {
    pub fn new(
        config: &CoordinatorConfig,
        clock: Clock,
        registry: Arc<DeviceRegistry>,
        dispatcher: Arc<Dispatcher>,
        resolver: Arc<dyn SourceResolver>,
        events: Arc<dyn EventHandler>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                slot: Mutex::new(Slot::Idle),
                state_cache: AtomicU8::new(SessionState::Idle as u8),
                registry,
                dispatcher,
                resolver,
                events,
                clock,
                chunk_bytes: config.chunk_bytes,
                start_lead: config.start_lead_secs(),
                default_source: config.default_source.clone(),
            }),
        }
    }

    /// Get current state.
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.inner.state_cache.load(Ordering::Relaxed))
    }

    pub fn is_active(&self) -> bool {
        self.state() != SessionState::Idle
    }

    /// Descriptor of the streaming session, if any.
    pub async fn current(&self) -> Option<StreamingSession> {
        match &*self.inner.slot.lock().await {
            Slot::Streaming { session, .. } => Some(session.clone()),
            _ => None,
        }
    }

    /// Start streaming `source` (or the default source) to all active devices.
    ///
    /// A no-op returning [`StartOutcome::AlreadyActive`] unless idle. The
    /// source is decoded before anything is announced, so a decode failure
    /// leaves devices untouched and the controller idle.
    pub async fn start(&self, source: Option<&str>) -> Result<StartOutcome> {
        let source = source
            .filter(|s| !s.is_empty())
            .unwrap_or(self.inner.default_source.as_str())
            .to_string();
        let session_id = Uuid::new_v4();

        {
            let mut slot = self.inner.slot.lock().await;
            if !matches!(*slot, Slot::Idle) {
                tracing::debug!("Ignoring start of {}: session is {:?}", source, slot.state());
                return Ok(StartOutcome::AlreadyActive);
            }
            self.inner.replace(&mut slot, Slot::Preparing { id: session_id });
        }
        tracing::info!("Preparing session {} for {}", session_id, source);

        let decoded = self.decode(&source).await;

        let mut slot = self.inner.slot.lock().await;
        if !slot.is_current(session_id) {
            tracing::info!("Session {} stopped while preparing", session_id);
            return Ok(StartOutcome::Cancelled);
        }

        // Delay is re-derived for every session from the latest samples
        let start_timestamp = self.inner.clock.now_wall()
            + self.inner.registry.synchronization_delay()
            + self.inner.start_lead;
        let scheduler = decoded.and_then(|audio| {
            ChunkScheduler::new(audio, self.inner.chunk_bytes, start_timestamp, self.inner.clock)
        });
        let scheduler = match scheduler {
            Ok(scheduler) => scheduler,
            Err(e) => {
                self.inner.replace(&mut slot, Slot::Idle);
                drop(slot);
                tracing::error!("Failed to start session for {}: {}", source, e);
                self.inner
                    .events
                    .on_event(CoordinatorEvent::SessionFailed(e.to_string()))
                    .await;
                return Err(e);
            }
        };

        let session = StreamingSession {
            id: session_id,
            source: source.clone(),
            start_timestamp,
            sample_rate: scheduler.audio().sample_rate(),
            channels: scheduler.audio().channels(),
            chunk_count: scheduler.plan().chunk_count(),
        };

        let report = self
            .inner
            .dispatcher
            .broadcast(&ServerMessage::PrepareStreaming {
                audio_file: source.clone(),
                sync_timestamp: start_timestamp,
                sample_rate: session.sample_rate,
                channels: session.channels,
            })
            .await;
        tracing::info!(
            "Session {} starts at {:.3} ({} chunks, announced to {} devices)",
            session_id,
            start_timestamp,
            session.chunk_count,
            report.delivered.len()
        );

        let (running, running_rx) = watch::channel(true);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let outcome = scheduler.run(inner.dispatcher.as_ref(), running_rx).await;
            inner.finish(session_id, outcome).await;
        });
        self.inner.replace(
            &mut slot,
            Slot::Streaming {
                session: session.clone(),
                running,
            },
        );
        drop(slot);

        self.inner
            .events
            .on_event(CoordinatorEvent::SessionStarted {
                source,
                start_timestamp,
            })
            .await;
        Ok(StartOutcome::Started(session))
    }

    async fn decode(&self, source: &str) -> Result<DecodedAudio> {
        let resolver = Arc::clone(&self.inner.resolver);
        let source = source.to_string();
        match tokio::task::spawn_blocking(move || resolver.resolve(&source)).await {
            Ok(result) => result,
            Err(e) => Err(DecodeError::Codec(format!("decoder task failed: {}", e)).into()),
        }
    }

    /// Stop the active session and tell devices to stop.
    ///
    /// Returns false, without broadcasting, when already idle. The delivery
    /// loop exits before its next chunk; a send already in flight completes.
    pub async fn stop(&self) -> bool {
        let mut slot = self.inner.slot.lock().await;
        match self.inner.replace(&mut slot, Slot::Idle) {
            Slot::Idle => return false,
            Slot::Preparing { id } => {
                tracing::info!("Stopping session {} before delivery", id);
            }
            Slot::Streaming { session, running } => {
                let _ = running.send(false);
                tracing::info!("Stopping session {} ({})", session.id, session.source);
            }
        }
        self.inner
            .dispatcher
            .broadcast(&ServerMessage::StopStreaming)
            .await;
        drop(slot);

        self.inner.events.on_event(CoordinatorEvent::SessionStopped).await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::DeviceSink;
    use crate::events::CallbackHandler;
    use crate::stats::DispatchStats;
    use async_trait::async_trait;
    use std::time::Duration;
    use unison_core::{DeviceId, DeviceInfo, SendError};
    use unison_protocol::decode_server;

    #[derive(Default)]
    struct RecordingSink {
        frames: std::sync::Mutex<Vec<ServerMessage>>,
    }

    impl RecordingSink {
        fn frames(&self) -> Vec<ServerMessage> {
            self.frames.lock().unwrap().clone()
        }

        fn chunk_ids(&self) -> Vec<u64> {
            self.frames()
                .into_iter()
                .filter_map(|m| match m {
                    ServerMessage::AudioChunk { chunk_id, .. } => Some(chunk_id),
                    _ => None,
                })
                .collect()
        }

        fn count(&self, kind: &str) -> usize {
            self.frames().iter().filter(|m| m.kind() == kind).count()
        }
    }

    #[async_trait]
    impl DeviceSink for RecordingSink {
        async fn send_text(&self, text: Arc<str>) -> std::result::Result<(), SendError> {
            self.try_send_text(text)
        }

        fn try_send_text(&self, text: Arc<str>) -> std::result::Result<(), SendError> {
            self.frames.lock().unwrap().push(decode_server(&text).unwrap());
            Ok(())
        }
    }

    struct Harness {
        clock: Clock,
        registry: Arc<DeviceRegistry>,
        sink: Arc<RecordingSink>,
        events: Arc<std::sync::Mutex<Vec<CoordinatorEvent>>>,
        controller: SessionController,
    }

    /// 1 kHz mono, 400-byte chunks: 0.1 s per chunk.
    fn harness(resolver: Arc<dyn SourceResolver>) -> Harness {
        let config = CoordinatorConfig {
            chunk_bytes: 400,
            ..Default::default()
        };
        let clock = Clock::with_wall_origin(1_000.0);
        let registry = Arc::new(DeviceRegistry::from_config(&config));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            DispatchStats::new(),
            config.send_timeout,
        ));

        let sink = Arc::new(RecordingSink::default());
        let id = DeviceId::sequential(0);
        registry.upsert(&id, DeviceInfo::new("Kitchen", "linux"));
        dispatcher.attach(id, sink.clone());

        let events = Arc::new(std::sync::Mutex::new(Vec::new()));
        let captured = Arc::clone(&events);
        let handler = CallbackHandler::new(move |event| captured.lock().unwrap().push(event));

        let controller = SessionController::new(
            &config,
            clock,
            Arc::clone(&registry),
            dispatcher,
            resolver,
            Arc::new(handler),
        );
        Harness {
            clock,
            registry,
            sink,
            events,
            controller,
        }
    }

    fn tone(frames: usize) -> Arc<dyn SourceResolver> {
        Arc::new(move |_source: &str| -> Result<DecodedAudio> {
            Ok(DecodedAudio::new(vec![0.5; frames], 1_000, 1))
        })
    }

    async fn sleep_secs(secs: f64) {
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }

    mod start {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn announces_prepare_with_derived_start() {
            let h = harness(tone(1_000));
            h.registry.record_latency(&DeviceId::sequential(0), 0.15);
            let before = h.clock.now_wall();

            let outcome = h.controller.start(Some("song.wav")).await.unwrap();

            let session = match outcome {
                StartOutcome::Started(session) => session,
                other => panic!("unexpected {:?}", other),
            };
            // 0.15 worst latency + 0.1 buffer + 2 s lead
            assert!((session.start_timestamp - (before + 2.25)).abs() < 0.01);
            assert_eq!(session.chunk_count, 10);
            assert_eq!(h.controller.state(), SessionState::Streaming);
            assert_eq!(
                h.sink.frames()[0],
                ServerMessage::PrepareStreaming {
                    audio_file: "song.wav".to_string(),
                    sync_timestamp: session.start_timestamp,
                    sample_rate: 1_000,
                    channels: 1,
                }
            );
        }

        #[tokio::test(start_paused = true)]
        async fn uses_default_source_when_none_given() {
            let h = harness(tone(100));
            h.controller.start(None).await.unwrap();

            match &h.sink.frames()[0] {
                ServerMessage::PrepareStreaming { audio_file, .. } => {
                    assert_eq!(audio_file, "default_audio.wav")
                }
                other => panic!("unexpected {:?}", other),
            }
        }

        #[tokio::test(start_paused = true)]
        async fn second_start_leaves_session_unchanged() {
            let h = harness(tone(1_000));
            h.controller.start(Some("a.wav")).await.unwrap();
            let first = h.controller.current().await.unwrap();

            sleep_secs(0.5).await;
            let outcome = h.controller.start(Some("b.wav")).await.unwrap();

            assert_eq!(outcome, StartOutcome::AlreadyActive);
            let current = h.controller.current().await.unwrap();
            assert_eq!(current.start_timestamp, first.start_timestamp);
            assert_eq!(current.source, "a.wav");
            assert_eq!(h.sink.count("prepare_streaming"), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn decode_failure_returns_to_idle_without_announcement() {
            let failing: Arc<dyn SourceResolver> =
                Arc::new(|source: &str| -> Result<DecodedAudio> {
                    Err(DecodeError::NotFound(source.to_string()).into())
                });
            let h = harness(failing);

            let result = h.controller.start(Some("missing.wav")).await;

            assert!(result.is_err());
            assert_eq!(h.controller.state(), SessionState::Idle);
            assert!(h.sink.frames().is_empty());
            assert!(matches!(
                h.events.lock().unwrap().last(),
                Some(CoordinatorEvent::SessionFailed(_))
            ));
        }

        #[tokio::test(start_paused = true)]
        async fn unusable_buffer_fails_start() {
            let h = harness(Arc::new(|_: &str| -> Result<DecodedAudio> {
                Ok(DecodedAudio::new(vec![0.0; 8], 0, 1))
            }));

            assert!(h.controller.start(None).await.is_err());
            assert_eq!(h.controller.state(), SessionState::Idle);
        }
    }

    mod delivery {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn completion_returns_to_idle_without_stop() {
            let h = harness(tone(250));
            h.controller.start(None).await.unwrap();

            sleep_secs(3.0).await;

            assert_eq!(h.controller.state(), SessionState::Idle);
            assert_eq!(h.sink.chunk_ids(), vec![0, 1, 2]);
            assert_eq!(h.sink.count("stop_streaming"), 0);
            match h.sink.frames().last() {
                Some(ServerMessage::AudioChunk { is_final, .. }) => assert!(*is_final),
                other => panic!("unexpected {:?}", other),
            }
            assert!(h
                .events
                .lock()
                .unwrap()
                .contains(&CoordinatorEvent::SessionCompleted { chunks_sent: 3 }));
        }

        #[tokio::test(start_paused = true)]
        async fn chunks_carry_absolute_targets() {
            let h = harness(tone(500));
            let session = match h.controller.start(None).await.unwrap() {
                StartOutcome::Started(session) => session,
                other => panic!("unexpected {:?}", other),
            };

            sleep_secs(3.0).await;

            let targets: Vec<f64> = h
                .sink
                .frames()
                .into_iter()
                .filter_map(|m| match m {
                    ServerMessage::AudioChunk { timestamp, .. } => Some(timestamp),
                    _ => None,
                })
                .collect();
            assert_eq!(targets.len(), 5);
            for (i, target) in targets.iter().enumerate() {
                assert!((target - (session.start_timestamp + i as f64 * 0.1)).abs() < 1e-9);
            }
        }

        #[tokio::test(start_paused = true)]
        async fn restart_after_completion() {
            let h = harness(tone(100));
            h.controller.start(None).await.unwrap();
            sleep_secs(3.0).await;

            let outcome = h.controller.start(None).await.unwrap();
            assert!(matches!(outcome, StartOutcome::Started(_)));
            assert_eq!(h.sink.count("prepare_streaming"), 2);
        }
    }

    mod stop {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn stop_while_idle_is_noop() {
            let h = harness(tone(100));

            assert!(!h.controller.stop().await);
            assert_eq!(h.controller.state(), SessionState::Idle);
            assert!(h.sink.frames().is_empty());
            assert!(h.events.lock().unwrap().is_empty());
        }

        #[tokio::test(start_paused = true)]
        async fn stop_mid_stream_halts_delivery() {
            let h = harness(tone(1_000));
            h.controller.start(None).await.unwrap();

            // Start is 2.1 s out; chunks 0..=3 are due by 2.45 s
            sleep_secs(2.45).await;
            assert!(h.controller.stop().await);
            let sent_before_stop = h.sink.chunk_ids();

            sleep_secs(2.0).await;

            assert_eq!(h.controller.state(), SessionState::Idle);
            assert_eq!(h.sink.chunk_ids(), sent_before_stop);
            assert!(sent_before_stop.len() < 10);
            assert_eq!(h.sink.count("stop_streaming"), 1);
            assert_eq!(h.sink.frames().last(), Some(&ServerMessage::StopStreaming));
        }

        #[tokio::test(start_paused = true)]
        async fn stop_before_first_chunk_sends_none() {
            let h = harness(tone(1_000));
            h.controller.start(None).await.unwrap();

            sleep_secs(1.0).await;
            assert!(h.controller.stop().await);
            sleep_secs(5.0).await;

            assert!(h.sink.chunk_ids().is_empty());
            assert!(h.events.lock().unwrap().contains(&CoordinatorEvent::SessionStopped));
        }

        #[tokio::test]
        async fn stop_while_preparing_cancels_start() {
            let slow: Arc<dyn SourceResolver> = Arc::new(|_: &str| -> Result<DecodedAudio> {
                std::thread::sleep(Duration::from_millis(100));
                Ok(DecodedAudio::new(vec![0.0; 100], 1_000, 1))
            });
            let h = harness(slow);

            let controller = h.controller.clone();
            let start = tokio::spawn(async move { controller.start(None).await });
            while h.controller.state() != SessionState::Preparing {
                tokio::task::yield_now().await;
            }

            assert!(h.controller.stop().await);
            let outcome = start.await.unwrap().unwrap();

            assert_eq!(outcome, StartOutcome::Cancelled);
            assert_eq!(h.controller.state(), SessionState::Idle);
            assert_eq!(h.sink.count("prepare_streaming"), 0);
        }
    }
}
