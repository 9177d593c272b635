//! Chunk scheduler: paces a decoded buffer out against absolute timestamps.

use crate::{ChunkPlan, ChunkSink};
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use unison_core::{error::Result, DecodedAudio};
use unison_timing::Clock;

/// How a delivery loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Every chunk was handed to the sink.
    Completed { chunks_sent: usize },
    /// The running flag was cleared before the last chunk.
    Stopped { chunks_sent: usize },
}

impl DeliveryOutcome {
    pub fn chunks_sent(&self) -> usize {
        match *self {
            Self::Completed { chunks_sent } | Self::Stopped { chunks_sent } => chunks_sent,
        }
    }
}

/// Delivery loop for one session.
///
/// Deadlines are derived from the fixed start timestamp and the chunk
/// index, never chained from the previous send, so a late send delays only
/// its own chunk. Overdue chunks are sent immediately.
pub struct ChunkScheduler {
    audio: DecodedAudio,
    plan: ChunkPlan,
    start_timestamp: f64,
    clock: Clock,
}

impl ChunkScheduler {
    pub fn new(
        audio: DecodedAudio,
        chunk_bytes: usize,
        start_timestamp: f64,
        clock: Clock,
    ) -> Result<Self> {
        let plan = ChunkPlan::new(&audio, chunk_bytes)?;
        Ok(Self {
            audio,
            plan,
            start_timestamp,
            clock,
        })
    }

    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    pub fn audio(&self) -> &DecodedAudio {
        &self.audio
    }

    pub fn start_timestamp(&self) -> f64 {
        self.start_timestamp
    }

    /// Run until every chunk is delivered or `running` turns false.
    ///
    /// A stop takes effect before the next chunk; a chunk already handed
    /// to the sink is not recalled.
    pub async fn run(self, sink: &dyn ChunkSink, mut running: watch::Receiver<bool>) -> DeliveryOutcome {
        let count = self.plan.chunk_count();
        let mut chunks_sent = 0usize;

        if count == 0 {
            tracing::debug!("Nothing to deliver");
            return DeliveryOutcome::Completed { chunks_sent };
        }

        let start = self.clock.instant_at(self.start_timestamp);
        if !wait_until(start, &mut running).await {
            return DeliveryOutcome::Stopped { chunks_sent };
        }

        tracing::info!(
            "Delivering {} chunks of {} frames ({:.2}ms each)",
            count,
            self.plan.frames_per_chunk(),
            self.plan.chunk_duration() * 1000.0
        );

        for chunk in self.plan.chunks(&self.audio, self.start_timestamp) {
            if !still_running(&running) {
                tracing::info!("Delivery stopped after {} of {} chunks", chunks_sent, count);
                return DeliveryOutcome::Stopped { chunks_sent };
            }

            let index = chunk.index as usize;
            let lateness = self.clock.since(chunk.target_timestamp);
            if lateness > self.plan.chunk_duration() {
                tracing::debug!("Chunk {} is {:.1}ms late", index, lateness * 1000.0);
            }

            sink.deliver(chunk).await;
            chunks_sent += 1;

            if index + 1 < count {
                let next = self
                    .clock
                    .instant_at(self.plan.target_timestamp(self.start_timestamp, index + 1));
                if !wait_until(next, &mut running).await {
                    tracing::info!("Delivery stopped after {} of {} chunks", chunks_sent, count);
                    return DeliveryOutcome::Stopped { chunks_sent };
                }
            }
        }

        DeliveryOutcome::Completed { chunks_sent }
    }
}

fn still_running(running: &watch::Receiver<bool>) -> bool {
    // A dropped sender means the session was torn down
    *running.borrow() && running.has_changed().is_ok()
}

/// Sleep until `deadline`, waking early if `running` turns false.
///
/// Returns whether the session is still running.
async fn wait_until(deadline: Instant, running: &mut watch::Receiver<bool>) -> bool {
    loop {
        if !still_running(running) {
            return false;
        }
        tokio::select! {
            _ = sleep_until(deadline) => return still_running(running),
            changed = running.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
        }
    }
}
