//! Traits at the codec and delivery seams.

use crate::AudioChunk;
use async_trait::async_trait;
use unison_core::{error::Result, DecodedAudio};

/// Turns a source reference into a decoded sample buffer.
///
/// Implementations may block; callers run them off the async executor.
#[cfg_attr(test, mockall::automock)]
pub trait SourceResolver: Send + Sync {
    /// Resolve and fully decode `source`.
    fn resolve(&self, source: &str) -> Result<DecodedAudio>;
}

impl<F> SourceResolver for F
where
    F: Fn(&str) -> Result<DecodedAudio> + Send + Sync,
{
    fn resolve(&self, source: &str) -> Result<DecodedAudio> {
        self(source)
    }
}

/// Receives chunks from the scheduler's delivery loop.
#[async_trait]
pub trait ChunkSink: Send + Sync {
    /// Deliver one chunk. Delivery failures are the sink's concern and
    /// never abort the loop.
    async fn deliver(&self, chunk: AudioChunk);
}
