//! Partitioning of a decoded buffer into fixed-size, timestamped chunks.

use std::ops::Range;
use std::sync::Arc;
use unison_core::error::{DecodeError, Result};
use unison_core::{DecodedAudio, SAMPLE_WIDTH_BYTES};

/// How a buffer is cut into chunks for one session.
///
/// Every chunk but the last holds exactly `frames_per_chunk` frames, so a
/// single `chunk_duration` describes the whole stream and the target
/// timestamp of chunk `i` is `start + i * chunk_duration`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkPlan {
    frames_per_chunk: usize,
    chunk_count: usize,
    total_frames: usize,
    channels: u16,
    chunk_duration: f64,
}

impl ChunkPlan {
    /// Plan chunks of at most `chunk_bytes` bytes of `f32` sample data.
    ///
    /// A budget that is not a whole number of frames rounds down to one
    /// that is, and `chunk_duration` is the playback time of the frames a
    /// chunk actually carries. With 4100 bytes of stereo, chunks hold 512
    /// frames and last `512 / rate` seconds, not `4100 / (rate * 8)`, so
    /// targets stay aligned with the audio they carry.
    pub fn new(audio: &DecodedAudio, chunk_bytes: usize) -> Result<Self> {
        let channels = audio.channels();
        if channels == 0 {
            return Err(DecodeError::InvalidFormat("zero channels".to_string()).into());
        }
        if audio.sample_rate() == 0 {
            return Err(DecodeError::InvalidFormat("zero sample rate".to_string()).into());
        }

        let frame_bytes = channels as usize * SAMPLE_WIDTH_BYTES;
        let frames_per_chunk = chunk_bytes / frame_bytes;
        if frames_per_chunk == 0 {
            return Err(DecodeError::InvalidFormat(format!(
                "chunk budget of {} bytes is smaller than one {}-byte frame",
                chunk_bytes, frame_bytes
            ))
            .into());
        }

        let total_frames = audio.frames();
        Ok(Self {
            frames_per_chunk,
            chunk_count: total_frames.div_ceil(frames_per_chunk),
            total_frames,
            channels,
            chunk_duration: frames_per_chunk as f64 / audio.sample_rate() as f64,
        })
    }

    pub fn frames_per_chunk(&self) -> usize {
        self.frames_per_chunk
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Playback duration of one full chunk, in seconds.
    pub fn chunk_duration(&self) -> f64 {
        self.chunk_duration
    }

    /// Frames held by chunk `index`, zero past the end.
    pub fn frames_in_chunk(&self, index: usize) -> usize {
        let start = index.saturating_mul(self.frames_per_chunk);
        self.total_frames
            .saturating_sub(start)
            .min(self.frames_per_chunk)
    }

    /// Absolute target timestamp of chunk `index`.
    pub fn target_timestamp(&self, start_timestamp: f64, index: usize) -> f64 {
        start_timestamp + index as f64 * self.chunk_duration
    }

    /// Build chunk `index` over `audio`.
    pub fn chunk(&self, audio: &DecodedAudio, start_timestamp: f64, index: usize) -> Option<AudioChunk> {
        if index >= self.chunk_count {
            return None;
        }
        let channels = self.channels as usize;
        let first = index * self.frames_per_chunk * channels;
        let last = first + self.frames_in_chunk(index) * channels;

        Some(AudioChunk {
            index: index as u64,
            target_timestamp: self.target_timestamp(start_timestamp, index),
            is_final: index + 1 == self.chunk_count,
            channels: self.channels,
            samples: audio.shared_samples(),
            range: first..last,
        })
    }

    /// Iterate over every chunk in order.
    pub fn chunks<'a>(
        &'a self,
        audio: &'a DecodedAudio,
        start_timestamp: f64,
    ) -> impl Iterator<Item = AudioChunk> + 'a {
        (0..self.chunk_count).filter_map(move |i| self.chunk(audio, start_timestamp, i))
    }
}

/// One window of the session's sample buffer.
///
/// Holds a reference to the shared buffer plus a range, not a copy.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Sequence index, starting at 0.
    pub index: u64,
    /// Absolute wall-clock time at which this chunk is due.
    pub target_timestamp: f64,
    /// Set on the last chunk of the stream.
    pub is_final: bool,
    channels: u16,
    samples: Arc<[f32]>,
    range: Range<usize>,
}

impl AudioChunk {
    /// Interleaved samples of this chunk.
    pub fn samples(&self) -> &[f32] {
        &self.samples[self.range.clone()]
    }

    pub fn frames(&self) -> usize {
        self.range.len() / self.channels as usize
    }

    pub fn byte_len(&self) -> usize {
        self.range.len() * SAMPLE_WIDTH_BYTES
    }
}
