//! Decoded audio buffer contract shared by the codec and the scheduler.

use std::sync::Arc;

/// Width in bytes of one sample element (`f32`).
pub const SAMPLE_WIDTH_BYTES: usize = std::mem::size_of::<f32>();

/// Sample rate used when nothing else is known.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Channel count used when nothing else is known.
pub const DEFAULT_CHANNELS: u16 = 2;

/// Output of the codec: interleaved floating-point PCM.
///
/// The sample storage is reference counted and read-only, so a session's
/// delivery loop can slice it into chunks without copying.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
}

impl DecodedAudio {
    /// Wrap interleaved samples.
    ///
    /// A trailing partial frame (fewer than `channels` samples) is dropped.
    pub fn new(mut samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        if channels > 0 {
            let whole = samples.len() - samples.len() % channels as usize;
            samples.truncate(whole);
        }
        Self {
            samples: samples.into(),
            sample_rate,
            channels,
        }
    }

    /// Interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Shared handle to the interleaved samples.
    pub fn shared_samples(&self) -> Arc<[f32]> {
        Arc::clone(&self.samples)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of frames (one sample per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.frames() as f64 / self.sample_rate as f64
        }
    }

    /// Size of the sample data in bytes.
    pub fn byte_len(&self) -> usize {
        self.samples.len() * SAMPLE_WIDTH_BYTES
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
