//! Audio decoding from various source formats.

use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use unison_core::error::{DecodeError, Result};

/// Upper bound on samples reserved up front from a container's declared length.
const MAX_PREALLOC_SAMPLES: usize = 1 << 24;

/// Samples to reserve before decoding; headers are not trusted beyond the cap.
fn initial_capacity(frames: Option<u64>, channels: Option<u16>) -> usize {
    let (Some(frames), Some(channels)) = (frames, channels) else {
        return 0;
    };
    usize::try_from(frames)
        .ok()
        .and_then(|f| f.checked_mul(channels as usize))
        .map_or(MAX_PREALLOC_SAMPLES, |n| n.min(MAX_PREALLOC_SAMPLES))
}

/// Audio decoder using symphonia.
pub struct AudioDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn symphonia::core::codecs::Decoder>,
    track_id: u32,
    sample_rate: u32,
    /// Channel count; `None` until the codec parameters or first packet reveal it.
    channels: Option<u16>,
    /// Total frames if the container declares it.
    duration_frames: Option<u64>,
}

impl AudioDecoder {
    /// Open audio file for decoding.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DecodeError::NotFound(path.display().to_string())
            } else {
                DecodeError::Open(format!("{}: {}", path.display(), e))
            }
        })?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        Self::from_media_source(mss, hint)
    }

    /// Open from an in-memory encoded file.
    #[cfg(test)]
    pub(crate) fn from_bytes(data: Vec<u8>, hint_ext: Option<&str>) -> Result<Self> {
        use std::io::Cursor;
        use symphonia::core::io::ReadOnlySource;

        let source = ReadOnlySource::new(Cursor::new(data));
        let mss = MediaSourceStream::new(Box::new(source), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = hint_ext {
            hint.with_extension(ext);
        }

        Self::from_media_source(mss, hint)
    }

    fn from_media_source(mss: MediaSourceStream, hint: Hint) -> Result<Self> {
        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| DecodeError::UnsupportedFormat(format!("Failed to probe format: {}", e)))?;

        let format = probed.format;

        // First audio track wins
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(DecodeError::NoAudioTrack)?;

        let track_id = track.id;

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| DecodeError::InvalidFormat("Unknown sample rate".to_string()))?;

        let channels = track.codec_params.channels.map(|c| c.count() as u16);
        let duration_frames = track.codec_params.n_frames;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| {
                DecodeError::UnsupportedFormat(format!("Failed to create decoder: {}", e))
            })?;

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
            duration_frames,
        })
    }

    /// Get source sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get number of channels, if already known.
    pub fn channels(&self) -> Option<u16> {
        self.channels
    }

    /// Decode the whole stream into interleaved `f32` samples.
    ///
    /// Packets the codec rejects are skipped; the stream ends at the first
    /// end-of-file from the container.
    pub fn decode_interleaved(&mut self) -> Result<Vec<f32>> {
        let mut out = Vec::with_capacity(initial_capacity(self.duration_frames, self.channels));
        let mut sample_buf: Option<SampleBuffer<f32>> = None;
        let mut buf_frames = 0usize;
        let mut skipped = 0usize;

        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => {
                    return Err(DecodeError::Codec(format!("Failed to read packet: {}", e)).into());
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    skipped += 1;
                    tracing::debug!("Skipping undecodable packet: {}", e);
                    continue;
                }
                Err(e) => {
                    return Err(DecodeError::Codec(format!("Failed to decode: {}", e)).into());
                }
            };

            let spec = *decoded.spec();
            if self.channels.is_none() {
                self.channels = Some(spec.channels.count() as u16);
            }

            if sample_buf.is_none() || buf_frames < decoded.capacity() {
                buf_frames = decoded.capacity();
                sample_buf = Some(SampleBuffer::<f32>::new(buf_frames as u64, spec));
            }
            if let Some(buf) = sample_buf.as_mut() {
                buf.copy_interleaved_ref(decoded);
                out.extend_from_slice(buf.samples());
            }
        }

        if skipped > 0 {
            tracing::warn!("Skipped {} undecodable packets", skipped);
        }

        Ok(out)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a 16-bit PCM WAV file in memory.
    pub(crate) fn wav_bytes(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let byte_rate = sample_rate * channels as u32 * 2;
        let block_align = channels * 2;

        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&byte_rate.to_le_bytes());
        out.extend_from_slice(&block_align.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }

    mod wav {
        use super::*;
        use unison_core::DecodedAudio;

        fn decode(bytes: Vec<u8>) -> DecodedAudio {
            let mut decoder = AudioDecoder::from_bytes(bytes, Some("wav")).unwrap();
            let samples = decoder.decode_interleaved().unwrap();
            DecodedAudio::new(samples, decoder.sample_rate(), decoder.channels().unwrap())
        }

        #[test]
        fn decodes_stereo_pcm() {
            let samples: Vec<i16> = (0..2000).map(|i| if i % 2 == 0 { 16384 } else { -16384 }).collect();
            let bytes = wav_bytes(&samples, 44_100, 2);

            let audio = decode(bytes);
            assert_eq!(audio.sample_rate(), 44_100);
            assert_eq!(audio.channels(), 2);
            assert_eq!(audio.frames(), 1000);
            assert!((audio.samples()[0] - 0.5).abs() < 1e-3);
            assert!((audio.samples()[1] + 0.5).abs() < 1e-3);
        }

        #[test]
        fn decodes_mono_pcm() {
            let samples = vec![0i16; 4410];
            let bytes = wav_bytes(&samples, 22_050, 1);

            let audio = decode(bytes);
            assert_eq!(audio.channels(), 1);
            assert_eq!(audio.sample_rate(), 22_050);
            assert_eq!(audio.frames(), 4410);
        }
    }

    mod capacity {
        use super::*;

        #[test]
        fn declared_length_is_reserved() {
            assert_eq!(initial_capacity(Some(1000), Some(2)), 2000);
        }

        #[test]
        fn unknown_length_reserves_nothing() {
            assert_eq!(initial_capacity(None, Some(2)), 0);
            assert_eq!(initial_capacity(Some(1000), None), 0);
        }

        #[test]
        fn absurd_header_is_capped() {
            assert_eq!(initial_capacity(Some(u64::MAX), Some(8)), MAX_PREALLOC_SAMPLES);
            assert_eq!(
                initial_capacity(Some(1 << 40), Some(2)),
                MAX_PREALLOC_SAMPLES
            );
        }
    }

    mod errors {
        use super::*;
        use unison_core::Error;

        #[test]
        fn garbage_is_unsupported() {
            let result = AudioDecoder::from_bytes(vec![0x42; 512], None);
            assert!(matches!(
                result,
                Err(Error::Decode(DecodeError::UnsupportedFormat(_)))
            ));
        }

        #[test]
        fn missing_file_is_not_found() {
            let result = AudioDecoder::open("/definitely/not/here/track.wav");
            assert!(matches!(result, Err(Error::Decode(DecodeError::NotFound(_)))));
        }
    }
}
