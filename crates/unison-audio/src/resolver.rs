//! File-backed source resolution.

use crate::{apply_fade, generate_test_tone, AudioDecoder, SourceResolver};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use unison_core::audio::{DEFAULT_CHANNELS, DEFAULT_SAMPLE_RATE};
use unison_core::error::{DecodeError, Result};
use unison_core::{CoordinatorConfig, DecodedAudio};

/// Length of the synthesized fallback tone.
const TEST_TONE_SECS: f64 = 10.0;
const TEST_TONE_HZ: f64 = 440.0;

/// Resolves source references to files under a media root and decodes them.
#[derive(Debug, Clone)]
pub struct FileSourceResolver {
    media_root: PathBuf,
    test_tone_fallback: bool,
    fade_in: Duration,
    fade_out: Duration,
}

impl FileSourceResolver {
    pub fn new(media_root: impl Into<PathBuf>) -> Self {
        Self {
            media_root: media_root.into(),
            test_tone_fallback: false,
            fade_in: Duration::ZERO,
            fade_out: Duration::ZERO,
        }
    }

    pub fn from_config(config: &CoordinatorConfig) -> Self {
        Self::new(config.media_root.clone())
            .with_test_tone_fallback(config.test_tone_fallback)
            .with_fades(config.fade_in, config.fade_out)
    }

    /// Synthesize a test tone instead of failing when the file is missing.
    pub fn with_test_tone_fallback(mut self, enabled: bool) -> Self {
        self.test_tone_fallback = enabled;
        self
    }

    pub fn with_fades(mut self, fade_in: Duration, fade_out: Duration) -> Self {
        self.fade_in = fade_in;
        self.fade_out = fade_out;
        self
    }

    /// Map a source reference to a path inside the media root.
    ///
    /// References that climb out of the root are refused.
    pub fn path_for(&self, source: &str) -> Result<PathBuf> {
        let reference = Path::new(source);
        if source.is_empty() {
            return Err(DecodeError::NotFound("empty source reference".to_string()).into());
        }
        if reference
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(DecodeError::Open(format!("{} escapes the media root", source)).into());
        }
        if reference.is_absolute() {
            if reference.starts_with(&self.media_root) {
                return Ok(reference.to_path_buf());
            }
            return Err(DecodeError::Open(format!("{} is outside the media root", source)).into());
        }
        Ok(self.media_root.join(reference))
    }
}

impl SourceResolver for FileSourceResolver {
    fn resolve(&self, source: &str) -> Result<DecodedAudio> {
        let path = self.path_for(source)?;

        if !path.exists() {
            if self.test_tone_fallback {
                tracing::info!(
                    "Source {} not found, streaming {} Hz test tone",
                    path.display(),
                    TEST_TONE_HZ
                );
                return Ok(generate_test_tone(
                    TEST_TONE_SECS,
                    TEST_TONE_HZ,
                    DEFAULT_SAMPLE_RATE,
                    DEFAULT_CHANNELS,
                ));
            }
            return Err(DecodeError::NotFound(path.display().to_string()).into());
        }

        let mut decoder = AudioDecoder::open(&path)?;
        let mut samples = decoder.decode_interleaved()?;
        let channels = decoder
            .channels()
            .ok_or_else(|| DecodeError::InvalidFormat("Unknown channel count".to_string()))?;
        let sample_rate = decoder.sample_rate();

        if !self.fade_in.is_zero() || !self.fade_out.is_zero() {
            apply_fade(
                &mut samples,
                channels,
                sample_rate,
                self.fade_in.as_secs_f64(),
                self.fade_out.as_secs_f64(),
            );
        }

        let audio = DecodedAudio::new(samples, sample_rate, channels);
        tracing::debug!(
            "Decoded {}: {} frames, {} Hz, {} channels ({:.2}s)",
            path.display(),
            audio.frames(),
            sample_rate,
            channels,
            audio.duration_secs()
        );
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::tests::wav_bytes;
    use unison_core::Error;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("unison-resolver-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    mod paths {
        use super::*;

        #[test]
        fn relative_reference_joins_root() {
            let resolver = FileSourceResolver::new("/srv/media");
            assert_eq!(
                resolver.path_for("album/track.flac").unwrap(),
                PathBuf::from("/srv/media/album/track.flac")
            );
        }

        #[test]
        fn parent_components_are_refused() {
            let resolver = FileSourceResolver::new("/srv/media");
            assert!(resolver.path_for("../etc/passwd").is_err());
            assert!(resolver.path_for("a/../../b.wav").is_err());
        }

        #[test]
        fn absolute_path_inside_root_is_allowed() {
            let resolver = FileSourceResolver::new("/srv/media");
            assert!(resolver.path_for("/srv/media/x.wav").is_ok());
            assert!(resolver.path_for("/etc/x.wav").is_err());
        }

        #[test]
        fn empty_reference_is_not_found() {
            let resolver = FileSourceResolver::new("/srv/media");
            assert!(matches!(
                resolver.path_for(""),
                Err(Error::Decode(DecodeError::NotFound(_)))
            ));
        }
    }

    mod resolve {
        use super::*;

        #[test]
        fn missing_file_fails_without_fallback() {
            let resolver = FileSourceResolver::new(scratch_dir("missing"));
            let result = resolver.resolve("nope.wav");
            assert!(matches!(result, Err(Error::Decode(DecodeError::NotFound(_)))));
        }

        #[test]
        fn missing_file_yields_tone_with_fallback() {
            let resolver =
                FileSourceResolver::new(scratch_dir("fallback")).with_test_tone_fallback(true);
            let audio = resolver.resolve("nope.wav").unwrap();
            assert_eq!(audio.sample_rate(), 44_100);
            assert_eq!(audio.channels(), 2);
            assert_eq!(audio.frames(), 441_000);
        }

        #[test]
        fn decodes_wav_from_disk() {
            let dir = scratch_dir("wav");
            let samples = vec![8192i16; 200];
            std::fs::write(dir.join("clip.wav"), wav_bytes(&samples, 8_000, 2)).unwrap();

            let resolver = FileSourceResolver::new(&dir);
            let audio = resolver.resolve("clip.wav").unwrap();
            assert_eq!(audio.frames(), 100);
            assert_eq!(audio.sample_rate(), 8_000);
            assert!((audio.samples()[10] - 0.25).abs() < 1e-3);
        }

        #[test]
        fn applies_configured_fade_in() {
            let dir = scratch_dir("fade");
            let samples = vec![16384i16; 100];
            std::fs::write(dir.join("clip.wav"), wav_bytes(&samples, 100, 1)).unwrap();

            let resolver = FileSourceResolver::new(&dir)
                .with_fades(Duration::from_millis(500), Duration::ZERO);
            let audio = resolver.resolve("clip.wav").unwrap();
            assert_eq!(audio.samples()[0], 0.0);
            assert!((audio.samples()[99] - 0.5).abs() < 1e-3);
        }
    }
}
