//! Sample-level helpers: test tone synthesis and fades.

use unison_core::DecodedAudio;

/// Generate a sine tone duplicated across all channels.
pub fn generate_test_tone(
    duration_secs: f64,
    frequency: f64,
    sample_rate: u32,
    channels: u16,
) -> DecodedAudio {
    let frames = (sample_rate as f64 * duration_secs.max(0.0)) as usize;
    let mut samples = Vec::with_capacity(frames * channels as usize);
    for i in 0..frames {
        let t = i as f64 / sample_rate as f64;
        let value = (2.0 * std::f64::consts::PI * frequency * t).sin() as f32;
        for _ in 0..channels {
            samples.push(value);
        }
    }
    DecodedAudio::new(samples, sample_rate, channels)
}

/// Apply linear fade-in and fade-out ramps to interleaved samples in place.
///
/// Each ramp spans `secs * sample_rate` frames, clamped to the buffer
/// length, and runs inclusively from 0 to 1 (fade-in) or 1 to 0 (fade-out).
pub fn apply_fade(
    samples: &mut [f32],
    channels: u16,
    sample_rate: u32,
    fade_in_secs: f64,
    fade_out_secs: f64,
) {
    if channels == 0 {
        return;
    }
    let channels = channels as usize;
    let total_frames = samples.len() / channels;

    let fade_in = ramp_frames(fade_in_secs, sample_rate, total_frames);
    for frame in 0..fade_in {
        let gain = ramp_gain(frame, fade_in);
        for s in &mut samples[frame * channels..(frame + 1) * channels] {
            *s *= gain;
        }
    }

    let fade_out = ramp_frames(fade_out_secs, sample_rate, total_frames);
    let first = total_frames - fade_out;
    for step in 0..fade_out {
        let gain = 1.0 - ramp_gain(step, fade_out);
        let frame = first + step;
        for s in &mut samples[frame * channels..(frame + 1) * channels] {
            *s *= gain;
        }
    }
}

fn ramp_frames(secs: f64, sample_rate: u32, total_frames: usize) -> usize {
    if !secs.is_finite() || secs <= 0.0 {
        return 0;
    }
    ((secs * sample_rate as f64) as usize).min(total_frames)
}

/// Position `step` on an inclusive 0..=1 ramp of `len` points.
fn ramp_gain(step: usize, len: usize) -> f32 {
    if len <= 1 {
        0.0
    } else {
        step as f32 / (len - 1) as f32
    }
}
