//! # unison-timing
//!
//! Clock handling for synchronized playback.
//!
//! This crate provides:
//! - Wall-clock timestamps anchored to the monotonic clock
//! - Conversion between absolute timestamps and sleep deadlines

mod clock;

pub use clock::{Clock, secs_to_duration, unix_now};
