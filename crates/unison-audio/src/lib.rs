//! # unison-audio
//!
//! Audio preparation and paced chunk delivery.
//!
//! This crate provides:
//! - Audio decoding from various formats (via symphonia)
//! - Source resolution behind the `SourceResolver` trait
//! - Test tone generation and fades
//! - Partitioning of a decoded buffer into fixed-size chunks
//! - The chunk scheduler that paces delivery against absolute timestamps

mod chunk;
mod decoder;
mod pcm;
mod resolver;
mod scheduler;
mod traits;

pub use chunk::{AudioChunk, ChunkPlan};
pub use decoder::AudioDecoder;
pub use pcm::{apply_fade, generate_test_tone};
pub use resolver::FileSourceResolver;
pub use scheduler::{ChunkScheduler, DeliveryOutcome};
pub use traits::{ChunkSink, SourceResolver};
