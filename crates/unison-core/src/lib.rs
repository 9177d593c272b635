//! # unison-core
//!
//! Core types and error definitions shared across all unison crates.
//!
//! This crate provides:
//! - Device identification and announced attributes
//! - The decoded audio buffer contract
//! - Coordinator configuration
//! - Common error types

pub mod audio;
pub mod config;
pub mod device;
pub mod error;

pub use audio::{DecodedAudio, SAMPLE_WIDTH_BYTES};
pub use config::CoordinatorConfig;
pub use device::{DeviceId, DeviceInfo};
pub use error::{ConfigError, DecodeError, Error, ProtocolError, Result, SendError};
