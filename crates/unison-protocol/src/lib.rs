//! # unison-protocol
//!
//! Wire protocol between the coordinator and playback devices.
//!
//! This crate provides:
//! - Device and coordinator messages as tagged unions
//! - JSON text frame encoding/decoding
//! - Sample payload encoding for `audio_chunk` messages

mod codec;
mod message;

pub use codec::{
    decode_client, decode_samples, decode_server, encode_client, encode_samples, encode_server,
};
pub use message::{ClientMessage, DeviceSummary, ServerMessage, WELCOME_MESSAGE};
