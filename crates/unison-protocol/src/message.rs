//! Typed messages exchanged over a device channel.

use serde::{Deserialize, Serialize};
use unison_core::DeviceId;

/// Greeting sent to a newly connected device.
pub const WELCOME_MESSAGE: &str = "Connected to AudioSync server";

/// Messages sent by a device to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Announces or updates the device's attributes.
    DeviceInfo {
        #[serde(default = "default_device_name")]
        device_name: String,
        #[serde(default = "default_platform")]
        platform: String,
        #[serde(default)]
        capabilities: Vec<String>,
        /// Self-reported output latency in seconds.
        #[serde(default)]
        latency: f64,
    },
    StartStreaming {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio_file: Option<String>,
    },
    StopStreaming,
    SyncRequest,
    AudioChunkAck {
        #[serde(default)]
        chunk_id: Option<u64>,
        /// Timestamp the device attached to its acknowledgement.
        #[serde(default)]
        timestamp: Option<f64>,
    },
    SetVolume { device_id: DeviceId, volume: f64 },
    SetEnabled { device_id: DeviceId, enabled: bool },
}

impl ClientMessage {
    /// Every `type` tag a device may send.
    pub const TYPES: &'static [&'static str] = &[
        "device_info",
        "start_streaming",
        "stop_streaming",
        "sync_request",
        "audio_chunk_ack",
        "set_volume",
        "set_enabled",
    ];

    pub fn kind(&self) -> &'static str {
        match self {
            Self::DeviceInfo { .. } => "device_info",
            Self::StartStreaming { .. } => "start_streaming",
            Self::StopStreaming => "stop_streaming",
            Self::SyncRequest => "sync_request",
            Self::AudioChunkAck { .. } => "audio_chunk_ack",
            Self::SetVolume { .. } => "set_volume",
            Self::SetEnabled { .. } => "set_enabled",
        }
    }
}

fn default_device_name() -> String {
    "Unknown Device".to_string()
}

fn default_platform() -> String {
    "unknown".to_string()
}

/// Messages sent by the coordinator to devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connection {
        client_id: DeviceId,
        message: String,
    },
    DeviceList {
        devices: Vec<DeviceSummary>,
    },
    PrepareStreaming {
        audio_file: String,
        sync_timestamp: f64,
        sample_rate: u32,
        channels: u16,
    },
    AudioChunk {
        chunk_id: u64,
        /// Absolute target timestamp of the chunk.
        timestamp: f64,
        /// Base64 of the chunk's little-endian `f32` samples.
        data: String,
        is_final: bool,
    },
    StopStreaming,
    SyncResponse {
        server_timestamp: f64,
        client_id: DeviceId,
    },
}

impl ServerMessage {
    pub fn welcome(client_id: DeviceId) -> Self {
        Self::Connection {
            client_id,
            message: WELCOME_MESSAGE.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::DeviceList { .. } => "device_list",
            Self::PrepareStreaming { .. } => "prepare_streaming",
            Self::AudioChunk { .. } => "audio_chunk",
            Self::StopStreaming => "stop_streaming",
            Self::SyncResponse { .. } => "sync_response",
        }
    }
}

/// One entry of a `device_list` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub id: DeviceId,
    pub name: String,
    pub platform: String,
    pub capabilities: Vec<String>,
    pub average_latency: f64,
    pub volume: f64,
    pub enabled: bool,
    pub reported_latency: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    mod client {
        use super::*;

        #[test]
        fn device_info_fills_defaults() {
            let msg: ClientMessage = serde_json::from_value(json!({"type": "device_info"})).unwrap();
            assert_eq!(
                msg,
                ClientMessage::DeviceInfo {
                    device_name: "Unknown Device".to_string(),
                    platform: "unknown".to_string(),
                    capabilities: vec![],
                    latency: 0.0,
                }
            );
        }

        #[test]
        fn device_info_ignores_unknown_fields() {
            let msg: ClientMessage = serde_json::from_value(json!({
                "type": "device_info",
                "device_name": "Kitchen",
                "platform": "android",
                "capabilities": ["audio_playback"],
                "latency": 0.04,
                "battery": 87
            }))
            .unwrap();
            match msg {
                ClientMessage::DeviceInfo { device_name, capabilities, latency, .. } => {
                    assert_eq!(device_name, "Kitchen");
                    assert_eq!(capabilities, vec!["audio_playback".to_string()]);
                    assert_eq!(latency, 0.04);
                }
                other => panic!("unexpected {:?}", other),
            }
        }

        #[test]
        fn start_streaming_without_source() {
            let msg: ClientMessage =
                serde_json::from_value(json!({"type": "start_streaming"})).unwrap();
            assert_eq!(msg, ClientMessage::StartStreaming { audio_file: None });
        }

        #[test]
        fn ack_fields_are_optional() {
            let msg: ClientMessage =
                serde_json::from_value(json!({"type": "audio_chunk_ack", "timestamp": 12.5})).unwrap();
            assert_eq!(
                msg,
                ClientMessage::AudioChunkAck {
                    chunk_id: None,
                    timestamp: Some(12.5)
                }
            );
        }

        #[test]
        fn kind_matches_listed_types() {
            let samples = [
                ClientMessage::StopStreaming,
                ClientMessage::SyncRequest,
                ClientMessage::SetEnabled {
                    device_id: DeviceId::sequential(1),
                    enabled: false,
                },
            ];
            for msg in samples {
                assert!(ClientMessage::TYPES.contains(&msg.kind()));
                let value = serde_json::to_value(&msg).unwrap();
                assert_eq!(value["type"], msg.kind());
            }
        }
    }

    mod server {
        use super::*;

        #[test]
        fn welcome_carries_client_id() {
            let value = serde_json::to_value(ServerMessage::welcome(DeviceId::sequential(3))).unwrap();
            assert_eq!(
                value,
                json!({
                    "type": "connection",
                    "client_id": "client_3",
                    "message": "Connected to AudioSync server"
                })
            );
        }

        #[test]
        fn stop_streaming_is_bare_tag() {
            let value = serde_json::to_value(ServerMessage::StopStreaming).unwrap();
            assert_eq!(value, json!({"type": "stop_streaming"}));
        }

        #[test]
        fn prepare_streaming_field_names() {
            let value = serde_json::to_value(ServerMessage::PrepareStreaming {
                audio_file: "song.wav".to_string(),
                sync_timestamp: 100.25,
                sample_rate: 44_100,
                channels: 2,
            })
            .unwrap();
            assert_eq!(value["type"], "prepare_streaming");
            assert_eq!(value["sync_timestamp"], 100.25);
            assert_eq!(value["sample_rate"], 44_100);
            assert_eq!(value["channels"], 2);
        }

        #[test]
        fn device_list_entries() {
            let value = serde_json::to_value(ServerMessage::DeviceList {
                devices: vec![DeviceSummary {
                    id: DeviceId::sequential(1),
                    name: "Den".to_string(),
                    platform: "ios".to_string(),
                    capabilities: vec![],
                    average_latency: 0.05,
                    volume: 1.0,
                    enabled: true,
                    reported_latency: 0.0,
                }],
            })
            .unwrap();
            let entry = &value["devices"][0];
            assert_eq!(entry["id"], "client_1");
            assert_eq!(entry["average_latency"], 0.05);
            assert_eq!(entry["enabled"], true);
        }
    }
}
