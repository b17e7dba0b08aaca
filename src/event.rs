//! Normalized speaker events and the frames pushed to browsers.
//!
//! # Wire format
//! Every frame is one JSON object `{ "type": <kind>, "data": { ... } }`:
//! ```jsonc
//! { "type": "volume",        "data": { "volume": 42 } }
//! { "type": "mute",          "data": { "muted": false } }
//! { "type": "source",        "data": { "name": "wifi" } }
//! { "type": "power",         "data": { "status": "standby" } }
//! { "type": "player",        "data": { "state": "playing", "title": "...", "artist": "...",
//!                                      "album": "...", "durationMs": 215000,
//!                                      "iconURL": "...", "audioType": "...", "live": false } }
//! { "type": "playTime",      "data": { "positionMs": 1200 } }
//! { "type": "playMode",      "data": { "mode": "normal" } }
//! { "type": "queue",         "data": { "changeMarker": "17", "version": 3 } }
//! { "type": "speakerHealth", "data": { "connected": true } }
//! { "type": "speaker",       "data": { "name": "Living Room", "address": "10.0.0.5" } }
//! // control frames
//! { "type": "connected",     "data": { "clientId": 7 } }
//! { "type": "ping",          "data": {} }
//! ```
//! Unknown fields are never sent; absent optional metadata is `null`.

use serde::{Deserialize, Serialize};

/// A device state change in a stable, vendor-independent shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum NormalizedEvent {
    Volume {
        volume: i32,
    },
    Mute {
        muted: bool,
    },
    Source {
        name: String,
    },
    Power {
        status: String,
    },
    #[serde(rename = "player")]
    PlayerData(PlayerData),
    #[serde(rename_all = "camelCase")]
    PlayTime {
        position_ms: i64,
    },
    PlayMode {
        mode: String,
    },
    #[serde(rename_all = "camelCase")]
    Queue {
        change_marker: Option<String>,
        version: Option<i64>,
    },
    SpeakerHealth {
        connected: bool,
    },
    /// Identity of the active speaker
    Speaker {
        name: Option<String>,
        address: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerData {
    pub state: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration_ms: Option<u64>,
    #[serde(rename = "iconURL")]
    pub icon_url: Option<String>,
    pub audio_type: Option<String>,
    pub live: bool,
}

pub const STANDBY: &str = "standby";

impl NormalizedEvent {
    /// Wire `type` tag of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            NormalizedEvent::Volume { .. } => "volume",
            NormalizedEvent::Mute { .. } => "mute",
            NormalizedEvent::Source { .. } => "source",
            NormalizedEvent::Power { .. } => "power",
            NormalizedEvent::PlayerData(_) => "player",
            NormalizedEvent::PlayTime { .. } => "playTime",
            NormalizedEvent::PlayMode { .. } => "playMode",
            NormalizedEvent::Queue { .. } => "queue",
            NormalizedEvent::SpeakerHealth { .. } => "speakerHealth",
            NormalizedEvent::Speaker { .. } => "speaker",
        }
    }

    pub fn standby_source() -> Self {
        NormalizedEvent::Source {
            name: STANDBY.to_string(),
        }
    }

    pub fn standby_power() -> Self {
        NormalizedEvent::Power {
            status: STANDBY.to_string(),
        }
    }
}

/// One outbound frame on a client's push channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    /// Sent once right after registration
    Connected { client_id: u64 },
    /// Heartbeat
    Ping,
    Event(NormalizedEvent),
}

impl serde::Serialize for ClientFrame {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        match self {
            ClientFrame::Event(event) => event.serialize(serializer),
            ClientFrame::Connected { client_id } => {
                let mut st = serializer.serialize_struct("ClientFrame", 2)?;
                st.serialize_field("type", "connected")?;
                st.serialize_field("data", &serde_json::json!({ "clientId": client_id }))?;
                st.end()
            }
            ClientFrame::Ping => {
                let mut st = serializer.serialize_struct("ClientFrame", 2)?;
                st.serialize_field("type", "ping")?;
                st.serialize_field("data", &serde_json::json!({}))?;
                st.end()
            }
        }
    }
}

impl ClientFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientFrame::Connected { .. } => "connected",
            ClientFrame::Ping => "ping",
            ClientFrame::Event(event) => event.kind(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<NormalizedEvent> for ClientFrame {
    fn from(event: NormalizedEvent) -> Self {
        ClientFrame::Event(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn wire(frame: impl Into<ClientFrame>) -> Value {
        serde_json::from_str(&frame.into().to_json().unwrap()).unwrap()
    }

    #[test]
    fn test_volume_envelope() {
        assert_eq!(
            wire(NormalizedEvent::Volume { volume: 42 }),
            json!({"type": "volume", "data": {"volume": 42}})
        );
    }

    #[test]
    fn test_power_and_source_envelopes() {
        assert_eq!(
            wire(NormalizedEvent::standby_power()),
            json!({"type": "power", "data": {"status": "standby"}})
        );
        assert_eq!(
            wire(NormalizedEvent::standby_source()),
            json!({"type": "source", "data": {"name": "standby"}})
        );
    }

    #[test]
    fn test_player_envelope_field_names() {
        let ev = NormalizedEvent::PlayerData(PlayerData {
            state: Some("playing".into()),
            title: Some("Song".into()),
            duration_ms: Some(1000),
            icon_url: Some("http://art".into()),
            audio_type: Some("audioBroadcast".into()),
            ..Default::default()
        });
        let v = wire(ev);
        assert_eq!(v["type"], "player");
        assert_eq!(v["data"]["durationMs"], 1000);
        assert_eq!(v["data"]["iconURL"], "http://art");
        assert_eq!(v["data"]["audioType"], "audioBroadcast");
        assert_eq!(v["data"]["live"], false);
        assert!(v["data"]["artist"].is_null());
    }

    #[test]
    fn test_camel_case_kinds() {
        assert_eq!(
            wire(NormalizedEvent::PlayTime { position_ms: 5 }),
            json!({"type": "playTime", "data": {"positionMs": 5}})
        );
        assert_eq!(
            wire(NormalizedEvent::SpeakerHealth { connected: false }),
            json!({"type": "speakerHealth", "data": {"connected": false}})
        );
        assert_eq!(
            wire(NormalizedEvent::Queue {
                change_marker: Some("9".into()),
                version: Some(2),
            }),
            json!({"type": "queue", "data": {"changeMarker": "9", "version": 2}})
        );
        let play_mode = wire(NormalizedEvent::PlayMode {
            mode: "shuffle".into(),
        });
        assert_eq!(play_mode["type"], "playMode");
    }

    #[test]
    fn test_kind_matches_serialized_tag() {
        let events = [
            NormalizedEvent::Volume { volume: 1 },
            NormalizedEvent::Mute { muted: true },
            NormalizedEvent::PlayerData(PlayerData::default()),
            NormalizedEvent::Speaker {
                name: None,
                address: "a".into(),
            },
        ];
        for ev in events {
            let kind = ev.kind();
            assert_eq!(wire(ev)["type"], kind);
        }
    }

    #[test]
    fn test_control_frames() {
        assert_eq!(wire(ClientFrame::Ping), json!({"type": "ping", "data": {}}));
        assert_eq!(
            wire(ClientFrame::Connected { client_id: 3 }),
            json!({"type": "connected", "data": {"clientId": 3}})
        );
    }
}
