//! Vendor event → [`NormalizedEvent`] mapping.
//!
//! Pure and stateless. Paths the browser UI has no use for, and payloads that do not carry
//! the expected value type, map to `None` and are dropped by the caller.

use speaker_client::{VendorEvent, VendorPlayerData, paths};

use crate::event::{NormalizedEvent, PlayerData};

pub fn translate(event: &VendorEvent) -> Option<NormalizedEvent> {
    match event.path.as_str() {
        paths::VOLUME => event
            .i32_value()
            .map(|volume| NormalizedEvent::Volume { volume }),
        paths::MUTE => event
            .bool_value()
            .map(|muted| NormalizedEvent::Mute { muted }),
        paths::PHYSICAL_SOURCE => event
            .string_value("kefPhysicalSource")
            .map(|name| NormalizedEvent::Source {
                name: name.to_string(),
            }),
        paths::SPEAKER_STATUS => event
            .string_value("kefSpeakerStatus")
            .map(|status| NormalizedEvent::Power {
                status: status.to_string(),
            }),
        paths::PLAYER_DATA => serde_json::from_value::<VendorPlayerData>(event.value.clone())
            .ok()
            .map(|data| NormalizedEvent::PlayerData(player_data(&data))),
        paths::PLAY_TIME => event
            .i64_value()
            .map(|position_ms| NormalizedEvent::PlayTime { position_ms }),
        paths::PLAY_MODE => event
            .string_value("playerPlayMode")
            .map(|mode| NormalizedEvent::PlayMode {
                mode: mode.to_string(),
            }),
        paths::QUEUE => Some(queue(&event.value)),
        _ => None,
    }
}

/// Flatten the nested now-playing payload.
pub fn player_data(data: &VendorPlayerData) -> PlayerData {
    PlayerData {
        state: data.state.clone(),
        title: data.title().map(str::to_string),
        artist: data.artist().map(str::to_string),
        album: data.album().map(str::to_string),
        duration_ms: data.duration_ms(),
        icon_url: data.icon().map(str::to_string),
        audio_type: data.audio_type().map(str::to_string),
        live: data.is_live(),
    }
}

// Firmware versions disagree on whether the marker is a string or a number
fn queue(value: &serde_json::Value) -> NormalizedEvent {
    let change_marker = match value.get("changeMarker") {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    NormalizedEvent::Queue {
        change_marker,
        version: value.get("version").and_then(|v| v.as_i64()),
    }
}
