//! Client library for a network speaker exposing a path/value settings API.
//!
//! The speaker publishes change notifications as `{ "path": ..., "value": ... }` pairs
//! over a WebSocket and answers synchronous property reads over HTTP. This crate only
//! moves those payloads around; it does not interpret them beyond typed accessors.

pub mod error;
pub mod events;
pub mod properties;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use error::ClientError;
pub use events::{EventSource, EventStream, WsEventSource};
pub use properties::{HttpPropertyClient, PropertyClient};

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Well-known settings paths used by the speaker firmware.
pub mod paths {
    pub const VOLUME: &str = "player:volume";
    pub const MUTE: &str = "settings:/mediaPlayer/mute";
    pub const PHYSICAL_SOURCE: &str = "settings:/kef/play/physicalSource";
    pub const SPEAKER_STATUS: &str = "settings:/kef/host/speakerStatus";
    pub const PLAYER_DATA: &str = "player:player/data";
    pub const PLAY_TIME: &str = "player:player/data/playTime";
    pub const PLAY_MODE: &str = "settings:/mediaPlayer/playMode";
    pub const QUEUE: &str = "notifications:/player/queue";
}

/// Address and display name of a single speaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Host or `host:port` the speaker API listens on
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl DeviceInfo {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A raw change notification as emitted by the speaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorEvent {
    pub path: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl VendorEvent {
    pub fn new(path: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            path: path.into(),
            value,
        }
    }

    /// Value of a `{"type":"i32_","i32_":n}` payload.
    pub fn i32_value(&self) -> Option<i32> {
        self.value
            .get("i32_")
            .and_then(|v| v.as_i64())
            .and_then(|v| i32::try_from(v).ok())
    }

    /// Value of a `{"type":"i64_","i64_":n}` payload.
    pub fn i64_value(&self) -> Option<i64> {
        self.value.get("i64_").and_then(|v| v.as_i64())
    }

    /// Value of a `{"type":"bool_","bool_":b}` payload.
    pub fn bool_value(&self) -> Option<bool> {
        self.value.get("bool_").and_then(|v| v.as_bool())
    }

    /// String stored under `key`, e.g. `kefPhysicalSource`.
    pub fn string_value(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }
}

/// Now-playing payload of `player:player/data`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VendorPlayerData {
    pub state: Option<String>,
    pub track_roles: Option<TrackRoles>,
    pub status: Option<PlayerStatus>,
    pub media_roles: Option<MediaRoles>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackRoles {
    pub title: Option<String>,
    pub icon: Option<String>,
    pub media_data: Option<MediaData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaData {
    pub meta_data: Option<MetaData>,
    pub resources: Vec<MediaResource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetaData {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub live: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaResource {
    pub duration: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerStatus {
    pub duration: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaRoles {
    pub audio_type: Option<String>,
}

impl VendorPlayerData {
    pub fn title(&self) -> Option<&str> {
        self.track_roles.as_ref()?.title.as_deref()
    }

    pub fn icon(&self) -> Option<&str> {
        self.track_roles.as_ref()?.icon.as_deref()
    }

    fn meta(&self) -> Option<&MetaData> {
        self.track_roles
            .as_ref()?
            .media_data
            .as_ref()?
            .meta_data
            .as_ref()
    }

    pub fn artist(&self) -> Option<&str> {
        self.meta()?.artist.as_deref()
    }

    pub fn album(&self) -> Option<&str> {
        self.meta()?.album.as_deref()
    }

    pub fn is_live(&self) -> bool {
        self.meta().and_then(|m| m.live).unwrap_or(false)
    }

    /// Track duration in milliseconds. The player status wins over the first resource.
    pub fn duration_ms(&self) -> Option<u64> {
        self.status.as_ref().and_then(|s| s.duration).or_else(|| {
            self.track_roles
                .as_ref()?
                .media_data
                .as_ref()?
                .resources
                .iter()
                .find_map(|r| r.duration)
        })
    }

    pub fn audio_type(&self) -> Option<&str> {
        self.media_roles.as_ref()?.audio_type.as_deref()
    }
}

/// Event and property clients bound to one speaker.
#[derive(Clone)]
pub struct SpeakerHandles {
    pub events: Arc<dyn EventSource>,
    pub properties: Arc<dyn PropertyClient>,
}

/// Builds clients for a speaker. Swapped out in tests for in-memory fakes.
pub trait SpeakerConnector: Send + Sync {
    fn connect(&self, device: &DeviceInfo) -> SpeakerHandles;
}

/// Connector for real hardware: WebSocket events plus HTTP property reads.
#[derive(Debug, Clone)]
pub struct HttpSpeakerConnector {
    request_timeout: std::time::Duration,
}

impl HttpSpeakerConnector {
    pub fn new(request_timeout: std::time::Duration) -> Self {
        Self { request_timeout }
    }
}

impl SpeakerConnector for HttpSpeakerConnector {
    fn connect(&self, device: &DeviceInfo) -> SpeakerHandles {
        SpeakerHandles {
            events: Arc::new(WsEventSource::new(&device.address)),
            properties: Arc::new(HttpPropertyClient::new(
                &device.address,
                self.request_timeout,
            )),
        }
    }
}
