//! Synchronous property reads and writes over the speaker's HTTP settings API.
//!
//! `GET /api/getData?path=<path>&roles=value` answers with a one-element JSON array
//! holding the value object, e.g. `[{"type":"i32_","i32_":35}]`.

use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, trace, warn};

use crate::{ClientError, Result, VendorEvent, VendorPlayerData, paths};

/// Independently fallible property getters plus the source setter.
#[async_trait::async_trait]
pub trait PropertyClient: Send + Sync {
    async fn volume(&self) -> Result<i32>;
    async fn mute(&self) -> Result<bool>;
    async fn source(&self) -> Result<String>;
    async fn power(&self) -> Result<String>;
    async fn now_playing(&self) -> Result<VendorPlayerData>;
    async fn set_source(&self, source: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct HttpPropertyClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpPropertyClient {
    pub fn new(address: &str, timeout: Duration) -> Self {
        let http = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(http) => http,
            Err(e) => {
                warn!(
                    error = %e,
                    address,
                    "HTTP client setup failed, requests run without timeout"
                );
                reqwest::Client::new()
            }
        };
        Self {
            base_url: format!("http://{address}"),
            http,
        }
    }

    async fn get_value(&self, path: &str) -> Result<Value> {
        let url = format!("{}/api/getData", self.base_url);
        trace!(%url, path, "getData");
        let body: Value = self
            .http
            .get(url)
            .query(&[("path", path), ("roles", "value")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        first_value(path, body)
    }

    /// Wrap a raw value as an event so the same accessors apply to reads and notifications.
    async fn get_event(&self, path: &str) -> Result<VendorEvent> {
        Ok(VendorEvent::new(path, self.get_value(path).await?))
    }
}

fn first_value(path: &str, body: Value) -> Result<Value> {
    match body {
        Value::Array(mut items) if !items.is_empty() => Ok(items.swap_remove(0)),
        other => Err(ClientError::unexpected(path, other)),
    }
}

#[async_trait::async_trait]
impl PropertyClient for HttpPropertyClient {
    async fn volume(&self) -> Result<i32> {
        let ev = self.get_event(paths::VOLUME).await?;
        ev.i32_value()
            .ok_or_else(|| ClientError::unexpected(paths::VOLUME, ev.value.clone()))
    }

    async fn mute(&self) -> Result<bool> {
        let ev = self.get_event(paths::MUTE).await?;
        ev.bool_value()
            .ok_or_else(|| ClientError::unexpected(paths::MUTE, ev.value.clone()))
    }

    async fn source(&self) -> Result<String> {
        let ev = self.get_event(paths::PHYSICAL_SOURCE).await?;
        ev.string_value("kefPhysicalSource")
            .map(str::to_string)
            .ok_or_else(|| ClientError::unexpected(paths::PHYSICAL_SOURCE, ev.value.clone()))
    }

    async fn power(&self) -> Result<String> {
        let ev = self.get_event(paths::SPEAKER_STATUS).await?;
        ev.string_value("kefSpeakerStatus")
            .map(str::to_string)
            .ok_or_else(|| ClientError::unexpected(paths::SPEAKER_STATUS, ev.value.clone()))
    }

    async fn now_playing(&self) -> Result<VendorPlayerData> {
        let value = self.get_value(paths::PLAYER_DATA).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn set_source(&self, source: &str) -> Result<()> {
        let url = format!("{}/api/setData", self.base_url);
        let value = json!({"type": "kefPhysicalSource", "kefPhysicalSource": source}).to_string();
        debug!(source, "Setting physical source");
        self.http
            .get(url)
            .query(&[
                ("path", paths::PHYSICAL_SOURCE),
                ("roles", "value"),
                ("value", value.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
