//! Catch-up state for a newly connected client.
//!
//! Frame order: health, identity, volume, mute, source, power, player. A property read that
//! fails is left out; the remaining frames still go out.
//!
//! A sleeping speaker is never queried. Instead the snapshot is exactly
//! `source: standby` and `power: standby`.

use speaker_client::{DeviceInfo, PropertyClient};
use tracing::debug;

use crate::event::NormalizedEvent;
use crate::standby::StandbyGate;
use crate::translate::player_data;

pub async fn snapshot(
    device: &DeviceInfo,
    properties: &dyn PropertyClient,
    gate: &StandbyGate,
    connected: bool,
) -> Vec<NormalizedEvent> {
    if gate.is_in_standby() {
        debug!(address = %device.address, "Speaker in standby; synthesizing snapshot");
        return vec![
            NormalizedEvent::standby_source(),
            NormalizedEvent::standby_power(),
        ];
    }

    let mut frames = vec![
        NormalizedEvent::SpeakerHealth { connected },
        NormalizedEvent::Speaker {
            name: device.name.clone(),
            address: device.address.clone(),
        },
    ];
    if !connected {
        // No live event stream; don't poke the device until the supervisor is back
        return frames;
    }

    match properties.volume().await {
        Ok(volume) => frames.push(NormalizedEvent::Volume { volume }),
        Err(e) => debug!(error = %e, "Snapshot: volume unavailable"),
    }
    match properties.mute().await {
        Ok(muted) => frames.push(NormalizedEvent::Mute { muted }),
        Err(e) => debug!(error = %e, "Snapshot: mute unavailable"),
    }
    match properties.source().await {
        Ok(name) => frames.push(NormalizedEvent::Source { name }),
        Err(e) => debug!(error = %e, "Snapshot: source unavailable"),
    }
    match properties.power().await {
        Ok(status) => frames.push(NormalizedEvent::Power { status }),
        Err(e) => debug!(error = %e, "Snapshot: power unavailable"),
    }
    match properties.now_playing().await {
        Ok(data) => frames.push(NormalizedEvent::PlayerData(player_data(&data))),
        Err(e) => debug!(error = %e, "Snapshot: now playing unavailable"),
    }
    frames
}
