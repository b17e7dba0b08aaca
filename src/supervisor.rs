//! Keeps the speaker's event subscription alive and feeds it into the hub.
//!
//! # State machine
//! ```text
//!   start ──► Connecting ──ok──► Streaming ──stream ends──► Disconnected
//!                ▲   │                                          │
//!                │   └──────────────err───────────────────────► │
//!                │                                              │
//!                └────── backoff elapsed ◄──── not in standby ◄─┤
//!                                                               │
//!                     wake (backoff reset) ◄── StandbyPaused ◄──┘ in standby
//! ```
//! * Backoff starts at the floor, doubles per consecutive failure up to the ceiling, and is
//!   reset to the floor on every `Streaming` entry and every standby wake.
//! * While the speaker sleeps nothing is attempted; the loop parks on the standby gate.
//!   Standby entered during a backoff delay interrupts the delay.
//! * Only cancellation (session replacement or shutdown) ends the loop.
//!
//! Health flips are published as `speakerHealth` frames once per transition, not per retry.
//! A supervisor cancelled while streaming publishes a final `connected: false`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use speaker_client::{DeviceInfo, EventSource, EventStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::event::NormalizedEvent;
use crate::hub::BroadcastHub;
use crate::standby::StandbyGate;
use crate::translate::translate;

pub const DEFAULT_BACKOFF_FLOOR: Duration = Duration::from_secs(2);
pub const DEFAULT_BACKOFF_CEILING: Duration = Duration::from_secs(30);

/// Bounded exponential backoff.
#[derive(Debug, Clone)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        let ceiling = ceiling.max(floor);
        Self {
            floor,
            ceiling,
            current: floor,
        }
    }

    /// Delay before the next attempt; doubles the following one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.ceiling);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.floor;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_FLOOR, DEFAULT_BACKOFF_CEILING)
    }
}

/// Whether the active session's event stream is currently alive.
/// Written only by the supervisor.
#[derive(Debug, Clone, Default)]
pub struct ConnectionHealth(Arc<AtomicBool>);

impl ConnectionHealth {
    pub fn is_connected(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn set(&self, connected: bool) {
        self.0.store(connected, Ordering::SeqCst);
    }
}

enum StreamEnd {
    Lost,
    Cancelled,
}

pub struct ConnectionSupervisor {
    device: DeviceInfo,
    events: Arc<dyn EventSource>,
    hub: Arc<BroadcastHub>,
    gate: Arc<StandbyGate>,
    health: ConnectionHealth,
    backoff: Backoff,
    reported: Option<bool>,
}

impl ConnectionSupervisor {
    pub fn new(
        device: DeviceInfo,
        events: Arc<dyn EventSource>,
        hub: Arc<BroadcastHub>,
        gate: Arc<StandbyGate>,
        backoff: Backoff,
    ) -> Self {
        Self {
            device,
            events,
            hub,
            gate,
            health: ConnectionHealth::default(),
            backoff,
            reported: None,
        }
    }

    pub fn health(&self) -> ConnectionHealth {
        self.health.clone()
    }

    /// Drive the reconnect loop until `cancel` fires.
    #[tracing::instrument(skip_all, fields(address = %self.device.address))]
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Connection supervisor started");
        let mut first_attempt = true;
        loop {
            if !first_attempt && !self.wait_before_retry(&cancel).await {
                break;
            }
            first_attempt = false;
            if self.gate.is_in_standby() {
                continue;
            }

            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                res = self.events.connect() => res,
            };
            match connected {
                Ok(mut stream) => {
                    info!("Subscribed to speaker events");
                    self.backoff.reset();
                    self.report_health(true);
                    let end = self.stream_events(stream.as_mut(), &cancel).await;
                    stream.close().await;
                    if let StreamEnd::Cancelled = end {
                        break;
                    }
                    self.report_health(false);
                }
                Err(e) => {
                    warn!(error = %e, "Failed to subscribe to speaker events");
                    self.report_health(false);
                }
            }
        }
        if self.reported == Some(true) {
            self.report_health(false);
        }
        self.health.set(false);
        info!("Connection supervisor stopped");
    }

    /// Sit out the backoff delay, parking for any standby episode. A standby that starts
    /// mid-delay abandons the delay and the next one starts from the floor after wake.
    /// Returns `false` once cancelled.
    async fn wait_before_retry(&mut self, cancel: &CancellationToken) -> bool {
        let mut transitions = self.gate.transitions();
        loop {
            if self.gate.is_in_standby() {
                info!("Speaker asleep; reconnects paused until wake");
                if !self.gate.await_wake(cancel).await {
                    return false;
                }
                self.backoff.reset();
                transitions.mark_unchanged();
            }
            let delay = self.backoff.next_delay();
            debug!(delay_ms = delay.as_millis() as u64, "Reconnecting after backoff");
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(delay) => return true,
                Ok(()) = transitions.changed() => {
                    // Standby began, and may already be over; either way the episode resets
                    debug!("Standby changed during backoff; delay restarted");
                    self.backoff.reset();
                }
            }
        }
    }

    async fn stream_events(
        &self,
        stream: &mut dyn EventStream,
        cancel: &CancellationToken,
    ) -> StreamEnd {
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return StreamEnd::Cancelled,
                next = stream.next_event() => next,
            };
            match next {
                Some(Ok(vendor)) => match translate(&vendor) {
                    Some(event) => self.hub.publish(&event),
                    None => trace!(path = %vendor.path, "Ignoring untranslated speaker event"),
                },
                Some(Err(e)) => {
                    warn!(error = %e, "Speaker event stream failed");
                    return StreamEnd::Lost;
                }
                None => {
                    info!("Speaker event stream closed");
                    return StreamEnd::Lost;
                }
            }
        }
    }

    fn report_health(&mut self, connected: bool) {
        self.health.set(connected);
        if self.reported != Some(connected) {
            self.reported = Some(connected);
            self.hub.publish(&NormalizedEvent::SpeakerHealth { connected });
        }
    }
}
