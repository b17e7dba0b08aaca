//! Owns the single active speaker session and the standby gate.
//!
//! At most one session exists. Swapping devices cancels the old supervisor and waits for it
//! to close its subscription before the new one is spawned, so two supervisors never
//! publish at the same time.

use std::sync::Arc;

use speaker_client::{DeviceInfo, PropertyClient, SpeakerConnector};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{AppError, err};
use crate::event::{NormalizedEvent, STANDBY};
use crate::hub::BroadcastHub;
use crate::snapshot;
use crate::standby::StandbyGate;
use crate::supervisor::{Backoff, ConnectionHealth, ConnectionSupervisor};

struct ActiveSession {
    device: DeviceInfo,
    properties: Arc<dyn PropertyClient>,
    health: ConnectionHealth,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ActiveSession {
    async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(address = %self.device.address, error = %e, "Supervisor task ended abnormally");
        }
    }
}

pub struct SessionManager {
    active: Mutex<Option<ActiveSession>>,
    gate: Arc<StandbyGate>,
    hub: Arc<BroadcastHub>,
    connector: Arc<dyn SpeakerConnector>,
    backoff: Backoff,
    shutdown: CancellationToken,
}

impl SessionManager {
    pub fn new(
        hub: Arc<BroadcastHub>,
        connector: Arc<dyn SpeakerConnector>,
        backoff: Backoff,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            active: Mutex::new(None),
            gate: Arc::new(StandbyGate::new()),
            hub,
            connector,
            backoff,
            shutdown,
        }
    }

    /// Make `device` the active speaker. Returns `false` if it already was.
    pub async fn set_active_device(&self, device: DeviceInfo) -> bool {
        let mut active = self.active.lock().await;
        if let Some(current) = active.as_ref() {
            if current.device.address == device.address {
                return false;
            }
        }
        if let Some(old) = active.take() {
            info!(address = %old.device.address, "Tearing down previous speaker session");
            old.stop().await;
        }
        if self.shutdown.is_cancelled() {
            warn!(address = %device.address, "Shutting down; not starting speaker session");
            return false;
        }

        // Standby belonged to the previous speaker
        self.gate.notify_wake();

        let handles = self.connector.connect(&device);
        let supervisor = ConnectionSupervisor::new(
            device.clone(),
            handles.events,
            self.hub.clone(),
            self.gate.clone(),
            self.backoff.clone(),
        );
        let health = supervisor.health();
        let cancel = self.shutdown.child_token();
        let task = tokio::spawn(supervisor.run(cancel.clone()));
        info!(address = %device.address, name = ?device.name, "Speaker session started");

        *active = Some(ActiveSession {
            device,
            properties: handles.properties,
            health,
            cancel,
            task,
        });
        true
    }

    pub async fn active_device(&self) -> Option<DeviceInfo> {
        self.active.lock().await.as_ref().map(|s| s.device.clone())
    }

    pub async fn is_connected(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| s.health.is_connected())
    }

    /// Catch-up frames for a newly registered client.
    pub async fn snapshot(&self) -> Vec<NormalizedEvent> {
        let session = self.active.lock().await.as_ref().map(|s| {
            (
                s.device.clone(),
                s.properties.clone(),
                s.health.is_connected(),
            )
        });
        match session {
            Some((device, properties, connected)) => {
                snapshot::snapshot(&device, properties.as_ref(), &self.gate, connected).await
            }
            None if self.gate.is_in_standby() => vec![
                NormalizedEvent::standby_source(),
                NormalizedEvent::standby_power(),
            ],
            None => vec![NormalizedEvent::SpeakerHealth { connected: false }],
        }
    }

    /// Switch the speaker's input. Selecting `standby` puts it to sleep; anything else wakes it.
    pub async fn set_source(&self, source: &str) -> Result<(), AppError> {
        let properties = self
            .active
            .lock()
            .await
            .as_ref()
            .map(|s| s.properties.clone())
            .ok_or_else(|| err::not_found("no active speaker"))?;
        properties.set_source(source).await?;
        if source == STANDBY {
            self.notify_standby();
        } else {
            self.notify_wake();
        }
        Ok(())
    }

    pub fn notify_standby(&self) {
        self.gate.notify_standby();
    }

    pub fn notify_wake(&self) {
        self.gate.notify_wake();
    }

    pub fn is_in_standby(&self) -> bool {
        self.gate.is_in_standby()
    }

    /// Cancel and join the active supervisor. Later `set_active_device` calls are refused.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let session = self.active.lock().await.take();
        if let Some(session) = session {
            let address = session.device.address.clone();
            session.stop().await;
            info!(%address, "Speaker session stopped");
        }
    }
}
