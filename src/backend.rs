//! Backend module for speakerlink
//!
//! This module handles taking in a configuration and setting up the long-running services:
//! the heartbeat, the speaker session and the web server.

use crate::config::AppConfig;
use crate::hub::BroadcastHub;
use crate::session::SessionManager;
use crate::web::{WebServer, WebState};
use eyre::{Context, Result};
use futures::future::select_all;
use speaker_client::{DeviceInfo, HttpSpeakerConnector, SpeakerConnector};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Manages the lifecycle of background services (tasks)
struct ServiceManager {
    handles: Vec<JoinHandle<()>>,
}

impl ServiceManager {
    /// Creates a new, empty ServiceManager.
    fn new() -> Self {
        Self {
            handles: Vec::new(),
        }
    }

    /// Spawns a new task and adds its handle to the manager.
    fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handles.push(tokio::spawn(future));
    }

    /// Aborts all managed tasks.
    fn shutdown(&self) {
        tracing::info!("Aborting all service tasks...");
        for handle in &self.handles {
            handle.abort();
        }
    }

    /// Waits for any of the managed services to complete.
    /// This is useful for detecting unexpected shutdowns.
    async fn wait_for_any_completion(&mut self) {
        if self.handles.is_empty() {
            // If there are no tasks, wait indefinitely.
            std::future::pending::<()>().await;
            return;
        }
        // `select_all` waits for the first future to complete.
        let (result, index, _) = select_all(self.handles.iter_mut()).await;
        tracing::warn!("Service task at index {} completed unexpectedly.", index);
        if let Err(e) = result {
            if e.is_panic() {
                tracing::error!("The task panicked!");
            }
        }
    }
}

/// Represents the actual backend service
pub struct Backend {
    config: AppConfig,
    hub: Arc<BroadcastHub>,
    sessions: Arc<SessionManager>,
    service_manager: ServiceManager,
    cancel: CancellationToken,
}

impl Backend {
    /// Create a new backend from configuration, talking to real speakers over HTTP
    pub fn new(config: AppConfig) -> Self {
        let connector = Arc::new(HttpSpeakerConnector::new(config.speaker.request_timeout()));
        Self::with_connector(config, connector)
    }

    pub fn with_connector(config: AppConfig, connector: Arc<dyn SpeakerConnector>) -> Self {
        let cancel = CancellationToken::new();
        let hub = Arc::new(BroadcastHub::new(config.sync.client_queue_capacity));
        let sessions = Arc::new(SessionManager::new(
            hub.clone(),
            connector,
            config.sync.backoff(),
            cancel.child_token(),
        ));
        Self {
            config,
            hub,
            sessions,
            service_manager: ServiceManager::new(),
            cancel,
        }
    }

    /// Spawn a service task with automatic management
    fn spawn_service<F>(&mut self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::debug!("Spawning service: {}", name);
        self.service_manager.spawn(future);
    }

    /// Start all configured backend services
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!("Starting backend services...");

        self.start_heartbeat_service();
        if self.config.web.enabled {
            self.start_web_service()?;
        } else {
            tracing::info!("Web server is disabled");
        }

        match &self.config.speaker.address {
            Some(address) => {
                let mut device = DeviceInfo::new(address.clone());
                device.name = self.config.speaker.name.clone();
                self.sessions.set_active_device(device).await;
            }
            None => tracing::info!("No speaker configured; waiting for PUT /api/device"),
        }

        tracing::info!("All backend services started successfully");
        Ok(())
    }

    fn start_heartbeat_service(&mut self) {
        let hub = self.hub.clone();
        let period = self.config.sync.heartbeat();
        let cancel = self.cancel.child_token();
        self.spawn_service("heartbeat", async move {
            hub.run_heartbeat(period, cancel).await;
        });
    }

    fn start_web_service(&mut self) -> Result<()> {
        let web = &self.config.web;
        let bind_addr: SocketAddr = format!("{}:{}", web.host, web.port)
            .parse()
            .with_context(|| format!("Invalid web bind address {}:{}", web.host, web.port))?;
        let server = WebServer::new(
            bind_addr,
            web.assets_path.clone(),
            WebState {
                sessions: self.sessions.clone(),
                hub: self.hub.clone(),
            },
        );
        let cancel = self.cancel.child_token();
        self.spawn_service("web", async move {
            if let Err(e) = server.run(cancel).await {
                tracing::error!("Web server error: {:?}", e);
            }
        });
        Ok(())
    }

    /// Wait for all services to complete or handle shutdown
    pub async fn wait_for_shutdown(&mut self) -> Result<()> {
        tracing::info!("Waiting for shutdown signal...");

        tokio::select! {
            // Wait for Ctrl+C
            signal_result = tokio::signal::ctrl_c() => {
                match signal_result {
                    Ok(_) => tracing::info!("Received Ctrl+C, shutting down gracefully..."),
                    Err(e) => tracing::error!("Failed to listen for Ctrl+C: {}", e),
                }
            }
            // Wait for any service to complete (which might indicate an error)
            _ = self.service_manager.wait_for_any_completion() => {
                tracing::warn!("One or more services completed unexpectedly, shutting down...");
            }
        }

        self.shutdown().await?;
        Ok(())
    }

    /// Gracefully shutdown all services
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("Shutting down backend services...");
        self.cancel.cancel();
        self.sessions.shutdown().await;
        self.service_manager.shutdown();
        tracing::info!("Backend shutdown complete");
        Ok(())
    }
}

/// Convenience function to create and start a backend from configuration
pub async fn setup_and_run_backend(config: AppConfig) -> Result<()> {
    let mut backend = Backend::new(config);
    backend.start().await?;
    backend.wait_for_shutdown().await?;
    Ok(())
}
