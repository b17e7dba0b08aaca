//! HTTP surface: push channels for browsers plus a small REST control API.

mod api;
mod push;
mod server;

use std::sync::Arc;

use crate::hub::BroadcastHub;
use crate::session::SessionManager;

pub use server::WebServer;

#[derive(Clone)]
pub struct WebState {
    pub sessions: Arc<SessionManager>,
    pub hub: Arc<BroadcastHub>,
}
