//! Speaker change-notification stream.
//!
//! The speaker pushes UTF-8 JSON text frames on `ws://<address>/api/events`. A frame holds
//! either a single [`VendorEvent`] or an array of them; arrays are flattened in order.

use std::collections::VecDeque;

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};
use tracing::{debug, trace, warn};

use crate::{ClientError, Result, VendorEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens event subscriptions against one speaker.
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    /// Subscribe to the speaker's change notifications. `Ok` means the subscription is live.
    async fn connect(&self) -> Result<Box<dyn EventStream>>;
}

/// A live subscription.
#[async_trait::async_trait]
pub trait EventStream: Send {
    /// Next notification. `None` once the speaker closed the stream.
    async fn next_event(&mut self) -> Option<Result<VendorEvent>>;

    /// Tear down the subscription. Idempotent.
    async fn close(&mut self);
}

#[derive(Debug, Clone)]
pub struct WsEventSource {
    url: String,
}

impl WsEventSource {
    pub fn new(address: &str) -> Self {
        Self {
            url: format!("ws://{address}/api/events"),
        }
    }
}

#[async_trait::async_trait]
impl EventSource for WsEventSource {
    async fn connect(&self) -> Result<Box<dyn EventStream>> {
        debug!(url = %self.url, "Connecting to speaker event stream");
        let (ws, response) = connect_async(self.url.as_str()).await.map_err(Box::new)?;
        debug!(status = ?response.status(), "Speaker event stream connected");
        Ok(Box::new(WsEventStream {
            ws: Some(ws),
            pending: VecDeque::new(),
        }))
    }
}

struct WsEventStream {
    ws: Option<WsStream>,
    pending: VecDeque<VendorEvent>,
}

#[async_trait::async_trait]
impl EventStream for WsEventStream {
    async fn next_event(&mut self) -> Option<Result<VendorEvent>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            let ws = self.ws.as_mut()?;
            match ws.next().await {
                Some(Ok(Message::Text(text))) => match parse_frame(text.as_str()) {
                    Ok(events) => {
                        trace!(count = events.len(), "RX speaker events");
                        self.pending.extend(events);
                    }
                    Err(e) => {
                        // Malformed frames are skipped, the subscription itself is still fine
                        warn!(error = %e, "Skipping undecodable speaker frame");
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Speaker closed event stream");
                    self.ws = None;
                    return None;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    self.ws = None;
                    return Some(Err(ClientError::from(Box::new(e))));
                }
                None => {
                    self.ws = None;
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut ws) = self.ws.take() {
            if let Err(e) = ws.close(None).await {
                debug!(error = %e, "Error while closing speaker event stream");
            }
        }
        self.pending.clear();
    }
}

/// Decode one text frame into zero or more events.
pub fn parse_frame(text: &str) -> Result<Vec<VendorEvent>> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    if value.is_array() {
        Ok(serde_json::from_value(value)?)
    } else {
        Ok(vec![serde_json::from_value(value)?])
    }
}
