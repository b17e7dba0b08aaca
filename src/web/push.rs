//! Push channels. SSE and WebSocket carry identical frames.
//!
//! Every connection registers its hub slot before anything else, then sends `connected`
//! and the snapshot, then drains the slot. Live events published while the snapshot was
//! being gathered wait in the slot and follow it. The slot is dropped on every exit path,
//! which unregisters the client.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    extract::{
        ConnectInfo, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{
        Response,
        sse::{Event, Sse},
    },
};
use futures::stream::{self, Stream, StreamExt};
use futures_util::SinkExt;
use futures_util::stream::SplitSink;
use tracing::{debug, error, info};

use super::WebState;
use crate::event::ClientFrame;
use crate::hub::ClientSlot;

/// Register with the hub and build the frames that precede live traffic.
async fn open_slot(state: &WebState) -> (ClientSlot, Vec<ClientFrame>) {
    let slot = state.hub.register();
    let mut initial = vec![ClientFrame::Connected {
        client_id: slot.id(),
    }];
    initial.extend(
        state
            .sessions
            .snapshot()
            .await
            .into_iter()
            .map(ClientFrame::from),
    );
    (slot, initial)
}

fn encode(frame: &ClientFrame) -> Option<String> {
    match frame.to_json() {
        Ok(json) => Some(json),
        Err(e) => {
            error!(kind = frame.kind(), "Failed to serialize frame: {}", e);
            None
        }
    }
}

pub async fn sse_handler(
    State(state): State<WebState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (slot, initial) = open_slot(&state).await;
    info!(client_id = slot.id(), "SSE push client connected");

    let live = stream::unfold(slot, |mut slot| async move {
        let frame = slot.recv().await?;
        Some((frame, slot))
    });
    let frames = stream::iter(initial)
        .chain(live)
        .filter_map(|frame| async move { encode(&frame) })
        .map(|json| Ok(Event::default().data(json)));
    Sse::new(frames)
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<WebState>,
) -> Response {
    info!("New WebSocket push connection from {}", addr);
    ws.on_upgrade(move |socket| handle_socket(socket, addr, state))
}

async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &ClientFrame,
) -> Result<(), axum::Error> {
    match encode(frame) {
        Some(json) => sender.send(Message::Text(json.into())).await,
        None => Ok(()),
    }
}

/// Serves one WebSocket client until either side goes away.
/// Inbound messages other than close are ignored.
#[tracing::instrument(skip_all, fields(addr = %addr))]
async fn handle_socket(socket: WebSocket, addr: SocketAddr, state: WebState) {
    let (mut sender, mut receiver) = socket.split();
    let (mut slot, initial) = open_slot(&state).await;
    let client_id = slot.id();

    for frame in &initial {
        if send_frame(&mut sender, frame).await.is_err() {
            debug!(client_id, "Client went away during snapshot");
            return;
        }
    }

    loop {
        tokio::select! {
            frame = slot.recv() => {
                let Some(frame) = frame else { break };
                if send_frame(&mut sender, &frame).await.is_err() {
                    break;
                }
            }
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    info!(
        client_id,
        dropped = slot.dropped_frames(),
        "WebSocket push client disconnected"
    );
}
