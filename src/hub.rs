//! Fan-out of normalized events to connected push clients.
//!
//! # Overview
//! Every browser connection owns one [`ClientSlot`]: a bounded queue plus its registry
//! entry. [`BroadcastHub::publish`] offers each frame to every slot with `try_send`, so a
//! slow or frozen client can never stall the publisher. When a slot is full the frame is
//! dropped for that client only. Later volume/position frames supersede the dropped ones,
//! so freshness wins over completeness.
//!
//! # Lifecycle
//! * [`BroadcastHub::register`] creates the slot. The transport then sends the `connected`
//!   frame and the state snapshot itself before draining the slot.
//! * Dropping the slot unregisters it, so cleanup runs on every exit path of the
//!   transport task, including unwinding.
//! * Slots whose receiver vanished without unregistering are pruned on the next publish.
//!
//! # Ordering
//! Frames reach each slot in publish order. Only the connection supervisor publishes, from
//! a single task, which gives every client the same relative order of device events.
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::event::{ClientFrame, NormalizedEvent};

pub const DEFAULT_QUEUE_CAPACITY: usize = 10;
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

struct ClientEntry {
    outbound_tx: mpsc::Sender<ClientFrame>,
    dropped: Arc<AtomicU64>,
}

type ClientMap = Arc<RwLock<HashMap<u64, ClientEntry>>>;

pub struct BroadcastHub {
    clients: ClientMap,
    next_id: AtomicU64,
    capacity: usize,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            clients: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    /// Register a new client and hand back its queue.
    pub fn register(&self) -> ClientSlot {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        self.clients.write().insert(
            id,
            ClientEntry {
                outbound_tx: tx,
                dropped: dropped.clone(),
            },
        );
        info!(client_id = id, "Registered push client");
        ClientSlot {
            id,
            rx,
            dropped,
            clients: self.clients.clone(),
        }
    }

    /// Remove a client. Unknown ids are ignored.
    pub fn unregister(&self, client_id: u64) {
        remove_client(&self.clients, client_id);
    }

    /// Offer a device event to every registered client without waiting.
    pub fn publish(&self, event: &NormalizedEvent) {
        self.broadcast(ClientFrame::Event(event.clone()));
    }

    fn broadcast(&self, frame: ClientFrame) {
        let mut closed = Vec::new();
        {
            let clients = self.clients.read();
            for (id, entry) in clients.iter() {
                match entry.outbound_tx.try_send(frame.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        let total = entry.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        debug!(
                            client_id = id,
                            kind = frame.kind(),
                            total,
                            "Client queue full; frame dropped"
                        );
                    }
                    Err(TrySendError::Closed(_)) => closed.push(*id),
                }
            }
            trace!(kind = frame.kind(), recipients = clients.len(), "Broadcast frame");
        }
        for id in closed {
            remove_client(&self.clients, id);
        }
    }

    /// Push a `ping` frame to every client on a fixed period until cancelled.
    pub async fn run_heartbeat(&self, period: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Heartbeat stopped");
                    return;
                }
                _ = ticker.tick() => self.broadcast(ClientFrame::Ping),
            }
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

fn remove_client(clients: &ClientMap, client_id: u64) {
    if clients.write().remove(&client_id).is_some() {
        info!(client_id, "Unregistered push client");
    }
}

/// One client's outbound queue. Unregisters itself when dropped.
pub struct ClientSlot {
    id: u64,
    rx: mpsc::Receiver<ClientFrame>,
    dropped: Arc<AtomicU64>,
    clients: ClientMap,
}

impl ClientSlot {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next queued frame. `None` once the hub removed this slot and the queue is drained.
    pub async fn recv(&mut self) -> Option<ClientFrame> {
        self.rx.recv().await
    }

    /// Frames discarded because this client's queue was full.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for ClientSlot {
    fn drop(&mut self) {
        remove_client(&self.clients, self.id);
    }
}

impl std::fmt::Debug for ClientSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSlot")
            .field("id", &self.id)
            .field("dropped", &self.dropped_frames())
            .finish()
    }
}
