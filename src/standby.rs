//! Tracks whether the speaker is known to be asleep.
//!
//! Querying or subscribing to a sleeping speaker wakes it up, so everything that would
//! touch the device checks [`StandbyGate::is_in_standby`] first. The reconnect loop parks
//! in [`StandbyGate::await_wake`] for the whole standby episode, and watches
//! [`StandbyGate::transitions`] while it sits out a backoff delay.
//!
//! The gate is a resettable event built on a `watch` channel: entering standby resets it,
//! waking sets it, and every waiter parked at that moment is released by the same send.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug)]
pub struct StandbyGate {
    in_standby: watch::Sender<bool>,
}

impl StandbyGate {
    pub fn new() -> Self {
        let (in_standby, _) = watch::channel(false);
        Self { in_standby }
    }

    /// Mark the speaker asleep. No-op when already in standby.
    pub fn notify_standby(&self) {
        let changed = self.in_standby.send_if_modified(|standby| {
            if *standby {
                false
            } else {
                *standby = true;
                true
            }
        });
        if changed {
            info!("Speaker entered standby; device access suspended");
        }
    }

    /// Mark the speaker awake and release all waiters. No-op when not in standby.
    pub fn notify_wake(&self) {
        let changed = self.in_standby.send_if_modified(|standby| {
            if *standby {
                *standby = false;
                true
            } else {
                false
            }
        });
        if changed {
            info!("Speaker woke from standby");
        }
    }

    pub fn is_in_standby(&self) -> bool {
        *self.in_standby.borrow()
    }

    /// Receiver that observes every standby and wake transition from now on.
    pub fn transitions(&self) -> watch::Receiver<bool> {
        self.in_standby.subscribe()
    }

    /// Park until the speaker wakes. Returns `true` on wake (or if it was never asleep)
    /// and `false` if `cancel` fired first.
    pub async fn await_wake(&self, cancel: &CancellationToken) -> bool {
        let mut rx = self.in_standby.subscribe();
        tokio::select! {
            // The sender lives in `self`, so `wait_for` can only end by observing `false`
            res = rx.wait_for(|standby| !*standby) => res.is_ok(),
            _ = cancel.cancelled() => false,
        }
    }
}

impl Default for StandbyGate {
    fn default() -> Self {
        Self::new()
    }
}
