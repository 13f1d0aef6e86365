//! Intents raised by the MQTT task and consumed by the control loop.
//!
//! Raising never waits: each intent is a flag, so any number of repeats
//! between two drains collapse into one.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

use crate::types::BridgeSignal;

#[derive(Default)]
pub struct Signals {
    connected: AtomicBool,
    reauth: AtomicBool,
    poll_now: AtomicBool,
    notify: Notify,
}

impl Signals {
    pub fn raise(&self, signal: BridgeSignal) {
        let flag = match signal {
            BridgeSignal::Connected => &self.connected,
            BridgeSignal::ForceReauth => &self.reauth,
            BridgeSignal::PollNow => &self.poll_now,
        };
        flag.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Clears and returns the pending intents, connection first.
    pub fn take(&self) -> Vec<BridgeSignal> {
        [
            (&self.connected, BridgeSignal::Connected),
            (&self.reauth, BridgeSignal::ForceReauth),
            (&self.poll_now, BridgeSignal::PollNow),
        ]
        .into_iter()
        .filter(|(flag, _)| flag.swap(false, Ordering::SeqCst))
        .map(|(_, signal)| signal)
        .collect()
    }

    /// Resolves once something was raised since the last wakeup.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}
