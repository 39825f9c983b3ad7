// Copyright (c) XBridge, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The bounded event queue between the listeners (plus the heartbeat
//! timer) and the single federator consumer. Producers hold cloned
//! senders; a full queue applies backpressure to the producing listener,
//! and a closed queue (federator gone during shutdown) makes pushes inert
//! instead of panicking.

use crate::events::WitnessEvent;
use tokio::sync::mpsc;
use tracing::debug;

pub const DEFAULT_EVENT_QUEUE_SIZE: usize = 1024;

pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender { tx }, rx)
}

pub type EventReceiver = mpsc::Receiver<WitnessEvent>;

#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<WitnessEvent>,
}

impl EventSender {
    pub async fn push(&self, event: WitnessEvent) {
        let event_type = event.event_type();
        if self.tx.send(event).await.is_err() {
            debug!(event_type, "event dropped, federator is gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn preserves_push_order() {
        let (tx, mut rx) = event_channel(4);
        tx.push(WitnessEvent::HeartbeatTimer).await;
        tx.push(WitnessEvent::HeartbeatTimer).await;
        assert_eq!(rx.recv().await, Some(WitnessEvent::HeartbeatTimer));
        assert_eq!(rx.recv().await, Some(WitnessEvent::HeartbeatTimer));
    }

    #[tokio::test]
    async fn push_after_consumer_drop_is_inert() {
        let (tx, rx) = event_channel(1);
        drop(rx);
        tx.push(WitnessEvent::HeartbeatTimer).await;
    }

    #[tokio::test]
    async fn closed_when_all_senders_drop() {
        let (tx, mut rx) = event_channel(1);
        drop(tx);
        assert_eq!(rx.recv().await, None);
    }
}
