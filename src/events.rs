// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! EventSink (spec.md §6, §9): a typed subscription registry. Delivery is
//! at-least-once and ordered with respect to each publisher, via
//! [`tokio::sync::broadcast`] — the natural Rust rendition of the source's
//! "event-emitter inheritance" idiom.

use tokio::sync::broadcast;

use crate::model::{
    operation::OperationId,
    switch::SwitchId,
    tunnel::{TunnelDescriptor, TunnelName},
};

/// All events emitted by the coordination core (spec.md §6).
#[derive(Debug, Clone)]
pub enum Event {
    Started,
    Stopped,
    Connected(TunnelDescriptor),
    Disconnected(TunnelDescriptor),
    Switched(TunnelDescriptor),
    DelayedSwitchScheduled(SwitchId),
    DelayedSwitchCancelled(SwitchId, String),
    DelayedSwitchDispatched(SwitchId),
    SwitchFailed(SwitchId, String),
    OperationStarted(OperationId),
    OperationCompleted(OperationId),
    OperationInterrupted(OperationId),
}

impl Event {
    /// The tunnel a connection-lifecycle event pertains to, if any — used by
    /// the buffer's subscription filter.
    pub fn tunnel_name(&self) -> Option<&TunnelName> {
        match self {
            Event::Connected(t) | Event::Disconnected(t) | Event::Switched(t) => {
                Some(&t.name)
            },
            _ => None,
        }
    }
}

/// Default channel depth for the broadcast bus. Slow subscribers that fall
/// this far behind lose the oldest events (a `RecvError::Lagged`); the core
/// itself never blocks a publisher on a slow subscriber.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Typed, multi-subscriber event bus.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribes a new listener; it observes every event published from
    /// this point on, in publisher order.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Publishes an event. Delivery is best-effort: with zero subscribers
    /// this is a no-op, matching a plain observer-list emit with no
    /// listeners registered.
    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_observe_publisher_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(Event::Started);
        bus.publish(Event::Stopped);

        assert!(matches!(rx.recv().await.expect("recv"), Event::Started));
        assert!(matches!(rx.recv().await.expect("recv"), Event::Stopped));
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_a_no_op() {
        let bus = EventBus::new();
        bus.publish(Event::Started);
    }
}
