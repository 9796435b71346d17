//! Event channel adapter.
//!
//! Wraps the bidirectional event transport behind a typed subscribe/emit
//! surface. The adapter is an explicit, owned object — whoever establishes
//! the session constructs it and passes it where it is needed; there is no
//! module-level singleton. It is fully synchronous: the network driver
//! feeds it inbound events and drains its outbox, so it can be tested
//! without a socket.

use log::debug;
use shared::protocol::{ClientIntent, ServerEvent, Topic};
use std::collections::VecDeque;

/// An event as seen by subscribers: either a connection-state change
/// (the synthetic `connect`/`disconnect` topics) or a server message.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    Message(ServerEvent),
}

impl ChannelEvent {
    pub fn topic(&self) -> Topic {
        match self {
            ChannelEvent::Connected => Topic::Connect,
            ChannelEvent::Disconnected => Topic::Disconnect,
            ChannelEvent::Message(event) => event.topic(),
        }
    }
}

pub type Handler = Box<dyn FnMut(&ChannelEvent) + Send>;

/// Token returned by `subscribe`; deregisters exactly that one handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription(u64);

struct Entry {
    id: u64,
    topic: Topic,
    key: String,
    handler: Handler,
}

pub struct EventChannel {
    entries: Vec<Entry>,
    next_id: u64,
    connected: bool,
    outbox: VecDeque<ClientIntent>,
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl EventChannel {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
            connected: false,
            outbox: VecDeque::new(),
        }
    }

    /// Registers a handler for a topic. Handlers run in registration order.
    ///
    /// Registration is keyed: subscribing again with the same (topic, key)
    /// replaces the earlier handler instead of adding a second one, so a
    /// view that re-runs its setup cannot multiply delivered callbacks.
    pub fn subscribe(&mut self, topic: Topic, key: &str, handler: Handler) -> Subscription {
        self.entries
            .retain(|entry| !(entry.topic == topic && entry.key == key));
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(Entry {
            id,
            topic,
            key: key.to_string(),
            handler,
        });
        Subscription(id)
    }

    /// Removes the single handler behind the token. Unknown tokens are a
    /// no-op (the handler may already have been replaced by key).
    pub fn unsubscribe(&mut self, subscription: Subscription) {
        self.entries.retain(|entry| entry.id != subscription.0);
    }

    /// Removes every handler registered for a topic.
    pub fn unsubscribe_topic(&mut self, topic: Topic) {
        self.entries.retain(|entry| entry.topic != topic);
    }

    /// Teardown: drops all handlers and any queued outbound intents.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.outbox.clear();
    }

    /// Delivers an event to every handler subscribed to its topic, in
    /// registration order.
    pub fn dispatch(&mut self, event: &ChannelEvent) {
        let topic = event.topic();
        for entry in self.entries.iter_mut() {
            if entry.topic == topic {
                (entry.handler)(event);
            }
        }
    }

    /// Queues an intent for sending. Never drops: while the transport is
    /// down the intent waits in the outbox and the driver retries once the
    /// connection is back.
    pub fn emit(&mut self, intent: ClientIntent) {
        if !self.connected {
            debug!("Channel disconnected, queueing intent for retry");
        }
        self.outbox.push_back(intent);
    }

    /// Drains queued intents for transmission.
    pub fn take_outbox(&mut self) -> Vec<ClientIntent> {
        self.outbox.drain(..).collect()
    }

    pub fn pending(&self) -> usize {
        self.outbox.len()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Flips the connection state and raises the matching synthetic topic
    /// event. Idempotent: repeating the current state does nothing, so
    /// redundant connect calls cannot produce duplicate notifications.
    pub fn set_connected(&mut self, connected: bool) {
        if self.connected == connected {
            return;
        }
        self.connected = connected;
        let event = if connected {
            ChannelEvent::Connected
        } else {
            ChannelEvent::Disconnected
        };
        self.dispatch(&event);
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.topic == topic)
            .count()
    }
}
