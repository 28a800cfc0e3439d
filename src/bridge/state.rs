//! Bridge state machine.
//!
//! ```text
//! Idle ─connect─> Connecting ─connected─> Connected ─join─> Joining(t) ─ok──> Joined(t)
//!                     │                       │                      └─err─> JoinFailed(t)
//!                     └──────disconnected─────┴─> Disconnected(reason)
//!
//! Joined(t) ─leave─> Leaving(t) ─channel closed─> Left(t)
//! ```
//!
//! Connection and topic states are tracked separately: a bridge is in one
//! connection state and each topic it has touched is in one topic state.

use std::collections::HashMap;

use serde_json::Value;

use crate::message::Topic;

/// Connection state of a bridge.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ConnectionState {
    /// Started without connecting.
    #[default]
    Idle,
    /// A connect request is in flight.
    Connecting,
    /// The socket is up.
    Connected,
    /// The socket went down.
    Disconnected(Value),
}

/// State of one topic on a bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum TopicState {
    /// Join requested, no answer yet.
    Joining,
    /// Join accepted.
    Joined,
    /// Join refused.
    JoinFailed(Value),
    /// Leave requested, channel not yet closed.
    Leaving,
    /// Channel closed.
    Left,
}

/// Snapshot of a bridge's state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BridgeStatus {
    /// Connection state.
    pub connection: ConnectionState,
    /// Per-topic state.
    pub topics: HashMap<Topic, TopicState>,
}

impl BridgeStatus {
    /// State of a topic, if the bridge has touched it.
    #[must_use]
    pub fn topic(&self, topic: &Topic) -> Option<&TopicState> {
        self.topics.get(topic)
    }

    /// Whether the socket is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }

    pub(crate) fn connecting(&mut self) {
        self.connection = ConnectionState::Connecting;
    }

    pub(crate) fn connected(&mut self) {
        self.connection = ConnectionState::Connected;
    }

    /// Topics do not survive the socket.
    pub(crate) fn disconnected(&mut self, reason: Value) {
        self.connection = ConnectionState::Disconnected(reason);
        self.topics.clear();
    }

    pub(crate) fn set_topic(&mut self, topic: Topic, state: TopicState) {
        self.topics.insert(topic, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_is_idle() {
        let status = BridgeStatus::default();
        assert_eq!(status.connection, ConnectionState::Idle);
        assert!(status.topics.is_empty());
        assert!(!status.is_connected());
    }

    #[test]
    fn test_disconnect_clears_topics() {
        let mut status = BridgeStatus::default();
        status.connecting();
        status.connected();
        status.set_topic("room:1".into(), TopicState::Joined);
        assert!(status.is_connected());

        status.disconnected(json!("closed"));
        assert_eq!(status.connection, ConnectionState::Disconnected(json!("closed")));
        assert!(status.topic(&"room:1".into()).is_none());
    }
}
