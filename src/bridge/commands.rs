//! Messages from a bridge handle to its socket task.
//!
//! Controls are fire-and-forget; their outcome arrives later in the owner
//! mailbox. Queries carry a oneshot channel and are answered directly by the
//! socket task, bypassing the mailbox:
//!
//! ```ignore
//! let (msg, rx) = BridgeQuery::status();
//! inbound_tx.send(msg)?;
//! let reply = rx.await?;
//! ```

use serde_json::Value;
use tokio::sync::oneshot;

use super::state::BridgeStatus;
use crate::mailbox::CallId;
use crate::message::{Ref, Topic};
use crate::socket::Inbound;

/// Fire-and-forget requests to the socket task.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeControl {
    /// Connect with the configured URL and query parameters.
    Connect,
    /// Connect with overridden URL and query parameters.
    ConnectTo {
        /// Endpoint URL.
        url: String,
        /// Query parameters.
        query_params: Vec<(String, String)>,
    },
    /// Join a topic on behalf of a blocking call.
    Join {
        /// Call the join result is tagged with.
        call: CallId,
        /// Topic to join.
        topic: Topic,
        /// Join payload.
        payload: Value,
    },
    /// Leave a topic on behalf of a blocking call.
    Leave {
        /// Call the leave ack and close are tagged with.
        call: CallId,
        /// Topic to leave.
        topic: Topic,
        /// Leave payload.
        payload: Value,
    },
}

/// Requests answered synchronously by the socket task.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeQuery {
    /// Push a message and return its ref.
    Push {
        /// Topic to push on.
        topic: Topic,
        /// Event name.
        event: String,
        /// Message payload.
        payload: Value,
    },
    /// Ask the protocol client whether a topic is joined.
    IsJoined(Topic),
    /// Snapshot the bridge state.
    Status,
}

/// Answers to [`BridgeQuery`].
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeReply {
    /// Result of a push.
    Pushed(Result<Ref, Value>),
    /// Whether the topic is joined.
    IsJoined(bool),
    /// Current state.
    Status(BridgeStatus),
}

/// Inbound message type of the bridge's socket task.
pub type BridgeInbound = Inbound<BridgeControl, BridgeQuery, BridgeReply>;

impl BridgeControl {
    /// Wrap into an inbound message.
    #[must_use]
    pub fn into_inbound(self) -> BridgeInbound {
        Inbound::Control(self)
    }
}

impl BridgeQuery {
    /// Create a push query.
    #[must_use]
    pub fn push(
        topic: Topic,
        event: impl Into<String>,
        payload: Value,
    ) -> (BridgeInbound, oneshot::Receiver<BridgeReply>) {
        Self::Push {
            topic,
            event: event.into(),
            payload,
        }
        .into_inbound()
    }

    /// Create a joined? query.
    #[must_use]
    pub fn is_joined(topic: Topic) -> (BridgeInbound, oneshot::Receiver<BridgeReply>) {
        Self::IsJoined(topic).into_inbound()
    }

    /// Create a status query.
    #[must_use]
    pub fn status() -> (BridgeInbound, oneshot::Receiver<BridgeReply>) {
        Self::Status.into_inbound()
    }

    fn into_inbound(self) -> (BridgeInbound, oneshot::Receiver<BridgeReply>) {
        let (tx, rx) = oneshot::channel();
        (Inbound::Query(self, tx), rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_query_response_flow() {
        let (msg, rx) = BridgeQuery::push("room:1".into(), "shout", json!({"a": 1}));

        // Simulate the socket task answering
        if let Inbound::Query(BridgeQuery::Push { topic, event, .. }, reply_tx) = msg {
            assert_eq!(topic, Topic::from("room:1"));
            assert_eq!(event, "shout");
            let _ = reply_tx.send(BridgeReply::Pushed(Ok(Ref::from("5"))));
        } else {
            panic!("expected push query");
        }

        assert_eq!(rx.await.unwrap(), BridgeReply::Pushed(Ok(Ref::from("5"))));
    }

    #[tokio::test]
    async fn test_dropped_responder_closes_receiver() {
        let (msg, rx) = BridgeQuery::status();
        drop(msg);
        assert!(rx.await.is_err());
    }
}
