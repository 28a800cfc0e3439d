//! Shared vocabulary for topics, refs, and wire messages.
//!
//! The wire layout follows the Phoenix V2 socket format: every frame carries
//! `[join_ref, ref, topic, event, payload]`. Only the payload varies in shape.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of a channel a client can join (e.g. `"room:1"`).
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(pub String);

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Topic {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Topic {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Opaque correlation token minted by the protocol client per push.
///
/// Refs are unique per outstanding push on a given socket.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ref(pub String);

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Ref {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Ref {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Message payload.
///
/// Binary payloads are carried by the socket but cannot be represented in the
/// textual JSON format.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Structured JSON payload.
    Json(serde_json::Value),
    /// Raw binary payload.
    Binary(Vec<u8>),
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

/// A protocol message as it travels over the socket.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Ref of the join that opened the channel, if any.
    pub join_ref: Option<Ref>,
    /// Ref correlating a push with its reply, if any.
    pub reference: Option<Ref>,
    /// Topic the message belongs to.
    pub topic: Topic,
    /// Event name (e.g. `"phx_join"`, `"new_msg"`).
    pub event: String,
    /// Message body.
    pub payload: Payload,
}

impl Message {
    /// Create a message without refs.
    #[must_use]
    pub fn new(topic: impl Into<Topic>, event: impl Into<String>, payload: impl Into<Payload>) -> Self {
        Self {
            join_ref: None,
            reference: None,
            topic: topic.into(),
            event: event.into(),
            payload: payload.into(),
        }
    }

    /// Attach a push ref.
    #[must_use]
    pub fn with_ref(mut self, reference: impl Into<Ref>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Attach a join ref.
    #[must_use]
    pub fn with_join_ref(mut self, join_ref: impl Into<Ref>) -> Self {
        self.join_ref = Some(join_ref.into());
        self
    }
}

/// Array form of a message used by the textual codecs.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WireMessage(
    pub(crate) Option<Ref>,
    pub(crate) Option<Ref>,
    pub(crate) Topic,
    pub(crate) String,
    pub(crate) serde_json::Value,
);

impl From<WireMessage> for Message {
    fn from(wire: WireMessage) -> Self {
        let WireMessage(join_ref, reference, topic, event, payload) = wire;
        Self {
            join_ref,
            reference,
            topic,
            event,
            payload: Payload::Json(payload),
        }
    }
}
