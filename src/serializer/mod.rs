//! Pluggable message serializers.
//!
//! A [`Serializer`] turns a [`Message`] into a wire [`Frame`] and back. Two
//! strategies ship with the crate:
//!
//! - [`PlainSerializer`] - JSON text frames
//! - [`CompressedSerializer`] - gzip-compressed JSON in binary frames
//!
//! The strategy is chosen from configuration through [`SerializerKind`] and
//! handed to the protocol client as an `Arc<dyn Serializer>`, so adding a codec
//! never touches the bridge.
//!
//! # Failure semantics
//!
//! Encoding failures are recoverable and surface as [`EncodeError`]. Decoding
//! is only ever fed protocol-conformant frames: [`Serializer::decode_message`]
//! panics on a malformed frame. Callers that want to inspect the failure use
//! [`Serializer::try_decode_message`].
//!
//! Rust guideline compliant 2025-01

pub mod compressed;
pub mod plain;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::message::{Message, Payload, WireMessage};

pub use compressed::CompressedSerializer;
pub use plain::PlainSerializer;

/// Wire-level encoded form of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
}

impl Frame {
    /// Length of the frame body in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    /// Whether the frame body is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Options applied while decoding a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Largest accepted message body in bytes (after decompression).
    /// `None` accepts any size.
    pub max_frame_bytes: Option<usize>,
}

impl DecodeOptions {
    /// Limit the decoded body size.
    #[must_use]
    pub fn with_max_frame_bytes(mut self, max: usize) -> Self {
        self.max_frame_bytes = Some(max);
        self
    }
}

/// Errors returned by [`Serializer::encode_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// The payload has no representation in this codec's format.
    UnsupportedPayload(String),
    /// JSON serialization failed.
    Json(String),
    /// Compression failed.
    Compression(String),
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedPayload(msg) => write!(f, "Unsupported payload: {msg}"),
            Self::Json(msg) => write!(f, "JSON encode failed: {msg}"),
            Self::Compression(msg) => write!(f, "Compression failed: {msg}"),
        }
    }
}

impl std::error::Error for EncodeError {}

/// Errors returned by [`Serializer::try_decode_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The frame type is not accepted by this codec.
    UnexpectedFrame(&'static str),
    /// The body exceeds [`DecodeOptions::max_frame_bytes`].
    TooLarge {
        /// Configured limit.
        limit: usize,
    },
    /// The body is not a valid message.
    Json(String),
    /// Decompression failed.
    Compression(String),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedFrame(kind) => write!(f, "Unexpected {kind} frame"),
            Self::TooLarge { limit } => write!(f, "Frame exceeds {limit} bytes"),
            Self::Json(msg) => write!(f, "JSON decode failed: {msg}"),
            Self::Compression(msg) => write!(f, "Decompression failed: {msg}"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Bidirectional transformation between messages and wire frames.
pub trait Serializer: Send + Sync + std::fmt::Debug {
    /// Encode a message into a frame.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] when the message cannot be represented.
    fn encode_message(&self, message: &Message) -> Result<Frame, EncodeError>;

    /// Decode a frame, reporting malformed input as an error.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when the frame is not a valid message.
    fn try_decode_message(
        &self,
        frame: &Frame,
        options: &DecodeOptions,
    ) -> Result<Message, DecodeError>;

    /// Decode a trusted frame.
    ///
    /// # Panics
    ///
    /// Panics if the frame is malformed. Decoding is only expected to see
    /// protocol-conformant input.
    fn decode_message(&self, frame: &Frame, options: &DecodeOptions) -> Message {
        match self.try_decode_message(frame, options) {
            Ok(message) => message,
            Err(e) => panic!("malformed frame: {e}"),
        }
    }
}

/// Configured choice of serializer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializerKind {
    /// JSON text frames.
    #[default]
    Plain,
    /// Gzip-compressed JSON binary frames.
    Compressed,
}

impl SerializerKind {
    /// Build the strategy object for this kind.
    #[must_use]
    pub fn build(self) -> Arc<dyn Serializer> {
        match self {
            Self::Plain => Arc::new(PlainSerializer),
            Self::Compressed => Arc::new(CompressedSerializer::default()),
        }
    }
}

/// Serialize a message to its JSON array form.
pub(crate) fn to_json(message: &Message) -> Result<String, EncodeError> {
    let payload = match &message.payload {
        Payload::Json(value) => value.clone(),
        Payload::Binary(bytes) => {
            return Err(EncodeError::UnsupportedPayload(format!(
                "binary payload ({} bytes) on topic {} cannot be encoded as JSON",
                bytes.len(),
                message.topic
            )))
        }
    };

    let wire = WireMessage(
        message.join_ref.clone(),
        message.reference.clone(),
        message.topic.clone(),
        message.event.clone(),
        payload,
    );
    serde_json::to_string(&wire).map_err(|e| EncodeError::Json(e.to_string()))
}

/// Parse the JSON array form of a message, enforcing the size limit.
pub(crate) fn from_json(bytes: &[u8], options: &DecodeOptions) -> Result<Message, DecodeError> {
    if let Some(limit) = options.max_frame_bytes {
        if bytes.len() > limit {
            return Err(DecodeError::TooLarge { limit });
        }
    }

    serde_json::from_slice::<WireMessage>(bytes)
        .map(Message::from)
        .map_err(|e| DecodeError::Json(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Message {
        Message::new("room:1", "new_msg", json!({"body": "hello", "n": [1, 2, 3]}))
            .with_ref("4")
            .with_join_ref("1")
    }

    #[test]
    fn test_roundtrip_both_kinds() {
        for kind in [SerializerKind::Plain, SerializerKind::Compressed] {
            let serializer = kind.build();
            let frame = serializer.encode_message(&sample()).expect("encode");
            let decoded = serializer.decode_message(&frame, &DecodeOptions::default());
            assert_eq!(decoded, sample(), "{kind:?}");
        }
    }

    #[test]
    fn test_binary_payload_unsupported() {
        let msg = Message::new("room:1", "blob", Payload::Binary(vec![1, 2, 3]));
        for kind in [SerializerKind::Plain, SerializerKind::Compressed] {
            let err = kind.build().encode_message(&msg).unwrap_err();
            assert!(matches!(err, EncodeError::UnsupportedPayload(_)));
        }
    }

    #[test]
    #[should_panic(expected = "malformed frame")]
    fn test_decode_malformed_panics() {
        let frame = Frame::Text("not json".to_string());
        PlainSerializer.decode_message(&frame, &DecodeOptions::default());
    }

    #[test]
    fn test_size_limit() {
        let frame = PlainSerializer.encode_message(&sample()).unwrap();
        let options = DecodeOptions::default().with_max_frame_bytes(8);
        let err = PlainSerializer.try_decode_message(&frame, &options).unwrap_err();
        assert_eq!(err, DecodeError::TooLarge { limit: 8 });
    }

    #[test]
    fn test_kind_deserializes_snake_case() {
        let kind: SerializerKind = serde_json::from_str("\"compressed\"").unwrap();
        assert_eq!(kind, SerializerKind::Compressed);
        assert_eq!(SerializerKind::default(), SerializerKind::Plain);
    }
}
