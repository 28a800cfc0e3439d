//! JSON text codec.

use super::{from_json, to_json, DecodeError, DecodeOptions, EncodeError, Frame, Serializer};
use crate::message::Message;

/// Encodes messages as JSON arrays in text frames.
///
/// Binary frames are accepted on decode when their bytes are JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainSerializer;

impl Serializer for PlainSerializer {
    fn encode_message(&self, message: &Message) -> Result<Frame, EncodeError> {
        to_json(message).map(Frame::Text)
    }

    fn try_decode_message(
        &self,
        frame: &Frame,
        options: &DecodeOptions,
    ) -> Result<Message, DecodeError> {
        match frame {
            Frame::Text(text) => from_json(text.as_bytes(), options),
            Frame::Binary(bytes) => from_json(bytes, options),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Payload, Ref, Topic};
    use serde_json::json;

    #[test]
    fn test_encode_produces_text_frame() {
        let msg = Message::new("room:1", "phx_join", json!({})).with_ref("1");
        let frame = PlainSerializer.encode_message(&msg).unwrap();
        assert_eq!(frame, Frame::Text(r#"[null,"1","room:1","phx_join",{}]"#.to_string()));
    }

    #[test]
    fn test_decode_server_reply() {
        let frame = Frame::Text(
            r#"["1","2","room:1","phx_reply",{"status":"ok","response":{"id":1}}]"#.to_string(),
        );
        let msg = PlainSerializer
            .try_decode_message(&frame, &DecodeOptions::default())
            .unwrap();

        assert_eq!(msg.join_ref, Some(Ref::from("1")));
        assert_eq!(msg.reference, Some(Ref::from("2")));
        assert_eq!(msg.topic, Topic::from("room:1"));
        assert_eq!(msg.event, "phx_reply");
        assert_eq!(
            msg.payload,
            Payload::Json(json!({"status": "ok", "response": {"id": 1}}))
        );
    }

    #[test]
    fn test_decode_json_in_binary_frame() {
        let frame = Frame::Binary(br#"[null,null,"t","e",null]"#.to_vec());
        let msg = PlainSerializer
            .try_decode_message(&frame, &DecodeOptions::default())
            .unwrap();
        assert_eq!(msg.payload, Payload::Json(serde_json::Value::Null));
    }

    #[test]
    fn test_decode_wrong_arity_is_error() {
        let frame = Frame::Text(r#"["1","room:1"]"#.to_string());
        let err = PlainSerializer
            .try_decode_message(&frame, &DecodeOptions::default())
            .unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }
}
