//! Gzip-compressed JSON codec.
//!
//! Encoding serializes the message with the plain JSON layout and gzips the
//! result into a binary frame. Decoding reverses that. Text frames are parsed
//! as plain JSON, since a server may choose not to compress small replies.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use super::{from_json, to_json, DecodeError, DecodeOptions, EncodeError, Frame, Serializer};
use crate::message::Message;

/// Encodes messages as gzip-compressed JSON in binary frames.
#[derive(Debug, Clone, Copy)]
pub struct CompressedSerializer {
    level: Compression,
}

impl Default for CompressedSerializer {
    fn default() -> Self {
        Self {
            level: Compression::fast(),
        }
    }
}

impl CompressedSerializer {
    /// Create a serializer with a specific gzip level (0-9).
    #[must_use]
    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Serializer for CompressedSerializer {
    fn encode_message(&self, message: &Message) -> Result<Frame, EncodeError> {
        let json = to_json(message)?;

        let mut compressed = Vec::with_capacity(json.len() / 2);
        {
            let mut encoder = GzEncoder::new(&mut compressed, self.level);
            encoder
                .write_all(json.as_bytes())
                .map_err(|e| EncodeError::Compression(format!("gzip write failed: {e}")))?;
            encoder
                .finish()
                .map_err(|e| EncodeError::Compression(format!("gzip finish failed: {e}")))?;
        }

        Ok(Frame::Binary(compressed))
    }

    fn try_decode_message(
        &self,
        frame: &Frame,
        options: &DecodeOptions,
    ) -> Result<Message, DecodeError> {
        let bytes = match frame {
            Frame::Text(text) => return from_json(text.as_bytes(), options),
            Frame::Binary(bytes) => bytes,
        };

        let mut decompressed = Vec::new();
        let mut decoder = GzDecoder::new(bytes.as_slice());
        let read = match options.max_frame_bytes {
            // One byte past the limit is enough to detect an oversize body.
            Some(limit) => decoder
                .take(u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1))
                .read_to_end(&mut decompressed),
            None => decoder.read_to_end(&mut decompressed),
        };
        read.map_err(|e| DecodeError::Compression(format!("gzip decompress failed: {e}")))?;

        from_json(&decompressed, options)
    }
}
