//! Wire framing for peer channels.
//!
//! Every application message travels as one frame. Two framings exist:
//!
//! - [`Framing::Delimited`]: payload followed by the terminator byte `0x04`.
//!   A raw byte payload that itself contains `0x04` is split into several
//!   frames on receipt. Text and JSON payloads never contain it.
//! - [`Framing::LengthPrefixed`]: a 4-byte big-endian length, then exactly
//!   that many payload bytes. Any payload round-trips.
//!
//! Receivers tell message kinds apart only by the decode cascade in
//! [`Message::decode`]: UTF-8 text that parses as JSON is JSON, other UTF-8
//! is text, and anything that is not UTF-8 is raw bytes.

use std::borrow::Cow;

use bytes::{Buf, Bytes, BytesMut};
use serde_json::Value;

use crate::error::{NetError, Result};

/// Frame terminator for [`Framing::Delimited`].
pub const DELIMITER: u8 = 0x04;

/// Largest frame a decoder will buffer before giving up on the peer.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const LENGTH_HEADER_LEN: usize = 4;

/// How frames are delimited on the wire. Both ends must agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Payload followed by [`DELIMITER`].
    #[default]
    Delimited,
    /// 4-byte big-endian length header followed by the payload.
    LengthPrefixed,
}

impl Framing {
    /// Encode a message into one complete frame.
    pub fn encode(&self, message: &Message) -> Result<Vec<u8>> {
        self.encode_payload(&message.payload()?)
    }

    /// Wrap an already-encoded payload in a frame.
    pub fn encode_payload(&self, payload: &[u8]) -> Result<Vec<u8>> {
        match self {
            Framing::Delimited => {
                let mut frame = Vec::with_capacity(payload.len() + 1);
                frame.extend_from_slice(payload);
                frame.push(DELIMITER);
                Ok(frame)
            }
            Framing::LengthPrefixed => {
                let len = u32::try_from(payload.len()).map_err(|_| {
                    NetError::Encoding(format!(
                        "payload of {} bytes does not fit a length header",
                        payload.len()
                    ))
                })?;
                let mut frame = Vec::with_capacity(payload.len() + LENGTH_HEADER_LEN);
                frame.extend_from_slice(&len.to_be_bytes());
                frame.extend_from_slice(payload);
                Ok(frame)
            }
        }
    }
}

/// An application message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// UTF-8 text.
    Text(String),
    /// A structured value, sent as JSON text.
    Json(Value),
    /// Raw bytes, sent unchanged.
    Bytes(Vec<u8>),
}

impl Message {
    /// The frame payload for this message.
    pub fn payload(&self) -> Result<Cow<'_, [u8]>> {
        match self {
            Message::Text(text) => Ok(Cow::Borrowed(text.as_bytes())),
            Message::Json(value) => serde_json::to_vec(value)
                .map(Cow::Owned)
                .map_err(|e| NetError::Encoding(e.to_string())),
            Message::Bytes(bytes) => Ok(Cow::Borrowed(bytes)),
        }
    }

    /// Decode a frame payload: UTF-8 then JSON, falling back to text, or
    /// to raw bytes when the payload is not UTF-8.
    pub fn decode(frame: &[u8]) -> Message {
        match std::str::from_utf8(frame) {
            Ok(text) => match serde_json::from_str::<Value>(text) {
                Ok(value) => Message::Json(value),
                Err(_) => Message::Text(text.to_owned()),
            },
            Err(_) => Message::Bytes(frame.to_vec()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Message::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Message::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_owned())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<Value> for Message {
    fn from(value: Value) -> Self {
        Message::Json(value)
    }
}

impl From<Vec<u8>> for Message {
    fn from(bytes: Vec<u8>) -> Self {
        Message::Bytes(bytes)
    }
}

/// Incremental frame splitter over a byte stream.
///
/// Bytes are appended as they arrive; complete frames are taken off the
/// front in arrival order.
#[derive(Debug)]
pub struct FrameDecoder {
    framing: Framing,
    buf: BytesMut,
    max_len: usize,
}

impl FrameDecoder {
    pub fn new(framing: Framing) -> Self {
        Self::with_max_len(framing, MAX_FRAME_LEN)
    }

    pub fn with_max_len(framing: Framing, max_len: usize) -> Self {
        Self {
            framing,
            buf: BytesMut::with_capacity(4096),
            max_len,
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Append bytes read from the socket.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of buffered bytes not yet returned as frames.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Take the next complete frame payload, if one is buffered.
    ///
    /// Fails once a frame is known to exceed the size cap; the stream
    /// cannot be resynchronised after that.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        match self.framing {
            Framing::Delimited => match self.buf.iter().position(|b| *b == DELIMITER) {
                Some(pos) => {
                    if pos > self.max_len {
                        return Err(NetError::FrameTooLarge {
                            len: pos,
                            max: self.max_len,
                        });
                    }
                    let frame = self.buf.split_to(pos).freeze();
                    self.buf.advance(1);
                    Ok(Some(frame))
                }
                None if self.buf.len() > self.max_len => Err(NetError::FrameTooLarge {
                    len: self.buf.len(),
                    max: self.max_len,
                }),
                None => Ok(None),
            },
            Framing::LengthPrefixed => {
                if self.buf.len() < LENGTH_HEADER_LEN {
                    return Ok(None);
                }
                let mut header = [0u8; LENGTH_HEADER_LEN];
                header.copy_from_slice(&self.buf[..LENGTH_HEADER_LEN]);
                let len = u32::from_be_bytes(header) as usize;
                if len > self.max_len {
                    return Err(NetError::FrameTooLarge {
                        len,
                        max: self.max_len,
                    });
                }
                if self.buf.len() < LENGTH_HEADER_LEN + len {
                    self.buf.reserve(LENGTH_HEADER_LEN + len - self.buf.len());
                    return Ok(None);
                }
                self.buf.advance(LENGTH_HEADER_LEN);
                Ok(Some(self.buf.split_to(len).freeze()))
            }
        }
    }

    /// Take the remaining buffered bytes, leaving the decoder empty.
    pub fn into_remaining(self) -> BytesMut {
        self.buf
    }
}
