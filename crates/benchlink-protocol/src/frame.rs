//! Multi-frame envelopes and the frame-bundle codec.
//!
//! A message travels as an ordered bundle of opaque frames.  On the wire a
//! bundle is `u32` frame count followed by a `u32` length and the raw bytes
//! for each frame (all big endian); the stream layer additionally prefixes
//! the whole bundle with its byte length.  The codec preserves frame
//! boundaries exactly and never interprets payload frames.
//!
//! Control-plane bundle: `version | receiver | sender | header | payload…`
//! Data-plane bundle:    `topic | header | data…`

use crate::name::{FullName, NameError};
use crate::PROTOCOL_VERSION;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Fixed size of the control header frame.
pub const CONTROL_HEADER_LEN: usize = 20;
/// Fixed size of the data header frame.
pub const DATA_HEADER_LEN: usize = 17;
/// Upper bound on a single frame; oversized frames are malformed.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;
/// Upper bound on frames per bundle.
pub const MAX_FRAMES: usize = 256;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Decode failures.  Per policy these are dropped and logged once per peer,
/// never answered.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedFrame {
    #[error("expected at least {expected} frames, got {got}")]
    FrameCount { expected: usize, got: usize },
    #[error("unsupported protocol version {0}")]
    Version(u8),
    #[error("fixed-length frame has {0} bytes")]
    HeaderLength(usize),
    #[error("frame length exceeds bundle")]
    Truncated,
    #[error("{0} trailing bytes after last frame")]
    TrailingBytes(usize),
    #[error("frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),
    #[error("bundle of {0} frames exceeds limit")]
    TooManyFrames(usize),
    #[error(transparent)]
    BadName(#[from] NameError),
}

// ---------------------------------------------------------------------------
// Header field types
// ---------------------------------------------------------------------------

/// 16-byte correlation key, time-ordered (UUIDv7).  Generated by the
/// originator of a request and echoed unchanged on the response.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ConversationId([u8; 16]);

impl ConversationId {
    /// A fresh time-ordered id.  Never zero.
    pub fn generate() -> Self {
        ConversationId(Uuid::now_v7().into_bytes())
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        ConversationId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// The all-zero id marks a message outside any conversation.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 16]
    }
}

impl fmt::Debug for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConversationId({})", Uuid::from_bytes(self.0))
    }
}

/// 1-byte payload type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageType(pub u8);

impl MessageType {
    pub const UNDEFINED: MessageType = MessageType(0);
    /// UTF-8 JSON in payload frame 0; further frames are attachments.
    pub const JSON: MessageType = MessageType(1);

    /// Values from 128 up are reserved for user-defined binary payloads.
    pub fn is_user_defined(&self) -> bool {
        self.0 >= 128
    }
}

/// The 20-byte control header: `conversation_id(16) | message_id(3) | type(1)`.
///
/// The 3-byte message id has no defined semantics yet; it is transmitted as
/// zeros and accepted with any value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlHeader {
    pub conversation_id: ConversationId,
    pub message_id: [u8; 3],
    pub message_type: MessageType,
}

impl ControlHeader {
    pub fn new(conversation_id: ConversationId, message_type: MessageType) -> Self {
        ControlHeader {
            conversation_id,
            message_id: [0; 3],
            message_type,
        }
    }

    pub fn to_bytes(&self) -> [u8; CONTROL_HEADER_LEN] {
        let mut out = [0u8; CONTROL_HEADER_LEN];
        out[..16].copy_from_slice(self.conversation_id.as_bytes());
        out[16..19].copy_from_slice(&self.message_id);
        out[19] = self.message_type.0;
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MalformedFrame> {
        if bytes.len() != CONTROL_HEADER_LEN {
            return Err(MalformedFrame::HeaderLength(bytes.len()));
        }
        let mut cid = [0u8; 16];
        cid.copy_from_slice(&bytes[..16]);
        let mut message_id = [0u8; 3];
        message_id.copy_from_slice(&bytes[16..19]);
        Ok(ControlHeader {
            conversation_id: ConversationId::from_bytes(cid),
            message_id,
            message_type: MessageType(bytes[19]),
        })
    }
}

/// The 17-byte data header: `conversation_id(16) | type(1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataHeader {
    pub conversation_id: ConversationId,
    pub message_type: MessageType,
}

impl DataHeader {
    pub fn new(conversation_id: ConversationId, message_type: MessageType) -> Self {
        DataHeader {
            conversation_id,
            message_type,
        }
    }

    pub fn to_bytes(&self) -> [u8; DATA_HEADER_LEN] {
        let mut out = [0u8; DATA_HEADER_LEN];
        out[..16].copy_from_slice(self.conversation_id.as_bytes());
        out[16] = self.message_type.0;
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MalformedFrame> {
        if bytes.len() != DATA_HEADER_LEN {
            return Err(MalformedFrame::HeaderLength(bytes.len()));
        }
        let mut cid = [0u8; 16];
        cid.copy_from_slice(&bytes[..16]);
        Ok(DataHeader {
            conversation_id: ConversationId::from_bytes(cid),
            message_type: MessageType(bytes[16]),
        })
    }
}

// ---------------------------------------------------------------------------
// Control envelope
// ---------------------------------------------------------------------------

/// A routed control-plane message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    pub receiver: FullName,
    pub sender: FullName,
    pub header: ControlHeader,
    /// Zero or more opaque payload frames.
    pub payload: Vec<Vec<u8>>,
}

impl ControlMessage {
    /// A JSON message (type 1) with `content` serialized into payload frame 0.
    pub fn json<T: Serialize>(
        receiver: FullName,
        sender: FullName,
        conversation_id: ConversationId,
        content: &T,
    ) -> Self {
        let body = serde_json::to_vec(content)
            .unwrap_or_else(|_| b"null".to_vec());
        ControlMessage {
            receiver,
            sender,
            header: ControlHeader::new(conversation_id, MessageType::JSON),
            payload: vec![body],
        }
    }

    /// The JSON payload frame, if this is a JSON message with one.
    pub fn json_payload(&self) -> Option<&[u8]> {
        if self.header.message_type == MessageType::JSON {
            self.payload.first().map(Vec::as_slice)
        } else {
            None
        }
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.header.conversation_id
    }

    /// A reply envelope: sender/receiver swapped, conversation id echoed.
    pub fn reply_with<T: Serialize>(&self, content: &T) -> ControlMessage {
        ControlMessage::json(
            self.sender.clone(),
            self.receiver.clone(),
            self.header.conversation_id,
            content,
        )
    }

    pub fn to_frames(&self) -> Vec<Vec<u8>> {
        let mut frames = Vec::with_capacity(4 + self.payload.len());
        frames.push(vec![PROTOCOL_VERSION]);
        frames.push(self.receiver.to_bytes());
        frames.push(self.sender.to_bytes());
        frames.push(self.header.to_bytes().to_vec());
        frames.extend(self.payload.iter().cloned());
        frames
    }

    pub fn from_frames(frames: Vec<Vec<u8>>) -> Result<Self, MalformedFrame> {
        if frames.len() < 4 {
            return Err(MalformedFrame::FrameCount {
                expected: 4,
                got: frames.len(),
            });
        }
        match frames[0].as_slice() {
            [version] if *version == PROTOCOL_VERSION => {}
            [version] => return Err(MalformedFrame::Version(*version)),
            other => return Err(MalformedFrame::HeaderLength(other.len())),
        }
        let receiver = FullName::from_bytes(&frames[1])?;
        let sender = FullName::from_bytes(&frames[2])?;
        let header = ControlHeader::from_bytes(&frames[3])?;
        let payload = frames.into_iter().skip(4).collect();
        Ok(ControlMessage {
            receiver,
            sender,
            header,
            payload,
        })
    }
}

// ---------------------------------------------------------------------------
// Data envelope
// ---------------------------------------------------------------------------

/// A broadcast data-plane message.  The topic is the publisher's full name;
/// it stays raw bytes here because the proxy must not interpret it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMessage {
    pub topic: Vec<u8>,
    pub header: DataHeader,
    /// One or more data frames.
    pub frames: Vec<Vec<u8>>,
}

impl DataMessage {
    pub fn new(topic: Vec<u8>, message_type: MessageType, frames: Vec<Vec<u8>>) -> Self {
        DataMessage {
            topic,
            header: DataHeader::new(ConversationId::generate(), message_type),
            frames,
        }
    }

    pub fn to_frames(&self) -> Vec<Vec<u8>> {
        let mut frames = Vec::with_capacity(2 + self.frames.len());
        frames.push(self.topic.clone());
        frames.push(self.header.to_bytes().to_vec());
        frames.extend(self.frames.iter().cloned());
        frames
    }

    pub fn from_frames(frames: Vec<Vec<u8>>) -> Result<Self, MalformedFrame> {
        if frames.len() < 3 {
            return Err(MalformedFrame::FrameCount {
                expected: 3,
                got: frames.len(),
            });
        }
        let header = DataHeader::from_bytes(&frames[1])?;
        let mut iter = frames.into_iter();
        let topic = iter.next().unwrap_or_default();
        let _header_frame = iter.next();
        Ok(DataMessage {
            topic,
            header,
            frames: iter.collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// Frame-bundle codec
// ---------------------------------------------------------------------------

/// Serialize a bundle: `u32` count, then `u32` length + bytes per frame.
pub fn encode_bundle(frames: &[Vec<u8>]) -> Vec<u8> {
    let total: usize = frames.iter().map(|f| 4 + f.len()).sum();
    let mut out = Vec::with_capacity(4 + total);
    out.extend_from_slice(&(frames.len() as u32).to_be_bytes());
    for frame in frames {
        out.extend_from_slice(&(frame.len() as u32).to_be_bytes());
        out.extend_from_slice(frame);
    }
    out
}

/// Parse a bundle, enforcing the frame-count and frame-size caps and
/// rejecting truncated or over-long input.
pub fn decode_bundle(buf: &[u8]) -> Result<Vec<Vec<u8>>, MalformedFrame> {
    let mut cursor = 0usize;
    let count = read_u32(buf, &mut cursor)? as usize;
    if count > MAX_FRAMES {
        return Err(MalformedFrame::TooManyFrames(count));
    }
    let mut frames = Vec::with_capacity(count);
    for _ in 0..count {
        let len = read_u32(buf, &mut cursor)? as usize;
        if len > MAX_FRAME_LEN {
            return Err(MalformedFrame::FrameTooLarge(len));
        }
        let end = cursor.checked_add(len).ok_or(MalformedFrame::Truncated)?;
        if end > buf.len() {
            return Err(MalformedFrame::Truncated);
        }
        frames.push(buf[cursor..end].to_vec());
        cursor = end;
    }
    if cursor != buf.len() {
        return Err(MalformedFrame::TrailingBytes(buf.len() - cursor));
    }
    Ok(frames)
}

fn read_u32(buf: &[u8], cursor: &mut usize) -> Result<u32, MalformedFrame> {
    let end = cursor.checked_add(4).ok_or(MalformedFrame::Truncated)?;
    if end > buf.len() {
        return Err(MalformedFrame::Truncated);
    }
    let mut word = [0u8; 4];
    word.copy_from_slice(&buf[*cursor..end]);
    *cursor = end;
    Ok(u32::from_be_bytes(word))
}
