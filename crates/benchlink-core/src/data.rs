//! Data-plane clients: topic publisher and filtering subscriber.
//!
//! Publishers push data envelopes into the proxy's ingress socket.  The
//! proxy re-emits every message to every subscriber; topic filtering lives
//! entirely in the subscriber's socket layer here, where `recv` drops any
//! envelope whose topic starts with none of the subscribed prefixes.

use crate::wire::{write_frames, FrameBuffer, WireError};
use benchlink_protocol::frame::{DataMessage, MessageType};
use benchlink_protocol::{FullName, LogRecord};
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

/// A publishing connection to the proxy ingress.  The publisher's full name
/// is the topic of everything it sends.
pub struct Publisher {
    stream: TcpStream,
    full_name: FullName,
}

impl Publisher {
    pub async fn connect(host: &str, port: u16, full_name: FullName) -> std::io::Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(Publisher { stream, full_name })
    }

    pub fn full_name(&self) -> &FullName {
        &self.full_name
    }

    /// Send a prebuilt envelope.
    pub async fn publish(&mut self, message: &DataMessage) -> Result<(), WireError> {
        write_frames(&mut self.stream, &message.to_frames()).await
    }

    /// Send raw data frames under this publisher's topic.
    pub async fn publish_frames(
        &mut self,
        message_type: MessageType,
        frames: Vec<Vec<u8>>,
    ) -> Result<(), WireError> {
        let message = DataMessage::new(self.full_name.to_bytes(), message_type, frames);
        self.publish(&message).await
    }

    /// Serialize `value` as the single JSON data frame.
    pub async fn publish_json<T: Serialize>(&mut self, value: &T) -> Result<(), WireError> {
        let body = serde_json::to_vec(value).unwrap_or_else(|_| b"null".to_vec());
        self.publish_frames(MessageType::JSON, vec![body]).await
    }

    /// Publish a log entry in the data-plane log format.
    pub async fn publish_log(&mut self, record: &LogRecord) -> Result<(), WireError> {
        self.publish_json(record).await
    }
}

// ---------------------------------------------------------------------------
// Subscriber
// ---------------------------------------------------------------------------

/// A subscribing connection to the proxy egress.
///
/// The egress socket delivers every published message; the prefix filter
/// set lives on this side of the wire.
pub struct Subscriber {
    stream: TcpStream,
    buffer: FrameBuffer,
    filters: Vec<Vec<u8>>,
}

impl Subscriber {
    pub async fn connect(host: &str, port: u16) -> std::io::Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(Subscriber {
            stream,
            buffer: FrameBuffer::new(),
            filters: Vec::new(),
        })
    }

    /// Accept envelopes whose topic starts with `prefix`.  With no
    /// subscriptions at all, `recv` delivers nothing.
    pub fn subscribe(&mut self, prefix: &[u8]) {
        if !self.filters.iter().any(|p| p == prefix) {
            self.filters.push(prefix.to_vec());
        }
    }

    pub fn unsubscribe(&mut self, prefix: &[u8]) {
        self.filters.retain(|p| p != prefix);
    }

    fn matches(&self, topic: &[u8]) -> bool {
        self.filters.iter().any(|prefix| topic.starts_with(prefix))
    }

    /// Receive the next envelope matching a subscribed prefix, or `None` if
    /// `timeout` elapses.  Non-matching envelopes are dropped here; a
    /// partial arrival stays buffered for the next call.
    pub async fn recv(&mut self, timeout: Duration) -> Result<Option<DataMessage>, WireError> {
        let deadline = Instant::now() + timeout;
        loop {
            let Some(remaining) = deadline
                .checked_duration_since(Instant::now())
                .filter(|d| !d.is_zero())
            else {
                return Ok(None);
            };
            match self.buffer.poll_frames(&mut self.stream, remaining).await? {
                None => return Ok(None),
                Some(frames) => {
                    let message = DataMessage::from_frames(frames)?;
                    if self.matches(&message.topic) {
                        return Ok(Some(message));
                    }
                }
            }
        }
    }
}
