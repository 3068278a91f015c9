//! Transport session: one routed connection to a Coordinator.
//!
//! The session owns the socket and offers bounded-blocking send / poll
//! primitives plus `reconnect`, which closes and reopens the connection so
//! the Coordinator sees a fresh identity.  Payloads are never interpreted
//! here.

use crate::wire::{write_frames, FrameBuffer, WireError};
use benchlink_protocol::frame::ControlMessage;
use std::time::Duration;
use tokio::net::TcpStream;

pub struct Session {
    stream: TcpStream,
    buffer: FrameBuffer,
    host: String,
    port: u16,
}

impl Session {
    /// Open a connection to the Coordinator at `host:port`.
    pub async fn connect(host: &str, port: u16) -> std::io::Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(Session {
            stream,
            buffer: FrameBuffer::new(),
            host: host.to_owned(),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serialize and transmit one message.
    pub async fn send(&mut self, message: &ControlMessage) -> Result<(), WireError> {
        write_frames(&mut self.stream, &message.to_frames()).await
    }

    /// Read at most one message, waiting up to `timeout`.  `Ok(None)` means
    /// nothing arrived in time; a partial arrival stays buffered for the
    /// next poll.
    pub async fn poll(&mut self, timeout: Duration) -> Result<Option<ControlMessage>, WireError> {
        match self.buffer.poll_frames(&mut self.stream, timeout).await? {
            Some(frames) => Ok(Some(ControlMessage::from_frames(frames)?)),
            None => Ok(None),
        }
    }

    /// Close and reopen the socket.  Required after a failed sign-in or a
    /// forced namespace change; the old identity is gone afterwards.
    pub async fn reconnect(&mut self) -> std::io::Result<()> {
        let fresh = TcpStream::connect((self.host.as_str(), self.port)).await?;
        fresh.set_nodelay(true)?;
        self.stream = fresh;
        self.buffer.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::read_frames;
    use benchlink_protocol::frame::{ControlHeader, ConversationId, MessageType};
    use benchlink_protocol::FullName;
    use tokio::net::TcpListener;

    fn sample() -> ControlMessage {
        ControlMessage {
            receiver: FullName::coordinator(""),
            sender: FullName::local_only("c1").unwrap(),
            header: ControlHeader::new(ConversationId::generate(), MessageType::JSON),
            payload: vec![br#"{"jsonrpc":"2.0","method":"pong"}"#.to_vec()],
        }
    }

    #[tokio::test]
    async fn send_and_poll_carry_a_message_both_ways() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let echo = tokio::spawn(async move {
            let (mut peer, _) = listener.accept().await.unwrap();
            let frames = read_frames(&mut peer).await.unwrap();
            write_frames(&mut peer, &frames).await.unwrap();
        });

        let mut session = Session::connect("127.0.0.1", addr.port()).await.unwrap();
        let message = sample();
        session.send(&message).await.unwrap();
        let echoed = session
            .poll(Duration::from_secs(1))
            .await
            .unwrap()
            .expect("echoed message");
        assert_eq!(echoed, message);
        echo.await.unwrap();
    }

    #[tokio::test]
    async fn poll_times_out_as_none() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _held = tokio::spawn(async move {
            let (peer, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(peer);
        });

        let mut session = Session::connect("127.0.0.1", addr.port()).await.unwrap();
        let polled = session.poll(Duration::from_millis(20)).await.unwrap();
        assert!(polled.is_none());
    }

    #[tokio::test]
    async fn reconnect_produces_a_distinct_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = tokio::spawn(async move {
            let (_first, first_addr) = listener.accept().await.unwrap();
            let (_second, second_addr) = listener.accept().await.unwrap();
            (first_addr, second_addr)
        });

        let mut session = Session::connect("127.0.0.1", addr.port()).await.unwrap();
        session.reconnect().await.unwrap();
        let (first, second) = accepted.await.unwrap();
        assert_ne!(first, second, "a fresh socket means a fresh identity");
    }
}
