//! Correlation buffer: pairs replies with waiters by conversation id.
//!
//! A mutex-guarded map of one-shot channels.  At most one waiter exists per
//! conversation id; a delivery that finds no waiter (late reply after a
//! timeout, server-initiated notification) is handed back to the caller so
//! the dispatch layer can treat it as an unsolicited message.

use benchlink_protocol::frame::{ControlMessage, ConversationId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplyError {
    #[error("timed out waiting for reply")]
    Timeout,
    #[error("reply channel closed")]
    Closed,
}

type WaiterMap = Arc<Mutex<HashMap<ConversationId, (u64, oneshot::Sender<ControlMessage>)>>>;

/// Shared, thread-safe reply buffer.
#[derive(Clone, Default)]
pub struct ReplyBuffer {
    waiters: WaiterMap,
}

impl ReplyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `cid`.  Registering the same id again replaces
    /// the previous waiter, which then observes `Closed`.
    pub fn expect(&self, cid: ConversationId) -> ReplySlot {
        let (tx, rx) = oneshot::channel();
        let serial = NEXT_SERIAL.fetch_add(1, Ordering::Relaxed);
        self.waiters
            .lock()
            .expect("reply buffer lock poisoned")
            .insert(cid, (serial, tx));
        ReplySlot {
            cid,
            serial,
            rx,
            waiters: Arc::clone(&self.waiters),
        }
    }

    /// Wake the waiter registered for this message's conversation id.
    /// Returns the message back when nobody is waiting for it.
    pub fn deliver(&self, message: ControlMessage) -> Option<ControlMessage> {
        let waiter = self
            .waiters
            .lock()
            .expect("reply buffer lock poisoned")
            .remove(&message.conversation_id());
        match waiter {
            Some((_, tx)) => tx.send(message).err(),
            None => Some(message),
        }
    }

    /// Number of registered waiters.
    pub fn pending(&self) -> usize {
        self.waiters.lock().expect("reply buffer lock poisoned").len()
    }
}

/// A pending reply registration.  Dropping the slot discards it; a reply
/// arriving afterwards is routed to the unsolicited-message path.
pub struct ReplySlot {
    cid: ConversationId,
    serial: u64,
    rx: oneshot::Receiver<ControlMessage>,
    waiters: WaiterMap,
}

impl ReplySlot {
    pub fn conversation_id(&self) -> ConversationId {
        self.cid
    }

    /// Block until the reply arrives or `timeout` elapses.  On timeout the
    /// slot is discarded.
    pub async fn await_reply(mut self, timeout: Duration) -> Result<ControlMessage, ReplyError> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(_)) => Err(ReplyError::Closed),
            Err(_) => Err(ReplyError::Timeout),
        }
    }
}

impl Drop for ReplySlot {
    fn drop(&mut self) {
        let mut waiters = self.waiters.lock().expect("reply buffer lock poisoned");
        // Only remove our own registration; a replacement waiter under the
        // same conversation id must survive this slot's teardown.
        if waiters.get(&self.cid).is_some_and(|(serial, _)| *serial == self.serial) {
            waiters.remove(&self.cid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchlink_protocol::frame::{ControlHeader, MessageType};
    use benchlink_protocol::FullName;

    fn message_with(cid: ConversationId) -> ControlMessage {
        ControlMessage {
            receiver: FullName::local_only("c1").unwrap(),
            sender: FullName::coordinator("N1"),
            header: ControlHeader::new(cid, MessageType::JSON),
            payload: vec![b"{}".to_vec()],
        }
    }

    #[tokio::test]
    async fn delivery_wakes_the_matching_waiter() {
        let buffer = ReplyBuffer::new();
        let cid = ConversationId::generate();
        let slot = buffer.expect(cid);

        assert!(buffer.deliver(message_with(cid)).is_none());
        let reply = slot.await_reply(Duration::from_secs(1)).await.unwrap();
        assert_eq!(reply.conversation_id(), cid);
        assert_eq!(buffer.pending(), 0);
    }

    #[tokio::test]
    async fn unmatched_delivery_is_returned_not_dropped() {
        let buffer = ReplyBuffer::new();
        let stray = message_with(ConversationId::generate());
        let returned = buffer.deliver(stray.clone()).expect("no waiter");
        assert_eq!(returned, stray);
    }

    #[tokio::test]
    async fn timeout_discards_the_slot_and_late_reply_is_unclaimed() {
        let buffer = ReplyBuffer::new();
        let cid = ConversationId::generate();
        let slot = buffer.expect(cid);

        let outcome = slot.await_reply(Duration::from_millis(10)).await;
        assert_eq!(outcome.unwrap_err(), ReplyError::Timeout);
        assert_eq!(buffer.pending(), 0);

        // The late reply now takes the unsolicited path.
        assert!(buffer.deliver(message_with(cid)).is_some());
    }

    #[tokio::test]
    async fn waiters_are_independent_per_conversation() {
        let buffer = ReplyBuffer::new();
        let cid_a = ConversationId::generate();
        let cid_b = ConversationId::generate();
        let slot_a = buffer.expect(cid_a);
        let slot_b = buffer.expect(cid_b);

        assert!(buffer.deliver(message_with(cid_b)).is_none());
        let got_b = slot_b.await_reply(Duration::from_secs(1)).await.unwrap();
        assert_eq!(got_b.conversation_id(), cid_b);

        // Waiter A is untouched and still pending.
        assert_eq!(buffer.pending(), 1);
        drop(slot_a);
        assert_eq!(buffer.pending(), 0);
    }

    #[tokio::test]
    async fn second_registration_replaces_the_first() {
        let buffer = ReplyBuffer::new();
        let cid = ConversationId::generate();
        let first = buffer.expect(cid);
        let second = buffer.expect(cid);
        assert_eq!(buffer.pending(), 1);

        assert!(buffer.deliver(message_with(cid)).is_none());
        assert!(second.await_reply(Duration::from_secs(1)).await.is_ok());
        assert_eq!(
            first.await_reply(Duration::from_millis(10)).await,
            Err(ReplyError::Closed)
        );
    }
}
