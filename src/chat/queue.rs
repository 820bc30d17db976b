// src/chat/queue.rs
//! Outbound and inbound chat message queues
//!
//! Chats ride on mining shares: each accepted share may carry a handful of
//! queued outbound messages, and inbound messages are fetched with a
//! server-issued token that advances monotonically. Message ids are the
//! queue index XORed with a per-process random salt so they are opaque to
//! callers but still collision-free within a session.

use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Mutex;

/// Hashes of share difficulty required per chat message delivered.
pub const HASHES_PER_CHAT: i64 = 5000;

/// Maximum chat messages attached to a single share.
pub const MAX_CHATS_PER_SHARE: usize = 5;

/// An outbound message paired with its opaque id, ready to ride a share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedChat {
    /// Opaque id returned to the caller by [`ChatQueue::send_chat`]
    pub id: i64,
    /// The message text
    pub message: String,
}

/// A chat message received from the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedChat {
    /// User who sent the chat
    pub username: String,
    /// The message text
    pub message: String,
    /// Unix time in seconds when the message was sent
    pub timestamp: i64,
}

struct QueueInner {
    outbound: Vec<String>,
    sent_index: usize,

    inbound: Vec<ReceivedChat>,
    delivered_index: usize,

    next_token: i64,
}

/// The chat queues. All operations are serialized under one lock.
pub struct ChatQueue {
    salt: i64,
    inner: Mutex<QueueInner>,
}

impl ChatQueue {
    /// Creates empty queues with a fresh session salt from the OS RNG.
    pub fn new() -> Self {
        let salt = (OsRng.next_u64() & (i64::MAX as u64)) as i64;
        ChatQueue {
            salt,
            inner: Mutex::new(QueueInner {
                outbound: Vec::new(),
                sent_index: 0,
                inbound: Vec::new(),
                delivered_index: 0,
                next_token: 0,
            }),
        }
    }

    /// Queues a chat for sending, returning its opaque id.
    pub fn send_chat(&self, message: impl Into<String>) -> i64 {
        let mut inner = self.lock();
        inner.outbound.push(message.into());
        (inner.outbound.len() as i64 - 1) ^ self.salt
    }

    /// True when outbound messages are waiting to be delivered.
    pub fn has_chats_to_send(&self) -> bool {
        let inner = self.lock();
        inner.sent_index < inner.outbound.len()
    }

    /// Returns the next queued messages to deliver with a share of the
    /// given difficulty, advancing the sent index past them.
    ///
    /// At least [`HASHES_PER_CHAT`] hashes of difficulty are required per
    /// message, and at most [`MAX_CHATS_PER_SHARE`] messages are returned.
    pub fn chats_to_send(&self, mut available_diff: i64) -> Vec<QueuedChat> {
        let mut inner = self.lock();
        let mut out = Vec::new();
        while available_diff > HASHES_PER_CHAT
            && inner.sent_index < inner.outbound.len()
            && out.len() < MAX_CHATS_PER_SHARE
        {
            out.push(QueuedChat {
                id: (inner.sent_index as i64) ^ self.salt,
                message: inner.outbound[inner.sent_index].clone(),
            });
            inner.sent_index += 1;
            available_diff -= HASHES_PER_CHAT;
        }
        out
    }

    /// The token to present on the next inbound fetch.
    pub fn next_token(&self) -> i64 {
        self.lock().next_token
    }

    /// Appends fetched messages and installs the server's next token.
    ///
    /// `fetched_with` must be the token the fetch was issued with; if
    /// another fetch has advanced the token since, this batch is stale and
    /// is discarded.
    pub fn chats_received(
        &self,
        chats: Vec<ReceivedChat>,
        server_next_token: i64,
        fetched_with: i64,
    ) {
        let mut inner = self.lock();
        if inner.next_token != fetched_with {
            log::warn!(
                "chats updated since this fetch, discarding {} messages",
                chats.len()
            );
            return;
        }
        if !chats.is_empty() {
            log::info!("New chats received: {}", chats.len());
        }
        inner.inbound.extend(chats);
        inner.next_token = server_next_token;
    }

    /// True when received messages are waiting for delivery to the caller.
    pub fn has_chats_received(&self) -> bool {
        let inner = self.lock();
        inner.delivered_index < inner.inbound.len()
    }

    /// Pops the next received message, if any.
    pub fn next_chat_received(&self) -> Option<ReceivedChat> {
        let mut inner = self.lock();
        if inner.delivered_index < inner.inbound.len() {
            inner.delivered_index += 1;
            Some(inner.inbound[inner.delivered_index - 1].clone())
        } else {
            None
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ChatQueue {
    fn default() -> Self {
        ChatQueue::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn received(msg: &str) -> ReceivedChat {
        ReceivedChat {
            username: "pool-user".into(),
            message: msg.into(),
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn send_chat_ids_are_unique_within_a_session() {
        let q = ChatQueue::new();
        let mut seen = std::collections::HashSet::new();
        for i in 0..100 {
            let id = q.send_chat(format!("msg {}", i));
            assert!(seen.insert(id), "duplicate chat id issued");
        }
    }

    #[test]
    fn chats_to_send_respects_available_difficulty() {
        let q = ChatQueue::new();
        for i in 0..10 {
            q.send_chat(format!("msg {}", i));
        }
        // 12000 hashes buys two messages (> 5000 per message).
        let batch = q.chats_to_send(12_000);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].message, "msg 0");
        assert_eq!(batch[1].message, "msg 1");
        // The sent index advanced; the next fetch continues from msg 2.
        let batch = q.chats_to_send(1_000_000);
        assert_eq!(batch[0].message, "msg 2");
    }

    #[test]
    fn chats_to_send_caps_at_per_share_maximum() {
        let q = ChatQueue::new();
        for i in 0..10 {
            q.send_chat(format!("msg {}", i));
        }
        let batch = q.chats_to_send(i64::MAX);
        assert_eq!(batch.len(), MAX_CHATS_PER_SHARE);
    }

    #[test]
    fn low_difficulty_yields_no_chats() {
        let q = ChatQueue::new();
        q.send_chat("hello");
        assert!(q.chats_to_send(HASHES_PER_CHAT).is_empty());
        assert!(q.has_chats_to_send());
    }

    #[test]
    fn queued_ids_match_issued_ids() {
        let q = ChatQueue::new();
        let id = q.send_chat("hello");
        let batch = q.chats_to_send(100_000);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, id);
    }

    #[test]
    fn stale_fetch_token_is_discarded() {
        let q = ChatQueue::new();
        assert_eq!(q.next_token(), 0);
        q.chats_received(vec![received("first")], 7, 0);
        assert_eq!(q.next_token(), 7);
        // A fetch issued with the old token must not append.
        q.chats_received(vec![received("stale")], 9, 0);
        assert_eq!(q.next_token(), 7);
        assert_eq!(q.next_chat_received().unwrap().message, "first");
        assert!(q.next_chat_received().is_none());
    }

    #[test]
    fn received_chats_are_delivered_in_order() {
        let q = ChatQueue::new();
        q.chats_received(vec![received("a"), received("b")], 3, 0);
        assert!(q.has_chats_received());
        assert_eq!(q.next_chat_received().unwrap().message, "a");
        assert_eq!(q.next_chat_received().unwrap().message, "b");
        assert!(!q.has_chats_received());
    }
}
