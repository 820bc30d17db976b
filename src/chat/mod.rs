// src/chat/mod.rs
//! Chat message queues
//!
//! Pool chats are piggybacked on the mining protocol: outbound messages
//! ride accepted shares, inbound messages are fetched with a monotonic
//! token. [`ChatQueue`] holds both directions.

/// Queue implementation
pub mod queue;

// Re-export main components
pub use queue::{ChatQueue, QueuedChat, ReceivedChat, HASHES_PER_CHAT, MAX_CHATS_PER_SHARE};
