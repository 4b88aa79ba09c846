//! Chat transport.
//!
//! Inbound events arrive over a long-poll loop and are forwarded through an
//! mpsc channel; outbound sends go through the [`ChatTransport`] trait so
//! the rest of the system never touches the wire format. The transport also
//! keeps a bounded cache of recently seen messages so a one-level
//! `reply_to` pointer from the wire can be expanded into the full ancestor
//! list the edit flow walks.

pub mod api;

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

pub use api::TelegramApi;

/// A recorded message, as much of it as reply-chain resolution needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSummary {
    pub id: i64,
    pub is_bot: bool,
    pub text: String,
}

/// Inbound events the runtime reacts to.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// A voice note to turn into ledger rows.
    Voice {
        chat_id: i64,
        message_id: i64,
        file_id: String,
    },
    /// A text reply to an earlier message: an edit/delete instruction.
    /// `ancestors` is the materialized chain, nearest parent first.
    Reply {
        chat_id: i64,
        message_id: i64,
        text: String,
        ancestors: Vec<MessageSummary>,
    },
    /// Confirm button pressed under a confirmation message.
    Confirm {
        chat_id: i64,
        message_id: i64,
        callback_id: String,
    },
    /// Reject button pressed under a confirmation message.
    Reject {
        chat_id: i64,
        message_id: i64,
        callback_id: String,
    },
}

/// Outbound transport contract.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a text message, optionally as a reply and optionally carrying
    /// confirm/reject buttons. Returns the durable message identifier the
    /// transport assigned.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i64>,
        with_buttons: bool,
    ) -> Result<i64>;

    /// Replace a message's text (and drop its buttons).
    async fn edit_message(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()>;

    /// Fetch a voice payload by its transport file id.
    async fn download_voice(&self, file_id: &str) -> Result<Bytes>;

    /// Acknowledge a button press so the client stops its spinner.
    async fn answer_callback(&self, callback_id: &str) -> Result<()>;
}

struct CachedMessage {
    summary: MessageSummary,
    parent: Option<i64>,
}

/// Bounded per-process message cache. Holds the last `capacity` messages
/// across all chats and answers ancestor queries for reply chains.
pub struct MessageCache {
    entries: HashMap<(i64, i64), CachedMessage>,
    order: VecDeque<(i64, i64)>,
    capacity: usize,
    max_hops: usize,
}

impl MessageCache {
    pub fn new(capacity: usize, max_hops: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::with_capacity(capacity),
            capacity,
            max_hops,
        }
    }

    /// Record a message, evicting the oldest entry at capacity. Re-recording
    /// without a parent link keeps the one already known: the wire often
    /// repeats a message (as `reply_to_message`) with its own reply pointer
    /// stripped.
    pub fn record(&mut self, chat_id: i64, summary: MessageSummary, parent: Option<i64>) {
        let key = (chat_id, summary.id);
        if let Some(existing) = self.entries.get_mut(&key) {
            let parent = parent.or(existing.parent);
            *existing = CachedMessage { summary, parent };
            return;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key);
        self.entries.insert(key, CachedMessage { summary, parent });
    }

    /// Materialize the ancestor chain starting at `from_id`, nearest
    /// first. The walk is bounded by a visited-id set (cycle guard) and a
    /// maximum hop count.
    pub fn ancestors(&self, chat_id: i64, from_id: i64) -> Vec<MessageSummary> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(from_id);

        while let Some(id) = current {
            if chain.len() >= self.max_hops || !visited.insert(id) {
                break;
            }
            let Some(entry) = self.entries.get(&(chat_id, id)) else {
                break;
            };
            chain.push(entry.summary.clone());
            current = entry.parent;
        }
        chain
    }
}
