use core::fmt;
use std::{collections::VecDeque, sync::Arc};

use time::OffsetDateTime;
use tokio::sync::RwLock;

pub const MAX_HISTORY_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryKind {
    Telegram,
    AiResponse,
}

impl HistoryKind {
    #[must_use]
    pub const fn icon(self) -> &'static str {
        match self {
            Self::Telegram => "📱",
            Self::AiResponse => "🤖",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Telegram => "Telegram",
            Self::AiResponse => "AI Response",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub username: String,
    pub message: String,
    pub timestamp: OffsetDateTime,
    pub kind: HistoryKind,
}

impl HistoryEntry {
    pub fn new(username: impl Into<String>, message: impl Into<String>, kind: HistoryKind) -> Self {
        Self {
            username: username.into(),
            message: message.into(),
            timestamp: OffsetDateTime::now_utc(),
            kind,
        }
    }
}

/// Bounded in-memory message log. The oldest entry is evicted first.
#[derive(Clone)]
pub struct MessageHistory {
    capacity: usize,
    entries: Arc<RwLock<VecDeque<HistoryEntry>>>,
}

impl Default for MessageHistory {
    fn default() -> Self {
        Self::with_capacity(MAX_HISTORY_SIZE)
    }
}

impl fmt::Debug for MessageHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageHistory")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl MessageHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn push(&self, entry: HistoryEntry) {
        tracing::debug!(
            kind = entry.kind.label(),
            user = %entry.username,
            "recording history entry"
        );
        let mut entries = self.entries.write().await;
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub async fn record(&self, username: &str, message: &str, kind: HistoryKind) {
        self.push(HistoryEntry::new(username, message, kind)).await;
    }

    /// Entries oldest first.
    pub async fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn count(&self, kind: HistoryKind) -> usize {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
