use core::fmt;
use std::{collections::HashMap, sync::Arc};

use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::RoutingPolicy;

/// Bridge state for one chat surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSession {
    pub chat_id: String,
    pub enabled: bool,
    pub last_message_time: OffsetDateTime,
    /// Remote conversation replies are routed to.
    pub external_chat_id: Option<i64>,
    pub external_username: Option<String>,
}

impl ChatSession {
    fn new(chat_id: &str) -> Self {
        Self {
            chat_id: chat_id.to_owned(),
            enabled: true,
            last_message_time: OffsetDateTime::now_utc(),
            external_chat_id: None,
            external_username: None,
        }
    }

    #[must_use]
    pub const fn has_routing_target(&self) -> bool {
        self.external_chat_id.is_some()
    }
}

/// Outcome of binding an inbound sender to the primary session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// The session now routes to the sender.
    Bound { chat_id: String },
    /// Another user owns the session under [`RoutingPolicy::Exclusive`].
    Refused { chat_id: String, owner: String },
    /// No session is enabled.
    NoSession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Enabled,
    Disabled,
    NotAChat,
}

/// Authoritative map of chat id to session. Disabling removes the entry.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<String, ChatSession>>>,
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry").finish_non_exhaustive()
    }
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables the bridge for `chat_id`. Re-enabling refreshes the activity
    /// time and any routing fields given, without creating a second entry.
    /// Returns `true` when a new session was created.
    pub async fn enable(
        &self,
        chat_id: &str,
        external_chat_id: Option<i64>,
        external_username: Option<&str>,
    ) -> bool {
        let mut sessions = self.inner.write().await;
        let created = !sessions.contains_key(chat_id);
        let session = sessions
            .entry(chat_id.to_owned())
            .or_insert_with(|| ChatSession::new(chat_id));
        session.enabled = true;
        session.last_message_time = OffsetDateTime::now_utc();
        if let Some(id) = external_chat_id {
            session.external_chat_id = Some(id);
        }
        if let Some(user) = external_username {
            session.external_username = Some(user.to_owned());
        }
        if created {
            info!(chat = chat_id, "bridge enabled for chat");
        }
        created
    }

    pub async fn disable(&self, chat_id: &str) -> bool {
        let removed = self.inner.write().await.remove(chat_id).is_some();
        if removed {
            info!(chat = chat_id, "bridge disabled for chat");
        }
        removed
    }

    pub async fn is_enabled(&self, chat_id: &str) -> bool {
        self.inner
            .read()
            .await
            .get(chat_id)
            .is_some_and(|s| s.enabled)
    }

    pub async fn get(&self, chat_id: &str) -> Option<ChatSession> {
        self.inner.read().await.get(chat_id).cloned()
    }

    /// All sessions ordered by chat id.
    pub async fn all(&self) -> Vec<ChatSession> {
        let mut sessions: Vec<_> = self.inner.read().await.values().cloned().collect();
        sessions.sort_by(|a, b| a.chat_id.cmp(&b.chat_id));
        sessions
    }

    pub async fn enabled_count(&self) -> usize {
        self.inner
            .read()
            .await
            .values()
            .filter(|s| s.enabled)
            .count()
    }

    pub async fn update_routing_target(
        &self,
        chat_id: &str,
        external_chat_id: i64,
        external_username: &str,
    ) -> bool {
        let mut sessions = self.inner.write().await;
        let Some(session) = sessions.get_mut(chat_id) else {
            return false;
        };
        session.external_chat_id = Some(external_chat_id);
        session.external_username = Some(external_username.to_owned());
        session.last_message_time = OffsetDateTime::now_utc();
        debug!(chat = chat_id, user = external_username, "routing target updated");
        true
    }

    /// The enabled session with the most recent activity.
    pub async fn primary(&self) -> Option<ChatSession> {
        let sessions = self.inner.read().await;
        sessions
            .values()
            .filter(|s| s.enabled)
            .max_by(|a, b| {
                a.last_message_time
                    .cmp(&b.last_message_time)
                    .then_with(|| b.chat_id.cmp(&a.chat_id))
            })
            .cloned()
    }

    /// Binds `username` on `channel_id` as the reply target of the primary
    /// session, subject to `policy`.
    pub async fn claim(&self, policy: RoutingPolicy, channel_id: i64, username: &str) -> Claim {
        let Some(primary) = self.primary().await else {
            return Claim::NoSession;
        };
        if policy == RoutingPolicy::Exclusive
            && let Some(owner) = primary.external_username.as_deref()
            && owner != username
        {
            info!(chat = %primary.chat_id, owner, sender = username, "refusing second sender");
            return Claim::Refused {
                owner: owner.to_owned(),
                chat_id: primary.chat_id,
            };
        }
        self.update_routing_target(&primary.chat_id, channel_id, username)
            .await;
        Claim::Bound {
            chat_id: primary.chat_id,
        }
    }

    /// Enables a chat-like document's session, or disables an enabled one.
    pub async fn toggle(&self, chat_id: &str, looks_like_chat: bool) -> Toggle {
        if self.is_enabled(chat_id).await {
            self.disable(chat_id).await;
            Toggle::Disabled
        } else if looks_like_chat {
            self.enable(chat_id, None, None).await;
            Toggle::Enabled
        } else {
            Toggle::NotAChat
        }
    }
}
