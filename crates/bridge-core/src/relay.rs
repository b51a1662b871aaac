use std::sync::Arc;

use anyhow::{Context as _, Result, anyhow, bail};
use async_trait::async_trait;
use tracing::info;

use crate::{
    capture::PendingResponse,
    format::{ai_response, truncate_reply},
    history::{HistoryKind, MessageHistory},
    sessions::{ChatSession, SessionRegistry},
    transport::{SendOptions, Transport},
};

/// Receives completed AI responses from [`crate::ResponseCapture`].
#[async_trait]
pub trait ResponseSink: Send + Sync {
    async fn deliver(&self, response: PendingResponse) -> Result<()>;
}

/// Sends captured replies to the remote conversation bound to their session.
pub struct ReplyRelay {
    sessions: SessionRegistry,
    history: MessageHistory,
    transport: Arc<dyn Transport>,
}

impl core::fmt::Debug for ReplyRelay {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReplyRelay").finish_non_exhaustive()
    }
}

impl ReplyRelay {
    pub fn new(
        sessions: SessionRegistry,
        history: MessageHistory,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            sessions,
            history,
            transport,
        }
    }

    /// The session of `chat_id`, which must have a routing target. A reply
    /// captured without a chat id goes to the most recently active routed
    /// session.
    async fn resolve(&self, chat_id: &str) -> Result<ChatSession> {
        if chat_id.is_empty() {
            return self
                .sessions
                .all()
                .await
                .into_iter()
                .filter(|s| s.enabled && s.has_routing_target())
                .max_by_key(|s| s.last_message_time)
                .ok_or_else(|| anyhow!("no session has a routing target"));
        }
        let session = self
            .sessions
            .get(chat_id)
            .await
            .ok_or_else(|| anyhow!("no session for {chat_id}"))?;
        if !session.has_routing_target() {
            bail!("no routing target for {chat_id}");
        }
        Ok(session)
    }
}

#[async_trait]
impl ResponseSink for ReplyRelay {
    async fn deliver(&self, response: PendingResponse) -> Result<()> {
        let session = self.resolve(&response.chat_id).await?;
        let channel_id = session
            .external_chat_id
            .ok_or_else(|| anyhow!("session {} has no chat id", session.chat_id))?;
        let username = session.external_username.as_deref();

        let text = truncate_reply(&ai_response(&response.content, username));
        self.transport
            .send(channel_id, &text, SendOptions::FORMATTED)
            .await
            .context("sending AI response")?;

        self.history
            .record(username.unwrap_or("ai"), &response.content, HistoryKind::AiResponse)
            .await;
        info!(
            chat = %session.chat_id,
            channel_id,
            chars = response.content.chars().count(),
            "AI response relayed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::RecordingTransport;
    use time::OffsetDateTime;

    fn pending(chat_id: &str, content: &str) -> PendingResponse {
        PendingResponse {
            content: content.to_owned(),
            timestamp: OffsetDateTime::now_utc(),
            chat_id: chat_id.to_owned(),
            is_complete: true,
        }
    }

    #[tokio::test]
    async fn relays_to_bound_channel_and_records_history() {
        let sessions = SessionRegistry::new();
        sessions.enable("chat_a", Some(77), Some("alice")).await;
        let history = MessageHistory::new();
        let transport = RecordingTransport::default();
        let relay = ReplyRelay::new(sessions, history.clone(), Arc::new(transport.clone()));

        relay.deliver(pending("chat_a", "Assistant: hi")).await.unwrap();

        let sent = transport.sent.lock().await.clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel_id, 77);
        assert_eq!(sent[0].options, SendOptions::FORMATTED);
        assert!(sent[0].text.starts_with("🤖 **AI Response for @alice**"));
        assert_eq!(history.count(HistoryKind::AiResponse).await, 1);
    }

    #[tokio::test]
    async fn reply_never_reaches_another_chats_user() {
        let sessions = SessionRegistry::new();
        sessions.enable("chat_a", None, None).await;
        sessions.enable("chat_b", None, None).await;
        sessions.update_routing_target("chat_b", 555, "bob").await;
        let history = MessageHistory::new();
        let transport = RecordingTransport::default();
        let relay = ReplyRelay::new(sessions, history.clone(), Arc::new(transport.clone()));

        let err = relay
            .deliver(pending("chat_a", "AI: answer meant for chat_a"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("chat_a"), "{err:#}");
        assert!(transport.sent.lock().await.is_empty());
        assert!(history.is_empty().await);
    }

    #[tokio::test]
    async fn reply_without_chat_id_goes_to_routed_session() {
        let sessions = SessionRegistry::new();
        sessions.enable("chat_a", None, None).await;
        sessions.enable("chat_b", Some(5), Some("bob")).await;
        let transport = RecordingTransport::default();
        let relay = ReplyRelay::new(sessions, MessageHistory::new(), Arc::new(transport.clone()));

        relay.deliver(pending("", "AI: ok")).await.unwrap();
        assert_eq!(transport.sent.lock().await[0].channel_id, 5);
    }

    #[tokio::test]
    async fn failures_are_errors_without_history() {
        let sessions = SessionRegistry::new();
        let history = MessageHistory::new();
        let relay = ReplyRelay::new(
            sessions.clone(),
            history.clone(),
            Arc::new(RecordingTransport::failing()),
        );
        assert!(relay.deliver(pending("chat_a", "AI: x")).await.is_err());

        sessions.enable("chat_a", Some(1), Some("alice")).await;
        assert!(relay.deliver(pending("chat_a", "AI: x")).await.is_err());
        assert!(history.is_empty().await);
    }
}
