//! Debounced capture of AI replies from the active chat document.
//!
//! A qualifying document change stores the latest assistant turn and
//! restarts a single quiescence timer. Only the content present when the
//! timer finally fires is dispatched. Each restart bumps an epoch so a timer
//! that was superseded but could not be aborted in time does nothing.

use core::{fmt, time::Duration};
use std::sync::Arc;

use time::OffsetDateTime;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    detector::{document_looks_like_chat, extract_latest_reply, session_key},
    relay::ResponseSink,
    sessions::SessionRegistry,
    workspace::Document,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingResponse {
    pub content: String,
    pub timestamp: OffsetDateTime,
    pub chat_id: String,
    pub is_complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Accumulating,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureStatus {
    pub state: CaptureState,
    pub chat_id: Option<String>,
    pub pending_chars: usize,
    pub dispatched: u64,
}

#[derive(Default)]
struct Inner {
    pending: Option<PendingResponse>,
    last_len: usize,
    last_dispatched: Option<String>,
    epoch: u64,
    timer: Option<JoinHandle<()>>,
    dispatched: u64,
}

#[derive(Clone)]
pub struct ResponseCapture {
    inner: Arc<Mutex<Inner>>,
    sessions: SessionRegistry,
    sink: Arc<dyn ResponseSink>,
    quiescence: Duration,
}

impl fmt::Debug for ResponseCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCapture")
            .field("quiescence", &self.quiescence)
            .finish_non_exhaustive()
    }
}

impl ResponseCapture {
    pub fn new(sessions: SessionRegistry, sink: Arc<dyn ResponseSink>, quiescence: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            sessions,
            sink,
            quiescence,
        }
    }

    /// Feeds a document change. Returns `true` when the change was accepted
    /// as new reply content and the quiescence timer was restarted.
    pub async fn on_document_change(&self, doc: &Document, active_uri: Option<&str>) -> bool {
        if active_uri != Some(doc.uri.as_str()) || !document_looks_like_chat(doc).is_chat() {
            return false;
        }
        let chat_id = session_key(&doc.uri);
        if !self.sessions.is_enabled(&chat_id).await {
            return false;
        }

        let mut inner = self.inner.lock().await;
        let len = doc.text.len();
        if len <= inner.last_len {
            if len < inner.last_len {
                debug!(chat = %chat_id, "document shrank; resetting baseline");
                inner.last_len = len;
            }
            return false;
        }
        let Some(reply) = extract_latest_reply(&doc.text) else {
            return false;
        };
        if inner.last_dispatched.as_deref() == Some(reply.as_str()) {
            inner.last_len = len;
            return false;
        }

        debug!(chat = %chat_id, chars = reply.len(), "AI reply growing");
        inner.pending = Some(PendingResponse {
            content: reply,
            timestamp: OffsetDateTime::now_utc(),
            chat_id,
            is_complete: false,
        });
        inner.last_len = len;
        inner.epoch += 1;
        if let Some(old) = inner.timer.take() {
            old.abort();
        }
        let epoch = inner.epoch;
        let this = self.clone();
        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(this.quiescence).await;
            this.on_quiescence(epoch).await;
        }));
        true
    }

    async fn on_quiescence(&self, epoch: u64) {
        let pending = {
            let mut inner = self.inner.lock().await;
            if inner.epoch != epoch {
                return;
            }
            inner.timer = None;
            inner.pending.take()
        };
        if let Some(response) = pending {
            self.dispatch(response).await;
        }
    }

    /// Dispatches whatever is buffered without waiting for quiescence. A
    /// timer that fires afterwards finds nothing to send.
    pub async fn send_current_response(&self) -> bool {
        let pending = self.inner.lock().await.pending.take();
        match pending {
            Some(response) => self.dispatch(response).await,
            None => false,
        }
    }

    async fn dispatch(&self, mut response: PendingResponse) -> bool {
        response.is_complete = true;
        let content = response.content.clone();
        let chat_id = response.chat_id.clone();
        self.inner.lock().await.last_dispatched = Some(content);

        match self.sink.deliver(response).await {
            Ok(()) => {
                self.inner.lock().await.dispatched += 1;
                info!(chat = %chat_id, "AI response dispatched");
                true
            }
            Err(e) => {
                warn!(chat = %chat_id, error = %format!("{e:#}"), "dropping AI response");
                false
            }
        }
    }

    pub async fn status(&self) -> CaptureStatus {
        let inner = self.inner.lock().await;
        CaptureStatus {
            state: if inner.pending.is_some() {
                CaptureState::Accumulating
            } else {
                CaptureState::Idle
            },
            chat_id: inner.pending.as_ref().map(|p| p.chat_id.clone()),
            pending_chars: inner.pending.as_ref().map_or(0, |p| p.content.len()),
            dispatched: inner.dispatched,
        }
    }

    /// Cancels the timer and drops anything buffered.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        inner.epoch += 1;
        inner.pending = None;
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, bail};
    use async_trait::async_trait;

    #[derive(Default)]
    struct RecordingSink {
        delivered: Mutex<Vec<PendingResponse>>,
        fail: bool,
    }

    #[async_trait]
    impl ResponseSink for RecordingSink {
        async fn deliver(&self, response: PendingResponse) -> Result<()> {
            if self.fail {
                bail!("offline");
            }
            self.delivered.lock().await.push(response);
            Ok(())
        }
    }

    const URI: &str = "notes/chat.md";

    async fn setup(sink: Arc<RecordingSink>) -> ResponseCapture {
        let sessions = SessionRegistry::new();
        sessions.enable(&session_key(URI), Some(1), Some("alice")).await;
        ResponseCapture::new(sessions, sink, Duration::from_millis(5000))
    }

    fn doc(text: &str) -> Document {
        Document::new(URI, text)
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_dispatches_only_final_content() {
        let sink = Arc::new(RecordingSink::default());
        let capture = setup(Arc::clone(&sink)).await;

        assert!(capture.on_document_change(&doc("User: hi\nAssistant: Hel"), Some(URI)).await);
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(
            capture
                .on_document_change(&doc("User: hi\nAssistant: Hello there"), Some(URI))
                .await
        );
        assert_eq!(capture.status().await.state, CaptureState::Accumulating);

        tokio::time::sleep(Duration::from_millis(4999)).await;
        assert!(sink.delivered.lock().await.is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        let delivered = sink.delivered.lock().await.clone();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].content, "Assistant: Hello there");
        assert!(delivered[0].is_complete);

        let status = capture.status().await;
        assert_eq!(status.state, CaptureState::Idle);
        assert_eq!(status.dispatched, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ignores_inactive_disabled_or_shrinking_documents() {
        let sink = Arc::new(RecordingSink::default());
        let capture = setup(Arc::clone(&sink)).await;

        assert!(!capture.on_document_change(&doc("Assistant: a"), Some("other.md")).await);
        let other = Document::new("elsewhere/chat.md", "Assistant: a");
        assert!(!capture.on_document_change(&other, Some("elsewhere/chat.md")).await);

        assert!(capture.on_document_change(&doc("Assistant: long reply"), Some(URI)).await);
        assert!(!capture.on_document_change(&doc("Assistant: short"), Some(URI)).await);
        assert!(!capture.on_document_change(&doc("User: no reply yet at all"), Some(URI)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_send_leaves_timer_harmless() {
        let sink = Arc::new(RecordingSink::default());
        let capture = setup(Arc::clone(&sink)).await;

        capture.on_document_change(&doc("AI: done"), Some(URI)).await;
        assert!(capture.send_current_response().await);
        assert!(!capture.send_current_response().await);

        tokio::time::sleep(Duration::from_millis(6000)).await;
        assert_eq!(sink.delivered.lock().await.len(), 1);

        // The same reply is not captured twice.
        assert!(!capture.on_document_change(&doc("AI: done\n"), Some(URI)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_dispatch_is_dropped() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..RecordingSink::default()
        });
        let capture = setup(Arc::clone(&sink)).await;

        capture.on_document_change(&doc("AI: lost"), Some(URI)).await;
        tokio::time::sleep(Duration::from_millis(5100)).await;
        let status = capture.status().await;
        assert_eq!(status.state, CaptureState::Idle);
        assert_eq!(status.dispatched, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn injected_question_does_not_resend_previous_reply() {
        let sink = Arc::new(RecordingSink::default());
        let capture = setup(Arc::clone(&sink)).await;

        capture.on_document_change(&doc("User: hi\nAI: answer"), Some(URI)).await;
        tokio::time::sleep(Duration::from_millis(5100)).await;
        assert_eq!(sink.delivered.lock().await.len(), 1);

        let with_question = "User: hi\nAI: answer\n[Telegram] @alice: next q\n";
        assert!(!capture.on_document_change(&doc(with_question), Some(URI)).await);
        let edited = format!("{with_question}(typing)");
        assert!(!capture.on_document_change(&doc(&edited), Some(URI)).await);
        tokio::time::sleep(Duration::from_millis(6000)).await;
        assert_eq!(sink.delivered.lock().await.len(), 1);
    }
}
