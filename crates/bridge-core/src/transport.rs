use anyhow::Result;
use async_trait::async_trait;

/// Hard message limit of the Telegram Bot API.
pub const TRANSPORT_MAX_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    pub markdown: bool,
    pub disable_link_preview: bool,
}

impl SendOptions {
    /// Markdown with link previews disabled, used for every formatted reply.
    pub const FORMATTED: Self = Self {
        markdown: true,
        disable_link_preview: true,
    };

    pub const PLAIN: Self = Self {
        markdown: false,
        disable_link_preview: false,
    };
}

/// Outbound side of the chat transport.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, channel_id: i64, text: &str, options: SendOptions) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use anyhow::bail;
    use tokio::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Sent {
        pub channel_id: i64,
        pub text: String,
        pub options: SendOptions,
    }

    /// Records every message; optionally fails every send.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingTransport {
        pub sent: Arc<Mutex<Vec<Sent>>>,
        pub fail: bool,
    }

    impl RecordingTransport {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub async fn texts(&self) -> Vec<String> {
            self.sent.lock().await.iter().map(|s| s.text.clone()).collect()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, channel_id: i64, text: &str, options: SendOptions) -> Result<()> {
            if self.fail {
                bail!("transport offline");
            }
            self.sent.lock().await.push(Sent {
                channel_id,
                text: text.to_owned(),
                options,
            });
            Ok(())
        }
    }
}
