//! Telegram Bot API over plain HTTPS: long-polled `getUpdates` inbound,
//! `sendMessage` outbound.

use core::time::Duration;

use anyhow::{Context as _, Result, anyhow, bail};
use async_trait::async_trait;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use tracing::{debug, warn};

use bridge_core::{
    Inbound,
    transport::{SendOptions, TRANSPORT_MAX_LEN, Transport},
};

const API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct User {
    #[serde(default)]
    pub username: Option<String>,
}

impl Update {
    /// Text messages from users with a username. Everything else is not
    /// routable and is skipped.
    pub fn into_inbound(self) -> Option<Inbound> {
        let message = self.message?;
        let text = message.text?;
        let username = message.from?.username?;
        Some(Inbound {
            sender_username: username,
            text,
            channel_id: message.chat.id,
        })
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T> {
    let response: ApiResponse<T> =
        serde_json::from_str(body).context("decoding Telegram response")?;
    if !response.ok {
        bail!(
            "Telegram API error: {}",
            response.description.as_deref().unwrap_or("unknown error")
        );
    }
    response
        .result
        .ok_or_else(|| anyhow!("Telegram response without result"))
}

/// Cuts `text` to the transport limit on a char boundary.
fn clamp(text: &str) -> &str {
    match text.char_indices().nth(TRANSPORT_MAX_LEN) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
}

impl core::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // The base URL embeds the bot token.
        f.debug_struct("TelegramClient").finish_non_exhaustive()
    }
}

impl TelegramClient {
    pub fn new(token: &str) -> Result<Self> {
        let api_base = std::env::var("TELEGRAM_API_BASE").unwrap_or_else(|_| API_BASE.to_owned());
        Self::with_api_base(&api_base, token)
    }

    pub fn with_api_base(api_base: &str, token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            base_url: format!("{}/bot{token}", api_base.trim_end_matches('/')),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<T> {
        let response = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .with_context(|| format!("calling {method}"))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| format!("reading {method} response"))?;
        if !status.is_success() {
            debug!(method, %status, body = %text, "Telegram call failed");
        }
        decode(&text).with_context(|| format!("{method} returned {status}"))
    }

    /// Long-polls for updates after `offset`, waiting up to `timeout_secs`.
    pub async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>> {
        let mut body = json!({
            "timeout": timeout_secs,
            "allowed_updates": ["message"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        self.call("getUpdates", &body, Duration::from_secs(timeout_secs + 10))
            .await
    }

    async fn send_message(&self, channel_id: i64, text: &str, options: SendOptions) -> Result<()> {
        let mut body = json!({
            "chat_id": channel_id,
            "text": clamp(text),
            "disable_web_page_preview": options.disable_link_preview,
        });
        if options.markdown {
            body["parse_mode"] = json!("Markdown");
        }
        self.call::<serde_json::Value>("sendMessage", &body, Duration::from_secs(30))
            .await
            .map(drop)
    }
}

#[async_trait]
impl Transport for TelegramClient {
    /// Markdown the API refuses to parse is resent as plain text.
    async fn send(&self, channel_id: i64, text: &str, options: SendOptions) -> Result<()> {
        match self.send_message(channel_id, text, options).await {
            Ok(()) => Ok(()),
            Err(e) if options.markdown => {
                warn!(channel_id, error = %format!("{e:#}"), "Markdown send failed; retrying as plain text");
                self.send_message(
                    channel_id,
                    text,
                    SendOptions {
                        markdown: false,
                        ..options
                    },
                )
                .await
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updates_become_inbound_messages() {
        let body = r#"{
            "ok": true,
            "result": [
                {"update_id": 7, "message": {"chat": {"id": 99}, "from": {"id": 1, "username": "alice"}, "text": "/status"}},
                {"update_id": 8, "message": {"chat": {"id": 99}, "from": {"id": 2}, "text": "no username"}},
                {"update_id": 9, "message": {"chat": {"id": 99}, "from": {"id": 1, "username": "alice"}}},
                {"update_id": 10}
            ]
        }"#;
        let updates: Vec<Update> = decode(body).unwrap();
        assert_eq!(updates.len(), 4);
        let inbound: Vec<Inbound> = updates.into_iter().filter_map(Update::into_inbound).collect();
        assert_eq!(
            inbound,
            vec![Inbound {
                sender_username: "alice".to_owned(),
                text: "/status".to_owned(),
                channel_id: 99,
            }]
        );
    }

    #[test]
    fn api_errors_carry_the_description() {
        let err = decode::<Vec<Update>>(r#"{"ok": false, "description": "Unauthorized"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("Unauthorized"));
    }

    #[test]
    fn clamp_respects_the_transport_limit() {
        let long = "é".repeat(TRANSPORT_MAX_LEN + 10);
        assert_eq!(clamp(&long).chars().count(), TRANSPORT_MAX_LEN);
        assert_eq!(clamp("short"), "short");
    }

    #[test]
    fn debug_hides_the_token() {
        let client = TelegramClient::with_api_base("http://localhost", "123:secret").unwrap();
        assert!(!format!("{client:?}").contains("secret"));
    }
}
