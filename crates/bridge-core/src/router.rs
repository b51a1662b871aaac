//! Inbound message dispatch.
//!
//! [`parse_command`] classifies the raw text; [`CommandRouter::route`] runs
//! the matching handler and sends its reply. Handlers return
//! `anyhow::Result<String>` and an error becomes a `❌` reply, so routing a
//! message never fails from the caller's point of view.

use core::{fmt, time::Duration};
use std::{collections::HashMap, sync::Arc, time::Instant};

use anyhow::{Context as _, Result, anyhow, bail};
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, info, warn};

use plugin_core::{Caller, PluginRegistry, split_args};

use crate::{
    capture::ResponseCapture,
    config::BridgeConfig,
    context::ContextSizeDetector,
    detector::{document_looks_like_chat, session_key},
    format,
    history::{HistoryKind, MessageHistory},
    relay::ReplyRelay,
    sessions::{Claim, SessionRegistry, Toggle},
    terminal::CommandExecutor,
    transport::{SendOptions, Transport},
    workspace::{Document, Workspace},
};

const UNAUTHORIZED: &str = "You are not authorized to use this bot.";
const PLAIN_ACK: &str = "✅ Message received and sent to the AI chat! Waiting for response...";

/// One message delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub sender_username: String,
    pub text: String,
    pub channel_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Terminal(String),
    ContextSize,
    Help,
    Usage,
    Status,
    Config,
    Users,
    InfoCursorAi,
    History,
    Tabs,
    Msg(String),
    MsgActive(String),
    Version,
    Cheat(String),
    Plugins,
    Toggle,
    Send,
    /// Any other `/name`, offered to the plugin registry.
    Plugin { name: String, args: Vec<String> },
    Plain(String),
}

impl Command {
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Terminal(_) => "terminal",
            Self::ContextSize => "context_size",
            Self::Help => "help",
            Self::Usage => "usage",
            Self::Status => "status",
            Self::Config => "config",
            Self::Users => "users",
            Self::InfoCursorAi => "info cursor_ai",
            Self::History => "history",
            Self::Tabs => "tabs",
            Self::Msg(_) => "msg",
            Self::MsgActive(_) => "msgactive",
            Self::Version => "version",
            Self::Cheat(_) => "cheat",
            Self::Plugins => "plugins",
            Self::Toggle => "toggle",
            Self::Send => "send",
            Self::Plugin { name, .. } => name.as_str(),
            Self::Plain(_) => "plain",
        }
    }
}

/// `Some("")` for the bare command, `Some(rest)` for `"{cmd} rest"`.
fn argument<'a>(text: &'a str, cmd: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(cmd)?;
    if rest.is_empty() {
        return Some("");
    }
    rest.strip_prefix(' ').map(str::trim)
}

/// Drops a `@BotName` suffix from the command token, as group chats send it.
fn strip_bot_suffix(text: &str) -> String {
    let (head, tail) = text.split_once(' ').unwrap_or((text, ""));
    match head.split_once('@') {
        Some((cmd, _)) if tail.is_empty() => cmd.to_owned(),
        Some((cmd, _)) => format!("{cmd} {tail}"),
        None => text.to_owned(),
    }
}

/// Classifies raw message text. Prefixes are checked in a fixed order and
/// the first match wins.
#[must_use]
pub fn parse_command(raw: &str) -> Command {
    let text = raw.trim();
    if !text.starts_with('/') {
        return Command::Plain(text.to_owned());
    }
    let text = strip_bot_suffix(text);
    let text = text.as_str();

    if let Some(arg) = argument(text, "/terminal") {
        return Command::Terminal(arg.to_owned());
    }
    let exact = match text {
        "/context_size" => Some(Command::ContextSize),
        "/help" | "/start" => Some(Command::Help),
        "/usage" => Some(Command::Usage),
        "/status" => Some(Command::Status),
        "/config" => Some(Command::Config),
        "/users" => Some(Command::Users),
        "/info cursor_ai" => Some(Command::InfoCursorAi),
        "/history" => Some(Command::History),
        "/tabs" => Some(Command::Tabs),
        _ => None,
    };
    if let Some(command) = exact {
        return command;
    }
    if let Some(arg) = argument(text, "/msg") {
        return Command::Msg(arg.to_owned());
    }
    if let Some(arg) = argument(text, "/msgactive") {
        return Command::MsgActive(arg.to_owned());
    }
    if text == "/version" {
        return Command::Version;
    }
    if let Some(arg) = argument(text, "/cheat") {
        return Command::Cheat(arg.to_owned());
    }
    match text {
        "/plugins" => Command::Plugins,
        "/toggle" => Command::Toggle,
        "/send" => Command::Send,
        _ => {
            let mut args = split_args(&text[1..]);
            let name = if args.is_empty() {
                String::new()
            } else {
                args.remove(0)
            };
            Command::Plugin { name, args }
        }
    }
}

/// Shared state of one running bridge.
pub struct Bridge {
    pub config: Arc<BridgeConfig>,
    pub sessions: SessionRegistry,
    pub history: MessageHistory,
    pub plugins: PluginRegistry,
    pub workspace: Arc<dyn Workspace>,
    pub transport: Arc<dyn Transport>,
    pub terminal: Arc<dyn CommandExecutor>,
    pub context: ContextSizeDetector,
    pub capture: Option<ResponseCapture>,
    started: Instant,
    last_activity: RwLock<Option<OffsetDateTime>>,
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("routing", &self.config.routing)
            .field("capture", &self.capture.is_some())
            .finish_non_exhaustive()
    }
}

impl Bridge {
    pub fn new(
        config: Arc<BridgeConfig>,
        plugins: PluginRegistry,
        workspace: Arc<dyn Workspace>,
        transport: Arc<dyn Transport>,
        terminal: Arc<dyn CommandExecutor>,
    ) -> Result<Self> {
        Ok(Self {
            config,
            sessions: SessionRegistry::new(),
            history: MessageHistory::new(),
            plugins,
            workspace,
            transport,
            terminal,
            context: ContextSizeDetector::new()?,
            capture: None,
            started: Instant::now(),
            last_activity: RwLock::new(None),
        })
    }

    /// Attaches a response capture that relays finished replies over this
    /// bridge's transport.
    #[must_use]
    pub fn with_capture(mut self, quiescence: Duration) -> Self {
        let relay = ReplyRelay::new(
            self.sessions.clone(),
            self.history.clone(),
            Arc::clone(&self.transport),
        );
        self.capture = Some(ResponseCapture::new(
            self.sessions.clone(),
            Arc::new(relay),
            quiescence,
        ));
        self
    }

    pub async fn last_activity(&self) -> Option<OffsetDateTime> {
        *self.last_activity.read().await
    }
}

#[derive(Debug, Clone)]
pub struct CommandRouter {
    bridge: Arc<Bridge>,
    /// One queue per remote channel, drained by its own task.
    lanes: Arc<Mutex<HashMap<i64, mpsc::UnboundedSender<Inbound>>>>,
}

impl CommandRouter {
    #[must_use]
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self {
            bridge,
            lanes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Queues `msg` for routing without waiting for it. Messages from one
    /// channel are routed in arrival order; channels never wait on each
    /// other.
    pub async fn enqueue(&self, msg: Inbound) {
        let mut lanes = self.lanes.lock().await;
        let msg = match lanes.get(&msg.channel_id) {
            Some(lane) => match lane.send(msg) {
                Ok(()) => return,
                Err(mpsc::error::SendError(msg)) => msg,
            },
            None => msg,
        };

        let channel_id = msg.channel_id;
        let (tx, mut rx) = mpsc::unbounded_channel::<Inbound>();
        let router = self.clone();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                router.route(&msg).await;
            }
        });
        debug!(channel_id, "Opened routing lane");
        if let Err(e) = tx.send(msg) {
            warn!(channel_id, user = %e.0.sender_username, "Routing lane closed; message dropped");
        }
        lanes.insert(channel_id, tx);
    }

    #[must_use]
    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    /// Handles one inbound message. Every outcome, errors included, ends as
    /// a reply on the sender's channel.
    pub async fn route(&self, msg: &Inbound) {
        let user = msg.sender_username.as_str();
        if !self.bridge.config.is_authorized(user) {
            warn!(user, channel_id = msg.channel_id, "Unauthorized sender");
            self.reply(msg.channel_id, UNAUTHORIZED).await;
            return;
        }
        *self.bridge.last_activity.write().await = Some(OffsetDateTime::now_utc());

        let command = parse_command(&msg.text);
        info!(user, channel_id = msg.channel_id, command = command.label(), "Routing message");
        let label = command.label().to_owned();
        let reply = match self.dispatch(msg, command).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(user, command = %label, error = %format!("{e:#}"), "Command failed");
                format!("❌ {e:#}")
            }
        };
        self.reply(msg.channel_id, &reply).await;
    }

    async fn reply(&self, channel_id: i64, text: &str) {
        let text = format::truncate_reply(text);
        if let Err(e) = self
            .bridge
            .transport
            .send(channel_id, &text, SendOptions::FORMATTED)
            .await
        {
            warn!(channel_id, error = %format!("{e:#}"), "Failed to send reply");
        }
    }

    async fn dispatch(&self, msg: &Inbound, command: Command) -> Result<String> {
        let now = OffsetDateTime::now_utc();
        let b = &self.bridge;
        match command {
            Command::Help => Ok(format!(
                "{}\n\n{}",
                format::help(),
                b.plugins.available_commands().await
            )),
            Command::Usage => Ok(format::usage()),
            Command::Version => Ok(format::version()),
            Command::Config => Ok(format::config(&b.config)),
            Command::Status => Ok(format::status(&format::StatusSnapshot {
                sessions_total: b.sessions.all().await.len(),
                sessions_enabled: b.sessions.enabled_count().await,
                terminal_enabled: b.terminal.is_enabled(),
                context_available: b.context.is_available().await,
                plugins: b.plugins.entries().await.len(),
                uptime: b.started.elapsed(),
                last_activity: b.last_activity().await,
                now,
            })),
            Command::Users => Ok(format::users(&b.config, &b.sessions.all().await, now)),
            Command::InfoCursorAi => Ok(format::cursor_info(&format::RoutingInfo {
                sessions: &b.sessions.all().await,
                routing: b.config.routing,
                config_valid: b.config.has_valid_configuration(),
                last_activity: b.last_activity().await,
                now,
            })),
            Command::History => Ok(format::history(
                &b.history.entries().await,
                b.history.capacity(),
                now,
            )),
            Command::Tabs => {
                let active = b.workspace.active_document().await;
                let docs = b.workspace.open_documents().await;
                Ok(format::tabs(&docs, active.as_ref().map(|d| d.uri.as_str())))
            }
            Command::Plugins => Ok(format!(
                "{}\n\n{}",
                b.plugins.status_summary().await,
                format::plugin_list(&b.plugins.entries().await)
            )),
            Command::Terminal(cmd) => self.terminal(msg, &cmd).await,
            Command::ContextSize => self.context_size().await,
            Command::Msg(text) => self.inject(msg, &text, false).await,
            Command::MsgActive(text) => self.inject(msg, &text, true).await,
            Command::Cheat(args) => self.cheat(msg, &args).await,
            Command::Toggle => self.toggle().await,
            Command::Send => Ok(self.send_buffered().await),
            Command::Plugin { name, args } => Ok(self.plugin(msg, &name, &args).await),
            Command::Plain(text) => self.plain(msg, &text).await,
        }
    }

    async fn terminal(&self, msg: &Inbound, command: &str) -> Result<String> {
        if command.is_empty() {
            bail!("Please provide a command after /terminal");
        }
        self.reply(
            msg.channel_id,
            &format!("🔄 Executing: `{command}`\n⏳ Please wait..."),
        )
        .await;
        let result = self
            .bridge
            .terminal
            .execute(command, &msg.sender_username)
            .await;
        Ok(format::terminal_result(&result))
    }

    async fn context_size(&self) -> Result<String> {
        let active = self.bridge.workspace.active_document().await;
        Ok(self.bridge.context.refresh(active.as_ref()).await.map_or_else(
            || {
                "❌ Context size not available. Open an AI chat that shows its context usage and try again."
                    .to_owned()
            },
            |info| format::context_size(&info),
        ))
    }

    async fn active_chat(&self) -> Result<Document> {
        let doc = self
            .bridge
            .workspace
            .active_document()
            .await
            .ok_or_else(|| anyhow!("No active document"))?;
        if !document_looks_like_chat(&doc).is_chat() {
            bail!("Active tab is not an AI chat: {}", doc.name);
        }
        Ok(doc)
    }

    /// `/msg` and `/msgactive`: insert at the cursor of the active chat.
    async fn inject(&self, msg: &Inbound, text: &str, move_cursor: bool) -> Result<String> {
        let name = if move_cursor { "msgactive" } else { "msg" };
        if text.is_empty() {
            bail!("Please provide a message after /{name}");
        }
        let doc = self.active_chat().await?;
        let header = if move_cursor {
            "Message to Active Element from Telegram"
        } else {
            "Message from Telegram"
        };
        let block = format!("\n\n**{header}:**\n{text}\n\n");
        let ws = &self.bridge.workspace;
        ws.insert(&doc.uri, doc.cursor, &block)
            .await
            .with_context(|| format!("inserting into {}", doc.name))?;
        if move_cursor {
            ws.set_cursor(&doc.uri, doc.cursor + block.len())
                .await
                .with_context(|| format!("moving cursor in {}", doc.name))?;
        }
        self.bridge
            .history
            .record(&msg.sender_username, text, HistoryKind::Telegram)
            .await;
        info!(user = %msg.sender_username, document = %doc.name, "Message injected");
        Ok(format!(
            "✅ Message sent to **{}**:\n\n{text}",
            doc.name
        ))
    }

    /// `/cheat <search> <add>`: every occurrence of `search` in the open
    /// documents becomes `search` followed by `add`.
    async fn cheat(&self, msg: &Inbound, args: &str) -> Result<String> {
        let Some((search, add)) = args.split_once(' ') else {
            bail!("Usage: /cheat <search> <add>");
        };
        if search.is_empty() || add.is_empty() {
            bail!("Usage: /cheat <search> <add>");
        }

        let ws = &self.bridge.workspace;
        let mut docs = ws.open_documents().await;
        if let Some(active) = ws.active_document().await
            && !docs.iter().any(|d| d.uri == active.uri)
        {
            docs.push(active);
        }

        let replacement = format!("{search}{add}");
        let mut per_doc = Vec::new();
        for doc in &docs {
            let count = doc.text.matches(search).count();
            if count == 0 {
                continue;
            }
            let updated = doc.text.replace(search, &replacement);
            ws.replace(&doc.uri, 0..doc.text.len(), &updated)
                .await
                .with_context(|| format!("editing {}", doc.name))?;
            debug!(document = %doc.name, count, "cheat applied");
            per_doc.push((doc.name.as_str(), count));
        }

        let total: usize = per_doc.iter().map(|(_, n)| n).sum();
        if total == 0 {
            bail!("\"{search}\" was not found in any open document");
        }
        self.bridge
            .history
            .record(
                &msg.sender_username,
                &format!("/cheat {search} {add}"),
                HistoryKind::Telegram,
            )
            .await;

        let mut lines = vec![
            "🎯 **Cheat Applied**".to_owned(),
            String::new(),
            format!("**Search:** `{search}`"),
            format!("**Added:** `{add}`"),
            String::new(),
        ];
        for (name, count) in &per_doc {
            lines.push(format!("• {name}: {count} replacement(s)"));
        }
        lines.push(String::new());
        lines.push(format!(
            "**Total:** {total} replacement(s) in {} document(s)",
            per_doc.len()
        ));
        Ok(lines.join("\n"))
    }

    async fn toggle(&self) -> Result<String> {
        let ws = &self.bridge.workspace;
        let doc = ws
            .active_document()
            .await
            .ok_or_else(|| anyhow!("No active document"))?;
        let looks_like_chat = document_looks_like_chat(&doc).is_chat();
        match self
            .bridge
            .sessions
            .toggle(&session_key(&doc.uri), looks_like_chat)
            .await
        {
            Toggle::Enabled => {
                ws.notify(&format!("Chat bridge enabled for {}", doc.name)).await;
                Ok(format!("✅ Bridge enabled for **{}**", doc.name))
            }
            Toggle::Disabled => {
                ws.notify(&format!("Chat bridge disabled for {}", doc.name)).await;
                Ok(format!("⏸️ Bridge disabled for **{}**", doc.name))
            }
            Toggle::NotAChat => bail!("{} does not look like an AI chat", doc.name),
        }
    }

    async fn send_buffered(&self) -> String {
        let sent = match &self.bridge.capture {
            Some(capture) => capture.send_current_response().await,
            None => false,
        };
        if sent {
            "✅ Buffered AI response sent".to_owned()
        } else {
            "ℹ️ No AI response is waiting to be sent".to_owned()
        }
    }

    async fn plugin(&self, msg: &Inbound, name: &str, args: &[String]) -> String {
        if name.is_empty() || !self.bridge.plugins.has_command(name).await {
            return format!("❓ Unknown command: /{name}. Use /help to see available commands.");
        }
        let caller = Caller {
            username: msg.sender_username.clone(),
            channel_id: msg.channel_id,
            is_authorized: self.bridge.config.is_authorized(&msg.sender_username),
            is_admin: self.bridge.config.is_admin(&msg.sender_username),
        };
        self.bridge
            .plugins
            .execute(name, args, &caller)
            .await
            .render()
    }

    /// Plain text: bind the sender to the primary session, then hand the
    /// message to the matching chat document, or to a notification when no
    /// session is enabled.
    async fn plain(&self, msg: &Inbound, text: &str) -> Result<String> {
        let user = msg.sender_username.as_str();
        if text.is_empty() {
            bail!("Empty message");
        }
        let claim = self
            .bridge
            .sessions
            .claim(self.bridge.config.routing, msg.channel_id, user)
            .await;
        if let Claim::Refused { owner, .. } = &claim {
            return Ok(format!(
                "⛔ The AI chat is currently bound to @{owner}. Ask them to disable the bridge first."
            ));
        }

        self.bridge
            .history
            .record(user, text, HistoryKind::Telegram)
            .await;

        let ws = &self.bridge.workspace;
        let line = format!("[Telegram] @{user}: {text}");
        match claim {
            Claim::Bound { chat_id } => {
                if let Err(e) = self.append_to_chat(&chat_id, &line).await {
                    warn!(chat = %chat_id, error = %format!("{e:#}"), "Injection failed; using clipboard");
                    if let Err(e) = ws.write_clipboard(&line).await {
                        warn!(error = %format!("{e:#}"), "Clipboard write failed");
                    }
                    ws.notify(&format!(
                        "📱 Telegram message from @{user} copied to the clipboard"
                    ))
                    .await;
                }
            }
            Claim::NoSession | Claim::Refused { .. } => {
                ws.notify(&format!("📱 Telegram message from @{user}: {text}"))
                    .await;
            }
        }
        Ok(PLAIN_ACK.to_owned())
    }

    /// Appends `line` to the end of the open document backing `chat_id`.
    async fn append_to_chat(&self, chat_id: &str, line: &str) -> Result<()> {
        let ws = &self.bridge.workspace;
        let doc = ws
            .open_documents()
            .await
            .into_iter()
            .find(|d| session_key(&d.uri) == chat_id)
            .ok_or_else(|| anyhow!("chat document for {chat_id} is not open"))?;
        let separator = if doc.text.is_empty() || doc.text.ends_with('\n') {
            ""
        } else {
            "\n"
        };
        ws.insert(&doc.uri, doc.text.len(), &format!("{separator}{line}\n"))
            .await
            .with_context(|| format!("appending to {}", doc.name))?;
        info!(chat = chat_id, document = %doc.name, "Message routed to chat");
        Ok(())
    }
}
