//! Markdown replies sent back over the chat transport.
//!
//! Every formatter returns the full reply body; [`truncate_reply`] is applied
//! by the router before anything is handed to the transport.

use core::time::Duration;

use time::{OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};

use plugin_core::PluginEntry;

use crate::{
    config::{BridgeConfig, RoutingPolicy, is_valid_bot_token},
    context::ContextSizeInfo,
    detector::{document_looks_like_chat, is_code_file},
    history::{HistoryEntry, HistoryKind},
    sessions::ChatSession,
    terminal::TerminalResult,
    workspace::Document,
};

pub const MAX_REPLY_LEN: usize = 4000;
pub const TRUNCATION_MARKER: &str = "\n\n... (response truncated due to length)";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const TIMESTAMP: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC");

/// Caps `text` at [`MAX_REPLY_LEN`] characters, appending the truncation
/// marker when anything was cut.
#[must_use]
pub fn truncate_reply(text: &str) -> String {
    match text.char_indices().nth(MAX_REPLY_LEN) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &text[..cut]),
        None => text.to_owned(),
    }
}

#[must_use]
pub fn format_time_ago(then: OffsetDateTime, now: OffsetDateTime) -> String {
    let minutes = (now - then).whole_minutes();
    match minutes {
        m if m < 1 => "Just now".to_owned(),
        m if m < 60 => format!("{m}m ago"),
        m if m < 1440 => format!("{}h ago", m / 60),
        m => format!("{}d ago", m / 1440),
    }
}

#[must_use]
pub fn format_timestamp(ts: OffsetDateTime) -> String {
    ts.format(TIMESTAMP).unwrap_or_else(|_| ts.to_string())
}

#[must_use]
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

fn yes_no(flag: bool, yes: &str, no: &str) -> String {
    if flag {
        format!("✅ {yes}")
    } else {
        format!("❌ {no}")
    }
}

fn shorten(message: &str, max: usize) -> String {
    if message.chars().count() <= max {
        message.to_owned()
    } else {
        format!("{}...", plugin_core::truncate(message, max))
    }
}

#[must_use]
pub fn help() -> String {
    [
        "🤖 **Chat Bridge Help & Commands**",
        "",
        "**📱 Basic Commands**",
        "• `/help` - Show this help message",
        "• `/usage` - Show detailed usage examples",
        "• `/version` - Show version information",
        "• `/context_size` - Check AI context usage",
        "• `/terminal <command>` - Execute terminal commands",
        "• `/history` - View the last 10 messages",
        "• `/tabs` - List open documents and chat tabs",
        "• `/msg <message>` - Insert a message into the active chat",
        "• `/msgactive <message>` - Insert a message and move the cursor after it",
        "",
        "**🔧 Setup Commands**",
        "• `/status` - Check bridge and session status",
        "• `/config` - Show current configuration",
        "• `/users` - List authorized users",
        "• `/info cursor_ai` - Chat routing diagnostics",
        "",
        "**🎯 Advanced Commands**",
        "• `/cheat <search> <add>` - Find text and add content after it",
        "• `/plugins` - List plugins and their commands",
        "",
        "**💬 Chat Integration**",
        "• Send any message without a leading `/` to forward it to the AI chat",
        "• The AI reply is sent back here once it stops changing",
        "• `/toggle` - Enable or disable the bridge for the active chat",
        "• `/send` - Relay the buffered AI reply right away",
        "",
        "Need more details? Use `/usage` for examples! 🚀",
    ]
    .join("\n")
}

#[must_use]
pub fn usage() -> String {
    [
        "📚 **Chat Bridge Usage Examples**",
        "",
        "**🔍 Context Monitoring**",
        "`/context_size`",
        "→ Check the AI context usage of the active chat",
        "→ Get warnings when usage is high",
        "",
        "**📑 Tab Management**",
        "`/tabs`",
        "→ List open documents, chat tabs first",
        "",
        "**💬 Direct Messaging**",
        "`/msg Can you help me with this code?`",
        "→ Inserted at the cursor of the active chat document",
        "`/msgactive Hello there`",
        "→ Same, and the cursor moves past the message",
        "",
        "**🖥️ Terminal Commands**",
        "`/terminal ls -la`",
        "`/terminal git status`",
        "→ Only allowlisted commands run, with a timeout",
        "",
        "**🎯 Advanced Commands**",
        "`/cheat TODO (done)`",
        "→ Appends \"(done)\" after every \"TODO\" in open documents",
        "`/calc 2^8` or `/convert 32 F to C`",
        "→ Plugin commands, see `/plugins`",
        "",
        "**⚡ Workflow**",
        "1. `/context_size` - Check available space",
        "2. Send a plain message - it lands in the AI chat",
        "3. Wait for the reply - it is relayed back automatically",
        "",
        "Need help? Use `/help` for the command reference! 📖",
    ]
    .join("\n")
}

/// Everything `/status` reports.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub sessions_total: usize,
    pub sessions_enabled: usize,
    pub terminal_enabled: bool,
    pub context_available: bool,
    pub plugins: usize,
    pub uptime: Duration,
    pub last_activity: Option<OffsetDateTime>,
    pub now: OffsetDateTime,
}

#[must_use]
pub fn status(s: &StatusSnapshot) -> String {
    let last_activity = s
        .last_activity
        .map_or_else(|| "None yet".to_owned(), |t| format_time_ago(t, s.now));
    let mut lines = vec![
        "🔍 **Chat Bridge Status Report**".to_owned(),
        String::new(),
        "**🤖 Bridge Status**".to_owned(),
        "• **Running**: ✅ Yes".to_owned(),
        format!("• **Version**: v{VERSION}"),
        format!("• **Report Time**: {}", format_timestamp(s.now)),
        String::new(),
        "**💬 Chat Sessions**".to_owned(),
        format!("• **Total Sessions**: {}", s.sessions_total),
        format!("• **Bridge Enabled**: {}", s.sessions_enabled),
        format!(
            "• **Terminal Commands**: {}",
            yes_no(s.terminal_enabled, "Enabled", "Disabled")
        ),
        format!(
            "• **Context Monitoring**: {}",
            yes_no(s.context_available, "Available", "Not Available")
        ),
        format!("• **Plugins**: {}", s.plugins),
        String::new(),
        "**💚 System Health**".to_owned(),
        format!("• **Uptime**: {}", format_uptime(s.uptime)),
        format!("• **Last Activity**: {last_activity}"),
        String::new(),
        "**📊 Status Summary**".to_owned(),
    ];
    if s.sessions_enabled > 0 {
        lines.push("🟢 **All Systems Operational**".to_owned());
        lines.push("Messages are routed to the enabled chat.".to_owned());
    } else {
        lines.push("🟡 **No Chat Enabled**".to_owned());
        lines.push("Plain messages fall back to local notifications.".to_owned());
    }
    lines.join("\n")
}

#[must_use]
pub fn config(cfg: &BridgeConfig) -> String {
    let tg = &cfg.telegram;
    let users = tg.authorized_users.len();
    let mut lines = vec![
        "⚙️ **Chat Bridge Configuration**".to_owned(),
        String::new(),
        "**🤖 Bot Configuration**".to_owned(),
        format!(
            "• **Bot Token**: {}",
            yes_no(!tg.bot_token.is_empty(), "Configured", "Not Configured")
        ),
        format!("• **Token Length**: {} characters", tg.bot_token.len()),
        format!(
            "• **Token Valid**: {}",
            yes_no(is_valid_bot_token(&tg.bot_token), "Yes", "No")
        ),
        String::new(),
        "**👥 User Configuration**".to_owned(),
        format!("• **Authorized Users**: {users}"),
        format!("• **Maximum Users**: {}", tg.max_users),
        format!(
            "• **User Limit**: {}",
            if users >= tg.max_users {
                "⚠️ Reached"
            } else {
                "✅ Available"
            }
        ),
        String::new(),
        "**📋 Authorized Users**".to_owned(),
    ];
    if tg.authorized_users.is_empty() {
        lines.push("• No users configured yet".to_owned());
    } else {
        lines.extend(
            tg.authorized_users
                .iter()
                .enumerate()
                .map(|(i, u)| format!("• {}. @{u}", i + 1)),
        );
    }
    lines.extend([
        String::new(),
        "**🔀 Routing**".to_owned(),
        format!("• **Policy**: {}", cfg.routing.label()),
        format!("• **Quiescence**: {}ms", cfg.capture.quiescence_ms),
        format!(
            "• **Terminal**: {} (timeout {}ms)",
            yes_no(cfg.terminal.enabled, "Enabled", "Disabled"),
            cfg.terminal.timeout_ms
        ),
    ]);
    let problems = cfg.validate();
    if !problems.is_empty() {
        lines.push(String::new());
        lines.push("**💡 Configuration Problems**".to_owned());
        lines.extend(problems.into_iter().map(|p| format!("• {p}")));
    }
    lines.join("\n")
}

#[must_use]
pub fn users(cfg: &BridgeConfig, sessions: &[ChatSession], now: OffsetDateTime) -> String {
    let tg = &cfg.telegram;
    let slots = tg.max_users.saturating_sub(tg.authorized_users.len());
    let mut lines = vec![
        "👥 **Chat Bridge Authorized Users**".to_owned(),
        String::new(),
        "**📊 User Summary**".to_owned(),
        format!("• **Total Users**: {}", tg.authorized_users.len()),
        format!("• **Maximum Allowed**: {}", tg.max_users),
        format!("• **Available Slots**: {slots}"),
        format!("• **Active Sessions**: {}", sessions.len()),
        String::new(),
        "**📋 User Details**".to_owned(),
    ];
    if tg.authorized_users.is_empty() {
        lines.push("• No authorized users configured yet".to_owned());
    }
    for (i, user) in tg.authorized_users.iter().enumerate() {
        let session = sessions
            .iter()
            .find(|s| s.external_username.as_deref() == Some(user.as_str()));
        let role = if cfg.is_admin(user) { " (admin)" } else { "" };
        lines.push(format!("**{}. @{user}**{role}", i + 1));
        match session {
            Some(s) => {
                lines.push("   • Status: 🟢 Routing".to_owned());
                lines.push(format!(
                    "   • Last Activity: {}",
                    format_time_ago(s.last_message_time, now)
                ));
                lines.push(format!(
                    "   • Chat ID: {}",
                    s.external_chat_id
                        .map_or_else(|| "N/A".to_owned(), |id| id.to_string())
                ));
            }
            None => lines.push("   • Status: ⚪ Idle".to_owned()),
        }
    }
    lines.join("\n")
}

#[must_use]
pub fn history(entries: &[HistoryEntry], capacity: usize, now: OffsetDateTime) -> String {
    let mut lines = vec![
        format!("📚 **Message History (Last {capacity} Messages)**"),
        String::new(),
    ];
    if entries.is_empty() {
        lines.push("📭 **No messages in history yet**".to_owned());
        lines.push("• Send some messages to start building history".to_owned());
        return lines.join("\n");
    }

    let count = |kind: HistoryKind| entries.iter().filter(|e| e.kind == kind).count();
    lines.extend([
        "📊 **History Summary**".to_owned(),
        format!("• **Total Messages**: {}", entries.len()),
        format!("• **Telegram Messages**: {}", count(HistoryKind::Telegram)),
        format!("• **AI Responses**: {}", count(HistoryKind::AiResponse)),
        String::new(),
        "📝 **Recent Messages**".to_owned(),
    ]);
    for (i, entry) in entries.iter().enumerate().rev() {
        lines.push(format!(
            "**{}. {} {}**",
            i + 1,
            entry.kind.icon(),
            entry.kind.label()
        ));
        lines.push(format!("   • **From**: @{}", entry.username));
        lines.push(format!(
            "   • **Time**: {}",
            format_time_ago(entry.timestamp, now)
        ));
        lines.push(format!("   • **Message**: {}", shorten(&entry.message, 100)));
        lines.push(String::new());
    }
    if entries.len() >= capacity {
        lines.push(format!(
            "💡 History is full ({capacity} messages); new messages replace the oldest."
        ));
    } else {
        lines.push(format!(
            "💡 {} more messages until history is full.",
            capacity - entries.len()
        ));
    }
    lines.join("\n")
}

#[must_use]
pub fn tabs(documents: &[Document], active_uri: Option<&str>) -> String {
    let mut lines = vec!["📑 **Open Tabs**".to_owned(), String::new()];
    if documents.is_empty() {
        lines.push("📭 **No open tabs found**".to_owned());
        return lines.join("\n");
    }

    let active_name = active_uri
        .and_then(|uri| documents.iter().find(|d| d.uri == uri))
        .map_or("None", |d| d.name.as_str());
    lines.extend([
        "📊 **Tabs Summary**".to_owned(),
        format!("• **Total Open Tabs**: {}", documents.len()),
        format!("• **Active Tab**: {active_name}"),
        String::new(),
    ]);

    let (chats, rest): (Vec<&Document>, Vec<&Document>) = documents
        .iter()
        .partition(|d| document_looks_like_chat(d).is_chat());
    let (code, other): (Vec<&Document>, Vec<&Document>) =
        rest.into_iter().partition(|d| is_code_file(&d.name));
    let is_active = |d: &Document| active_uri == Some(d.uri.as_str());
    let status = |d: &Document| if is_active(d) { "Active" } else { "Open" };

    if !chats.is_empty() {
        lines.push(format!("💬 **Message Tabs ({})**", chats.len()));
        for (i, &d) in chats.iter().enumerate() {
            let icon = if is_active(d) { "🎯" } else { "📝" };
            lines.push(format!("{icon} **{}. {}**", i + 1, d.name));
            lines.push(format!("   • **Path**: `{}`", d.uri));
            lines.push(format!("   • **Status**: {}", status(d)));
            lines.push(format!("   • **Lines**: {}", d.line_count()));
        }
        lines.push(String::new());
    }
    if !code.is_empty() {
        lines.push(format!("💻 **Code Files ({})**", code.len()));
        for (i, &d) in code.iter().take(5).enumerate() {
            let icon = if is_active(d) { "🎯" } else { "📄" };
            lines.push(format!("{icon} **{}. {}**", i + 1, d.name));
            lines.push(format!("   • **Extension**: `.{}`", d.extension()));
            lines.push(format!("   • **Status**: {}", status(d)));
            lines.push(format!("   • **Lines**: {}", d.line_count()));
        }
        if code.len() > 5 {
            lines.push(format!("   ... and {} more code files", code.len() - 5));
        }
        lines.push(String::new());
    }
    if !other.is_empty() {
        lines.push(format!("📋 **Other Files ({})**", other.len()));
        for (i, &d) in other.iter().take(3).enumerate() {
            let icon = if is_active(d) { "🎯" } else { "📋" };
            lines.push(format!("{icon} **{}. {}**", i + 1, d.name));
            lines.push(format!("   • **Status**: {}", status(d)));
            lines.push(format!("   • **Lines**: {}", d.line_count()));
        }
        if other.len() > 3 {
            lines.push(format!("   ... and {} more files", other.len() - 3));
        }
        lines.push(String::new());
    }
    if chats.is_empty() {
        lines.push("💡 No message tabs found; chat tabs contain lines like `User:` and `Assistant:`".to_owned());
    } else {
        lines.push("💡 Active tab is marked with 🎯".to_owned());
    }
    lines.join("\n")
}

#[must_use]
pub fn terminal_result(r: &TerminalResult) -> String {
    let mut lines = vec![
        "🖥️ **Terminal Command Result**".to_owned(),
        String::new(),
        format!("**Command:** `{}`", r.command),
        format!(
            "**Status:** {}",
            if r.success { "✅ Success" } else { "❌ Failed" }
        ),
        format!("**Exit Code:** {}", r.exit_code),
        format!("**Execution Time:** {}ms", r.execution_time_ms),
    ];
    if !r.output.is_empty() {
        lines.push(String::new());
        lines.push(format!("**Output:**\n```\n{}\n```", r.output));
    }
    if !r.error.is_empty() {
        lines.push(String::new());
        lines.push(format!("**Error:**\n```\n{}\n```", r.error));
    }
    lines.join("\n")
}

/// Renders `percentage` as a 20-segment bar.
#[must_use]
pub fn usage_bar(percentage: f64) -> String {
    const SEGMENTS: usize = 20;
    let filled = (percentage.clamp(0.0, 100.0) / 5.0).round();
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "clamped to 0..=20"
    )]
    let filled = filled as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(SEGMENTS - filled))
}

#[must_use]
pub fn context_size(info: &ContextSizeInfo) -> String {
    let pct = info.percentage;
    let (level, advice, tips): (&str, String, &[&str]) = if pct >= 80.0 {
        (
            "⚠️ **High Usage Warning**",
            format!("Your context is {pct}% full. Consider clearing some context or starting a new chat."),
            &[
                "• Start a new chat to reset context",
                "• Remove unnecessary files from context",
                "• Clear chat history if possible",
            ],
        )
    } else if pct >= 60.0 {
        (
            "🟡 **Moderate Usage**",
            format!("Your context is {pct}% full. You still have room for more conversation."),
            &[
                "• You can continue the conversation",
                "• Monitor usage as you chat",
            ],
        )
    } else {
        (
            "🟢 **Low Usage**",
            format!("Your context is only {pct}% full. Plenty of room for more conversation!"),
            &[
                "• You have plenty of context space",
                "• Feel free to add more files or continue chatting",
            ],
        )
    };
    let mut lines = vec![
        "📊 **Context Size Information**".to_owned(),
        String::new(),
        format!("**Current Usage:** {pct}%"),
        format!("**Source:** {}", info.source),
        format!("**Detected:** {}", format_timestamp(info.timestamp)),
        String::new(),
        level.to_owned(),
        advice,
        String::new(),
        "**Usage Bar:**".to_owned(),
        format!("`{}` {pct}%", usage_bar(pct)),
        String::new(),
        "**💡 Tips:**".to_owned(),
    ];
    lines.extend(tips.iter().map(|t| (*t).to_owned()));
    lines.join("\n")
}

#[must_use]
pub fn version() -> String {
    [
        "🤖 **Chat Bridge Version Information**".to_owned(),
        String::new(),
        format!("**📱 Current Version**: v{VERSION}"),
        "**🔧 Platform**: Telegram bridge for editor AI chats".to_owned(),
        String::new(),
        "**🚀 Use /help for all available commands**".to_owned(),
        "**📚 Use /usage for detailed examples**".to_owned(),
    ]
    .join("\n")
}

/// Everything `/info cursor_ai` reports.
#[derive(Debug, Clone)]
pub struct RoutingInfo<'a> {
    pub sessions: &'a [ChatSession],
    pub routing: RoutingPolicy,
    pub config_valid: bool,
    pub last_activity: Option<OffsetDateTime>,
    pub now: OffsetDateTime,
}

#[must_use]
pub fn cursor_info(info: &RoutingInfo<'_>) -> String {
    let enabled: Vec<&ChatSession> = info.sessions.iter().filter(|s| s.enabled).collect();
    let routed = enabled.iter().any(|s| s.has_routing_target());
    let last = info
        .last_activity
        .map_or_else(|| "None yet".to_owned(), |t| format_time_ago(t, info.now));
    let mut lines = vec![
        "🤖 **AI Chat Information**".to_owned(),
        String::new(),
        "**📊 Chat Status**".to_owned(),
        format!("• **Total Chat Sessions**: {}", info.sessions.len()),
        format!("• **Bridge Enabled**: {}", enabled.len()),
        format!("• **Last Message Time**: {last}"),
        String::new(),
        "**💬 Chat Sessions**".to_owned(),
    ];
    if info.sessions.is_empty() {
        lines.push("• No chat sessions found".to_owned());
        lines.push("• Enable the bridge in an AI chat document".to_owned());
    }
    for (i, s) in info.sessions.iter().enumerate() {
        lines.push(format!("**{}. Chat {}**", i + 1, s.chat_id));
        lines.push(format!(
            "   • Bridge: {}",
            yes_no(s.enabled, "Enabled", "Disabled")
        ));
        lines.push(format!(
            "   • Last Message: {}",
            format_time_ago(s.last_message_time, info.now)
        ));
        lines.push(format!(
            "   • Telegram Chat ID: {}",
            s.external_chat_id
                .map_or_else(|| "N/A".to_owned(), |id| id.to_string())
        ));
        lines.push(format!(
            "   • Username: @{}",
            s.external_username.as_deref().unwrap_or("N/A")
        ));
    }
    lines.extend([
        String::new(),
        "**📱 Message Routing**".to_owned(),
        format!(
            "• **Route Method**: {}",
            if enabled.is_empty() {
                "Fallback Notification"
            } else {
                "Direct Injection"
            }
        ),
        format!("• **Routing Policy**: {}", info.routing.label()),
        format!(
            "• **Response Routing**: {}",
            yes_no(routed, "Configured", "Not Configured")
        ),
        format!(
            "• **Configuration Valid**: {}",
            if info.config_valid { "Yes" } else { "No" }
        ),
        String::new(),
        "**💡 Troubleshooting Tips**".to_owned(),
    ]);
    if enabled.is_empty() {
        lines.push("• **Issue**: No bridge-enabled sessions".to_owned());
        lines.push("• **Solution**: Enable the bridge in an AI chat document".to_owned());
    }
    if !info.config_valid {
        lines.push("• **Issue**: Invalid configuration".to_owned());
        lines.push("• **Solution**: Check bot token and authorized users".to_owned());
    }
    if !enabled.is_empty() && info.config_valid {
        lines.push("• **Status**: All systems operational".to_owned());
        lines.push("• **Action**: Try sending a regular message (not a command)".to_owned());
    }
    lines.join("\n")
}

#[must_use]
pub fn plugin_list(entries: &[PluginEntry]) -> String {
    let mut lines = vec![
        "🔌 **Registered Plugins**".to_owned(),
        String::new(),
    ];
    if entries.is_empty() {
        lines.push("• No plugins registered".to_owned());
    }
    for entry in entries {
        let m = &entry.manifest;
        lines.push(format!("**{}** v{} (`{}`)", m.name, m.version, m.id));
        lines.push(format!("   {}", m.description));
        for cmd in entry.commands.iter() {
            let usage = if cmd.usage.is_empty() {
                format!("/{}", cmd.name)
            } else {
                cmd.usage.clone()
            };
            let admin = if cmd.admin_only { " 🔒" } else { "" };
            lines.push(format!("   • `{usage}` - {}{admin}", cmd.description));
        }
        lines.push(String::new());
    }
    lines.join("\n").trim_end().to_owned()
}

/// Header prepended to a captured AI reply before it is relayed.
#[must_use]
pub fn ai_response(text: &str, username: Option<&str>) -> String {
    match username {
        Some(user) => format!("🤖 **AI Response for @{user}**\n\n{text}"),
        None => format!("🤖 **AI Response**\n\n{text}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn truncation_caps_length_and_marks_it() {
        let long = "x".repeat(5000);
        let out = truncate_reply(&long);
        assert!(out.chars().count() <= MAX_REPLY_LEN + TRUNCATION_MARKER.chars().count());
        assert!(out.ends_with(TRUNCATION_MARKER));

        let short = "hello";
        assert_eq!(truncate_reply(short), short);

        let exact = "é".repeat(MAX_REPLY_LEN);
        assert_eq!(truncate_reply(&exact), exact);
    }

    #[test]
    fn time_ago_buckets() {
        let now = datetime!(2024-05-01 12:00 UTC);
        assert_eq!(format_time_ago(datetime!(2024-05-01 11:59:30 UTC), now), "Just now");
        assert_eq!(format_time_ago(datetime!(2024-05-01 11:45 UTC), now), "15m ago");
        assert_eq!(format_time_ago(datetime!(2024-05-01 09:00 UTC), now), "3h ago");
        assert_eq!(format_time_ago(datetime!(2024-04-28 12:00 UTC), now), "3d ago");
    }

    #[test]
    fn usage_bar_has_twenty_segments() {
        assert_eq!(usage_bar(0.0), "░".repeat(20));
        assert_eq!(usage_bar(100.0), "█".repeat(20));
        let half = usage_bar(50.0);
        assert_eq!(half.chars().filter(|c| *c == '█').count(), 10);
        assert_eq!(half.chars().count(), 20);
    }

    #[test]
    fn context_tips_follow_thresholds() {
        let info = |percentage| ContextSizeInfo {
            percentage,
            source: "content_pattern",
            timestamp: datetime!(2024-05-01 12:00 UTC),
        };
        assert!(context_size(&info(85.0)).contains("High Usage Warning"));
        assert!(context_size(&info(60.0)).contains("Moderate Usage"));
        assert!(context_size(&info(10.0)).contains("Low Usage"));
    }

    #[test]
    fn history_lists_newest_first() {
        let now = datetime!(2024-05-01 12:00 UTC);
        let entries = vec![
            HistoryEntry {
                username: "alice".to_owned(),
                message: "first".to_owned(),
                timestamp: datetime!(2024-05-01 11:00 UTC),
                kind: HistoryKind::Telegram,
            },
            HistoryEntry {
                username: "alice".to_owned(),
                message: "second".to_owned(),
                timestamp: now,
                kind: HistoryKind::AiResponse,
            },
        ];
        let out = history(&entries, 10, now);
        let first = out.find("first").unwrap();
        let second = out.find("second").unwrap();
        assert!(second < first);
        assert!(out.contains("**2. 🤖 AI Response**"));
        assert!(out.contains("1h ago"));
    }

    #[test]
    fn tabs_bucket_documents() {
        let docs = vec![
            Document::new("notes/chat.md", "User: hi"),
            Document::new("src/main.rs", "fn main() {}"),
            Document::new("todo.txt", "milk"),
        ];
        let out = tabs(&docs, Some("src/main.rs"));
        assert!(out.contains("💬 **Message Tabs (1)**"));
        assert!(out.contains("💻 **Code Files (1)**"));
        assert!(out.contains("🎯 **1. main.rs**"));
        assert!(out.contains("📋 **Other Files (1)**"));
    }

    #[test]
    fn ai_response_header() {
        assert_eq!(
            ai_response("hi", Some("alice")),
            "🤖 **AI Response for @alice**\n\nhi"
        );
        assert!(ai_response("hi", None).starts_with("🤖 **AI Response**"));
    }

    fn session(chat_id: &str, target: Option<(i64, &str)>, at: OffsetDateTime) -> ChatSession {
        ChatSession {
            chat_id: chat_id.to_owned(),
            enabled: true,
            last_message_time: at,
            external_chat_id: target.map(|(id, _)| id),
            external_username: target.map(|(_, user)| user.to_owned()),
        }
    }

    fn two_user_config() -> BridgeConfig {
        let mut cfg = BridgeConfig::default();
        cfg.telegram.authorized_users = vec!["alice".to_owned(), "bob".to_owned()];
        cfg.telegram.admins = vec!["alice".to_owned()];
        cfg.telegram.max_users = 2;
        cfg
    }

    #[test]
    fn status_reports_session_counts_and_uptime() {
        let now = datetime!(2024-05-01 12:00 UTC);
        let mut snapshot = StatusSnapshot {
            sessions_total: 3,
            sessions_enabled: 2,
            terminal_enabled: false,
            context_available: true,
            plugins: 2,
            uptime: Duration::from_secs(3725),
            last_activity: Some(datetime!(2024-05-01 11:55 UTC)),
            now,
        };
        let out = status(&snapshot);
        assert!(out.contains("• **Total Sessions**: 3"), "{out}");
        assert!(out.contains("• **Bridge Enabled**: 2"), "{out}");
        assert!(out.contains("• **Terminal Commands**: ❌ Disabled"), "{out}");
        assert!(out.contains("• **Uptime**: 1h 2m 5s"), "{out}");
        assert!(out.contains("• **Last Activity**: 5m ago"), "{out}");
        assert!(out.contains("🟢 **All Systems Operational**"), "{out}");

        snapshot.sessions_enabled = 0;
        snapshot.last_activity = None;
        let out = status(&snapshot);
        assert!(out.contains("• **Last Activity**: None yet"), "{out}");
        assert!(out.contains("🟡 **No Chat Enabled**"), "{out}");
    }

    #[test]
    fn config_shows_user_limit_routing_and_problems() {
        let cfg = two_user_config();
        let out = config(&cfg);
        assert!(out.contains("• **Bot Token**: ❌ Not Configured"), "{out}");
        assert!(out.contains("• **Authorized Users**: 2"), "{out}");
        assert!(out.contains("• **User Limit**: ⚠️ Reached"), "{out}");
        assert!(out.contains("• 2. @bob"), "{out}");
        assert!(out.contains("• **Policy**: exclusive"), "{out}");
        assert!(out.contains("• Bot token is required"), "{out}");

        let mut cfg = two_user_config();
        cfg.telegram.bot_token = format!("1{}", "a".repeat(45));
        cfg.telegram.max_users = 5;
        cfg.routing = RoutingPolicy::LastWriterWins;
        let out = config(&cfg);
        assert!(out.contains("• **Token Valid**: ✅ Yes"), "{out}");
        assert!(out.contains("• **User Limit**: ✅ Available"), "{out}");
        assert!(out.contains("• **Policy**: last writer wins"), "{out}");
        assert!(!out.contains("Configuration Problems"), "{out}");
    }

    #[test]
    fn users_lists_roles_slots_and_routing_state() {
        let now = datetime!(2024-05-01 12:00 UTC);
        let mut cfg = two_user_config();
        cfg.telegram.max_users = 5;
        let sessions = [session(
            "chat_notes/chat.md",
            Some((42, "bob")),
            datetime!(2024-05-01 10:00 UTC),
        )];
        let out = users(&cfg, &sessions, now);
        assert!(out.contains("• **Total Users**: 2"), "{out}");
        assert!(out.contains("• **Available Slots**: 3"), "{out}");
        assert!(out.contains("• **Active Sessions**: 1"), "{out}");
        assert!(out.contains("**1. @alice** (admin)\n   • Status: ⚪ Idle"), "{out}");
        assert!(out.contains("**2. @bob**\n   • Status: 🟢 Routing"), "{out}");
        assert!(out.contains("   • Last Activity: 2h ago"), "{out}");
        assert!(out.contains("   • Chat ID: 42"), "{out}");
    }

    #[test]
    fn cursor_info_describes_sessions_and_routing() {
        let now = datetime!(2024-05-01 12:00 UTC);
        let empty = cursor_info(&RoutingInfo {
            sessions: &[],
            routing: RoutingPolicy::Exclusive,
            config_valid: false,
            last_activity: None,
            now,
        });
        assert!(empty.contains("• No chat sessions found"), "{empty}");
        assert!(empty.contains("• **Route Method**: Fallback Notification"), "{empty}");
        assert!(empty.contains("• **Issue**: Invalid configuration"), "{empty}");

        let sessions = [session("chat_a", Some((7, "alice")), now)];
        let out = cursor_info(&RoutingInfo {
            sessions: &sessions,
            routing: RoutingPolicy::LastWriterWins,
            config_valid: true,
            last_activity: Some(now),
            now,
        });
        assert!(out.contains("• **Bridge Enabled**: 1"), "{out}");
        assert!(out.contains("**1. Chat chat_a**"), "{out}");
        assert!(out.contains("   • Telegram Chat ID: 7"), "{out}");
        assert!(out.contains("   • Username: @alice"), "{out}");
        assert!(out.contains("• **Routing Policy**: last writer wins"), "{out}");
        assert!(out.contains("• **Response Routing**: ✅ Configured"), "{out}");
        assert!(out.contains("• **Status**: All systems operational"), "{out}");
    }
}
