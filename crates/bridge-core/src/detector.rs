//! Heuristics deciding whether a document is an AI chat transcript, and
//! pulling the latest assistant turn out of one.
//!
//! Everything here is best effort. False positives and negatives are
//! expected; callers only rely on the classification being deterministic.

use crate::workspace::Document;

/// Substrings that mark a chat transcript or an assistant turn.
const CONTENT_MARKERS: &[&str] = &[
    "User:",
    "Assistant:",
    "AI:",
    "Cursor AI",
    "AI Chat",
    "Chat History",
    "Conversation History",
    "@username",
];

/// Substrings of a lowercased file name that suggest a chat surface.
const NAME_SUBSTRINGS: &[&str] = &["chat", "conversation", "cursor", "message"];

/// Matched only as a whole token of the file name, so `main.rs` or
/// `domain.ts` do not count as chats.
const NAME_TOKENS: &[&str] = &["ai"];

const CHAT_SCHEMES: &[&str] = &["vscode-webview"];

const AI_TURN_MARKERS: &[&str] = &["Assistant:", "AI:", "🤖"];
/// `[Telegram]` starts the lines the bridge itself appends for a remote user.
const USER_TURN_MARKERS: &[&str] = &["User:", "@", "[Telegram]"];

const CODE_EXTENSIONS: &[&str] = &[
    ".js", ".ts", ".jsx", ".tsx", ".py", ".java", ".cpp", ".c", ".cs", ".php", ".rb", ".go",
    ".rs", ".swift", ".kt", ".scala", ".html", ".css", ".scss", ".sass", ".json", ".xml",
    ".yaml", ".yml", ".md",
];

/// What made a document look like a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    ContentMarker(&'static str),
    NameToken(&'static str),
    Scheme(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityHints<'a> {
    pub name: &'a str,
    pub scheme: &'a str,
}

impl<'a> From<&'a Document> for IdentityHints<'a> {
    fn from(doc: &'a Document) -> Self {
        Self {
            name: &doc.name,
            scheme: &doc.scheme,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Detection {
    pub signal: Option<Signal>,
}

impl Detection {
    #[must_use]
    pub const fn is_chat(&self) -> bool {
        self.signal.is_some()
    }
}

/// Classifies `text` as chat-like. Content markers are checked first, then
/// the file name, then the URI scheme; the first hit is reported.
#[must_use]
pub fn looks_like_chat(text: &str, hints: &IdentityHints<'_>) -> Detection {
    let signal = content_signal(text)
        .or_else(|| name_signal(hints.name))
        .or_else(|| scheme_signal(hints.scheme));
    if let Some(signal) = signal {
        tracing::debug!(name = hints.name, ?signal, "document classified as chat");
    }
    Detection { signal }
}

#[must_use]
pub fn document_looks_like_chat(doc: &Document) -> Detection {
    looks_like_chat(&doc.text, &IdentityHints::from(doc))
}

fn content_signal(text: &str) -> Option<Signal> {
    CONTENT_MARKERS
        .iter()
        .find(|m| text.contains(**m))
        .map(|m| Signal::ContentMarker(*m))
}

fn name_signal(name: &str) -> Option<Signal> {
    let lower = name.to_lowercase();
    if let Some(hit) = NAME_SUBSTRINGS.iter().find(|s| lower.contains(*s)) {
        return Some(Signal::NameToken(*hit));
    }
    lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .find_map(|token| NAME_TOKENS.iter().find(|t| **t == token))
        .map(|t| Signal::NameToken(*t))
}

fn scheme_signal(scheme: &str) -> Option<Signal> {
    CHAT_SCHEMES
        .iter()
        .find(|s| **s == scheme)
        .map(|s| Signal::Scheme(*s))
}

/// Returns the most recent assistant turn: the last line starting with an
/// AI-turn marker plus the lines following it, up to a user-turn marker or
/// a blank line.
#[must_use]
pub fn extract_latest_reply(text: &str) -> Option<String> {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let start = lines
        .iter()
        .rposition(|line| AI_TURN_MARKERS.iter().any(|m| line.starts_with(m)))?;

    let mut reply = vec![lines[start]];
    reply.extend(
        lines[start + 1..]
            .iter()
            .take_while(|line| {
                !line.is_empty() && !USER_TURN_MARKERS.iter().any(|m| line.starts_with(m))
            })
            .copied(),
    );
    let joined = reply.join("\n");
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

#[must_use]
pub fn is_code_file(name: &str) -> bool {
    let lower = name.to_lowercase();
    CODE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Session key for a document URI.
#[must_use]
pub fn session_key(uri: &str) -> String {
    format!("chat_{uri}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hints<'a>(name: &'a str, scheme: &'a str) -> IdentityHints<'a> {
        IdentityHints { name, scheme }
    }

    #[test]
    fn content_markers_win_and_are_reported() {
        let d = looks_like_chat("User: hi\nAssistant: hello", &hints("notes.txt", "file"));
        assert!(d.is_chat());
        assert_eq!(d.signal, Some(Signal::ContentMarker("User:")));
    }

    #[test]
    fn file_name_tokens() {
        let d = looks_like_chat("", &hints("Team-Chat.md", "file"));
        assert_eq!(d.signal, Some(Signal::NameToken("chat")));

        let d = looks_like_chat("", &hints("ai-session.txt", "file"));
        assert_eq!(d.signal, Some(Signal::NameToken("ai")));

        assert!(!looks_like_chat("fn main() {}", &hints("main.rs", "file")).is_chat());
        assert!(!looks_like_chat("", &hints("domain.ts", "file")).is_chat());
    }

    #[test]
    fn webview_scheme_counts() {
        let d = looks_like_chat("", &hints("panel", "vscode-webview"));
        assert_eq!(d.signal, Some(Signal::Scheme("vscode-webview")));
    }

    #[test]
    fn extracts_last_assistant_turn() {
        let text = "User: first\nAssistant: old answer\n\nUser: second\nAssistant: new answer\nwith detail\n\nUser: next";
        assert_eq!(
            extract_latest_reply(text).as_deref(),
            Some("Assistant: new answer\nwith detail")
        );
    }

    #[test]
    fn injected_remote_message_ends_the_reply() {
        let text = "User: hi\nAI: answer\n[Telegram] @alice: next q\n";
        assert_eq!(extract_latest_reply(text).as_deref(), Some("AI: answer"));
    }

    #[test]
    fn reply_stops_at_user_marker() {
        let text = "🤖 Sure thing\n@alice thanks";
        assert_eq!(extract_latest_reply(text).as_deref(), Some("🤖 Sure thing"));
    }

    #[test]
    fn no_marker_means_no_reply() {
        assert!(extract_latest_reply("User: hello\nstill me").is_none());
        assert!(extract_latest_reply("").is_none());
    }

    #[test]
    fn code_extensions() {
        assert!(is_code_file("src/lib.RS"));
        assert!(is_code_file("README.md"));
        assert!(!is_code_file("notes.txt"));
    }
}
