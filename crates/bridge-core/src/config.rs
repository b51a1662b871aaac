use std::{fs, path::Path};

use anyhow::{Context as _, Result, anyhow};
use serde::{Deserialize, Serialize};

use plugin_core::PluginSpec;

const MAX_USERNAME_LEN: usize = 32;

/// Top-level YAML configuration of the bridge.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub routing: RoutingPolicy,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub terminal: TerminalConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub plugins: Vec<PluginSpec>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub authorized_users: Vec<String>,
    #[serde(default = "default_max_users")]
    pub max_users: usize,
    /// Users allowed to run admin-only plugin commands.
    #[serde(default)]
    pub admins: Vec<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            authorized_users: Vec::new(),
            max_users: default_max_users(),
            admins: Vec::new(),
        }
    }
}

const fn default_max_users() -> usize {
    10
}

/// Who owns the reply target of the primary chat session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingPolicy {
    /// The first sender keeps the session until it is disabled.
    #[default]
    Exclusive,
    /// Every inbound message retargets the session to its sender.
    LastWriterWins,
}

impl RoutingPolicy {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Exclusive => "exclusive",
            Self::LastWriterWins => "last writer wins",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    #[serde(default = "default_quiescence_ms")]
    pub quiescence_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            quiescence_ms: default_quiescence_ms(),
        }
    }
}

const fn default_quiescence_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TerminalConfig {
    #[serde(default = "enabled_true")]
    pub enabled: bool,
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,
    #[serde(default = "default_blocked_commands")]
    pub blocked_commands: Vec<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub working_directory: Option<String>,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_commands: default_allowed_commands(),
            blocked_commands: default_blocked_commands(),
            timeout_ms: default_timeout_ms(),
            working_directory: None,
        }
    }
}

const fn enabled_true() -> bool {
    true
}

const fn default_timeout_ms() -> u64 {
    30_000
}

fn default_allowed_commands() -> Vec<String> {
    [
        "ls", "pwd", "whoami", "date", "uptime", "df", "ps", "cat", "head", "tail", "grep",
        "find", "du", "free", "git", "npm", "node", "python", "python3", "java", "docker",
        "kubectl", "aws", "gcloud", "cargo",
    ]
    .map(str::to_owned)
    .to_vec()
}

fn default_blocked_commands() -> Vec<String> {
    [
        "rm", "del", "format", "shutdown", "reboot", "halt", "poweroff", "init", "killall",
        "pkill", "kill", "sudo", "su", "chmod", "chown", "chgrp",
    ]
    .map(str::to_owned)
    .to_vec()
}

/// Files the file-backed workspace keeps open.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub files: Vec<String>,
    /// The document treated as focused. Defaults to the first file.
    #[serde(default)]
    pub active: Option<String>,
    /// Enable the bridge automatically on a chat-like active document.
    #[serde(default)]
    pub auto_enable: bool,
}

impl BridgeConfig {
    /// Every problem with the Telegram section, in a user-readable form.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let tg = &self.telegram;
        let mut errors = Vec::new();

        if tg.bot_token.trim().is_empty() {
            errors.push("Bot token is required".to_owned());
        }
        if tg.authorized_users.is_empty() {
            errors.push("At least one authorized user is required".to_owned());
        }
        if tg.authorized_users.len() > tg.max_users {
            errors.push(format!(
                "Number of authorized users ({}) exceeds maximum ({})",
                tg.authorized_users.len(),
                tg.max_users
            ));
        }
        for username in &tg.authorized_users {
            if username.trim().is_empty() {
                errors.push("Username cannot be empty".to_owned());
            } else if username.len() > MAX_USERNAME_LEN {
                errors.push(format!(
                    "Username \"{username}\" is too long (max {MAX_USERNAME_LEN} characters)"
                ));
            } else if !username
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                errors.push(format!("Username \"{username}\" contains invalid characters"));
            }
        }
        errors
    }

    #[must_use]
    pub fn has_valid_configuration(&self) -> bool {
        !self.telegram.bot_token.is_empty() && !self.telegram.authorized_users.is_empty()
    }

    #[must_use]
    pub fn is_authorized(&self, username: &str) -> bool {
        self.telegram.authorized_users.iter().any(|u| u == username)
    }

    #[must_use]
    pub fn is_admin(&self, username: &str) -> bool {
        self.telegram.admins.iter().any(|u| u == username)
    }
}

/// Telegram tokens look like `<digits>:<secret>` and are about 46 chars long.
#[must_use]
pub fn is_valid_bot_token(token: &str) -> bool {
    token.len() >= 40 && token.starts_with(|c: char| c.is_ascii_digit())
}

pub fn load_config(path: &Path) -> Result<BridgeConfig> {
    if !path.exists() {
        return Err(anyhow!(
            "config file not found at {}. Create one or set --config",
            path.display()
        ));
    }
    let yaml = fs::read_to_string(path)
        .with_context(|| format!("reading config file at {}", path.display()))?;
    let cfg: BridgeConfig = serde_yaml::from_str(&yaml).context("parsing YAML config")?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    const TOKEN: &str = "123456789:AAFakeTokenForTestsOnly0123456789abcdef";

    #[test]
    fn defaults_fill_missing_sections() {
        let cfg: BridgeConfig = serde_yaml::from_str("telegram:\n  bot_token: x\n").unwrap();
        assert_eq!(cfg.telegram.max_users, 10);
        assert_eq!(cfg.routing, RoutingPolicy::Exclusive);
        assert_eq!(cfg.capture.quiescence_ms, 5000);
        assert_eq!(cfg.terminal.timeout_ms, 30_000);
        assert!(cfg.terminal.allowed_commands.iter().any(|c| c == "ls"));
        assert!(cfg.plugins.is_empty());
    }

    #[test]
    fn validate_reports_every_problem() {
        let mut cfg = BridgeConfig::default();
        let errors = cfg.validate();
        assert_eq!(
            errors,
            [
                "Bot token is required",
                "At least one authorized user is required"
            ]
        );

        cfg.telegram.bot_token = TOKEN.to_owned();
        cfg.telegram.max_users = 2;
        cfg.telegram.authorized_users = vec![
            "alice".to_owned(),
            "bad name".to_owned(),
            "x".repeat(33),
        ];
        let errors = cfg.validate();
        assert_eq!(errors.len(), 3, "{errors:?}");
        assert!(errors[0].starts_with("Number of authorized users (3)"));
        assert!(errors[1].contains("invalid characters"));
        assert!(errors[2].contains("too long"));
    }

    #[test]
    fn token_shape() {
        assert!(is_valid_bot_token(TOKEN));
        assert!(!is_valid_bot_token("short"));
        assert!(!is_valid_bot_token(&"a".repeat(45)));
    }

    #[test]
    fn load_config_reads_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "telegram:\n  bot_token: \"{TOKEN}\"\n  authorized_users: [alice]\n  admins: [alice]\nrouting: last_writer_wins\nplugins:\n  - id: weather\n    enabled: false\n"
        )
        .unwrap();

        let cfg = load_config(file.path()).unwrap();
        assert!(cfg.is_authorized("alice"));
        assert!(!cfg.is_authorized("mallory"));
        assert!(cfg.is_admin("alice"));
        assert_eq!(cfg.routing, RoutingPolicy::LastWriterWins);
        assert!(!cfg.plugins[0].enabled);
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }
}
