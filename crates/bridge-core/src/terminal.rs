use core::time::Duration;
use std::{process::Stdio, time::Instant};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::TerminalConfig;

const DANGEROUS_PATTERNS: &[&str] = &[
    r"[;&|`$]",
    // `sh -c` treats a newline as a command separator.
    r"[[:cntrl:]]",
    r">\s*/",
    r"rm\s+-rf",
    r"sudo\s+",
    r"chmod\s+777",
    r"chown\s+root",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TerminalResult {
    pub command: String,
    pub success: bool,
    pub exit_code: i32,
    pub execution_time_ms: u64,
    pub output: String,
    pub error: String,
}

impl TerminalResult {
    fn rejected(command: &str, error: impl Into<String>) -> Self {
        Self {
            command: command.to_owned(),
            success: false,
            exit_code: -1,
            execution_time_ms: 0,
            output: String::new(),
            error: error.into(),
        }
    }
}

/// Runs shell commands on behalf of remote users.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    fn is_enabled(&self) -> bool;

    async fn execute(&self, command: &str, username: &str) -> TerminalResult;
}

/// `sh -c` runner guarded by an allowlist, a blocklist and a set of
/// dangerous patterns, with a hard wall-clock timeout.
#[derive(Debug)]
pub struct TerminalRunner {
    config: TerminalConfig,
    dangerous: Vec<Regex>,
}

impl TerminalRunner {
    pub fn new(config: TerminalConfig) -> Result<Self> {
        let dangerous = DANGEROUS_PATTERNS
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("compiling pattern {p}")))
            .collect::<Result<_>>()?;
        Ok(Self { config, dangerous })
    }

    /// Checks `command` against the blocklist, the dangerous patterns and
    /// the allowlist, in that order.
    pub fn validate(&self, command: &str) -> Result<(), String> {
        if let Some(blocked) = self
            .config
            .blocked_commands
            .iter()
            .find(|b| command.contains(b.as_str()))
        {
            return Err(format!("Blocked command: {blocked}"));
        }
        if self.dangerous.iter().any(|re| re.is_match(command)) {
            return Err("Dangerous command pattern detected".to_owned());
        }
        let base = command.split_whitespace().next().unwrap_or_default();
        if !self.config.allowed_commands.iter().any(|a| a == base) {
            return Err(format!("Command not in allowed list: {base}"));
        }
        Ok(())
    }

    async fn run(&self, command: &str) -> Result<(bool, i32, String, String)> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_directory {
            cmd.current_dir(dir);
        }
        let output = cmd.output().await.context("spawning shell")?;
        Ok((
            output.status.success(),
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stdout).trim_end().to_owned(),
            String::from_utf8_lossy(&output.stderr).trim_end().to_owned(),
        ))
    }
}

#[async_trait]
impl CommandExecutor for TerminalRunner {
    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn execute(&self, command: &str, username: &str) -> TerminalResult {
        if !self.config.enabled {
            return TerminalResult::rejected(command, "Terminal commands are disabled");
        }
        if let Err(reason) = self.validate(command) {
            warn!(user = username, command, reason, "terminal command rejected");
            return TerminalResult::rejected(command, format!("Command blocked: {reason}"));
        }

        let started = Instant::now();
        let limit = Duration::from_millis(self.config.timeout_ms);
        let outcome = tokio::time::timeout(limit, self.run(command)).await;
        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let result = match outcome {
            Ok(Ok((success, exit_code, output, error))) => TerminalResult {
                command: command.to_owned(),
                success,
                exit_code,
                execution_time_ms: elapsed,
                output,
                error,
            },
            Ok(Err(e)) => TerminalResult {
                execution_time_ms: elapsed,
                ..TerminalResult::rejected(command, format!("Execution failed: {e:#}"))
            },
            Err(_) => TerminalResult {
                execution_time_ms: elapsed,
                ..TerminalResult::rejected(
                    command,
                    format!("Command timed out after {}ms", self.config.timeout_ms),
                )
            },
        };
        info!(
            user = username,
            command,
            success = result.success,
            exit_code = result.exit_code,
            elapsed_ms = elapsed,
            "terminal command executed"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> TerminalRunner {
        TerminalRunner::new(TerminalConfig::default()).unwrap()
    }

    #[test]
    fn validation_order() {
        let r = runner();
        assert_eq!(r.validate("ls -la"), Ok(()));
        assert_eq!(r.validate("git status"), Ok(()));
        assert_eq!(
            r.validate("rm -rf /"),
            Err("Blocked command: rm".to_owned())
        );
        assert_eq!(
            r.validate("ls; cat /etc/passwd"),
            Err("Dangerous command pattern detected".to_owned())
        );
        assert_eq!(
            r.validate("echo hi"),
            Err("Command not in allowed list: echo".to_owned())
        );
    }

    #[test]
    fn line_breaks_cannot_chain_commands() {
        let r = runner();
        for command in ["ls /\necho not-allowed", "ls\r\nwhoami", "pwd\u{0}id", "ls\tx"] {
            assert_eq!(
                r.validate(command),
                Err("Dangerous command pattern detected".to_owned()),
                "{command:?}"
            );
        }
    }

    #[tokio::test]
    async fn chained_command_is_never_run() {
        let result = runner().execute("ls /\necho not-allowed", "alice").await;
        assert!(!result.success);
        assert!(result.output.is_empty());
        assert_eq!(result.error, "Command blocked: Dangerous command pattern detected");
    }

    #[test]
    fn allowlist_matches_the_whole_base_command() {
        let r = runner();
        assert_eq!(r.validate("  ls -la"), Ok(()));
        assert_eq!(
            r.validate("lsblk"),
            Err("Command not in allowed list: lsblk".to_owned())
        );
    }

    #[tokio::test]
    async fn disabled_runner_refuses() {
        let r = TerminalRunner::new(TerminalConfig {
            enabled: false,
            ..TerminalConfig::default()
        })
        .unwrap();
        let result = r.execute("ls", "alice").await;
        assert!(!result.success);
        assert_eq!(result.error, "Terminal commands are disabled");
    }

    #[tokio::test]
    async fn runs_allowed_command_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let r = TerminalRunner::new(TerminalConfig {
            working_directory: Some(dir.path().display().to_string()),
            ..TerminalConfig::default()
        })
        .unwrap();

        let result = r.execute("ls", "alice").await;
        assert!(result.success, "{result:?}");
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.output, "marker.txt");
    }

    #[tokio::test]
    async fn enforces_timeout() {
        let r = TerminalRunner::new(TerminalConfig {
            allowed_commands: vec!["sleep".to_owned()],
            blocked_commands: Vec::new(),
            timeout_ms: 50,
            ..TerminalConfig::default()
        })
        .unwrap();
        let result = r.execute("sleep 5", "alice").await;
        assert!(!result.success);
        assert!(result.error.contains("timed out"), "{}", result.error);
    }
}
