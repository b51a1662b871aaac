pub mod factory;

use core::fmt;
use std::{borrow::ToOwned, collections::HashMap, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// The remote user a command is executed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub username: String,
    pub channel_id: i64,
    pub is_authorized: bool,
    pub is_admin: bool,
}

/// Outcome of a plugin command. Failures are values, not errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Text suitable for a chat reply.
    #[must_use]
    pub fn render(&self) -> String {
        match (&self.error, self.success) {
            (Some(err), false) if !err.is_empty() => format!("{}\n\n{err}", self.message),
            _ => self.message.clone(),
        }
    }
}

/// Capability interface behind every plugin command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn call(&self, args: &[String], caller: &Caller) -> Result<CommandResult>;
}

#[derive(Clone)]
pub struct PluginCommand {
    pub name: String,
    pub description: String,
    pub usage: String,
    pub examples: Vec<String>,
    pub handler: Option<Arc<dyn CommandHandler>>,
    pub requires_auth: bool,
    pub admin_only: bool,
}

impl PluginCommand {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            usage: String::new(),
            examples: Vec::new(),
            handler: None,
            requires_auth: false,
            admin_only: false,
        }
    }

    #[must_use]
    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = usage.into();
        self
    }

    #[must_use]
    pub fn example(mut self, example: impl Into<String>) -> Self {
        self.examples.push(example.into());
        self
    }

    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn CommandHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    #[must_use]
    pub const fn requires_auth(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    #[must_use]
    pub const fn admin_only(mut self) -> Self {
        self.admin_only = true;
        self
    }
}

impl fmt::Debug for PluginCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginCommand")
            .field("name", &self.name)
            .field("usage", &self.usage)
            .field("has_handler", &self.handler.is_some())
            .field("requires_auth", &self.requires_auth)
            .field("admin_only", &self.admin_only)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PluginManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn manifest(&self) -> PluginManifest;
    fn commands(&self) -> Vec<PluginCommand>;

    async fn on_activate(&self) -> Result<()> {
        Ok(())
    }

    async fn on_deactivate(&self) -> Result<()> {
        Ok(())
    }
}

/// Per-plugin entry of the `plugins:` config section.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginSpec {
    pub id: String,
    #[serde(default = "enabled_true")]
    pub enabled: bool,
    #[serde(default)]
    pub config: serde_yaml::Value,
}

const fn enabled_true() -> bool {
    true
}

#[derive(Clone)]
pub struct PluginEntry {
    pub manifest: PluginManifest,
    pub plugin: Arc<dyn Plugin>,
    pub commands: Arc<[PluginCommand]>,
}

impl fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginEntry")
            .field("manifest", &self.manifest)
            .field("commands", &self.commands)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct RegistryInner {
    by_id: HashMap<String, PluginEntry>,
    by_command: HashMap<String, String>,
}

#[derive(Clone, Default)]
pub struct PluginRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry").finish_non_exhaustive()
    }
}

impl PluginRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates, inserts and activates a plugin. Returns `false` without
    /// leaving any trace in the registry when any step fails.
    pub async fn register(&self, plugin: Arc<dyn Plugin>) -> bool {
        let manifest = plugin.manifest();
        let commands = plugin.commands();
        info!(plugin = %manifest.id, version = %manifest.version, "Registering plugin");

        if let Err(reason) = validate(&manifest, &commands) {
            warn!(plugin = %manifest.id, reason, "Plugin validation failed");
            return false;
        }

        let id = manifest.id.clone();
        {
            let mut inner = self.inner.write().await;
            if inner.by_id.contains_key(&id) {
                warn!(plugin = %id, "Plugin already registered");
                return false;
            }
            if let Some(clash) = commands
                .iter()
                .map(|c| normalize_cmd(&c.name))
                .find(|key| inner.by_command.contains_key(key))
            {
                warn!(plugin = %id, command = %clash, "Command already provided by another plugin");
                return false;
            }
            for cmd in &commands {
                let key = normalize_cmd(&cmd.name);
                debug!(plugin = %id, command = %key, "Registered command");
                inner.by_command.insert(key, id.clone());
            }
            inner.by_id.insert(
                id.clone(),
                PluginEntry {
                    manifest,
                    plugin: Arc::clone(&plugin),
                    commands: commands.into(),
                },
            );
        }

        if let Err(e) = plugin.on_activate().await {
            warn!(plugin = %id, error = %e, "Plugin activation failed; rolling back");
            let mut inner = self.inner.write().await;
            inner.by_id.remove(&id);
            inner.remove_commands_for(&id);
            return false;
        }

        info!(plugin = %id, "Plugin registered");
        true
    }

    pub async fn unregister(&self, id: &str) -> bool {
        let removed = {
            let mut inner = self.inner.write().await;
            let removed = inner.by_id.remove(id);
            inner.remove_commands_for(id);
            removed
        };
        let Some(entry) = removed else {
            warn!(plugin = %id, "Plugin not found");
            return false;
        };
        if let Err(e) = entry.plugin.on_deactivate().await {
            warn!(plugin = %id, error = %e, "Plugin deactivation hook failed");
        }
        info!(plugin = %id, "Plugin unregistered");
        true
    }

    pub async fn get(&self, id: &str) -> Option<PluginEntry> {
        let inner = self.inner.read().await;
        inner.by_id.get(id).cloned()
    }

    /// All entries, ordered by plugin id.
    pub async fn entries(&self) -> Vec<PluginEntry> {
        let inner = self.inner.read().await;
        let mut entries: Vec<PluginEntry> = inner.by_id.values().cloned().collect();
        entries.sort_by(|a, b| a.manifest.id.cmp(&b.manifest.id));
        entries
    }

    pub async fn manifests(&self) -> Vec<PluginManifest> {
        self.entries()
            .await
            .into_iter()
            .map(|e| e.manifest)
            .collect()
    }

    /// Registered command keys (with the leading `/`), sorted.
    pub async fn command_names(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut names: Vec<String> = inner.by_command.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn has_command(&self, name: &str) -> bool {
        let inner = self.inner.read().await;
        inner.by_command.contains_key(&normalize_cmd(name))
    }

    pub async fn lookup(&self, name: &str) -> Option<(PluginEntry, PluginCommand)> {
        let inner = self.inner.read().await;
        let key = normalize_cmd(name);
        let entry = inner
            .by_command
            .get(&key)
            .and_then(|id| inner.by_id.get(id))?;
        let command = entry
            .commands
            .iter()
            .find(|c| normalize_cmd(&c.name) == key)?
            .clone();
        Some((entry.clone(), command))
    }

    /// Runs a plugin command. Unknown commands, refused callers and handler
    /// errors all come back as failed results.
    pub async fn execute(&self, name: &str, args: &[String], caller: &Caller) -> CommandResult {
        let Some((entry, command)) = self.lookup(name).await else {
            return CommandResult::failure(
                format!("Command not found: {name}"),
                "Command not registered by any plugin",
            );
        };
        let plugin_id = entry.manifest.id.as_str();

        if command.requires_auth && !caller.is_authorized {
            info!(plugin = %plugin_id, command = %name, user = %caller.username, "Refusing command for unauthorized caller");
            return CommandResult::failure(
                format!("⛔ /{} requires an authorized user", command.name),
                "Authorization required",
            );
        }
        if command.admin_only && !caller.is_admin {
            info!(plugin = %plugin_id, command = %name, user = %caller.username, "Refusing admin-only command");
            return CommandResult::failure(
                format!("⛔ /{} is restricted to administrators", command.name),
                "Admin privileges required",
            );
        }

        let Some(handler) = command.handler.clone() else {
            return CommandResult::failure(
                format!("Command execution failed: {name}"),
                "Command has no handler",
            );
        };

        info!(plugin = %plugin_id, command = %name, user = %caller.username, "Executing plugin command");
        match handler.call(args, caller).await {
            Ok(result) => result,
            Err(e) => {
                warn!(plugin = %plugin_id, command = %name, error = %e, "Plugin command failed");
                CommandResult::failure(format!("Command execution failed: {name}"), format!("{e:#}"))
            }
        }
    }

    pub async fn status_summary(&self) -> String {
        let inner = self.inner.read().await;
        format!(
            "📊 **Plugin Status**\n\n**🔌 Active Plugins**: {}\n**📝 Total Commands**: {}",
            inner.by_id.len(),
            inner.by_command.len()
        )
    }

    pub async fn available_commands(&self) -> String {
        let mut lines = vec!["📝 **Available Plugin Commands**".to_owned(), String::new()];
        for entry in self.entries().await {
            for cmd in entry.commands.iter() {
                let usage = if cmd.usage.is_empty() {
                    normalize_cmd(&cmd.name)
                } else {
                    cmd.usage.clone()
                };
                lines.push(format!(
                    "• `{usage}` - {} ({})",
                    cmd.description, entry.manifest.name
                ));
            }
        }
        if lines.len() == 2 {
            lines.push("• No plugin commands registered".to_owned());
        }
        lines.join("\n")
    }
}

impl RegistryInner {
    fn remove_commands_for(&mut self, id: &str) {
        self.by_command.retain(|_, existing| existing != id);
    }
}

fn validate(manifest: &PluginManifest, commands: &[PluginCommand]) -> Result<(), &'static str> {
    let fields = [
        &manifest.id,
        &manifest.name,
        &manifest.version,
        &manifest.description,
        &manifest.author,
    ];
    if fields.iter().any(|f| f.trim().is_empty()) {
        return Err("missing required metadata");
    }
    if commands.is_empty() {
        return Err("no commands");
    }
    let mut seen = std::collections::HashSet::new();
    for cmd in commands {
        if cmd.name.trim().is_empty() || cmd.description.trim().is_empty() {
            return Err("command missing name or description");
        }
        if cmd.name.contains(char::is_whitespace) {
            return Err("command name contains whitespace");
        }
        if cmd.handler.is_none() {
            return Err("command missing handler");
        }
        if !seen.insert(normalize_cmd(&cmd.name)) {
            return Err("duplicate command name");
        }
    }
    Ok(())
}

fn normalize_cmd(s: &str) -> String {
    if s.starts_with('/') {
        s.to_owned()
    } else {
        format!("/{s}")
    }
}

#[must_use]
pub fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Splits command arguments on whitespace.
#[must_use]
pub fn split_args(s: &str) -> Vec<String> {
    s.split_whitespace().map(ToOwned::to_owned).collect()
}
