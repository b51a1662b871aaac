use std::sync::Arc;

use crate::{Plugin, PluginSpec};

/// Builds a plugin and describes how it is enabled by default.
/// The bridge collects every factory, merges their default specs with the
/// `plugins:` section of the config file and registers the enabled ones.
pub trait PluginFactory: Send + Sync {
    /// Plugin id the factory builds, matched against `PluginSpec::id`.
    fn id(&self) -> &'static str;

    /// Registers the default `PluginSpec` for the plugin.
    ///
    /// # Arguments
    ///
    /// * `specs` - The specs collected so far. Implementations must not push a
    ///   second spec for an id that is already present (user config wins).
    fn register_defaults(&self, specs: &mut Vec<PluginSpec>) {
        push_default(specs, self.id());
    }

    /// Builds the plugin instance.
    #[must_use]
    fn build(&self, spec: &PluginSpec) -> Arc<dyn Plugin>;
}

/// Pushes a default spec for `id` unless one is already present.
pub fn push_default(specs: &mut Vec<PluginSpec>, id: &str) {
    if !specs.iter().any(|s| s.id == id) {
        specs.push(PluginSpec {
            id: id.to_owned(),
            enabled: true,
            config: serde_yaml::Value::default(),
        });
    }
}
