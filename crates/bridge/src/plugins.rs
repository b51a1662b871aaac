use tracing::{info, warn};

use plugin_core::{PluginRegistry, PluginSpec, factory::PluginFactory};

/// Every plugin compiled into the bridge.
pub fn factories() -> Vec<Box<dyn PluginFactory>> {
    vec![
        Box::new(plugin_calculator::CalculatorPlugin),
        Box::new(plugin_weather::WeatherPlugin),
    ]
}

/// Merges the configured specs with each factory's defaults and registers
/// every enabled plugin. Configured entries win over defaults.
pub async fn build_registry(
    factories: &[Box<dyn PluginFactory>],
    configured: &[PluginSpec],
) -> PluginRegistry {
    let mut specs = configured.to_vec();
    for factory in factories {
        factory.register_defaults(&mut specs);
    }

    let registry = PluginRegistry::new();
    for spec in &specs {
        if !spec.enabled {
            info!(plugin = %spec.id, "Plugin disabled by config");
            continue;
        }
        let Some(factory) = factories.iter().find(|f| f.id() == spec.id) else {
            warn!(plugin = %spec.id, "Unknown plugin ID");
            continue;
        };
        if !registry.register(factory.build(spec)).await {
            warn!(plugin = %spec.id, "Plugin registration failed");
        }
    }

    let commands = registry.command_names().await;
    info!(plugins = specs.len(), commands = ?commands, "Registered plugin commands");
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: &str, enabled: bool) -> PluginSpec {
        PluginSpec {
            id: id.to_owned(),
            enabled,
            config: serde_yaml::Value::default(),
        }
    }

    #[tokio::test]
    async fn defaults_register_every_builtin() {
        let registry = build_registry(&factories(), &[]).await;
        let ids: Vec<String> = registry.manifests().await.into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["calculator".to_owned(), "weather".to_owned()]);
        assert!(registry.has_command("calc").await);
        assert!(registry.has_command("forecast").await);
    }

    #[tokio::test]
    async fn config_can_disable_and_unknown_ids_are_skipped() {
        let configured = [spec("weather", false), spec("nonexistent", true)];
        let registry = build_registry(&factories(), &configured).await;
        let ids: Vec<String> = registry.manifests().await.into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["calculator".to_owned()]);
        assert!(!registry.has_command("weather").await);
    }
}
