mod expr;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use plugin_core::factory::PluginFactory;
use plugin_core::{
    Caller, CommandHandler, CommandResult, Plugin, PluginCommand, PluginManifest, PluginSpec,
};

pub use expr::evaluate;

#[derive(Debug)]
pub struct CalculatorPlugin;

impl PluginFactory for CalculatorPlugin {
    fn id(&self) -> &'static str {
        "calculator"
    }

    fn build(&self, _spec: &PluginSpec) -> Arc<dyn Plugin> {
        Arc::new(Calculator)
    }
}

#[derive(Debug)]
pub struct Calculator;

#[async_trait]
impl Plugin for Calculator {
    fn manifest(&self) -> PluginManifest {
        PluginManifest {
            id: "calculator".to_owned(),
            name: "Calculator Plugin".to_owned(),
            version: "1.0.0".to_owned(),
            description: "Perform mathematical calculations and conversions".to_owned(),
            author: "chat-bridge".to_owned(),
        }
    }

    fn commands(&self) -> Vec<PluginCommand> {
        vec![
            PluginCommand::new("calc", "Perform mathematical calculations")
                .usage("/calc <expression>")
                .example("/calc 2 + 2")
                .example("/calc sqrt(16)")
                .example("/calc 2^8")
                .handler(Arc::new(Calc)),
            PluginCommand::new("convert", "Convert between units")
                .usage("/convert <value> <from_unit> to <to_unit>")
                .example("/convert 32 F to C")
                .example("/convert 1 mile to km")
                .example("/convert 100 USD to EUR")
                .handler(Arc::new(Convert)),
        ]
    }

    async fn on_activate(&self) -> Result<()> {
        tracing::debug!("calculator plugin activated");
        Ok(())
    }
}

struct Calc;

#[async_trait]
impl CommandHandler for Calc {
    async fn call(&self, args: &[String], _caller: &Caller) -> Result<CommandResult> {
        if args.is_empty() {
            return Ok(CommandResult::failure(
                "❌ Expression is required",
                "Usage: /calc <expression>",
            ));
        }
        let expression = args.join(" ");
        let Some(value) = evaluate(&expression) else {
            return Ok(CommandResult::failure(
                format!("❌ Invalid expression: {expression}"),
                "Expression could not be evaluated",
            ));
        };
        Ok(CommandResult::success(format!(
            "🧮 **Calculator Result**\n\n**Expression**: `{expression}`\n**Result**: `{}`",
            format_number(value)
        ))
        .with_data(json!({ "expression": expression, "result": value })))
    }
}

struct Convert;

#[async_trait]
impl CommandHandler for Convert {
    async fn call(&self, args: &[String], _caller: &Caller) -> Result<CommandResult> {
        let (raw_value, from, to) = match args {
            [v, from, kw, to] if kw.eq_ignore_ascii_case("to") => (v, from, to),
            [v, from, to] => (v, from, to),
            _ => {
                return Ok(CommandResult::failure(
                    "❌ Invalid conversion format",
                    "Usage: /convert <value> <from_unit> to <to_unit>",
                ));
            }
        };
        let Ok(value) = raw_value.parse::<f64>() else {
            return Ok(CommandResult::failure(
                "❌ Invalid value",
                "Value must be a number",
            ));
        };
        let from = from.to_lowercase();
        let to = to.to_lowercase();
        let Some(result) = convert_unit(value, &from, &to) else {
            return Ok(CommandResult::failure(
                format!("❌ Conversion not supported: {from} to {to}"),
                "Unsupported unit conversion",
            ));
        };
        Ok(CommandResult::success(format!(
            "🔄 **Unit Conversion**\n\n**{value} {from}** = **{result:.4} {to}**"
        ))
        .with_data(json!({
            "from": { "value": value, "unit": from },
            "to": { "value": result, "unit": to },
        })))
    }
}

/// Converts between the supported unit pairs. Currency rates are fixed
/// approximations.
#[must_use]
pub fn convert_unit(value: f64, from: &str, to: &str) -> Option<f64> {
    let out = match (from, to) {
        ("c", "f") => value.mul_add(9.0 / 5.0, 32.0),
        ("f", "c") => (value - 32.0) * 5.0 / 9.0,
        ("c", "k") => value + 273.15,
        ("k", "c") => value - 273.15,
        ("f", "k") => (value - 32.0).mul_add(5.0 / 9.0, 273.15),
        ("k", "f") => (value - 273.15).mul_add(9.0 / 5.0, 32.0),
        ("km", "mile") => value * 0.621_371,
        ("mile", "km") => value * 1.609_34,
        ("m", "ft") => value * 3.280_84,
        ("ft", "m") => value * 0.3048,
        ("kg", "lb") => value * 2.204_62,
        ("lb", "kg") => value * 0.453_592,
        ("usd", "eur") => value * 0.85,
        ("eur", "usd") => value * 1.18,
        _ if from == to => value,
        _ => return None,
    };
    Some(out)
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        let s = format!("{value:.10}");
        s.trim_end_matches('0').trim_end_matches('.').to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugin_core::{PluginRegistry, split_args};

    fn caller() -> Caller {
        Caller {
            username: "alice".to_owned(),
            channel_id: 1,
            is_authorized: true,
            is_admin: false,
        }
    }

    #[test]
    fn temperature_round_trips() {
        let f = convert_unit(0.0, "c", "f").unwrap();
        assert!((f - 32.0).abs() < 1e-6);
        let c = convert_unit(32.0, "f", "c").unwrap();
        assert!(c.abs() < 1e-6);
        let k = convert_unit(100.0, "c", "k").unwrap();
        assert!((convert_unit(k, "k", "c").unwrap() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn unknown_pair_is_unsupported() {
        assert!(convert_unit(1.0, "parsec", "km").is_none());
    }

    #[test]
    fn whole_numbers_print_without_fraction() {
        assert_eq!(format_number(4.0), "4");
        assert_eq!(format_number(0.5), "0.5");
    }

    #[tokio::test]
    async fn commands_run_through_registry() {
        let registry = PluginRegistry::new();
        assert!(registry.register(Arc::new(Calculator)).await);

        let calc = registry
            .execute("calc", &split_args("2 + 2 * 3"), &caller())
            .await;
        assert!(calc.success, "{calc:?}");
        assert!(calc.message.contains("`8`"));

        let convert = registry
            .execute("convert", &split_args("32 F to C"), &caller())
            .await;
        assert!(convert.success);
        assert!(convert.message.contains("0.0000 c"));

        let bad = registry
            .execute("convert", &split_args("abc F to C"), &caller())
            .await;
        assert!(!bad.success);
        assert_eq!(bad.error.as_deref(), Some("Value must be a number"));

        let empty = registry.execute("calc", &[], &caller()).await;
        assert!(!empty.success);
    }
}
