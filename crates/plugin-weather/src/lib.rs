use core::time::Duration as StdDuration;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use rand::{Rng as _, seq::SliceRandom as _};
use serde::Serialize;
use time::{Duration, OffsetDateTime, macros::format_description};

use plugin_core::factory::PluginFactory;
use plugin_core::{
    Caller, CommandHandler, CommandResult, Plugin, PluginCommand, PluginManifest, PluginSpec,
};

const CONDITIONS: [&str; 5] = ["Sunny", "Cloudy", "Rainy", "Snowy", "Partly Cloudy"];
const DEFAULT_LATENCY_MS: u64 = 300;
const FOOTER: &str = "*Data provided by Weather Plugin*";

#[derive(Debug)]
pub struct WeatherPlugin;

impl PluginFactory for WeatherPlugin {
    fn id(&self) -> &'static str {
        "weather"
    }

    fn build(&self, spec: &PluginSpec) -> Arc<dyn Plugin> {
        let latency_ms = spec
            .config
            .get("latency_ms")
            .and_then(serde_yaml::Value::as_u64)
            .unwrap_or(DEFAULT_LATENCY_MS);
        Arc::new(Weather::new(StdDuration::from_millis(latency_ms)))
    }
}

/// Simulated weather provider. Readings are random within plausible ranges.
#[derive(Debug, Clone)]
pub struct Weather {
    latency: StdDuration,
}

impl Weather {
    #[must_use]
    pub const fn new(latency: StdDuration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl Plugin for Weather {
    fn manifest(&self) -> PluginManifest {
        PluginManifest {
            id: "weather".to_owned(),
            name: "Weather Plugin".to_owned(),
            version: "1.0.0".to_owned(),
            description: "Get weather information for any location".to_owned(),
            author: "chat-bridge".to_owned(),
        }
    }

    fn commands(&self) -> Vec<PluginCommand> {
        vec![
            PluginCommand::new("weather", "Get current weather for a location")
                .usage("/weather <city> [country]")
                .example("/weather London")
                .example("/weather Tokyo JP")
                .handler(Arc::new(Current(self.latency))),
            PluginCommand::new("forecast", "Get weather forecast for a location")
                .usage("/forecast <city> [days]")
                .example("/forecast London 5")
                .example("/forecast Paris 3")
                .handler(Arc::new(Forecast(self.latency))),
        ]
    }

    async fn on_activate(&self) -> Result<()> {
        tracing::debug!(latency_ms = self.latency.as_millis(), "weather plugin activated");
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Reading {
    pub temperature: i32,
    pub condition: &'static str,
    pub humidity: u32,
    pub wind: u32,
}

impl Reading {
    fn random() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            temperature: rng.gen_range(-5..25),
            condition: CONDITIONS.choose(&mut rng).copied().unwrap_or("Sunny"),
            humidity: rng.gen_range(40..80),
            wind: rng.gen_range(5..35),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastDay {
    pub date: String,
    #[serde(flatten)]
    pub reading: Reading,
}

struct Current(StdDuration);

#[async_trait]
impl CommandHandler for Current {
    async fn call(&self, args: &[String], _caller: &Caller) -> Result<CommandResult> {
        let Some(city) = args.first() else {
            return Ok(CommandResult::failure(
                "❌ City is required",
                "Usage: /weather <city> [country]",
            ));
        };
        let place = match args.get(1) {
            Some(country) => format!("{city}, {country}"),
            None => city.clone(),
        };

        tokio::time::sleep(self.0).await;
        let reading = Reading::random();

        let message = format!(
            "🌤️ **Weather for {place}**\n\n\
             **Temperature**: {}°C\n\
             **Condition**: {}\n\
             **Humidity**: {}%\n\
             **Wind**: {} km/h\n\n{FOOTER}",
            reading.temperature, reading.condition, reading.humidity, reading.wind
        );
        let data = serde_json::to_value(&reading).context("serializing weather reading")?;
        Ok(CommandResult::success(message).with_data(data))
    }
}

struct Forecast(StdDuration);

#[async_trait]
impl CommandHandler for Forecast {
    async fn call(&self, args: &[String], _caller: &Caller) -> Result<CommandResult> {
        let Some(city) = args.first() else {
            return Ok(CommandResult::failure(
                "❌ City is required",
                "Usage: /forecast <city> [days]",
            ));
        };
        let days = args
            .get(1)
            .and_then(|d| d.parse::<i64>().ok())
            .filter(|d| *d != 0)
            .unwrap_or(3);
        if !(1..=7).contains(&days) {
            return Ok(CommandResult::failure(
                "❌ Days must be between 1 and 7",
                "Invalid number of days",
            ));
        }

        tokio::time::sleep(self.0).await;
        let forecast = forecast_days(OffsetDateTime::now_utc(), days)?;

        let mut message = format!("📅 **{days}-Day Forecast for {city}**\n\n");
        for (i, day) in forecast.iter().enumerate() {
            message.push_str(&format!(
                "**Day {}**: {}\n🌡️ {}°C | 💧 {}\n\n",
                i + 1,
                day.date,
                day.reading.temperature,
                day.reading.condition
            ));
        }
        message.push_str(FOOTER);

        let data = serde_json::to_value(&forecast).context("serializing forecast")?;
        Ok(CommandResult::success(message).with_data(data))
    }
}

fn forecast_days(start: OffsetDateTime, days: i64) -> Result<Vec<ForecastDay>> {
    let fmt = format_description!("[year]-[month]-[day]");
    (0..days)
        .map(|offset| {
            let date = (start + Duration::days(offset))
                .format(&fmt)
                .context("formatting forecast date")?;
            Ok(ForecastDay {
                date,
                reading: Reading::random(),
            })
        })
        .collect()
}
