//! Subscriber setup for the bridge binary. Logs go to stderr so stdout stays
//! free for the terminal the bridge was started from.

use anyhow::{Context as _, Result};
use tracing::Subscriber;
use tracing_subscriber::{
    EnvFilter, Layer, layer::SubscriberExt as _, registry::LookupSpan, util::SubscriberInitExt as _,
};

/// Used when `RUST_LOG` is unset or blank. The HTTP stack is chatty at
/// `info` on every long poll.
const DEFAULT_DIRECTIVES: &str = "info,reqwest=warn,hyper=warn,hyper_util=warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// One JSON object per event, fields flattened.
    Json,
    #[default]
    Pretty,
    /// Single-line events for narrow terminals.
    Compact,
}

impl LogFormat {
    /// Parses `RUST_LOG_MODE`. Unknown values fall back to pretty output.
    pub fn from_mode(mode: &str) -> Self {
        match mode.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            "compact" => Self::Compact,
            _ => Self::Pretty,
        }
    }

    fn layer<S>(self) -> Box<dyn Layer<S> + Send + Sync + 'static>
    where
        for<'a> S: Subscriber + LookupSpan<'a>,
    {
        let fmt = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        match self {
            Self::Json => Box::new(
                fmt.json()
                    .flatten_event(true)
                    .with_current_span(false)
                    .with_target(false),
            ),
            Self::Pretty => Box::new(fmt.pretty().with_file(true).with_line_number(true)),
            Self::Compact => Box::new(fmt.compact().with_target(false)),
        }
    }
}

fn filter(directives: Option<&str>) -> Result<EnvFilter> {
    let directives = directives
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(DEFAULT_DIRECTIVES);
    EnvFilter::builder()
        .parse(directives)
        .with_context(|| format!("parsing log filter {directives:?}"))
}

/// Installs the global subscriber. `format` comes from `--log-format`; when
/// absent `RUST_LOG_MODE` decides. `RUST_LOG` overrides the default filter.
pub fn init_tracing(format: Option<LogFormat>) -> Result<()> {
    let format = format.unwrap_or_else(|| {
        std::env::var("RUST_LOG_MODE").map_or(LogFormat::Pretty, |m| LogFormat::from_mode(&m))
    });
    let directives = std::env::var("RUST_LOG").ok();

    tracing_subscriber::registry()
        .with(filter(directives.as_deref())?)
        .with(format.layer())
        .try_init()
        .context("installing tracing subscriber")
}
