mod fs_workspace;
mod logging;
mod plugins;
mod telegram;

use core::time::Duration;
use std::{path::PathBuf, sync::Arc};

use anyhow::{Result, bail};
use clap::Parser;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use bridge_core::{
    Bridge, CommandRouter, load_config,
    detector::{document_looks_like_chat, session_key},
    terminal::TerminalRunner,
    workspace::Workspace as _,
};

use crate::{
    fs_workspace::FileWorkspace,
    logging::{LogFormat, init_tracing},
    telegram::TelegramClient,
};

#[derive(Parser, Debug)]
#[command(
    name = "chat-bridge",
    version,
    about = "Drive an editor AI chat from Telegram"
)]
struct Args {
    /// Path to the YAML configuration
    #[arg(long, env = "BRIDGE_CONFIG", default_value = "./bridge.yaml")]
    config: PathBuf,

    /// Bot token; overrides `telegram.bot_token`
    #[arg(long, env = "TELEGRAM_BOT_TOKEN")]
    bot_token: Option<String>,

    /// Directory the `workspace.files` entries are relative to
    #[arg(long, env = "BRIDGE_WORKSPACE", default_value = ".")]
    workspace: PathBuf,

    /// How often workspace files are re-read, in milliseconds
    #[arg(long, env = "BRIDGE_POLL_INTERVAL_MS", default_value_t = 500)]
    poll_interval_ms: u64,

    /// Long-poll timeout for Telegram updates, in seconds
    #[arg(long, env = "TELEGRAM_POLL_TIMEOUT_SECS", default_value_t = 30)]
    poll_timeout_secs: u64,

    /// Overrides `capture.quiescence_ms`
    #[arg(long, env = "BRIDGE_QUIESCENCE_MS")]
    quiescence_ms: Option<u64>,

    /// Log output format; defaults to `RUST_LOG_MODE`, then pretty
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env first so RUST_LOG and the clap env fallbacks see it.
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    init_tracing(args.log_format)?;

    let mut config = load_config(&args.config)?;
    if let Some(token) = args.bot_token {
        config.telegram.bot_token = token;
    }
    if let Some(ms) = args.quiescence_ms {
        config.capture.quiescence_ms = ms;
    }
    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            error!(%problem, "Invalid configuration");
        }
        bail!("invalid configuration: {}", problems.join("; "));
    }
    let config = Arc::new(config);

    let registry = plugins::build_registry(&plugins::factories(), &config.plugins).await;
    let workspace = Arc::new(
        FileWorkspace::open(
            &args.workspace,
            &config.workspace.files,
            config.workspace.active.as_deref(),
        )
        .await?,
    );
    let telegram = Arc::new(TelegramClient::new(&config.telegram.bot_token)?);
    let terminal = Arc::new(TerminalRunner::new(config.terminal.clone())?);

    let bridge = Arc::new(
        Bridge::new(
            Arc::clone(&config),
            registry,
            Arc::clone(&workspace) as _,
            Arc::clone(&telegram) as _,
            terminal,
        )?
        .with_capture(Duration::from_millis(config.capture.quiescence_ms)),
    );

    if config.workspace.auto_enable {
        auto_enable(&bridge).await;
    }

    info!(
        routing = config.routing.label(),
        users = config.telegram.authorized_users.len(),
        quiescence_ms = config.capture.quiescence_ms,
        "Chat bridge started"
    );

    let watcher = tokio::spawn(watch_workspace(
        Arc::clone(&bridge),
        Arc::clone(&workspace),
        Duration::from_millis(args.poll_interval_ms),
    ));
    let router = CommandRouter::new(Arc::clone(&bridge));

    tokio::select! {
        () = poll_telegram(&router, &telegram, args.poll_timeout_secs) => {}
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!(error = %e, "Failed to listen for ctrl-c");
            }
            info!("Shutting down");
        }
    }

    watcher.abort();
    if let Some(capture) = &bridge.capture {
        capture.shutdown().await;
    }
    Ok(())
}

/// Enables the bridge for the active document when it looks like a chat.
async fn auto_enable(bridge: &Bridge) {
    let Some(doc) = bridge.workspace.active_document().await else {
        return;
    };
    let detection = document_looks_like_chat(&doc);
    if let Some(signal) = detection.signal {
        bridge.sessions.enable(&session_key(&doc.uri), None, None).await;
        info!(document = %doc.name, ?signal, "Bridge auto-enabled");
    }
}

/// Feeds changed workspace files into response capture.
async fn watch_workspace(bridge: Arc<Bridge>, workspace: Arc<FileWorkspace>, period: Duration) {
    let Some(capture) = bridge.capture.clone() else {
        return;
    };
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let changed = workspace.poll_changes().await;
        if changed.is_empty() {
            continue;
        }
        let active = workspace.active_document().await.map(|d| d.uri);
        for doc in &changed {
            capture.on_document_change(doc, active.as_deref()).await;
        }
    }
}

/// Long-polls Telegram and hands each message to the router's per-channel
/// lanes, so a slow command never holds up the next poll.
async fn poll_telegram(router: &CommandRouter, telegram: &TelegramClient, timeout_secs: u64) {
    let mut offset = None;
    loop {
        let updates = match telegram.get_updates(offset, timeout_secs).await {
            Ok(updates) => updates,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Telegram poll failed");
                tokio::time::sleep(Duration::from_secs(2)).await;
                continue;
            }
        };
        for update in updates {
            offset = Some(update.update_id + 1);
            let Some(message) = update.into_inbound() else {
                continue;
            };
            router.enqueue(message).await;
        }
    }
}
