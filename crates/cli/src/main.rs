mod channel_commands;

use std::{path::PathBuf, sync::Arc};

use {
    anyhow::Context,
    botbridge_channels::{ChannelRegistry, Flow, InboundEvent, Pipeline, handler_fn},
    botbridge_config::BridgeConfig,
    botbridge_gem::GemPlugin,
    botbridge_telegram::TelegramPlugin,
    clap::{Parser, Subcommand},
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "botbridge", about = "botbridge: gem and Telegram bot bridge")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to load instead of searching the standard locations.
    #[arg(long, global = true, env = "BOTBRIDGE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start every configured account and run until interrupted (default).
    Run,
    /// Channel account helpers.
    Channels {
        #[command(subcommand)]
        action: channel_commands::ChannelAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn load(path: Option<&PathBuf>) -> anyhow::Result<BridgeConfig> {
    match path {
        Some(path) => botbridge_config::load_config(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(botbridge_config::discover_and_load()),
    }
}

/// Logs every inbound event and lets it through to later handlers.
async fn log_event(event: InboundEvent) -> anyhow::Result<Flow> {
    info!(
        platform = %event.platform,
        account_id = %event.account_id,
        sender_id = %event.sender_id,
        kind = ?event.kind,
        text = %event.text,
        "inbound event"
    );
    Ok(Flow::Continue)
}

fn build_pipeline() -> Arc<Pipeline> {
    Arc::new(Pipeline::new().with_handler(handler_fn("log", log_event)))
}

fn build_registry(pipeline: &Arc<Pipeline>) -> ChannelRegistry {
    let mut registry = ChannelRegistry::new();
    registry.register(Box::new(GemPlugin::new(Arc::clone(pipeline))));
    registry.register(Box::new(TelegramPlugin::new(Arc::clone(pipeline))));
    registry
}

/// Start every configured account. A failing account is logged and skipped.
/// Returns how many accounts started.
pub(crate) async fn start_accounts(registry: &mut ChannelRegistry, config: &BridgeConfig) -> usize {
    let mut started = 0;
    for (channel, account_id, value) in config.channels.accounts() {
        let Some(plugin) = registry.get_mut(channel) else {
            warn!(channel, account_id, "no plugin for channel");
            continue;
        };
        match plugin.start_account(account_id, value.clone()).await {
            Ok(()) => started += 1,
            Err(e) => warn!(channel, account_id, error = %e, "failed to start account"),
        }
    }
    started
}

async fn run(config: &BridgeConfig, registry: &mut ChannelRegistry) -> anyhow::Result<()> {
    if config.channels.is_empty() {
        warn!("no channel accounts configured");
    }

    let started = start_accounts(registry, config).await;
    info!(started, channels = ?registry.list(), "botbridge running");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    registry.stop_all().await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "botbridge starting");

    let config = load(cli.config.as_ref())?;
    let pipeline = build_pipeline();
    let mut registry = build_registry(&pipeline);

    match cli.command {
        None | Some(Commands::Run) => run(&config, &mut registry).await,
        Some(Commands::Channels { action }) => {
            channel_commands::handle_channels(action, &config, &mut registry).await
        },
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::io::Write};

    #[test]
    fn explicit_config_path_is_loaded() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "[channels.gem.main]\nurl = \"http://gem.local/\"\ntoken = \"secret\""
        )
        .unwrap();

        let config = load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.channels.gem.len(), 1);
        assert_eq!(config.channels.gem["main"]["token"], "secret");
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("nope.toml"));
    }

    #[test]
    fn registry_has_both_transports() {
        let registry = build_registry(&build_pipeline());
        assert_eq!(registry.list(), vec!["gem", "telegram"]);
    }

    #[tokio::test]
    async fn accounts_without_token_are_skipped() {
        let mut config = BridgeConfig::default();
        config
            .channels
            .gem
            .insert("main".into(), serde_json::json!({ "url": "http://127.0.0.1:9/" }));
        config
            .channels
            .telegram
            .insert("support".into(), serde_json::json!({}));

        let mut registry = build_registry(&build_pipeline());
        assert_eq!(start_accounts(&mut registry, &config).await, 0);
        assert!(registry.get("gem").unwrap().account_ids().is_empty());
    }

    #[tokio::test]
    async fn pipeline_starts_with_log_handler() {
        let pipeline = build_pipeline();
        assert_eq!(pipeline.handler_names(), vec!["log".to_string()]);
        assert!(matches!(
            pipeline.run(None).await,
            botbridge_channels::RunOutcome::Skipped
        ));
    }
}
