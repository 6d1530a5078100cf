//! CLI subcommands for inspecting configured channel accounts.

use {
    anyhow::Result,
    botbridge_channels::ChannelRegistry,
    botbridge_common::Platform,
    botbridge_config::BridgeConfig,
    clap::Subcommand,
};

#[derive(Subcommand)]
pub enum ChannelAction {
    /// List the accounts found in the configuration.
    List {
        /// Only show accounts of this platform (gem, telegram).
        #[arg(long)]
        platform: Option<Platform>,
    },
    /// Start every account, probe it once, then stop it again.
    Status,
}

pub async fn handle_channels(
    action: ChannelAction,
    config: &BridgeConfig,
    registry: &mut ChannelRegistry,
) -> Result<()> {
    match action {
        ChannelAction::List { platform } => {
            let lines = account_lines(config, platform);
            if lines.is_empty() {
                println!("No channel accounts configured.");
            }
            for line in lines {
                println!("{line}");
            }
            Ok(())
        },
        ChannelAction::Status => status(config, registry).await,
    }
}

/// One `channel/account` line per configured account, in config order.
pub fn account_lines(config: &BridgeConfig, platform: Option<Platform>) -> Vec<String> {
    config
        .channels
        .accounts()
        .into_iter()
        .filter(|(channel, ..)| platform.is_none_or(|p| p.as_str() == *channel))
        .map(|(channel, account_id, _)| format!("{channel}/{account_id}"))
        .collect()
}

async fn status(config: &BridgeConfig, registry: &mut ChannelRegistry) -> Result<()> {
    crate::start_accounts(registry, config).await;

    for (channel, account_id, _) in config.channels.accounts() {
        let Some(plugin) = registry.get(channel) else {
            continue;
        };
        let Some(status) = plugin.status() else {
            println!("{channel}/{account_id}: no status available");
            continue;
        };
        let snap = status.probe(account_id).await?;
        let state = if snap.connected {
            "connected"
        } else {
            "disconnected"
        };
        match snap.details {
            Some(details) => println!("{channel}/{account_id}: {state} ({details})"),
            None => println!("{channel}/{account_id}: {state}"),
        }
    }

    registry.stop_all().await;
    Ok(())
}
