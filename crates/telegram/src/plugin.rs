use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
    time::Instant,
};

use {
    anyhow::Result,
    async_trait::async_trait,
    botbridge_channels::{ChannelHealthSnapshot, ChannelPlugin, ChannelStatus, Pipeline},
    secrecy::ExposeSecret,
    teloxide::{prelude::Requester, types::ChatId},
    tracing::{info, warn},
};

use crate::{bot, config::TelegramAccountConfig, outbound::TelegramReply, state::AccountStateMap};

/// Cache TTL for probe results (30 seconds).
const PROBE_CACHE_TTL: std::time::Duration = std::time::Duration::from_secs(30);

/// Telegram channel plugin.
pub struct TelegramPlugin {
    accounts: AccountStateMap,
    pipeline: Arc<Pipeline>,
    probe_cache: RwLock<HashMap<String, (ChannelHealthSnapshot, Instant)>>,
}

impl TelegramPlugin {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            accounts: Arc::new(RwLock::new(HashMap::new())),
            pipeline,
            probe_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn has_account(&self, account_id: &str) -> bool {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        accounts.contains_key(account_id)
    }

    /// Get the config for a specific account (serialized to JSON).
    pub fn account_config(&self, account_id: &str) -> Option<serde_json::Value> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        accounts
            .get(account_id)
            .and_then(|s| serde_json::to_value(&s.config).ok())
    }

    /// Reply handle for an arbitrary chat, e.g. for proactive sends.
    pub fn reply_handle(&self, account_id: &str, chat_id: i64) -> Option<TelegramReply> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        accounts
            .get(account_id)
            .map(|s| TelegramReply::new(s.bot.clone(), ChatId(chat_id)))
    }
}

#[async_trait]
impl ChannelPlugin for TelegramPlugin {
    fn id(&self) -> &str {
        "telegram"
    }

    fn name(&self) -> &str {
        "Telegram"
    }

    async fn start_account(&mut self, account_id: &str, config: serde_json::Value) -> Result<()> {
        let tg_config: TelegramAccountConfig = serde_json::from_value(config)?;

        if tg_config.token.expose_secret().is_empty() {
            return Err(anyhow::anyhow!("telegram bot token is required"));
        }

        if self.has_account(account_id) {
            warn!(account_id, "telegram account already started, restarting");
            self.stop_account(account_id).await?;
        }

        info!(account_id, "starting telegram account");

        bot::start_polling(
            account_id.to_string(),
            tg_config,
            Arc::clone(&self.accounts),
            Arc::clone(&self.pipeline),
        )
        .await?;

        Ok(())
    }

    async fn stop_account(&mut self, account_id: &str) -> Result<()> {
        let cancel = {
            let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
            accounts.remove(account_id).map(|s| s.cancel)
        };

        if let Some(cancel) = cancel {
            info!(account_id, "stopping telegram account");
            cancel.cancel();
            if let Ok(mut cache) = self.probe_cache.write() {
                cache.remove(account_id);
            }
        } else {
            warn!(account_id, "telegram account not found");
        }

        Ok(())
    }

    fn account_ids(&self) -> Vec<String> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        accounts.keys().cloned().collect()
    }

    fn status(&self) -> Option<&dyn ChannelStatus> {
        Some(self)
    }
}

#[async_trait]
impl ChannelStatus for TelegramPlugin {
    async fn probe(&self, account_id: &str) -> Result<ChannelHealthSnapshot> {
        // Return cached result if fresh enough.
        if let Ok(cache) = self.probe_cache.read()
            && let Some((snap, ts)) = cache.get(account_id)
            && ts.elapsed() < PROBE_CACHE_TTL
        {
            return Ok(snap.clone());
        }

        let bot = {
            let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
            accounts
                .get(account_id)
                .filter(|s| !s.cancel.is_cancelled())
                .map(|s| s.bot.clone())
        };

        let result = match bot {
            Some(bot) => match bot.get_me().await {
                Ok(me) => ChannelHealthSnapshot {
                    connected: true,
                    account_id: account_id.to_string(),
                    details: Some(format!(
                        "Bot: @{}",
                        me.username.as_deref().unwrap_or("unknown")
                    )),
                },
                Err(e) => ChannelHealthSnapshot {
                    connected: false,
                    account_id: account_id.to_string(),
                    details: Some(format!("API error: {e}")),
                },
            },
            None => ChannelHealthSnapshot {
                connected: false,
                account_id: account_id.to_string(),
                details: Some("account not started".into()),
            },
        };

        if let Ok(mut cache) = self.probe_cache.write() {
            cache.insert(account_id.to_string(), (result.clone(), Instant::now()));
        }

        Ok(result)
    }
}
