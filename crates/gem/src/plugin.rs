use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, RwLock},
    time::Duration,
};

use {
    anyhow::Result,
    async_trait::async_trait,
    botbridge_channels::{ChannelHealthSnapshot, ChannelPlugin, ChannelStatus, Pipeline},
    secrecy::ExposeSecret,
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

use crate::{
    client::GemClient,
    config::GemAccountConfig,
    poller::{PollState, Poller},
    state::{AccountContext, AccountState, AccountStateMap},
    webhook,
};

/// How long `stop_account` waits for the current polling cycle to finish
/// before aborting it. An aborted cycle is never confirmed, so its batch is
/// redelivered on the next start.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Gem channel plugin.
pub struct GemPlugin {
    accounts: AccountStateMap,
    pipeline: Arc<Pipeline>,
}

impl GemPlugin {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            accounts: Arc::new(RwLock::new(HashMap::new())),
            pipeline,
        }
    }

    pub fn has_account(&self, account_id: &str) -> bool {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        accounts.contains_key(account_id)
    }

    /// Current polling state of an account.
    pub fn poll_state(&self, account_id: &str) -> Option<PollState> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        accounts
            .get(account_id)
            .map(|s| s.poll_state.borrow().clone())
    }

    /// Shared client of a started account, e.g. for proactive sends.
    pub fn client(&self, account_id: &str) -> Option<Arc<GemClient>> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        accounts
            .get(account_id)
            .map(|s| Arc::clone(&s.context.client))
    }

    pub fn account_config(&self, account_id: &str) -> Option<serde_json::Value> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        accounts
            .get(account_id)
            .and_then(|s| serde_json::to_value(&s.config).ok())
    }
}

#[async_trait]
impl ChannelPlugin for GemPlugin {
    fn id(&self) -> &str {
        "gem"
    }

    fn name(&self) -> &str {
        "Gem"
    }

    async fn start_account(&mut self, account_id: &str, config: serde_json::Value) -> Result<()> {
        let gem_config: GemAccountConfig = serde_json::from_value(config)?;
        if gem_config.token.expose_secret().is_empty() {
            return Err(anyhow::anyhow!("gem bot token is required"));
        }
        let webhook_addr = gem_config
            .webhook_bind
            .as_deref()
            .map(str::parse::<SocketAddr>)
            .transpose()?;

        if self.has_account(account_id) {
            warn!(account_id, "gem account already started, restarting");
            self.stop_account(account_id).await?;
        }

        info!(account_id, url = %gem_config.url, "starting gem account");

        let client = Arc::new(GemClient::new(&gem_config)?);
        let context = Arc::new(AccountContext {
            account_id: account_id.to_string(),
            client: Arc::clone(&client),
            pipeline: Arc::clone(&self.pipeline),
        });
        let cancel = CancellationToken::new();

        // The first polling cycle authenticates; the heartbeat only refreshes.
        let heartbeat_task =
            client.spawn_heartbeat(gem_config.reconnect_interval(), cancel.clone());

        let webhook_task = match webhook_addr {
            Some(addr) => Some(webhook::serve(addr, Arc::clone(&context), cancel.clone()).await?),
            None => None,
        };

        let poller = Poller::new(Arc::clone(&context), gem_config.poll_interval());
        let poll_state = poller.subscribe();
        let poll_cancel = cancel.clone();
        let poll_task = tokio::spawn(async move {
            // fatal errors are logged by the loop itself
            let _ = poller.run(poll_cancel).await;
        });

        let state = AccountState {
            account_id: account_id.to_string(),
            config: gem_config,
            context,
            poll_state,
            cancel,
            poll_task: Some(poll_task),
            heartbeat_task: Some(heartbeat_task),
            webhook_task,
        };
        let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        accounts.insert(account_id.to_string(), state);
        Ok(())
    }

    async fn stop_account(&mut self, account_id: &str) -> Result<()> {
        let state = {
            let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
            accounts.remove(account_id)
        };
        let Some(mut state) = state else {
            warn!(account_id, "gem account not found");
            return Ok(());
        };

        info!(account_id = %state.account_id, "stopping gem account");
        state.cancel.cancel();

        if let Some(task) = state.heartbeat_task.take() {
            task.abort();
        }
        if let Some(mut task) = state.poll_task.take()
            && tokio::time::timeout(STOP_GRACE, &mut task).await.is_err()
        {
            warn!(account_id, "gem polling cycle did not finish in time, aborting");
            task.abort();
        }
        if let Some(task) = state.webhook_task.take() {
            let _ = tokio::time::timeout(STOP_GRACE, task).await;
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
impl ChannelStatus for GemPlugin {
    async fn probe(&self, account_id: &str) -> Result<ChannelHealthSnapshot> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        let Some(state) = accounts.get(account_id) else {
            return Ok(ChannelHealthSnapshot {
                connected: false,
                account_id: account_id.to_string(),
                details: Some("account not started".into()),
            });
        };

        let poll_state = state.poll_state.borrow().clone();
        let session = state.context.client.current_session();
        let live = session.as_ref().is_some_and(|s| s.is_live());
        let details = match &poll_state {
            PollState::Failed { reason } => format!("polling failed: {reason}"),
            other => match session {
                Some(s) => format!("{other:?}, session generation {}", s.generation()),
                None => format!("{other:?}, not authenticated"),
            },
        };

        Ok(ChannelHealthSnapshot {
            connected: live && poll_state.is_running(),
            account_id: account_id.to_string(),
            details: Some(details),
        })
    }
}
