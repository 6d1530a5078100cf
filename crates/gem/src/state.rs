use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use {
    botbridge_channels::{InboundEvent, Pipeline, RunOutcome},
    tokio::{sync::watch, task::JoinHandle},
    tokio_util::sync::CancellationToken,
};

use crate::{
    client::GemClient, config::GemAccountConfig, normalize::normalize, outbound::GemReply,
    poller::PollState, protocol::RawMessage,
};

/// Shared account state map.
pub type AccountStateMap = Arc<RwLock<HashMap<String, AccountState>>>;

/// Everything needed to turn a raw record into a pipeline run. Shared by the
/// polling loop and the push endpoint.
pub struct AccountContext {
    pub account_id: String,
    pub client: Arc<GemClient>,
    pub pipeline: Arc<Pipeline>,
}

impl AccountContext {
    pub fn event_for(&self, raw: &RawMessage) -> Option<InboundEvent> {
        let reply = Arc::new(GemReply::new(Arc::clone(&self.client), raw.sender.clone()));
        normalize(raw, &self.account_id, reply)
    }

    /// Normalize `raw` and run it through the pipeline.
    pub async fn dispatch(&self, raw: RawMessage) -> RunOutcome {
        let event = self.event_for(&raw);
        self.pipeline.run(event).await
    }
}

/// Per-account runtime state.
pub struct AccountState {
    pub account_id: String,
    pub config: GemAccountConfig,
    pub context: Arc<AccountContext>,
    pub poll_state: watch::Receiver<PollState>,
    pub cancel: CancellationToken,
    pub poll_task: Option<JoinHandle<()>>,
    pub heartbeat_task: Option<JoinHandle<()>>,
    pub webhook_task: Option<JoinHandle<()>>,
}
