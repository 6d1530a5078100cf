//! Long-polling loop with a per-batch completion barrier.
//!
//! One cycle fetches pending messages, runs each of them through the
//! pipeline concurrently, waits until every run finished and only then
//! confirms the batch with its high-water timestamp. A crash between
//! dispatch and confirm therefore causes redelivery of that batch only.
//! Cycles never overlap.

use std::{sync::Arc, time::Duration};

use {
    botbridge_channels::RunOutcome,
    tokio::{sync::watch, task::JoinSet},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{error::Result, state::AccountContext};

/// Where the loop currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    /// Between cycles.
    Idle,
    /// `getMessages` in flight.
    Fetching,
    /// Batch fanned out; waiting for the completion barrier.
    Dispatching { pending: usize },
    /// `confirmDelivery` in flight.
    Confirming { high_water: i64 },
    /// Cancelled by the operator.
    Stopped,
    /// Authentication was refused; the loop exited.
    Failed { reason: String },
}

impl PollState {
    pub fn is_running(&self) -> bool {
        !matches!(self, Self::Stopped | Self::Failed { .. })
    }
}

/// Result of a single fetch cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing pending; no confirmation was sent.
    Empty,
    /// The batch was fully processed and acknowledged.
    Confirmed {
        high_water: i64,
        /// Items that reached the pipeline.
        dispatched: usize,
        /// Items that normalized to nothing.
        skipped: usize,
        /// Dispatch tasks that panicked.
        panicked: usize,
    },
}

pub struct Poller {
    context: Arc<AccountContext>,
    interval: Duration,
    state: watch::Sender<PollState>,
}

impl Poller {
    pub fn new(context: Arc<AccountContext>, interval: Duration) -> Self {
        let (state, _) = watch::channel(PollState::Idle);
        Self {
            context,
            interval,
            state,
        }
    }

    pub fn state(&self) -> PollState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: PollState) {
        self.state.send_replace(state);
    }

    /// Run cycles until `cancel` fires or authentication is refused.
    ///
    /// Cancellation is observed between cycles; a cycle already in progress,
    /// including its retries, runs to completion first.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let account_id = self.context.account_id.as_str();
        info!(account_id, "starting gem polling loop");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.poll_once().await {
                Ok(CycleOutcome::Empty) => {},
                Ok(CycleOutcome::Confirmed {
                    high_water,
                    dispatched,
                    skipped,
                    panicked,
                }) => {
                    debug!(
                        account_id,
                        high_water, dispatched, skipped, panicked, "gem batch confirmed"
                    );
                },
                Err(e) if e.is_fatal() => {
                    error!(account_id, error = %e, "gem polling stopped");
                    self.set_state(PollState::Failed {
                        reason: e.to_string(),
                    });
                    return Err(e);
                },
                Err(e) => {
                    warn!(account_id, error = %e, "gem polling cycle failed");
                    self.set_state(PollState::Idle);
                },
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {},
            }
        }

        info!(account_id, "gem polling stopped");
        self.set_state(PollState::Stopped);
        Ok(())
    }

    /// One fetch → dispatch → confirm cycle.
    pub async fn poll_once(&self) -> Result<CycleOutcome> {
        let account_id = self.context.account_id.as_str();

        self.set_state(PollState::Fetching);
        let batch = self.context.client.fetch_pending(now_ms()).await?;
        if batch.is_empty() {
            self.set_state(PollState::Idle);
            return Ok(CycleOutcome::Empty);
        }

        let high_water = batch.high_water;
        debug!(account_id, count = batch.len(), high_water, "got gem messages");
        self.set_state(PollState::Dispatching {
            pending: batch.len(),
        });

        let mut tasks = JoinSet::new();
        for raw in batch.items {
            let context = Arc::clone(&self.context);
            tasks.spawn(async move { context.dispatch(raw).await });
        }

        let (mut dispatched, mut skipped, mut panicked) = (0, 0, 0);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(RunOutcome::Skipped) => skipped += 1,
                Ok(_) => dispatched += 1,
                Err(e) => {
                    panicked += 1;
                    error!(account_id, error = %e, "gem dispatch task panicked");
                },
            }
            self.set_state(PollState::Dispatching {
                pending: tasks.len(),
            });
        }

        self.set_state(PollState::Confirming { high_water });
        self.context.client.confirm(high_water).await?;
        self.set_state(PollState::Idle);

        Ok(CycleOutcome::Confirmed {
            high_water,
            dispatched,
            skipped,
            panicked,
        })
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
