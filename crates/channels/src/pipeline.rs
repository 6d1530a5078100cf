//! Ordered handler chain applied to every inbound event.
//!
//! Handlers run strictly in registration order. A handler that returns
//! [`Flow::Halt`] owns the event and later handlers never see it. Each run
//! works on a snapshot of the handler list taken when the run starts, so
//! registering handlers while events are in flight never affects those runs.

use std::{
    future::Future,
    sync::{
        Arc, RwLock,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use {
    anyhow::Result,
    async_trait::async_trait,
    tracing::{debug, info, warn},
};

use crate::event::InboundEvent;

// ── Flow ────────────────────────────────────────────────────────────────────

/// What a handler wants to happen after it returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Flow {
    /// Pass the event to the next handler.
    #[default]
    Continue,
    /// Stop here; downstream handlers do not run for this event.
    Halt,
}

// ── Handler trait ───────────────────────────────────────────────────────────

#[async_trait]
pub trait Handler: Send + Sync {
    /// A human-readable name for logs and stats.
    fn name(&self) -> &str;

    async fn process(&self, event: &InboundEvent) -> Result<Flow>;
}

/// Adapter turning an async closure into a [`Handler`].
pub struct FnHandler<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(InboundEvent) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Flow>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, event: &InboundEvent) -> Result<Flow> {
        (self.f)(event.clone()).await
    }
}

/// Wrap an async closure as a shareable handler.
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn Handler>
where
    F: Fn(InboundEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Flow>> + Send + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        f,
    })
}

// ── HandlerStats ────────────────────────────────────────────────────────────

/// Per-handler counters.
pub struct HandlerStats {
    pub call_count: AtomicU64,
    pub failure_count: AtomicU64,
    pub halt_count: AtomicU64,
    pub total_latency_us: AtomicU64,
}

impl HandlerStats {
    pub fn new() -> Self {
        Self {
            call_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            halt_count: AtomicU64::new(0),
            total_latency_us: AtomicU64::new(0),
        }
    }

    pub fn record_success(&self, latency: Duration, flow: Flow) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if flow == Flow::Halt {
            self.halt_count.fetch_add(1, Ordering::Relaxed);
        }
        self.total_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self, latency: Duration) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn avg_latency(&self) -> Duration {
        let calls = self.call_count.load(Ordering::Relaxed);
        if calls == 0 {
            return Duration::ZERO;
        }
        let total = self.total_latency_us.load(Ordering::Relaxed);
        Duration::from_micros(total / calls)
    }
}

impl Default for HandlerStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
struct HandlerEntry {
    handler: Arc<dyn Handler>,
    stats: Arc<HandlerStats>,
}

// ── RunOutcome ──────────────────────────────────────────────────────────────

/// How a single pipeline run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// No event (normalization produced nothing); no handler ran.
    Skipped,
    /// Every handler continued.
    Completed,
    /// The named handler halted the chain.
    Halted { handler: String },
    /// The named handler returned an error; the chain stopped for this event.
    Failed { handler: String },
}

// ── Pipeline ────────────────────────────────────────────────────────────────

/// Ordered list of handlers shared by every transport.
pub struct Pipeline {
    handlers: RwLock<Arc<Vec<HandlerEntry>>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Append a handler to the end of the chain.
    ///
    /// The list is copied on write: runs already in progress keep the
    /// snapshot they started with.
    pub fn register(&self, handler: Arc<dyn Handler>) {
        let mut guard = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        let mut next: Vec<HandlerEntry> = (**guard).clone();
        info!(handler = handler.name(), position = next.len(), "pipeline handler registered");
        next.push(HandlerEntry {
            handler,
            stats: Arc::new(HandlerStats::new()),
        });
        *guard = Arc::new(next);
    }

    /// Builder-style [`Pipeline::register`].
    pub fn with_handler(self, handler: Arc<dyn Handler>) -> Self {
        self.register(handler);
        self
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Registered handler names, in execution order.
    pub fn handler_names(&self) -> Vec<String> {
        self.snapshot()
            .iter()
            .map(|e| e.handler.name().to_string())
            .collect()
    }

    /// Stats for the first handler registered under `name`.
    pub fn handler_stats(&self, name: &str) -> Option<Arc<HandlerStats>> {
        self.snapshot()
            .iter()
            .find(|e| e.handler.name() == name)
            .map(|e| Arc::clone(&e.stats))
    }

    fn snapshot(&self) -> Arc<Vec<HandlerEntry>> {
        let guard = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Run `event` through the chain.
    ///
    /// An absent event resolves immediately. A handler error is logged and
    /// ends the run for this event only.
    pub async fn run(&self, event: Option<InboundEvent>) -> RunOutcome {
        let Some(event) = event else {
            debug!("no event to dispatch, skipping pipeline");
            return RunOutcome::Skipped;
        };

        let handlers = self.snapshot();
        debug!(
            platform = %event.platform,
            sender_id = %event.sender_id,
            count = handlers.len(),
            "dispatching event through pipeline"
        );

        for entry in handlers.iter() {
            let start = Instant::now();
            let result = entry.handler.process(&event).await;
            let latency = start.elapsed();

            match result {
                Ok(Flow::Continue) => {
                    entry.stats.record_success(latency, Flow::Continue);
                },
                Ok(Flow::Halt) => {
                    entry.stats.record_success(latency, Flow::Halt);
                    debug!(
                        handler = entry.handler.name(),
                        sender_id = %event.sender_id,
                        "handler halted pipeline"
                    );
                    return RunOutcome::Halted {
                        handler: entry.handler.name().to_string(),
                    };
                },
                Err(e) => {
                    entry.stats.record_failure(latency);
                    warn!(
                        handler = entry.handler.name(),
                        platform = %event.platform,
                        sender_id = %event.sender_id,
                        error = %e,
                        "pipeline handler failed"
                    );
                    return RunOutcome::Failed {
                        handler: entry.handler.name().to_string(),
                    };
                },
            }
        }

        RunOutcome::Completed
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
