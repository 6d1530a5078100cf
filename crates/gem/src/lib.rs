//! Gem messenger transport for botbridge.
//!
//! Talks to the gem bot API over JSON POST calls: authenticates with the bot
//! token to obtain a session, long-polls `getMessages`, runs every fetched
//! message through the shared [`Pipeline`](botbridge_channels::Pipeline) and
//! acknowledges the batch with `confirmDelivery` once all of them finished.
//! Expired sessions are renewed transparently; transport failures are retried.

pub mod client;
pub mod config;
pub mod error;
pub mod format;
pub mod normalize;
pub mod outbound;
pub mod plugin;
pub mod poller;
pub mod protocol;
pub mod session;
pub mod state;
pub mod webhook;

pub use {
    client::GemClient,
    config::GemAccountConfig,
    error::{Error, Result},
    plugin::GemPlugin,
    poller::{CycleOutcome, PollState, Poller},
    session::{Session, SessionStore},
};
