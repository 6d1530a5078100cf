//! Transport-neutral event model and dispatch.
//!
//! Every transport (gem, Telegram) normalizes what it receives into an
//! [`InboundEvent`] and hands it to the shared [`Pipeline`]. Transports
//! themselves implement [`ChannelPlugin`] so the process can start and stop
//! accounts uniformly.

pub mod error;
pub mod event;
pub mod pipeline;
pub mod plugin;
pub mod registry;

pub use {
    error::{Error, Result},
    event::{InboundEvent, ReplyHandle},
    pipeline::{FnHandler, Flow, Handler, HandlerStats, Pipeline, RunOutcome, handler_fn},
    plugin::{ChannelHealthSnapshot, ChannelPlugin, ChannelStatus},
    registry::ChannelRegistry,
};
