//! Telegram channel plugin for botbridge.
//!
//! Long-polls the Telegram Bot API with teloxide and feeds messages, shared
//! contacts and button presses into the same pipeline as the gem transport.

pub mod bot;
pub mod config;
pub mod error;
pub mod normalize;
pub mod outbound;
pub mod plugin;
pub mod state;

pub use {
    config::TelegramAccountConfig,
    error::{Error, Result},
    outbound::TelegramReply,
    plugin::TelegramPlugin,
};
