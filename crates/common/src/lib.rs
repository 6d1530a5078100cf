//! Shared types, error definitions, and utilities used across all botbridge crates.

pub mod error;
pub mod types;

pub use {
    error::{Error, FromMessage, Result},
    types::{ChatAction, Contact, EventKind, InlineButton, Platform, ReplyMarkup},
};
