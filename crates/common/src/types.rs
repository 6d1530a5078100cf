//! Platform-neutral value types shared by every transport.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Transport an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Gem,
    Telegram,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gem => "gem",
            Self::Telegram => "telegram",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gem" => Ok(Self::Gem),
            "telegram" => Ok(Self::Telegram),
            other => Err(Error::message(format!("unknown platform: {other}"))),
        }
    }
}

/// Discriminator of a normalized inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Free text typed by the user (command prefix already stripped).
    Text,
    /// A button press or structured command result.
    Action,
    /// The user shared a phone contact.
    Contact,
    Unknown,
}

/// Phone contact shared by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub phone_number: String,
    pub first_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Presence indicator shown while a reply is being prepared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatAction {
    #[default]
    Typing,
    UploadPhoto,
    UploadDocument,
    RecordVoice,
    FindLocation,
}

/// A button attached to the message itself; pressing it yields an action event
/// carrying `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineButton {
    pub title: String,
    pub id: String,
}

impl InlineButton {
    pub fn new(title: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            id: id.into(),
        }
    }
}

/// Buttons offered with a reply.
///
/// `buttons` are keyboard rows whose label is sent back as text; `inline`
/// buttons are attached to the message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyMarkup {
    pub buttons: Vec<Vec<String>>,
    pub inline: Vec<InlineButton>,
}

impl ReplyMarkup {
    pub fn none() -> Self {
        Self::default()
    }

    /// Lay out a flat list of keyboard labels: up to two labels share one
    /// row, longer lists are split into rows of two.
    pub fn from_buttons<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        Self {
            buttons: arrange_buttons(labels),
            inline: Vec::new(),
        }
    }

    /// Use keyboard rows exactly as given.
    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        Self {
            buttons: rows.into_iter().filter(|row| !row.is_empty()).collect(),
            inline: Vec::new(),
        }
    }

    pub fn with_inline(mut self, inline: Vec<InlineButton>) -> Self {
        self.inline = inline;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.buttons.is_empty() && self.inline.is_empty()
    }
}

fn arrange_buttons(labels: Vec<String>) -> Vec<Vec<String>> {
    match labels.len() {
        0 => Vec::new(),
        1 | 2 => vec![labels],
        _ => labels.chunks(2).map(<[String]>::to_vec).collect(),
    }
}
