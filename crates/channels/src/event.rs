use std::{fmt, sync::Arc};

use {
    async_trait::async_trait,
    botbridge_common::{ChatAction, Contact, EventKind, Platform, ReplyMarkup},
};

use crate::Result;

/// Reply operations bound to the sender of an inbound event.
///
/// Implementations hold only what they need to address the sender again
/// (sender/chat id plus a shared client), never the raw transport message,
/// so a handle stays usable after the fetch cycle that produced it.
#[async_trait]
pub trait ReplyHandle: Send + Sync {
    async fn reply(&self, text: &str, markup: &ReplyMarkup) -> Result<()>;

    async fn reply_with_photo(&self, url: &str) -> Result<()>;

    /// Show a presence indicator. No-op by default.
    async fn reply_with_chat_action(&self, _action: ChatAction) -> Result<()> {
        Ok(())
    }

    /// Ask the user to share their phone contact. Platforms without a contact
    /// button fall back to a plain reply.
    async fn request_contact(&self, text: &str, _button_text: &str) -> Result<()> {
        self.reply(text, &ReplyMarkup::none()).await
    }
}

/// A message normalized into the platform-agnostic shape handlers consume.
#[derive(Clone)]
pub struct InboundEvent {
    pub kind: EventKind,
    pub platform: Platform,
    /// Configured account the event arrived on.
    pub account_id: String,
    pub sender_id: String,
    pub text: String,
    /// Text before any command prefix stripping or decoding.
    pub raw_text: Option<String>,
    /// Button/command identifier for [`EventKind::Action`] events.
    pub action: Option<String>,
    pub contact: Option<Contact>,
    reply: Arc<dyn ReplyHandle>,
}

impl InboundEvent {
    pub fn new(
        platform: Platform,
        account_id: impl Into<String>,
        sender_id: impl Into<String>,
        reply: Arc<dyn ReplyHandle>,
    ) -> Self {
        Self {
            kind: EventKind::Unknown,
            platform,
            account_id: account_id.into(),
            sender_id: sender_id.into(),
            text: String::new(),
            raw_text: None,
            action: None,
            contact: None,
            reply,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.kind = EventKind::Text;
        self.text = text.into();
        self
    }

    /// Mark as an action event; `text`, `raw_text` and `action` all carry
    /// the action identifier.
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        let action = action.into();
        self.kind = EventKind::Action;
        self.text = action.clone();
        self.raw_text = Some(action.clone());
        self.action = Some(action);
        self
    }

    pub fn with_contact(mut self, contact: Contact) -> Self {
        self.kind = EventKind::Contact;
        self.contact = Some(contact);
        self
    }

    pub fn with_raw_text(mut self, raw_text: impl Into<String>) -> Self {
        self.raw_text = Some(raw_text.into());
        self
    }

    pub fn is_action(&self) -> bool {
        self.kind == EventKind::Action
    }

    pub fn reply_handle(&self) -> Arc<dyn ReplyHandle> {
        Arc::clone(&self.reply)
    }

    pub async fn reply(&self, text: &str) -> Result<()> {
        self.reply.reply(text, &ReplyMarkup::none()).await
    }

    pub async fn reply_with_markup(&self, text: &str, markup: &ReplyMarkup) -> Result<()> {
        self.reply.reply(text, markup).await
    }

    pub async fn reply_with_photo(&self, url: &str) -> Result<()> {
        self.reply.reply_with_photo(url).await
    }

    pub async fn reply_with_chat_action(&self, action: ChatAction) -> Result<()> {
        self.reply.reply_with_chat_action(action).await
    }

    pub async fn request_contact(&self, text: &str, button_text: &str) -> Result<()> {
        self.reply.request_contact(text, button_text).await
    }
}

impl fmt::Debug for InboundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundEvent")
            .field("kind", &self.kind)
            .field("platform", &self.platform)
            .field("account_id", &self.account_id)
            .field("sender_id", &self.sender_id)
            .field("text", &self.text)
            .field("raw_text", &self.raw_text)
            .field("action", &self.action)
            .field("contact", &self.contact)
            .finish_non_exhaustive()
    }
}
