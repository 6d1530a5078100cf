use std::sync::Arc;

use {
    botbridge_channels::{InboundEvent, ReplyHandle},
    botbridge_common::{Contact, Platform},
    teloxide::types::{CallbackQuery, ChatId, Message},
};

/// Chat a reply to `msg` should go to.
pub fn message_chat(msg: &Message) -> ChatId {
    msg.chat.id
}

/// Chat a reply to a button press should go to: the chat of the message the
/// button was attached to, else the user's private chat.
pub fn callback_chat(query: &CallbackQuery) -> ChatId {
    query
        .message
        .as_ref()
        .map(|m| m.chat().id)
        .unwrap_or(ChatId(query.from.id.0 as i64))
}

/// Normalize an incoming message: a shared contact wins over text, anything
/// else (stickers, media, service messages) is absent.
pub fn normalize_message(
    msg: &Message,
    account_id: &str,
    reply: Arc<dyn ReplyHandle>,
) -> Option<InboundEvent> {
    let sender_id = msg
        .from
        .as_ref()
        .map(|u| u.id.0.to_string())
        .unwrap_or_else(|| msg.chat.id.0.to_string());
    let event = InboundEvent::new(Platform::Telegram, account_id, sender_id, reply);

    if let Some(contact) = msg.contact() {
        return Some(event.with_contact(Contact {
            phone_number: contact.phone_number.clone(),
            first_name: contact.first_name.clone(),
            last_name: contact.last_name.clone(),
            user_id: contact.user_id.map(|id| id.0.to_string()),
        }));
    }

    msg.text().map(|text| event.with_text(text))
}

/// Normalize an inline button press into an action event.
pub fn normalize_callback(
    query: &CallbackQuery,
    account_id: &str,
    reply: Arc<dyn ReplyHandle>,
) -> Option<InboundEvent> {
    let data = query.data.as_deref()?;
    let event = InboundEvent::new(
        Platform::Telegram,
        account_id,
        query.from.id.0.to_string(),
        reply,
    );
    Some(event.with_action(data))
}
