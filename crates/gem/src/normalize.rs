use std::sync::Arc;

use {
    botbridge_channels::{InboundEvent, ReplyHandle},
    botbridge_common::Platform,
    serde_json::Value,
    tracing::debug,
};

use crate::protocol::{MessageType, RawMessage};

const COMMAND_PREFIX: char = '/';

/// Map one raw gem record to an [`InboundEvent`].
///
/// Returns `None` for kinds handlers never see and for payloads that fail to
/// decode; both are dropped before the pipeline.
pub fn normalize(
    raw: &RawMessage,
    account_id: &str,
    reply: Arc<dyn ReplyHandle>,
) -> Option<InboundEvent> {
    let event = InboundEvent::new(Platform::Gem, account_id, raw.sender_id(), reply);
    match raw.kind() {
        MessageType::RichText => {
            let text = rich_text(&raw.message)?;
            let stripped = text.strip_prefix(COMMAND_PREFIX).unwrap_or(&text);
            Some(event.with_text(stripped).with_raw_text(text.clone()))
        },
        MessageType::SpecialResultCommand => {
            let result = command_result(&raw.message)?;
            Some(event.with_action(result))
        },
        other => {
            debug!(
                account_id,
                sender_id = %raw.sender_id(),
                message_type = other.as_str(),
                "dropping gem message of unhandled kind"
            );
            None
        },
    }
}

/// `message` is normally a JSON document encoded as a string; an already
/// decoded object is accepted too.
fn decode(message: &Value) -> Option<Value> {
    match message {
        Value::String(s) => serde_json::from_str(s).ok(),
        Value::Object(_) => Some(message.clone()),
        _ => None,
    }
}

fn rich_text(message: &Value) -> Option<String> {
    let decoded = decode(message)?;
    decoded.get("Text")?.as_str().map(str::to_string)
}

/// `message.data` is itself stringified JSON holding `result`.
fn command_result(message: &Value) -> Option<String> {
    let outer = decode(message)?;
    let data = decode(outer.get("data")?)?;
    match data.get("result")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
