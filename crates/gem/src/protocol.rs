//! Wire shapes of the gem bot API.

use std::fmt;

use {
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

/// Sentinel `error.message` the remote returns for an expired session.
pub const SESSION_EXPIRED: &str = "E_SESSION_EXPIRED";

/// Remote operations, addressed by name under the API base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ConnectBot,
    GetMessages,
    ConfirmDelivery,
    SendMessage,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectBot => "connectBot",
            Self::GetMessages => "getMessages",
            Self::ConfirmDelivery => "confirmDelivery",
            Self::SendMessage => "sendMessage",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `messageType` tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageType {
    RichText,
    SpecialCommands,
    SpecialResultCommand,
    UpdatedImage,
    Other(String),
}

impl MessageType {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "RichText" => Self::RichText,
            "SPECIAL_COMMANDS" => Self::SpecialCommands,
            "SPECIAL_RESULT_COMMAND" => Self::SpecialResultCommand,
            "UpdatedImage" => Self::UpdatedImage,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::RichText => "RichText",
            Self::SpecialCommands => "SPECIAL_COMMANDS",
            Self::SpecialResultCommand => "SPECIAL_RESULT_COMMAND",
            Self::UpdatedImage => "UpdatedImage",
            Self::Other(tag) => tag,
        }
    }
}

/// True when `body` is the `{error:{message:"E_SESSION_EXPIRED"}}` sentinel.
pub fn is_session_expired(body: &Value) -> bool {
    body.pointer("/error/message").and_then(Value::as_str) == Some(SESSION_EXPIRED)
}

/// `error.message` of a response, if any.
pub fn error_message(body: &Value) -> Option<&str> {
    body.pointer("/error/message").and_then(Value::as_str)
}

/// One inbound message record as delivered by `getMessages` or the push
/// endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    /// Sender id exactly as the remote sent it; replies echo it unchanged.
    #[serde(default, rename = "senderId")]
    pub sender: Value,
    #[serde(default)]
    pub message_type: String,
    /// Usually a JSON document encoded as a string.
    #[serde(default)]
    pub message: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawMessage {
    /// Decode one record; anything that is not a message object becomes an
    /// untyped record so it still occupies its slot in the batch.
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }

    pub fn kind(&self) -> MessageType {
        MessageType::from_tag(&self.message_type)
    }

    /// Sender id as text, for events and logs.
    pub fn sender_id(&self) -> String {
        id_text(&self.sender)
    }
}

/// One fetch cycle's pending messages plus the timestamp that acknowledges
/// them.
#[derive(Debug, Clone, Default)]
pub struct DeliveryBatch {
    pub items: Vec<RawMessage>,
    pub high_water: i64,
}

impl DeliveryBatch {
    /// Build a batch from a `getMessages` response. `requested_at` is the
    /// fallback high-water mark when the response carries no timestamp.
    pub fn from_response(body: &Value, requested_at: i64) -> Self {
        let high_water = body
            .get("timestamp")
            .and_then(timestamp_value)
            .unwrap_or(requested_at);
        let items = body
            .get("messages")
            .and_then(Value::as_array)
            .map(|messages| messages.iter().cloned().map(RawMessage::from_value).collect())
            .unwrap_or_default();
        Self { items, high_water }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

fn timestamp_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn id_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
