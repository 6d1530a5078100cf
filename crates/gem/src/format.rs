//! Outbound text conversion and `sendMessage` payload construction.
//!
//! Handlers write Telegram-flavoured markdown (`*bold*`, `_italic_`,
//! `[label](url)`); gem expects `**bold**` and a plain-text title.

use std::sync::LazyLock;

use {
    botbridge_common::ReplyMarkup,
    regex::Regex,
    serde_json::{Map, Value, json},
};

use crate::protocol::MessageType;

static MARKDOWN_SYNTAX: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"(?:_|[*#])|\[(.*?)\]\(.*?\)").expect("markdown syntax pattern is valid")
});

/// Convert handler markdown to gem markup: escaped `\*` is unescaped, a lone
/// `*` becomes `**`, and `_` becomes `*`.
pub fn convert_message_format(text: &str) -> String {
    let text = text.replace("\\*", "*");
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);

    for (i, &c) in chars.iter().enumerate() {
        if c == '*' {
            let star_before = i > 0 && chars[i - 1] == '*';
            let star_after = chars.get(i + 1) == Some(&'*');
            if !star_before && !star_after {
                out.push('*');
            }
        }
        out.push(c);
    }

    out.replace('_', "*")
}

/// Strip markdown emphasis/heading characters and reduce links to their
/// label.
pub fn clear_markdown(text: &str) -> String {
    MARKDOWN_SYNTAX.replace_all(text, "$1").into_owned()
}

/// Parameters for a plain `RichText` message.
pub fn rich_text_params(receiver: &Value, text: &str) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("receiverId".into(), receiver.clone());
    params.insert(
        "messageType".into(),
        Value::from(MessageType::RichText.as_str()),
    );
    params.insert("messageTitle".into(), Value::from(clear_markdown(text)));
    params.insert(
        "message".into(),
        Value::from(json!({"Entries": [], "Text": convert_message_format(text)}).to_string()),
    );
    params
}

/// Parameters for a message carrying buttons (`SPECIAL_COMMANDS`).
///
/// Inline buttons come first, one per row, followed by the keyboard rows.
/// The `data` field is itself a JSON document encoded as a string.
pub fn special_commands_params(
    receiver: &Value,
    text: &str,
    markup: &ReplyMarkup,
) -> Map<String, Value> {
    let inline_rows = markup
        .inline
        .iter()
        .map(|b| json!([{"title": b.title, "id": b.id}]));
    let keyboard_rows = markup.buttons.iter().map(|row| {
        Value::Array(
            row.iter()
                .map(|label| json!({"id": label, "title": label}))
                .collect(),
        )
    });
    let commands: Vec<Value> = inline_rows.chain(keyboard_rows).collect();
    let data = json!({"commands": commands}).to_string();
    let message = json!({
        "title": convert_message_format(text),
        "data": data,
    });

    let mut params = Map::new();
    params.insert("receiverId".into(), receiver.clone());
    params.insert(
        "messageType".into(),
        Value::from(MessageType::SpecialCommands.as_str()),
    );
    params.insert("message".into(), Value::from(message.to_string()));
    params
}

/// Parameters for `sendMessage`, picking the message type from the markup.
pub fn message_params(
    receiver: &Value,
    text: &str,
    markup: &ReplyMarkup,
) -> Map<String, Value> {
    if markup.is_empty() {
        rich_text_params(receiver, text)
    } else {
        special_commands_params(receiver, text, markup)
    }
}

/// Parameters for an image message referencing `url`.
pub fn photo_params(receiver: &Value, url: &str) -> Map<String, Value> {
    let message = json!({
        "Comment": "",
        "FileName": "",
        "LocalUrl": "",
        "RemoteThumbnailUrl": "",
        "duration": 0,
        "remoteSerialization": true,
        "UploadResponce": {
            "responce": {
                "fileName": "image",
                "url": url,
                "mimetype": "image/png",
            },
        },
    });

    let mut params = Map::new();
    params.insert("receiverId".into(), receiver.clone());
    params.insert(
        "messageType".into(),
        Value::from(MessageType::UpdatedImage.as_str()),
    );
    params.insert("message".into(), Value::from(message.to_string()));
    params
}
