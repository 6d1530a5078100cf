use {
    async_trait::async_trait,
    botbridge_channels::ReplyHandle,
    botbridge_common::{ChatAction, ReplyMarkup},
    teloxide::{
        payloads::SendMessageSetters,
        prelude::*,
        types::{
            ButtonRequest, ChatAction as TgChatAction, ChatId, InlineKeyboardButton,
            InlineKeyboardMarkup, InputFile, KeyboardButton, KeyboardMarkup, KeyboardRemove,
            LinkPreviewOptions, ParseMode, ReplyMarkup as TgReplyMarkup,
        },
    },
    tracing::debug,
};

use crate::error::Error;

/// Reply capability bound to one Telegram chat.
#[derive(Clone)]
pub struct TelegramReply {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramReply {
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        Self { bot, chat_id }
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }
}

/// Inline buttons become an inline keyboard (one button per row), keyboard
/// rows a resized reply keyboard. Without buttons any previous keyboard is
/// removed.
pub fn to_telegram_markup(markup: &ReplyMarkup) -> TgReplyMarkup {
    if !markup.inline.is_empty() {
        let rows = markup
            .inline
            .iter()
            .map(|b| vec![InlineKeyboardButton::callback(b.title.clone(), b.id.clone())]);
        return TgReplyMarkup::InlineKeyboard(InlineKeyboardMarkup::new(rows));
    }
    if !markup.buttons.is_empty() {
        let rows = markup
            .buttons
            .iter()
            .map(|row| row.iter().map(|label| KeyboardButton::new(label.clone())));
        return TgReplyMarkup::Keyboard(KeyboardMarkup::new(rows).resize_keyboard());
    }
    TgReplyMarkup::KeyboardRemove(KeyboardRemove::new())
}

fn to_telegram_action(action: ChatAction) -> TgChatAction {
    match action {
        ChatAction::Typing => TgChatAction::Typing,
        ChatAction::UploadPhoto => TgChatAction::UploadPhoto,
        ChatAction::UploadDocument => TgChatAction::UploadDocument,
        ChatAction::RecordVoice => TgChatAction::RecordVoice,
        ChatAction::FindLocation => TgChatAction::FindLocation,
    }
}

fn no_preview() -> LinkPreviewOptions {
    LinkPreviewOptions {
        is_disabled: true,
        url: None,
        prefer_small_media: false,
        prefer_large_media: false,
        show_above_text: false,
    }
}

#[async_trait]
impl ReplyHandle for TelegramReply {
    async fn reply(&self, text: &str, markup: &ReplyMarkup) -> botbridge_channels::Result<()> {
        debug!(chat_id = self.chat_id.0, "telegram reply");
        self.bot
            .send_message(self.chat_id, text)
            .parse_mode(ParseMode::Markdown)
            .link_preview_options(no_preview())
            .reply_markup(to_telegram_markup(markup))
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn reply_with_photo(&self, url: &str) -> botbridge_channels::Result<()> {
        let parsed: reqwest::Url = url.parse().map_err(|e| Error::InvalidUrl {
            url: url.to_string(),
            detail: format!("{e}"),
        })?;
        self.bot
            .send_photo(self.chat_id, InputFile::url(parsed))
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn reply_with_chat_action(&self, action: ChatAction) -> botbridge_channels::Result<()> {
        self.bot
            .send_chat_action(self.chat_id, to_telegram_action(action))
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn request_contact(
        &self,
        text: &str,
        button_text: &str,
    ) -> botbridge_channels::Result<()> {
        let keyboard = KeyboardMarkup::new([[
            KeyboardButton::new(button_text).request(ButtonRequest::Contact)
        ]])
        .resize_keyboard()
        .one_time_keyboard();
        self.bot
            .send_message(self.chat_id, text)
            .reply_markup(keyboard)
            .await
            .map_err(Error::from)?;
        Ok(())
    }
}
