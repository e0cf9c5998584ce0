//! The chat side of the relay: a small capability trait and its Telegram
//! implementation.
use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::Url;
use teloxide::adaptors::throttle::Limits;
use teloxide::adaptors::Throttle;
use teloxide::payloads::{EditMessageReplyMarkupSetters, SendMessageSetters};
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardButtonKind, InlineKeyboardMarkup, MessageId, ParseMode,
};
use teloxide::{ApiError, RequestError};
use thiserror::Error;
use tracing::{debug, warn};

use crate::format;
use crate::model::{ActionButton, ButtonLayout, CallbackAction, FormattedMessage};

#[derive(Debug, Error)]
pub enum SendError {
    #[error("message is too long")]
    TooLong,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A message that has been delivered and can be edited later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i32,
}

#[async_trait]
pub trait ChatSurface: Send + Sync {
    /// Send an HTML message, optionally with inline buttons.
    async fn send_html(
        &self,
        chat_id: i64,
        text: &str,
        buttons: Option<&ButtonLayout>,
    ) -> Result<MessageRef, SendError>;

    /// Send plain text, no markup.
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), SendError>;

    /// Replace a message's inline buttons. `None` removes them.
    async fn edit_buttons(
        &self,
        target: MessageRef,
        buttons: Option<&ButtonLayout>,
    ) -> Result<(), SendError>;

    async fn answer_callback(&self, callback_id: &str) -> Result<(), SendError>;
}

/// Send a formatted message. If the transport rejects it as too long, retry
/// once with the body cut to the transport fallback length.
pub async fn send_with_fallback(
    chat: &dyn ChatSurface,
    chat_id: i64,
    msg: &FormattedMessage,
) -> Result<MessageRef, SendError> {
    match chat.send_html(chat_id, &msg.text, Some(&msg.buttons)).await {
        Err(SendError::TooLong) => {
            warn!(chat_id, "message too long for transport; retrying shortened");
            let shortened = format::shorten_for_transport(&msg.text);
            chat.send_html(chat_id, &shortened, Some(&msg.buttons)).await
        }
        other => other,
    }
}

pub fn to_markup(layout: &ButtonLayout) -> Result<InlineKeyboardMarkup, SendError> {
    let rows = layout
        .rows
        .iter()
        .map(|row| row.iter().map(to_button).collect::<Result<Vec<_>, _>>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(InlineKeyboardMarkup::new(rows))
}

fn to_button(button: &ActionButton) -> Result<InlineKeyboardButton, SendError> {
    match button {
        ActionButton::Link { label, url } => {
            let url = Url::parse(url).map_err(|e| anyhow!("invalid button url {url}: {e}"))?;
            Ok(InlineKeyboardButton::url(label.clone(), url))
        }
        ActionButton::Callback { label, action } => {
            Ok(InlineKeyboardButton::callback(label.clone(), action.encode()))
        }
    }
}

/// Read back the buttons of a received message. Buttons the relay does not
/// create are skipped.
pub fn from_markup(markup: &InlineKeyboardMarkup) -> ButtonLayout {
    let rows = markup
        .inline_keyboard
        .iter()
        .map(|row| {
            row.iter()
                .filter_map(|b| match &b.kind {
                    InlineKeyboardButtonKind::Url(url) => Some(ActionButton::Link {
                        label: b.text.clone(),
                        url: url.to_string(),
                    }),
                    InlineKeyboardButtonKind::CallbackData(data) => CallbackAction::parse(data)
                        .map(|action| ActionButton::Callback {
                            label: b.text.clone(),
                            action,
                        }),
                    _ => {
                        debug!(text = %b.text, "skipping foreign button");
                        None
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|row| !row.is_empty())
        .collect();
    ButtonLayout::new(rows)
}

fn map_request_error(err: RequestError) -> SendError {
    match err {
        RequestError::Api(ApiError::MessageIsTooLong) => SendError::TooLong,
        other => SendError::Other(other.into()),
    }
}

/// Telegram Bot API implementation, throttled to stay under the flood limits.
pub struct TelegramChat {
    bot: Throttle<Bot>,
}

impl TelegramChat {
    pub fn new(bot: Bot) -> Self {
        Self {
            bot: bot.throttle(Limits::default()),
        }
    }
}

#[async_trait]
impl ChatSurface for TelegramChat {
    async fn send_html(
        &self,
        chat_id: i64,
        text: &str,
        buttons: Option<&ButtonLayout>,
    ) -> Result<MessageRef, SendError> {
        let mut req = self
            .bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html);
        if let Some(layout) = buttons.filter(|l| !l.is_empty()) {
            req = req.reply_markup(to_markup(layout)?);
        }
        let sent = req.await.map_err(map_request_error)?;
        Ok(MessageRef {
            chat_id,
            message_id: sent.id.0,
        })
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), SendError> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .map_err(map_request_error)?;
        Ok(())
    }

    async fn edit_buttons(
        &self,
        target: MessageRef,
        buttons: Option<&ButtonLayout>,
    ) -> Result<(), SendError> {
        let mut req = self
            .bot
            .edit_message_reply_markup(ChatId(target.chat_id), MessageId(target.message_id));
        if let Some(layout) = buttons.filter(|l| !l.is_empty()) {
            req = req.reply_markup(to_markup(layout)?);
        }
        req.await.map_err(map_request_error)?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), SendError> {
        self.bot
            .answer_callback_query(callback_id.to_string())
            .await
            .map_err(map_request_error)?;
        Ok(())
    }
}
