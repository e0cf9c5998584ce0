use anyhow::Result;
use std::sync::Arc;
use teloxide::dispatching::{HandlerExt, UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use teloxide::utils::command::BotCommands;
use tracing::{debug, error, info, instrument, warn};

use crate::chat::{self, ChatSurface, MessageRef};
use crate::config::Fields;
use crate::content;
use crate::model::{ActionTag, ButtonLayout, CallbackAction, Status};
use crate::notion::{NotionService, PropertyFilter};
use crate::poller::{dispatch_batch, Delivery, Poller};

pub const QUOTE_TYPE: &str = "Quote";

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "snake_case", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "show usage")]
    Start,
    #[command(description = "show this chat's id")]
    GetChatId,
    #[command(description = "check for newly done items")]
    Check,
    #[command(description = "log the database schema")]
    Schema,
    #[command(description = "fetch a random quote")]
    Quote,
    #[command(description = "list scheduled items")]
    ViewScheduled,
}

/// An inline button press, detached from the Telegram types.
#[derive(Debug, Clone)]
pub struct CallbackEvent {
    pub id: String,
    pub data: Option<String>,
    pub message: Option<MessageRef>,
    pub buttons: Option<ButtonLayout>,
}

impl From<CallbackQuery> for CallbackEvent {
    fn from(q: CallbackQuery) -> Self {
        let message = q.message.as_ref().map(|m| MessageRef {
            chat_id: m.chat.id.0,
            message_id: m.id.0,
        });
        let buttons = q
            .message
            .as_ref()
            .and_then(|m| m.reply_markup())
            .map(chat::from_markup);
        Self {
            id: q.id,
            data: q.data,
            message,
            buttons,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApproveOutcome {
    Scheduled,
    Failed,
}

/// Interactive entry points sharing the poller's repository and chat.
pub struct Relay {
    notion: Arc<dyn NotionService>,
    chat: Arc<dyn ChatSurface>,
    poller: Arc<Poller>,
    fields: Fields,
    limit: u32,
}

impl Relay {
    pub fn new(
        notion: Arc<dyn NotionService>,
        chat: Arc<dyn ChatSurface>,
        poller: Arc<Poller>,
        fields: Fields,
        limit: u32,
    ) -> Self {
        Self {
            notion,
            chat,
            poller,
            fields,
            limit,
        }
    }

    #[instrument(skip(self))]
    pub async fn handle_command(&self, chat_id: i64, cmd: Command) -> Result<()> {
        info!("command received");
        match cmd {
            Command::Start => {
                self.chat
                    .send_text(
                        chat_id,
                        "Bot started. Use /check to fetch recent items or /quote to get a random quote.",
                    )
                    .await?;
            }
            Command::GetChatId => {
                self.chat
                    .send_text(chat_id, &format!("Your chat ID is: {}", chat_id))
                    .await?;
            }
            Command::Check => match self.poller.poll_once(chat_id, Delivery::Reply).await {
                Ok(report) if report.fetched == 0 => {
                    self.chat.send_text(chat_id, "No new items found.").await?;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(%err, "manual check failed");
                    self.chat
                        .send_text(chat_id, "Failed to query Notion. Please try again later.")
                        .await?;
                }
            },
            Command::Schema => {
                match self.notion.fetch_schema().await {
                    Ok(schema) => {
                        info!("Database properties:");
                        for (name, typ) in &schema {
                            info!("- {}: {}", name, typ);
                        }
                    }
                    Err(err) => error!(%err, "failed to fetch database schema"),
                }
                self.chat
                    .send_text(chat_id, "Database schema printed to console.")
                    .await?;
            }
            Command::Quote => {
                let reply = self.random_quote().await;
                self.chat.send_text(chat_id, &reply).await?;
            }
            Command::ViewScheduled => match self.notion.query_scheduled(self.limit).await {
                Ok(records) if records.is_empty() => {
                    self.chat
                        .send_text(chat_id, "No scheduled items found.")
                        .await?;
                }
                Ok(records) => {
                    let records = content::attach_all(self.notion.as_ref(), records).await;
                    dispatch_batch(self.chat.as_ref(), chat_id, &records, Delivery::Reply).await;
                }
                Err(err) => {
                    warn!(%err, "failed to query scheduled items");
                    self.chat
                        .send_text(chat_id, "Failed to query Notion. Please try again later.")
                        .await?;
                }
            },
        }
        Ok(())
    }

    /// A random record of type Quote rendered as `"<quote>" - <author>`.
    pub async fn random_quote(&self) -> String {
        let filter = PropertyFilter::select(&self.fields.kind, QUOTE_TYPE);
        match self.notion.pick_random_by_filter(&filter).await {
            Ok(Some(record)) => {
                match (
                    record.text(&self.fields.content),
                    record.text(&self.fields.author),
                ) {
                    (Some(quote), Some(author)) => format!("\"{}\" - {}", quote, author),
                    _ => {
                        warn!(record_id = %record.id, "quote is missing content or author");
                        "Error fetching quote.".to_string()
                    }
                }
            }
            Ok(None) => "No quotes found in the database.".to_string(),
            Err(err) => {
                error!(%err, "failed to fetch quote");
                "Error fetching quote.".to_string()
            }
        }
    }

    #[instrument(skip_all, fields(callback_id = %event.id))]
    pub async fn handle_callback(&self, event: CallbackEvent) -> Result<()> {
        if let Err(err) = self.chat.answer_callback(&event.id).await {
            warn!(%err, "failed to answer callback");
        }
        let Some(action) = event.data.as_deref().and_then(CallbackAction::parse) else {
            debug!(data = ?event.data, "ignoring unknown callback");
            return Ok(());
        };
        match action.tag {
            ActionTag::Approve => {
                self.approve(event.message, event.buttons.as_ref(), &action.record_id)
                    .await?;
            }
        }
        Ok(())
    }

    /// Move the record to Scheduled. On success the Approve button is
    /// removed from the originating message; on failure it is left as is.
    pub async fn approve(
        &self,
        origin: Option<MessageRef>,
        buttons: Option<&ButtonLayout>,
        record_id: &str,
    ) -> Result<ApproveOutcome> {
        let outcome = match self.notion.update_status(record_id, &Status::Scheduled).await {
            Ok(()) => ApproveOutcome::Scheduled,
            Err(err) => {
                warn!(%err, record_id, "failed to schedule record");
                ApproveOutcome::Failed
            }
        };

        let Some(origin) = origin else {
            warn!(record_id, "callback without an accessible message; no reply sent");
            return Ok(outcome);
        };

        match outcome {
            ApproveOutcome::Scheduled => {
                let remaining = buttons
                    .map(|b| b.without_action(ActionTag::Approve))
                    .filter(|b| !b.is_empty());
                if let Err(err) = self.chat.edit_buttons(origin, remaining.as_ref()).await {
                    warn!(%err, record_id, "failed to update message buttons");
                }
                self.chat
                    .send_text(origin.chat_id, "Item scheduled successfully!")
                    .await?;
            }
            ApproveOutcome::Failed => {
                self.chat
                    .send_text(
                        origin.chat_id,
                        "Failed to schedule item. Please try again later.",
                    )
                    .await?;
            }
        }
        Ok(outcome)
    }
}

async fn on_command(msg: Message, cmd: Command, relay: Arc<Relay>) -> Result<()> {
    relay.handle_command(msg.chat.id.0, cmd).await
}

async fn on_callback(q: CallbackQuery, relay: Arc<Relay>) -> Result<()> {
    relay.handle_callback(q.into()).await
}

/// Update routing for the dispatcher: commands and inline button presses.
pub fn schema() -> UpdateHandler<anyhow::Error> {
    dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(on_command),
        )
        .branch(Update::filter_callback_query().endpoint(on_callback))
}
