#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use notion_relay::chat::{ChatSurface, MessageRef, SendError};
use notion_relay::model::{ButtonLayout, ContentBlock, Record, Status};
use notion_relay::notion::{NotionError, NotionService, PropertyFilter};

pub fn record(id: &str, title: Option<&str>, last_edited: DateTime<Utc>) -> Record {
    Record {
        id: id.into(),
        title: title.map(str::to_string),
        url: format!("https://x/{}", id),
        status: Some(Status::Done),
        last_edited,
        text_properties: BTreeMap::new(),
        content: None,
    }
}

pub fn blocks(paragraphs: &[&str]) -> Vec<ContentBlock> {
    paragraphs
        .iter()
        .map(|p| ContentBlock(p.to_string()))
        .collect()
}

#[derive(Default)]
pub struct RecordingNotion {
    pub done: Mutex<Vec<Record>>,
    pub scheduled: Mutex<Vec<Record>>,
    pub quotes: Mutex<Vec<Record>>,
    pub content: Mutex<HashMap<String, Vec<ContentBlock>>>,
    pub failing_content: Mutex<HashSet<String>>,
    pub fail_queries: AtomicBool,
    pub fail_updates: AtomicBool,
    pub query_delay: Mutex<Option<Duration>>,
    pub done_calls: Mutex<Vec<DateTime<Utc>>>,
    pub updates: Mutex<Vec<(String, Status)>>,
    pub filters: Mutex<Vec<PropertyFilter>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl RecordingNotion {
    pub async fn with_done(records: Vec<Record>) -> Self {
        let notion = Self::default();
        *notion.done.lock().await = records;
        notion
    }

    pub async fn set_content(&self, id: &str, paragraphs: &[&str]) {
        self.content
            .lock()
            .await
            .insert(id.to_string(), blocks(paragraphs));
    }

    pub async fn done_calls(&self) -> Vec<DateTime<Utc>> {
        self.done_calls.lock().await.clone()
    }

    pub async fn updates(&self) -> Vec<(String, Status)> {
        self.updates.lock().await.clone()
    }

    fn failure(&self) -> NotionError {
        NotionError::Timeout
    }
}

#[async_trait]
impl NotionService for RecordingNotion {
    async fn query_done(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Record>, NotionError> {
        self.done_calls.lock().await.push(since);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *self.query_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(self.failure());
        }
        Ok(self
            .done
            .lock()
            .await
            .iter()
            .filter(|r| r.last_edited > since)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn query_scheduled(&self, limit: u32) -> Result<Vec<Record>, NotionError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(self.failure());
        }
        Ok(self
            .scheduled
            .lock()
            .await
            .iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn update_status(&self, record_id: &str, status: &Status) -> Result<(), NotionError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(self.failure());
        }
        self.updates
            .lock()
            .await
            .push((record_id.to_string(), status.clone()));
        Ok(())
    }

    async fn fetch_child_content(
        &self,
        record_id: &str,
    ) -> Result<Vec<ContentBlock>, NotionError> {
        if self.failing_content.lock().await.contains(record_id) {
            return Err(self.failure());
        }
        Ok(self
            .content
            .lock()
            .await
            .get(record_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_schema(&self) -> Result<BTreeMap<String, String>, NotionError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(self.failure());
        }
        Ok(BTreeMap::from([
            ("Creation Title".to_string(), "title".to_string()),
            ("Status".to_string(), "status".to_string()),
        ]))
    }

    async fn pick_random_by_filter(
        &self,
        filter: &PropertyFilter,
    ) -> Result<Option<Record>, NotionError> {
        self.filters.lock().await.push(filter.clone());
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(self.failure());
        }
        Ok(self.quotes.lock().await.first().cloned())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatCall {
    Html {
        chat_id: i64,
        text: String,
        buttons: Option<ButtonLayout>,
    },
    Text {
        chat_id: i64,
        text: String,
    },
    EditButtons {
        target: MessageRef,
        buttons: Option<ButtonLayout>,
    },
    Answer(String),
}

#[derive(Default)]
pub struct RecordingChat {
    calls: Mutex<Vec<ChatCall>>,
    /// Number of upcoming HTML sends to reject as too long.
    pub reject_too_long: AtomicUsize,
    /// HTML sends whose text contains this marker fail outright.
    pub fail_marker: Mutex<Option<String>>,
    next_id: AtomicI32,
}

impl RecordingChat {
    pub async fn calls(&self) -> Vec<ChatCall> {
        self.calls.lock().await.clone()
    }

    pub async fn texts(&self) -> Vec<String> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|c| match c {
                ChatCall::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub async fn html(&self) -> Vec<String> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|c| match c {
                ChatCall::Html { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ChatSurface for RecordingChat {
    async fn send_html(
        &self,
        chat_id: i64,
        text: &str,
        buttons: Option<&ButtonLayout>,
    ) -> Result<MessageRef, SendError> {
        self.calls.lock().await.push(ChatCall::Html {
            chat_id,
            text: text.to_string(),
            buttons: buttons.cloned(),
        });
        let reject = self
            .reject_too_long
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if reject {
            return Err(SendError::TooLong);
        }
        if let Some(marker) = self.fail_marker.lock().await.as_deref() {
            if text.contains(marker) {
                return Err(SendError::Other(anyhow::anyhow!("chat not found")));
            }
        }
        Ok(MessageRef {
            chat_id,
            message_id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
        })
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), SendError> {
        self.calls.lock().await.push(ChatCall::Text {
            chat_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn edit_buttons(
        &self,
        target: MessageRef,
        buttons: Option<&ButtonLayout>,
    ) -> Result<(), SendError> {
        self.calls.lock().await.push(ChatCall::EditButtons {
            target,
            buttons: buttons.cloned(),
        });
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), SendError> {
        self.calls
            .lock()
            .await
            .push(ChatCall::Answer(callback_id.to_string()));
        Ok(())
    }
}
