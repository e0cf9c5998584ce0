use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, instrument, warn};

use crate::chat::{self, ChatSurface};
use crate::content;
use crate::format;
use crate::model::{Checkpoint, Record};
use crate::notion::{NotionError, NotionService};

/// How per-item formatting failures are surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Scheduled broadcast: failures go to the log only.
    Broadcast,
    /// Reply to an operator command: failures also get a chat notice.
    Reply,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub fetched: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Format and send each record. One failing record never stops the rest.
pub async fn dispatch_batch(
    chat: &dyn ChatSurface,
    chat_id: i64,
    records: &[Record],
    delivery: Delivery,
) -> BatchReport {
    let mut report = BatchReport {
        fetched: records.len(),
        ..Default::default()
    };
    for record in records {
        let Some(msg) = format::format(record) else {
            error!(record_id = %record.id, "failed to format record");
            report.failed += 1;
            if delivery == Delivery::Reply {
                let notice = format!("Error displaying content for {}", record.display_name());
                if let Err(err) = chat.send_text(chat_id, &notice).await {
                    warn!(%err, record_id = %record.id, "failed to send error notice");
                }
            }
            continue;
        };
        match chat::send_with_fallback(chat, chat_id, &msg).await {
            Ok(_) => report.sent += 1,
            Err(err) => {
                error!(%err, record_id = %record.id, "failed to send record");
                report.failed += 1;
            }
        }
    }
    report
}

/// Fetches records that became Done since the checkpoint and relays them.
///
/// The checkpoint lock is held for the whole cycle, so a manual check and a
/// timer tick never poll concurrently and never read a stale checkpoint.
pub struct Poller {
    notion: Arc<dyn NotionService>,
    chat: Arc<dyn ChatSurface>,
    limit: u32,
    checkpoint: Mutex<Checkpoint>,
}

impl Poller {
    pub fn new(
        notion: Arc<dyn NotionService>,
        chat: Arc<dyn ChatSurface>,
        limit: u32,
        initial: Checkpoint,
    ) -> Self {
        Self {
            notion,
            chat,
            limit,
            checkpoint: Mutex::new(initial),
        }
    }

    pub async fn checkpoint(&self) -> Checkpoint {
        *self.checkpoint.lock().await
    }

    /// Run one poll cycle, delivering to `chat_id`.
    ///
    /// On query failure the checkpoint is left untouched. Otherwise it moves
    /// to the time the query returned, even if some records failed to send.
    #[instrument(skip(self))]
    pub async fn poll_once(
        &self,
        chat_id: i64,
        delivery: Delivery,
    ) -> Result<BatchReport, NotionError> {
        let mut checkpoint = self.checkpoint.lock().await;
        let records = self.notion.query_done(checkpoint.at(), self.limit).await?;
        let fetched_at = Utc::now();

        let records = content::attach_all(self.notion.as_ref(), records).await;
        let report = dispatch_batch(self.chat.as_ref(), chat_id, &records, delivery).await;

        checkpoint.advance(fetched_at);
        info!(
            fetched = report.fetched,
            sent = report.sent,
            failed = report.failed,
            checkpoint = %checkpoint.at(),
            "poll cycle finished"
        );
        Ok(report)
    }

    /// Poll forever: first after `first_delay`, then every `period`.
    pub async fn run(self: Arc<Self>, chat_id: i64, first_delay: Duration, period: Duration) {
        let mut ticker = tokio::time::interval_at(Instant::now() + first_delay, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(?period, "polling loop started");
        loop {
            ticker.tick().await;
            if let Err(err) = self.poll_once(chat_id, Delivery::Broadcast).await {
                error!(%err, "poll failed; checkpoint unchanged");
            }
        }
    }
}
