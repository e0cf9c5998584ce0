//! Reduces a record's child blocks to plain-text paragraphs and attaches
//! them to records. This is the only place block structure is interpreted.
use futures::stream::{self, StreamExt};
use tracing::warn;

use crate::model::{ContentBlock, Record};
use crate::notion::model::{plain_text, Block};
use crate::notion::NotionService;

/// Content fetches in flight at once for one batch.
const FETCH_CONCURRENCY: usize = 4;

/// Paragraph blocks in document order; other block types and empty
/// paragraphs are dropped.
pub fn paragraphs(blocks: &[Block]) -> Vec<ContentBlock> {
    blocks
        .iter()
        .filter(|b| b.kind == "paragraph")
        .filter_map(|b| b.paragraph.as_ref())
        .map(|p| plain_text(&p.rich_text))
        .filter(|text| !text.is_empty())
        .map(ContentBlock)
        .collect()
}

/// Fetch and attach content to one record. A failed fetch attaches empty
/// content so the record can still be relayed.
pub async fn attach(notion: &dyn NotionService, mut record: Record) -> Record {
    let content = match notion.fetch_child_content(&record.id).await {
        Ok(blocks) => blocks,
        Err(err) => {
            warn!(%err, record_id = %record.id, "failed to fetch page content");
            Vec::new()
        }
    };
    record.content = Some(content);
    record
}

/// Attach content to every record, preserving batch order.
pub async fn attach_all(notion: &dyn NotionService, records: Vec<Record>) -> Vec<Record> {
    stream::iter(records)
        .map(|r| attach(notion, r))
        .buffered(FETCH_CONCURRENCY)
        .collect()
        .await
}
