//! Wire shapes of the Notion API responses the relay reads. Nothing outside
//! `crate::notion` and `crate::content` touches these directly.
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

use crate::config::Fields;
use crate::model::{Record, Status};

#[derive(Deserialize, Debug, Clone, Default)]
pub struct RichText {
    #[serde(default)]
    pub plain_text: String,
}

/// Concatenate the plain text of every segment. Notion splits a run of text
/// wherever its annotations change.
pub fn plain_text(segments: &[RichText]) -> String {
    segments.iter().map(|s| s.plain_text.as_str()).collect()
}

#[derive(Deserialize, Debug, Clone)]
pub struct SelectOption {
    pub name: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyValue {
    Title {
        title: Vec<RichText>,
    },
    RichText {
        rich_text: Vec<RichText>,
    },
    Status {
        status: Option<SelectOption>,
    },
    Select {
        select: Option<SelectOption>,
    },
    #[serde(other)]
    Other,
}

impl PropertyValue {
    fn text(&self) -> Option<String> {
        match self {
            PropertyValue::Title { title } => Some(plain_text(title)),
            PropertyValue::RichText { rich_text } => Some(plain_text(rich_text)),
            _ => None,
        }
    }

    fn option_name(&self) -> Option<&str> {
        match self {
            PropertyValue::Status { status: Some(o) } | PropertyValue::Select { select: Some(o) } => {
                Some(o.name.as_str())
            }
            _ => None,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct PageObject {
    pub id: String,
    pub url: String,
    pub last_edited_time: DateTime<Utc>,
    #[serde(default)]
    pub properties: HashMap<String, PropertyValue>,
}

impl PageObject {
    pub fn into_record(self, fields: &Fields) -> Record {
        let title = self
            .properties
            .get(&fields.title)
            .and_then(PropertyValue::text)
            .filter(|t| !t.trim().is_empty());
        let status = self
            .properties
            .get(&fields.status)
            .and_then(PropertyValue::option_name)
            .map(Status::from_name);
        let text_properties: BTreeMap<String, String> = self
            .properties
            .iter()
            .filter_map(|(name, value)| value.text().map(|t| (name.clone(), t)))
            .collect();

        Record {
            id: self.id,
            title,
            url: self.url,
            status,
            last_edited: self.last_edited_time,
            text_properties,
            content: None,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct QueryResponse {
    pub results: Vec<PageObject>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ParagraphBlock {
    #[serde(default)]
    pub rich_text: Vec<RichText>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Block {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub paragraph: Option<ParagraphBlock>,
}

#[derive(Deserialize, Debug)]
pub struct BlockChildren {
    pub results: Vec<Block>,
}

#[derive(Deserialize, Debug)]
pub struct DatabaseProperty {
    pub id: String,
    #[serde(rename = "type")]
    pub typ: String,
}

#[derive(Deserialize, Debug)]
pub struct RetrieveDatabaseResp {
    pub id: String,
    #[serde(default)]
    pub title: Vec<RichText>,
    pub properties: HashMap<String, DatabaseProperty>,
}

#[derive(Deserialize, Debug)]
pub struct DatabaseSummary {
    pub id: String,
    #[serde(default)]
    pub title: Vec<RichText>,
}

#[derive(Deserialize, Debug)]
pub struct SearchResponse {
    pub results: Vec<DatabaseSummary>,
}
