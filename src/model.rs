use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Workflow status of a record. Only the values the relay acts on are named.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Done,
    Scheduled,
    Other(String),
}

impl Status {
    pub fn as_str(&self) -> &str {
        match self {
            Status::Done => "Done",
            Status::Scheduled => "Scheduled",
            Status::Other(name) => name,
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            "Done" => Status::Done,
            "Scheduled" => Status::Scheduled,
            other => Status::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One paragraph of plain text, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock(pub String);

impl ContentBlock {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A page in the monitored database, decoded from a query response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    /// `None` when the title property is absent or empty.
    pub title: Option<String>,
    pub url: String,
    pub status: Option<Status>,
    pub last_edited: DateTime<Utc>,
    /// Plain text of every title/rich-text property, keyed by property name.
    pub text_properties: BTreeMap<String, String>,
    /// Populated by the content extractor; `None` until then.
    pub content: Option<Vec<ContentBlock>>,
}

impl Record {
    pub fn text(&self, property: &str) -> Option<&str> {
        self.text_properties
            .get(property)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Title if known, otherwise the record id. Used in operator-facing errors.
    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }
}

/// Lower bound for the next "done since" query. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Checkpoint(DateTime<Utc>);

impl Checkpoint {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    pub fn lookback(days: i64) -> Self {
        Self(Utc::now() - chrono::Duration::days(days))
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.0
    }

    /// Move to `to` if it is later; returns whether the checkpoint moved.
    pub fn advance(&mut self, to: DateTime<Utc>) -> bool {
        if to > self.0 {
            self.0 = to;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionTag {
    Approve,
}

impl ActionTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionTag::Approve => "approve",
        }
    }
}

/// Payload of a callback button: `<tag>:<record id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackAction {
    pub tag: ActionTag,
    pub record_id: String,
}

impl CallbackAction {
    pub fn approve(record_id: impl Into<String>) -> Self {
        Self {
            tag: ActionTag::Approve,
            record_id: record_id.into(),
        }
    }

    pub fn encode(&self) -> String {
        format!("{}:{}", self.tag.as_str(), self.record_id)
    }

    /// Parse `action:payload`. Unknown actions and empty payloads yield `None`.
    pub fn parse(data: &str) -> Option<Self> {
        let (action, payload) = data.split_once(':')?;
        if payload.is_empty() {
            return None;
        }
        let tag = match action {
            "approve" => ActionTag::Approve,
            _ => return None,
        };
        Some(Self {
            tag,
            record_id: payload.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionButton {
    Link { label: String, url: String },
    Callback { label: String, action: CallbackAction },
}

impl ActionButton {
    pub fn label(&self) -> &str {
        match self {
            ActionButton::Link { label, .. } | ActionButton::Callback { label, .. } => label,
        }
    }

    fn has_tag(&self, tag: ActionTag) -> bool {
        matches!(self, ActionButton::Callback { action, .. } if action.tag == tag)
    }
}

/// Rows of inline buttons attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonLayout {
    pub rows: Vec<Vec<ActionButton>>,
}

impl ButtonLayout {
    pub fn new(rows: Vec<Vec<ActionButton>>) -> Self {
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(Vec::is_empty)
    }

    pub fn buttons(&self) -> impl Iterator<Item = &ActionButton> {
        self.rows.iter().flatten()
    }

    /// Drop every callback button carrying `tag`, and any row left empty.
    pub fn without_action(&self, tag: ActionTag) -> Self {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .filter(|b| !b.has_tag(tag))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .filter(|row| !row.is_empty())
            .collect();
        Self { rows }
    }
}

/// Ready-to-send message body (HTML) and its buttons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedMessage {
    pub text: String,
    pub buttons: ButtonLayout,
}
