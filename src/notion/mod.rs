use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rand::seq::SliceRandom;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::{self, Config, Fields};
use crate::content;
use crate::model::{ContentBlock, Record, Status};
use crate::notion::model::{
    BlockChildren, DatabaseSummary, QueryResponse, RetrieveDatabaseResp, SearchResponse,
};

pub mod model;

const NOTION_API_BASE: &str = "https://api.notion.com/";

/// Bound on a single child-block fetch.
pub const CONTENT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum NotionError {
    #[error("failed to reach Notion: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("notion request timed out")]
    Timeout,
    #[error("notion error {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("unexpected Notion response shape: {0}")]
    SchemaMismatch(String),
}

impl From<reqwest::Error> for NotionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NotionError::Timeout
        } else {
            NotionError::Transport(err)
        }
    }
}

/// Equality filter on a single property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyFilter {
    pub property: String,
    pub kind: FilterKind,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Select,
    Status,
}

impl PropertyFilter {
    pub fn select(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            kind: FilterKind::Select,
            value: value.into(),
        }
    }

    pub fn status(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            kind: FilterKind::Status,
            value: value.into(),
        }
    }

    pub fn to_json(&self) -> Value {
        let kind = match self.kind {
            FilterKind::Select => "select",
            FilterKind::Status => "status",
        };
        let mut obj = Map::new();
        obj.insert("property".into(), json!(self.property));
        obj.insert(kind.into(), json!({ "equals": self.value }));
        Value::Object(obj)
    }
}

/// The remote record store as the rest of the relay sees it.
#[async_trait]
pub trait NotionService: Send + Sync {
    /// Records with status Done edited strictly after `since`, newest first.
    async fn query_done(&self, since: DateTime<Utc>, limit: u32)
        -> Result<Vec<Record>, NotionError>;

    /// Records with status Scheduled, newest first.
    async fn query_scheduled(&self, limit: u32) -> Result<Vec<Record>, NotionError>;

    async fn update_status(&self, record_id: &str, status: &Status) -> Result<(), NotionError>;

    /// Paragraph text of the record's first-level children, in document order.
    async fn fetch_child_content(&self, record_id: &str)
        -> Result<Vec<ContentBlock>, NotionError>;

    /// Property name -> property type.
    async fn fetch_schema(&self) -> Result<BTreeMap<String, String>, NotionError>;

    async fn pick_random_by_filter(
        &self,
        filter: &PropertyFilter,
    ) -> Result<Option<Record>, NotionError>;
}

#[derive(Clone)]
pub struct NotionClient {
    http: Client,
    base_url: Url,
    token: String,
    version: String,
    database_id: String,
    fields: Fields,
    content_timeout: Duration,
}

impl fmt::Debug for NotionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotionClient")
            .field("base_url", &self.base_url)
            .field("database_id", &self.database_id)
            .finish_non_exhaustive()
    }
}

impl NotionClient {
    pub fn new(token: String, version: String, database_id: String, fields: Fields) -> Self {
        let base_url = Url::parse(NOTION_API_BASE).expect("valid default Notion URL");
        Self::with_base_url(token, version, database_id, fields, base_url)
    }

    pub fn with_base_url(
        token: String,
        version: String,
        database_id: String,
        fields: Fields,
        base_url: Url,
    ) -> Self {
        let http = Client::builder()
            .user_agent("notion-relay/0.1")
            .no_proxy()
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            token,
            version,
            database_id,
            fields,
            content_timeout: CONTENT_FETCH_TIMEOUT,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            cfg.notion.token.clone(),
            cfg.notion.version.clone(),
            cfg.notion.database_id.clone(),
            cfg.notion.fields.clone(),
        )
    }

    pub fn with_content_timeout(mut self, timeout: Duration) -> Self {
        self.content_timeout = timeout;
        self
    }

    pub fn build_request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Request, NotionError> {
        let endpoint = self
            .base_url
            .join(path)
            .map_err(|e| NotionError::SchemaMismatch(format!("invalid Notion URL {path}: {e}")))?;
        let mut req = self
            .http
            .request(method, endpoint)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Notion-Version", &self.version);
        if let Some(body) = body {
            req = req.header("Content-Type", "application/json").json(body);
        }
        Ok(req.build()?)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        mut request: reqwest::Request,
        timeout: Option<Duration>,
    ) -> Result<T, NotionError> {
        *request.timeout_mut() = timeout;
        debug!(method=%request.method(), url=%request.url(), "notion request");

        let res = self.http.execute(request).await?;
        let status = res.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!("Rate limited by Notion: {}", body);
            return Err(NotionError::Status { status, body });
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(%status, "Notion API error: {}", body);
            return Err(NotionError::Status { status, body });
        }

        let body = res.text().await?;
        serde_json::from_str(&body).map_err(|e| NotionError::SchemaMismatch(e.to_string()))
    }

    async fn query(&self, body: Value) -> Result<QueryResponse, NotionError> {
        let path = format!("v1/databases/{}/query", self.database_id);
        let req = self.build_request(Method::POST, &path, Some(&body))?;
        self.execute(req, None).await
    }

    fn decode(&self, pages: QueryResponse) -> Vec<Record> {
        pages
            .results
            .into_iter()
            .map(|p| p.into_record(&self.fields))
            .collect()
    }

    pub async fn retrieve_database(&self) -> Result<RetrieveDatabaseResp, NotionError> {
        let path = format!("v1/databases/{}", self.database_id);
        let req = self.build_request(Method::GET, &path, None)?;
        self.execute(req, None).await
    }

    /// Every database shared with the integration.
    pub async fn list_databases(&self) -> Result<Vec<DatabaseSummary>, NotionError> {
        let body = json!({ "filter": { "value": "database", "property": "object" } });
        let req = self.build_request(Method::POST, "v1/search", Some(&body))?;
        let res: SearchResponse = self.execute(req, None).await?;
        Ok(res.results)
    }
}

#[async_trait]
impl NotionService for NotionClient {
    #[instrument(skip(self))]
    async fn query_done(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Record>, NotionError> {
        let body = build_done_query(&self.fields, since, limit);
        let res = self.query(body).await?;
        // The remote filter has minute resolution; enforce the strict bound here.
        let records: Vec<Record> = self
            .decode(res)
            .into_iter()
            .filter(|r| r.last_edited > since)
            .collect();
        info!(count = records.len(), "queried done records");
        Ok(records)
    }

    #[instrument(skip(self))]
    async fn query_scheduled(&self, limit: u32) -> Result<Vec<Record>, NotionError> {
        let body = build_status_query(&self.fields, &Status::Scheduled, limit);
        let res = self.query(body).await?;
        Ok(self.decode(res))
    }

    #[instrument(skip(self))]
    async fn update_status(&self, record_id: &str, status: &Status) -> Result<(), NotionError> {
        let body = build_status_update(&self.fields, status);
        let path = format!("v1/pages/{}", record_id);
        let req = self.build_request(Method::PATCH, &path, Some(&body))?;
        let _: Value = self.execute(req, None).await?;
        info!(record_id, %status, "updated record status");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn fetch_child_content(
        &self,
        record_id: &str,
    ) -> Result<Vec<ContentBlock>, NotionError> {
        let path = format!("v1/blocks/{}/children", record_id);
        let req = self.build_request(Method::GET, &path, None)?;
        let children: BlockChildren = self.execute(req, Some(self.content_timeout)).await?;
        Ok(content::paragraphs(&children.results))
    }

    async fn fetch_schema(&self) -> Result<BTreeMap<String, String>, NotionError> {
        let db = self.retrieve_database().await?;
        Ok(db
            .properties
            .into_iter()
            .map(|(name, prop)| (name, prop.typ))
            .collect())
    }

    #[instrument(skip(self))]
    async fn pick_random_by_filter(
        &self,
        filter: &PropertyFilter,
    ) -> Result<Option<Record>, NotionError> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut body = json!({
                "filter": filter.to_json(),
                "page_size": config::MAX_PAGE_SIZE,
            });
            if let Some(c) = cursor.take() {
                body["start_cursor"] = json!(c);
            }
            let res = self.query(body).await?;
            let has_more = res.has_more;
            let next = res.next_cursor.clone();
            all.extend(self.decode(res));
            match next {
                Some(c) if has_more => cursor = Some(c),
                _ => break,
            }
        }
        debug!(candidates = all.len(), "picking random record");
        Ok(all.choose(&mut rand::thread_rng()).cloned())
    }
}

fn sort_by_last_edited_desc() -> Value {
    json!([{ "timestamp": "last_edited_time", "direction": "descending" }])
}

pub fn build_done_query(fields: &Fields, since: DateTime<Utc>, limit: u32) -> Value {
    json!({
        "filter": {
            "and": [
                PropertyFilter::status(&fields.status, Status::Done.as_str()).to_json(),
                {
                    "timestamp": "last_edited_time",
                    "last_edited_time": {
                        "after": since.to_rfc3339_opts(SecondsFormat::Millis, true)
                    }
                }
            ]
        },
        "sorts": sort_by_last_edited_desc(),
        "page_size": limit.clamp(1, config::MAX_PAGE_SIZE),
    })
}

pub fn build_status_query(fields: &Fields, status: &Status, limit: u32) -> Value {
    json!({
        "filter": PropertyFilter::status(&fields.status, status.as_str()).to_json(),
        "sorts": sort_by_last_edited_desc(),
        "page_size": limit.clamp(1, config::MAX_PAGE_SIZE),
    })
}

pub fn build_status_update(fields: &Fields, status: &Status) -> Value {
    let mut properties = Map::new();
    properties.insert(
        fields.status.clone(),
        json!({ "status": { "name": status.as_str() } }),
    );
    json!({ "properties": Value::Object(properties) })
}
