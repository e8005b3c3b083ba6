use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::time::Duration;

use super::types::{EpisodeRecord, IdPage, RecordStatus, RecordStore, StoreError};

pub const DEFAULT_BASE_URL: &str = "https://api.notion.com";
const NOTION_VERSION: &str = "2022-06-28";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Column names of the episode database.
mod props {
    pub const TITLE: &str = "タイトル";
    pub const EPISODE_ID: &str = "エピソードID";
    pub const DESCRIPTION: &str = "説明";
    pub const LINK: &str = "StandFMリンク";
    pub const PUBLISHED: &str = "公開日";
    pub const AUDIO_URL: &str = "音声URL";
    pub const DURATION: &str = "再生時間";
    pub const CATEGORY: &str = "カテゴリ";
    pub const STATUS: &str = "処理状況";
    pub const ARTICLE_GENERATED: &str = "記事生成";
    pub const INGESTED_AT: &str = "取得日時";
}

fn status_label(status: RecordStatus) -> &'static str {
    match status {
        RecordStatus::Unprocessed => "未処理",
        RecordStatus::AwaitingGeneration => "記事生成待ち",
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    results: Vec<PageObject>,
    #[serde(default)]
    has_more: bool,
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageObject {
    id: String,
    #[serde(default)]
    properties: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct DatabaseObject {
    #[serde(default)]
    title: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// [`RecordStore`] backed by a Notion database.
#[derive(Debug, Clone)]
pub struct NotionStore {
    client: reqwest::Client,
    base_url: String,
    database_id: String,
    api_key: SecretString,
}

impl NotionStore {
    pub fn new(client: reqwest::Client, api_key: SecretString, database_id: impl Into<String>) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            database_id: database_id.into(),
            api_key,
        }
    }

    /// Points the client at another API root (used by tests and proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, StoreError> {
        let request = request
            .bearer_auth(self.api_key.expose_secret())
            .header("Notion-Version", NOTION_VERSION);

        let response = tokio::time::timeout(REQUEST_TIMEOUT, request.send())
            .await
            .map_err(|_| StoreError::Timeout)?
            .map_err(StoreError::Network)?;

        let status = response.status();
        let raw = response.text().await.map_err(StoreError::Network)?;

        if !status.is_success() {
            return Err(classify_error(status.as_u16(), &raw));
        }

        serde_json::from_str(&raw)
            .map_err(|e| StoreError::Other(format!("Unexpected response shape: {e}")))
    }
}

#[async_trait]
impl RecordStore for NotionStore {
    async fn query_ids(
        &self,
        page_size: u32,
        cursor: Option<&str>,
    ) -> Result<IdPage, StoreError> {
        let mut body = json!({
            "page_size": page_size,
            "filter": {
                "property": props::EPISODE_ID,
                "rich_text": { "is_not_empty": true }
            }
        });
        if let (Some(cursor), Some(obj)) = (cursor, body.as_object_mut()) {
            obj.insert("start_cursor".to_owned(), json!(cursor));
        }

        let url = self.endpoint(&format!("databases/{}/query", self.database_id));
        let response: QueryResponse = self.send(self.client.post(&url).json(&body)).await?;

        let ids = response
            .results
            .iter()
            .filter_map(|page| {
                let id = page.properties.get(props::EPISODE_ID).and_then(first_rich_text);
                if id.is_none() {
                    tracing::debug!(page_id = %page.id, "Record without episode id, ignoring");
                }
                id
            })
            .collect();

        Ok(IdPage {
            ids,
            has_more: response.has_more,
            next_cursor: response.next_cursor,
        })
    }

    async fn create_episode(&self, record: &EpisodeRecord) -> Result<String, StoreError> {
        let body = json!({
            "parent": { "database_id": self.database_id },
            "properties": build_properties(record),
        });

        let page: PageObject = self
            .send(self.client.post(self.endpoint("pages")).json(&body))
            .await?;
        Ok(page.id)
    }

    async fn mark_status(&self, page_id: &str, status: RecordStatus) -> Result<(), StoreError> {
        let body = json!({
            "properties": {
                (props::STATUS): { "select": { "name": status_label(status) } }
            }
        });

        let _: PageObject = self
            .send(
                self.client
                    .patch(self.endpoint(&format!("pages/{page_id}")))
                    .json(&body),
            )
            .await?;
        Ok(())
    }

    async fn check_connection(&self) -> Result<String, StoreError> {
        let url = self.endpoint(&format!("databases/{}", self.database_id));
        let database: DatabaseObject = self.send(self.client.get(&url)).await?;

        let title = database
            .title
            .first()
            .and_then(rich_text_content)
            .unwrap_or_else(|| "Notion Database".to_string());
        Ok(title)
    }
}

/// Builds the Notion property payload for a new episode page.
fn build_properties(record: &EpisodeRecord) -> Value {
    let mut properties = Map::new();

    properties.insert(props::TITLE.into(), json!({ "title": [text(&record.title)] }));
    properties.insert(
        props::EPISODE_ID.into(),
        json!({ "rich_text": [text(&record.episode_id)] }),
    );
    properties.insert(
        props::DESCRIPTION.into(),
        json!({ "rich_text": [text(&record.description)] }),
    );
    properties.insert(props::LINK.into(), json!({ "url": record.url }));
    properties.insert(
        props::PUBLISHED.into(),
        json!({
            "date": record
                .published_on
                .map(|d| json!({ "start": d.format("%Y-%m-%d").to_string() }))
        }),
    );
    properties.insert(props::AUDIO_URL.into(), json!({ "url": record.audio_url }));
    properties.insert(
        props::DURATION.into(),
        json!({ "rich_text": [text(&record.duration)] }),
    );
    properties.insert(
        props::CATEGORY.into(),
        json!({ "select": { "name": record.category } }),
    );
    properties.insert(
        props::STATUS.into(),
        json!({ "select": { "name": status_label(record.status) } }),
    );
    properties.insert(
        props::ARTICLE_GENERATED.into(),
        json!({ "checkbox": record.article_generated }),
    );
    properties.insert(
        props::INGESTED_AT.into(),
        json!({ "date": { "start": record.ingested_at.to_rfc3339() } }),
    );

    Value::Object(properties)
}

fn text(content: &str) -> Value {
    json!({ "text": { "content": content } })
}

/// First segment of a rich text property, e.g. `{"rich_text": [{"text": {"content": "abc"}}]}`.
fn first_rich_text(property: &Value) -> Option<String> {
    property
        .get("rich_text")?
        .as_array()?
        .first()
        .and_then(rich_text_content)
        .filter(|s| !s.is_empty())
}

fn rich_text_content(segment: &Value) -> Option<String> {
    segment
        .get("text")
        .and_then(|t| t.get("content"))
        .or_else(|| segment.get("plain_text"))
        .and_then(Value::as_str)
        .map(str::to_owned)
}

/// Maps a failed response onto [`StoreError`].
///
/// Notion's JSON `code` wins; the HTTP status is the fallback when the body
/// carries no code (proxies, gateways).
fn classify_error(status: u16, raw: &str) -> StoreError {
    let body: Option<ErrorBody> = serde_json::from_str(raw).ok();
    let message = body
        .as_ref()
        .and_then(|b| b.message.clone())
        .unwrap_or_else(|| format!("HTTP {status}: {}", raw.trim()));

    match body.and_then(|b| b.code).as_deref() {
        Some("object_not_found") => StoreError::NotFound(message),
        Some("unauthorized" | "restricted_resource") => StoreError::Unauthorized(message),
        Some("validation_error") => StoreError::Validation(message),
        Some("rate_limited") => StoreError::RateLimited(message),
        Some(code) => StoreError::Other(format!("{code}: {message}")),
        None => match status {
            404 => StoreError::NotFound(message),
            401 | 403 => StoreError::Unauthorized(message),
            400 => StoreError::Validation(message),
            429 => StoreError::RateLimited(message),
            _ => StoreError::Other(message),
        },
    }
}
