//! Notion REST client and the block/property shapes the sync writes.
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::ClientError;
use crate::http::{JsonHttp, Replay, RetryPolicy};
use crate::throttle::Throttle;

pub const NOTION_API_BASE: &str = "https://api.notion.com/v1";
pub const DEFAULT_NOTION_VERSION: &str = "2022-06-28";

/// Maximum characters in one rich-text `content` value.
pub const MAX_TEXT_LEN: usize = 2000;

/// Maximum blocks accepted by a single append-children request.
pub const MAX_CHILDREN_PER_REQUEST: usize = 100;

pub type Properties = Map<String, Value>;

/// Exact-match filter for a database query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyFilter {
    RichTextEquals { property: String, value: String },
    TitleEquals { property: String, value: String },
}

impl PropertyFilter {
    pub fn to_json(&self) -> Value {
        match self {
            PropertyFilter::RichTextEquals { property, value } => {
                json!({"property": property, "rich_text": {"equals": value}})
            }
            PropertyFilter::TitleEquals { property, value } => {
                json!({"property": property, "title": {"equals": value}})
            }
        }
    }
}

/// Minimal view of a page: its id and its plain-text title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRef {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    pub property_names: Vec<String>,
}

/// The block types the summary page is built from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Block {
    Heading2(String),
    Paragraph(String),
    Bullet { text: String, link: Option<String> },
}

impl Block {
    pub fn to_json(&self) -> Value {
        match self {
            Block::Heading2(text) => json!({
                "object": "block",
                "type": "heading_2",
                "heading_2": {"rich_text": [rich_text(text, None)]},
            }),
            Block::Paragraph(text) => json!({
                "object": "block",
                "type": "paragraph",
                "paragraph": {"rich_text": [rich_text(text, None)]},
            }),
            Block::Bullet { text, link } => json!({
                "object": "block",
                "type": "bulleted_list_item",
                "bulleted_list_item": {"rich_text": [rich_text(text, link.as_deref())]},
            }),
        }
    }
}

/// Truncate to Notion's rich-text limit on a char boundary.
pub fn clamp_text(text: &str) -> String {
    match text.char_indices().nth(MAX_TEXT_LEN) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

fn rich_text(text: &str, link: Option<&str>) -> Value {
    let mut inner = json!({"content": clamp_text(text)});
    if let Some(url) = link {
        inner["link"] = json!({"url": url});
    }
    json!({"type": "text", "text": inner})
}

// --- Property values ---

pub fn title_value(text: &str) -> Value {
    json!({"title": [{"text": {"content": clamp_text(text)}}]})
}

pub fn rich_text_value(text: &str) -> Value {
    json!({"rich_text": [{"text": {"content": clamp_text(text)}}]})
}

pub fn url_value(url: Option<&str>) -> Value {
    json!({"url": url})
}

pub fn number_value(n: Option<f64>) -> Value {
    json!({"number": n})
}

/// `None` clears the date.
pub fn date_value(start: Option<&str>) -> Value {
    match start {
        Some(start) => json!({"date": {"start": start}}),
        None => json!({"date": null}),
    }
}

/// Read the plain text of a title-typed property value.
pub fn plain_title(property: &Value) -> String {
    property
        .get("title")
        .and_then(|t| t.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| {
                    p.get("plain_text")
                        .or_else(|| p.get("text").and_then(|t| t.get("content")))
                        .and_then(|s| s.as_str())
                })
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// The Notion operations a sync pass needs.
#[async_trait]
pub trait NotionApi: Send + Sync {
    async fn retrieve_database(&self, database_id: &str) -> Result<DatabaseInfo, ClientError>;

    async fn query_database(
        &self,
        database_id: &str,
        filter: &PropertyFilter,
        page_size: u32,
    ) -> Result<Vec<PageRef>, ClientError>;

    /// Pages visible to the integration whose title contains `query`.
    async fn search_pages(&self, query: &str) -> Result<Vec<PageRef>, ClientError>;

    /// Create a row in the database.
    async fn create_page(
        &self,
        database_id: &str,
        properties: Properties,
    ) -> Result<PageRef, ClientError>;

    async fn update_page(&self, page_id: &str, properties: Properties) -> Result<(), ClientError>;

    /// Ids of the direct children of a block (or page), in order.
    async fn list_block_children(&self, block_id: &str) -> Result<Vec<String>, ClientError>;

    async fn delete_block(&self, block_id: &str) -> Result<(), ClientError>;

    /// Append at most [`MAX_CHILDREN_PER_REQUEST`] blocks.
    async fn append_block_children(
        &self,
        block_id: &str,
        children: &[Block],
    ) -> Result<(), ClientError>;
}

#[derive(Clone, Debug)]
pub struct NotionClientConfig {
    pub token: String,
    pub version: String,
    pub requests_per_second: u32,
}

#[derive(Clone)]
pub struct NotionClient {
    api_base: String,
    token: String,
    version: String,
    http: JsonHttp,
    throttle: Throttle,
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    results: Vec<T>,
    #[serde(default)]
    has_more: bool,
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPage {
    id: String,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    in_trash: bool,
    #[serde(default)]
    properties: Map<String, Value>,
}

impl RawPage {
    fn into_ref(self) -> PageRef {
        let title = self
            .properties
            .values()
            .find(|v| v.get("type").and_then(|t| t.as_str()) == Some("title"))
            .map(plain_title)
            .unwrap_or_default();
        PageRef { id: self.id, title }
    }
}

#[derive(Debug, Deserialize)]
struct RawBlock {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RawDatabase {
    #[serde(default)]
    properties: Map<String, Value>,
}

impl NotionClient {
    pub fn new(config: NotionClientConfig, policy: RetryPolicy) -> Result<Self, ClientError> {
        let http = JsonHttp::new("canvas-notion-sync", policy)?;
        Ok(Self {
            api_base: NOTION_API_BASE.to_string(),
            token: config.token,
            version: config.version,
            http,
            throttle: Throttle::new(config.requests_per_second),
        })
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.bearer_auth(&self.token)
            .header("Notion-Version", &self.version)
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        replay: Replay,
        method: reqwest::Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<T, ClientError> {
        self.throttle.acquire().await;
        self.http
            .json(replay, |c| {
                let req = self.authed(c.request(method.clone(), url));
                match body {
                    Some(b) => req.json(b),
                    None => req,
                }
            })
            .await
    }
}

/// Notion answers 400 when asked to delete or edit a block that is already archived.
fn is_already_archived(err: &ClientError) -> bool {
    match err {
        ClientError::Upstream { status, message } => {
            *status == reqwest::StatusCode::BAD_REQUEST
                && message.to_lowercase().contains("archived")
        }
        _ => false,
    }
}

#[async_trait]
impl NotionApi for NotionClient {
    async fn retrieve_database(&self, database_id: &str) -> Result<DatabaseInfo, ClientError> {
        let url = format!("{}/databases/{database_id}", self.api_base);
        let db: RawDatabase = self
            .call(Replay::Safe, reqwest::Method::GET, &url, None)
            .await?;
        let mut property_names: Vec<String> = db.properties.keys().cloned().collect();
        property_names.sort();
        Ok(DatabaseInfo {
            property_names,
        })
    }

    async fn query_database(
        &self,
        database_id: &str,
        filter: &PropertyFilter,
        page_size: u32,
    ) -> Result<Vec<PageRef>, ClientError> {
        let url = format!("{}/databases/{database_id}/query", self.api_base);
        let body = json!({"filter": filter.to_json(), "page_size": page_size});
        // Queries are reads even though they are POSTs.
        let resp: ListResponse<RawPage> = self
            .call(Replay::Safe, reqwest::Method::POST, &url, Some(&body))
            .await?;
        Ok(resp
            .results
            .into_iter()
            .filter(|p| !p.archived && !p.in_trash)
            .map(RawPage::into_ref)
            .collect())
    }

    async fn search_pages(&self, query: &str) -> Result<Vec<PageRef>, ClientError> {
        let url = format!("{}/search", self.api_base);
        let mut out = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut body = json!({
                "query": query,
                "filter": {"property": "object", "value": "page"},
                "page_size": 100,
            });
            if let Some(c) = &cursor {
                body["start_cursor"] = json!(c);
            }
            let resp: ListResponse<RawPage> = self
                .call(Replay::Safe, reqwest::Method::POST, &url, Some(&body))
                .await?;
            out.extend(
                resp.results
                    .into_iter()
                    .filter(|p| !p.archived && !p.in_trash)
                    .map(RawPage::into_ref),
            );
            match (resp.has_more, resp.next_cursor) {
                (true, Some(next)) => cursor = Some(next),
                _ => break,
            }
        }
        debug!(query, matches = out.len(), "notion search complete");
        Ok(out)
    }

    async fn create_page(
        &self,
        database_id: &str,
        properties: Properties,
    ) -> Result<PageRef, ClientError> {
        let url = format!("{}/pages", self.api_base);
        let body = json!({"parent": {"database_id": database_id}, "properties": properties});
        let page: RawPage = self
            .call(Replay::Unsafe, reqwest::Method::POST, &url, Some(&body))
            .await?;
        Ok(page.into_ref())
    }

    async fn update_page(&self, page_id: &str, properties: Properties) -> Result<(), ClientError> {
        let url = format!("{}/pages/{page_id}", self.api_base);
        let body = json!({"properties": properties});
        let _: Value = self
            .call(Replay::Safe, reqwest::Method::PATCH, &url, Some(&body))
            .await?;
        Ok(())
    }

    async fn list_block_children(&self, block_id: &str) -> Result<Vec<String>, ClientError> {
        let base = format!("{}/blocks/{block_id}/children?page_size=100", self.api_base);
        let mut out = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let url = match &cursor {
                Some(c) => format!("{base}&start_cursor={c}"),
                None => base.clone(),
            };
            let resp: ListResponse<RawBlock> = self
                .call(Replay::Safe, reqwest::Method::GET, &url, None)
                .await?;
            out.extend(resp.results.into_iter().map(|b| b.id));
            match (resp.has_more, resp.next_cursor) {
                (true, Some(next)) => cursor = Some(next),
                _ => break,
            }
        }
        Ok(out)
    }

    async fn delete_block(&self, block_id: &str) -> Result<(), ClientError> {
        let url = format!("{}/blocks/{block_id}", self.api_base);
        let result: Result<Value, ClientError> = self
            .call(Replay::Safe, reqwest::Method::DELETE, &url, None)
            .await;
        match result {
            Ok(_) => Ok(()),
            // A retried DELETE whose first attempt landed finds the block already archived.
            Err(e) if is_already_archived(&e) => {
                debug!(block_id, "block already archived");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn append_block_children(
        &self,
        block_id: &str,
        children: &[Block],
    ) -> Result<(), ClientError> {
        let url = format!("{}/blocks/{block_id}/children", self.api_base);
        let blocks: Vec<Value> = children.iter().map(Block::to_json).collect();
        let body = json!({"children": blocks});
        let _: Value = self
            .call(Replay::Unsafe, reqwest::Method::PATCH, &url, Some(&body))
            .await?;
        Ok(())
    }
}
