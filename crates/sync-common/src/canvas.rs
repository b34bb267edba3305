//! Read-only Canvas LMS REST client.
//!
//! Every list endpoint is paginated through the `Link` response header; the client follows
//! `rel="next"` until it runs out.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::error::ClientError;
use crate::http::{decode_json, JsonHttp, Replay, RetryPolicy};

const PER_PAGE: &str = "100";

/// MIME types requested from the files endpoint.
pub const DOCUMENT_CONTENT_TYPES: [&str; 3] = [
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

#[derive(Debug, Clone, Deserialize)]
pub struct Course {
    pub id: Option<u64>,
    pub name: Option<String>,
    pub syllabus_body: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Assignment {
    pub id: u64,
    pub name: Option<String>,
    pub due_at: Option<DateTime<Utc>>,
    pub html_url: Option<String>,
    pub points_possible: Option<f64>,
    pub published: Option<bool>,
    pub workflow_state: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Page {
    /// URL slug, used to fetch the page body.
    pub url: Option<String>,
    pub title: Option<String>,
    pub html_url: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Module {
    pub id: u64,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModuleItem {
    pub title: Option<String>,
    pub html_url: Option<String>,
    pub external_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CanvasFile {
    pub id: u64,
    pub display_name: Option<String>,
    pub filename: Option<String>,
}

/// The Canvas operations a sync pass needs.
#[async_trait]
pub trait CanvasApi: Send + Sync {
    /// Web root of the Canvas instance, e.g. `https://school.instructure.com`.
    fn base_url(&self) -> &str;

    async fn list_active_courses(&self) -> Result<Vec<Course>, ClientError>;

    async fn list_assignments(&self, course_id: u64) -> Result<Vec<Assignment>, ClientError>;

    async fn syllabus_body(&self, course_id: u64) -> Result<Option<String>, ClientError>;

    async fn list_pages(&self, course_id: u64) -> Result<Vec<Page>, ClientError>;

    async fn page_body(&self, course_id: u64, page_url: &str)
        -> Result<Option<String>, ClientError>;

    async fn list_modules(&self, course_id: u64) -> Result<Vec<Module>, ClientError>;

    async fn list_module_items(
        &self,
        course_id: u64,
        module_id: u64,
    ) -> Result<Vec<ModuleItem>, ClientError>;

    /// Files restricted to PDF and Word documents.
    async fn list_document_files(&self, course_id: u64) -> Result<Vec<CanvasFile>, ClientError>;
}

#[derive(Clone, Debug)]
pub struct CanvasClientConfig {
    pub base_url: String,
    pub token: String,
}

#[derive(Clone)]
pub struct CanvasClient {
    base_url: String,
    token: String,
    http: JsonHttp,
}

impl CanvasClient {
    pub fn new(config: CanvasClientConfig, policy: RetryPolicy) -> Result<Self, ClientError> {
        let http = JsonHttp::new("canvas-notion-sync", policy)?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token,
            http,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    async fn get_one<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ClientError> {
        self.http
            .json(Replay::Safe, |c| c.get(url).bearer_auth(&self.token).query(query))
            .await
    }

    /// Fetch every page of a list endpoint. `query` is only sent with the first request;
    /// the `next` links already carry it.
    async fn paginate<T: DeserializeOwned>(
        &self,
        url: String,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, ClientError> {
        let mut out = Vec::new();
        let mut next = Some(url);
        let mut first = true;
        while let Some(url) = next.take() {
            let params: &[(&str, &str)] = if first { query } else { &[] };
            first = false;
            let resp = self
                .http
                .execute(Replay::Safe, |c| c.get(&url).bearer_auth(&self.token).query(params))
                .await?;
            let link = resp
                .headers()
                .get(reqwest::header::LINK)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());
            let batch: Vec<T> = decode_json(resp).await?;
            debug!(url = %url, count = batch.len(), "fetched canvas page");
            out.extend(batch);
            next = link.as_deref().and_then(next_link);
        }
        Ok(out)
    }
}

#[async_trait]
impl CanvasApi for CanvasClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn list_active_courses(&self) -> Result<Vec<Course>, ClientError> {
        self.paginate(
            self.api_url("/courses"),
            &[("enrollment_state", "active"), ("per_page", PER_PAGE)],
        )
        .await
    }

    async fn list_assignments(&self, course_id: u64) -> Result<Vec<Assignment>, ClientError> {
        self.paginate(
            self.api_url(&format!("/courses/{course_id}/assignments")),
            &[("per_page", PER_PAGE)],
        )
        .await
    }

    async fn syllabus_body(&self, course_id: u64) -> Result<Option<String>, ClientError> {
        let course: Course = self
            .get_one(
                &self.api_url(&format!("/courses/{course_id}")),
                &[("include[]", "syllabus_body")],
            )
            .await?;
        Ok(course.syllabus_body)
    }

    async fn list_pages(&self, course_id: u64) -> Result<Vec<Page>, ClientError> {
        self.paginate(
            self.api_url(&format!("/courses/{course_id}/pages")),
            &[("per_page", PER_PAGE)],
        )
        .await
    }

    async fn page_body(
        &self,
        course_id: u64,
        page_url: &str,
    ) -> Result<Option<String>, ClientError> {
        let page: Page = self
            .get_one(
                &self.api_url(&format!("/courses/{course_id}/pages/{page_url}")),
                &[],
            )
            .await?;
        Ok(page.body)
    }

    async fn list_modules(&self, course_id: u64) -> Result<Vec<Module>, ClientError> {
        self.paginate(
            self.api_url(&format!("/courses/{course_id}/modules")),
            &[("per_page", PER_PAGE)],
        )
        .await
    }

    async fn list_module_items(
        &self,
        course_id: u64,
        module_id: u64,
    ) -> Result<Vec<ModuleItem>, ClientError> {
        self.paginate(
            self.api_url(&format!("/courses/{course_id}/modules/{module_id}/items")),
            &[("per_page", PER_PAGE)],
        )
        .await
    }

    async fn list_document_files(&self, course_id: u64) -> Result<Vec<CanvasFile>, ClientError> {
        let mut query: Vec<(&str, &str)> = vec![("per_page", PER_PAGE)];
        query.extend(DOCUMENT_CONTENT_TYPES.iter().map(|t| ("content_types[]", *t)));
        self.paginate(self.api_url(&format!("/courses/{course_id}/files")), &query)
            .await
    }
}

/// Extract the `rel="next"` target from an RFC 5988 `Link` header.
pub fn next_link(header: &str) -> Option<String> {
    header
        .split(',')
        .map(str::trim)
        .find(|part| part.contains(r#"rel="next""#))
        .and_then(|part| {
            let start = part.find('<')? + 1;
            let end = part.find('>')?;
            (start < end).then(|| part[start..end].to_string())
        })
}
