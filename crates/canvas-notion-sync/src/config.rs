use std::net::SocketAddr;

use sync_common::http::RetryPolicy;
use sync_common::notion::DEFAULT_NOTION_VERSION;

use crate::error::AppError;

pub const DEFAULT_MASTER_TITLE: &str = "Syllabi & Start Here (All Courses)";
const DEFAULT_NOTION_RPS: u32 = 3;
const DEFAULT_PORT: u16 = 8000;

/// Names of the Notion database properties the assignment rows are written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyNames {
    pub name: String,
    pub course: String,
    /// Holds the stable `{course_id}:{assignment_id}` key.
    pub canvas_id: String,
    pub url: String,
    pub points: String,
    pub due: String,
    pub status: String,
}

impl Default for PropertyNames {
    fn default() -> Self {
        Self {
            name: "Name".to_string(),
            course: "Course".to_string(),
            canvas_id: "Canvas ID".to_string(),
            url: "URL".to_string(),
            points: "Points".to_string(),
            due: "Due Date".to_string(),
            status: "Status".to_string(),
        }
    }
}

impl PropertyNames {
    pub fn all(&self) -> [&str; 7] {
        [
            self.name.as_str(),
            self.course.as_str(),
            self.canvas_id.as_str(),
            self.url.as_str(),
            self.points.as_str(),
            self.due.as_str(),
            self.status.as_str(),
        ]
    }
}

/// The settings a sync run consumes. Separated from [`Config`] so tests can build one
/// without credentials.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub notion_database_id: String,
    pub only_dated: bool,
    pub master_title: String,
    /// When set, the summary is written to this page instead of one found by title.
    pub syllabi_page_id: Option<String>,
    pub properties: PropertyNames,
}

/// Application configuration, loaded once at startup.
#[derive(Clone)]
pub struct Config {
    pub canvas_base_url: String,
    pub canvas_token: String,
    pub notion_token: String,
    pub notion_version: String,
    /// Notion requests per second; 0 disables pacing.
    pub notion_rps: u32,
    pub sync_secret: String,
    pub bind_addr: SocketAddr,
    pub retry: RetryPolicy,
    pub sync: SyncSettings,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("canvas_base_url", &self.canvas_base_url)
            .field("canvas_token", &"<redacted>")
            .field("notion_token", &"<redacted>")
            .field("notion_version", &self.notion_version)
            .field("notion_rps", &self.notion_rps)
            .field("sync_secret", &"<redacted>")
            .field("bind_addr", &self.bind_addr)
            .field("retry", &self.retry)
            .field("sync", &self.sync)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `CANVAS_BASE_URL`, `CANVAS_TOKEN`
    /// - `NOTION_TOKEN`, `NOTION_DATABASE_ID`
    /// - `SYNC_SECRET_KEY` (or `SYNC_SECRET`)
    ///
    /// Optional:
    /// - `ONLY_DATED` (default true), `MASTER_TITLE`, `SYLLABI_PAGE_ID`
    /// - `NOTION_VERSION`, `NOTION_RATE_LIMIT_RPS`, `NOTION_PROP_*`
    /// - `HTTP_TIMEOUT_SECS`, `HTTP_MAX_RETRIES`, `HTTP_RETRY_INITIAL_MS`, `HTTP_RETRY_MAX_MS`
    /// - `BIND_ADDR`, or `PORT` to listen on `0.0.0.0:<PORT>`
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &str| {
            get(key).ok_or_else(|| {
                AppError::Config(format!("{key} environment variable is required"))
            })
        };

        let canvas_base_url = require("CANVAS_BASE_URL")?.trim_end_matches('/').to_string();
        let canvas_token = require("CANVAS_TOKEN")?;
        let notion_token = require("NOTION_TOKEN")?;
        let notion_database_id = require("NOTION_DATABASE_ID")?;
        let sync_secret = get("SYNC_SECRET_KEY")
            .or_else(|| get("SYNC_SECRET"))
            .ok_or_else(|| {
                AppError::Config("SYNC_SECRET_KEY environment variable is required".to_string())
            })?;

        let only_dated = get("ONLY_DATED").map(|v| parse_flag(&v)).unwrap_or(true);
        let master_title = get("MASTER_TITLE").unwrap_or_else(|| DEFAULT_MASTER_TITLE.to_string());
        let syllabi_page_id = get("SYLLABI_PAGE_ID");
        let notion_version =
            get("NOTION_VERSION").unwrap_or_else(|| DEFAULT_NOTION_VERSION.to_string());

        let notion_rps = match get("NOTION_RATE_LIMIT_RPS") {
            Some(v) => v.parse::<u32>().map_err(|_| {
                AppError::Config(format!("NOTION_RATE_LIMIT_RPS must be an integer, got {v}"))
            })?,
            None => DEFAULT_NOTION_RPS,
        };

        let bind_addr = match (get("BIND_ADDR"), get("PORT")) {
            (Some(addr), _) => addr
                .parse::<SocketAddr>()
                .map_err(|e| AppError::Config(format!("invalid BIND_ADDR {addr}: {e}")))?,
            (None, Some(port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|e| AppError::Config(format!("invalid PORT {port}: {e}")))?;
                SocketAddr::from(([0, 0, 0, 0], port))
            }
            (None, None) => SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
        };

        let defaults = PropertyNames::default();
        let properties = PropertyNames {
            name: get("NOTION_PROP_NAME").unwrap_or(defaults.name),
            course: get("NOTION_PROP_COURSE").unwrap_or(defaults.course),
            canvas_id: get("NOTION_PROP_CANVAS_ID").unwrap_or(defaults.canvas_id),
            url: get("NOTION_PROP_URL").unwrap_or(defaults.url),
            points: get("NOTION_PROP_POINTS").unwrap_or(defaults.points),
            due: get("NOTION_PROP_DUE").unwrap_or(defaults.due),
            status: get("NOTION_PROP_STATUS").unwrap_or(defaults.status),
        };

        Ok(Self {
            canvas_base_url,
            canvas_token,
            notion_token,
            notion_version,
            notion_rps,
            sync_secret,
            bind_addr,
            retry: RetryPolicy::from_lookup(&lookup),
            sync: SyncSettings {
                notion_database_id,
                only_dated,
                master_title,
                syllabi_page_id,
                properties,
            },
        })
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}
