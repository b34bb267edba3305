//! In-memory Canvas and Notion fakes for tests.
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::Value;
use sync_common::canvas::{
    Assignment, CanvasApi, CanvasFile, Course, Module, ModuleItem, Page,
};
use sync_common::error::ClientError;
use sync_common::notion::{
    plain_title, Block, DatabaseInfo, NotionApi, PageRef, Properties, PropertyFilter,
};
use sync_common::StatusCode;

use crate::config::{PropertyNames, SyncSettings};

pub const CANVAS_BASE: &str = "https://canvas.test";
pub const DATABASE_ID: &str = "db-1";

pub fn upstream(status: StatusCode) -> ClientError {
    ClientError::Upstream {
        status,
        message: format!("fake upstream {status}"),
    }
}

pub fn settings() -> SyncSettings {
    SyncSettings {
        notion_database_id: DATABASE_ID.to_string(),
        only_dated: true,
        master_title: "Syllabi & Start Here (All Courses)".to_string(),
        syllabi_page_id: None,
        properties: PropertyNames::default(),
    }
}

// --- Canvas ---

#[derive(Debug, Clone, Default)]
pub struct FakeCourse {
    pub assignments: Vec<Assignment>,
    pub syllabus: Option<String>,
    pub pages: Vec<Page>,
    pub modules: Vec<(Module, Vec<ModuleItem>)>,
    pub files: Vec<CanvasFile>,
    /// Tabs that answer 404 ("pages", "modules", "files").
    pub missing_tabs: Vec<&'static str>,
    /// Tabs that answer 401, as Canvas does for hidden tabs and locked pages
    /// ("pages", "page_body", "modules", "files").
    pub forbidden_tabs: Vec<&'static str>,
}

impl FakeCourse {
    pub fn assignment(mut self, id: u64, name: &str, due: Option<(i32, u32, u32)>) -> Self {
        self.assignments.push(Assignment {
            id,
            name: Some(name.to_string()),
            due_at: due.map(|(y, m, d)| Utc.with_ymd_and_hms(y, m, d, 23, 59, 0).unwrap()),
            html_url: Some(format!("{CANVAS_BASE}/assignments/{id}")),
            points_possible: Some(10.0),
            published: Some(true),
            workflow_state: Some("published".to_string()),
        });
        self
    }

    pub fn syllabus(mut self, html: &str) -> Self {
        self.syllabus = Some(html.to_string());
        self
    }

    pub fn page(mut self, slug: &str, title: &str, body: &str) -> Self {
        self.pages.push(Page {
            url: Some(slug.to_string()),
            title: Some(title.to_string()),
            html_url: Some(format!("{CANVAS_BASE}/pages/{slug}")),
            body: Some(body.to_string()),
        });
        self
    }

    pub fn module(mut self, id: u64, name: &str, items: &[(u64, &str)]) -> Self {
        let items = items
            .iter()
            .map(|(item_id, title)| ModuleItem {
                title: Some(title.to_string()),
                html_url: Some(format!("{CANVAS_BASE}/modules/items/{item_id}")),
                external_url: None,
            })
            .collect();
        self.modules.push((
            Module {
                id,
                name: Some(name.to_string()),
            },
            items,
        ));
        self
    }

    pub fn file(mut self, id: u64, name: &str) -> Self {
        self.files.push(CanvasFile {
            id,
            display_name: Some(name.to_string()),
            filename: None,
        });
        self
    }

    pub fn missing(mut self, tab: &'static str) -> Self {
        self.missing_tabs.push(tab);
        self
    }

    pub fn forbidden(mut self, tab: &'static str) -> Self {
        self.forbidden_tabs.push(tab);
        self
    }
}

#[derive(Default)]
pub struct FakeCanvas {
    courses: Vec<Course>,
    data: HashMap<u64, FakeCourse>,
    failing: HashSet<u64>,
    reject_token: bool,
    page_body_fetches: Mutex<Vec<String>>,
}

impl FakeCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn course(mut self, id: u64, name: &str, data: FakeCourse) -> Self {
        self.courses.push(Course {
            id: Some(id),
            name: Some(name.to_string()),
            syllabus_body: None,
        });
        self.data.insert(id, data);
        self
    }

    /// Every fetch for this course answers 500.
    pub fn failing(mut self, id: u64) -> Self {
        self.failing.insert(id);
        self
    }

    pub fn reject_token(mut self) -> Self {
        self.reject_token = true;
        self
    }

    pub fn page_body_fetches(&self) -> Vec<String> {
        self.page_body_fetches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn course_data(&self, course_id: u64) -> Result<&FakeCourse, ClientError> {
        if self.failing.contains(&course_id) {
            return Err(upstream(StatusCode::INTERNAL_SERVER_ERROR));
        }
        self.data
            .get(&course_id)
            .ok_or_else(|| upstream(StatusCode::NOT_FOUND))
    }

    fn tab(&self, course_id: u64, tab: &str) -> Result<&FakeCourse, ClientError> {
        let data = self.course_data(course_id)?;
        if data.missing_tabs.contains(&tab) {
            return Err(upstream(StatusCode::NOT_FOUND));
        }
        if data.forbidden_tabs.contains(&tab) {
            return Err(upstream(StatusCode::UNAUTHORIZED));
        }
        Ok(data)
    }
}

#[async_trait]
impl CanvasApi for FakeCanvas {
    fn base_url(&self) -> &str {
        CANVAS_BASE
    }

    async fn list_active_courses(&self) -> Result<Vec<Course>, ClientError> {
        if self.reject_token {
            return Err(upstream(StatusCode::UNAUTHORIZED));
        }
        Ok(self.courses.clone())
    }

    async fn list_assignments(&self, course_id: u64) -> Result<Vec<Assignment>, ClientError> {
        Ok(self.course_data(course_id)?.assignments.clone())
    }

    async fn syllabus_body(&self, course_id: u64) -> Result<Option<String>, ClientError> {
        Ok(self.course_data(course_id)?.syllabus.clone())
    }

    async fn list_pages(&self, course_id: u64) -> Result<Vec<Page>, ClientError> {
        let pages = self.tab(course_id, "pages")?.pages.iter().cloned();
        // The list endpoint never includes bodies.
        Ok(pages.map(|p| Page { body: None, ..p }).collect())
    }

    async fn page_body(
        &self,
        course_id: u64,
        page_url: &str,
    ) -> Result<Option<String>, ClientError> {
        self.page_body_fetches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(page_url.to_string());
        self.tab(course_id, "page_body")?;
        let data = self.tab(course_id, "pages")?;
        data.pages
            .iter()
            .find(|p| p.url.as_deref() == Some(page_url))
            .map(|p| p.body.clone())
            .ok_or_else(|| upstream(StatusCode::NOT_FOUND))
    }

    async fn list_modules(&self, course_id: u64) -> Result<Vec<Module>, ClientError> {
        let data = self.tab(course_id, "modules")?;
        Ok(data.modules.iter().map(|(m, _)| m.clone()).collect())
    }

    async fn list_module_items(
        &self,
        course_id: u64,
        module_id: u64,
    ) -> Result<Vec<ModuleItem>, ClientError> {
        let data = self.tab(course_id, "modules")?;
        data.modules
            .iter()
            .find(|(m, _)| m.id == module_id)
            .map(|(_, items)| items.clone())
            .ok_or_else(|| upstream(StatusCode::NOT_FOUND))
    }

    async fn list_document_files(&self, course_id: u64) -> Result<Vec<CanvasFile>, ClientError> {
        Ok(self.tab(course_id, "files")?.files.clone())
    }
}

// --- Notion ---

#[derive(Debug, Clone)]
pub struct StoredPage {
    pub id: String,
    /// `None` for standalone workspace pages.
    pub database_id: Option<String>,
    pub properties: Properties,
    /// Position in creation order; stands in for Notion's `created_time`.
    pub created_seq: usize,
}

impl StoredPage {
    fn title(&self) -> String {
        self.properties
            .values()
            .find(|v| v.get("title").is_some())
            .map(plain_title)
            .unwrap_or_default()
    }

    fn to_ref(&self) -> PageRef {
        PageRef {
            id: self.id.clone(),
            title: self.title(),
        }
    }
}

#[derive(Default)]
struct NotionState {
    pages: Vec<StoredPage>,
    children: HashMap<String, Vec<(String, Block)>>,
    next_id: usize,
    writes: usize,
}

impl NotionState {
    fn mint(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

#[derive(Default)]
pub struct FakeNotion {
    state: Mutex<NotionState>,
    reject_token: bool,
    fail_titles: HashSet<String>,
}

fn text_of(value: &Value, kind: &str) -> Option<String> {
    value.get(kind)?.as_array().map(|parts| {
        parts
            .iter()
            .filter_map(|p| p.get("text")?.get("content")?.as_str())
            .collect()
    })
}

impl FakeNotion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_token(mut self) -> Self {
        self.reject_token = true;
        self
    }

    /// Creating or updating a row with this title fails with 400.
    pub fn fail_title(mut self, title: &str) -> Self {
        self.fail_titles.insert(title.to_string());
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, NotionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed a standalone page (not in the database), as a user would have created it.
    pub fn seed_page(&self, title: &str) -> String {
        let mut state = self.state();
        let id = state.mint("page");
        let seq = state.pages.len();
        let mut properties = Properties::new();
        properties.insert("title".to_string(), sync_common::notion::title_value(title));
        state.pages.push(StoredPage {
            id: id.clone(),
            database_id: None,
            properties,
            created_seq: seq,
        });
        id
    }

    pub fn seed_blocks(&self, page_id: &str, blocks: &[Block]) {
        let mut state = self.state();
        let mut seeded = Vec::new();
        for block in blocks {
            seeded.push((state.mint("block"), block.clone()));
        }
        state
            .children
            .entry(page_id.to_string())
            .or_default()
            .extend(seeded);
    }

    pub fn database_rows(&self) -> Vec<StoredPage> {
        self.state()
            .pages
            .iter()
            .filter(|p| p.database_id.as_deref() == Some(DATABASE_ID))
            .cloned()
            .collect()
    }

    /// Database rows carrying the given identity key.
    pub fn rows_with_key(&self, key: &str) -> Vec<StoredPage> {
        let prop = PropertyNames::default().canvas_id;
        self.database_rows()
            .into_iter()
            .filter(|p| {
                p.properties
                    .get(&prop)
                    .and_then(|v| text_of(v, "rich_text"))
                    .as_deref()
                    == Some(key)
            })
            .collect()
    }

    pub fn page_titled(&self, title: &str) -> Option<StoredPage> {
        self.state()
            .pages
            .iter()
            .find(|p| p.title() == title)
            .cloned()
    }

    pub fn blocks(&self, page_id: &str) -> Vec<Block> {
        self.state()
            .children
            .get(page_id)
            .map(|c| c.iter().map(|(_, b)| b.clone()).collect())
            .unwrap_or_default()
    }

    pub fn write_count(&self) -> usize {
        self.state().writes
    }

    fn check_title(&self, properties: &Properties) -> Result<(), ClientError> {
        let title = properties
            .values()
            .find_map(|v| text_of(v, "title"))
            .unwrap_or_default();
        if self.fail_titles.contains(&title) {
            return Err(upstream(StatusCode::BAD_REQUEST));
        }
        Ok(())
    }
}

#[async_trait]
impl NotionApi for FakeNotion {
    async fn retrieve_database(&self, database_id: &str) -> Result<DatabaseInfo, ClientError> {
        if self.reject_token {
            return Err(upstream(StatusCode::UNAUTHORIZED));
        }
        if database_id != DATABASE_ID {
            return Err(upstream(StatusCode::NOT_FOUND));
        }
        let mut property_names: Vec<String> = PropertyNames::default()
            .all()
            .iter()
            .map(|s| s.to_string())
            .collect();
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
        let (kind, property, value) = match filter {
            PropertyFilter::RichTextEquals { property, value } => ("rich_text", property, value),
            PropertyFilter::TitleEquals { property, value } => ("title", property, value),
        };
        let state = self.state();
        Ok(state
            .pages
            .iter()
            .filter(|p| p.database_id.as_deref() == Some(database_id))
            .filter(|p| {
                p.properties
                    .get(property)
                    .and_then(|v| text_of(v, kind))
                    .as_ref()
                    == Some(value)
            })
            .take(page_size as usize)
            .map(StoredPage::to_ref)
            .collect())
    }

    async fn search_pages(&self, query: &str) -> Result<Vec<PageRef>, ClientError> {
        let needle = query.to_lowercase();
        Ok(self
            .state()
            .pages
            .iter()
            .filter(|p| p.title().to_lowercase().contains(&needle))
            .map(StoredPage::to_ref)
            .collect())
    }

    async fn create_page(
        &self,
        database_id: &str,
        properties: Properties,
    ) -> Result<PageRef, ClientError> {
        self.check_title(&properties)?;
        let mut state = self.state();
        let id = state.mint("page");
        let seq = state.pages.len();
        let page = StoredPage {
            id,
            database_id: Some(database_id.to_string()),
            properties,
            created_seq: seq,
        };
        let page_ref = page.to_ref();
        state.pages.push(page);
        state.writes += 1;
        Ok(page_ref)
    }

    async fn update_page(&self, page_id: &str, properties: Properties) -> Result<(), ClientError> {
        self.check_title(&properties)?;
        let mut state = self.state();
        let page = state
            .pages
            .iter_mut()
            .find(|p| p.id == page_id)
            .ok_or_else(|| upstream(StatusCode::NOT_FOUND))?;
        for (k, v) in properties {
            page.properties.insert(k, v);
        }
        state.writes += 1;
        Ok(())
    }

    async fn list_block_children(&self, block_id: &str) -> Result<Vec<String>, ClientError> {
        Ok(self
            .state()
            .children
            .get(block_id)
            .map(|c| c.iter().map(|(id, _)| id.clone()).collect())
            .unwrap_or_default())
    }

    async fn delete_block(&self, block_id: &str) -> Result<(), ClientError> {
        let mut state = self.state();
        let mut found = false;
        for children in state.children.values_mut() {
            let before = children.len();
            children.retain(|(id, _)| id != block_id);
            found |= children.len() != before;
        }
        if !found {
            return Err(upstream(StatusCode::NOT_FOUND));
        }
        state.writes += 1;
        Ok(())
    }

    async fn append_block_children(
        &self,
        block_id: &str,
        children: &[Block],
    ) -> Result<(), ClientError> {
        if children.len() > sync_common::notion::MAX_CHILDREN_PER_REQUEST {
            return Err(upstream(StatusCode::BAD_REQUEST));
        }
        let mut state = self.state();
        let mut appended = Vec::new();
        for block in children {
            appended.push((state.mint("block"), block.clone()));
        }
        state
            .children
            .entry(block_id.to_string())
            .or_default()
            .extend(appended);
        state.writes += 1;
        Ok(())
    }
}
