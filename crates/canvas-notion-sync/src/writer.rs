//! Notion side of the sync: assignment upserts and the summary page rewrite.
use std::sync::Arc;

use serde::Serialize;
use sync_common::error::ClientError;
use sync_common::notion::{
    self, DatabaseInfo, NotionApi, Properties, PropertyFilter, MAX_CHILDREN_PER_REQUEST,
};
use tracing::{debug, info, warn};

use crate::config::SyncSettings;
use crate::model::{AssignmentRecord, CourseSummary};
use crate::summary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryOutcome {
    pub page_id: String,
    pub blocks: usize,
    pub digest: String,
}

pub struct NotionWriter {
    notion: Arc<dyn NotionApi>,
    settings: SyncSettings,
}

impl NotionWriter {
    pub fn new(notion: Arc<dyn NotionApi>, settings: SyncSettings) -> Self {
        Self { notion, settings }
    }

    /// Check that the database is reachable with the configured token. Runs before any write.
    pub async fn preflight(&self) -> Result<DatabaseInfo, ClientError> {
        let info = self
            .notion
            .retrieve_database(&self.settings.notion_database_id)
            .await?;
        for name in self.settings.properties.all() {
            if !info.property_names.iter().any(|p| p == name) {
                warn!(property = name, "notion database has no such property, writes may fail");
            }
        }
        Ok(info)
    }

    pub fn assignment_properties(&self, a: &AssignmentRecord) -> Properties {
        let names = &self.settings.properties;
        let mut props = Properties::new();
        props.insert(names.name.clone(), notion::title_value(&a.title));
        props.insert(names.course.clone(), notion::rich_text_value(&a.course_name));
        props.insert(names.canvas_id.clone(), notion::rich_text_value(&a.key()));
        props.insert(names.url.clone(), notion::url_value(a.url.as_deref()));
        props.insert(names.points.clone(), notion::number_value(a.points));
        props.insert(
            names.due.clone(),
            notion::date_value(a.due_rfc3339().as_deref()),
        );
        props.insert(names.status.clone(), notion::rich_text_value(&a.status));
        props
    }

    /// Find the row for the assignment's key and update it, or create it.
    pub async fn upsert_assignment(
        &self,
        a: &AssignmentRecord,
    ) -> Result<UpsertOutcome, ClientError> {
        let key = a.key();
        let filter = PropertyFilter::RichTextEquals {
            property: self.settings.properties.canvas_id.clone(),
            value: key.clone(),
        };
        // Two results are enough to notice a duplicate left behind by an earlier tool.
        let existing = self
            .notion
            .query_database(&self.settings.notion_database_id, &filter, 2)
            .await?;
        if existing.len() > 1 {
            warn!(key = %key, rows = existing.len(), "duplicate rows for key, updating the first");
        }

        let props = self.assignment_properties(a);
        match existing.into_iter().next() {
            Some(row) => {
                self.notion.update_page(&row.id, props).await?;
                info!(course = %a.course_name, title = %a.title, "updated assignment");
                Ok(UpsertOutcome::Updated)
            }
            None => {
                self.notion
                    .create_page(&self.settings.notion_database_id, props)
                    .await?;
                info!(course = %a.course_name, title = %a.title, "created assignment");
                Ok(UpsertOutcome::Created)
            }
        }
    }

    /// Resolve the summary page: configured id, then a database row with the title, then any
    /// workspace page with exactly that title, else a new row in the database.
    pub async fn locate_summary_page(&self) -> Result<String, ClientError> {
        if let Some(id) = &self.settings.syllabi_page_id {
            return Ok(id.clone());
        }
        let title = &self.settings.master_title;

        let filter = PropertyFilter::TitleEquals {
            property: self.settings.properties.name.clone(),
            value: title.clone(),
        };
        let rows = self
            .notion
            .query_database(&self.settings.notion_database_id, &filter, 1)
            .await?;
        if let Some(row) = rows.into_iter().next() {
            return Ok(row.id);
        }

        let found = self.notion.search_pages(title).await?;
        if let Some(page) = found.into_iter().find(|p| p.title == *title) {
            return Ok(page.id);
        }

        let mut props = Properties::new();
        props.insert(
            self.settings.properties.name.clone(),
            notion::title_value(title),
        );
        let page = self
            .notion
            .create_page(&self.settings.notion_database_id, props)
            .await?;
        info!(page_id = %page.id, title = %title, "created summary page");
        Ok(page.id)
    }

    /// Replace the summary page body with the rendered course summaries.
    pub async fn rebuild_summary_page(
        &self,
        courses: &[CourseSummary],
    ) -> Result<SummaryOutcome, ClientError> {
        let blocks = summary::render(courses);
        let digest = summary::digest(&blocks);
        let page_id = self.locate_summary_page().await?;

        let stale = self.notion.list_block_children(&page_id).await?;
        debug!(page_id = %page_id, stale = stale.len(), "clearing summary page");
        for block_id in &stale {
            self.notion.delete_block(block_id).await?;
        }

        for chunk in blocks.chunks(MAX_CHILDREN_PER_REQUEST) {
            self.notion.append_block_children(&page_id, chunk).await?;
        }

        info!(
            page_id = %page_id,
            blocks = blocks.len(),
            digest = %digest,
            "summary page rebuilt"
        );
        Ok(SummaryOutcome {
            page_id,
            blocks: blocks.len(),
            digest,
        })
    }
}
