//! One sync run: preflight, per-course fetch and upsert, then the summary rebuild.
use serde::Serialize;
use tracing::{error, info, warn};

use crate::classify;
use crate::error::{AppError, Service};
use crate::model::CourseSummary;
use crate::reader::CourseReader;
use crate::writer::{NotionWriter, UpsertOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Succeeded,
    PartiallyFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    CourseFetch,
    Write,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncIssue {
    pub kind: IssueKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub courses_seen: usize,
    pub courses_processed: usize,
    pub assignments_created: usize,
    pub assignments_updated: usize,
    pub assignments_skipped_undated: usize,
    pub summary_items: usize,
    pub summary_page_id: Option<String>,
    pub summary_digest: Option<String>,
    pub issues: Vec<SyncIssue>,
    pub state: RunState,
}

impl SyncReport {
    fn new(courses_seen: usize) -> Self {
        Self {
            courses_seen,
            courses_processed: 0,
            assignments_created: 0,
            assignments_updated: 0,
            assignments_skipped_undated: 0,
            summary_items: 0,
            summary_page_id: None,
            summary_digest: None,
            issues: Vec::new(),
            state: RunState::Running,
        }
    }
}

pub struct SyncEngine {
    reader: CourseReader,
    writer: NotionWriter,
    only_dated: bool,
}

impl SyncEngine {
    pub fn new(reader: CourseReader, writer: NotionWriter, only_dated: bool) -> Self {
        Self {
            reader,
            writer,
            only_dated,
        }
    }

    /// Run a full sync. Returns `Err` only for failures that happen before anything is
    /// written; everything later ends up in the report's issues.
    pub async fn run(&self) -> Result<SyncReport, AppError> {
        self.writer
            .preflight()
            .await
            .map_err(|e| AppError::from_client(Service::Notion, e))?;
        let courses = self
            .reader
            .list_courses()
            .await
            .map_err(|e| AppError::from_client(Service::Canvas, e))?;
        info!(courses = courses.len(), only_dated = self.only_dated, "sync started");

        let mut report = SyncReport::new(courses.len());
        let mut summaries: Vec<CourseSummary> = Vec::new();

        for course in &courses {
            let snapshot = match self.reader.read_course(course).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(course_id = course.id, course = %course.name, error = %e, "skipping course");
                    report.issues.push(SyncIssue {
                        kind: IssueKind::CourseFetch,
                        course: Some(course.name.clone()),
                        item: None,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            for assignment in &snapshot.assignments {
                if !classify::should_upsert(assignment, self.only_dated) {
                    report.assignments_skipped_undated += 1;
                    continue;
                }
                match self.writer.upsert_assignment(assignment).await {
                    Ok(UpsertOutcome::Created) => report.assignments_created += 1,
                    Ok(UpsertOutcome::Updated) => report.assignments_updated += 1,
                    Err(e) => {
                        warn!(key = %assignment.key(), error = %e, "assignment write failed");
                        report.issues.push(SyncIssue {
                            kind: IssueKind::Write,
                            course: Some(course.name.clone()),
                            item: Some(assignment.title.clone()),
                            message: e.to_string(),
                        });
                    }
                }
            }

            summaries.push(snapshot.summary());
            report.courses_processed += 1;
        }

        report.summary_items = summaries.iter().map(|s| s.items.len()).sum();
        match self.writer.rebuild_summary_page(&summaries).await {
            Ok(outcome) => {
                report.summary_page_id = Some(outcome.page_id);
                report.summary_digest = Some(outcome.digest);
            }
            Err(e) => {
                error!(error = %e, "summary page rebuild failed");
                report.issues.push(SyncIssue {
                    kind: IssueKind::Write,
                    course: None,
                    item: Some("summary page".to_string()),
                    message: e.to_string(),
                });
            }
        }

        report.state = if report.issues.is_empty() {
            RunState::Succeeded
        } else {
            RunState::PartiallyFailed
        };
        info!(
            processed = report.courses_processed,
            created = report.assignments_created,
            updated = report.assignments_updated,
            skipped = report.assignments_skipped_undated,
            issues = report.issues.len(),
            state = ?report.state,
            "sync finished"
        );
        Ok(report)
    }
}
