use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sync_common::canvas;

/// An active Canvas course, in the order Canvas listed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseRef {
    pub id: u64,
    pub name: String,
}

impl CourseRef {
    /// `None` for listing entries without an id (Canvas returns these for restricted courses).
    pub fn from_canvas(course: &canvas::Course) -> Option<Self> {
        let id = course.id?;
        let name = course
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Course {id}"));
        Some(Self { id, name })
    }
}

/// An assignment as it will be projected onto a Notion row.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentRecord {
    pub course_id: u64,
    pub course_name: String,
    pub id: u64,
    pub title: String,
    pub due_at: Option<DateTime<Utc>>,
    pub url: Option<String>,
    pub points: Option<f64>,
    pub status: String,
}

impl AssignmentRecord {
    pub fn from_canvas(course: &CourseRef, a: canvas::Assignment) -> Self {
        let title = a
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Assignment {}", a.id));
        let status = a.workflow_state.unwrap_or_else(|| {
            if a.published.unwrap_or(true) {
                "published".to_string()
            } else {
                "unpublished".to_string()
            }
        });
        Self {
            course_id: course.id,
            course_name: course.name.clone(),
            id: a.id,
            title,
            due_at: a.due_at,
            url: a.html_url,
            points: a.points_possible,
            status,
        }
    }

    /// Stable identity of the Notion row: `{course_id}:{assignment_id}`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.course_id, self.id)
    }

    pub fn due_rfc3339(&self) -> Option<String> {
        self.due_at
            .map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

/// Where a summary link came from. Declaration order is the order bullets are emitted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    BuiltinSyllabus,
    Page,
    ModuleItem,
    SyllabusFile,
}

impl ItemKind {
    pub fn label(self) -> &'static str {
        match self {
            ItemKind::BuiltinSyllabus => "Syllabus",
            ItemKind::Page => "Page",
            ItemKind::ModuleItem => "Module",
            ItemKind::SyllabusFile => "File",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyllabusLikeItem {
    pub kind: ItemKind,
    pub title: String,
    pub url: Option<String>,
    pub preview: Option<String>,
}

/// Summary contribution of one course.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseSummary {
    pub course: CourseRef,
    pub items: Vec<SyllabusLikeItem>,
}

/// Everything fetched for one course in a pass.
#[derive(Debug, Clone)]
pub struct CourseSnapshot {
    pub course: CourseRef,
    pub assignments: Vec<AssignmentRecord>,
    pub items: Vec<SyllabusLikeItem>,
}

impl CourseSnapshot {
    pub fn summary(&self) -> CourseSummary {
        CourseSummary {
            course: self.course.clone(),
            items: self.items.clone(),
        }
    }
}
