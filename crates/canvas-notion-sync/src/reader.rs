//! Fetches a course's data from Canvas and turns it into assignment records and summary items.
use std::sync::Arc;

use sync_common::canvas::CanvasApi;
use sync_common::error::ClientError;
use tracing::{debug, warn};

use crate::classify::{self, PREVIEW_CHARS};
use crate::model::{AssignmentRecord, CourseRef, CourseSnapshot, ItemKind, SyllabusLikeItem};

pub struct CourseReader {
    canvas: Arc<dyn CanvasApi>,
}

/// A disabled course tab answers 404, and a tab hidden from the token's user answers 401 or
/// 403. Either way the section is empty; the course's assignments still sync.
fn optional_source<T>(
    result: Result<Vec<T>, ClientError>,
    course: &CourseRef,
    source: &str,
) -> Result<Vec<T>, ClientError> {
    match result {
        Err(e) if e.is_not_found() => Ok(Vec::new()),
        Err(e) if e.is_auth() => {
            warn!(course_id = course.id, source, error = %e, "no access, skipping section");
            Ok(Vec::new())
        }
        other => other,
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

impl CourseReader {
    pub fn new(canvas: Arc<dyn CanvasApi>) -> Self {
        Self { canvas }
    }

    /// Active courses in listing order.
    pub async fn list_courses(&self) -> Result<Vec<CourseRef>, ClientError> {
        let courses = self.canvas.list_active_courses().await?;
        Ok(courses.iter().filter_map(CourseRef::from_canvas).collect())
    }

    /// Fetch and classify everything for one course. Any failure fails the whole course so
    /// that a course is either synced completely or skipped.
    pub async fn read_course(&self, course: &CourseRef) -> Result<CourseSnapshot, ClientError> {
        let assignments = self
            .canvas
            .list_assignments(course.id)
            .await?
            .into_iter()
            .map(|a| AssignmentRecord::from_canvas(course, a))
            .collect::<Vec<_>>();

        let mut items = Vec::new();
        if let Some(item) = self.builtin_syllabus(course).await? {
            items.push(item);
        }
        items.extend(self.orientation_pages(course).await?);
        items.extend(self.orientation_module_items(course).await?);
        items.extend(self.syllabus_files(course).await?);

        debug!(
            course_id = course.id,
            assignments = assignments.len(),
            summary_items = items.len(),
            "course fetched"
        );

        Ok(CourseSnapshot {
            course: course.clone(),
            assignments,
            items,
        })
    }

    async fn builtin_syllabus(
        &self,
        course: &CourseRef,
    ) -> Result<Option<SyllabusLikeItem>, ClientError> {
        let body = self.canvas.syllabus_body(course.id).await?;
        let Some(body) = non_empty(body.as_deref()) else {
            return Ok(None);
        };
        let preview = classify::plain_text_preview(body, PREVIEW_CHARS);
        Ok(Some(SyllabusLikeItem {
            kind: ItemKind::BuiltinSyllabus,
            title: "Syllabus".to_string(),
            url: Some(format!(
                "{}/courses/{}/assignments/syllabus",
                self.canvas.base_url(),
                course.id
            )),
            preview: Some(preview).filter(|p| !p.is_empty()),
        }))
    }

    async fn orientation_pages(
        &self,
        course: &CourseRef,
    ) -> Result<Vec<SyllabusLikeItem>, ClientError> {
        let pages = optional_source(self.canvas.list_pages(course.id).await, course, "pages")?;
        let mut out = Vec::new();
        for page in pages {
            let Some(title) = non_empty(page.title.as_deref()) else {
                continue;
            };
            if !classify::is_orientation_like(title) {
                continue;
            }
            // Bodies are only needed for the preview, so only matching pages are fetched.
            let body = match page.url.as_deref() {
                Some(slug) => match self.canvas.page_body(course.id, slug).await {
                    Ok(body) => body,
                    Err(e) if e.is_not_found() => None,
                    Err(e) if e.is_auth() => {
                        warn!(course_id = course.id, page = slug, error = %e, "page body locked");
                        None
                    }
                    Err(e) => return Err(e),
                },
                None => None,
            };
            let preview = body
                .as_deref()
                .map(|b| classify::plain_text_preview(b, PREVIEW_CHARS))
                .filter(|p| !p.is_empty());
            out.push(SyllabusLikeItem {
                kind: ItemKind::Page,
                title: title.to_string(),
                url: page.html_url,
                preview,
            });
        }
        Ok(out)
    }

    async fn orientation_module_items(
        &self,
        course: &CourseRef,
    ) -> Result<Vec<SyllabusLikeItem>, ClientError> {
        let modules =
            optional_source(self.canvas.list_modules(course.id).await, course, "modules")?;
        let mut out = Vec::new();
        for module in modules {
            let module_matches = module
                .name
                .as_deref()
                .is_some_and(classify::looks_like_orientation);
            let items = optional_source(
                self.canvas.list_module_items(course.id, module.id).await,
                course,
                "module items",
            )?;
            for item in items {
                let Some(title) = non_empty(item.title.as_deref()) else {
                    continue;
                };
                if !module_matches && !classify::is_orientation_like(title) {
                    continue;
                }
                out.push(SyllabusLikeItem {
                    kind: ItemKind::ModuleItem,
                    title: title.to_string(),
                    url: item.html_url.or(item.external_url),
                    preview: None,
                });
            }
        }
        Ok(out)
    }

    async fn syllabus_files(
        &self,
        course: &CourseRef,
    ) -> Result<Vec<SyllabusLikeItem>, ClientError> {
        let files = optional_source(
            self.canvas.list_document_files(course.id).await,
            course,
            "files",
        )?;
        Ok(files
            .into_iter()
            .filter_map(|f| {
                let name = non_empty(f.display_name.as_deref())
                    .or_else(|| non_empty(f.filename.as_deref()))?
                    .to_string();
                if !classify::is_document_name(&name) || !classify::is_orientation_like(&name) {
                    return None;
                }
                Some(SyllabusLikeItem {
                    kind: ItemKind::SyllabusFile,
                    title: name,
                    url: Some(format!(
                        "{}/courses/{}/files/{}",
                        self.canvas.base_url(),
                        course.id,
                        f.id
                    )),
                    preview: None,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeCanvas, FakeCourse};

    fn course(id: u64, name: &str) -> CourseRef {
        CourseRef {
            id,
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn collects_items_in_kind_order() {
        let canvas = FakeCanvas::new().course(
            2,
            "Bio201",
            FakeCourse::default()
                .syllabus("<p>Cells &amp; more</p>")
                .page("start-here", "Start Here", "<p>Read this first.</p>")
                .page("week-3", "Week 3 Notes", "<p>Mitosis</p>")
                .module(9, "Week 0: Orientation", &[(90, "Meet your instructor")])
                .module(10, "Week 1", &[(100, "Lab safety"), (101, "Course Policies")])
                .file(5, "Bio201 Syllabus.pdf")
                .file(6, "Lab1.pdf"),
        );
        let reader = CourseReader::new(Arc::new(canvas));
        let snapshot = reader
            .read_course(&course(2, "Bio201"))
            .await
            .expect("course reads");

        let titles: Vec<(ItemKind, &str)> = snapshot
            .items
            .iter()
            .map(|i| (i.kind, i.title.as_str()))
            .collect();
        assert_eq!(
            titles,
            vec![
                (ItemKind::BuiltinSyllabus, "Syllabus"),
                (ItemKind::Page, "Start Here"),
                (ItemKind::ModuleItem, "Meet your instructor"),
                (ItemKind::ModuleItem, "Course Policies"),
                (ItemKind::SyllabusFile, "Bio201 Syllabus.pdf"),
            ]
        );
        assert_eq!(snapshot.items[0].preview.as_deref(), Some("Cells & more"));
        assert_eq!(
            snapshot.items[0].url.as_deref(),
            Some("https://canvas.test/courses/2/assignments/syllabus")
        );
        assert_eq!(snapshot.items[1].preview.as_deref(), Some("Read this first."));
        assert_eq!(
            snapshot.items[4].url.as_deref(),
            Some("https://canvas.test/courses/2/files/5")
        );
    }

    #[tokio::test]
    async fn only_matching_pages_have_bodies_fetched() {
        let canvas = Arc::new(
            FakeCanvas::new().course(
                1,
                "Math101",
                FakeCourse::default()
                    .page("welcome", "Welcome!", "<p>hi</p>")
                    .page("hw-1", "Homework 1", "<p>x</p>"),
            ),
        );
        let reader = CourseReader::new(canvas.clone());
        reader
            .read_course(&course(1, "Math101"))
            .await
            .expect("course reads");
        assert_eq!(canvas.page_body_fetches(), vec!["welcome".to_string()]);
    }

    #[tokio::test]
    async fn disabled_tabs_are_empty_not_errors() {
        let canvas = FakeCanvas::new().course(
            1,
            "Math101",
            FakeCourse::default()
                .assignment(11, "Essay", Some((2025, 1, 10)))
                .missing("pages")
                .missing("modules")
                .missing("files"),
        );
        let reader = CourseReader::new(Arc::new(canvas));
        let snapshot = reader
            .read_course(&course(1, "Math101"))
            .await
            .expect("course reads");
        assert_eq!(snapshot.assignments.len(), 1);
        assert!(snapshot.items.is_empty());
    }

    #[tokio::test]
    async fn hidden_tabs_leave_assignments_intact() {
        let canvas = FakeCanvas::new().course(
            1,
            "Math101",
            FakeCourse::default()
                .assignment(11, "Essay", Some((2025, 1, 10)))
                .page("start-here", "Start Here", "<p>Locked</p>")
                .module(9, "Orientation", &[(90, "Meet your instructor")])
                .forbidden("files")
                .forbidden("page_body"),
        );
        let reader = CourseReader::new(Arc::new(canvas));
        let snapshot = reader
            .read_course(&course(1, "Math101"))
            .await
            .expect("course reads");
        assert_eq!(snapshot.assignments.len(), 1);
        let titles: Vec<&str> = snapshot.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["Start Here", "Meet your instructor"]);
        assert_eq!(snapshot.items[0].preview, None);
    }

    #[tokio::test]
    async fn forbidden_pages_and_modules_are_empty() {
        let canvas = FakeCanvas::new().course(
            1,
            "Math101",
            FakeCourse::default()
                .assignment(11, "Essay", Some((2025, 1, 10)))
                .forbidden("pages")
                .forbidden("modules"),
        );
        let reader = CourseReader::new(Arc::new(canvas));
        let snapshot = reader
            .read_course(&course(1, "Math101"))
            .await
            .expect("course reads");
        assert_eq!(snapshot.assignments.len(), 1);
        assert!(snapshot.items.is_empty());
    }

    #[tokio::test]
    async fn blank_syllabus_is_skipped() {
        let canvas =
            FakeCanvas::new().course(1, "Math101", FakeCourse::default().syllabus("   "));
        let reader = CourseReader::new(Arc::new(canvas));
        let snapshot = reader
            .read_course(&course(1, "Math101"))
            .await
            .expect("course reads");
        assert!(snapshot.items.is_empty());
    }

    #[tokio::test]
    async fn server_error_fails_the_course() {
        let canvas = FakeCanvas::new()
            .course(1, "Math101", FakeCourse::default())
            .failing(1);
        let reader = CourseReader::new(Arc::new(canvas));
        let err = reader.read_course(&course(1, "Math101")).await.unwrap_err();
        assert_eq!(err.status(), Some(sync_common::StatusCode::INTERNAL_SERVER_ERROR));
    }
}
