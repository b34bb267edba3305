//! Renders the summary page body.
//!
//! Output is a pure function of the course summaries and their order: no timestamps, no
//! state from earlier runs.
use std::collections::HashSet;

use sha2::{Digest, Sha256};
use sync_common::notion::Block;

use crate::model::{CourseSummary, SyllabusLikeItem};

pub const EMPTY_NOTICE: &str = "No syllabus or orientation material found in active courses.";

pub fn bullet_text(item: &SyllabusLikeItem) -> String {
    match item.preview.as_deref().filter(|p| !p.is_empty()) {
        Some(preview) => format!("[{}] {} — {}", item.kind.label(), item.title, preview),
        None => format!("[{}] {}", item.kind.label(), item.title),
    }
}

/// One `heading_2` per course that has items, followed by its bullets. Courses keep their
/// given order; within a course items are ordered by kind, then by first appearance.
pub fn render(courses: &[CourseSummary]) -> Vec<Block> {
    let mut blocks = Vec::new();
    for summary in courses {
        let mut items: Vec<&SyllabusLikeItem> = summary.items.iter().collect();
        items.sort_by_key(|i| i.kind);

        let mut seen = HashSet::new();
        let bullets: Vec<Block> = items
            .into_iter()
            .filter(|&i| seen.insert((i.kind, i.title.as_str(), i.url.as_deref())))
            .map(|i| Block::Bullet {
                text: bullet_text(i),
                link: i.url.clone(),
            })
            .collect();
        if bullets.is_empty() {
            continue;
        }
        blocks.push(Block::Heading2(summary.course.name.clone()));
        blocks.extend(bullets);
    }
    if blocks.is_empty() {
        blocks.push(Block::Paragraph(EMPTY_NOTICE.to_string()));
    }
    blocks
}

/// Hex SHA-256 over the serialized blocks.
pub fn digest(blocks: &[Block]) -> String {
    let mut hasher = Sha256::new();
    for block in blocks {
        hasher.update(block.to_json().to_string().as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}
