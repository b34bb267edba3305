//! Title heuristics deciding what goes on the summary page, plus the dated filter.
//!
//! Matching is keyword based on purpose: a false positive only adds one extra link.
use std::sync::LazyLock;

use regex::Regex;

use crate::model::AssignmentRecord;

/// Preview length for page and syllabus bodies, in characters.
pub const PREVIEW_CHARS: usize = 120;

static ORIENTATION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\borientation\b",
        r"\bstart\s*here\b",
        r"\bbegin\s*here\b",
        r"\bgetting\s*started\b",
        r"\bwelcome\b",
        r"\bread\s*me\s*first\b",
        r"\bcourse\s*(overview|info|information)\b",
        r"\bpolic(y|ies)\b",
        r"\bsimple\s*syllabus\b",
        r"\bsmart\s*syllabus\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static SYLLABUS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bsyllab\w*\b").expect("valid regex"));

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

const DOCUMENT_EXTENSIONS: [&str; 3] = [".pdf", ".doc", ".docx"];

/// An assignment is dated iff Canvas gave it a due date.
pub fn is_dated(assignment: &AssignmentRecord) -> bool {
    assignment.due_at.is_some()
}

/// Whether the assignment takes part in the upsert under the `ONLY_DATED` option.
pub fn should_upsert(assignment: &AssignmentRecord, only_dated: bool) -> bool {
    !only_dated || is_dated(assignment)
}

fn normalize(title: &str) -> String {
    WS_RE.replace_all(title.trim(), " ").to_lowercase()
}

pub fn looks_like_orientation(title: &str) -> bool {
    let t = normalize(title);
    !t.is_empty() && ORIENTATION_PATTERNS.iter().any(|re| re.is_match(&t))
}

pub fn looks_like_syllabus(title: &str) -> bool {
    let t = normalize(title);
    !t.is_empty() && SYLLABUS_PATTERN.is_match(&t)
}

/// Orientation or syllabus material. Empty titles never match.
pub fn is_orientation_like(title: &str) -> bool {
    looks_like_orientation(title) || looks_like_syllabus(title)
}

/// PDF or Word document, judged by file name.
pub fn is_document_name(name: &str) -> bool {
    let lower = name.trim().to_lowercase();
    DOCUMENT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Plain-text preview of an HTML body, cut to `limit` characters with a trailing ellipsis.
pub fn plain_text_preview(html_body: &str, limit: usize) -> String {
    let stripped = TAG_RE.replace_all(html_body, " ");
    let decoded = html_escape::decode_html_entities(&stripped);
    let text = WS_RE.replace_all(&decoded, " ").trim().to_string();
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}…", text[..idx].trim_end()),
        None => text,
    }
}
