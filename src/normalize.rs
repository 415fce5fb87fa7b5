//! Record cleanup shared by the crawl export and the repair pass.
//!
//! Every step is idempotent, so running the whole pipeline over an export
//! that already went through it leaves the bytes unchanged.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::model::QuestionRecord;

pub const DEFAULT_BASE_URL: &str = "https://www.examtopics.com";

static MULTI_SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {2,}").unwrap());
static VOTING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*(?:most\s+voted|highly\s+voted|community\s+vote)\s*$").unwrap()
});
static LEGACY_IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^\[IMAGE:\s*(.+?)\]$").unwrap());
static SRC_ASSET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)src=["']/(assets/[^"']+)["']"#).unwrap());
static MARKER_ASSET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[IMAGE:\s*/(assets/[^\]]+)\]").unwrap());
static BARE_ASSET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(^|[\s(>])/(assets/[^\s"'<>()\]]+)"#).unwrap());

/// Tabs to spaces, per-line trim, single spaces, no blank lines.
pub fn clean_whitespace(text: &str) -> String {
    let text = text.replace('\t', " ");
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| MULTI_SPACE_RE.replace_all(line, " "))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Drop trailing "Most Voted" style badges that leak into option text.
pub fn strip_voting_indicators(text: &str) -> String {
    let mut current = text.trim().to_string();
    loop {
        let stripped = VOTING_RE.replace(&current, "").trim().to_string();
        if stripped == current {
            return current;
        }
        current = stripped;
    }
}

/// Move a legacy `[IMAGE: <url>]` correct answer into the image URL field.
/// Returns whether anything moved.
pub fn migrate_legacy_answer(record: &mut QuestionRecord) -> bool {
    let legacy = &mut record.legacy;
    let Some(url) = LEGACY_IMAGE_RE
        .captures(legacy.correct_answer.trim())
        .map(|caps| caps[1].trim().to_string())
    else {
        return false;
    };
    legacy.correct_answer_image_url = Some(url);
    legacy.correct_answer.clear();
    true
}

/// Rewrites site-relative `/assets/...` references to absolute URLs.
#[derive(Debug, Clone)]
pub struct Normalizer {
    base_url: String,
}

impl Default for Normalizer {
    fn default() -> Self {
        Normalizer::new(DEFAULT_BASE_URL)
    }
}

impl Normalizer {
    pub fn new(base_url: &str) -> Self {
        Normalizer {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolutize asset references inside free text or markup.
    pub fn fix_images_in_text(&self, text: &str) -> String {
        let base = &self.base_url;
        let text = SRC_ASSET_RE.replace_all(text, |c: &Captures| format!(r#"src="{base}/{}""#, &c[1]));
        let text = MARKER_ASSET_RE.replace_all(&text, |c: &Captures| format!("[IMAGE: {base}/{}]", &c[1]));
        BARE_ASSET_RE
            .replace_all(&text, |c: &Captures| format!("{}{base}/{}", &c[1], &c[2]))
            .into_owned()
    }

    /// Absolutize a value that is itself a URL.
    pub fn fix_image_url(&self, url: &str) -> String {
        let lower = url.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return url.to_string();
        }
        if url.starts_with('/') && !url.starts_with("//") {
            return format!("{}{}", self.base_url, url);
        }
        url.to_string()
    }

    /// Full pipeline for one record: legacy migration, whitespace, voting
    /// badges, then URL rewriting.
    pub fn normalize(&self, record: &mut QuestionRecord) {
        migrate_legacy_answer(record);
        clean_record_whitespace(record);
        self.fix_record_urls(record);
    }

    fn fix_record_urls(&self, r: &mut QuestionRecord) {
        fix(&mut r.question_text, |t| self.fix_images_in_text(t));
        fix(&mut r.answer_description, |t| self.fix_images_in_text(t));

        fix(&mut r.legacy.correct_answer, |t| self.fix_images_in_text(t));
        fix_opt(&mut r.legacy.correct_answer_image_url, |u| self.fix_image_url(u));

        fix(&mut r.current.original_answer, |t| self.fix_images_in_text(t));
        fix(&mut r.current.precio_answer, |t| self.fix_images_in_text(t));
        fix_opt(&mut r.current.original_answer_image_url, |u| self.fix_image_url(u));
        fix_opt(&mut r.current.precio_answer_image_url, |u| self.fix_image_url(u));

        for option in &mut r.options {
            fix(&mut option.text, |t| self.fix_images_in_text(t));
        }
        for entry in &mut r.discussions {
            fix(&mut entry.content, |t| self.fix_images_in_text(t));
        }
    }
}

fn clean_record_whitespace(r: &mut QuestionRecord) {
    for field in [
        &mut r.question_number,
        &mut r.topic,
        &mut r.data_id,
        &mut r.url,
        &mut r.question_text,
        &mut r.answer_description,
        &mut r.legacy.correct_answer,
        &mut r.current.original_answer,
        &mut r.current.precio_answer,
    ] {
        fix(field, clean_whitespace);
    }

    for field in [
        &mut r.legacy.correct_answer_image_url,
        &mut r.current.original_answer_image_url,
        &mut r.current.precio_answer_image_url,
        &mut r.exam_topics_id,
    ] {
        fix_opt(field, clean_whitespace);
        if field.as_deref() == Some("") {
            *field = None;
        }
    }

    for option in &mut r.options {
        fix(&mut option.letter, clean_whitespace);
        fix(&mut option.text, |t| strip_voting_indicators(&clean_whitespace(t)));
    }
    for vote in &mut r.voted_answers {
        fix(&mut vote.answer, clean_whitespace);
    }
    for entry in &mut r.discussions {
        fix(&mut entry.user, clean_whitespace);
        fix(&mut entry.content, clean_whitespace);
        fix(&mut entry.timestamp, clean_whitespace);
    }
}

fn fix(field: &mut String, f: impl FnOnce(&str) -> String) {
    if !field.is_empty() {
        *field = f(field);
    }
}

fn fix_opt(field: &mut Option<String>, f: impl FnOnce(&str) -> String) {
    if let Some(value) = field.as_mut() {
        fix(value, f);
    }
}
