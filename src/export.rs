use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::error::RepairError;
use crate::model::QuestionRecord;
use crate::normalize::Normalizer;
use crate::ordering::{assign_order, UNKNOWN_TOPIC};

pub const EXPORT_FILE: &str = "exam.json";

/// Normalize every record, then number them. Returns the topic count.
pub fn finalize(records: &mut [QuestionRecord], normalizer: &Normalizer) -> usize {
    info!(
        "Cleaning {} questions (asset base {})",
        records.len(),
        normalizer.base_url()
    );
    for record in records.iter_mut() {
        normalizer.normalize(record);
    }
    info!("Assigning question order and topic numbering");
    assign_order(records)
}

pub fn to_json(records: &[QuestionRecord]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(records)
}

/// Finalize `records` and write them to `<output_dir>/exam.json`.
pub fn save(
    mut records: Vec<QuestionRecord>,
    normalizer: &Normalizer,
    output_dir: &Path,
) -> Result<(PathBuf, usize)> {
    let topics = finalize(&mut records, normalizer);

    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let path = output_dir.join(EXPORT_FILE);
    let json = to_json(&records).context("Failed to serialize questions")?;
    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;

    info!("Saved {} questions to {}", records.len(), path.display());
    Ok((path, topics))
}

pub fn load(path: &Path) -> Result<Vec<QuestionRecord>, RepairError> {
    if !path.exists() {
        return Err(RepairError::NotFound(path.to_path_buf()));
    }
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

#[derive(Debug)]
pub struct RepairSummary {
    pub questions: usize,
    pub written_to: PathBuf,
    pub backup: Option<PathBuf>,
}

/// Re-run the cleanup pipeline over an exported file.
///
/// With no `output` the file is rewritten in place after copying it to
/// `<file>.backup`. Nothing is written unless the whole file parsed.
pub fn repair(
    input: &Path,
    output: Option<&Path>,
    normalizer: &Normalizer,
) -> Result<RepairSummary, RepairError> {
    info!("Reading file: {}", input.display());
    let mut records = load(input)?;
    if records.is_empty() {
        return Err(RepairError::Empty(input.to_path_buf()));
    }

    finalize(&mut records, normalizer);
    let json = to_json(&records)?;

    let (written_to, backup) = match output {
        Some(out) => (out.to_path_buf(), None),
        None => {
            let backup = backup_path(input);
            fs::copy(input, &backup)?;
            info!("Backup created: {}", backup.display());
            (input.to_path_buf(), Some(backup))
        }
    };
    fs::write(&written_to, json)?;
    info!("Cleaned file saved: {}", written_to.display());

    Ok(RepairSummary {
        questions: records.len(),
        written_to,
        backup,
    })
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".backup");
    PathBuf::from(name)
}

#[derive(Debug, Default)]
pub struct ExportStats {
    pub total: usize,
    /// Question count per topic, in order of first appearance.
    pub topics: Vec<(String, usize)>,
    pub text_answers: usize,
    pub image_answers: usize,
    pub unanswered: usize,
    pub with_votes: usize,
    pub discussions: usize,
}

pub fn stats(records: &[QuestionRecord]) -> ExportStats {
    let mut s = ExportStats {
        total: records.len(),
        ..Default::default()
    };
    let mut index: HashMap<&str, usize> = HashMap::new();

    for r in records {
        let topic = if r.topic.is_empty() { UNKNOWN_TOPIC } else { r.topic.as_str() };
        match index.get(topic) {
            Some(&i) => s.topics[i].1 += 1,
            None => {
                index.insert(topic, s.topics.len());
                s.topics.push((topic.to_string(), 1));
            }
        }

        if r.legacy.correct_answer_image_url.is_some() || r.legacy.correct_answer.starts_with("[IMAGE:") {
            s.image_answers += 1;
        } else if !r.legacy.correct_answer.is_empty() {
            s.text_answers += 1;
        } else {
            s.unanswered += 1;
        }
        if !r.voted_answers.is_empty() {
            s.with_votes += 1;
        }
        s.discussions += r.discussion_count as usize;
    }
    s
}
