// similarity.rs - Vector similarity and duplicate scoring on top of embeddings.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context};
use serde::Serialize;

use crate::config;

/// Cosine similarity of two vectors.
/// Returns 0.0 when the lengths differ, either vector is empty, or either has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Score a question/answer pair against another one.
///
/// When both similarities clear `PAIR_FLOOR` the score is their mean;
/// otherwise the weaker side decides.
pub fn combined_score(question_similarity: f32, answer_similarity: f32) -> f32 {
    let floor = config::similarity::PAIR_FLOOR;
    if question_similarity >= floor && answer_similarity >= floor {
        (question_similarity + answer_similarity) / 2.0
    } else {
        question_similarity.min(answer_similarity)
    }
}

/// Convert the stored settings-slider value into a similarity threshold in 0..1.
pub fn threshold_from_slider(value: f64) -> f32 {
    ((value / config::similarity::SLIDER_STEP) as f32) / 100.0
}

/// Read the threshold from a `{"Value": <slider>}` settings file.
pub fn load_threshold(path: &Path) -> anyhow::Result<f32> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let v: serde_json::Value = serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    let slider = v
        .get("Value")
        .and_then(|v| v.as_f64())
        .with_context(|| format!("missing numeric \"Value\" in {}", path.display()))?;
    Ok(threshold_from_slider(slider))
}

/// `load_threshold`, falling back to `DEFAULT_THRESHOLD` with a warning.
pub fn load_threshold_or_default(path: &Path) -> f32 {
    match load_threshold(path) {
        Ok(t) => t,
        Err(e) => {
            log::warn!(
                "Could not load similarity threshold, using default {}: {:?}",
                config::similarity::DEFAULT_THRESHOLD,
                e
            );
            config::similarity::DEFAULT_THRESHOLD
        }
    }
}

/// Two texts judged to say the same thing.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DuplicatePair {
    pub first: String,
    pub second: String,
    pub similarity: f32,
}

/// Indices of two questions judged to be duplicates.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct QuestionDuplicate {
    pub first: usize,
    pub second: usize,
    pub similarity: f32,
}

/// Split a labelled answer such as `"b. Paris"` into `("b", "Paris")`.
/// Returns `None` when there is no `.` separator.
pub fn split_answer_label(answer: &str) -> Option<(&str, &str)> {
    let (label, content) = answer.split_once('.')?;
    Some((label.trim(), content.trim()))
}

fn long_enough(text: &str) -> bool {
    text.chars().count() > config::similarity::MIN_ANSWER_CHARS
}

/// First pair (in input order) whose similarity is strictly above `threshold`.
///
/// `embed` is only called when there are at least two texts to compare.
fn first_pair_above<F>(
    labels: &[&str],
    texts: &[&str],
    threshold: f32,
    embed: F,
) -> anyhow::Result<Option<DuplicatePair>>
where
    F: FnOnce(&[&str]) -> anyhow::Result<Vec<Vec<f32>>>,
{
    if texts.len() < 2 {
        return Ok(None);
    }
    let vectors = embed(texts)?;
    if vectors.len() != texts.len() {
        bail!("expected {} embeddings, got {}", texts.len(), vectors.len());
    }

    for i in 0..vectors.len() {
        for j in (i + 1)..vectors.len() {
            let similarity = cosine_similarity(&vectors[i], &vectors[j]);
            if similarity > threshold {
                return Ok(Some(DuplicatePair {
                    first: labels[i].to_string(),
                    second: labels[j].to_string(),
                    similarity,
                }));
            }
        }
    }
    Ok(None)
}

/// Look for two near-identical answers across a set of questions.
///
/// Answers of `MIN_ANSWER_CHARS` characters or fewer are ignored.
pub fn find_duplicate_answers<S, F>(answers: &[S], threshold: f32, embed: F) -> anyhow::Result<Option<DuplicatePair>>
where
    S: AsRef<str>,
    F: FnOnce(&[&str]) -> anyhow::Result<Vec<Vec<f32>>>,
{
    let texts: Vec<&str> = answers.iter().map(|s| s.as_ref()).filter(|a| long_enough(a)).collect();
    first_pair_above(&texts, &texts, threshold, embed)
}

/// Look for two choices of the same question that say the same thing.
///
/// Choices are labelled (`"a. ..."`); unlabelled ones are ignored. Identical
/// contents (ignoring ASCII case) are reported with similarity 1.0 without
/// embedding anything. Otherwise contents longer than `MIN_ANSWER_CHARS` are
/// compared semantically.
pub fn find_duplicates_within_question<S, F>(
    choices: &[S],
    threshold: f32,
    embed: F,
) -> anyhow::Result<Option<DuplicatePair>>
where
    S: AsRef<str>,
    F: FnOnce(&[&str]) -> anyhow::Result<Vec<Vec<f32>>>,
{
    let labelled: Vec<(&str, &str, &str)> = choices
        .iter()
        .map(|s| s.as_ref())
        .filter_map(|raw| split_answer_label(raw).map(|(label, content)| (raw, label, content)))
        .collect();

    let mut seen: Vec<(&str, &str)> = Vec::new();
    for &(raw, label, content) in &labelled {
        if content.is_empty() {
            continue;
        }
        if let Some((prev_label, prev_content)) = seen.iter().find(|(_, c)| c.eq_ignore_ascii_case(content)) {
            return Ok(Some(DuplicatePair {
                first: format!("{prev_label}.{prev_content}"),
                second: raw.to_string(),
                similarity: 1.0,
            }));
        }
        seen.push((label, content));
    }

    let (labels, texts): (Vec<&str>, Vec<&str>) = labelled
        .iter()
        .filter(|(_, _, content)| long_enough(content))
        .map(|&(raw, _, content)| (raw, content))
        .unzip();
    first_pair_above(&labels, &texts, threshold, embed)
}

/// Every pair of duplicate questions, by index.
///
/// Questions with the same text (ignoring case) come first with similarity 1.0;
/// the remaining pairs are added when their similarity is above `threshold`.
pub fn find_duplicate_questions<S, F>(questions: &[S], threshold: f32, embed: F) -> anyhow::Result<Vec<QuestionDuplicate>>
where
    S: AsRef<str>,
    F: FnOnce(&[&str]) -> anyhow::Result<Vec<Vec<f32>>>,
{
    let texts: Vec<&str> = questions.iter().map(|s| s.as_ref()).collect();

    let mut duplicates = Vec::new();
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    for (i, text) in texts.iter().enumerate() {
        match first_seen.get(&text.to_lowercase()) {
            Some(&prev) => duplicates.push(QuestionDuplicate { first: prev, second: i, similarity: 1.0 }),
            None => {
                first_seen.insert(text.to_lowercase(), i);
            }
        }
    }

    if texts.len() < 2 {
        return Ok(duplicates);
    }
    let vectors = embed(&texts)?;
    if vectors.len() != texts.len() {
        bail!("expected {} embeddings, got {}", texts.len(), vectors.len());
    }

    for i in 0..texts.len() {
        for j in (i + 1)..texts.len() {
            if duplicates.iter().any(|d| d.first == i && d.second == j) {
                continue;
            }
            let similarity = cosine_similarity(&vectors[i], &vectors[j]);
            if similarity > threshold {
                duplicates.push(QuestionDuplicate { first: i, second: j, similarity });
            }
        }
    }
    Ok(duplicates)
}
