use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::similarity::{DuplicatePair, QuestionDuplicate};

#[derive(Debug, Deserialize)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct ResponseOk<T: Serialize> {
    pub id: String,
    pub result: T,
}

#[derive(Debug, Serialize)]
pub struct ResponseErr {
    pub id: String,
    pub error: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitParams {
    pub model_dir: Option<String>,
    pub device: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmbedParams {
    pub texts: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SimilarityParams {
    pub a: String,
    pub b: String,
}

#[derive(Debug, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareParams {
    pub first: QaPair,
    pub second: QaPair,
    pub threshold: Option<f32>,
    pub slider_value: Option<f64>,
}

/// Each list is checked on its own; omitted lists are skipped.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicatesParams {
    /// Correct answers across questions.
    #[serde(default)]
    pub answers: Vec<String>,
    /// Labelled choices of a single question (`"a. ..."`).
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default)]
    pub questions: Vec<String>,
    pub threshold: Option<f32>,
    pub slider_value: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloResult {
    pub host_version: &'static str,
    pub model_name: &'static str,
    pub dims: usize,
    pub initialized: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitResult {
    pub ok: bool,
    pub model_name: &'static str,
    pub model_dir: String,
    pub device: String,
    pub dims: usize,
    pub max_seq_length: usize,
}

#[derive(Debug, Serialize)]
pub struct EmbedResult {
    pub count: usize,
    pub dims: usize,
    pub embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
pub struct SimilarityResult {
    pub similarity: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareResult {
    pub question_similarity: f32,
    pub answer_similarity: f32,
    pub score: f32,
    pub threshold: f32,
    pub is_duplicate: bool,
}

#[derive(Debug, Serialize)]
pub struct DuplicatesResult {
    pub threshold: f32,
    pub answers: Option<DuplicatePair>,
    pub choices: Option<DuplicatePair>,
    pub questions: Vec<QuestionDuplicate>,
}
