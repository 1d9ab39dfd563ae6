use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::answer::AnswerValue;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    /// Present for `mcq` questions; empty otherwise.
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    Mcq,
    Essay,
    Code,
    Descriptive,
}

/// Everything the data source returns for one assessment instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentBundle {
    pub duration_ms: u64,
    pub questions: Vec<Question>,
    /// Answers saved by a previous visit of this session, if any.
    #[serde(default)]
    pub prior_answers: Option<HashMap<String, AnswerValue>>,
}
