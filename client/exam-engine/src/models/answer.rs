use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::integrity::IntegrityTelemetry;
use super::question::Question;

/// A candidate's response to a single question.
///
/// `mcq` questions store the selected option list, everything else stores
/// free text. An empty string and an empty selection are both "unanswered",
/// the same equivalence the completeness check applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Text(String),
    Selection(Vec<String>),
}

impl AnswerValue {
    pub fn is_unanswered(&self) -> bool {
        match self {
            AnswerValue::Text(text) => text.trim().is_empty(),
            AnswerValue::Selection(options) => options.is_empty(),
        }
    }
}

/// True iff every supplied question has a non-empty recorded value.
pub fn all_answered(questions: &[Question], answers: &HashMap<String, AnswerValue>) -> bool {
    questions.iter().all(|question| {
        answers
            .get(&question.id)
            .map(|value| !value.is_unanswered())
            .unwrap_or(false)
    })
}

/// Terminal payload delivered to the submission sink exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionPayload {
    pub answers: HashMap<String, AnswerValue>,
    /// `"manual" | "expired" | "<violation-name>"` audit field.
    pub reason: String,
    pub complete: bool,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<IntegrityTelemetry>,
}

/// Periodic best-effort flush of the answer store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoSavePayload {
    pub answers: HashMap<String, AnswerValue>,
    pub last_activity_at: DateTime<Utc>,
}
