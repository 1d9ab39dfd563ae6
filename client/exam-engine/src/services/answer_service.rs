use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::answer::{all_answered, AnswerValue};
use crate::models::question::Question;

/// In-memory map of question id → response. The session layer only writes
/// while `Active`; readers (auto-save, submission) always go through
/// `snapshot()` so a write landing mid-read cannot produce a torn view.
#[derive(Default)]
pub struct AnswerStore {
    answers: Mutex<HashMap<String, AnswerValue>>,
}

impl AnswerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore answers saved by a previous visit of this session.
    pub fn seed(&self, prior: HashMap<String, AnswerValue>) {
        let mut answers = self.answers.lock().expect("answer store poisoned");
        if !prior.is_empty() {
            tracing::info!("Restoring {} previously saved answers", prior.len());
        }
        *answers = prior;
    }

    /// Overwrites any prior value for the question.
    pub fn set(&self, question_id: &str, value: AnswerValue) {
        let mut answers = self.answers.lock().expect("answer store poisoned");
        answers.insert(question_id.to_string(), value);
    }

    pub fn get(&self, question_id: &str) -> Option<AnswerValue> {
        let answers = self.answers.lock().expect("answer store poisoned");
        answers.get(question_id).cloned()
    }

    /// Immutable copy for submission and auto-save, never the live map.
    pub fn snapshot(&self) -> HashMap<String, AnswerValue> {
        let answers = self.answers.lock().expect("answer store poisoned");
        answers.clone()
    }

    pub fn is_complete(&self, questions: &[Question]) -> bool {
        let answers = self.answers.lock().expect("answer store poisoned");
        all_answered(questions, &answers)
    }
}
