use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod answer;
pub mod integrity;
pub mod question;
pub mod timer;

use answer::AnswerValue;
use integrity::ViolationKind;

/// Canonical session lifecycle. `Terminating` is the short-lived window
/// between the winning termination signal and the sink acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NotStarted,
    Active,
    Terminating,
    Submitted,
}

/// Decided once at session construction, immutable thereafter. Integrity
/// watchers are installed iff `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Locked,
    Open,
}

impl Environment {
    /// Classify the host from its reported identity string. Pure; callers
    /// evaluate it exactly once per session so a mid-exam environment switch
    /// cannot disable the guards.
    pub fn detect(host_signature: &str, locked_signatures: &[String]) -> Self {
        for pattern in locked_signatures {
            match regex::Regex::new(pattern) {
                Ok(re) => {
                    if re.is_match(host_signature) {
                        return Environment::Locked;
                    }
                }
                Err(e) => {
                    tracing::warn!("Ignoring invalid locked-host pattern {:?}: {}", pattern, e);
                }
            }
        }
        Environment::Open
    }
}

/// Why the session left `Active`. Write-once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    Manual,
    Expired,
    Violation(ViolationKind),
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::Manual => "manual",
            TerminationReason::Expired => "expired",
            TerminationReason::Violation(kind) => kind.as_str(),
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot handed to the UI surface on every change.
#[derive(Debug, Clone, Serialize)]
pub struct RenderState {
    pub state: SessionState,
    pub remaining_ms: u64,
    /// `mm:ss` rendering of `remaining_ms`.
    pub remaining_clock: String,
    pub current_question_index: usize,
    pub answers: HashMap<String, AnswerValue>,
    pub violation_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

/// User intents emitted by the UI surface back into the state machine.
#[derive(Debug, Clone)]
pub enum UserIntent {
    Start,
    Answer { question_id: String, value: AnswerValue },
    Navigate { index: usize },
    ManualSubmit { force: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEB_UA: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 SEB/3.5.0 (x64)";
    const CHROME_UA: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0 Safari/537.36";

    fn default_signatures() -> Vec<String> {
        vec!["SEB/".to_string(), "SafeExamBrowser".to_string()]
    }

    #[test]
    fn kiosk_signature_is_locked() {
        let env = Environment::detect(SEB_UA, &default_signatures());
        assert_eq!(env, Environment::Locked);
    }

    #[test]
    fn plain_browser_is_open() {
        let env = Environment::detect(CHROME_UA, &default_signatures());
        assert_eq!(env, Environment::Open);
    }

    #[test]
    fn invalid_pattern_is_skipped() {
        let sigs = vec!["(unclosed".to_string(), "SEB/".to_string()];
        assert_eq!(Environment::detect(SEB_UA, &sigs), Environment::Locked);
        assert_eq!(Environment::detect(CHROME_UA, &sigs), Environment::Open);
    }

    #[test]
    fn termination_reason_audit_tags() {
        assert_eq!(TerminationReason::Manual.as_str(), "manual");
        assert_eq!(TerminationReason::Expired.as_str(), "expired");
        assert_eq!(
            TerminationReason::Violation(ViolationKind::TabHidden).as_str(),
            "tab-hidden"
        );
    }
}
