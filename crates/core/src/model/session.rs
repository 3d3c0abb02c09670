use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{CorrelationId, SessionId, StepId, TopicId};

//
// ─── ENUMS ─────────────────────────────────────────────────────────────────────
//

/// Study track of a session; decides which problem set and wrong-list variant apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StudyMode {
    Written,
    Practical,
}

impl StudyMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StudyMode::Written => "WRITTEN",
            StudyMode::Practical => "PRACTICAL",
        }
    }

    /// Parses the wire value, case-insensitively.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "WRITTEN" => Some(Self::Written),
            "PRACTICAL" => Some(Self::Practical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    InProgress,
    Done,
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepState {
    Ready,
    InProgress,
    Complete,
    Closed,
}

/// Server-side step identifier.
///
/// Values the client does not know are kept verbatim in `Other` so a newer
/// server never breaks deserialization; the projector fails them closed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Step {
    Concept,
    Mini,
    ReviewWrong,
    Mcq,
    Practical,
    PracticalSet,
    Summary,
    Other(String),
}

impl Step {
    #[must_use]
    pub fn as_code(&self) -> &str {
        match self {
            Step::Concept => "CONCEPT",
            Step::Mini => "MINI",
            Step::ReviewWrong => "REVIEW_WRONG",
            Step::Mcq => "MCQ",
            Step::Practical => "PRACTICAL",
            Step::PracticalSet => "PRACTICAL_SET",
            Step::Summary => "SUMMARY",
            Step::Other(raw) => raw,
        }
    }

    /// The problem step used by a given study mode.
    #[must_use]
    pub fn problem_for(mode: StudyMode) -> Self {
        match mode {
            StudyMode::Written => Step::Mcq,
            StudyMode::Practical => Step::Practical,
        }
    }
}

impl From<String> for Step {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "CONCEPT" => Step::Concept,
            "MINI" => Step::Mini,
            "REVIEW_WRONG" => Step::ReviewWrong,
            "MCQ" => Step::Mcq,
            "PRACTICAL" => Step::Practical,
            "PRACTICAL_SET" => Step::PracticalSet,
            "SUMMARY" => Step::Summary,
            _ => Step::Other(raw),
        }
    }
}

impl From<Step> for String {
    fn from(step: Step) -> Self {
        match step {
            Step::Other(raw) => raw,
            known => known.as_code().to_string(),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

/// The `movedTo` hint returned by a successful advance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AdvanceTarget {
    Step(Step),
    End,
}

impl From<String> for AdvanceTarget {
    fn from(raw: String) -> Self {
        if raw == "END" {
            AdvanceTarget::End
        } else {
            AdvanceTarget::Step(Step::from(raw))
        }
    }
}

impl From<AdvanceTarget> for String {
    fn from(target: AdvanceTarget) -> Self {
        match target {
            AdvanceTarget::Step(step) => step.into(),
            AdvanceTarget::End => "END".to_string(),
        }
    }
}

impl fmt::Display for AdvanceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdvanceTarget::Step(step) => fmt::Display::fmt(step, f),
            AdvanceTarget::End => f.write_str("END"),
        }
    }
}

//
// ─── STEP DETAILS ──────────────────────────────────────────────────────────────
//

/// Phase-local counters reported by the server inside `detailsJson`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StepDetails {
    pub total: Option<u32>,
    pub answered: Option<u32>,
    pub correct: Option<u32>,
}

/// Completion verdict derived from [`StepDetails`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepCompletion {
    Complete,
    Incomplete { answered: u32, total: u32 },
    /// The server reported no counters; it stays the arbiter on advance.
    Unreported,
}

impl StepDetails {
    #[must_use]
    pub fn completion(&self) -> StepCompletion {
        match (self.answered, self.total) {
            (Some(answered), Some(total)) if answered >= total => StepCompletion::Complete,
            (Some(answered), Some(total)) => StepCompletion::Incomplete { answered, total },
            (None, Some(total)) if total > 0 => StepCompletion::Incomplete { answered: 0, total },
            (None, Some(_)) => StepCompletion::Complete,
            (_, None) => StepCompletion::Unreported,
        }
    }
}

//
// ─── SNAPSHOT ──────────────────────────────────────────────────────────────────
//

/// One step entry of a session snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStepRecord {
    pub step_id: Option<StepId>,
    pub step: Step,
    pub state: StepState,
    pub score_percent: Option<u8>,
    pub details: StepDetails,
}

/// Server-owned session snapshot.
///
/// Treat it as stale after any advance or grade call and fetch a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearningSession {
    pub session_id: SessionId,
    pub topic_id: TopicId,
    pub mode: StudyMode,
    pub status: SessionStatus,
    pub current_step: Option<Step>,
    pub steps: Vec<SessionStepRecord>,
    pub correlation_id: Option<CorrelationId>,
}

impl LearningSession {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::InProgress
    }

    #[must_use]
    pub fn step_record(&self, step: &Step) -> Option<&SessionStepRecord> {
        self.steps.iter().find(|record| &record.step == step)
    }

    /// The record backing `current_step`, if the server listed one.
    #[must_use]
    pub fn current_record(&self) -> Option<&SessionStepRecord> {
        self.current_step
            .as_ref()
            .and_then(|step| self.step_record(step))
    }

    /// Whether `step` is the step the server currently considers active.
    #[must_use]
    pub fn is_current(&self, step: &Step) -> bool {
        self.current_step.as_ref() == Some(step)
    }
}
