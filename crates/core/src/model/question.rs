use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AnswerError;
use crate::model::{CorrelationId, QuestionId};

/// Which grading protocol an item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionKind {
    /// True/false knowledge check.
    Mini,
    /// Multiple choice, answered by label.
    Mcq,
    /// Free text, graded by the server only.
    Practical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub label: String,
    pub text: String,
}

/// A question as served to the client. Never carries the correct answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionItem {
    pub question_id: QuestionId,
    pub prompt: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
}

impl QuestionItem {
    /// Checks that `answer` fits this item's protocol.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError::KindMismatch` for the wrong answer shape,
    /// `AnswerError::UnknownChoice` for a label not offered, and
    /// `AnswerError::Blank` for an empty free-text answer.
    pub fn check_answer(&self, answer: &Answer) -> Result<(), AnswerError> {
        if answer.kind() != self.kind {
            return Err(AnswerError::KindMismatch {
                expected: self.kind,
                got: answer.kind(),
            });
        }
        match answer {
            Answer::Choice(label) if !self.choices.iter().any(|c| &c.label == label) => {
                Err(AnswerError::UnknownChoice(label.clone()))
            }
            Answer::Text(text) if text.trim().is_empty() => Err(AnswerError::Blank),
            _ => Ok(()),
        }
    }
}

/// One learner answer, shaped by grading protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Boolean(bool),
    Choice(String),
    Text(String),
}

impl Answer {
    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        match self {
            Answer::Boolean(_) => QuestionKind::Mini,
            Answer::Choice(_) => QuestionKind::Mcq,
            Answer::Text(_) => QuestionKind::Practical,
        }
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::Boolean(true) => f.write_str("O"),
            Answer::Boolean(false) => f.write_str("X"),
            Answer::Choice(label) => f.write_str(label),
            Answer::Text(text) => f.write_str(text),
        }
    }
}

/// Server verdict for one submitted answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradingResult {
    pub correct: bool,
    /// Correct answer text (mini/practical) or label (mcq).
    pub correct_answer: Option<String>,
    pub explanation: Option<String>,
    /// Present on the first mini grading response of a session.
    pub correlation_id: Option<CorrelationId>,
}

/// Items for one phase plus the correlation id the first response may carry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ItemSet {
    pub items: Vec<QuestionItem>,
    pub correlation_id: Option<CorrelationId>,
}

/// A previously missed item, as shown in wrong-answer review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrongItem {
    pub question_id: QuestionId,
    pub prompt: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    pub user_answer: String,
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mcq() -> QuestionItem {
        QuestionItem {
            question_id: QuestionId::new(1),
            prompt: "Which normal form removes partial dependencies?".into(),
            choices: vec![
                Choice {
                    label: "A".into(),
                    text: "1NF".into(),
                },
                Choice {
                    label: "B".into(),
                    text: "2NF".into(),
                },
            ],
            image_url: None,
            kind: QuestionKind::Mcq,
        }
    }

    #[test]
    fn check_answer_accepts_offered_label() {
        assert!(mcq().check_answer(&Answer::Choice("B".into())).is_ok());
    }

    #[test]
    fn check_answer_rejects_unknown_label_and_wrong_shape() {
        let item = mcq();
        assert_eq!(
            item.check_answer(&Answer::Choice("Z".into())),
            Err(AnswerError::UnknownChoice("Z".into()))
        );
        assert!(matches!(
            item.check_answer(&Answer::Boolean(true)),
            Err(AnswerError::KindMismatch { .. })
        ));
    }

    #[test]
    fn practical_answer_must_not_be_blank() {
        let item = QuestionItem {
            kind: QuestionKind::Practical,
            choices: Vec::new(),
            ..mcq()
        };
        assert_eq!(
            item.check_answer(&Answer::Text("  ".into())),
            Err(AnswerError::Blank)
        );
        assert!(item.check_answer(&Answer::Text("SELECT 1".into())).is_ok());
    }
}
