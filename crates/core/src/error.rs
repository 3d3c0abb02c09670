use thiserror::Error;

use crate::model::QuestionKind;

/// Answer shape problems caught before anything is sent to the server.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnswerError {
    #[error("answer kind {got:?} does not fit a {expected:?} item")]
    KindMismatch {
        expected: QuestionKind,
        got: QuestionKind,
    },
    #[error("choice {0:?} is not offered by this item")]
    UnknownChoice(String),
    #[error("free-text answer is blank")]
    Blank,
}
