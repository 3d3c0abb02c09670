//! Shared error types for the services crate.

use thiserror::Error;

use learn_core::AnswerError;
use learn_core::model::{Phase, QuestionId};

/// Failures reported by a `SessionGateway` call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("not found")]
    NotFound,
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("forbidden")]
    Forbidden,
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else {
            GatewayError::Network(err.to_string())
        }
    }
}

/// Errors building the gateway configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid base URL {raw:?}: {reason}")]
    InvalidBaseUrl { raw: String, reason: String },
    #[error("invalid timeout {raw:?}")]
    InvalidTimeout { raw: String },
    #[error("http client could not be built: {0}")]
    Client(String),
}

/// Errors emitted by the study-flow services.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FlowError {
    #[error("network failure: {0}")]
    NetworkFailure(String),
    #[error("session not found")]
    NotFound,
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("session belongs to another user")]
    Forbidden,
    #[error("{phase} content unavailable: {reason}")]
    ContentUnavailable { phase: Phase, reason: String },
    #[error("grading failed for {question_id}: {reason}")]
    GradingFailure {
        question_id: QuestionId,
        reason: String,
    },
    #[error("question {0} is not part of the current phase")]
    UnknownItem(QuestionId),
    #[error("question {0} is already being graded")]
    AlreadyGrading(QuestionId),
    #[error("question {0} was already graded")]
    AlreadyGraded(QuestionId),
    #[error("the {0} phase has no gradable items")]
    NotGradable(Phase),
    #[error("phase content is not loaded yet")]
    NotLoaded,
    #[error("correlation id is not known yet")]
    MissingCorrelation,
    #[error("session view is closed")]
    Closed,
    #[error(transparent)]
    Answer(#[from] AnswerError),
}

impl From<GatewayError> for FlowError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Network(reason) => FlowError::NetworkFailure(reason),
            GatewayError::NotFound => FlowError::NotFound,
            GatewayError::InvalidState(reason) => FlowError::InvalidState(reason),
            GatewayError::Forbidden => FlowError::Forbidden,
            GatewayError::Status(code) => FlowError::NetworkFailure(format!("status {code}")),
            GatewayError::Decode(reason) => FlowError::NetworkFailure(reason),
        }
    }
}

impl FlowError {
    /// Maps a content fetch failure for `phase` onto the load policy.
    ///
    /// Network and ownership failures keep their kind; everything else is
    /// reported as unavailable content.
    #[must_use]
    pub fn from_load(phase: Phase, err: GatewayError) -> Self {
        match err {
            GatewayError::Network(reason) => FlowError::NetworkFailure(reason),
            GatewayError::Forbidden => FlowError::Forbidden,
            other => FlowError::ContentUnavailable {
                phase,
                reason: other.to_string(),
            },
        }
    }

    /// Whether the session view must end.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, FlowError::Forbidden)
    }
}
