//! Remote calls against the study server.

mod http;
mod memory;
mod wire;

use async_trait::async_trait;

use learn_core::model::{
    AdvanceTarget, Answer, ConceptContent, CorrelationId, GradingResult, ItemSet, LearningSession, QuestionId,
    SessionId, Step, StepDetails, StudyMode, SummaryPayload, TopicId, WrongItem,
};

use crate::error::GatewayError;

pub use http::HttpSessionGateway;
pub use memory::{AnswerKey, BankItem, CallCounts, InMemoryStudyServer, TopicFixture};

/// Key for topic content; `session_id` is `None` on the session-less path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentKey {
    pub topic_id: TopicId,
    pub session_id: Option<SessionId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvanceRequest {
    pub session_id: SessionId,
    pub step: Step,
    pub score: Option<u8>,
    pub details: Option<StepDetails>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeRequest {
    pub topic_id: TopicId,
    pub question_id: QuestionId,
    pub answer: Answer,
    pub session_id: Option<SessionId>,
}

/// Contract with the server that owns session progress.
///
/// Implementations keep no state of their own beyond the call in flight.
#[async_trait]
pub trait SessionGateway: Send + Sync {
    /// Fetch the authoritative session snapshot.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::NotFound` for unknown sessions, or transport errors.
    async fn fetch_session(&self, session_id: SessionId) -> Result<LearningSession, GatewayError>;

    /// Start (or resume) a session for a topic.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` on transport or server failures.
    async fn start_session(
        &self,
        topic_id: TopicId,
        mode: StudyMode,
        resume: bool,
    ) -> Result<SessionId, GatewayError>;

    /// Complete the current step and move to the next one.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::InvalidState` if the step is incomplete or not active,
    /// `GatewayError::Forbidden` if the caller does not own the session.
    async fn advance_step(&self, request: &AdvanceRequest) -> Result<AdvanceTarget, GatewayError>;

    /// # Errors
    ///
    /// Returns `GatewayError` on transport or server failures.
    async fn fetch_concept(&self, key: ContentKey) -> Result<ConceptContent, GatewayError>;

    /// # Errors
    ///
    /// Returns `GatewayError` on transport or server failures.
    async fn fetch_mini_items(&self, key: ContentKey) -> Result<ItemSet, GatewayError>;

    /// Mcq items for written sessions, practical items otherwise.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` on transport or server failures.
    async fn fetch_problem_items(
        &self,
        key: ContentKey,
        mode: StudyMode,
    ) -> Result<ItemSet, GatewayError>;

    /// Grade one answer. The endpoint is chosen by the answer's kind.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` on transport or server failures.
    async fn grade_one(&self, request: &GradeRequest) -> Result<GradingResult, GatewayError>;

    /// # Errors
    ///
    /// Returns `GatewayError` on transport or server failures.
    async fn fetch_wrong_items(
        &self,
        correlation_id: &CorrelationId,
        mode: StudyMode,
    ) -> Result<Vec<WrongItem>, GatewayError>;

    /// # Errors
    ///
    /// Returns `GatewayError` on transport or server failures.
    async fn fetch_summary(
        &self,
        topic_id: TopicId,
        correlation_id: &CorrelationId,
    ) -> Result<SummaryPayload, GatewayError>;
}
