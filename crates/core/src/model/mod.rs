mod content;
mod ids;
mod phase;
mod question;
mod resume;
mod session;
mod summary;

pub use content::{ConceptContent, ConceptSection, ContentBlock};
pub use ids::{CorrelationId, ParseIdError, QuestionId, SessionId, StepId, TopicId};
pub use phase::{Phase, project_step};
pub use question::{Answer, Choice, GradingResult, ItemSet, QuestionItem, QuestionKind, WrongItem};
pub use resume::ResumeHandle;
pub use session::{
    AdvanceTarget, LearningSession, SessionStatus, SessionStepRecord, Step, StepCompletion,
    StepDetails, StepState, StudyMode,
};
pub use summary::{PhaseScore, Reward, ScoreBoard, SummaryPayload};
