use learn_core::model::{
    Phase, ScoreBoard, StudyMode, SummaryPayload, TopicId, WrongItem,
};

use super::grader::ItemGrader;
use super::loader::{PhaseContent, PhaseRequest};
use crate::error::FlowError;
use crate::gateway::ContentKey;

/// Drives the five phases when no session exists.
///
/// Content comes from topic-keyed endpoints; completion, branching and the
/// final summary are decided locally. Never advances anything on the server.
#[derive(Debug, Clone)]
pub struct FallbackController {
    topic_id: TopicId,
    mode: StudyMode,
    phase: Phase,
    scores: ScoreBoard,
    wrong: Vec<WrongItem>,
}

impl FallbackController {
    #[must_use]
    pub fn new(topic_id: TopicId, mode: StudyMode) -> Self {
        Self {
            topic_id,
            mode,
            phase: Phase::Concept,
            scores: ScoreBoard::default(),
            wrong: Vec::new(),
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn scores(&self) -> ScoreBoard {
        self.scores
    }

    #[must_use]
    pub fn wrong_items(&self) -> &[WrongItem] {
        &self.wrong
    }

    /// Remote request for the current phase; `None` for locally computed phases.
    #[must_use]
    pub fn request(&self) -> Option<PhaseRequest> {
        let key = ContentKey {
            topic_id: self.topic_id,
            session_id: None,
        };
        match self.phase {
            Phase::Concept => Some(PhaseRequest::Concept(key)),
            Phase::Mini => Some(PhaseRequest::Mini(key)),
            Phase::Problem => Some(PhaseRequest::Problem {
                key,
                mode: self.mode,
            }),
            Phase::Wrong | Phase::Result => None,
        }
    }

    /// Content for the locally computed phases.
    #[must_use]
    pub fn local_content(&self) -> Option<PhaseContent> {
        match self.phase {
            Phase::Wrong => Some(PhaseContent::Wrong(self.wrong.clone())),
            Phase::Result => Some(PhaseContent::Result(self.summary())),
            _ => None,
        }
    }

    #[must_use]
    pub fn summary(&self) -> SummaryPayload {
        let text = format!(
            "{} of {} correct",
            self.scores.total_correct(),
            self.scores.total_items()
        );
        SummaryPayload::from_scores(self.mode, &self.scores, text)
    }

    /// Close the current phase and move to the next one.
    ///
    /// Item phases need their grader, fully graded. The wrong phase is
    /// entered only when the problem phase produced misses.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::NotLoaded` if an item phase has no grader,
    /// `FlowError::InvalidState` if items are still unanswered and
    /// `FlowError::Closed` past the result phase.
    pub fn finish_phase(&mut self, grader: Option<&ItemGrader>) -> Result<Phase, FlowError> {
        let next = match self.phase {
            Phase::Concept => Phase::Mini,
            Phase::Mini => {
                self.scores.mini = Self::completed(grader)?.score();
                Phase::Problem
            }
            Phase::Problem => {
                let grader = Self::completed(grader)?;
                self.scores.problem = grader.score();
                self.wrong = grader.wrong_items();
                if self.wrong.is_empty() {
                    Phase::Result
                } else {
                    Phase::Wrong
                }
            }
            Phase::Wrong => Phase::Result,
            Phase::Result => return Err(FlowError::Closed),
        };
        tracing::debug!(topic_id = %self.topic_id, from = %self.phase, to = %next, "fallback phase finished");
        self.phase = next;
        Ok(next)
    }

    fn completed(grader: Option<&ItemGrader>) -> Result<&ItemGrader, FlowError> {
        let grader = grader.ok_or(FlowError::NotLoaded)?;
        if !grader.is_complete() {
            let progress = grader.progress();
            return Err(FlowError::InvalidState(format!(
                "{} of {} items answered",
                progress.answered, progress.total
            )));
        }
        Ok(grader)
    }
}
