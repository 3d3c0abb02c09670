use std::sync::Arc;

use learn_core::model::{
    AdvanceTarget, LearningSession, PhaseScore, SessionId, Step, StepCompletion, StepDetails,
};

use crate::error::{FlowError, GatewayError};
use crate::gateway::{AdvanceRequest, SessionGateway};

/// Why an advance was not sent or not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclineReason {
    /// The session is no longer open.
    Closed,
    /// The server has already moved past (or not yet reached) the step.
    NotCurrent {
        expected: Step,
        current: Option<Step>,
    },
    /// Server counters still show unanswered items.
    Incomplete { answered: u32, total: u32 },
    /// The server refused the advance.
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceReport {
    /// `moved_to` is only a hint; `snapshot` is the state fetched afterwards.
    /// The snapshot is `None` when the server no longer lists the session.
    Advanced {
        moved_to: AdvanceTarget,
        snapshot: Option<LearningSession>,
    },
    /// Nothing moved; the fresh snapshot is handed back for re-sync.
    Declined {
        reason: DeclineReason,
        snapshot: LearningSession,
    },
}

/// Confirms completion against the server and moves the session forward.
#[derive(Clone)]
pub struct ProgressAdvancer {
    gateway: Arc<dyn SessionGateway>,
}

impl ProgressAdvancer {
    #[must_use]
    pub fn new(gateway: Arc<dyn SessionGateway>) -> Self {
        Self { gateway }
    }

    /// Advance `step` of `session_id`, attaching the local phase score if any.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::Forbidden`, `FlowError::NotFound` or
    /// `FlowError::NetworkFailure` when a call fails outright. A refused
    /// advance is reported as `AdvanceReport::Declined`, not as an error.
    pub async fn advance(
        &self,
        session_id: SessionId,
        step: &Step,
        local: Option<PhaseScore>,
    ) -> Result<AdvanceReport, FlowError> {
        let snapshot = self.gateway.fetch_session(session_id).await?;
        if let Some(reason) = Self::precheck(&snapshot, step) {
            tracing::debug!(session_id = %session_id, step = %step, ?reason, "advance declined");
            return Ok(AdvanceReport::Declined { reason, snapshot });
        }

        let request = AdvanceRequest {
            session_id,
            step: step.clone(),
            score: local.map(|score| score.percent()),
            details: local.map(details_from),
        };
        match self.gateway.advance_step(&request).await {
            Ok(moved_to) => {
                tracing::debug!(session_id = %session_id, from = %step, to = %moved_to, "advanced");
                let snapshot = self.refetch(session_id).await?;
                Ok(AdvanceReport::Advanced { moved_to, snapshot })
            }
            Err(GatewayError::InvalidState(reason)) => {
                tracing::warn!(session_id = %session_id, step = %step, %reason, "advance rejected, resyncing");
                let snapshot = self.gateway.fetch_session(session_id).await?;
                Ok(AdvanceReport::Declined {
                    reason: DeclineReason::Rejected(reason),
                    snapshot,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    fn precheck(snapshot: &LearningSession, step: &Step) -> Option<DeclineReason> {
        if !snapshot.is_open() {
            return Some(DeclineReason::Closed);
        }
        if !snapshot.is_current(step) {
            return Some(DeclineReason::NotCurrent {
                expected: step.clone(),
                current: snapshot.current_step.clone(),
            });
        }
        let record = snapshot.current_record()?;
        match record.details.completion() {
            StepCompletion::Incomplete { answered, total } => {
                Some(DeclineReason::Incomplete { answered, total })
            }
            StepCompletion::Complete | StepCompletion::Unreported => None,
        }
    }

    async fn refetch(&self, session_id: SessionId) -> Result<Option<LearningSession>, FlowError> {
        match self.gateway.fetch_session(session_id).await {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(GatewayError::NotFound) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

fn details_from(score: PhaseScore) -> StepDetails {
    StepDetails {
        total: Some(score.total),
        answered: Some(score.answered),
        correct: Some(score.correct),
    }
}
