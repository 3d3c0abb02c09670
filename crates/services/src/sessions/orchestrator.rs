use std::sync::Arc;

use learn_core::Clock;
use learn_core::model::{
    AdvanceTarget, Answer, CorrelationId, GradingResult, LearningSession, Phase, PhaseScore,
    QuestionId, ResumeHandle, ScoreBoard, SessionId, Step, StepDetails, StudyMode,
    SummaryPayload, TopicId, project_step,
};
use storage::repository::ResumeHandleRepository;

use super::advancer::{AdvanceReport, DeclineReason, ProgressAdvancer};
use super::context::SessionContext;
use super::fallback::FallbackController;
use super::grader::{GradeOutcome, GradeTicket, ItemGrader};
use super::loader::{PhaseContent, PhaseDataLoader, PhaseRequest};
use super::progress::SessionProgress;
use crate::error::{FlowError, GatewayError};
use crate::gateway::{GradeRequest, SessionGateway};

/// Result of asking to leave the current phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// A new phase is active. `hint` is the server's `movedTo`, absent on the
    /// session-less path.
    Moved {
        phase: Phase,
        hint: Option<AdvanceTarget>,
    },
    /// The advance was declined; `phase` is the phase after re-sync.
    Declined { phase: Phase, reason: DeclineReason },
    /// The session is over; the result phase stays visible.
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Ready,
    /// The entered phase had nothing to show and was continued once.
    AutoContinued(Transition),
}

enum Source {
    Local(PhaseContent),
    Remote(PhaseRequest),
}

/// Drives one topic visit from the first phase to the summary.
///
/// Holds the only mutable state of the flow: the active phase, its loaded
/// content and grader, the cumulative scores and the session context. With a
/// session id the server decides every transition; without one the
/// [`FallbackController`] does.
pub struct SessionOrchestrator {
    gateway: Arc<dyn SessionGateway>,
    handles: Arc<dyn ResumeHandleRepository>,
    clock: Clock,
    loader: PhaseDataLoader,
    advancer: ProgressAdvancer,
    context: SessionContext,
    fallback: Option<FallbackController>,
    snapshot: Option<LearningSession>,
    phase: Phase,
    epoch: u64,
    content: Option<PhaseContent>,
    grader: Option<ItemGrader>,
    scores: ScoreBoard,
    summary: Option<SummaryPayload>,
    auto_continued: bool,
    closed: bool,
}

impl SessionOrchestrator {
    #[must_use]
    pub fn new(
        gateway: Arc<dyn SessionGateway>,
        handles: Arc<dyn ResumeHandleRepository>,
        topic_id: TopicId,
        mode: StudyMode,
        session_id: Option<SessionId>,
    ) -> Self {
        let fallback = session_id
            .is_none()
            .then(|| FallbackController::new(topic_id, mode));
        Self {
            loader: PhaseDataLoader::new(Arc::clone(&gateway)),
            advancer: ProgressAdvancer::new(Arc::clone(&gateway)),
            gateway,
            handles,
            clock: Clock::default(),
            context: SessionContext::new(topic_id, mode, session_id),
            fallback,
            snapshot: None,
            phase: Phase::Concept,
            epoch: 0,
            content: None,
            grader: None,
            scores: ScoreBoard::default(),
            summary: None,
            auto_continued: false,
            closed: false,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    // ─── ACCESSORS ─────────────────────────────────────────────────────────────

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Increases every time a phase is entered or the view closes.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    #[must_use]
    pub fn content(&self) -> Option<&PhaseContent> {
        self.content.as_ref()
    }

    #[must_use]
    pub fn grader(&self) -> Option<&ItemGrader> {
        self.grader.as_ref()
    }

    #[must_use]
    pub fn scores(&self) -> ScoreBoard {
        self.scores
    }

    #[must_use]
    pub fn summary(&self) -> Option<&SummaryPayload> {
        self.summary.as_ref()
    }

    #[must_use]
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Last snapshot fetched from the server.
    #[must_use]
    pub fn snapshot(&self) -> Option<&LearningSession> {
        self.snapshot.as_ref()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Item progress of the active phase, if it has items.
    #[must_use]
    pub fn progress(&self) -> Option<SessionProgress> {
        self.grader.as_ref().map(ItemGrader::progress)
    }

    #[must_use]
    pub fn resume_handle(&self) -> Option<ResumeHandle> {
        self.context.resume_handle(self.clock.now())
    }

    // ─── LIFECYCLE ─────────────────────────────────────────────────────────────

    /// Derive the starting phase.
    ///
    /// With a session id: restore the saved handle, fetch the snapshot once and
    /// project its current step. Concept content is loaded eagerly only when
    /// the session starts in the concept phase.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::NotFound` for an unknown session (see
    /// [`SessionOrchestrator::restart`]), `FlowError::Forbidden` (the view
    /// closes) or load errors for the concept phase.
    pub async fn initialize(&mut self) -> Result<Phase, FlowError> {
        let Some(session_id) = self.context.session_id() else {
            self.enter_phase(Phase::Concept);
            self.load_current().await?;
            return Ok(self.phase);
        };

        self.restore_handle(session_id).await;
        let result = self.gateway.fetch_session(session_id).await;
        let snapshot = result.map_err(|err| self.fail(err.into()))?;
        let phase = derive_phase(&snapshot);
        let open = snapshot.is_open();
        self.seed_scores(&snapshot);
        self.store_snapshot(snapshot).await;
        self.enter_phase(phase);
        tracing::info!(session_id = %session_id, phase = %phase, "session initialized");

        if !open {
            self.finish().await;
            return Ok(phase);
        }
        self.persist_handle().await;
        if phase == Phase::Concept {
            self.load_current().await?;
        }
        Ok(phase)
    }

    /// Start over after the session disappeared, resuming an open session
    /// for the same topic when the server has one.
    ///
    /// # Errors
    ///
    /// Returns `FlowError` if the start call or the re-initialization fails.
    pub async fn restart(&mut self) -> Result<Phase, FlowError> {
        let Some(old) = self.context.session_id() else {
            self.reset();
            return self.initialize().await;
        };
        let result = self
            .gateway
            .start_session(self.context.topic_id(), self.context.mode(), true)
            .await;
        let session_id = result.map_err(|err| self.fail(err.into()))?;
        if let Err(err) = self.handles.clear_handle(old).await {
            tracing::warn!(session_id = %old, error = %err, "could not clear stale resume handle");
        }
        tracing::info!(old = %old, new = %session_id, "session restarted");
        self.context.rebind(session_id);
        self.reset();
        self.initialize().await
    }

    // ─── CONTENT ───────────────────────────────────────────────────────────────

    /// Load the active phase's content, once per visit.
    ///
    /// An entered wrong-answer phase with nothing to review continues on its
    /// own, exactly once.
    ///
    /// # Errors
    ///
    /// Returns load errors without retrying, `FlowError::MissingCorrelation`
    /// when wrong/result content cannot be addressed, and `FlowError::Closed`
    /// once the view is closed.
    pub async fn load_current(&mut self) -> Result<LoadOutcome, FlowError> {
        if self.content.is_some() {
            return Ok(LoadOutcome::Ready);
        }
        if self.closed && self.phase != Phase::Result {
            return Err(FlowError::Closed);
        }

        let source = match self.fallback.as_ref() {
            Some(fallback) => match fallback.local_content() {
                Some(content) => Source::Local(content),
                None => Source::Remote(fallback.request().ok_or(FlowError::NotLoaded)?),
            },
            None => Source::Remote(self.session_request().await?),
        };
        let content = match source {
            Source::Local(content) => content,
            Source::Remote(request) => {
                let result = self.loader.load(&request).await;
                result.map_err(|err| self.fail(err))?
            }
        };
        self.install(content).await;

        let nothing_to_review =
            matches!(&self.content, Some(PhaseContent::Wrong(items)) if items.is_empty());
        if nothing_to_review && !self.auto_continued {
            self.auto_continued = true;
            tracing::info!(epoch = self.epoch, "no wrong answers to review, continuing");
            let transition = self.continue_phase().await?;
            return Ok(LoadOutcome::AutoContinued(transition));
        }
        Ok(LoadOutcome::Ready)
    }

    async fn session_request(&mut self) -> Result<PhaseRequest, FlowError> {
        let key = self.context.content_key();
        let mode = self.context.mode();
        let request = match self.phase {
            Phase::Concept => PhaseRequest::Concept(key),
            Phase::Mini => PhaseRequest::Mini(key),
            Phase::Problem => PhaseRequest::Problem { key, mode },
            Phase::Wrong => PhaseRequest::Wrong {
                correlation_id: self.resolve_correlation().await?,
                mode,
            },
            Phase::Result => PhaseRequest::Result {
                topic_id: self.context.topic_id(),
                correlation_id: self.resolve_correlation().await?,
            },
        };
        Ok(request)
    }

    /// Correlation id for wrong/summary calls. Falls back to the session's
    /// problem item set when neither the handle nor the snapshot carried one.
    async fn resolve_correlation(&mut self) -> Result<CorrelationId, FlowError> {
        if let Some(correlation_id) = self.context.correlation_id() {
            return Ok(correlation_id.clone());
        }
        let result = self
            .loader
            .load_problem(self.context.content_key(), self.context.mode())
            .await;
        let items = result.map_err(|err| self.fail(err))?;
        let correlation_id = items.correlation_id.ok_or(FlowError::MissingCorrelation)?;
        self.capture(correlation_id.clone()).await;
        Ok(correlation_id)
    }

    async fn install(&mut self, content: PhaseContent) {
        if let Some(correlation_id) = content.correlation_id().cloned() {
            self.capture(correlation_id).await;
        }
        match &content {
            PhaseContent::Mini(set) => {
                let grader = ItemGrader::new(set.items.clone(), self.epoch);
                self.scores.mini = caught_up(self.scores.mini, grader.score());
                self.grader = Some(grader);
            }
            PhaseContent::Problem(set) => {
                let grader = ItemGrader::new(set.items.clone(), self.epoch);
                self.scores.problem = caught_up(self.scores.problem, grader.score());
                self.grader = Some(grader);
            }
            PhaseContent::Result(summary) => self.summary = Some(summary.clone()),
            PhaseContent::Concept(_) | PhaseContent::Wrong(_) => {}
        }
        self.content = Some(content);
    }

    // ─── GRADING ───────────────────────────────────────────────────────────────

    /// Accept an answer for grading and hand out its ticket.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::NotGradable` outside item phases,
    /// `FlowError::NotLoaded` before the items are loaded, and the grader's
    /// rejections for unknown, pending or graded items.
    pub fn begin_answer(
        &mut self,
        question_id: QuestionId,
        answer: Answer,
    ) -> Result<GradeTicket, FlowError> {
        if self.closed {
            return Err(FlowError::Closed);
        }
        let phase = self.phase;
        let grader = self.grader.as_mut().ok_or(match phase {
            Phase::Mini | Phase::Problem => FlowError::NotLoaded,
            other => FlowError::NotGradable(other),
        })?;
        grader.begin(question_id, answer)
    }

    /// The grade-one request for an issued ticket.
    #[must_use]
    pub fn grade_request(&self, ticket: &GradeTicket) -> GradeRequest {
        ticket.request(self.context.content_key())
    }

    /// Apply a grading response. Responses for a phase that is no longer
    /// active are discarded.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::Forbidden` (and closes the view) when the server
    /// refused the call for ownership reasons. Other failures are absorbed.
    pub async fn apply_grade(
        &mut self,
        ticket: GradeTicket,
        result: Result<GradingResult, GatewayError>,
    ) -> Result<GradeOutcome, FlowError> {
        let forbidden = matches!(result, Err(GatewayError::Forbidden));
        let outcome = match self.grader.as_mut() {
            Some(grader) if ticket.epoch() == self.epoch => {
                let outcome = grader.complete(ticket, result);
                let score = grader.score();
                match self.phase {
                    Phase::Mini => self.scores.mini = caught_up(self.scores.mini, score),
                    Phase::Problem => {
                        self.scores.problem = caught_up(self.scores.problem, score);
                    }
                    _ => {}
                }
                outcome
            }
            _ => GradeOutcome::Discarded {
                question_id: ticket.question_id(),
            },
        };

        if forbidden {
            return Err(self.fail(FlowError::Forbidden));
        }
        if let GradeOutcome::Graded {
            correlation_id: Some(correlation_id),
            ..
        } = &outcome
        {
            self.capture(correlation_id.clone()).await;
        }
        Ok(outcome)
    }

    /// Grade one answer: begin, call the server, apply.
    ///
    /// # Errors
    ///
    /// See [`SessionOrchestrator::begin_answer`] and
    /// [`SessionOrchestrator::apply_grade`].
    pub async fn submit_answer(
        &mut self,
        question_id: QuestionId,
        answer: Answer,
    ) -> Result<GradeOutcome, FlowError> {
        let ticket = self.begin_answer(question_id, answer)?;
        let request = self.grade_request(&ticket);
        let result = self.gateway.grade_one(&request).await;
        self.apply_grade(ticket, result).await
    }

    // ─── TRANSITIONS ───────────────────────────────────────────────────────────

    /// Leave the active phase.
    ///
    /// With a session the advance goes through [`ProgressAdvancer`] and the
    /// next phase is projected from the re-fetched snapshot. Without one the
    /// fallback decides locally.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::Closed` once the view is closed,
    /// `FlowError::Forbidden` (closing it) and network failures.
    pub async fn continue_phase(&mut self) -> Result<Transition, FlowError> {
        if self.closed {
            return Err(FlowError::Closed);
        }
        if self.fallback.is_some() {
            return self.continue_fallback();
        }
        let Some(session_id) = self.context.session_id() else {
            return Err(FlowError::NotFound);
        };

        let step = self.active_step();
        let local = match (&self.grader, self.phase) {
            (Some(_), Phase::Mini) => Some(self.scores.mini),
            (Some(_), Phase::Problem) => Some(self.scores.problem),
            (Some(grader), _) => Some(grader.score()),
            (None, _) => None,
        };
        let result = self.advancer.advance(session_id, &step, local).await;
        let report = result.map_err(|err| self.fail(err))?;

        match report {
            AdvanceReport::Advanced { moved_to, snapshot } => {
                let phase = match &snapshot {
                    Some(snapshot) => derive_phase(snapshot),
                    None => match &moved_to {
                        AdvanceTarget::Step(next) => project_step(Some(next)),
                        AdvanceTarget::End => Phase::Result,
                    },
                };
                let ended = moved_to == AdvanceTarget::End
                    || snapshot.as_ref().is_some_and(|s| !s.is_open());
                if let Some(snapshot) = snapshot {
                    self.store_snapshot(snapshot).await;
                }
                if ended {
                    if self.phase != Phase::Result {
                        self.enter_phase(Phase::Result);
                    }
                    self.finish().await;
                    return Ok(Transition::Finished);
                }
                self.enter_phase(phase);
                Ok(Transition::Moved {
                    phase,
                    hint: Some(moved_to),
                })
            }
            AdvanceReport::Declined { reason, snapshot } => {
                let phase = derive_phase(&snapshot);
                let open = snapshot.is_open();
                self.store_snapshot(snapshot).await;
                if !open {
                    if self.phase != Phase::Result {
                        self.enter_phase(Phase::Result);
                    }
                    self.finish().await;
                    return Ok(Transition::Finished);
                }
                if phase != self.phase || matches!(reason, DeclineReason::NotCurrent { .. }) {
                    self.enter_phase(phase);
                }
                Ok(Transition::Declined {
                    phase: self.phase,
                    reason,
                })
            }
        }
    }

    fn continue_fallback(&mut self) -> Result<Transition, FlowError> {
        let Some(fallback) = self.fallback.as_mut() else {
            return Err(FlowError::NotLoaded);
        };
        if fallback.phase() == Phase::Result {
            self.closed = true;
            return Ok(Transition::Finished);
        }
        let next = fallback.finish_phase(self.grader.as_ref())?;
        self.scores = fallback.scores();
        self.enter_phase(next);
        Ok(Transition::Moved {
            phase: next,
            hint: None,
        })
    }

    // ─── INTERNALS ─────────────────────────────────────────────────────────────

    fn enter_phase(&mut self, phase: Phase) {
        self.epoch += 1;
        tracing::debug!(from = %self.phase, to = %phase, epoch = self.epoch, "entering phase");
        self.phase = phase;
        self.content = None;
        self.grader = None;
        self.auto_continued = false;
    }

    fn reset(&mut self) {
        self.snapshot = None;
        self.scores = ScoreBoard::default();
        self.summary = None;
        self.closed = false;
        if let Some(fallback) = self.fallback.as_mut() {
            *fallback = FallbackController::new(self.context.topic_id(), self.context.mode());
        }
    }

    /// The server step backing the active phase.
    fn active_step(&self) -> Step {
        let current = self
            .snapshot
            .as_ref()
            .and_then(|snapshot| snapshot.current_step.clone());
        if let Some(step) = current {
            if project_step(Some(&step)) == self.phase {
                return step;
            }
        }
        match self.phase {
            Phase::Concept => Step::Concept,
            Phase::Mini => Step::Mini,
            Phase::Problem => Step::problem_for(self.context.mode()),
            Phase::Wrong => Step::ReviewWrong,
            Phase::Result => Step::Summary,
        }
    }

    /// Seed scores of phases finished before a reload from server counters.
    fn seed_scores(&mut self, snapshot: &LearningSession) {
        let mode = self.context.mode();
        if let Some(record) = snapshot.step_record(&Step::Mini) {
            self.scores.mini = score_from(record.details);
        }
        let problem = snapshot.step_record(&Step::problem_for(mode)).or_else(|| {
            (mode == StudyMode::Practical)
                .then(|| snapshot.step_record(&Step::PracticalSet))
                .flatten()
        });
        if let Some(record) = problem {
            self.scores.problem = score_from(record.details);
        }
    }

    async fn store_snapshot(&mut self, snapshot: LearningSession) {
        if let Some(correlation_id) = snapshot.correlation_id.clone() {
            self.capture(correlation_id).await;
        }
        self.snapshot = Some(snapshot);
    }

    async fn capture(&mut self, correlation_id: CorrelationId) {
        if self.context.capture_correlation(correlation_id) {
            tracing::debug!(correlation_id = ?self.context.correlation_id(), "correlation id captured");
            self.persist_handle().await;
        }
    }

    async fn restore_handle(&mut self, session_id: SessionId) {
        match self.handles.load_handle(session_id).await {
            Ok(Some(handle)) => {
                if !self.context.restore(handle) {
                    tracing::debug!(session_id = %session_id, "ignoring resume handle for another topic");
                }
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(session_id = %session_id, error = %err, "could not load resume handle");
            }
        }
    }

    async fn persist_handle(&self) {
        let Some(handle) = self.context.resume_handle(self.clock.now()) else {
            return;
        };
        if let Err(err) = self.handles.save_handle(&handle).await {
            tracing::warn!(session_id = %handle.session_id, error = %err, "could not save resume handle");
        }
    }

    async fn finish(&mut self) {
        if let Some(session_id) = self.context.session_id() {
            tracing::info!(session_id = %session_id, "session closed");
            if let Err(err) = self.handles.clear_handle(session_id).await {
                tracing::warn!(session_id = %session_id, error = %err, "could not clear resume handle");
            }
        }
        self.closed = true;
    }

    /// Closes the view on fatal errors and passes the error through.
    fn fail(&mut self, err: FlowError) -> FlowError {
        if err.is_fatal() && !self.closed {
            tracing::warn!(error = %err, "closing session view");
            self.closed = true;
            self.epoch += 1;
        }
        err
    }
}

fn derive_phase(snapshot: &LearningSession) -> Phase {
    if snapshot.is_open() {
        project_step(snapshot.current_step.as_ref())
    } else {
        Phase::Result
    }
}

/// The locally graded score once it has answered at least as much as the
/// shown one; until then the shown (server-seeded) score stays.
fn caught_up(shown: PhaseScore, local: PhaseScore) -> PhaseScore {
    if local.answered >= shown.answered {
        local
    } else {
        PhaseScore {
            total: shown.total.max(local.total),
            ..shown
        }
    }
}

fn score_from(details: StepDetails) -> PhaseScore {
    PhaseScore {
        total: details.total.unwrap_or(0),
        answered: details.answered.unwrap_or(0),
        correct: details.correct.unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryStudyServer;
    use learn_core::model::{SessionStatus, SessionStepRecord, StepState};
    use storage::repository::InMemoryRepository;

    fn record(step: Step, total: u32, answered: u32, correct: u32) -> SessionStepRecord {
        SessionStepRecord {
            step_id: None,
            step,
            state: StepState::Complete,
            score_percent: None,
            details: StepDetails {
                total: Some(total),
                answered: Some(answered),
                correct: Some(correct),
            },
        }
    }

    #[test]
    fn practical_set_counters_seed_the_problem_score() {
        let mut orch = SessionOrchestrator::new(
            Arc::new(InMemoryStudyServer::new()),
            Arc::new(InMemoryRepository::new()),
            TopicId::new(1),
            StudyMode::Practical,
            Some(SessionId::new(5)),
        );
        let snapshot = LearningSession {
            session_id: SessionId::new(5),
            topic_id: TopicId::new(1),
            mode: StudyMode::Practical,
            status: SessionStatus::InProgress,
            current_step: Some(Step::Summary),
            steps: vec![
                record(Step::Mini, 2, 2, 1),
                record(Step::PracticalSet, 3, 3, 2),
            ],
            correlation_id: None,
        };

        orch.seed_scores(&snapshot);

        assert_eq!(orch.scores().mini.correct, 1);
        assert_eq!(
            orch.scores().problem,
            PhaseScore {
                total: 3,
                answered: 3,
                correct: 2
            }
        );
    }

    #[test]
    fn seeded_score_stays_until_local_grading_catches_up() {
        let seeded = PhaseScore {
            total: 4,
            answered: 2,
            correct: 2,
        };
        let fresh = PhaseScore::with_total(4);
        assert_eq!(caught_up(seeded, fresh), seeded);

        let mut local = fresh;
        local.record(true);
        local.record(false);
        assert_eq!(caught_up(seeded, local), local);
    }
}
