//! In-process study server implementing the full gateway contract.
//!
//! Used by tests and by offline demo runs of the app. It follows the server
//! rules the client depends on: counters per step, advance rejection for
//! incomplete or inactive steps, the wrong-review step only when the problem
//! phase had a miss, and a correlation id announced on the first mini grade.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use learn_core::model::{
    AdvanceTarget, Answer, Choice, ConceptContent, ConceptSection, ContentBlock, CorrelationId,
    GradingResult, ItemSet, LearningSession, QuestionId, QuestionItem, QuestionKind, Reward,
    SessionId, SessionStatus, SessionStepRecord, Step, StepDetails, StepId, StepState, StudyMode,
    SummaryPayload, TopicId, WrongItem,
};

use super::{AdvanceRequest, ContentKey, GradeRequest, SessionGateway};
use crate::error::GatewayError;

//
// ─── FIXTURES ──────────────────────────────────────────────────────────────────
//

/// Server-side answer key; never leaves the server except as a display string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerKey {
    Boolean(bool),
    Label(String),
    /// Accepted free-text answers, compared ignoring case and spacing.
    Text(Vec<String>),
}

impl AnswerKey {
    fn accepts(&self, answer: &Answer) -> bool {
        match (self, answer) {
            (AnswerKey::Boolean(key), Answer::Boolean(given)) => key == given,
            (AnswerKey::Label(key), Answer::Choice(given)) => key.eq_ignore_ascii_case(given.trim()),
            (AnswerKey::Text(accepted), Answer::Text(given)) => {
                let given = normalize(given);
                accepted.iter().any(|candidate| normalize(candidate) == given)
            }
            _ => false,
        }
    }

    fn display(&self) -> String {
        match self {
            AnswerKey::Boolean(true) => "O".to_string(),
            AnswerKey::Boolean(false) => "X".to_string(),
            AnswerKey::Label(label) => label.clone(),
            AnswerKey::Text(accepted) => accepted.first().cloned().unwrap_or_default(),
        }
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Clone)]
pub struct BankItem {
    pub item: QuestionItem,
    pub key: AnswerKey,
    pub explanation: String,
}

/// Everything the server knows about one topic.
#[derive(Debug, Clone)]
pub struct TopicFixture {
    pub topic_id: TopicId,
    pub concept: ConceptContent,
    pub mini: Vec<BankItem>,
    pub mcq: Vec<BankItem>,
    pub practical: Vec<BankItem>,
}

impl TopicFixture {
    /// Deterministic topic: mini keys are all `true`, mcq keys are all `A`,
    /// practical item `n` accepts `answer n`.
    #[must_use]
    pub fn generated(topic_id: TopicId, title: &str, mini: u64, mcq: u64, practical: u64) -> Self {
        let concept = ConceptContent {
            topic_id,
            title: title.to_string(),
            sections: vec![ConceptSection {
                title: format!("{title} overview"),
                blocks: vec![
                    ContentBlock::Heading {
                        level: 1,
                        text: title.to_string(),
                    },
                    ContentBlock::Paragraph {
                        text: format!("Core ideas of {title}."),
                    },
                ],
                children: Vec::new(),
            }],
        };

        let mini = (1..=mini)
            .map(|n| BankItem {
                item: QuestionItem {
                    question_id: QuestionId::new(100 + n),
                    prompt: format!("{title}: statement {n} holds."),
                    choices: Vec::new(),
                    image_url: None,
                    kind: QuestionKind::Mini,
                },
                key: AnswerKey::Boolean(true),
                explanation: format!("Statement {n} is true."),
            })
            .collect();

        let mcq = (1..=mcq)
            .map(|n| BankItem {
                item: QuestionItem {
                    question_id: QuestionId::new(200 + n),
                    prompt: format!("{title}: question {n}"),
                    choices: ["A", "B", "C", "D"]
                        .iter()
                        .map(|label| Choice {
                            label: (*label).to_string(),
                            text: format!("option {label}"),
                        })
                        .collect(),
                    image_url: None,
                    kind: QuestionKind::Mcq,
                },
                key: AnswerKey::Label("A".to_string()),
                explanation: format!("Option A answers question {n}."),
            })
            .collect();

        let practical = (1..=practical)
            .map(|n| BankItem {
                item: QuestionItem {
                    question_id: QuestionId::new(300 + n),
                    prompt: format!("{title}: task {n}"),
                    choices: Vec::new(),
                    image_url: None,
                    kind: QuestionKind::Practical,
                },
                key: AnswerKey::Text(vec![format!("answer {n}")]),
                explanation: format!("Task {n} expects `answer {n}`."),
            })
            .collect();

        Self {
            topic_id,
            concept,
            mini,
            mcq,
            practical,
        }
    }

    fn bank(&self, kind: QuestionKind) -> &[BankItem] {
        match kind {
            QuestionKind::Mini => &self.mini,
            QuestionKind::Mcq => &self.mcq,
            QuestionKind::Practical => &self.practical,
        }
    }

    fn problem_bank(&self, mode: StudyMode) -> &[BankItem] {
        match mode {
            StudyMode::Written => &self.mcq,
            StudyMode::Practical => &self.practical,
        }
    }
}

//
// ─── SERVER STATE ──────────────────────────────────────────────────────────────
//

/// How many times each endpoint was hit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub fetch_session: usize,
    pub start_session: usize,
    pub advance: usize,
    pub concept: usize,
    pub mini_items: usize,
    pub problem_items: usize,
    pub grade: usize,
    pub wrong_items: usize,
    pub summary: usize,
}

#[derive(Debug, Clone)]
struct RecordedAnswer {
    question_id: QuestionId,
    answer: Answer,
    correct: bool,
}

#[derive(Debug, Clone)]
struct ServerStep {
    id: StepId,
    step: Step,
    state: StepState,
    score: Option<u8>,
    answers: Vec<RecordedAnswer>,
}

#[derive(Debug, Clone)]
struct ServerSession {
    id: SessionId,
    topic_id: TopicId,
    mode: StudyMode,
    status: SessionStatus,
    steps: Vec<ServerStep>,
    current: usize,
    correlation_id: CorrelationId,
    correlation_announced: bool,
    foreign: bool,
}

impl ServerSession {
    fn current_step(&self) -> &Step {
        &self.steps[self.current].step
    }

    fn step_mut(&mut self, step: &Step) -> Option<&mut ServerStep> {
        self.steps.iter_mut().find(|s| &s.step == step)
    }

    fn step(&self, step: &Step) -> Option<&ServerStep> {
        self.steps.iter().find(|s| &s.step == step)
    }
}

#[derive(Default)]
struct State {
    topics: HashMap<TopicId, TopicFixture>,
    sessions: HashMap<SessionId, ServerSession>,
    next_session: u64,
    next_step: u64,
    grade_failures: VecDeque<GatewayError>,
    calls: CallCounts,
}

impl State {
    fn topic(&self, topic_id: TopicId) -> Result<&TopicFixture, GatewayError> {
        self.topics.get(&topic_id).ok_or(GatewayError::NotFound)
    }

    fn owned_session(&self, session_id: SessionId) -> Result<&ServerSession, GatewayError> {
        let session = self
            .sessions
            .get(&session_id)
            .ok_or(GatewayError::NotFound)?;
        if session.foreign {
            return Err(GatewayError::Forbidden);
        }
        Ok(session)
    }

    fn owned_session_mut(&mut self, session_id: SessionId) -> Result<&mut ServerSession, GatewayError> {
        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or(GatewayError::NotFound)?;
        if session.foreign {
            return Err(GatewayError::Forbidden);
        }
        Ok(session)
    }

    fn by_correlation(&self, correlation_id: &CorrelationId) -> Result<&ServerSession, GatewayError> {
        self.sessions
            .values()
            .find(|s| &s.correlation_id == correlation_id)
            .ok_or(GatewayError::NotFound)
    }

    fn new_step(&mut self, step: Step) -> ServerStep {
        self.next_step += 1;
        ServerStep {
            id: StepId::new(self.next_step),
            step,
            state: StepState::Ready,
            score: None,
            answers: Vec::new(),
        }
    }

    fn create(&mut self, topic_id: TopicId, mode: StudyMode) -> Result<SessionId, GatewayError> {
        self.topic(topic_id)?;
        self.next_session += 1;
        let id = SessionId::new(1000 + self.next_session);
        let mut steps = vec![
            self.new_step(Step::Concept),
            self.new_step(Step::Mini),
            self.new_step(Step::problem_for(mode)),
            self.new_step(Step::Summary),
        ];
        steps[0].state = StepState::InProgress;
        self.sessions.insert(
            id,
            ServerSession {
                id,
                topic_id,
                mode,
                status: SessionStatus::InProgress,
                steps,
                current: 0,
                correlation_id: CorrelationId::new(format!("corr-{}", id.value())),
                correlation_announced: false,
                foreign: false,
            },
        );
        Ok(id)
    }

    fn counters(&self, session: &ServerSession, step: &ServerStep) -> Option<StepDetails> {
        let topic = self.topics.get(&session.topic_id)?;
        let total = match step.step {
            Step::Mini => topic.mini.len(),
            Step::Mcq | Step::Practical | Step::PracticalSet => topic.problem_bank(session.mode).len(),
            _ => return None,
        };
        let answered = step.answers.len();
        let correct = step.answers.iter().filter(|a| a.correct).count();
        Some(StepDetails {
            total: u32::try_from(total).ok(),
            answered: u32::try_from(answered).ok(),
            correct: u32::try_from(correct).ok(),
        })
    }

    fn snapshot(&self, session: &ServerSession) -> LearningSession {
        let steps = session
            .steps
            .iter()
            .map(|step| SessionStepRecord {
                step_id: Some(step.id),
                step: step.step.clone(),
                state: step.state,
                score_percent: step.score,
                details: self.counters(session, step).unwrap_or_default(),
            })
            .collect();
        LearningSession {
            session_id: session.id,
            topic_id: session.topic_id,
            mode: session.mode,
            status: session.status,
            current_step: Some(session.current_step().clone()),
            steps,
            correlation_id: None,
        }
    }
}

//
// ─── SERVER ────────────────────────────────────────────────────────────────────
//

/// Shared, cloneable in-memory study server.
#[derive(Clone, Default)]
pub struct InMemoryStudyServer {
    state: Arc<Mutex<State>>,
}

impl InMemoryStudyServer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a topic. Replaces any topic with the same id.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Network` if the state lock is poisoned.
    pub fn add_topic(&self, fixture: TopicFixture) -> Result<(), GatewayError> {
        self.lock()?.topics.insert(fixture.topic_id, fixture);
        Ok(())
    }

    /// Create a session the way the external start trigger would.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::NotFound` for unknown topics.
    pub fn create_session(&self, topic_id: TopicId, mode: StudyMode) -> Result<SessionId, GatewayError> {
        self.lock()?.create(topic_id, mode)
    }

    /// Make the session look like it belongs to another user.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::NotFound` for unknown sessions.
    pub fn mark_foreign(&self, session_id: SessionId) -> Result<(), GatewayError> {
        let mut state = self.lock()?;
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or(GatewayError::NotFound)?;
        session.foreign = true;
        Ok(())
    }

    /// Forget a session entirely, as if it expired server-side.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Network` if the state lock is poisoned.
    pub fn drop_session(&self, session_id: SessionId) -> Result<(), GatewayError> {
        self.lock()?.sessions.remove(&session_id);
        Ok(())
    }

    /// Fail the next grade call with `error`.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Network` if the state lock is poisoned.
    pub fn fail_next_grade(&self, error: GatewayError) -> Result<(), GatewayError> {
        self.lock()?.grade_failures.push_back(error);
        Ok(())
    }

    /// Record an answer directly, as a second device would.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` if the session, topic or item is unknown.
    pub fn record_out_of_band(
        &self,
        session_id: SessionId,
        question_id: QuestionId,
        answer: Answer,
    ) -> Result<(), GatewayError> {
        let mut state = self.lock()?;
        let topic_id = state.owned_session(session_id)?.topic_id;
        let kind = answer.kind();
        let correct = state
            .topic(topic_id)?
            .bank(kind)
            .iter()
            .find(|b| b.item.question_id == question_id)
            .map(|b| b.key.accepts(&answer))
            .ok_or(GatewayError::NotFound)?;
        let session = state.owned_session_mut(session_id)?;
        let step = step_for_kind(kind, session.mode);
        let server_step = session.step_mut(&step).ok_or(GatewayError::NotFound)?;
        record(server_step, question_id, answer, correct);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `GatewayError::Network` if the state lock is poisoned.
    pub fn calls(&self) -> Result<CallCounts, GatewayError> {
        Ok(self.lock()?.calls)
    }

    /// # Errors
    ///
    /// Returns `GatewayError::NotFound` for unknown sessions.
    pub fn session_status(&self, session_id: SessionId) -> Result<SessionStatus, GatewayError> {
        let state = self.lock()?;
        state
            .sessions
            .get(&session_id)
            .map(|s| s.status)
            .ok_or(GatewayError::NotFound)
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, GatewayError> {
        self.state
            .lock()
            .map_err(|e| GatewayError::Network(format!("server state poisoned: {e}")))
    }
}

fn step_for_kind(kind: QuestionKind, mode: StudyMode) -> Step {
    match kind {
        QuestionKind::Mini => Step::Mini,
        QuestionKind::Mcq | QuestionKind::Practical => Step::problem_for(mode),
    }
}

fn record(step: &mut ServerStep, question_id: QuestionId, answer: Answer, correct: bool) {
    let entry = RecordedAnswer {
        question_id,
        answer,
        correct,
    };
    match step
        .answers
        .iter_mut()
        .find(|existing| existing.question_id == question_id)
    {
        Some(existing) => *existing = entry,
        None => step.answers.push(entry),
    }
}

fn is_problem(step: &Step) -> bool {
    matches!(step, Step::Mcq | Step::Practical | Step::PracticalSet)
}

#[async_trait]
impl SessionGateway for InMemoryStudyServer {
    async fn fetch_session(&self, session_id: SessionId) -> Result<LearningSession, GatewayError> {
        let mut state = self.lock()?;
        state.calls.fetch_session += 1;
        let session = state.owned_session(session_id)?;
        Ok(state.snapshot(session))
    }

    async fn start_session(
        &self,
        topic_id: TopicId,
        mode: StudyMode,
        resume: bool,
    ) -> Result<SessionId, GatewayError> {
        let mut state = self.lock()?;
        state.calls.start_session += 1;
        if resume {
            let open = state
                .sessions
                .values()
                .filter(|s| {
                    s.topic_id == topic_id
                        && s.mode == mode
                        && !s.foreign
                        && s.status == SessionStatus::InProgress
                })
                .map(|s| s.id)
                .max();
            if let Some(id) = open {
                return Ok(id);
            }
        }
        state.create(topic_id, mode)
    }

    async fn advance_step(&self, request: &AdvanceRequest) -> Result<AdvanceTarget, GatewayError> {
        let mut state = self.lock()?;
        state.calls.advance += 1;

        let session = state.owned_session(request.session_id)?;
        if session.status != SessionStatus::InProgress {
            return Err(GatewayError::InvalidState("session closed".into()));
        }
        if session.current_step() != &request.step {
            return Err(GatewayError::InvalidState(format!(
                "step {} is not active",
                request.step
            )));
        }
        let current = &session.steps[session.current];
        if let Some(details) = state.counters(session, current) {
            if details.answered < details.total {
                return Err(GatewayError::InvalidState("phase incomplete".into()));
            }
        }
        let had_wrong = is_problem(&current.step) && current.answers.iter().any(|a| !a.correct);
        let needs_review = had_wrong && session.step(&Step::ReviewWrong).is_none();

        let review = needs_review.then(|| state.new_step(Step::ReviewWrong));
        let session = state.owned_session_mut(request.session_id)?;
        let index = session.current;
        session.steps[index].state = StepState::Complete;
        session.steps[index].score = request.score;
        if let Some(review) = review {
            session.steps.insert(index + 1, review);
        }

        if index + 1 >= session.steps.len() {
            session.status = SessionStatus::Done;
            for step in &mut session.steps {
                step.state = StepState::Closed;
            }
            return Ok(AdvanceTarget::End);
        }
        session.current = index + 1;
        session.steps[index + 1].state = StepState::InProgress;
        Ok(AdvanceTarget::Step(session.steps[index + 1].step.clone()))
    }

    async fn fetch_concept(&self, key: ContentKey) -> Result<ConceptContent, GatewayError> {
        let mut state = self.lock()?;
        state.calls.concept += 1;
        if let Some(session_id) = key.session_id {
            state.owned_session(session_id)?;
        }
        Ok(state.topic(key.topic_id)?.concept.clone())
    }

    async fn fetch_mini_items(&self, key: ContentKey) -> Result<ItemSet, GatewayError> {
        let mut state = self.lock()?;
        state.calls.mini_items += 1;
        if let Some(session_id) = key.session_id {
            state.owned_session(session_id)?;
        }
        let items = state
            .topic(key.topic_id)?
            .mini
            .iter()
            .map(|b| b.item.clone())
            .collect();
        Ok(ItemSet {
            items,
            correlation_id: None,
        })
    }

    async fn fetch_problem_items(
        &self,
        key: ContentKey,
        mode: StudyMode,
    ) -> Result<ItemSet, GatewayError> {
        let mut state = self.lock()?;
        state.calls.problem_items += 1;
        let correlation_id = match key.session_id {
            Some(session_id) => Some(state.owned_session(session_id)?.correlation_id.clone()),
            None => None,
        };
        let items = state
            .topic(key.topic_id)?
            .problem_bank(mode)
            .iter()
            .map(|b| b.item.clone())
            .collect();
        Ok(ItemSet {
            items,
            correlation_id,
        })
    }

    async fn grade_one(&self, request: &GradeRequest) -> Result<GradingResult, GatewayError> {
        let mut state = self.lock()?;
        state.calls.grade += 1;
        if let Some(error) = state.grade_failures.pop_front() {
            return Err(error);
        }

        let kind = request.answer.kind();
        let bank_item = state
            .topic(request.topic_id)?
            .bank(kind)
            .iter()
            .find(|b| b.item.question_id == request.question_id)
            .cloned()
            .ok_or(GatewayError::NotFound)?;
        let correct = bank_item.key.accepts(&request.answer);

        let mut correlation_id = None;
        if let Some(session_id) = request.session_id {
            let session = state.owned_session_mut(session_id)?;
            let step = step_for_kind(kind, session.mode);
            if session.current_step() != &step {
                return Err(GatewayError::InvalidState(format!("step {step} is not active")));
            }
            if kind == QuestionKind::Mini && !session.correlation_announced {
                session.correlation_announced = true;
                correlation_id = Some(session.correlation_id.clone());
            }
            let server_step = session.step_mut(&step).ok_or(GatewayError::NotFound)?;
            record(server_step, request.question_id, request.answer.clone(), correct);
        }

        Ok(GradingResult {
            correct,
            correct_answer: Some(bank_item.key.display()),
            explanation: Some(bank_item.explanation),
            correlation_id,
        })
    }

    async fn fetch_wrong_items(
        &self,
        correlation_id: &CorrelationId,
        mode: StudyMode,
    ) -> Result<Vec<WrongItem>, GatewayError> {
        let mut state = self.lock()?;
        state.calls.wrong_items += 1;
        let session = state.by_correlation(correlation_id)?;
        if session.mode != mode {
            return Err(GatewayError::NotFound);
        }
        let topic = state.topic(session.topic_id)?;
        let Some(problem) = session.step(&Step::problem_for(mode)) else {
            return Ok(Vec::new());
        };
        let items = topic
            .problem_bank(mode)
            .iter()
            .filter_map(|bank| {
                let recorded = problem
                    .answers
                    .iter()
                    .find(|a| a.question_id == bank.item.question_id && !a.correct)?;
                Some(WrongItem {
                    question_id: bank.item.question_id,
                    prompt: bank.item.prompt.clone(),
                    choices: bank.item.choices.clone(),
                    user_answer: recorded.answer.to_string(),
                    correct_answer: bank.key.display(),
                    explanation: Some(bank.explanation.clone()),
                })
            })
            .collect();
        Ok(items)
    }

    async fn fetch_summary(
        &self,
        topic_id: TopicId,
        correlation_id: &CorrelationId,
    ) -> Result<SummaryPayload, GatewayError> {
        let mut state = self.lock()?;
        state.calls.summary += 1;
        let session = state.by_correlation(correlation_id)?;
        if session.topic_id != topic_id {
            return Err(GatewayError::NotFound);
        }
        let topic = state.topic(topic_id)?;
        let tally = |step: &Step| {
            session
                .step(step)
                .map(|s| s.answers.iter().filter(|a| a.correct).count())
                .unwrap_or_default()
        };
        let to_u32 = |n: usize| u32::try_from(n).unwrap_or(u32::MAX);

        let mini_total = to_u32(topic.mini.len());
        let mini_correct = to_u32(tally(&Step::Mini));
        let problem_total = to_u32(topic.problem_bank(session.mode).len());
        let problem_correct = to_u32(tally(&Step::problem_for(session.mode)));
        let total_correct = mini_correct + problem_correct;
        Ok(SummaryPayload {
            mode: session.mode,
            mini_total,
            mini_correct,
            problem_total,
            problem_correct,
            total_problems: mini_total + problem_total,
            summary_text: format!(
                "{}: {total_correct}/{} correct",
                topic.concept.title,
                mini_total + problem_total
            ),
            reward: Some(Reward {
                points: total_correct * 10,
                level: None,
            }),
        })
    }
}
