use std::collections::HashMap;

use learn_core::model::{
    Answer, CorrelationId, GradingResult, PhaseScore, QuestionId, QuestionItem, WrongItem,
};

use super::progress::SessionProgress;
use crate::error::{FlowError, GatewayError};
use crate::gateway::{ContentKey, GradeRequest};

//
// ─── ITEM STATE ────────────────────────────────────────────────────────────────
//

/// Stored verdict for one item, kept for display after grading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradedItem {
    pub answer: Answer,
    pub correct: bool,
    pub correct_answer: Option<String>,
    pub explanation: Option<String>,
    /// The grading call failed and the item was counted as incorrect.
    pub failed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemState {
    Unanswered,
    Grading,
    Graded(GradedItem),
}

/// Proof that a submission was accepted for grading.
///
/// Carries the phase epoch so a response that lands after the learner left
/// the phase can be recognized and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeTicket {
    question_id: QuestionId,
    answer: Answer,
    epoch: u64,
}

impl GradeTicket {
    #[must_use]
    pub fn question_id(&self) -> QuestionId {
        self.question_id
    }

    #[must_use]
    pub fn answer(&self) -> &Answer {
        &self.answer
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The grade-one request for this ticket.
    #[must_use]
    pub fn request(&self, key: ContentKey) -> GradeRequest {
        GradeRequest {
            topic_id: key.topic_id,
            question_id: self.question_id,
            answer: self.answer.clone(),
            session_id: key.session_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GradeOutcome {
    Graded {
        question_id: QuestionId,
        correct: bool,
        correlation_id: Option<CorrelationId>,
    },
    /// The call failed; the item now counts as incorrect.
    Absorbed {
        question_id: QuestionId,
        error: FlowError,
    },
    /// The response belonged to a phase that is no longer active.
    Discarded { question_id: QuestionId },
}

//
// ─── GRADER ────────────────────────────────────────────────────────────────────
//

/// Per-phase grading state: one state machine per item plus the running score.
#[derive(Debug, Clone)]
pub struct ItemGrader {
    epoch: u64,
    items: Vec<QuestionItem>,
    states: HashMap<QuestionId, ItemState>,
    score: PhaseScore,
}

impl ItemGrader {
    #[must_use]
    pub fn new(items: Vec<QuestionItem>, epoch: u64) -> Self {
        let states = items
            .iter()
            .map(|item| (item.question_id, ItemState::Unanswered))
            .collect();
        let total = u32::try_from(items.len()).unwrap_or(u32::MAX);
        Self {
            epoch,
            items,
            states,
            score: PhaseScore::with_total(total),
        }
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    #[must_use]
    pub fn items(&self) -> &[QuestionItem] {
        &self.items
    }

    #[must_use]
    pub fn score(&self) -> PhaseScore {
        self.score
    }

    #[must_use]
    pub fn state(&self, question_id: QuestionId) -> Option<&ItemState> {
        self.states.get(&question_id)
    }

    #[must_use]
    pub fn graded(&self, question_id: QuestionId) -> Option<&GradedItem> {
        match self.states.get(&question_id) {
            Some(ItemState::Graded(graded)) => Some(graded),
            _ => None,
        }
    }

    /// Every item has a verdict.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.states
            .values()
            .all(|state| matches!(state, ItemState::Graded(_)))
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        let total = self.items.len();
        let answered = self
            .states
            .values()
            .filter(|state| matches!(state, ItemState::Graded(_)))
            .count();
        SessionProgress {
            total,
            answered,
            remaining: total.saturating_sub(answered),
            is_complete: answered >= total,
        }
    }

    /// Move an item from unanswered to grading.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::UnknownItem` for items outside this phase,
    /// `FlowError::AlreadyGrading` while a call is pending,
    /// `FlowError::AlreadyGraded` once a verdict exists, and
    /// `FlowError::Answer` if the answer does not fit the item.
    pub fn begin(&mut self, question_id: QuestionId, answer: Answer) -> Result<GradeTicket, FlowError> {
        let item = self
            .items
            .iter()
            .find(|item| item.question_id == question_id)
            .ok_or(FlowError::UnknownItem(question_id))?;
        item.check_answer(&answer)?;

        let state = self
            .states
            .get_mut(&question_id)
            .ok_or(FlowError::UnknownItem(question_id))?;
        match state {
            ItemState::Grading => return Err(FlowError::AlreadyGrading(question_id)),
            ItemState::Graded(_) => return Err(FlowError::AlreadyGraded(question_id)),
            ItemState::Unanswered => *state = ItemState::Grading,
        }

        Ok(GradeTicket {
            question_id,
            answer,
            epoch: self.epoch,
        })
    }

    /// Apply the server response for a ticket.
    pub fn complete(
        &mut self,
        ticket: GradeTicket,
        result: Result<GradingResult, GatewayError>,
    ) -> GradeOutcome {
        let question_id = ticket.question_id;
        if ticket.epoch != self.epoch {
            return GradeOutcome::Discarded { question_id };
        }
        let Some(state) = self.states.get_mut(&question_id) else {
            return GradeOutcome::Discarded { question_id };
        };
        if *state != ItemState::Grading {
            return GradeOutcome::Discarded { question_id };
        }

        match result {
            Ok(result) => {
                *state = ItemState::Graded(GradedItem {
                    answer: ticket.answer,
                    correct: result.correct,
                    correct_answer: result.correct_answer,
                    explanation: result.explanation,
                    failed: false,
                });
                self.score.record(result.correct);
                GradeOutcome::Graded {
                    question_id,
                    correct: result.correct,
                    correlation_id: result.correlation_id,
                }
            }
            Err(err) => {
                tracing::warn!(
                    question_id = %question_id,
                    error = %err,
                    "grading failed, counting item as incorrect"
                );
                *state = ItemState::Graded(GradedItem {
                    answer: ticket.answer,
                    correct: false,
                    correct_answer: None,
                    explanation: None,
                    failed: true,
                });
                self.score.record(false);
                GradeOutcome::Absorbed {
                    question_id,
                    error: FlowError::GradingFailure {
                        question_id,
                        reason: err.to_string(),
                    },
                }
            }
        }
    }

    /// Locally graded misses, in item order.
    #[must_use]
    pub fn wrong_items(&self) -> Vec<WrongItem> {
        self.items
            .iter()
            .filter_map(|item| {
                let graded = self.graded(item.question_id)?;
                if graded.correct {
                    return None;
                }
                Some(WrongItem {
                    question_id: item.question_id,
                    prompt: item.prompt.clone(),
                    choices: item.choices.clone(),
                    user_answer: graded.answer.to_string(),
                    correct_answer: graded.correct_answer.clone().unwrap_or_default(),
                    explanation: graded.explanation.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use learn_core::model::QuestionKind;
    use proptest::prelude::*;

    fn mini_items(n: u64) -> Vec<QuestionItem> {
        (1..=n)
            .map(|id| QuestionItem {
                question_id: QuestionId::new(id),
                prompt: format!("statement {id}"),
                choices: Vec::new(),
                image_url: None,
                kind: QuestionKind::Mini,
            })
            .collect()
    }

    fn verdict(correct: bool) -> GradingResult {
        GradingResult {
            correct,
            correct_answer: Some("O".into()),
            explanation: Some("because".into()),
            correlation_id: None,
        }
    }

    #[test]
    fn second_submission_while_grading_is_rejected() {
        let mut grader = ItemGrader::new(mini_items(2), 1);
        let ticket = grader.begin(QuestionId::new(1), Answer::Boolean(true)).unwrap();
        let err = grader
            .begin(QuestionId::new(1), Answer::Boolean(true))
            .unwrap_err();
        assert_eq!(err, FlowError::AlreadyGrading(QuestionId::new(1)));

        grader.complete(ticket, Ok(verdict(true)));
        let err = grader
            .begin(QuestionId::new(1), Answer::Boolean(false))
            .unwrap_err();
        assert_eq!(err, FlowError::AlreadyGraded(QuestionId::new(1)));
    }

    #[test]
    fn failure_counts_as_incorrect_and_does_not_block() {
        let mut grader = ItemGrader::new(mini_items(2), 1);
        let ticket = grader.begin(QuestionId::new(1), Answer::Boolean(true)).unwrap();
        let outcome = grader.complete(ticket, Err(GatewayError::Network("timeout".into())));
        assert!(matches!(outcome, GradeOutcome::Absorbed { .. }));
        assert!(grader.graded(QuestionId::new(1)).unwrap().failed);

        let ticket = grader.begin(QuestionId::new(2), Answer::Boolean(true)).unwrap();
        grader.complete(ticket, Ok(verdict(true)));
        assert!(grader.is_complete());
        assert_eq!(grader.score().correct, 1);
        assert_eq!(grader.score().answered, 2);
    }

    #[test]
    fn stale_ticket_is_discarded() {
        let mut old = ItemGrader::new(mini_items(1), 1);
        let ticket = old.begin(QuestionId::new(1), Answer::Boolean(true)).unwrap();

        let mut current = ItemGrader::new(mini_items(1), 2);
        let outcome = current.complete(ticket, Ok(verdict(true)));
        assert_eq!(
            outcome,
            GradeOutcome::Discarded {
                question_id: QuestionId::new(1)
            }
        );
        assert_eq!(current.score().answered, 0);
        assert_eq!(current.state(QuestionId::new(1)), Some(&ItemState::Unanswered));
    }

    #[test]
    fn unknown_item_and_bad_shape_are_rejected() {
        let mut grader = ItemGrader::new(mini_items(1), 1);
        assert_eq!(
            grader.begin(QuestionId::new(9), Answer::Boolean(true)),
            Err(FlowError::UnknownItem(QuestionId::new(9)))
        );
        assert!(matches!(
            grader.begin(QuestionId::new(1), Answer::Choice("A".into())),
            Err(FlowError::Answer(_))
        ));
        assert_eq!(grader.state(QuestionId::new(1)), Some(&ItemState::Unanswered));
    }

    #[test]
    fn wrong_items_keep_submitted_and_correct_answers() {
        let mut grader = ItemGrader::new(mini_items(2), 1);
        let t1 = grader.begin(QuestionId::new(1), Answer::Boolean(false)).unwrap();
        grader.complete(t1, Ok(verdict(false)));
        let t2 = grader.begin(QuestionId::new(2), Answer::Boolean(true)).unwrap();
        grader.complete(t2, Ok(verdict(true)));

        let wrong = grader.wrong_items();
        assert_eq!(wrong.len(), 1);
        assert_eq!(wrong[0].user_answer, "X");
        assert_eq!(wrong[0].correct_answer, "O");
    }

    proptest! {
        #[test]
        fn score_equals_correct_count_for_any_order(
            (verdicts, order) in prop::collection::vec(any::<bool>(), 1..12).prop_flat_map(|verdicts| {
                let ids: Vec<u64> = (1..=verdicts.len() as u64).collect();
                (Just(verdicts), Just(ids).prop_shuffle())
            }),
        ) {
            let n = verdicts.len() as u64;
            let mut grader = ItemGrader::new(mini_items(n), 7);
            for id in order {
                let correct = verdicts[usize::try_from(id - 1).unwrap()];
                let ticket = grader.begin(QuestionId::new(id), Answer::Boolean(correct)).unwrap();
                grader.complete(ticket, Ok(verdict(correct)));
            }

            let expected = verdicts.iter().filter(|v| **v).count() as u32;
            prop_assert_eq!(grader.score().correct, expected);
            prop_assert!(grader.is_complete());
        }
    }
}
