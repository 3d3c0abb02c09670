use serde::{Deserialize, Serialize};

use crate::model::StudyMode;

//
// ─── PHASE SCORE ───────────────────────────────────────────────────────────────
//

/// Running score of one item phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseScore {
    pub total: u32,
    pub answered: u32,
    pub correct: u32,
}

impl PhaseScore {
    #[must_use]
    pub fn with_total(total: u32) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn record(&mut self, correct: bool) {
        self.answered = self.answered.saturating_add(1);
        if correct {
            self.correct = self.correct.saturating_add(1);
        }
    }

    #[must_use]
    pub fn wrong(&self) -> u32 {
        self.answered.saturating_sub(self.correct)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.answered >= self.total
    }

    /// Percentage of correct answers over `total`, rounded down.
    #[must_use]
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let pct = u64::from(self.correct) * 100 / u64::from(self.total);
        u8::try_from(pct.min(100)).unwrap_or(100)
    }
}

/// Scores accumulated across the item phases of one visit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreBoard {
    pub mini: PhaseScore,
    pub problem: PhaseScore,
}

impl ScoreBoard {
    #[must_use]
    pub fn total_correct(&self) -> u32 {
        self.mini.correct + self.problem.correct
    }

    #[must_use]
    pub fn total_items(&self) -> u32 {
        self.mini.total + self.problem.total
    }
}

//
// ─── SUMMARY ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub points: u32,
    pub level: Option<String>,
}

/// Terminal report for a topic visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryPayload {
    pub mode: StudyMode,
    pub mini_total: u32,
    pub mini_correct: u32,
    /// Mcq totals for written sessions, practical totals otherwise.
    pub problem_total: u32,
    pub problem_correct: u32,
    pub total_problems: u32,
    pub summary_text: String,
    pub reward: Option<Reward>,
}

impl SummaryPayload {
    /// Builds a summary from locally tallied scores (session-less path).
    #[must_use]
    pub fn from_scores(mode: StudyMode, scores: &ScoreBoard, summary_text: String) -> Self {
        Self {
            mode,
            mini_total: scores.mini.total,
            mini_correct: scores.mini.correct,
            problem_total: scores.problem.total,
            problem_correct: scores.problem.correct,
            total_problems: scores.total_items(),
            summary_text,
            reward: None,
        }
    }

    #[must_use]
    pub fn total_correct(&self) -> u32 {
        self.mini_correct + self.problem_correct
    }
}
