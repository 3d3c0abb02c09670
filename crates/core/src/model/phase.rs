use std::fmt;

use crate::model::Step;

/// Client-visible stage of the study flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    Concept,
    Mini,
    Problem,
    Wrong,
    Result,
}

impl Phase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Concept => "concept",
            Phase::Mini => "mini",
            Phase::Problem => "problem",
            Phase::Wrong => "wrong",
            Phase::Result => "result",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a server step onto the phase the client should show.
///
/// Total and side-effect free apart from a warning for unknown steps.
/// A missing step (brand-new session) and any unknown step both land on
/// `Phase::Concept`.
#[must_use]
pub fn project_step(step: Option<&Step>) -> Phase {
    match step {
        None | Some(Step::Concept) => Phase::Concept,
        Some(Step::Mini) => Phase::Mini,
        Some(Step::ReviewWrong) => Phase::Wrong,
        Some(Step::Mcq | Step::Practical | Step::PracticalSet) => Phase::Problem,
        Some(Step::Summary) => Phase::Result,
        Some(Step::Other(raw)) => {
            tracing::warn!(step = %raw, "unrecognized session step, falling back to concept");
            Phase::Concept
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_steps_project_to_their_phase() {
        let cases = [
            (Step::Concept, Phase::Concept),
            (Step::Mini, Phase::Mini),
            (Step::ReviewWrong, Phase::Wrong),
            (Step::Mcq, Phase::Problem),
            (Step::Practical, Phase::Problem),
            (Step::PracticalSet, Phase::Problem),
            (Step::Summary, Phase::Result),
        ];
        for (step, phase) in cases {
            assert_eq!(project_step(Some(&step)), phase, "step {step}");
        }
    }

    #[test]
    fn absent_step_is_concept() {
        assert_eq!(project_step(None), Phase::Concept);
    }

    #[test]
    fn unknown_step_fails_closed() {
        let step = Step::Other("LEADERBOARD".into());
        assert_eq!(project_step(Some(&step)), Phase::Concept);
    }

    proptest! {
        #[test]
        fn projection_is_total_and_deterministic(raw in "[A-Z_]{0,16}") {
            let step = Step::from(raw);
            let first = project_step(Some(&step));
            let second = project_step(Some(&step));
            prop_assert_eq!(first, second);
            if matches!(step, Step::Other(_)) {
                prop_assert_eq!(first, Phase::Concept);
            }
        }
    }
}
