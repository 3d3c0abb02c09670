//! Plain-text rendering and input for the study loop.

use std::io::{self, BufRead, Write};

use learn_core::model::{
    Answer, ConceptSection, ContentBlock, Phase, QuestionItem, QuestionKind, SummaryPayload,
    WrongItem,
};
use services::sessions::ItemState;
use services::{
    FlowError, GradeOutcome, LoadOutcome, PhaseContent, SessionOrchestrator, Transition,
};

/// Runs the orchestrator until the session finishes or input ends.
pub async fn drive(
    orch: &mut SessionOrchestrator,
    input: &mut impl BufRead,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("== {} ==", orch.phase());
    loop {
        match orch.load_current().await? {
            LoadOutcome::AutoContinued(Transition::Finished) => {
                println!("Session complete.");
                return Ok(());
            }
            LoadOutcome::AutoContinued(transition) => {
                println!("Nothing to review.");
                announce(&transition);
                continue;
            }
            LoadOutcome::Ready => {}
        }

        render(orch);
        if orch.is_closed() {
            return Ok(());
        }

        let keep_going = if matches!(orch.phase(), Phase::Mini | Phase::Problem) {
            answer_items(orch, input).await?
        } else {
            prompt_continue(input)?
        };
        if !keep_going {
            return Ok(());
        }

        let transition = orch.continue_phase().await?;
        announce(&transition);
        match transition {
            Transition::Finished => return Ok(()),
            Transition::Declined { .. } if !prompt_continue(input)? => return Ok(()),
            _ => {}
        }
    }
}

fn announce(transition: &Transition) {
    match transition {
        Transition::Moved { phase, .. } => println!("\n== {phase} =="),
        Transition::Declined { phase, reason } => {
            println!("Cannot continue yet ({reason:?}); now at {phase}.");
        }
        Transition::Finished => println!("Session complete."),
    }
}

fn render(orch: &SessionOrchestrator) {
    match orch.content() {
        Some(PhaseContent::Concept(concept)) => {
            println!("{}", concept.title);
            for section in &concept.sections {
                render_section(section, 0);
            }
        }
        Some(PhaseContent::Mini(set) | PhaseContent::Problem(set)) => {
            println!("{} questions. Type q to stop.", set.items.len());
        }
        Some(PhaseContent::Wrong(items)) => render_wrong(items),
        Some(PhaseContent::Result(summary)) => render_summary(summary),
        None => {}
    }
}

fn render_section(section: &ConceptSection, depth: usize) {
    let indent = "  ".repeat(depth);
    println!("\n{indent}{}", section.title);
    for block in &section.blocks {
        match block {
            ContentBlock::Heading { text, .. } => println!("{indent}# {text}"),
            ContentBlock::Paragraph { text } => println!("{indent}{text}"),
            ContentBlock::List { ordered, items } => {
                for (n, item) in items.iter().enumerate() {
                    if *ordered {
                        println!("{indent}{}. {item}", n + 1);
                    } else {
                        println!("{indent}- {item}");
                    }
                }
            }
            ContentBlock::Table { headers, rows } => {
                if !headers.is_empty() {
                    println!("{indent}{}", headers.join(" | "));
                }
                for row in rows {
                    println!("{indent}{}", row.join(" | "));
                }
            }
            ContentBlock::Image { url, alt } => {
                println!("{indent}[image: {}] {url}", alt.as_deref().unwrap_or(""));
            }
        }
    }
    for child in &section.children {
        render_section(child, depth + 1);
    }
}

fn render_wrong(items: &[WrongItem]) {
    for item in items {
        println!("\n{}", item.prompt);
        println!("  your answer:    {}", item.user_answer);
        println!("  correct answer: {}", item.correct_answer);
        if let Some(explanation) = &item.explanation {
            println!("  {explanation}");
        }
    }
}

fn render_summary(summary: &SummaryPayload) {
    println!("Mini check: {}/{}", summary.mini_correct, summary.mini_total);
    println!(
        "Problems ({}): {}/{}",
        summary.mode.as_str(),
        summary.problem_correct,
        summary.problem_total
    );
    println!("Total: {}/{}", summary.total_correct(), summary.total_problems);
    if !summary.summary_text.is_empty() {
        println!("{}", summary.summary_text);
    }
    if let Some(reward) = &summary.reward {
        match &reward.level {
            Some(level) => println!("Reward: {} points ({level})", reward.points),
            None => println!("Reward: {} points", reward.points),
        }
    }
}

async fn answer_items(
    orch: &mut SessionOrchestrator,
    input: &mut impl BufRead,
) -> Result<bool, Box<dyn std::error::Error>> {
    let items: Vec<QuestionItem> = orch
        .content()
        .and_then(PhaseContent::items)
        .map(<[QuestionItem]>::to_vec)
        .unwrap_or_default();

    for item in items {
        let graded = orch
            .grader()
            .and_then(|grader| grader.state(item.question_id))
            .is_some_and(|state| matches!(state, ItemState::Graded(_)));
        if graded {
            continue;
        }
        print_item(&item);
        loop {
            let Some(line) = read_line(input)? else {
                return Ok(false);
            };
            if line.eq_ignore_ascii_case("q") {
                return Ok(false);
            }
            let Some(answer) = parse_answer(item.kind, &line) else {
                println!("Answer not understood.");
                continue;
            };
            match orch.submit_answer(item.question_id, answer).await {
                Ok(outcome) => {
                    print_outcome(orch, &outcome);
                    break;
                }
                Err(FlowError::Answer(err)) => println!("{err}"),
                Err(err) => return Err(err.into()),
            }
        }
    }
    Ok(true)
}

fn print_item(item: &QuestionItem) {
    println!("\n{}", item.prompt);
    for choice in &item.choices {
        println!("  {}) {}", choice.label, choice.text);
    }
    if let Some(url) = &item.image_url {
        println!("  [image] {url}");
    }
    if item.kind == QuestionKind::Mini {
        println!("  (o / x)");
    }
}

fn print_outcome(orch: &SessionOrchestrator, outcome: &GradeOutcome) {
    match outcome {
        GradeOutcome::Graded {
            question_id,
            correct,
            ..
        } => {
            println!("{}", if *correct { "Correct." } else { "Incorrect." });
            if let Some(graded) = orch.grader().and_then(|g| g.graded(*question_id)) {
                if let Some(answer) = graded.correct_answer.as_deref().filter(|_| !correct) {
                    println!("Correct answer: {answer}");
                }
                if let Some(explanation) = &graded.explanation {
                    println!("{explanation}");
                }
            }
        }
        GradeOutcome::Absorbed { error, .. } => {
            println!("Could not grade this answer ({error}); it counts as incorrect.");
        }
        GradeOutcome::Discarded { .. } => {}
    }
}

fn parse_answer(kind: QuestionKind, raw: &str) -> Option<Answer> {
    let raw = raw.trim();
    match kind {
        QuestionKind::Mini => match raw.to_ascii_lowercase().as_str() {
            "o" | "t" | "true" | "y" | "yes" => Some(Answer::Boolean(true)),
            "x" | "f" | "false" | "n" | "no" => Some(Answer::Boolean(false)),
            _ => None,
        },
        QuestionKind::Mcq => (!raw.is_empty()).then(|| Answer::Choice(raw.to_ascii_uppercase())),
        QuestionKind::Practical => (!raw.is_empty()).then(|| Answer::Text(raw.to_string())),
    }
}

fn prompt_continue(input: &mut impl BufRead) -> io::Result<bool> {
    println!("\nPress enter to continue, q to stop.");
    Ok(read_line(input)?.is_some_and(|line| !line.eq_ignore_ascii_case("q")))
}

fn read_line(input: &mut impl BufRead) -> io::Result<Option<String>> {
    print!("> ");
    io::stdout().flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use learn_core::model::{StudyMode, TopicId};
    use services::{InMemoryStudyServer, TopicFixture};
    use storage::repository::InMemoryRepository;

    #[tokio::test]
    async fn scripted_session_less_run_finishes() {
        let server = InMemoryStudyServer::new();
        server
            .add_topic(TopicFixture::generated(TopicId::new(1), "Keys", 2, 2, 0))
            .unwrap();
        let mut orch = SessionOrchestrator::new(
            Arc::new(server),
            Arc::new(InMemoryRepository::new()),
            TopicId::new(1),
            StudyMode::Written,
            None,
        );
        orch.initialize().await.unwrap();

        let mut input = io::Cursor::new("\no\nx\nA\na\n\n");
        drive(&mut orch, &mut input).await.unwrap();

        assert!(orch.is_closed());
        let summary = orch.summary().unwrap();
        assert_eq!(summary.mini_correct, 1);
        assert_eq!(summary.problem_correct, 2);
    }

    #[test]
    fn mini_answers_accept_o_and_x() {
        assert_eq!(parse_answer(QuestionKind::Mini, "O"), Some(Answer::Boolean(true)));
        assert_eq!(parse_answer(QuestionKind::Mini, " x "), Some(Answer::Boolean(false)));
        assert_eq!(parse_answer(QuestionKind::Mini, "maybe"), None);
    }

    #[test]
    fn mcq_labels_are_uppercased_and_text_kept() {
        assert_eq!(
            parse_answer(QuestionKind::Mcq, "b"),
            Some(Answer::Choice("B".into()))
        );
        assert_eq!(
            parse_answer(QuestionKind::Practical, "SELECT 1"),
            Some(Answer::Text("SELECT 1".into()))
        );
        assert_eq!(parse_answer(QuestionKind::Practical, "  "), None);
    }
}
