//! JSON shapes exchanged with the study server and their mapping onto the
//! domain model.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use learn_core::model::{
    AdvanceTarget, Answer, CorrelationId, GradingResult, ItemSet, LearningSession, QuestionId,
    QuestionItem, Reward, SessionId, SessionStatus, SessionStepRecord, Step, StepDetails, StepId,
    StepState, StudyMode, SummaryPayload, TopicId,
};

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionDto {
    pub session_id: SessionId,
    pub topic_id: TopicId,
    pub mode: StudyMode,
    pub status: SessionStatus,
    #[serde(default)]
    pub current_step: Option<Step>,
    #[serde(default)]
    pub steps: Vec<StepDto>,
    #[serde(default)]
    pub correlation_id: Option<CorrelationId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StepDto {
    #[serde(default)]
    pub step_id: Option<StepId>,
    pub step: Step,
    pub state: StepState,
    #[serde(default, deserialize_with = "lenient_percent")]
    pub score_pct: Option<u8>,
    #[serde(default)]
    pub details_json: Option<Value>,
}

impl SessionDto {
    pub(crate) fn into_session(self) -> LearningSession {
        LearningSession {
            session_id: self.session_id,
            topic_id: self.topic_id,
            mode: self.mode,
            status: self.status,
            current_step: self.current_step,
            steps: self.steps.into_iter().map(StepDto::into_record).collect(),
            correlation_id: self.correlation_id,
        }
    }
}

impl StepDto {
    fn into_record(self) -> SessionStepRecord {
        SessionStepRecord {
            step_id: self.step_id,
            details: parse_details(self.details_json.as_ref()),
            step: self.step,
            state: self.state,
            score_percent: self.score_pct,
        }
    }
}

/// Reads step counters from `detailsJson`, which may be an object or a JSON string.
///
/// Anything unreadable yields empty counters.
pub(crate) fn parse_details(raw: Option<&Value>) -> StepDetails {
    let parsed = match raw {
        None | Some(Value::Null) => return StepDetails::default(),
        Some(Value::String(text)) => serde_json::from_str::<StepDetails>(text),
        Some(other) => serde_json::from_value::<StepDetails>(other.clone()),
    };
    parsed.unwrap_or_else(|err| {
        tracing::debug!(error = %err, "ignoring unreadable step details");
        StepDetails::default()
    })
}

fn lenient_percent<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(parse_percent(raw.as_ref()))
}

/// Reads `scorePct` as a number or numeric string, rounded and clamped to 0..=100.
///
/// Anything unreadable yields no score.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn parse_percent(raw: Option<&Value>) -> Option<u8> {
    let value = match raw {
        None | Some(Value::Null) => return None,
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    match value {
        Some(pct) if pct.is_finite() => Some(pct.round().clamp(0.0, 100.0) as u8),
        _ => {
            tracing::debug!(raw = ?raw, "ignoring unreadable step score");
            None
        }
    }
}

//
// ─── REQUESTS ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StartBody {
    pub topic_id: TopicId,
    pub mode: StudyMode,
    pub resume: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StartResponse {
    pub session_id: SessionId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AdvanceBody {
    pub session_id: SessionId,
    pub step: Step,
    pub score: Option<u8>,
    pub details_json: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AdvanceResponse {
    pub moved_to: AdvanceTarget,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ItemSetDto {
    #[serde(default)]
    pub items: Vec<QuestionItem>,
    #[serde(default)]
    pub correlation_id: Option<CorrelationId>,
}

impl From<ItemSetDto> for ItemSet {
    fn from(dto: ItemSetDto) -> Self {
        Self {
            items: dto.items,
            correlation_id: dto.correlation_id,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GradeBody {
    pub topic_id: TopicId,
    pub question_id: QuestionId,
    pub answer: Value,
    pub session_id: Option<SessionId>,
}

pub(crate) fn answer_value(answer: &Answer) -> Value {
    match answer {
        Answer::Boolean(value) => Value::Bool(*value),
        Answer::Choice(label) => Value::String(label.clone()),
        Answer::Text(text) => Value::String(text.clone()),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GradeResponse {
    pub correct: bool,
    #[serde(default)]
    pub correct_answer: Option<String>,
    #[serde(default)]
    pub correct_label: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<CorrelationId>,
}

impl From<GradeResponse> for GradingResult {
    fn from(dto: GradeResponse) -> Self {
        Self {
            correct: dto.correct,
            correct_answer: dto.correct_answer.or(dto.correct_label),
            explanation: dto.explanation,
            correlation_id: dto.correlation_id,
        }
    }
}

//
// ─── SUMMARY ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SummaryDto {
    #[serde(default)]
    pub mini_total: u32,
    #[serde(default)]
    pub mini_correct: u32,
    #[serde(default)]
    pub mcq_total: Option<u32>,
    #[serde(default)]
    pub mcq_correct: Option<u32>,
    #[serde(default)]
    pub practical_total: Option<u32>,
    #[serde(default)]
    pub practical_correct: Option<u32>,
    #[serde(default)]
    pub total_problems: Option<u32>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub reward_points: Option<u32>,
    #[serde(default)]
    pub level: Option<String>,
}

impl From<SummaryDto> for SummaryPayload {
    fn from(dto: SummaryDto) -> Self {
        let practical = dto.practical_total.is_some() || dto.practical_correct.is_some();
        let (mode, problem_total, problem_correct) = if practical {
            (
                StudyMode::Practical,
                dto.practical_total.unwrap_or_default(),
                dto.practical_correct.unwrap_or_default(),
            )
        } else {
            (
                StudyMode::Written,
                dto.mcq_total.unwrap_or_default(),
                dto.mcq_correct.unwrap_or_default(),
            )
        };
        let reward = dto.reward_points.map(|points| Reward {
            points,
            level: dto.level.clone(),
        });
        Self {
            mode,
            mini_total: dto.mini_total,
            mini_correct: dto.mini_correct,
            problem_total,
            problem_correct,
            total_problems: dto
                .total_problems
                .unwrap_or(dto.mini_total + problem_total),
            summary_text: dto.summary,
            reward,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn session_dto_maps_string_and_object_details() {
        let raw = json!({
            "sessionId": 10,
            "topicId": 3,
            "mode": "WRITTEN",
            "status": "IN_PROGRESS",
            "currentStep": "MINI",
            "steps": [
                {"step": "CONCEPT", "state": "COMPLETE", "detailsJson": null},
                {"stepId": 2, "step": "MINI", "state": "IN_PROGRESS", "scorePct": 50,
                 "detailsJson": "{\"total\":4,\"answered\":2,\"correct\":2}"},
                {"step": "MCQ", "state": "READY", "detailsJson": {"total": 5}}
            ]
        });
        let session = serde_json::from_value::<SessionDto>(raw)
            .unwrap()
            .into_session();

        assert_eq!(session.current_step, Some(Step::Mini));
        let mini = session.step_record(&Step::Mini).unwrap();
        assert_eq!(mini.step_id, Some(StepId::new(2)));
        assert_eq!(mini.details.answered, Some(2));
        assert_eq!(mini.score_percent, Some(50));
        let mcq = session.step_record(&Step::Mcq).unwrap();
        assert_eq!(mcq.details.total, Some(5));
        assert!(session.correlation_id.is_none());
    }

    #[test]
    fn garbage_details_are_ignored() {
        let details = parse_details(Some(&Value::String("not json".into())));
        assert_eq!(details, StepDetails::default());
    }

    #[test]
    fn fractional_score_does_not_reject_the_session() {
        let raw = json!({
            "sessionId": 11,
            "topicId": 3,
            "mode": "WRITTEN",
            "status": "IN_PROGRESS",
            "currentStep": "MCQ",
            "steps": [
                {"step": "MINI", "state": "COMPLETE", "scorePct": 66.7},
                {"step": "MCQ", "state": "IN_PROGRESS", "scorePct": "n/a"}
            ]
        });
        let session = serde_json::from_value::<SessionDto>(raw)
            .unwrap()
            .into_session();

        assert_eq!(session.step_record(&Step::Mini).unwrap().score_percent, Some(67));
        assert_eq!(session.step_record(&Step::Mcq).unwrap().score_percent, None);
    }

    #[test]
    fn score_percent_is_clamped_and_accepts_numeric_strings() {
        assert_eq!(parse_percent(Some(&json!(140))), Some(100));
        assert_eq!(parse_percent(Some(&json!(-3.5))), Some(0));
        assert_eq!(parse_percent(Some(&json!(" 55 "))), Some(55));
        assert_eq!(parse_percent(Some(&json!([1]))), None);
        assert_eq!(parse_percent(None), None);
    }

    #[test]
    fn item_set_keeps_relative_image_paths() {
        let dto: ItemSetDto = serde_json::from_value(json!({
            "items": [
                {"questionId": 101, "prompt": "Is this an ERD?", "type": "MINI",
                 "imageUrl": "/img/erd.png"},
                {"questionId": 102, "prompt": "Keys are unique.", "type": "MINI"}
            ],
            "correlationId": "corr-9"
        }))
        .unwrap();
        let set = ItemSet::from(dto);

        assert_eq!(set.items.len(), 2);
        assert_eq!(set.items[0].image_url.as_deref(), Some("/img/erd.png"));
        assert!(set.items[1].image_url.is_none());
    }

    #[test]
    fn grade_response_prefers_answer_then_label() {
        let dto: GradeResponse = serde_json::from_value(json!({
            "correct": false,
            "correctLabel": "C",
            "explanation": "Third normal form."
        }))
        .unwrap();
        let result = GradingResult::from(dto);
        assert_eq!(result.correct_answer.as_deref(), Some("C"));
        assert!(!result.correct);
    }

    #[test]
    fn summary_detects_practical_variant() {
        let dto: SummaryDto = serde_json::from_value(json!({
            "miniTotal": 4, "miniCorrect": 3,
            "practicalTotal": 2, "practicalCorrect": 1,
            "summary": "ok", "rewardPoints": 40, "level": "silver"
        }))
        .unwrap();
        let summary = SummaryPayload::from(dto);
        assert_eq!(summary.mode, StudyMode::Practical);
        assert_eq!(summary.total_problems, 6);
        assert_eq!(summary.reward.unwrap().points, 40);
    }

    #[test]
    fn advance_body_serializes_camel_case() {
        let body = AdvanceBody {
            session_id: SessionId::new(1),
            step: Step::Mcq,
            score: Some(80),
            details_json: Some("{}".into()),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["step"], "MCQ");
        assert_eq!(json["detailsJson"], "{}");
    }
}
