use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{CorrelationId, SessionId, StudyMode, TopicId};

/// Everything needed to pick a session back up after a full reload.
///
/// Persisted as one serialized value and restored in a single step when the
/// orchestrator is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeHandle {
    pub session_id: SessionId,
    pub topic_id: TopicId,
    pub mode: StudyMode,
    #[serde(default)]
    pub correlation_id: Option<CorrelationId>,
    pub saved_at: DateTime<Utc>,
}

impl ResumeHandle {
    #[must_use]
    pub fn new(
        session_id: SessionId,
        topic_id: TopicId,
        mode: StudyMode,
        correlation_id: Option<CorrelationId>,
        saved_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            topic_id,
            mode,
            correlation_id,
            saved_at,
        }
    }

    /// A handle only applies to the session and topic it was saved for.
    #[must_use]
    pub fn matches(&self, session_id: SessionId, topic_id: TopicId) -> bool {
        self.session_id == session_id && self.topic_id == topic_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn handle_json_shape_is_stable() {
        let handle = ResumeHandle::new(
            SessionId::new(10),
            TopicId::new(3),
            StudyMode::Written,
            Some(CorrelationId::new("c-1")),
            fixed_now(),
        );
        let json = serde_json::to_value(&handle).unwrap();
        assert_eq!(json["sessionId"], 10);
        assert_eq!(json["mode"], "WRITTEN");
        assert_eq!(json["correlationId"], "c-1");

        let back: ResumeHandle = serde_json::from_value(json).unwrap();
        assert_eq!(back, handle);
    }

    #[test]
    fn matches_requires_same_session_and_topic() {
        let handle = ResumeHandle::new(
            SessionId::new(10),
            TopicId::new(3),
            StudyMode::Practical,
            None,
            fixed_now(),
        );
        assert!(handle.matches(SessionId::new(10), TopicId::new(3)));
        assert!(!handle.matches(SessionId::new(10), TopicId::new(4)));
    }
}
