use chrono::{DateTime, Utc};

use learn_core::model::{CorrelationId, ResumeHandle, SessionId, StudyMode, TopicId};

use crate::gateway::ContentKey;

/// Identity of the running flow, built once at orchestrator entry.
///
/// Only the orchestrator's transition functions mutate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    topic_id: TopicId,
    mode: StudyMode,
    session_id: Option<SessionId>,
    correlation_id: Option<CorrelationId>,
}

impl SessionContext {
    #[must_use]
    pub fn new(topic_id: TopicId, mode: StudyMode, session_id: Option<SessionId>) -> Self {
        Self {
            topic_id,
            mode,
            session_id,
            correlation_id: None,
        }
    }

    #[must_use]
    pub fn topic_id(&self) -> TopicId {
        self.topic_id
    }

    #[must_use]
    pub fn mode(&self) -> StudyMode {
        self.mode
    }

    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    #[must_use]
    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation_id.as_ref()
    }

    /// Session-keyed when a session exists, topic-keyed otherwise.
    #[must_use]
    pub fn content_key(&self) -> ContentKey {
        ContentKey {
            topic_id: self.topic_id,
            session_id: self.session_id,
        }
    }

    /// Handle to persist for reload survival. `None` on the session-less path.
    #[must_use]
    pub fn resume_handle(&self, saved_at: DateTime<Utc>) -> Option<ResumeHandle> {
        self.session_id.map(|session_id| {
            ResumeHandle::new(
                session_id,
                self.topic_id,
                self.mode,
                self.correlation_id.clone(),
                saved_at,
            )
        })
    }

    /// Keeps the first correlation id seen. Returns `true` if it was new.
    pub(crate) fn capture_correlation(&mut self, correlation_id: CorrelationId) -> bool {
        if self.correlation_id.is_some() {
            return false;
        }
        self.correlation_id = Some(correlation_id);
        true
    }

    /// Applies a restored handle if it belongs to this session and topic.
    pub(crate) fn restore(&mut self, handle: ResumeHandle) -> bool {
        let Some(session_id) = self.session_id else {
            return false;
        };
        if !handle.matches(session_id, self.topic_id) {
            return false;
        }
        if let Some(correlation_id) = handle.correlation_id {
            self.capture_correlation(correlation_id);
        }
        true
    }

    /// Points the context at a freshly started session.
    pub(crate) fn rebind(&mut self, session_id: SessionId) {
        self.session_id = Some(session_id);
        self.correlation_id = None;
    }
}
