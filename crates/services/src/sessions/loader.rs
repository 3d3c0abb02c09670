use std::sync::Arc;

use learn_core::model::{
    ConceptContent, CorrelationId, ItemSet, Phase, QuestionItem, StudyMode, SummaryPayload,
    TopicId, WrongItem,
};

use crate::error::FlowError;
use crate::gateway::{ContentKey, SessionGateway};

/// What a phase needs in order to load, and nothing more.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseRequest {
    Concept(ContentKey),
    Mini(ContentKey),
    Problem { key: ContentKey, mode: StudyMode },
    Wrong {
        correlation_id: CorrelationId,
        mode: StudyMode,
    },
    Result {
        topic_id: TopicId,
        correlation_id: CorrelationId,
    },
}

impl PhaseRequest {
    #[must_use]
    pub fn phase(&self) -> Phase {
        match self {
            PhaseRequest::Concept(_) => Phase::Concept,
            PhaseRequest::Mini(_) => Phase::Mini,
            PhaseRequest::Problem { .. } => Phase::Problem,
            PhaseRequest::Wrong { .. } => Phase::Wrong,
            PhaseRequest::Result { .. } => Phase::Result,
        }
    }
}

/// Loaded content of the active phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseContent {
    Concept(ConceptContent),
    Mini(ItemSet),
    Problem(ItemSet),
    Wrong(Vec<WrongItem>),
    Result(SummaryPayload),
}

impl PhaseContent {
    #[must_use]
    pub fn phase(&self) -> Phase {
        match self {
            PhaseContent::Concept(_) => Phase::Concept,
            PhaseContent::Mini(_) => Phase::Mini,
            PhaseContent::Problem(_) => Phase::Problem,
            PhaseContent::Wrong(_) => Phase::Wrong,
            PhaseContent::Result(_) => Phase::Result,
        }
    }

    /// Gradable items, for the mini and problem phases.
    #[must_use]
    pub fn items(&self) -> Option<&[QuestionItem]> {
        match self {
            PhaseContent::Mini(set) | PhaseContent::Problem(set) => Some(&set.items),
            _ => None,
        }
    }

    /// Correlation id carried by an item-set response, if any.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        match self {
            PhaseContent::Mini(set) | PhaseContent::Problem(set) => set.correlation_id.as_ref(),
            _ => None,
        }
    }
}

/// Fetches phase content. Stateless: every call goes to the server.
#[derive(Clone)]
pub struct PhaseDataLoader {
    gateway: Arc<dyn SessionGateway>,
}

impl PhaseDataLoader {
    #[must_use]
    pub fn new(gateway: Arc<dyn SessionGateway>) -> Self {
        Self { gateway }
    }

    /// # Errors
    ///
    /// Returns `FlowError::ContentUnavailable`, `FlowError::NetworkFailure` or
    /// `FlowError::Forbidden` when the fetch fails.
    pub async fn load(&self, request: &PhaseRequest) -> Result<PhaseContent, FlowError> {
        tracing::debug!(phase = %request.phase(), "loading phase content");
        match request {
            PhaseRequest::Concept(key) => self.load_concept(*key).await.map(PhaseContent::Concept),
            PhaseRequest::Mini(key) => self.load_mini(*key).await.map(PhaseContent::Mini),
            PhaseRequest::Problem { key, mode } => self
                .load_problem(*key, *mode)
                .await
                .map(PhaseContent::Problem),
            PhaseRequest::Wrong {
                correlation_id,
                mode,
            } => self
                .load_wrong(correlation_id, *mode)
                .await
                .map(PhaseContent::Wrong),
            PhaseRequest::Result {
                topic_id,
                correlation_id,
            } => self
                .load_summary(*topic_id, correlation_id)
                .await
                .map(PhaseContent::Result),
        }
    }

    /// Concept material; `key.session_id` may be `None` for the session-less path.
    ///
    /// # Errors
    ///
    /// See [`PhaseDataLoader::load`].
    pub async fn load_concept(&self, key: ContentKey) -> Result<ConceptContent, FlowError> {
        self.gateway
            .fetch_concept(key)
            .await
            .map_err(|err| FlowError::from_load(Phase::Concept, err))
    }

    /// # Errors
    ///
    /// See [`PhaseDataLoader::load`].
    pub async fn load_mini(&self, key: ContentKey) -> Result<ItemSet, FlowError> {
        self.gateway
            .fetch_mini_items(key)
            .await
            .map_err(|err| FlowError::from_load(Phase::Mini, err))
    }

    /// # Errors
    ///
    /// See [`PhaseDataLoader::load`].
    pub async fn load_problem(&self, key: ContentKey, mode: StudyMode) -> Result<ItemSet, FlowError> {
        self.gateway
            .fetch_problem_items(key, mode)
            .await
            .map_err(|err| FlowError::from_load(Phase::Problem, err))
    }

    /// # Errors
    ///
    /// See [`PhaseDataLoader::load`].
    pub async fn load_wrong(
        &self,
        correlation_id: &CorrelationId,
        mode: StudyMode,
    ) -> Result<Vec<WrongItem>, FlowError> {
        self.gateway
            .fetch_wrong_items(correlation_id, mode)
            .await
            .map_err(|err| FlowError::from_load(Phase::Wrong, err))
    }

    /// # Errors
    ///
    /// See [`PhaseDataLoader::load`].
    pub async fn load_summary(
        &self,
        topic_id: TopicId,
        correlation_id: &CorrelationId,
    ) -> Result<SummaryPayload, FlowError> {
        self.gateway
            .fetch_summary(topic_id, correlation_id)
            .await
            .map_err(|err| FlowError::from_load(Phase::Result, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{InMemoryStudyServer, TopicFixture};

    fn loader() -> PhaseDataLoader {
        let server = InMemoryStudyServer::new();
        server
            .add_topic(TopicFixture::generated(TopicId::new(4), "Indexes", 3, 2, 0))
            .unwrap();
        PhaseDataLoader::new(Arc::new(server))
    }

    #[tokio::test]
    async fn concept_loads_without_session() {
        let key = ContentKey {
            topic_id: TopicId::new(4),
            session_id: None,
        };
        let content = loader().load(&PhaseRequest::Concept(key)).await.unwrap();
        assert_eq!(content.phase(), Phase::Concept);
        assert!(content.items().is_none());
    }

    #[tokio::test]
    async fn unknown_topic_is_content_unavailable() {
        let key = ContentKey {
            topic_id: TopicId::new(99),
            session_id: None,
        };
        let err = loader().load(&PhaseRequest::Mini(key)).await.unwrap_err();
        assert!(matches!(
            err,
            FlowError::ContentUnavailable {
                phase: Phase::Mini,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn problem_request_uses_mode() {
        let key = ContentKey {
            topic_id: TopicId::new(4),
            session_id: None,
        };
        let request = PhaseRequest::Problem {
            key,
            mode: StudyMode::Written,
        };
        let content = loader().load(&request).await.unwrap();
        assert_eq!(content.items().map(<[_]>::len), Some(2));
        assert!(content.correlation_id().is_none());
    }
}
