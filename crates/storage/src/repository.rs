use async_trait::async_trait;
use learn_core::model::{ResumeHandle, SessionId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Durable local storage for resume handles, one per session.
#[async_trait]
pub trait ResumeHandleRepository: Send + Sync {
    /// Persist or replace the handle for its session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the handle cannot be stored.
    async fn save_handle(&self, handle: &ResumeHandle) -> Result<(), StorageError>;

    /// Fetch the handle saved for a session, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the stored payload is unreadable,
    /// or other storage errors.
    async fn load_handle(&self, session_id: SessionId) -> Result<Option<ResumeHandle>, StorageError>;

    /// Drop the handle for a session. Missing handles are not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the delete fails.
    async fn clear_handle(&self, session_id: SessionId) -> Result<(), StorageError>;
}

/// Encodes a handle into the single payload column used by persistent adapters.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if encoding fails.
pub fn encode_handle(handle: &ResumeHandle) -> Result<String, StorageError> {
    serde_json::to_string(handle).map_err(|err| StorageError::Serialization(err.to_string()))
}

/// Restores a handle from its persisted payload in one step.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if the payload does not decode.
pub fn decode_handle(payload: &str) -> Result<ResumeHandle, StorageError> {
    serde_json::from_str(payload).map_err(|err| StorageError::Serialization(err.to_string()))
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// Stores encoded payloads so it exercises the same decode path as `SQLite`.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    handles: Arc<Mutex<HashMap<SessionId, String>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handles: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl ResumeHandleRepository for InMemoryRepository {
    async fn save_handle(&self, handle: &ResumeHandle) -> Result<(), StorageError> {
        let payload = encode_handle(handle)?;
        let mut guard = self
            .handles
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(handle.session_id, payload);
        Ok(())
    }

    async fn load_handle(&self, session_id: SessionId) -> Result<Option<ResumeHandle>, StorageError> {
        let guard = self
            .handles
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .get(&session_id)
            .map(String::as_str)
            .map(decode_handle)
            .transpose()
    }

    async fn clear_handle(&self, session_id: SessionId) -> Result<(), StorageError> {
        let mut guard = self
            .handles
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(&session_id);
        Ok(())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub handles: Arc<dyn ResumeHandleRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let handles: Arc<dyn ResumeHandleRepository> = Arc::new(InMemoryRepository::new());
        Self { handles }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use learn_core::model::{CorrelationId, StudyMode, TopicId};
    use learn_core::time::fixed_now;

    fn handle(session: u64, correlation: Option<&str>) -> ResumeHandle {
        ResumeHandle::new(
            SessionId::new(session),
            TopicId::new(1),
            StudyMode::Written,
            correlation.map(CorrelationId::new),
            fixed_now(),
        )
    }

    #[tokio::test]
    async fn save_replaces_previous_handle() {
        let repo = InMemoryRepository::new();
        repo.save_handle(&handle(1, None)).await.unwrap();
        repo.save_handle(&handle(1, Some("corr"))).await.unwrap();

        let loaded = repo.load_handle(SessionId::new(1)).await.unwrap().unwrap();
        assert_eq!(loaded.correlation_id, Some(CorrelationId::new("corr")));
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let repo = InMemoryRepository::new();
        repo.save_handle(&handle(2, None)).await.unwrap();
        repo.clear_handle(SessionId::new(2)).await.unwrap();
        repo.clear_handle(SessionId::new(2)).await.unwrap();
        assert!(repo.load_handle(SessionId::new(2)).await.unwrap().is_none());
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode_handle("{not json").unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }
}
