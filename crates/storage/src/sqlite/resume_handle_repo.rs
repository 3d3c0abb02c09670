use async_trait::async_trait;
use sqlx::Row;

use crate::repository::{ResumeHandleRepository, StorageError, decode_handle, encode_handle};
use learn_core::model::{ResumeHandle, SessionId};

use super::SqliteRepository;

fn session_key(session_id: SessionId) -> Result<i64, StorageError> {
    i64::try_from(session_id.value())
        .map_err(|_| StorageError::Serialization(format!("session id out of range: {session_id}")))
}

#[async_trait]
impl ResumeHandleRepository for SqliteRepository {
    async fn save_handle(&self, handle: &ResumeHandle) -> Result<(), StorageError> {
        let payload = encode_handle(handle)?;
        sqlx::query(
            r"
            INSERT INTO resume_handles (session_id, payload, saved_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(session_id) DO UPDATE SET
                payload = excluded.payload,
                saved_at = excluded.saved_at
            ",
        )
        .bind(session_key(handle.session_id)?)
        .bind(payload)
        .bind(handle.saved_at)
        .execute(self.pool())
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        Ok(())
    }

    async fn load_handle(&self, session_id: SessionId) -> Result<Option<ResumeHandle>, StorageError> {
        let row = sqlx::query("SELECT payload FROM resume_handles WHERE session_id = ?1")
            .bind(session_key(session_id)?)
            .fetch_optional(self.pool())
            .await
            .map_err(|err| StorageError::Connection(err.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let payload: String = row
            .try_get("payload")
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        decode_handle(&payload).map(Some)
    }

    async fn clear_handle(&self, session_id: SessionId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM resume_handles WHERE session_id = ?1")
            .bind(session_key(session_id)?)
            .execute(self.pool())
            .await
            .map_err(|err| StorageError::Connection(err.to_string()))?;
        Ok(())
    }
}
