use learn_core::model::{CorrelationId, ResumeHandle, SessionId, StudyMode, TopicId};
use learn_core::time::fixed_now;
use storage::repository::{ResumeHandleRepository, Storage, StorageError};
use storage::sqlite::SqliteRepository;

fn handle(session: u64, correlation: Option<&str>) -> ResumeHandle {
    ResumeHandle::new(
        SessionId::new(session),
        TopicId::new(3),
        StudyMode::Practical,
        correlation.map(CorrelationId::new),
        fixed_now(),
    )
}

#[tokio::test]
async fn sqlite_roundtrip_restores_handle_in_one_step() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_handles?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    repo.save_handle(&handle(11, Some("corr-11"))).await.unwrap();

    let loaded = repo
        .load_handle(SessionId::new(11))
        .await
        .expect("load")
        .expect("handle present");
    assert_eq!(loaded, handle(11, Some("corr-11")));
}

#[tokio::test]
async fn sqlite_upsert_then_clear() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_upsert?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    // migrations are re-runnable
    repo.migrate().await.expect("migrate twice");

    repo.save_handle(&handle(5, None)).await.unwrap();
    repo.save_handle(&handle(5, Some("late"))).await.unwrap();
    let loaded = repo.load_handle(SessionId::new(5)).await.unwrap().unwrap();
    assert_eq!(loaded.correlation_id, Some(CorrelationId::new("late")));

    repo.clear_handle(SessionId::new(5)).await.unwrap();
    assert!(repo.load_handle(SessionId::new(5)).await.unwrap().is_none());
}

#[tokio::test]
async fn sqlite_reports_corrupt_payload() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_corrupt?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    sqlx::query("INSERT INTO resume_handles (session_id, payload, saved_at) VALUES (9, 'oops', '')")
        .execute(repo.pool())
        .await
        .unwrap();

    let err = repo.load_handle(SessionId::new(9)).await.unwrap_err();
    assert!(matches!(err, StorageError::Serialization(_)));
}

#[tokio::test]
async fn storage_sqlite_wires_handle_repo() {
    let storage = Storage::sqlite("sqlite:file:memdb_storage?mode=memory&cache=shared")
        .await
        .expect("storage");
    storage.handles.save_handle(&handle(1, None)).await.unwrap();
    assert!(storage.handles.load_handle(SessionId::new(1)).await.unwrap().is_some());
}
