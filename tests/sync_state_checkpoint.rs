use arrival_sync::sync::state;
use arrival_sync::test_support::{TestDatabase, TestDatabaseError};

#[tokio::test]
async fn checkpoint_round_trips_and_clears() {
    let test_db = match TestDatabase::new_from_env().await {
        Ok(db) => db,
        Err(TestDatabaseError::MissingUrl) => {
            eprintln!("skipping checkpoint test: TEST_DATABASE_URL not set");
            return;
        }
        Err(err) => panic!("failed to provision test database: {err:?}"),
    };

    let pool = test_db.pool_clone();

    assert!(state::load(&pool, "20250110").await.unwrap().is_none());

    state::upsert(
        &pool,
        &arrival_sync::models::SyncState {
            generation_date: "20250110".to_string(),
            last_processed_file_id: Some("file-1".to_string()),
            continuation_token: arrival_sync::models::ContinuationToken::File("file-1".to_string()),
        },
    )
    .await
    .expect("upsert succeeds");

    let loaded = state::load(&pool, "20250110")
        .await
        .expect("load succeeds")
        .expect("row exists");
    assert_eq!(loaded.last_processed_file_id.as_deref(), Some("file-1"));

    state::upsert(
        &pool,
        &arrival_sync::models::SyncState {
            generation_date: "20250110".to_string(),
            last_processed_file_id: Some("file-2".to_string()),
            continuation_token: arrival_sync::models::ContinuationToken::File("file-2".to_string()),
        },
    )
    .await
    .expect("re-upsert succeeds");

    let updated = state::load(&pool, "20250110")
        .await
        .expect("load succeeds")
        .expect("row still exists");
    assert_eq!(updated.last_processed_file_id.as_deref(), Some("file-2"));

    state::delete(&pool, "20250110").await.expect("delete succeeds");
    assert!(state::load(&pool, "20250110").await.unwrap().is_none());

    test_db.close().await.expect("failed to drop test database");
}
