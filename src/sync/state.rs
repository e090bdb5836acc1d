//! Durable `SyncState` persistence for the sync engine (C6).
//!
//! One row per `generation_date`; deleted on full completion, upserted after
//! every file so a crash mid-run resumes from `last_processed_file_id`.

use crate::error::CoreError;
use crate::models::{ContinuationToken, SyncState};
use rocket_db_pools::sqlx::PgPool;

pub async fn load(pool: &PgPool, generation_date: &str) -> Result<Option<SyncState>, CoreError> {
    let row: Option<(String, Option<String>)> = sqlx::query_as(
        "SELECT generation_date, last_processed_file_id FROM sync_state WHERE generation_date = $1",
    )
    .bind(generation_date)
    .fetch_optional(pool)
    .await
    .map_err(|e| CoreError::DbInsertFailed(e.to_string()))?;

    Ok(row.map(|(generation_date, last_processed_file_id)| SyncState {
        continuation_token: last_processed_file_id
            .clone()
            .map(ContinuationToken::File)
            .unwrap_or(ContinuationToken::None),
        generation_date,
        last_processed_file_id,
    }))
}

pub async fn upsert(pool: &PgPool, state: &SyncState) -> Result<(), CoreError> {
    sqlx::query(
        r#"INSERT INTO sync_state (generation_date, last_processed_file_id)
           VALUES ($1, $2)
           ON CONFLICT (generation_date)
           DO UPDATE SET last_processed_file_id = EXCLUDED.last_processed_file_id"#,
    )
    .bind(&state.generation_date)
    .bind(&state.last_processed_file_id)
    .execute(pool)
    .await
    .map_err(|e| CoreError::DbInsertFailed(e.to_string()))?;

    Ok(())
}

pub async fn delete(pool: &PgPool, generation_date: &str) -> Result<(), CoreError> {
    sqlx::query("DELETE FROM sync_state WHERE generation_date = $1")
        .bind(generation_date)
        .execute(pool)
        .await
        .map_err(|e| CoreError::DbInsertFailed(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuation_token_reflects_last_processed_file() {
        let state = SyncState {
            generation_date: "20250110".to_string(),
            last_processed_file_id: Some("file-2".to_string()),
            continuation_token: ContinuationToken::File("file-2".to_string()),
        };
        assert_eq!(state.continuation_token, ContinuationToken::File("file-2".to_string()));
    }
}
