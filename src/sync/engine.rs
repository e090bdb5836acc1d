//! Sync engine (C6): enumerates spreadsheet files in a generation folder,
//! streams rows through the C3 mapper, batch-inserts, and persists a
//! resumable checkpoint.
//!
//! Batch inserts follow the bulk-UNNEST-style shape `sync/queue.rs` uses for
//! paginated queries, adapted here to `push_values` for a variable-width
//! column list (`db.rs`/`queue.rs` pattern, generalized to C6's data model).

use crate::error::CoreError;
use crate::models::{FileSyncOutcome, GenerationDate, MissionaryRecord, SyncReport, SyncState, ContinuationToken};
use crate::parsing::spreadsheet::{map_row, read_first_worksheet};
use crate::retry::with_backoff;
use crate::storage::ObjectStore;
use crate::sync::state;
use chrono::Utc;
use dashmap::DashSet;
use rocket_db_pools::sqlx::{self, PgPool, Postgres, QueryBuilder};
use std::sync::Arc;

const BATCH_SIZE: usize = 50;

/// Runs C6. Owns the in-process per-generation mutual exclusion set so at
/// most one sync per `generation_date` runs at a time across the process.
pub struct SyncEngine {
    pool: PgPool,
    store: Arc<dyn ObjectStore>,
    in_progress: DashSet<String>,
}

impl SyncEngine {
    pub fn new(pool: PgPool, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            pool,
            store,
            in_progress: DashSet::new(),
        }
    }

    pub async fn sync_generation(
        &self,
        generation_date: &GenerationDate,
        folder_id: &str,
        force: bool,
    ) -> Result<SyncReport, CoreError> {
        let key = generation_date.as_str().to_string();
        if !self.in_progress.insert(key.clone()) {
            return Err(CoreError::SyncInProgress);
        }
        let result = self.run(generation_date, folder_id, force).await;
        self.in_progress.remove(&key);
        result
    }

    async fn run(
        &self,
        generation_date: &GenerationDate,
        folder_id: &str,
        force: bool,
    ) -> Result<SyncReport, CoreError> {
        let started = std::time::Instant::now();

        if force {
            state::delete(&self.pool, generation_date.as_str()).await?;
        }
        let prior = state::load(&self.pool, generation_date.as_str()).await?;
        let resume_after = prior.as_ref().and_then(|s| s.last_processed_file_id.clone());

        let mut files = with_backoff(|| self.store.list_folder_files(folder_id)).await?;
        files.sort_by(|a, b| a.name.cmp(&b.name));

        let mut skip = resume_after.is_some();
        let mut total_inserted = 0u64;
        let mut total_skipped = 0u64;
        let mut outcomes = Vec::new();

        for file in &files {
            if skip {
                if Some(&file.id) == resume_after.as_ref() {
                    skip = false;
                }
                continue;
            }

            let outcome = self.sync_file(generation_date, &file.id, &file.name).await?;
            total_inserted += outcome.inserted;
            total_skipped += outcome.skipped;
            outcomes.push(outcome);

            state::upsert(
                &self.pool,
                &SyncState {
                    generation_date: generation_date.as_str().to_string(),
                    last_processed_file_id: Some(file.id.clone()),
                    continuation_token: ContinuationToken::File(file.id.clone()),
                },
            )
            .await?;
        }

        state::delete(&self.pool, generation_date.as_str()).await?;

        Ok(SyncReport {
            inserted: total_inserted,
            skipped: total_skipped,
            duration_seconds: started.elapsed().as_secs_f64(),
            continuation_token: ContinuationToken::None,
            files: outcomes,
        })
    }

    /// Syncs one file. On failure nothing is checkpointed for `file_id` — the
    /// checkpoint keeps pointing at the last file that fully completed, so a
    /// retry re-reads this file from scratch. Re-running is safe: rows
    /// already committed before the failure are skipped by `commit_batch`'s
    /// existing-id dedup, so no data is lost and nothing is double-counted
    /// beyond what dedup already tolerates.
    async fn sync_file(
        &self,
        generation_date: &GenerationDate,
        file_id: &str,
        file_name: &str,
    ) -> Result<FileSyncOutcome, CoreError> {
        let bytes = with_backoff(|| self.store.download_file(file_id))
            .await
            .map_err(|e| self.log_file_retry(file_id, e))?;

        let rows = read_first_worksheet(&bytes)?;
        let now = Utc::now();

        let mut inserted = 0u64;
        let mut skipped = 0u64;
        let mut batch: Vec<MissionaryRecord> = Vec::with_capacity(BATCH_SIZE);

        for row in rows.into_iter().skip(1) {
            let (record, errors) = map_row(&row, now, generation_date.as_str());
            for error in &errors {
                log::warn!("row error in {file_name}: {error}");
            }
            if let Some(record) = record {
                batch.push(record);
                if batch.len() == BATCH_SIZE {
                    let (b_inserted, b_skipped) = self
                        .commit_batch(&batch)
                        .await
                        .map_err(|e| self.log_file_retry(file_id, e))?;
                    inserted += b_inserted;
                    skipped += b_skipped;
                    batch.clear();
                }
            }
        }
        if !batch.is_empty() {
            let (b_inserted, b_skipped) = self
                .commit_batch(&batch)
                .await
                .map_err(|e| self.log_file_retry(file_id, e))?;
            inserted += b_inserted;
            skipped += b_skipped;
        }

        Ok(FileSyncOutcome {
            file_id: file_id.to_string(),
            file_name: file_name.to_string(),
            inserted,
            skipped,
        })
    }

    fn log_file_retry(&self, file_id: &str, err: CoreError) -> CoreError {
        log::warn!("file {file_id} failed mid-sync, will be retried in full on next run: {err}");
        err
    }

    /// Look up existing primary keys, filter out duplicates, insert the
    /// remainder in one transaction. Later occurrences of the same `id`
    /// within a batch are skipped, not updated.
    async fn commit_batch(&self, records: &[MissionaryRecord]) -> Result<(u64, u64), CoreError> {
        if records.is_empty() {
            return Ok((0, 0));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CoreError::DbInsertFailed(e.to_string()))?;

        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        let existing: Vec<i64> = sqlx::query_scalar("SELECT id FROM missionary_records WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| CoreError::DbInsertFailed(e.to_string()))?;

        let mut seen = std::collections::HashSet::new();
        let mut fresh = Vec::new();
        for record in records {
            if existing.contains(&record.id) || !seen.insert(record.id) {
                continue;
            }
            fresh.push(record);
        }
        let skipped = (records.len() - fresh.len()) as u64;

        if !fresh.is_empty() {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO missionary_records (\
                    id, district_id, type, branch, district, country, list_number, companionship_number, \
                    name, companion, assigned_mission, stake, lodging, photo, arrival, departure, \
                    generation, comments, endowed, birth_date, photo_taken, passport, passport_folio, \
                    fm, ipad, closet, secondary_arrival, p_day, host, three_weeks, device, \
                    mission_email, personal_email, in_person_date, active, created_at, updated_at, \
                    generation_date\
                ) ",
            );
            builder.push_values(fresh, |mut b, record| {
                b.push_bind(record.id)
                    .push_bind(record.district_id)
                    .push_bind(record.r#type.clone())
                    .push_bind(record.branch.clone())
                    .push_bind(record.district.clone())
                    .push_bind(record.country.clone())
                    .push_bind(record.list_number)
                    .push_bind(record.companionship_number)
                    .push_bind(record.name.clone())
                    .push_bind(record.companion.clone())
                    .push_bind(record.assigned_mission.clone())
                    .push_bind(record.stake.clone())
                    .push_bind(record.lodging.clone())
                    .push_bind(record.photo.clone())
                    .push_bind(record.arrival)
                    .push_bind(record.departure)
                    .push_bind(record.generation.clone())
                    .push_bind(record.comments.clone())
                    .push_bind(record.endowed)
                    .push_bind(record.birth_date)
                    .push_bind(record.photo_taken)
                    .push_bind(record.passport)
                    .push_bind(record.passport_folio.clone())
                    .push_bind(record.fm.clone())
                    .push_bind(record.ipad)
                    .push_bind(record.closet.clone())
                    .push_bind(record.secondary_arrival)
                    .push_bind(record.p_day.clone())
                    .push_bind(record.host)
                    .push_bind(record.three_weeks)
                    .push_bind(record.device)
                    .push_bind(record.mission_email.clone())
                    .push_bind(record.personal_email.clone())
                    .push_bind(record.in_person_date)
                    .push_bind(record.active)
                    .push_bind(record.created_at)
                    .push_bind(record.updated_at)
                    .push_bind(record.generation_date.clone());
            });

            builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| CoreError::DbInsertFailed(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| CoreError::DbInsertFailed(e.to_string()))?;

        Ok((fresh.len() as u64, skipped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_matches_contract() {
        assert_eq!(BATCH_SIZE, 50);
    }
}
