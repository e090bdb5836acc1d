//! Orchestrator (C10): the three operations the HTTP surface exposes,
//! wiring C2/C4/C5/C6/C7/C8/C9 together. Idempotency keys: `message_id` for
//! `process_incoming`, `(generation_date, folder_id)` for `sync_generation`.

use crate::cache::Cache;
use crate::datasets::branch_summary::BranchSummaryPipeline;
use crate::datasets::upcoming_arrivals::UpcomingArrivalsPipeline;
use crate::datasets::upcoming_birthdays::UpcomingBirthdaysPipeline;
use crate::datasets::DatasetPipeline;
use crate::error::CoreError;
use crate::events::{DatasetInvalidated, EventBus};
use crate::mail::{MailGateway, MessageRef};
use crate::models::{
    BranchSummary, DataResponse, GenerationDate, ProcessingResult, SyncReport, UploadError,
    UpcomingArrival, UpcomingBirthday,
};
use crate::normalize::sanitize_filename;
use crate::parsing::html_table;
use crate::retry::with_backoff;
use crate::storage::ObjectStore;
use crate::sync::engine::SyncEngine;
use rocket_db_pools::sqlx::{self, PgPool};
use std::sync::Arc;
use std::time::Duration;

pub struct Orchestrator {
    pool: PgPool,
    mail: Arc<dyn MailGateway>,
    store: Arc<dyn ObjectStore>,
    cache: Arc<dyn Cache>,
    events: Arc<EventBus>,
    engine: SyncEngine,
    subject_pattern: String,
    attachments_folder_id: String,
    branch_id: String,
    allowed_branches: Vec<String>,
    cache_ttl: Duration,
    upcoming_window_days: i64,
}

impl Orchestrator {
    pub fn new(
        pool: PgPool,
        mail: Arc<dyn MailGateway>,
        store: Arc<dyn ObjectStore>,
        cache: Arc<dyn Cache>,
        events: Arc<EventBus>,
        subject_pattern: String,
        attachments_folder_id: String,
        branch_id: String,
        allowed_branches: Vec<String>,
        cache_ttl_minutes: u64,
        upcoming_window_days: i64,
    ) -> Self {
        let engine = SyncEngine::new(pool.clone(), store.clone());
        Self {
            pool,
            mail,
            store,
            cache,
            events,
            engine,
            subject_pattern,
            attachments_folder_id,
            branch_id,
            allowed_branches,
            cache_ttl: Duration::from_secs(cache_ttl_minutes * 60),
            upcoming_window_days,
        }
    }

    /// Run C4 → C2 → C5 over every unprocessed message, aggregating one
    /// `ProcessingResult` per message. A single message's failure (fetch
    /// error, mark-processed error) is folded into that message's own
    /// result rather than aborting the rest of the batch.
    pub async fn process_incoming(&self) -> Result<Vec<ProcessingResult>, CoreError> {
        let refs = self.mail.list_unprocessed(&self.subject_pattern).await?;
        let mut results = Vec::with_capacity(refs.len());
        for message_ref in refs {
            let result = match self.process_one(&message_ref).await {
                Ok(result) => result,
                Err(e) => {
                    log::error!("message {} failed to process: {e}", message_ref.0);
                    ProcessingResult {
                        success: false,
                        message_id: message_ref.0.clone(),
                        subject: String::new(),
                        generation_date: None,
                        attachments_count: 0,
                        validation_errors: vec![e.code()],
                        parsed_table: None,
                        table_errors: Vec::new(),
                        folder_id: None,
                        uploaded_files: Vec::new(),
                        upload_errors: Vec::new(),
                    }
                }
            };
            results.push(result);
        }
        Ok(results)
    }

    async fn already_processed(&self, message_id: &str) -> Result<bool, CoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT message_id FROM processed_messages WHERE message_id = $1")
                .bind(message_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| CoreError::DbInsertFailed(e.to_string()))?;
        Ok(row.is_some())
    }

    async fn mark_processed(&self, message_ref: &MessageRef) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO processed_messages (message_id, processed_at) VALUES ($1, now()) \
             ON CONFLICT (message_id) DO NOTHING",
        )
        .bind(&message_ref.0)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::DbInsertFailed(e.to_string()))?;

        self.mail.mark_processed(message_ref).await
    }

    async fn process_one(&self, message_ref: &MessageRef) -> Result<ProcessingResult, CoreError> {
        if self.already_processed(&message_ref.0).await? {
            return Ok(ProcessingResult {
                success: true,
                message_id: message_ref.0.clone(),
                subject: String::new(),
                generation_date: None,
                attachments_count: 0,
                validation_errors: Vec::new(),
                parsed_table: None,
                table_errors: Vec::new(),
                folder_id: None,
                uploaded_files: Vec::new(),
                upload_errors: Vec::new(),
            });
        }

        let message = self.mail.fetch(message_ref).await?;
        let mut validation_errors = Vec::new();

        if crate::normalize::match_subject_pattern(&message.subject, &self.subject_pattern).is_none() {
            validation_errors.push(CoreError::SubjectPatternMismatch.code());
        }
        if message.attachments.is_empty() {
            validation_errors.push(CoreError::AttachmentsMissing.code());
        }

        let outcome = html_table::parse_body(&message.body_plain, message.body_html.as_deref());
        let table_errors: Vec<String> = outcome.table_errors.iter().map(|e| e.code()).collect();

        let generation_date = outcome.generation_date.clone();
        if generation_date.is_none() {
            validation_errors.push(CoreError::FechaGeneracionMissing.code());
        }

        let mut uploaded_files = Vec::new();
        let mut upload_errors = Vec::new();
        let mut folder_id = None;

        if !validation_errors.is_empty() {
            return Ok(ProcessingResult {
                success: false,
                message_id: message_ref.0.clone(),
                subject: message.subject,
                generation_date: generation_date.map(|d| d.as_str().to_string()),
                attachments_count: message.attachments.len(),
                validation_errors,
                parsed_table: outcome.table,
                table_errors,
                folder_id,
                uploaded_files,
                upload_errors,
            });
        }

        let generation_date = generation_date.expect("checked above");
        let district_hint = outcome
            .table
            .as_ref()
            .and_then(|table| infer_district(table));

        match with_backoff(|| {
            self.store
                .ensure_folder(&self.attachments_folder_id, generation_date.as_str())
        })
        .await
        {
            Ok(id) => folder_id = Some(id),
            Err(e) => {
                upload_errors.push(UploadError {
                    stage: "ensure_folder".to_string(),
                    code: e.code(),
                });
            }
        }

        if let Some(folder_id) = &folder_id {
            for attachment in &message.attachments {
                let sanitized = sanitize_filename(&attachment.original_name);
                let name = match &district_hint {
                    Some(district) => format!("{generation_date}_{district}_{sanitized}"),
                    None => sanitized,
                };
                match self
                    .store
                    .upload(folder_id, &name, &attachment.bytes, &attachment.content_type)
                    .await
                {
                    Ok(stored) => uploaded_files.push(stored),
                    Err(e) => upload_errors.push(UploadError {
                        stage: "upload".to_string(),
                        code: e.code(),
                    }),
                }
            }
        }

        let success = upload_errors.is_empty()
            && uploaded_files.len() == message.attachments.len()
            && folder_id.is_some();

        if success {
            self.mark_processed(message_ref).await?;
        }

        Ok(ProcessingResult {
            success,
            message_id: message_ref.0.clone(),
            subject: message.subject,
            generation_date: Some(generation_date.as_str().to_string()),
            attachments_count: message.attachments.len(),
            validation_errors: Vec::new(),
            parsed_table: outcome.table,
            table_errors,
            folder_id,
            uploaded_files,
            upload_errors,
        })
    }

    pub async fn sync_generation(
        &self,
        generation_date: &str,
        folder_id: &str,
        force: bool,
    ) -> Result<SyncReport, CoreError> {
        let generation_date = GenerationDate::parse(generation_date)
            .ok_or_else(|| CoreError::ConfigInvalid("invalid generation_date".to_string()))?;

        let report = self.engine.sync_generation(&generation_date, folder_id, force).await?;

        self.events.publish_dataset_invalidated(DatasetInvalidated {
            generation_date: generation_date.as_str().to_string(),
            branch_id: self.branch_id.clone(),
        });

        Ok(report)
    }

    /// Debug read-through to C4: list unprocessed messages, optionally
    /// narrowed by `query` as an additional subject substring filter.
    pub async fn search_messages(&self, query: Option<&str>) -> Result<Vec<MessageRef>, CoreError> {
        let refs = self.mail.list_unprocessed(&self.subject_pattern).await?;
        Ok(match query {
            Some(q) => refs.into_iter().filter(|r| r.0.contains(q)).collect(),
            None => refs,
        })
    }

    pub async fn branch_summary(&self, generation_date: &str) -> Result<DataResponse<BranchSummary>, CoreError> {
        let key = crate::cache::cache_key("branch_summary", &self.branch_id, generation_date);
        if let Some(cached) = crate::cache::get::<BranchSummary>(self.cache.as_ref(), &key).await {
            return Ok(DataResponse::new(cached));
        }

        let branches_scope = if self.allowed_branches.is_empty() {
            vec![self.branch_id.clone()]
        } else {
            self.allowed_branches.clone()
        };
        let pipeline = BranchSummaryPipeline::new(
            self.pool.clone(),
            self.branch_id.clone(),
            branches_scope,
            generation_date.to_string(),
        );
        let (summary, _metadata) = pipeline.run(&self.branch_id, generation_date).await?;
        crate::cache::set(self.cache.as_ref(), &key, &summary, self.cache_ttl).await;
        Ok(DataResponse::new(summary))
    }

    pub async fn upcoming_arrivals(&self, generation_date: &str) -> Result<DataResponse<Vec<UpcomingArrival>>, CoreError> {
        let key = crate::cache::cache_key("upcoming_arrivals", &self.branch_id, generation_date);
        if let Some(cached) = crate::cache::get::<Vec<UpcomingArrival>>(self.cache.as_ref(), &key).await {
            return Ok(DataResponse::new(cached));
        }

        let today = chrono::Utc::now().date_naive();
        let pipeline = UpcomingArrivalsPipeline::new(
            self.pool.clone(),
            self.branch_id.clone(),
            today,
            self.upcoming_window_days,
        );
        let (arrivals, _metadata) = pipeline.run(&self.branch_id, generation_date).await?;
        crate::cache::set(self.cache.as_ref(), &key, &arrivals, self.cache_ttl).await;
        Ok(DataResponse::new(arrivals))
    }

    pub async fn upcoming_birthdays(&self, generation_date: &str) -> Result<DataResponse<Vec<UpcomingBirthday>>, CoreError> {
        let key = crate::cache::cache_key("upcoming_birthdays", &self.branch_id, generation_date);
        if let Some(cached) = crate::cache::get::<Vec<UpcomingBirthday>>(self.cache.as_ref(), &key).await {
            return Ok(DataResponse::new(cached));
        }

        let today = chrono::Utc::now().date_naive();
        let pipeline = UpcomingBirthdaysPipeline::new(
            self.pool.clone(),
            self.branch_id.clone(),
            today,
            self.upcoming_window_days,
        );
        let (birthdays, _metadata) = pipeline.run(&self.branch_id, generation_date).await?;
        crate::cache::set(self.cache.as_ref(), &key, &birthdays, self.cache_ttl).await;
        Ok(DataResponse::new(birthdays))
    }
}

/// Best-effort district inference from the first parsed table row, looking
/// for a header spelled "distrito" or "district" (case-insensitive).
fn infer_district(table: &crate::models::ParsedTable) -> Option<String> {
    let header = table
        .headers
        .iter()
        .find(|h| {
            let lower = h.to_lowercase();
            lower.contains("distrito") || lower.contains("district")
        })?;
    table.rows.first()?.get(header).map(|v| sanitize_filename(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ParsedTable;
    use std::collections::BTreeMap;

    #[test]
    fn infers_district_from_first_row() {
        let mut row = BTreeMap::new();
        row.insert("Distrito".to_string(), "Centro Norte".to_string());
        let table = ParsedTable {
            headers: vec!["Distrito".to_string()],
            rows: vec![row],
            extra_texts: Vec::new(),
        };
        assert_eq!(infer_district(&table).as_deref(), Some("Centro_Norte"));
    }

    #[test]
    fn no_district_header_yields_none() {
        let table = ParsedTable {
            headers: vec!["Nombre".to_string()],
            rows: vec![BTreeMap::new()],
            extra_texts: Vec::new(),
        };
        assert_eq!(infer_district(&table), None);
    }
}
