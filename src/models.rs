//! Data transfer objects and entities shared across the core (C11 + the
//! data model in spec.md §3).
//!
//! Every struct here derives `Serialize`/`Deserialize` so trigger endpoints
//! can return them directly as JSON, and `sqlx::FromRow` where a value is
//! read straight back out of the relational store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An email fetched from the mailbox, read-only to the core and consumed
/// once per cycle.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub received_at: DateTime<Utc>,
    pub body_plain: String,
    pub body_html: Option<String>,
    pub attachments: Vec<AttachmentBlob>,
}

/// A single attachment extracted from an `IncomingMessage`, exclusively
/// owned by the orchestrator until handed to the object-store adapter.
#[derive(Debug, Clone)]
pub struct AttachmentBlob {
    pub original_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl AttachmentBlob {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// The result of table extraction from a mixed text/HTML message body.
///
/// Invariant: for every row, `keys(row) == headers` as sets (enforced by
/// construction in `parsing::html_table`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedTable {
    pub headers: Vec<String>,
    pub rows: Vec<std::collections::BTreeMap<String, String>>,
    pub extra_texts: Vec<String>,
}

/// An 8-character `YYYYMMDD` calendar date, used as a folder name and as
/// the partition key for downstream state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenerationDate(String);

impl GenerationDate {
    /// Parses an 8-digit string into a `GenerationDate`, validating it is a
    /// real Gregorian date.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.len() != 8 || !raw.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let year: i32 = raw[0..4].parse().ok()?;
        let month: u32 = raw[4..6].parse().ok()?;
        let day: u32 = raw[6..8].parse().ok()?;
        chrono::NaiveDate::from_ymd_opt(year, month, day)?;
        Some(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GenerationDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A file that has been uploaded to the object store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: String,
    pub name: String,
    pub folder_id: String,
    pub view_link: String,
    pub download_link: String,
}

/// An error encountered at a specific upload stage, as surfaced in
/// `ProcessingResult.upload_errors`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadError {
    pub stage: String,
    pub code: String,
}

/// The per-message outcome produced by the orchestrator.
///
/// Invariant: `success == true` implies `validation_errors` and
/// `upload_errors` are empty and `generation_date` is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub message_id: String,
    pub subject: String,
    pub generation_date: Option<String>,
    pub attachments_count: usize,
    pub validation_errors: Vec<String>,
    pub parsed_table: Option<ParsedTable>,
    pub table_errors: Vec<String>,
    pub folder_id: Option<String>,
    pub uploaded_files: Vec<StoredFile>,
    pub upload_errors: Vec<UploadError>,
}

impl ProcessingResult {
    /// Construct a failed result carrying only structural validation errors.
    pub fn failed(message_id: String, subject: String, errors: Vec<String>) -> Self {
        Self {
            success: false,
            message_id,
            subject,
            generation_date: None,
            attachments_count: 0,
            validation_errors: errors,
            parsed_table: None,
            table_errors: Vec::new(),
            folder_id: None,
            uploaded_files: Vec::new(),
            upload_errors: Vec::new(),
        }
    }

    /// Whether this outcome satisfies the success invariant.
    pub fn is_consistent(&self) -> bool {
        if !self.success {
            return true;
        }
        self.validation_errors.is_empty()
            && self.upload_errors.is_empty()
            && self.generation_date.is_some()
            && self.uploaded_files.len() == self.attachments_count
    }
}

/// One of the 38 fields of a missionary record (C3's mapping target).
///
/// Primary identity is `id`; `active`, `created_at`, `updated_at` are
/// filled in by the mapper, never read from the spreadsheet.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MissionaryRecord {
    pub id: i64,
    pub district_id: Option<i64>,
    pub r#type: Option<String>,
    pub branch: Option<String>,
    pub district: Option<String>,
    pub country: Option<String>,
    pub list_number: Option<i64>,
    pub companionship_number: Option<i64>,
    pub treatment: Option<String>,
    pub name: Option<String>,
    pub companion: Option<String>,
    pub assigned_mission: Option<String>,
    pub stake: Option<String>,
    pub lodging: Option<String>,
    pub photo: Option<String>,
    pub arrival: Option<chrono::NaiveDate>,
    pub departure: Option<chrono::NaiveDate>,
    pub generation: Option<String>,
    pub comments: Option<String>,
    pub endowed: bool,
    pub birth_date: Option<chrono::NaiveDate>,
    pub photo_taken: bool,
    pub passport: bool,
    pub passport_folio: Option<String>,
    pub fm: Option<String>,
    pub ipad: bool,
    pub closet: Option<String>,
    pub secondary_arrival: Option<chrono::NaiveDate>,
    pub p_day: Option<String>,
    pub host: bool,
    pub three_weeks: bool,
    pub device: bool,
    pub mission_email: Option<String>,
    pub personal_email: Option<String>,
    pub in_person_date: Option<chrono::NaiveDate>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Calendar folder this row was synced from (`YYYYMMDD`), distinct from
    /// the spreadsheet's own `generation` text column. Stamped by C6, never
    /// read from the sheet.
    pub generation_date: String,
}

/// The continuation token persisted by the sync engine. Modeled as a tagged
/// variant instead of a raw opaque string so exhaustiveness is explicit at
/// every call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ContinuationToken {
    #[default]
    None,
    File(String),
}

/// Per-generation sync progress, exclusively owned by the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncState {
    pub generation_date: String,
    pub last_processed_file_id: Option<String>,
    pub continuation_token: ContinuationToken,
}

/// Totals and breakdown returned by a sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub inserted: u64,
    pub skipped: u64,
    pub duration_seconds: f64,
    pub continuation_token: ContinuationToken,
    pub files: Vec<FileSyncOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSyncOutcome {
    pub file_id: String,
    pub file_name: String,
    pub inserted: u64,
    pub skipped: u64,
}

/// One row of `BranchSummary`: a district's aggregate counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistrictKpi {
    pub district: String,
    pub total_missionaries: i64,
    pub first_arrival: Option<chrono::NaiveDate>,
    pub last_departure: Option<chrono::NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchSummary {
    pub branch_id: String,
    pub generation_date: String,
    pub total_missionaries: i64,
    pub districts: Vec<DistrictKpi>,
}

impl BranchSummary {
    /// Validate the aggregate invariant: `total_missionaries == sum(district_counts)`.
    pub fn validate(&self) -> Result<(), crate::error::CoreError> {
        let sum: i64 = self.districts.iter().map(|d| d.total_missionaries).sum();
        if sum != self.total_missionaries {
            return Err(crate::error::CoreError::InvalidTotalMissionaries);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpcomingArrival {
    pub arrival_date: chrono::NaiveDate,
    pub district: String,
    pub count: i64,
    pub max_departure: Option<chrono::NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpcomingBirthday {
    pub month: u32,
    pub day: u32,
    pub treatment: Option<String>,
    pub name: String,
}

/// Metadata attached to every dataset a pipeline produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub generation_date: String,
    pub built_at: DateTime<Utc>,
    pub row_count: usize,
    pub cache_key: String,
}

/// Generic single-payload response wrapper, matching the shape used across
/// every trigger endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataResponse<T> {
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Body of `POST /process-emails`'s `result` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessEmailsSummary {
    pub processed: usize,
    pub errors: usize,
    pub details: Vec<ProcessingResult>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
}

impl ProcessEmailsSummary {
    pub fn from_results(results: Vec<ProcessingResult>, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        let errors = results.iter().filter(|r| !r.success).count();
        let processed = results.iter().filter(|r| r.success).count();
        Self {
            processed,
            errors,
            details: results,
            start_time,
            end_time,
            duration_seconds: (end_time - start_time).num_milliseconds() as f64 / 1000.0,
        }
    }
}

/// Request body for `POST /extraccion_generacion`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtraccionGeneracionRequest {
    pub fecha_generacion: String,
    pub drive_folder_id: String,
    #[serde(default)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_date_requires_valid_gregorian_date() {
        assert!(GenerationDate::parse("20250110").is_some());
        assert!(GenerationDate::parse("20250230").is_none());
        assert!(GenerationDate::parse("2025011").is_none());
        assert!(GenerationDate::parse("abcdefgh").is_none());
    }

    #[test]
    fn processing_result_success_invariant() {
        let mut result = ProcessingResult::failed("m1".into(), "subj".into(), vec![]);
        result.success = true;
        result.generation_date = Some("20250110".into());
        result.attachments_count = 1;
        result.uploaded_files.push(StoredFile {
            id: "f1".into(),
            name: "a.pdf".into(),
            folder_id: "folder".into(),
            view_link: "https://view".into(),
            download_link: "https://download".into(),
        });
        assert!(result.is_consistent());

        result.attachments_count = 2;
        assert!(!result.is_consistent());
    }

    #[test]
    fn branch_summary_validates_sum_invariant() {
        let summary = BranchSummary {
            branch_id: "b1".into(),
            generation_date: "20250110".into(),
            total_missionaries: 5,
            districts: vec![
                DistrictKpi {
                    district: "d1".into(),
                    total_missionaries: 2,
                    first_arrival: None,
                    last_departure: None,
                },
                DistrictKpi {
                    district: "d2".into(),
                    total_missionaries: 3,
                    first_arrival: None,
                    last_departure: None,
                },
            ],
        };
        assert!(summary.validate().is_ok());

        let mut broken = summary.clone();
        broken.total_missionaries = 10;
        assert!(broken.validate().is_err());
    }
}
