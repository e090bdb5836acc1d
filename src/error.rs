//! Stable error-code taxonomy (C11) and the HTTP-facing `ApiError` wrapper.
//!
//! Every variant corresponds to one of the stable string codes named in
//! the error handling design: structural validation, table content, upload,
//! sync transport, sync data, and runtime errors. `code()` is what gets
//! written into `ProcessingResult.validation_errors` / `upload_errors` and
//! into structured log lines.

use rocket::http::Status;
use rocket::response::{self, Responder};
use rocket::{Request, Response};
use serde::Serialize;
use std::io::Cursor;

#[derive(Debug, Clone, thiserror::Error)]
pub enum CoreError {
    #[error("subject does not match configured pattern")]
    SubjectPatternMismatch,
    #[error("message has no attachments")]
    AttachmentsMissing,
    #[error("fecha_generacion is required")]
    FechaGeneracionMissing,
    #[error("message body has no HTML content")]
    HtmlMissing,
    #[error("column missing: {0}")]
    ColumnMissing(String),
    #[error("value missing: {col}:{row}")]
    ValueMissing { col: String, row: usize },
    #[error("row overflow at index {0}")]
    RowOverflow(usize),
    #[error("drive folder missing")]
    DriveFolderMissing,
    #[error("drive upload failed: {0}")]
    DriveUploadFailed(String),
    #[error("attachment has no data")]
    DriveAttachmentWithoutData,
    #[error("drive listing failed: {0}")]
    DriveListingFailed(String),
    #[error("drive download failed: {0}")]
    DriveDownloadFailed(String),
    #[error("excel read failed: {0}")]
    ExcelReadFailed(String),
    #[error("database connection failed: {0}")]
    DbConnectionFailed(String),
    #[error("database insert failed: {0}")]
    DbInsertFailed(String),
    #[error("subscriber failed: {0}")]
    SubscriberFailed(String),
    #[error("sync already in progress for this generation")]
    SyncInProgress,
    #[error("mail fetch failed: {0}")]
    MailFetchFailed(String),
    #[error("row missing id")]
    IdMissing,
    #[error("row missing name")]
    NameMissing,
    #[error("date invalid: {0}")]
    DateInvalid(String),
    #[error("row is empty")]
    RowEmpty,
    #[error("invalid total missionaries for branch summary")]
    InvalidTotalMissionaries,
    #[error("configuration error: {0}")]
    ConfigInvalid(String),
}

impl CoreError {
    /// The stable string code used in logs and per-message outcomes.
    pub fn code(&self) -> String {
        match self {
            CoreError::SubjectPatternMismatch => "subject_pattern_mismatch".to_string(),
            CoreError::AttachmentsMissing => "attachments_missing".to_string(),
            CoreError::FechaGeneracionMissing => "fecha_generacion_missing".to_string(),
            CoreError::HtmlMissing => "html_missing".to_string(),
            CoreError::ColumnMissing(col) => format!("column_missing:{col}"),
            CoreError::ValueMissing { col, row } => format!("value_missing:{col}:{row}"),
            CoreError::RowOverflow(idx) => format!("row_overflow:{idx}"),
            CoreError::DriveFolderMissing => "drive_folder_missing".to_string(),
            CoreError::DriveUploadFailed(_) => "drive_upload_failed".to_string(),
            CoreError::DriveAttachmentWithoutData => "drive_attachment_without_data".to_string(),
            CoreError::DriveListingFailed(_) => "drive_listing_failed".to_string(),
            CoreError::DriveDownloadFailed(_) => "drive_download_failed".to_string(),
            CoreError::ExcelReadFailed(_) => "excel_read_failed".to_string(),
            CoreError::DbConnectionFailed(_) => "db_connection_failed".to_string(),
            CoreError::DbInsertFailed(_) => "db_insert_failed".to_string(),
            CoreError::SubscriberFailed(_) => "subscriber_failed".to_string(),
            CoreError::SyncInProgress => "sync_in_progress".to_string(),
            CoreError::MailFetchFailed(_) => "mail_fetch_failed".to_string(),
            CoreError::IdMissing => "id_missing".to_string(),
            CoreError::NameMissing => "name_missing".to_string(),
            CoreError::DateInvalid(field) => format!("date_invalid:{field}"),
            CoreError::RowEmpty => "row_empty".to_string(),
            CoreError::InvalidTotalMissionaries => "invalid_total_missionaries".to_string(),
            CoreError::ConfigInvalid(_) => "config_invalid".to_string(),
        }
    }

    /// True for errors that block marking a message processed (structural
    /// validation and upload failures); false for soft table-content errors
    /// that still allow best-effort upload to proceed.
    pub fn blocks_marking(&self) -> bool {
        matches!(
            self,
            CoreError::SubjectPatternMismatch
                | CoreError::AttachmentsMissing
                | CoreError::FechaGeneracionMissing
                | CoreError::HtmlMissing
                | CoreError::DriveFolderMissing
                | CoreError::DriveUploadFailed(_)
                | CoreError::DriveAttachmentWithoutData
        )
    }
}

/// Wraps orchestration-level failures that prevent a trigger endpoint from
/// running at all. Per-item errors travel inside the `200` response body
/// instead (see `model::ProcessingResult`).
#[derive(Debug)]
pub struct ApiError(pub String);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err.to_string())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        log::error!("database error: {err}");
        ApiError("database error".to_string())
    }
}

#[derive(Serialize)]
struct DetailBody {
    detail: String,
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        log::error!("request failed: {}", self.0);
        let json = serde_json::to_string(&DetailBody { detail: self.0 })
            .unwrap_or_else(|_| r#"{"detail":"internal error"}"#.to_string());

        Response::build()
            .status(Status::InternalServerError)
            .header(rocket::http::ContentType::JSON)
            .sized_body(json.len(), Cursor::new(json))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_spec_strings() {
        assert_eq!(CoreError::SubjectPatternMismatch.code(), "subject_pattern_mismatch");
        assert_eq!(
            CoreError::ColumnMissing("district".into()).code(),
            "column_missing:district"
        );
        assert_eq!(
            CoreError::ValueMissing { col: "name".into(), row: 3 }.code(),
            "value_missing:name:3"
        );
        assert_eq!(CoreError::RowOverflow(4).code(), "row_overflow:4");
        assert_eq!(CoreError::DateInvalid("birth_date".into()).code(), "date_invalid:birth_date");
    }
}
