//! `POST /process-emails`: runs C4 → C2 → C5 once over every unprocessed
//! message in the configured mailbox.

use crate::error::ApiError;
use crate::models::ProcessEmailsSummary;
use crate::orchestrator::Orchestrator;
use rocket::serde::json::Json;
use rocket::State;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ProcessEmailsResponse {
    pub success: bool,
    pub result: ProcessEmailsSummary,
}

#[post("/process-emails")]
pub async fn process_emails(
    orchestrator: &State<Orchestrator>,
) -> Result<Json<ProcessEmailsResponse>, ApiError> {
    let start_time = chrono::Utc::now();
    let results = orchestrator.process_incoming().await?;
    let end_time = chrono::Utc::now();

    Ok(Json(ProcessEmailsResponse {
        success: true,
        result: ProcessEmailsSummary::from_results(results, start_time, end_time),
    }))
}
