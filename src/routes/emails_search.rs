//! `GET /emails/search`: debug read-through to the mail gateway's
//! unprocessed-message listing.

use crate::error::ApiError;
use crate::orchestrator::Orchestrator;
use rocket::serde::json::Json;
use rocket::State;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct EmailSummary {
    pub message_id: String,
}

#[derive(Debug, Serialize)]
pub struct EmailSearchResponse {
    pub success: bool,
    pub emails: Vec<EmailSummary>,
}

#[get("/emails/search?<query>")]
pub async fn search_emails(
    orchestrator: &State<Orchestrator>,
    query: Option<&str>,
) -> Result<Json<EmailSearchResponse>, ApiError> {
    let refs = orchestrator.search_messages(query).await?;
    let emails = refs
        .into_iter()
        .map(|message_ref| EmailSummary {
            message_id: message_ref.0,
        })
        .collect();

    Ok(Json(EmailSearchResponse {
        success: true,
        emails,
    }))
}
