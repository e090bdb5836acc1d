//! `POST /extraccion_generacion`: triggers C6 for a given generation folder.

use crate::error::ApiError;
use crate::models::{ExtraccionGeneracionRequest, SyncReport};
use crate::orchestrator::Orchestrator;
use rocket::serde::json::Json;
use rocket::State;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ExtraccionGeneracionResponse {
    pub success: bool,
    pub report: SyncReport,
}

#[post("/extraccion_generacion", data = "<body>")]
pub async fn extraccion_generacion(
    orchestrator: &State<Orchestrator>,
    body: Json<ExtraccionGeneracionRequest>,
) -> Result<Json<ExtraccionGeneracionResponse>, ApiError> {
    let report = orchestrator
        .sync_generation(&body.fecha_generacion, &body.drive_folder_id, body.force)
        .await?;

    Ok(Json(ExtraccionGeneracionResponse {
        success: true,
        report,
    }))
}
