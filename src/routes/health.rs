//! Liveness endpoint used for readiness checks and tests.

use rocket::serde::json::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

#[get("/health")]
pub fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "arrival-sync",
        version: env!("CARGO_PKG_VERSION"),
    })
}
