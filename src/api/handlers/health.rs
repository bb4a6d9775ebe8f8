use crate::AppState;
use crate::services::process::tool_available;
use axum::{Json, extract::State, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct ToolStatus {
    pub libreoffice: bool,
    pub ghostscript: bool,
    pub pdftoppm: bool,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub staging: String,
    pub tools: ToolStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.service.config();
    let staging_status = match tokio::fs::metadata(state.service.staging().root()).await {
        Ok(meta) if meta.is_dir() => "available",
        _ => "unavailable",
    };

    let tools = ToolStatus {
        libreoffice: tool_available(&config.libreoffice_bin),
        ghostscript: tool_available(&config.ghostscript_bin),
        pdftoppm: tool_available(&config.pdftoppm_bin),
    };

    // Missing tools only disable their endpoints
    let status = if staging_status == "available" {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        staging: staging_status.to_string(),
        tools,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}
