// src/handlers/health.rs

use axum::Json;
use serde_json::{json, Value};
use utoipa::OpenApi;

use crate::docs::ApiDoc;

#[utoipa::path(
    get,
    path = "/api/health",
    tag = "Health",
    responses((status = 200, description = "Serviço no ar"))
)]
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// GET /api/docs/openapi.json
pub async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
