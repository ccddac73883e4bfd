// src/handlers/audits.rs

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use crate::{
    catalogs::ExportColumn,
    common::{error::ApiError, query_params::parse_pairs},
    config::AppState,
    db::audit_repo::AUDITS_INDEX,
    handlers::{format_param, list_query},
    middleware::{
        i18n::Locale,
        rbac::{PermAuditsExport, PermAuditsView, RequirePermission},
    },
    models::audit::Audit,
    services::export_service::{ExportFile, ExportFormat},
};

static AUDIT_EXPORT: &[ExportColumn] = &[
    ExportColumn { key: "created_at", header: "Fecha" },
    ExportColumn { key: "event", header: "Evento" },
    ExportColumn { key: "auditable_type", header: "Modelo" },
    ExportColumn { key: "auditable_id", header: "Registro" },
    ExportColumn { key: "user_email", header: "Usuario" },
    ExportColumn { key: "ip_address", header: "IP" },
    ExportColumn { key: "url", header: "URL" },
];

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/export", get(export))
        .route("/{id}", get(show))
}

#[utoipa::path(
    get,
    path = "/api/audits",
    tag = "Audits",
    params(
        ("q" = Option<String>, Query, description = "Busca por modelo, URL ou usuário"),
        ("page" = Option<u32>, Query, description = "Página (1..)"),
        ("per_page" = Option<u32>, Query, description = "Itens por página"),
        ("sort" = Option<String>, Query, description = "created_at | event | auditable_type"),
        ("dir" = Option<String>, Query, description = "asc | desc")
    ),
    responses(
        (status = 200, description = "Log de auditoria paginado"),
        (status = 422, description = "Parâmetros de listagem inválidos")
    ),
    security(("api_jwt" = []))
)]
pub async fn index(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<PermAuditsView>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, ApiError> {
    let query = list_query(&parse_pairs(pairs), &AUDITS_INDEX)
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let page = app_state
        .audit_service
        .index(query)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/api/audits/export",
    tag = "Audits",
    params(("format" = Option<String>, Query, description = "csv | xlsx | json | pdf")),
    responses((status = 200, description = "Arquivo para download")),
    security(("api_jwt" = []))
)]
pub async fn export(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<PermAuditsExport>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<ExportFile, ApiError> {
    let params = parse_pairs(pairs);
    let format = ExportFormat::parse(format_param(&params))
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;
    let query = list_query(&params, &AUDITS_INDEX)
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let rows = app_state
        .audit_service
        .export_rows(&query, app_state.export_service.max_rows())
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    app_state
        .export_service
        .export("audits", "Auditoría", AUDIT_EXPORT, &rows, format)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))
}

#[utoipa::path(
    get,
    path = "/api/audits/{id}",
    tag = "Audits",
    params(("id" = Uuid, Path, description = "ID da entrada")),
    responses(
        (status = 200, description = "Entrada com valores antigos e novos", body = Audit),
        (status = 404, description = "Entrada não encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn show(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<PermAuditsView>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let audit = app_state
        .audit_service
        .show(id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(audit))
}
