// src/handlers/catalog.rs
//
// Handlers genéricos: cada catálogo monta o mesmo conjunto de rotas com
// `routes::<Banks>()`, `routes::<Locals>()`...

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    catalogs::CatalogDef,
    common::{error::ApiError, query_params::parse_pairs},
    config::AppState,
    handlers::{format_param, list_query, selected_ids},
    middleware::{
        auth::AuthenticatedUser,
        i18n::Locale,
        json::AppJson,
        rbac::{Can, Create, Delete, Export, PermissionDef, RequirePermission, Update, View},
    },
    models::{
        audit::Actor,
        view::{BulkActionKind, BulkRequest, SetActivePayload},
    },
    services::export_service::{ExportFile, ExportFormat},
};

pub fn routes<R: CatalogDef>() -> Router<AppState> {
    Router::new()
        .route("/", get(index::<R>).post(store::<R>))
        .route("/create", get(create::<R>))
        .route("/export", get(export::<R>))
        .route("/selected", get(selected::<R>))
        .route("/bulk", post(bulk::<R>))
        .route("/{id}", get(show::<R>).put(update::<R>).delete(destroy::<R>))
        .route("/{id}/edit", get(edit::<R>))
        .route("/{id}/active", patch(set_active::<R>))
}

// GET /api/{r}
pub async fn index<R: CatalogDef>(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<Can<R, View>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, ApiError> {
    let params = parse_pairs(pairs);
    let query = list_query(&params, R::index_config())
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let page = app_state
        .catalog_service
        .index::<R>(query)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(page))
}

// GET /api/{r}/create
pub async fn create<R: CatalogDef>(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<Can<R, Create>>,
) -> Result<impl IntoResponse, ApiError> {
    let form = app_state
        .catalog_service
        .form::<R>(None)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(form))
}

// POST /api/{r}
pub async fn store<R: CatalogDef>(
    State(app_state): State<AppState>,
    locale: Locale,
    actor: Actor,
    _guard: RequirePermission<Can<R, Create>>,
    AppJson(payload): AppJson<R::Payload>,
) -> Result<impl IntoResponse, ApiError> {
    let created = app_state
        .catalog_service
        .store::<R>(payload, &actor)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(created)))
}

// GET /api/{r}/export?format=csv|xlsx|json|pdf
pub async fn export<R: CatalogDef>(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<Can<R, Export>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<ExportFile, ApiError> {
    let params = parse_pairs(pairs);
    let format = ExportFormat::parse(format_param(&params))
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;
    let query = list_query(&params, R::index_config())
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let rows = app_state
        .catalog_service
        .export_rows::<R>(&query, app_state.export_service.max_rows())
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    app_state
        .export_service
        .export(R::SLUG, R::LABEL_PLURAL, R::export_columns(), &rows, format)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))
}

// GET /api/{r}/selected?ids[]=...
pub async fn selected<R: CatalogDef>(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<Can<R, View>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, ApiError> {
    let ids = selected_ids(&parse_pairs(pairs))
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let rows = app_state
        .catalog_service
        .selected::<R>(&ids)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(json!({ "rows": rows })))
}

// POST /api/{r}/bulk
// A permissão depende da ação: excluir pede `delete`, ativar/desativar pede `update`
pub async fn bulk<R: CatalogDef>(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    actor: Actor,
    AppJson(payload): AppJson<BulkRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let permission = match payload.action {
        BulkActionKind::Delete => <Can<R, Delete>>::slug(),
        _ => <Can<R, Update>>::slug(),
    };
    app_state
        .rbac_service
        .authorize(user.0.id, &permission)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let response = app_state
        .catalog_service
        .bulk::<R>(payload, &actor)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(response))
}

// GET /api/{r}/{id}
pub async fn show<R: CatalogDef>(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<Can<R, View>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let row = app_state
        .catalog_service
        .show::<R>(id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(row))
}

// GET /api/{r}/{id}/edit
pub async fn edit<R: CatalogDef>(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<Can<R, Update>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let form = app_state
        .catalog_service
        .form::<R>(Some(id))
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(form))
}

// PUT /api/{r}/{id}
pub async fn update<R: CatalogDef>(
    State(app_state): State<AppState>,
    locale: Locale,
    actor: Actor,
    _guard: RequirePermission<Can<R, Update>>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<R::Payload>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = app_state
        .catalog_service
        .update::<R>(id, payload, &actor)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(updated))
}

// PATCH /api/{r}/{id}/active
pub async fn set_active<R: CatalogDef>(
    State(app_state): State<AppState>,
    locale: Locale,
    actor: Actor,
    _guard: RequirePermission<Can<R, Update>>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<SetActivePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = app_state
        .catalog_service
        .set_active::<R>(id, payload.active, &actor)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(updated))
}

// DELETE /api/{r}/{id}
pub async fn destroy<R: CatalogDef>(
    State(app_state): State<AppState>,
    locale: Locale,
    actor: Actor,
    _guard: RequirePermission<Can<R, Delete>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let flash = app_state
        .catalog_service
        .destroy::<R>(id, &actor)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(json!({ "flash": flash })))
}
