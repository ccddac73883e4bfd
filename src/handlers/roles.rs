// src/handlers/roles.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    catalogs::ExportColumn,
    common::{error::ApiError, query_params::parse_pairs},
    config::AppState,
    db::rbac_repo::ROLES_INDEX,
    handlers::{format_param, list_query, selected_ids},
    middleware::{
        auth::AuthenticatedUser,
        i18n::Locale,
        json::AppJson,
        rbac::{
            PermRolesCreate, PermRolesDelete, PermRolesExport, PermRolesUpdate, PermRolesView, PermissionDef,
            RequirePermission,
        },
    },
    models::{
        audit::Actor,
        rbac::{RoleDetail, RoleForm, RolePayload},
        view::{BulkActionKind, BulkRequest, BulkResponse, SetActivePayload},
    },
    services::export_service::{ExportFile, ExportFormat},
};

static ROLE_EXPORT: &[ExportColumn] = &[
    ExportColumn { key: "name", header: "Nombre" },
    ExportColumn { key: "description", header: "Descripción" },
    ExportColumn { key: "is_active", header: "Activo" },
    ExportColumn { key: "permissions_count", header: "Permisos" },
    ExportColumn { key: "users_count", header: "Usuarios" },
    ExportColumn { key: "created_at", header: "Creado" },
    ExportColumn { key: "updated_at", header: "Actualizado" },
];

#[derive(Debug, Deserialize)]
pub struct DestroyParams {
    #[serde(default)]
    pub force: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index).post(store))
        .route("/create", get(create))
        .route("/export", get(export))
        .route("/selected", get(selected))
        .route("/bulk", post(bulk))
        .route("/{id}", get(show).put(update).delete(destroy))
        .route("/{id}/edit", get(edit))
        .route("/{id}/active", patch(set_active))
}

#[utoipa::path(
    get,
    path = "/api/roles",
    tag = "RBAC",
    params(
        ("q" = Option<String>, Query, description = "Busca por nome ou descrição"),
        ("page" = Option<u32>, Query, description = "Página (1..)"),
        ("per_page" = Option<u32>, Query, description = "Itens por página"),
        ("sort" = Option<String>, Query, description = "name | is_active | users_count | permissions_count | created_at | updated_at"),
        ("dir" = Option<String>, Query, description = "asc | desc")
    ),
    responses(
        (status = 200, description = "Listagem paginada de papéis"),
        (status = 422, description = "Parâmetros de listagem inválidos")
    ),
    security(("api_jwt" = []))
)]
pub async fn index(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<PermRolesView>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, ApiError> {
    let query = list_query(&parse_pairs(pairs), &ROLES_INDEX)
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let page = app_state
        .rbac_service
        .index(query)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/api/roles/create",
    tag = "RBAC",
    responses((status = 200, description = "Formulário de criação", body = RoleForm)),
    security(("api_jwt" = []))
)]
pub async fn create(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<PermRolesCreate>,
) -> Result<impl IntoResponse, ApiError> {
    let form = app_state
        .rbac_service
        .form(None)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(form))
}

#[utoipa::path(
    post,
    path = "/api/roles",
    tag = "RBAC",
    request_body = RolePayload,
    responses(
        (status = 201, description = "Papel criado", body = RoleDetail),
        (status = 422, description = "Nome duplicado ou permissões desconhecidas")
    ),
    security(("api_jwt" = []))
)]
pub async fn store(
    State(app_state): State<AppState>,
    locale: Locale,
    actor: Actor,
    _guard: RequirePermission<PermRolesCreate>,
    AppJson(payload): AppJson<RolePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let created = app_state
        .rbac_service
        .store(payload, &actor)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/api/roles/export",
    tag = "RBAC",
    params(("format" = Option<String>, Query, description = "csv | xlsx | json | pdf")),
    responses(
        (status = 200, description = "Arquivo para download"),
        (status = 422, description = "Formato desconhecido")
    ),
    security(("api_jwt" = []))
)]
pub async fn export(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<PermRolesExport>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<ExportFile, ApiError> {
    let params = parse_pairs(pairs);
    let format = ExportFormat::parse(format_param(&params))
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;
    let query = list_query(&params, &ROLES_INDEX)
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let rows = app_state
        .rbac_service
        .export_rows(&query, app_state.export_service.max_rows())
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    app_state
        .export_service
        .export("roles", "Roles", ROLE_EXPORT, &rows, format)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))
}

#[utoipa::path(
    get,
    path = "/api/roles/selected",
    tag = "RBAC",
    params(("ids[]" = Vec<Uuid>, Query, description = "IDs na ordem desejada")),
    responses((status = 200, description = "Papéis encontrados, na ordem pedida")),
    security(("api_jwt" = []))
)]
pub async fn selected(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<PermRolesView>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, ApiError> {
    let ids = selected_ids(&parse_pairs(pairs))
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let rows = app_state
        .rbac_service
        .selected(&ids)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(json!({ "rows": rows })))
}

#[utoipa::path(
    post,
    path = "/api/roles/bulk",
    tag = "RBAC",
    request_body = BulkRequest,
    responses((status = 200, description = "Processados e omitidos (com motivo)", body = BulkResponse)),
    security(("api_jwt" = []))
)]
pub async fn bulk(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    actor: Actor,
    AppJson(payload): AppJson<BulkRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let permission = match payload.action {
        BulkActionKind::Delete => PermRolesDelete::slug(),
        _ => PermRolesUpdate::slug(),
    };
    app_state
        .rbac_service
        .authorize(user.0.id, &permission)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let response = app_state
        .rbac_service
        .bulk(payload, &actor)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(response))
}

#[utoipa::path(
    get,
    path = "/api/roles/{id}",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "ID do papel")),
    responses(
        (status = 200, description = "Papel com permissões", body = RoleDetail),
        (status = 404, description = "Papel não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn show(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<PermRolesView>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let role = app_state
        .rbac_service
        .show(id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(role))
}

#[utoipa::path(
    get,
    path = "/api/roles/{id}/edit",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "ID do papel")),
    responses((status = 200, description = "Formulário de edição", body = RoleForm)),
    security(("api_jwt" = []))
)]
pub async fn edit(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<PermRolesUpdate>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let form = app_state
        .rbac_service
        .form(Some(id))
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(form))
}

#[utoipa::path(
    put,
    path = "/api/roles/{id}",
    tag = "RBAC",
    request_body = RolePayload,
    params(("id" = Uuid, Path, description = "ID do papel")),
    responses(
        (status = 200, description = "Papel atualizado", body = RoleDetail),
        (status = 409, description = "Alterado por outro usuário"),
        (status = 422, description = "Papel protegido não pode ser renomeado")
    ),
    security(("api_jwt" = []))
)]
pub async fn update(
    State(app_state): State<AppState>,
    locale: Locale,
    actor: Actor,
    _guard: RequirePermission<PermRolesUpdate>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<RolePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = app_state
        .rbac_service
        .update(id, payload, &actor)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(updated))
}

#[utoipa::path(
    patch,
    path = "/api/roles/{id}/active",
    tag = "RBAC",
    request_body = SetActivePayload,
    params(("id" = Uuid, Path, description = "ID do papel")),
    responses(
        (status = 200, description = "Estado alterado (ou já estava assim)", body = RoleDetail),
        (status = 422, description = "Papel protegido, com usuários ou último administrador")
    ),
    security(("api_jwt" = []))
)]
pub async fn set_active(
    State(app_state): State<AppState>,
    locale: Locale,
    actor: Actor,
    _guard: RequirePermission<PermRolesUpdate>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<SetActivePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = app_state
        .rbac_service
        .set_active(id, payload.active, &actor)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/api/roles/{id}",
    tag = "RBAC",
    params(
        ("id" = Uuid, Path, description = "ID do papel"),
        ("force" = Option<bool>, Query, description = "Remove também as permissões vinculadas")
    ),
    responses(
        (status = 200, description = "Papel excluído"),
        (status = 422, description = "Exclusão bloqueada por regra de negócio")
    ),
    security(("api_jwt" = []))
)]
pub async fn destroy(
    State(app_state): State<AppState>,
    locale: Locale,
    actor: Actor,
    _guard: RequirePermission<PermRolesDelete>,
    Path(id): Path<Uuid>,
    Query(params): Query<DestroyParams>,
) -> Result<impl IntoResponse, ApiError> {
    let flash = app_state
        .rbac_service
        .destroy(id, params.force, &actor)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(json!({ "flash": flash })))
}
