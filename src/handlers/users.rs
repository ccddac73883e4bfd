// src/handlers/users.rs

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    common::error::ApiError,
    config::AppState,
    middleware::{
        i18n::Locale,
        json::AppJson,
        rbac::{PermUsersAssignRoles, RequirePermission},
    },
    models::rbac::SyncUserRolesPayload,
};

// PUT /api/users/{id}/roles (substitui todos os papéis do usuário)
#[utoipa::path(
    put,
    path = "/api/users/{id}/roles",
    tag = "Users",
    request_body = SyncUserRolesPayload,
    params(("id" = Uuid, Path, description = "ID do usuário")),
    responses(
        (status = 200, description = "Papéis sincronizados"),
        (status = 404, description = "Usuário não encontrado"),
        (status = 422, description = "Papel inexistente")
    ),
    security(("api_jwt" = []))
)]
pub async fn sync_roles(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<PermUsersAssignRoles>,
    Path(user_id): Path<Uuid>,
    AppJson(payload): AppJson<SyncUserRolesPayload>,
) -> Result<impl IntoResponse, ApiError> {
    // 404 antes de mexer nos papéis
    app_state
        .auth_service
        .find_user(user_id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let roles = app_state
        .rbac_service
        .sync_user_roles(user_id, payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(json!({
        "roles": roles,
        "flash": { "success": "Roles actualizados correctamente." }
    })))
}
