// src/handlers/permissions.rs

use axum::{extract::State, response::IntoResponse, Json};

use crate::{
    common::error::ApiError,
    config::AppState,
    middleware::{
        i18n::Locale,
        rbac::{PermRolesView, RequirePermission},
    },
    models::rbac::PermissionGroup,
};

// GET /api/permissions (Para o frontend saber o que mostrar na tela de papéis)
#[utoipa::path(
    get,
    path = "/api/permissions",
    tag = "RBAC",
    responses((status = 200, description = "Permissões agrupadas por módulo", body = Vec<PermissionGroup>)),
    security(("api_jwt" = []))
)]
pub async fn list_permissions(
    State(app_state): State<AppState>,
    locale: Locale,
    _guard: RequirePermission<PermRolesView>,
) -> Result<impl IntoResponse, ApiError> {
    let permissions = app_state
        .rbac_service
        .list_system_permissions()
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(permissions))
}
