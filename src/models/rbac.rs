// src/models/rbac.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Papel criado pela migration e atribuído ao primeiro usuário registrado.
pub const ADMIN_ROLE_NAME: &str = "Administrador";

/// Quem tem todas estas permissões é considerado um papel administrador.
pub const CRITICAL_PERMISSIONS: &[&str] = &["roles.view", "roles.create", "roles.update", "roles.delete"];

// O que sai do banco (Tabela Roles)
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Role {
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: Uuid,

    #[schema(example = "Supervisor de Mercados")]
    pub name: String,

    #[schema(example = "Gestiona mercados y locales")]
    pub description: Option<String>,

    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Linha da listagem, com contadores
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct RoleListItem {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub permissions_count: i64,
    pub users_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// O que sai do banco (Tabela Permissions)
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Permission {
    #[schema(example = "550e8400-e29b-41d4-a716-446655440001")]
    pub id: Uuid,

    #[schema(example = "banks.view")]
    pub slug: String,

    #[schema(example = "Ver bancos")]
    pub description: String,

    #[schema(example = "banks")]
    pub module: String,
}

// Permissões agrupadas por módulo, para a tela de edição de papel
#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionGroup {
    pub module: String,
    pub permissions: Vec<Permission>,
}

// Resposta completa (Cargo + Lista de Permissões)
#[derive(Debug, Serialize, ToSchema)]
pub struct RoleDetail {
    #[serde(flatten)]
    pub role: Role,

    #[schema(example = json!(["banks.view", "banks.update"]))]
    pub permissions: Vec<String>,

    pub users_count: i64,
    pub is_protected: bool,
}

// Tela de criação/edição de papel: o papel (se houver) e o catálogo de permissões
#[derive(Debug, Serialize, ToSchema)]
pub struct RoleForm {
    pub item: Option<RoleDetail>,
    pub permissions: Vec<PermissionGroup>,
}

// Payload de criação/edição
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RolePayload {
    #[validate(length(min = 1, max = 100, message = "El nombre es obligatorio (máximo 100 caracteres)."))]
    #[schema(example = "Supervisor de Mercados")]
    pub name: String,

    #[validate(length(max = 255, message = "La descripción no puede superar 255 caracteres."))]
    pub description: Option<String>,

    pub is_active: Option<bool>,

    #[serde(default)]
    #[schema(example = json!(["markets.view", "locals.view"]))]
    pub permissions: Vec<String>,

    #[serde(rename = "_version")]
    pub version: Option<DateTime<Utc>>,
}

// Snapshot usado pela partição de ações em massa
#[derive(Debug, Clone, FromRow)]
pub struct RoleCandidate {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub users_count: i64,
    pub permissions_count: i64,
    pub is_admin: bool,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SyncUserRolesPayload {
    #[serde(default)]
    pub roles: Vec<Uuid>,
}
