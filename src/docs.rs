// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use crate::handlers;
use crate::models;
use crate::common;

// Os catálogos usam handlers genéricos (`handlers::catalog`), que ficam
// fora do documento; os schemas deles entram abaixo.
#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Health ---
        handlers::health::health,

        // --- Auth ---
        handlers::auth::register,
        handlers::auth::login,

        // --- Users ---
        handlers::auth::get_me,
        handlers::users::sync_roles,

        // --- RBAC ---
        handlers::permissions::list_permissions,
        handlers::roles::index,
        handlers::roles::create,
        handlers::roles::store,
        handlers::roles::export,
        handlers::roles::selected,
        handlers::roles::bulk,
        handlers::roles::show,
        handlers::roles::edit,
        handlers::roles::update,
        handlers::roles::set_active,
        handlers::roles::destroy,

        // --- Audits ---
        handlers::audits::index,
        handlers::audits::export,
        handlers::audits::show,
    ),
    components(
        schemas(
            // --- Auth ---
            models::auth::User,
            models::auth::RegisterUserPayload,
            models::auth::LoginUserPayload,
            models::auth::AuthResponse,
            models::auth::MeResponse,

            // --- Listagem ---
            common::list_query::ListQuery,
            common::list_query::SortDir,
            models::view::PageMeta,
            models::view::Stats,
            models::view::OptionItem,
            models::view::Flash,
            models::view::BulkActionKind,
            models::view::BulkRequest,
            models::view::BulkResponse,
            models::view::SetActivePayload,

            // --- Catálogos ---
            models::catalog::CatalogItem,
            models::catalog::CatalogItemPayload,
            models::catalog::Local,
            models::catalog::LocalPayload,
            models::catalog::Concessionaire,
            models::catalog::ConcessionairePayload,

            // --- RBAC ---
            models::rbac::Role,
            models::rbac::RoleListItem,
            models::rbac::RoleDetail,
            models::rbac::RoleForm,
            models::rbac::RolePayload,
            models::rbac::Permission,
            models::rbac::PermissionGroup,
            models::rbac::SyncUserRolesPayload,

            // --- Audits ---
            models::audit::Audit,
        )
    ),
    tags(
        (name = "Health", description = "Verificação do serviço"),
        (name = "Auth", description = "Autenticação e Registro"),
        (name = "Users", description = "Dados do Usuário e Papéis"),
        (name = "RBAC", description = "Controle de Acesso (Papéis e Permissões)"),
        (name = "Audits", description = "Log de Auditoria")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(
                Http::new(HttpAuthScheme::Bearer)
            ),
        );
    }
}
