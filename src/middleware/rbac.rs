// src/middleware/rbac.rs

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use std::marker::PhantomData;

use crate::{
    catalogs::CatalogDef,
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::{auth::AuthenticatedUser, i18n::Locale},
};

/// 1. O trait que define o que é uma permissão
pub trait PermissionDef: Send + Sync + 'static {
    fn slug() -> String;
}

/// 2. O extractor (guardião)
pub struct RequirePermission<T>(pub PhantomData<T>);

// 3. Implementação do FromRequestParts
impl<T, S> FromRequestParts<S> for RequirePermission<T>
where
    T: PermissionDef,
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let locale = Locale::from_headers(&parts.headers);

        // A. Extrai o usuário (colocado pelo auth_guard)
        let user = parts
            .extensions
            .get::<AuthenticatedUser>()
            .ok_or_else(|| AppError::InvalidToken.to_api_error(&locale, &app_state.i18n_store))?;

        // B. Verifica no banco
        app_state
            .rbac_service
            .authorize(user.0.id, &T::slug())
            .await
            .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

        Ok(RequirePermission(PhantomData))
    }
}

// ---
// HABILIDADES DOS CATÁLOGOS
// ---

pub trait Ability: Send + Sync + 'static {
    const NAME: &'static str;
}

pub struct View;
impl Ability for View {
    const NAME: &'static str = "view";
}

pub struct Create;
impl Ability for Create {
    const NAME: &'static str = "create";
}

pub struct Update;
impl Ability for Update {
    const NAME: &'static str = "update";
}

pub struct Delete;
impl Ability for Delete {
    const NAME: &'static str = "delete";
}

pub struct Export;
impl Ability for Export {
    const NAME: &'static str = "export";
}

/// `{tabela}.{habilidade}` do catálogo `R`.
pub struct Can<R, A>(PhantomData<(R, A)>);

impl<R: CatalogDef, A: Ability> PermissionDef for Can<R, A> {
    fn slug() -> String {
        R::permission(A::NAME)
    }
}

// ---
// DEFINIÇÃO DAS PERMISSÕES FIXAS (TIPOS)
// ---

macro_rules! permission {
    ($name:ident, $slug:literal) => {
        pub struct $name;
        impl PermissionDef for $name {
            fn slug() -> String {
                $slug.to_string()
            }
        }
    };
}

permission!(PermRolesView, "roles.view");
permission!(PermRolesCreate, "roles.create");
permission!(PermRolesUpdate, "roles.update");
permission!(PermRolesDelete, "roles.delete");
permission!(PermRolesExport, "roles.export");
permission!(PermAuditsView, "audits.view");
permission!(PermAuditsExport, "audits.export");
permission!(PermUsersAssignRoles, "users.assign_roles");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogs::{BusinessLines, Locals};

    #[test]
    fn catalog_abilities_build_table_slugs() {
        assert_eq!(<Can<Locals, View>>::slug(), "locals.view");
        assert_eq!(<Can<BusinessLines, Export>>::slug(), "business_lines.export");
        assert_eq!(PermRolesDelete::slug(), "roles.delete");
    }
}
