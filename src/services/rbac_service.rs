// src/services/rbac_service.rs

use serde_json::json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::{
        error::AppError,
        list_query::ListQuery,
    },
    db::{AuditRepository, RbacRepository},
    models::{
        audit::{diff_values, Actor, AuditEvent, NewAudit},
        rbac::{
            Permission, PermissionGroup, Role, RoleDetail, RoleForm, RoleListItem, RolePayload, SyncUserRolesPayload,
        },
        view::{BulkRequest, BulkResponse, Flash, IndexPage, Mutation, Options, PageMeta},
    },
    services::{
        bulk::{is_protected, partition_roles, reasons, BulkAction, BulkPartition, RoleRules},
        catalog_service::{keep_order, snapshot},
    },
};

pub const ROLE_AUDIT_TYPE: &str = "Role";

/// Agrupa por módulo mantendo a ordem (módulo, slug) que vem do banco.
pub fn group_permissions(permissions: Vec<Permission>) -> Vec<PermissionGroup> {
    let mut groups: Vec<PermissionGroup> = Vec::new();
    for permission in permissions {
        match groups.last_mut() {
            Some(group) if group.module == permission.module => group.permissions.push(permission),
            _ => groups.push(PermissionGroup { module: permission.module.clone(), permissions: vec![permission] }),
        }
    }
    groups
}

#[derive(Clone)]
pub struct RbacService {
    repo: RbacRepository,
    audit_repo: AuditRepository,
    pool: PgPool,
    protected_roles: Vec<String>,
    enforce_version_check: bool,
}

impl RbacService {
    pub fn new(
        repo: RbacRepository,
        audit_repo: AuditRepository,
        pool: PgPool,
        protected_roles: Vec<String>,
        enforce_version_check: bool,
    ) -> Self {
        Self { repo, audit_repo, pool, protected_roles, enforce_version_check }
    }

    // =========================================================================
    //  AUTORIZAÇÃO
    // =========================================================================

    pub async fn authorize(&self, user_id: Uuid, permission: &str) -> Result<(), AppError> {
        if self.repo.user_has_permission(user_id, permission).await? {
            Ok(())
        } else {
            Err(AppError::Forbidden(permission.to_string()))
        }
    }

    pub async fn list_system_permissions(&self) -> Result<Vec<PermissionGroup>, AppError> {
        let permissions = self.repo.list_all_permissions().await?;
        Ok(group_permissions(permissions))
    }

    // =========================================================================
    //  LEITURA
    // =========================================================================

    pub async fn index(&self, query: ListQuery) -> Result<IndexPage<RoleListItem>, AppError> {
        let (rows, total) = self.repo.list_roles(&query).await?;
        let stats = self.repo.role_stats().await?;

        Ok(IndexPage {
            meta: PageMeta::new(&query, total, rows.len()),
            rows,
            stats: Some(stats),
            query,
            options: Options::new(),
        })
    }

    pub async fn export_rows(&self, query: &ListQuery, limit: i64) -> Result<Vec<RoleListItem>, AppError> {
        self.repo.list_roles_for_export(query, limit).await
    }

    async fn detail(&self, conn: &mut PgConnection, role: Role) -> Result<RoleDetail, AppError> {
        let permissions = self.repo.role_permission_slugs(&mut *conn, role.id).await?;
        let users_count = self.repo.role_users_count(&mut *conn, role.id).await?;
        let is_protected = is_protected(&role.name, &self.protected_roles);
        Ok(RoleDetail { role, permissions, users_count, is_protected })
    }

    pub async fn show(&self, id: Uuid) -> Result<RoleDetail, AppError> {
        let mut conn = self.pool.acquire().await?;
        let role = self.repo.find_role(&mut *conn, id).await?.ok_or(AppError::NotFound)?;
        self.detail(&mut conn, role).await
    }

    pub async fn form(&self, id: Option<Uuid>) -> Result<RoleForm, AppError> {
        let item = match id {
            Some(id) => Some(self.show(id).await?),
            None => None,
        };
        let permissions = self.list_system_permissions().await?;
        Ok(RoleForm { item, permissions })
    }

    pub async fn selected(&self, ids: &[Uuid]) -> Result<Vec<RoleDetail>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let mut details = Vec::with_capacity(ids.len());
        for id in keep_order(ids, ids.to_vec(), |id| *id) {
            if let Some(role) = self.repo.find_role(&mut *conn, id).await? {
                details.push(self.detail(&mut conn, role).await?);
            }
        }
        Ok(details)
    }

    // =========================================================================
    //  ESCRITA
    // =========================================================================

    // Slugs desconhecidos viram erro no campo `permissions`
    async fn resolve_permissions(&self, conn: &mut PgConnection, slugs: &[String]) -> Result<Vec<Permission>, AppError> {
        let mut wanted: Vec<String> = slugs.iter().map(|s| s.trim().to_string()).collect();
        wanted.sort();
        wanted.dedup();

        let found = self.repo.find_permissions_by_slugs(&mut *conn, &wanted).await?;
        let unknown: Vec<&str> = wanted
            .iter()
            .filter(|slug| !found.iter().any(|p| &p.slug == *slug))
            .map(String::as_str)
            .collect();

        if !unknown.is_empty() {
            return Err(AppError::field("permissions", format!("Permisos desconocidos: {}.", unknown.join(", "))));
        }
        Ok(found)
    }

    async fn check_name(&self, conn: &mut PgConnection, name: &str, except: Option<Uuid>) -> Result<(), AppError> {
        if self.repo.role_name_taken(&mut *conn, name, except).await? {
            return Err(AppError::field("name", "Ya existe un rol con ese nombre."));
        }
        Ok(())
    }

    pub async fn store(&self, payload: RolePayload, actor: &Actor) -> Result<Mutation<RoleDetail>, AppError> {
        payload.validate()?;
        let name = payload.name.trim().to_string();

        // 1. Inicia transação
        let mut tx = self.pool.begin().await?;
        self.check_name(&mut tx, &name, None).await?;

        // 2. Resolve slugs para ids
        let permissions = self.resolve_permissions(&mut tx, &payload.permissions).await?;
        let permission_ids: Vec<Uuid> = permissions.iter().map(|p| p.id).collect();

        // 3. Cria o papel e salva o vínculo
        let role = self
            .repo
            .create_role(&mut *tx, &name, payload.description.as_deref(), payload.is_active.unwrap_or(true))
            .await?;
        self.repo.sync_permissions(&mut tx, role.id, &permission_ids).await?;

        let detail = self.detail(&mut tx, role).await?;
        self.audit_repo
            .record(
                &mut tx,
                NewAudit {
                    event: AuditEvent::Created,
                    auditable_type: ROLE_AUDIT_TYPE,
                    auditable_id: detail.role.id,
                    old_values: json!({}),
                    new_values: snapshot(&detail)?,
                },
                actor,
            )
            .await?;

        // 4. Commit
        tx.commit().await?;
        tracing::info!("🔐 Papel {} criado com {} permissões", detail.role.name, detail.permissions.len());

        Ok(Mutation { data: detail, flash: Flash::success("Rol creado correctamente.") })
    }

    pub async fn update(&self, id: Uuid, payload: RolePayload, actor: &Actor) -> Result<Mutation<RoleDetail>, AppError> {
        payload.validate()?;
        let name = payload.name.trim().to_string();

        let mut tx = self.pool.begin().await?;
        let existing = self.repo.find_role(&mut *tx, id).await?.ok_or(AppError::NotFound)?;

        if self.enforce_version_check {
            if let Some(version) = payload.version {
                if version.timestamp_micros() != existing.updated_at.timestamp_micros() {
                    return Err(AppError::VersionConflict);
                }
            }
        }

        let renamed = !existing.name.trim().eq_ignore_ascii_case(&name);
        if renamed && is_protected(&existing.name, &self.protected_roles) {
            return Err(AppError::rule("name", "No se puede renombrar un rol protegido."));
        }
        if renamed {
            self.check_name(&mut tx, &name, Some(id)).await?;
        }

        let before = self.detail(&mut tx, existing).await?;
        let permissions = self.resolve_permissions(&mut tx, &payload.permissions).await?;
        let permission_ids: Vec<Uuid> = permissions.iter().map(|p| p.id).collect();

        let role = self
            .repo
            .update_role(&mut *tx, id, &name, payload.description.as_deref(), payload.is_active)
            .await?
            .ok_or(AppError::NotFound)?;
        self.repo.sync_permissions(&mut tx, id, &permission_ids).await?;

        let after = self.detail(&mut tx, role).await?;
        let (old_values, new_values) = diff_values(&snapshot(&before)?, &snapshot(&after)?);
        if new_values.as_object().is_some_and(|changes| !changes.is_empty()) {
            self.audit_repo
                .record(
                    &mut tx,
                    NewAudit { event: AuditEvent::Updated, auditable_type: ROLE_AUDIT_TYPE, auditable_id: id, old_values, new_values },
                    actor,
                )
                .await?;
        }

        tx.commit().await?;
        Ok(Mutation { data: after, flash: Flash::success("Rol actualizado correctamente.") })
    }

    async fn partition(&self, ids: &[Uuid], action: BulkAction, force: bool) -> Result<BulkPartition, AppError> {
        let candidates = self.repo.role_candidates(ids).await?;
        let admin_totals = self.repo.admin_totals().await?;

        Ok(partition_roles(
            ids,
            &candidates,
            RoleRules { action, force, protected: &self.protected_roles, admin_totals },
        ))
    }

    async fn write_action(&self, id: Uuid, action: BulkAction, actor: &Actor) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        let existing = self.repo.find_role(&mut *tx, id).await?.ok_or(AppError::NotFound)?;

        let audit = match action {
            BulkAction::Delete => {
                let before = self.detail(&mut tx, existing).await?;
                // `force`: as permissões saem junto
                self.repo.sync_permissions(&mut tx, id, &[]).await?;
                self.repo.soft_delete_role(&mut *tx, id).await?;
                NewAudit {
                    event: AuditEvent::Deleted,
                    auditable_type: ROLE_AUDIT_TYPE,
                    auditable_id: id,
                    old_values: snapshot(&before)?,
                    new_values: json!({}),
                }
            }
            BulkAction::SetActive(active) => {
                self.repo.set_role_active(&mut *tx, id, active).await?;
                NewAudit {
                    event: AuditEvent::for_active(active),
                    auditable_type: ROLE_AUDIT_TYPE,
                    auditable_id: id,
                    old_values: json!({ "is_active": existing.is_active }),
                    new_values: json!({ "is_active": active }),
                }
            }
        };

        self.audit_repo.record(&mut tx, audit, actor).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn set_active(&self, id: Uuid, active: bool, actor: &Actor) -> Result<Mutation<RoleDetail>, AppError> {
        let action = BulkAction::SetActive(active);
        let partition = self.partition(&[id], action, false).await?;

        if let Some(reason) = partition.skipped.get(&id) {
            if reason == reasons::ALREADY_ACTIVE || reason == reasons::ALREADY_INACTIVE {
                return Ok(Mutation { data: self.show(id).await?, flash: Flash::info(reason.clone()) });
            }
        }
        partition.into_single(id)?;

        self.write_action(id, action, actor).await?;
        let flash = if active { Flash::success("Rol activado.") } else { Flash::success("Rol desactivado.") };
        Ok(Mutation { data: self.show(id).await?, flash })
    }

    pub async fn destroy(&self, id: Uuid, force: bool, actor: &Actor) -> Result<Flash, AppError> {
        self.partition(&[id], BulkAction::Delete, force).await?.into_single(id)?;
        self.write_action(id, BulkAction::Delete, actor).await?;
        tracing::info!("🗑️ Papel {} excluído", id);
        Ok(Flash::success("Rol eliminado correctamente."))
    }

    pub async fn bulk(&self, request: BulkRequest, actor: &Actor) -> Result<BulkResponse, AppError> {
        request.validate()?;
        let action = BulkAction::try_from(&request)?;

        let mut partition = self.partition(&request.ids, action, request.force).await?;

        let mut processed = Vec::with_capacity(partition.applicable.len());
        for id in std::mem::take(&mut partition.applicable) {
            match self.write_action(id, action, actor).await {
                Ok(()) => processed.push(id),
                Err(e) => {
                    tracing::warn!("Ação em massa falhou para o papel {}: {:?}", id, e);
                    partition.skipped.insert(id, "Error al procesar".to_string());
                }
            }
        }

        Ok(BulkResponse::new(processed, partition.skipped))
    }

    // =========================================================================
    //  PAPÉIS DO USUÁRIO
    // =========================================================================

    pub async fn sync_user_roles(&self, user_id: Uuid, payload: SyncUserRolesPayload) -> Result<Vec<Uuid>, AppError> {
        let mut wanted = payload.roles;
        wanted.sort();
        wanted.dedup();

        let existing = self.repo.existing_role_ids(&wanted).await?;
        let missing: Vec<String> = wanted
            .iter()
            .filter(|id| !existing.contains(id))
            .map(Uuid::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(AppError::field("roles", format!("Roles inexistentes: {}.", missing.join(", "))));
        }

        let mut tx = self.pool.begin().await?;
        self.repo.sync_user_roles(&mut tx, user_id, &wanted).await?;
        tx.commit().await?;

        tracing::info!("👥 Usuário {} agora tem {} papéis", user_id, wanted.len());
        Ok(wanted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permission(module: &str, slug: &str) -> Permission {
        Permission {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            description: slug.to_string(),
            module: module.to_string(),
        }
    }

    #[test]
    fn groups_keep_module_order() {
        let groups = group_permissions(vec![
            permission("banks", "banks.create"),
            permission("banks", "banks.view"),
            permission("roles", "roles.view"),
        ]);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].module, "banks");
        assert_eq!(groups[0].permissions.len(), 2);
        assert_eq!(groups[1].permissions[0].slug, "roles.view");
    }
}
