// src/db/rbac_repo.rs

use sqlx::{Executor, PgConnection, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::{
        error::AppError,
        list_query::{FilterDef, FilterKind, IndexConfig, ListQuery, SortDef, SortDir},
    },
    db::list_sql::{self, ListSource},
    models::{
        rbac::{Permission, Role, RoleCandidate, RoleListItem, CRITICAL_PERMISSIONS},
        view::Stats,
    },
};

pub static ROLES_INDEX: IndexConfig = IndexConfig {
    sorts: &[
        SortDef { key: "name", column: "t.name" },
        SortDef { key: "is_active", column: "t.is_active" },
        SortDef { key: "users_count", column: "users_count" },
        SortDef { key: "permissions_count", column: "permissions_count" },
        SortDef { key: "created_at", column: "t.created_at" },
        SortDef { key: "updated_at", column: "t.updated_at" },
    ],
    default_sort: "name",
    default_dir: SortDir::Asc,
    default_per_page: 15,
    max_per_page: 100,
    filters: &[
        FilterDef { key: "is_active", column: "t.is_active", kind: FilterKind::Bool },
        FilterDef { key: "name", column: "t.name", kind: FilterKind::Text },
        FilterDef { key: "created_at", column: "t.created_at", kind: FilterKind::DateRange },
    ],
    search: &["t.name", "t.description"],
    sanitize: None,
};

const ROLES_SOURCE: ListSource = ListSource {
    select: "t.id, t.name, t.description, t.is_active, \
             (SELECT COUNT(*) FROM role_permissions rp WHERE rp.role_id = t.id) AS permissions_count, \
             (SELECT COUNT(*) FROM user_roles ur WHERE ur.role_id = t.id) AS users_count, \
             t.created_at, t.updated_at",
    from: "roles t",
    base_where: "t.deleted_at IS NULL",
};

// Subconsulta: o papel `r` tem todas as permissões críticas ($CRIT)?
const IS_ADMIN_SQL: &str = "(SELECT COUNT(DISTINCT p.slug) \
      FROM role_permissions rp JOIN permissions p ON p.id = rp.permission_id \
      WHERE rp.role_id = r.id AND p.slug = ANY($CRIT)) = cardinality($CRIT)";

fn critical_slugs() -> Vec<String> {
    CRITICAL_PERMISSIONS.iter().map(|s| s.to_string()).collect()
}

fn map_role_unique(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return AppError::field("name", "Ya existe un rol con ese nombre.");
        }
    }
    e.into()
}

#[derive(Clone)]
pub struct RbacRepository {
    pool: PgPool,
}

impl RbacRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    //  PAPÉIS
    // =========================================================================

    pub async fn list_roles(&self, query: &ListQuery) -> Result<(Vec<RoleListItem>, i64), AppError> {
        list_sql::fetch_page::<RoleListItem>(&self.pool, &ROLES_SOURCE, &ROLES_INDEX, query).await
    }

    pub async fn list_roles_for_export(&self, query: &ListQuery, limit: i64) -> Result<Vec<RoleListItem>, AppError> {
        list_sql::fetch_all::<RoleListItem>(&self.pool, &ROLES_SOURCE, &ROLES_INDEX, query, limit).await
    }

    pub async fn role_stats(&self) -> Result<Stats, AppError> {
        let stats = sqlx::query_as::<_, Stats>(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE is_active) AS active,
                   COUNT(*) FILTER (WHERE NOT is_active) AS inactive
            FROM roles
            WHERE deleted_at IS NULL
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }

    pub async fn find_role<'e, E>(&self, executor: E, id: Uuid) -> Result<Option<Role>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let role = sqlx::query_as::<_, Role>(
            r#"
            SELECT id, name, description, is_active, created_at, updated_at
            FROM roles
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await?;
        Ok(role)
    }

    pub async fn role_permission_slugs<'e, E>(&self, executor: E, role_id: Uuid) -> Result<Vec<String>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let slugs = sqlx::query_scalar::<_, String>(
            r#"
            SELECT p.slug
            FROM role_permissions rp
            JOIN permissions p ON p.id = rp.permission_id
            WHERE rp.role_id = $1
            ORDER BY p.slug
            "#,
        )
        .bind(role_id)
        .fetch_all(executor)
        .await?;
        Ok(slugs)
    }

    pub async fn role_users_count<'e, E>(&self, executor: E, role_id: Uuid) -> Result<i64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM user_roles WHERE role_id = $1")
            .bind(role_id)
            .fetch_one(executor)
            .await?;
        Ok(count)
    }

    // Nome em uso por outro papel vivo (ignora caixa)
    pub async fn role_name_taken<'e, E>(&self, executor: E, name: &str, except: Option<Uuid>) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let taken = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM roles
                WHERE lower(btrim(name)) = lower(btrim($1))
                  AND deleted_at IS NULL
                  AND ($2::uuid IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(name)
        .bind(except)
        .fetch_one(executor)
        .await?;
        Ok(taken)
    }

    // 1. Criar o papel
    pub async fn create_role<'e, E>(
        &self,
        executor: E,
        name: &str,
        description: Option<&str>,
        is_active: bool,
    ) -> Result<Role, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let role = sqlx::query_as::<_, Role>(
            r#"
            INSERT INTO roles (name, description, is_active)
            VALUES ($1, $2, $3)
            RETURNING id, name, description, is_active, created_at, updated_at
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(is_active)
        .fetch_one(executor)
        .await
        .map_err(map_role_unique)?;

        Ok(role)
    }

    pub async fn update_role<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        name: &str,
        description: Option<&str>,
        is_active: Option<bool>,
    ) -> Result<Option<Role>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let role = sqlx::query_as::<_, Role>(
            r#"
            UPDATE roles
            SET name = $2,
                description = $3,
                is_active = COALESCE($4, is_active),
                updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING id, name, description, is_active, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(description)
        .bind(is_active)
        .fetch_optional(executor)
        .await
        .map_err(map_role_unique)?;

        Ok(role)
    }

    pub async fn set_role_active<'e, E>(&self, executor: E, id: Uuid, active: bool) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            "UPDATE roles SET is_active = $2, updated_at = now() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(active)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn soft_delete_role<'e, E>(&self, executor: E, id: Uuid) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            "UPDATE roles SET deleted_at = now(), updated_at = now() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    //  PERMISSÕES
    // =========================================================================

    // 2. Buscar as permissões pelos slugs ("banks.view" -> UUID)
    pub async fn find_permissions_by_slugs<'e, E>(&self, executor: E, slugs: &[String]) -> Result<Vec<Permission>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let permissions = sqlx::query_as::<_, Permission>(
            r#"
            SELECT id, slug, description, module
            FROM permissions
            WHERE slug = ANY($1)
            "#,
        )
        .bind(slugs)
        .fetch_all(executor)
        .await?;

        Ok(permissions)
    }

    // 3. Troca o conjunto de permissões do papel
    pub async fn sync_permissions(
        &self,
        conn: &mut PgConnection,
        role_id: Uuid,
        permission_ids: &[Uuid],
    ) -> Result<(), AppError> {
        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut *conn)
            .await?;

        // Inserção em massa usando UNNEST
        sqlx::query(
            r#"
            INSERT INTO role_permissions (role_id, permission_id)
            SELECT $1, unnest($2::uuid[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(role_id)
        .bind(permission_ids)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    // 4. Listar todas as permissões disponíveis (para o frontend montar a tela)
    pub async fn list_all_permissions(&self) -> Result<Vec<Permission>, AppError> {
        let permissions = sqlx::query_as::<_, Permission>(
            "SELECT id, slug, description, module FROM permissions ORDER BY module, slug",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(permissions)
    }

    pub async fn user_has_permission(&self, user_id: Uuid, permission_slug: &str) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM user_roles ur
                JOIN roles r ON ur.role_id = r.id
                JOIN role_permissions rp ON r.id = rp.role_id
                JOIN permissions p ON rp.permission_id = p.id
                WHERE ur.user_id = $1
                  AND r.is_active = true
                  AND r.deleted_at IS NULL
                  AND p.slug = $2
            )
            "#,
        )
        .bind(user_id)
        .bind(permission_slug)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    // =========================================================================
    //  AÇÕES EM MASSA
    // =========================================================================

    /// Snapshot dos papéis pedidos (os inexistentes simplesmente não voltam).
    pub async fn role_candidates(&self, ids: &[Uuid]) -> Result<Vec<RoleCandidate>, AppError> {
        let sql = format!(
            "SELECT r.id, r.name, r.is_active, \
                    (SELECT COUNT(*) FROM user_roles ur WHERE ur.role_id = r.id) AS users_count, \
                    (SELECT COUNT(*) FROM role_permissions rp WHERE rp.role_id = r.id) AS permissions_count, \
                    {} AS is_admin \
             FROM roles r \
             WHERE r.id = ANY($1) AND r.deleted_at IS NULL",
            IS_ADMIN_SQL.replace("$CRIT", "$2")
        );
        let candidates = sqlx::query_as::<_, RoleCandidate>(&sql)
            .bind(ids)
            .bind(critical_slugs())
            .fetch_all(&self.pool)
            .await?;
        Ok(candidates)
    }

    /// (papéis administradores vivos, dos quais ativos)
    pub async fn admin_totals(&self) -> Result<(i64, i64), AppError> {
        let sql = format!(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE r.is_active) \
             FROM roles r \
             WHERE r.deleted_at IS NULL AND {}",
            IS_ADMIN_SQL.replace("$CRIT", "$1")
        );
        let totals = sqlx::query_as::<_, (i64, i64)>(&sql)
            .bind(critical_slugs())
            .fetch_one(&self.pool)
            .await?;
        Ok(totals)
    }

    // =========================================================================
    //  PAPÉIS DO USUÁRIO
    // =========================================================================

    /// Quais dos ids pedidos são papéis vivos.
    pub async fn existing_role_ids(&self, ids: &[Uuid]) -> Result<Vec<Uuid>, AppError> {
        let found = sqlx::query_scalar::<_, Uuid>("SELECT id FROM roles WHERE id = ANY($1) AND deleted_at IS NULL")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(found)
    }

    pub async fn sync_user_roles(&self, conn: &mut PgConnection, user_id: Uuid, role_ids: &[Uuid]) -> Result<(), AppError> {
        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *conn)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role_id)
            SELECT $1, unnest($2::uuid[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(role_ids)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::list_query::normalize;
    use serde_json::{json, Value};

    #[test]
    fn roles_can_be_sorted_by_counters() {
        let Value::Object(raw) = json!({ "sort": "users_count", "dir": "desc" }) else { unreachable!() };
        let query = normalize(&raw, &ROLES_INDEX).unwrap();
        let qb = list_sql::select_builder(&ROLES_SOURCE, &ROLES_INDEX, &query);
        assert!(qb.sql().ends_with("ORDER BY users_count DESC NULLS LAST, t.id ASC"));
    }

    #[test]
    fn admin_subquery_uses_one_placeholder() {
        let sql = IS_ADMIN_SQL.replace("$CRIT", "$2");
        assert!(!sql.contains("$CRIT"));
        assert_eq!(sql.matches("$2").count(), 2);
    }
}
