// src/db/audit_repo.rs

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    common::{
        error::AppError,
        list_query::{FilterDef, FilterKind, IndexConfig, ListQuery, SortDef, SortDir},
    },
    db::list_sql::{self, ListSource},
    models::audit::{Actor, Audit, AuditEvent, NewAudit},
};

/// Modelos que aparecem no log (valor de `auditable_type`).
pub const AUDITABLE_TYPES: &[&str] = &[
    "Bank",
    "Market",
    "DocumentType",
    "ConcessionaireType",
    "BusinessLine",
    "Local",
    "Concessionaire",
    "Role",
];

pub static AUDITS_INDEX: IndexConfig = IndexConfig {
    sorts: &[
        SortDef { key: "created_at", column: "t.created_at" },
        SortDef { key: "event", column: "t.event" },
        SortDef { key: "auditable_type", column: "t.auditable_type" },
        SortDef { key: "user", column: "u.email" },
    ],
    default_sort: "created_at",
    default_dir: SortDir::Desc,
    default_per_page: 25,
    max_per_page: 200,
    filters: &[
        FilterDef { key: "event", column: "t.event", kind: FilterKind::Choice(AuditEvent::ALL) },
        FilterDef { key: "auditable_type", column: "t.auditable_type", kind: FilterKind::Choice(AUDITABLE_TYPES) },
        FilterDef { key: "auditable_id", column: "t.auditable_id", kind: FilterKind::Uuid },
        FilterDef { key: "user_id", column: "t.user_id", kind: FilterKind::Uuid },
        FilterDef { key: "created_at", column: "t.created_at", kind: FilterKind::DateRange },
    ],
    search: &["t.auditable_type", "t.url", "u.email", "u.name"],
    sanitize: None,
};

const AUDITS_SELECT: &str = "t.id, t.user_id, u.email AS user_email, t.event, t.auditable_type, t.auditable_id, \
     t.old_values, t.new_values, t.url, t.ip_address, t.user_agent, t.created_at";

const AUDITS_SOURCE: ListSource = ListSource {
    select: AUDITS_SELECT,
    from: "audits t LEFT JOIN users u ON u.id = t.user_id",
    base_where: "TRUE",
};

#[derive(Clone)]
pub struct AuditRepository {
    pool: PgPool,
}

impl AuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // Gravado na mesma transação da mudança auditada
    pub async fn record(&self, conn: &mut PgConnection, audit: NewAudit, actor: &Actor) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO audits (
                user_id, event, auditable_type, auditable_id,
                old_values, new_values, url, ip_address, user_agent
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(actor.user_id)
        .bind(audit.event.as_str())
        .bind(audit.auditable_type)
        .bind(audit.auditable_id)
        .bind(audit.old_values)
        .bind(audit.new_values)
        .bind(actor.url.as_deref())
        .bind(actor.ip_address.as_deref())
        .bind(actor.user_agent.as_deref())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn list(&self, query: &ListQuery) -> Result<(Vec<Audit>, i64), AppError> {
        list_sql::fetch_page::<Audit>(&self.pool, &AUDITS_SOURCE, &AUDITS_INDEX, query).await
    }

    pub async fn list_for_export(&self, query: &ListQuery, limit: i64) -> Result<Vec<Audit>, AppError> {
        list_sql::fetch_all::<Audit>(&self.pool, &AUDITS_SOURCE, &AUDITS_INDEX, query, limit).await
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<Audit>, AppError> {
        let sql = format!("SELECT {} FROM {} WHERE t.id = $1", AUDITS_SOURCE.select, AUDITS_SOURCE.from);
        let audit = sqlx::query_as::<_, Audit>(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(audit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::list_query::normalize;
    use serde_json::{json, Map, Value};

    #[test]
    fn newest_audits_come_first_by_default() {
        let query = normalize(&Map::new(), &AUDITS_INDEX).unwrap();
        let qb = list_sql::select_builder(&AUDITS_SOURCE, &AUDITS_INDEX, &query);
        assert!(qb.sql().ends_with("ORDER BY t.created_at DESC NULLS LAST, t.id ASC"));
    }

    #[test]
    fn unknown_event_filter_is_rejected() {
        let Value::Object(raw) = json!({ "filters": { "event": "exploded" } }) else { unreachable!() };
        let errors = normalize(&raw, &AUDITS_INDEX).unwrap_err();
        assert!(errors.contains("filters.event"));
    }
}
