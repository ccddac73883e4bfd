// src/db/list_sql.rs
//
// Monta o SQL de listagem (busca, filtros, ordenação, paginação) a partir de
// um `ListQuery` já normalizado. Colunas vêm sempre do `IndexConfig` estático;
// valores do usuário entram só como bind.

use sqlx::{postgres::PgRow, FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::common::{
    error::AppError,
    list_query::{date_bound, number_bound, FilterKind, IndexConfig, ListQuery},
};

/// De onde a listagem lê: colunas, FROM (com JOINs) e o filtro fixo.
#[derive(Debug, Clone, Copy)]
pub struct ListSource {
    pub select: &'static str,
    pub from: &'static str,
    pub base_where: &'static str,
}

pub fn like_pattern(text: &str) -> String {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Acrescenta `AND ...` para a busca livre e para cada filtro presente.
pub fn push_conditions(qb: &mut QueryBuilder<'_, Postgres>, config: &IndexConfig, query: &ListQuery) {
    if let Some(q) = query.q.as_deref() {
        if !config.search.is_empty() {
            let pattern = like_pattern(q);
            qb.push(" AND (");
            for (i, column) in config.search.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                qb.push(format!("{}::text ILIKE ", column));
                qb.push_bind(pattern.clone());
            }
            qb.push(")");
        }
    }

    for def in config.filters {
        let Some(value) = query.filter(def.key) else {
            continue;
        };

        match def.kind {
            FilterKind::Bool => {
                if let Some(flag) = value.as_bool() {
                    qb.push(format!(" AND {} = ", def.column));
                    qb.push_bind(flag);
                }
            }
            FilterKind::Uuid => {
                if let Some(id) = value.as_str().and_then(|s| Uuid::parse_str(s.trim()).ok()) {
                    qb.push(format!(" AND {} = ", def.column));
                    qb.push_bind(id);
                }
            }
            FilterKind::Text => {
                let text = match value {
                    serde_json::Value::String(s) => s.trim().to_string(),
                    other => other.to_string(),
                };
                qb.push(format!(" AND {}::text ILIKE ", def.column));
                qb.push_bind(like_pattern(&text));
            }
            FilterKind::Choice(_) => {
                if let Some(choice) = value.as_str() {
                    qb.push(format!(" AND {} = ", def.column));
                    qb.push_bind(choice.trim().to_string());
                }
            }
            FilterKind::NumberRange => {
                if let Some(from) = value.get("from").and_then(number_bound) {
                    qb.push(format!(" AND {} >= ", def.column));
                    qb.push_bind(from);
                }
                if let Some(to) = value.get("to").and_then(number_bound) {
                    qb.push(format!(" AND {} <= ", def.column));
                    qb.push_bind(to);
                }
            }
            FilterKind::DateRange => {
                if let Some(from) = value.get("from").and_then(|v| date_bound(v, false)) {
                    qb.push(format!(" AND {} >= ", def.column));
                    qb.push_bind(from);
                }
                if let Some(to) = value.get("to").and_then(|v| date_bound(v, true)) {
                    qb.push(format!(" AND {} <= ", def.column));
                    qb.push_bind(to);
                }
            }
        }
    }
}

fn push_order(qb: &mut QueryBuilder<'_, Postgres>, config: &IndexConfig, query: &ListQuery) {
    let column = config
        .sort_column(&query.sort)
        .or_else(|| config.sort_column(config.default_sort))
        .unwrap_or("t.id");
    qb.push(format!(" ORDER BY {} {} NULLS LAST, t.id ASC", column, query.dir.as_sql()));
}

pub fn select_builder<'a>(source: &ListSource, config: &IndexConfig, query: &ListQuery) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {} FROM {} WHERE {}",
        source.select, source.from, source.base_where
    ));
    push_conditions(&mut qb, config, query);
    push_order(&mut qb, config, query);
    qb
}

pub fn count_builder<'a>(source: &ListSource, config: &IndexConfig, query: &ListQuery) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT COUNT(*) FROM {} WHERE {}",
        source.from, source.base_where
    ));
    push_conditions(&mut qb, config, query);
    qb
}

/// Página pedida + total de linhas que passam nos filtros.
pub async fn fetch_page<T>(
    pool: &PgPool,
    source: &ListSource,
    config: &IndexConfig,
    query: &ListQuery,
) -> Result<(Vec<T>, i64), AppError>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    let mut count = count_builder(source, config, query);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let mut select = select_builder(source, config, query);
    select.push(" LIMIT ");
    select.push_bind(i64::from(query.per_page));
    select.push(" OFFSET ");
    select.push_bind(query.offset());

    let rows = select.build_query_as::<T>().fetch_all(pool).await?;

    Ok((rows, total))
}

/// Todas as linhas que passam nos filtros (exportação), até `limit`.
pub async fn fetch_all<T>(
    pool: &PgPool,
    source: &ListSource,
    config: &IndexConfig,
    query: &ListQuery,
    limit: i64,
) -> Result<Vec<T>, AppError>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    let mut select = select_builder(source, config, query);
    select.push(" LIMIT ");
    select.push_bind(limit);

    Ok(select.build_query_as::<T>().fetch_all(pool).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::list_query::{normalize, FilterDef, SortDef, SortDir};
    use serde_json::{json, Value};

    static INDEX: IndexConfig = IndexConfig {
        sorts: &[SortDef { key: "name", column: "t.name" }, SortDef { key: "market", column: "m.name" }],
        default_sort: "name",
        default_dir: SortDir::Asc,
        default_per_page: 10,
        max_per_page: 50,
        filters: &[
            FilterDef { key: "is_active", column: "t.is_active", kind: FilterKind::Bool },
            FilterDef { key: "area", column: "t.area", kind: FilterKind::NumberRange },
            FilterDef { key: "created_at", column: "t.created_at", kind: FilterKind::DateRange },
        ],
        search: &["t.code", "t.name"],
        sanitize: None,
    };

    const SOURCE: ListSource = ListSource {
        select: "t.id, t.name",
        from: "locals t LEFT JOIN markets m ON m.id = t.market_id",
        base_where: "t.deleted_at IS NULL",
    };

    fn query(raw: Value) -> ListQuery {
        let Value::Object(map) = raw else { unreachable!() };
        normalize(&map, &INDEX).unwrap()
    }

    #[test]
    fn escapes_like_wildcards() {
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }

    #[test]
    fn builds_filters_search_and_order() {
        let q = query(json!({
            "q": "bod",
            "sort": "market",
            "dir": "DESC",
            "filters": {
                "is_active": "1",
                "area": { "from": "50", "to": "10" },
                "created_at": { "from": "2024-01-01" }
            }
        }));

        let qb = select_builder(&SOURCE, &INDEX, &q);
        let sql = qb.sql();

        assert!(sql.starts_with("SELECT t.id, t.name FROM locals t LEFT JOIN markets m"));
        assert!(sql.contains("WHERE t.deleted_at IS NULL AND (t.code::text ILIKE $1 OR t.name::text ILIKE $2)"));
        assert!(sql.contains("t.is_active = $3"));
        assert!(sql.contains("t.area >= $4 AND t.area <= $5"));
        assert!(sql.contains("t.created_at >= $6"));
        assert!(!sql.contains("t.created_at <="));
        assert!(sql.ends_with("ORDER BY m.name DESC NULLS LAST, t.id ASC"));
    }

    #[test]
    fn count_query_has_no_order_or_limit() {
        let q = query(json!({}));
        let qb = count_builder(&SOURCE, &INDEX, &q);
        assert_eq!(
            qb.sql(),
            "SELECT COUNT(*) FROM locals t LEFT JOIN markets m ON m.id = t.market_id WHERE t.deleted_at IS NULL"
        );
    }
}
