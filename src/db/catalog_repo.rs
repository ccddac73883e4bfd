// src/db/catalog_repo.rs

use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    catalogs::CatalogDef,
    common::{error::AppError, list_query::ListQuery},
    db::list_sql::{self, ListSource},
    models::{
        catalog::SqlValue,
        view::{OptionItem, Stats},
    },
};

// O repositório genérico dos catálogos: o tipo `R` diz qual tabela usar
#[derive(Clone)]
pub struct CatalogRepository {
    pool: PgPool,
}

fn source<R: CatalogDef>() -> ListSource {
    ListSource {
        select: R::SELECT,
        from: R::FROM,
        base_where: "t.deleted_at IS NULL",
    }
}

fn push_value(qb: &mut QueryBuilder<'_, Postgres>, value: SqlValue) {
    match value {
        SqlValue::Text(v) => {
            qb.push_bind(v);
        }
        SqlValue::Uuid(v) => {
            qb.push_bind(v);
        }
        SqlValue::Decimal(v) => {
            qb.push_bind(v);
        }
        SqlValue::Bool(v) => {
            qb.push_bind(v);
        }
    }
}

// Violação do índice único de código vira erro de campo
fn map_unique(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return AppError::field("code", "El código ya está en uso.");
        }
    }
    e.into()
}

impl CatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list<R: CatalogDef>(&self, query: &ListQuery) -> Result<(Vec<R::Row>, i64), AppError> {
        list_sql::fetch_page::<R::Row>(&self.pool, &source::<R>(), R::index_config(), query).await
    }

    pub async fn list_for_export<R: CatalogDef>(
        &self,
        query: &ListQuery,
        limit: i64,
    ) -> Result<Vec<R::Row>, AppError> {
        list_sql::fetch_all::<R::Row>(&self.pool, &source::<R>(), R::index_config(), query, limit).await
    }

    pub async fn stats<R: CatalogDef>(&self) -> Result<Stats, AppError> {
        let sql = format!(
            "SELECT COUNT(*) AS total, \
                    COUNT(*) FILTER (WHERE is_active) AS active, \
                    COUNT(*) FILTER (WHERE NOT is_active) AS inactive \
             FROM {} WHERE deleted_at IS NULL",
            R::TABLE
        );
        let stats = sqlx::query_as::<_, Stats>(&sql).fetch_one(&self.pool).await?;
        Ok(stats)
    }

    pub async fn find<R: CatalogDef>(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Option<R::Row>, AppError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE t.id = $1 AND t.deleted_at IS NULL",
            R::SELECT,
            R::FROM
        );
        let row = sqlx::query_as::<_, R::Row>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row)
    }

    /// Linhas pelos ids, sem garantia de ordem (o serviço reordena).
    pub async fn find_many<R: CatalogDef>(&self, ids: &[Uuid]) -> Result<Vec<R::Row>, AppError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE t.id = ANY($1) AND t.deleted_at IS NULL",
            R::SELECT,
            R::FROM
        );
        let rows = sqlx::query_as::<_, R::Row>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    // Código em uso por outra linha viva (ignora caixa e espaços)
    pub async fn code_taken<R: CatalogDef>(
        &self,
        conn: &mut PgConnection,
        code: &str,
        except: Option<Uuid>,
    ) -> Result<bool, AppError> {
        let sql = format!(
            "SELECT EXISTS ( \
                SELECT 1 FROM {} \
                WHERE lower(btrim(code)) = lower(btrim($1)) \
                  AND deleted_at IS NULL \
                  AND ($2::uuid IS NULL OR id <> $2) \
             )",
            R::TABLE
        );
        let taken = sqlx::query_scalar::<_, bool>(&sql)
            .bind(code)
            .bind(except)
            .fetch_one(&mut *conn)
            .await?;
        Ok(taken)
    }

    pub async fn insert<R: CatalogDef>(
        &self,
        conn: &mut PgConnection,
        code: &str,
        is_active: bool,
        columns: Vec<(&'static str, SqlValue)>,
    ) -> Result<Uuid, AppError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("INSERT INTO {} (code, is_active", R::TABLE));
        for (column, _) in &columns {
            qb.push(", ");
            qb.push(*column);
        }
        qb.push(") VALUES (");
        qb.push_bind(code.to_string());
        qb.push(", ");
        qb.push_bind(is_active);
        for (_, value) in columns {
            qb.push(", ");
            push_value(&mut qb, value);
        }
        qb.push(") RETURNING id");

        let id: Uuid = qb
            .build_query_scalar()
            .fetch_one(&mut *conn)
            .await
            .map_err(map_unique)?;
        Ok(id)
    }

    pub async fn update<R: CatalogDef>(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        code: &str,
        is_active: Option<bool>,
        columns: Vec<(&'static str, SqlValue)>,
    ) -> Result<bool, AppError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("UPDATE {} SET code = ", R::TABLE));
        qb.push_bind(code.to_string());
        if let Some(active) = is_active {
            qb.push(", is_active = ");
            qb.push_bind(active);
        }
        for (column, value) in columns {
            qb.push(format!(", {} = ", column));
            push_value(&mut qb, value);
        }
        qb.push(", updated_at = now() WHERE id = ");
        qb.push_bind(id);
        qb.push(" AND deleted_at IS NULL");

        let result = qb.build().execute(&mut *conn).await.map_err(map_unique)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_active<R: CatalogDef>(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        active: bool,
    ) -> Result<bool, AppError> {
        let sql = format!(
            "UPDATE {} SET is_active = $1, updated_at = now() WHERE id = $2 AND deleted_at IS NULL",
            R::TABLE
        );
        let result = sqlx::query(&sql)
            .bind(active)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // Exclusão lógica: a linha continua no banco para auditoria
    pub async fn soft_delete<R: CatalogDef>(&self, conn: &mut PgConnection, id: Uuid) -> Result<bool, AppError> {
        let sql = format!(
            "UPDATE {} SET deleted_at = now(), updated_at = now() WHERE id = $1 AND deleted_at IS NULL",
            R::TABLE
        );
        let result = sqlx::query(&sql).bind(id).execute(&mut *conn).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Quantas linhas vivas apontam para este registro.
    pub async fn dependents_count<R: CatalogDef>(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<i64, AppError> {
        let mut total = 0;
        for dependent in R::dependents() {
            let sql = format!(
                "SELECT COUNT(*) FROM {} WHERE {} = $1 AND deleted_at IS NULL",
                dependent.table, dependent.column
            );
            let count: i64 = sqlx::query_scalar(&sql).bind(id).fetch_one(&mut *conn).await?;
            total += count;
        }
        Ok(total)
    }

    /// `None` se a referência não existe (ou foi excluída); senão, se está ativa.
    pub async fn reference_is_active(
        &self,
        conn: &mut PgConnection,
        table: &str,
        id: Uuid,
    ) -> Result<Option<bool>, AppError> {
        let sql = format!("SELECT is_active FROM {} WHERE id = $1 AND deleted_at IS NULL", table);
        let active = sqlx::query_scalar::<_, bool>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(active)
    }

    pub async fn options(&self, table: &str) -> Result<Vec<OptionItem>, AppError> {
        let sql = format!(
            "SELECT id, code, name FROM {} WHERE deleted_at IS NULL AND is_active ORDER BY name",
            table
        );
        let items = sqlx::query_as::<_, OptionItem>(&sql).fetch_all(&self.pool).await?;
        Ok(items)
    }
}
