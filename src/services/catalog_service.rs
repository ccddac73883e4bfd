// src/services/catalog_service.rs

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use serde_json::{json, Value};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::{
    catalogs::CatalogDef,
    common::{
        code::{codes_collide, normalize_code},
        error::{AppError, FieldErrors},
        list_query::ListQuery,
    },
    db::{AuditRepository, CatalogRepository},
    models::{
        audit::{diff_values, Actor, AuditEvent, NewAudit},
        catalog::{CatalogInput, CatalogRecord},
        view::{BulkRequest, BulkResponse, Flash, FormView, IndexPage, Mutation, Options, PageMeta},
    },
    services::bulk::{partition_catalog, reasons, BulkAction, CatalogCandidate},
};

pub const CODE_TAKEN: &str = "El código ya está en uso.";
pub const CODE_LOCKED: &str = "No se puede modificar el código: tiene registros dependientes";

pub(crate) fn snapshot<T: Serialize>(row: &T) -> Result<Value, AppError> {
    serde_json::to_value(row).map_err(|e| AppError::InternalServerError(e.into()))
}

/// Erros do derive + regras entre campos, num único 422.
pub(crate) fn validate_payload<P: Validate + CatalogInput>(payload: &P) -> Result<(), AppError> {
    let mut errors = match payload.validate() {
        Ok(()) => FieldErrors::new(),
        Err(e) => e.into(),
    };
    errors.merge(payload.validate_consistency());
    errors.into_result()
}

/// Ids pedidos na ordem pedida, ignorando os que não vieram do banco.
pub(crate) fn keep_order<T, F>(ids: &[Uuid], rows: Vec<T>, id_of: F) -> Vec<T>
where
    F: Fn(&T) -> Uuid,
{
    let mut by_id: BTreeMap<Uuid, T> = rows.into_iter().map(|row| (id_of(&row), row)).collect();
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(**id))
        .filter_map(|id| by_id.remove(id))
        .collect()
}

fn active_flash(active: bool) -> Flash {
    if active {
        Flash::success("Registro activado.")
    } else {
        Flash::success("Registro desactivado.")
    }
}

#[derive(Clone)]
pub struct CatalogService {
    repo: CatalogRepository,
    audit_repo: AuditRepository,
    pool: PgPool,
    enforce_version_check: bool,
}

impl CatalogService {
    pub fn new(repo: CatalogRepository, audit_repo: AuditRepository, pool: PgPool, enforce_version_check: bool) -> Self {
        Self { repo, audit_repo, pool, enforce_version_check }
    }

    // =========================================================================
    //  LEITURA
    // =========================================================================

    pub async fn index<R: CatalogDef>(&self, query: ListQuery) -> Result<IndexPage<R::Row>, AppError> {
        let (rows, total) = self.repo.list::<R>(&query).await?;
        let stats = self.repo.stats::<R>().await?;
        let options = self.options::<R>().await?;

        Ok(IndexPage {
            meta: PageMeta::new(&query, total, rows.len()),
            rows,
            stats: Some(stats),
            query,
            options,
        })
    }

    pub async fn options<R: CatalogDef>(&self) -> Result<Options, AppError> {
        let mut options = Options::new();
        for source in R::option_sources() {
            options.insert(source.key.to_string(), self.repo.options(source.table).await?);
        }
        Ok(options)
    }

    pub async fn show<R: CatalogDef>(&self, id: Uuid) -> Result<R::Row, AppError> {
        let mut conn = self.pool.acquire().await?;
        self.repo.find::<R>(&mut conn, id).await?.ok_or(AppError::NotFound)
    }

    /// Tela de criação (`id = None`) ou de edição.
    pub async fn form<R: CatalogDef>(&self, id: Option<Uuid>) -> Result<FormView<R::Row>, AppError> {
        let item = match id {
            Some(id) => Some(self.show::<R>(id).await?),
            None => None,
        };

        Ok(FormView {
            resource: R::SLUG,
            label: R::LABEL,
            item,
            options: self.options::<R>().await?,
        })
    }

    pub async fn selected<R: CatalogDef>(&self, ids: &[Uuid]) -> Result<Vec<R::Row>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self.repo.find_many::<R>(ids).await?;
        Ok(keep_order(ids, rows, |row| row.id()))
    }

    pub async fn export_rows<R: CatalogDef>(&self, query: &ListQuery, limit: i64) -> Result<Vec<R::Row>, AppError> {
        self.repo.list_for_export::<R>(query, limit).await
    }

    // =========================================================================
    //  ESCRITA
    // =========================================================================

    // Referências novas precisam existir e estar ativas
    async fn check_references<R: CatalogDef>(
        &self,
        conn: &mut PgConnection,
        payload: &R::Payload,
        current: Option<&Value>,
    ) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();

        for reference in payload.references() {
            let unchanged = current
                .and_then(|row| row.get(reference.field))
                .and_then(Value::as_str)
                .is_some_and(|id| id == reference.id.to_string());
            if unchanged {
                continue;
            }

            match self.repo.reference_is_active(conn, reference.table, reference.id).await? {
                None => errors.add(reference.field, format!("El {} seleccionado no existe.", reference.label)),
                Some(false) => errors.add(reference.field, format!("El {} seleccionado está inactivo.", reference.label)),
                Some(true) => {}
            }
        }

        errors.into_result()
    }

    pub async fn store<R: CatalogDef>(&self, payload: R::Payload, actor: &Actor) -> Result<Mutation<R::Row>, AppError> {
        validate_payload(&payload)?;
        let code = normalize_code(payload.code());

        let mut tx = self.pool.begin().await?;

        if self.repo.code_taken::<R>(&mut tx, &code, None).await? {
            return Err(AppError::field("code", CODE_TAKEN));
        }
        self.check_references::<R>(&mut tx, &payload, None).await?;

        let id = self
            .repo
            .insert::<R>(&mut tx, &code, payload.is_active().unwrap_or(true), payload.columns())
            .await?;
        let row = self.repo.find::<R>(&mut tx, id).await?.ok_or(AppError::NotFound)?;

        self.audit_repo
            .record(
                &mut tx,
                NewAudit {
                    event: AuditEvent::Created,
                    auditable_type: R::AUDIT_TYPE,
                    auditable_id: id,
                    old_values: json!({}),
                    new_values: snapshot(&row)?,
                },
                actor,
            )
            .await?;

        tx.commit().await?;
        tracing::info!("✅ {} {} criado ({})", R::LABEL, code, id);

        Ok(Mutation { data: row, flash: Flash::success("Registro creado correctamente.") })
    }

    pub async fn update<R: CatalogDef>(
        &self,
        id: Uuid,
        payload: R::Payload,
        actor: &Actor,
    ) -> Result<Mutation<R::Row>, AppError> {
        validate_payload(&payload)?;
        let code = normalize_code(payload.code());

        let mut tx = self.pool.begin().await?;
        let existing = self.repo.find::<R>(&mut tx, id).await?.ok_or(AppError::NotFound)?;

        if self.enforce_version_check {
            if let Some(version) = payload.version() {
                if version.timestamp_micros() != existing.updated_at().timestamp_micros() {
                    return Err(AppError::VersionConflict);
                }
            }
        }

        if !codes_collide(existing.code(), &code) {
            if self.repo.dependents_count::<R>(&mut tx, id).await? > 0 {
                return Err(AppError::rule("code", CODE_LOCKED));
            }
            if self.repo.code_taken::<R>(&mut tx, &code, Some(id)).await? {
                return Err(AppError::field("code", CODE_TAKEN));
            }
        }

        let old = snapshot(&existing)?;
        self.check_references::<R>(&mut tx, &payload, Some(&old)).await?;

        self.repo
            .update::<R>(&mut tx, id, &code, payload.is_active(), payload.columns())
            .await?;
        let row = self.repo.find::<R>(&mut tx, id).await?.ok_or(AppError::NotFound)?;

        let (before, after) = diff_values(&old, &snapshot(&row)?);
        if after.as_object().is_some_and(|changes| !changes.is_empty()) {
            self.audit_repo
                .record(
                    &mut tx,
                    NewAudit {
                        event: AuditEvent::Updated,
                        auditable_type: R::AUDIT_TYPE,
                        auditable_id: id,
                        old_values: before,
                        new_values: after,
                    },
                    actor,
                )
                .await?;
        }

        tx.commit().await?;
        tracing::info!("✏️ {} {} atualizado", R::LABEL, id);

        Ok(Mutation { data: row, flash: Flash::success("Registro actualizado correctamente.") })
    }

    // Aplica a ação já liberada pela partição e grava a auditoria
    async fn write_action<R: CatalogDef>(
        &self,
        conn: &mut PgConnection,
        existing: &R::Row,
        action: BulkAction,
        actor: &Actor,
    ) -> Result<(), AppError> {
        let id = existing.id();

        let audit = match action {
            BulkAction::Delete => {
                self.repo.soft_delete::<R>(conn, id).await?;
                NewAudit {
                    event: AuditEvent::Deleted,
                    auditable_type: R::AUDIT_TYPE,
                    auditable_id: id,
                    old_values: snapshot(existing)?,
                    new_values: json!({}),
                }
            }
            BulkAction::SetActive(active) => {
                self.repo.set_active::<R>(conn, id, active).await?;
                NewAudit {
                    event: AuditEvent::for_active(active),
                    auditable_type: R::AUDIT_TYPE,
                    auditable_id: id,
                    old_values: json!({ "is_active": existing.is_active() }),
                    new_values: json!({ "is_active": active }),
                }
            }
        };

        self.audit_repo.record(conn, audit, actor).await
    }

    async fn candidate<R: CatalogDef>(
        &self,
        conn: &mut PgConnection,
        row: &R::Row,
        action: BulkAction,
    ) -> Result<CatalogCandidate, AppError> {
        // Dependentes só importam para exclusão
        let dependents = match action {
            BulkAction::Delete => self.repo.dependents_count::<R>(conn, row.id()).await?,
            BulkAction::SetActive(_) => 0,
        };
        Ok(CatalogCandidate { id: row.id(), is_active: row.is_active(), dependents })
    }

    pub async fn set_active<R: CatalogDef>(
        &self,
        id: Uuid,
        active: bool,
        actor: &Actor,
    ) -> Result<Mutation<R::Row>, AppError> {
        let action = BulkAction::SetActive(active);
        let mut tx = self.pool.begin().await?;
        let existing = self.repo.find::<R>(&mut tx, id).await?.ok_or(AppError::NotFound)?;

        let candidate = self.candidate::<R>(&mut tx, &existing, action).await?;
        let partition = partition_catalog(&[id], &[candidate], action);

        // Já no estado pedido: nada a fazer
        if let Some(reason) = partition.skipped.get(&id) {
            if reason == reasons::ALREADY_ACTIVE || reason == reasons::ALREADY_INACTIVE {
                return Ok(Mutation { data: existing, flash: Flash::info(reason.clone()) });
            }
        }
        partition.into_single(id)?;

        self.write_action::<R>(&mut tx, &existing, action, actor).await?;
        let row = self.repo.find::<R>(&mut tx, id).await?.ok_or(AppError::NotFound)?;
        tx.commit().await?;

        Ok(Mutation { data: row, flash: active_flash(active) })
    }

    pub async fn destroy<R: CatalogDef>(&self, id: Uuid, actor: &Actor) -> Result<Flash, AppError> {
        let mut tx = self.pool.begin().await?;
        let existing = self.repo.find::<R>(&mut tx, id).await?.ok_or(AppError::NotFound)?;

        let candidate = self.candidate::<R>(&mut tx, &existing, BulkAction::Delete).await?;
        partition_catalog(&[id], &[candidate], BulkAction::Delete).into_single(id)?;

        self.write_action::<R>(&mut tx, &existing, BulkAction::Delete, actor).await?;
        tx.commit().await?;
        tracing::info!("🗑️ {} {} excluído", R::LABEL, id);

        Ok(Flash::success("Registro eliminado correctamente."))
    }

    pub async fn bulk<R: CatalogDef>(&self, request: BulkRequest, actor: &Actor) -> Result<BulkResponse, AppError> {
        request.validate()?;
        let action = BulkAction::try_from(&request)?;

        let rows = self.repo.find_many::<R>(&request.ids).await?;
        let mut conn = self.pool.acquire().await?;
        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            candidates.push(self.candidate::<R>(&mut conn, row, action).await?);
        }
        drop(conn);

        let mut partition = partition_catalog(&request.ids, &candidates, action);
        let rows: BTreeMap<Uuid, R::Row> = rows.into_iter().map(|row| (row.id(), row)).collect();

        // Cada linha na sua própria transação; falha de uma não desfaz as outras
        let mut processed = Vec::with_capacity(partition.applicable.len());
        for id in std::mem::take(&mut partition.applicable) {
            let Some(row) = rows.get(&id) else { continue };

            let result = async {
                let mut tx = self.pool.begin().await?;
                self.write_action::<R>(&mut tx, row, action, actor).await?;
                tx.commit().await?;
                Ok::<_, AppError>(())
            }
            .await;

            match result {
                Ok(()) => processed.push(id),
                Err(e) => {
                    tracing::warn!("Ação em massa falhou para {} {}: {:?}", R::LABEL, id, e);
                    partition.skipped.insert(id, "Error al procesar".to_string());
                }
            }
        }

        tracing::info!(
            "📦 Ação em massa em {}: {} processados, {} omitidos",
            R::SLUG,
            processed.len(),
            partition.skipped.len()
        );

        Ok(BulkResponse::new(processed, partition.skipped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{catalogs::Banks, models::catalog::CatalogItemPayload};

    fn payload(raw: Value) -> CatalogItemPayload {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn keep_order_follows_request_and_drops_missing() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let rows = vec![(a, "a"), (b, "b")];

        let ordered = keep_order(&[b, c, a, b], rows, |row| row.0);
        assert_eq!(ordered, vec![(b, "b"), (a, "a")]);
    }

    #[test]
    fn payload_errors_are_collected_together() {
        let invalid = payload(json!({ "code": "", "name": "" }));
        match validate_payload(&invalid) {
            Err(AppError::ValidationError(errors)) => {
                assert!(errors.contains("code"));
                assert!(errors.contains("name"));
            }
            other => panic!("esperava erro de validação, veio {:?}", other),
        }

        let valid = payload(json!({ "code": " bod ", "name": "Bodega" }));
        assert!(validate_payload(&valid).is_ok());
        assert_eq!(normalize_code(valid.code()), "BOD");
    }

    fn service(pool: PgPool) -> CatalogService {
        CatalogService::new(
            CatalogRepository::new(pool.clone()),
            AuditRepository::new(pool.clone()),
            pool,
            true,
        )
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn code_is_unique_among_live_rows_only(pool: PgPool) {
        let service = service(pool.clone());
        let actor = Actor::default();

        let created = service
            .store::<Banks>(payload(json!({ "code": "BOD", "name": "Banco de Occidente" })), &actor)
            .await
            .unwrap();
        assert_eq!(created.data.code, "BOD");

        // Mesmo código com espaços e minúsculas colide
        match service
            .store::<Banks>(payload(json!({ "code": " bod ", "name": "Otro" })), &actor)
            .await
        {
            Err(AppError::ValidationError(errors)) => assert!(errors.contains("code")),
            other => panic!("esperava código duplicado, veio {:?}", other.map(|m| m.data)),
        }

        service.destroy::<Banks>(created.data.id, &actor).await.unwrap();

        let recreated = service
            .store::<Banks>(payload(json!({ "code": " bod ", "name": "Banco de Occidente" })), &actor)
            .await
            .unwrap();
        assert_eq!(recreated.data.code, "BOD");
        assert_ne!(recreated.data.id, created.data.id);

        let audits: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audits WHERE auditable_type = 'Bank'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(audits, 3);
    }
}
