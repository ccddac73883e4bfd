// src/services/audit_service.rs

use uuid::Uuid;

use crate::{
    common::{error::AppError, list_query::ListQuery},
    db::AuditRepository,
    models::{
        audit::Audit,
        view::{IndexPage, Options, PageMeta},
    },
};

#[derive(Clone)]
pub struct AuditService {
    repo: AuditRepository,
}

impl AuditService {
    pub fn new(repo: AuditRepository) -> Self {
        Self { repo }
    }

    pub async fn index(&self, query: ListQuery) -> Result<IndexPage<Audit>, AppError> {
        let (rows, total) = self.repo.list(&query).await?;

        Ok(IndexPage {
            meta: PageMeta::new(&query, total, rows.len()),
            rows,
            stats: None,
            query,
            options: Options::new(),
        })
    }

    pub async fn show(&self, id: Uuid) -> Result<Audit, AppError> {
        self.repo.find(id).await?.ok_or(AppError::NotFound)
    }

    pub async fn export_rows(&self, query: &ListQuery, limit: i64) -> Result<Vec<Audit>, AppError> {
        self.repo.list_for_export(query, limit).await
    }
}
