// src/models/view.rs
//
// Payloads de "tela" que o frontend consome (listagem, formulário, flash).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::common::list_query::ListQuery;

/// Mensagem flash exibida pelo frontend após uma ação.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct Flash {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Self { success: Some(message.into()), ..Default::default() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { error: Some(message.into()), ..Default::default() }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self { info: Some(message.into()), ..Default::default() }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PageMeta {
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    pub last_page: i64,
    pub from: Option<i64>,
    pub to: Option<i64>,
}

impl PageMeta {
    pub fn new(query: &ListQuery, total: i64, rows_on_page: usize) -> Self {
        let per_page = i64::from(query.per_page.max(1));
        let last_page = ((total + per_page - 1) / per_page).max(1);
        let (from, to) = if rows_on_page == 0 {
            (None, None)
        } else {
            let from = query.offset() + 1;
            (Some(from), Some(from + rows_on_page as i64 - 1))
        };

        Self {
            page: query.page,
            per_page: query.per_page,
            total,
            last_page,
            from,
            to,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, ToSchema, sqlx::FromRow)]
pub struct Stats {
    pub total: i64,
    pub active: i64,
    pub inactive: i64,
}

/// Opção de select (id, código, nome) para os formulários e filtros.
#[derive(Debug, Clone, Serialize, ToSchema, sqlx::FromRow)]
pub struct OptionItem {
    pub id: Uuid,
    pub code: Option<String>,
    pub name: String,
}

pub type Options = BTreeMap<String, Vec<OptionItem>>;

/// Resposta do index: linhas + paginação + estatísticas + filtros aplicados.
#[derive(Debug, Serialize)]
pub struct IndexPage<T: Serialize> {
    pub rows: Vec<T>,
    pub meta: PageMeta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<Stats>,
    pub query: ListQuery,
    pub options: Options,
}

/// Tela de criação/edição.
#[derive(Debug, Serialize)]
pub struct FormView<T: Serialize> {
    pub resource: &'static str,
    pub label: &'static str,
    pub item: Option<T>,
    pub options: Options,
}

#[derive(Debug, Serialize)]
pub struct Mutation<T: Serialize> {
    pub data: T,
    pub flash: Flash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BulkActionKind {
    Delete,
    SetActive,
    Activate,
    Deactivate,
}

/// Corpo do `POST /{recurso}/bulk`.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct BulkRequest {
    pub action: BulkActionKind,

    #[validate(length(min = 1, max = 500, message = "Seleccione entre 1 y 500 registros."))]
    pub ids: Vec<Uuid>,

    /// Obrigatório quando `action` é `set_active`
    pub active: Option<bool>,

    /// Só para papéis: permite excluir papéis com permissões
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetActivePayload {
    pub active: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkResponse {
    pub processed: Vec<Uuid>,
    #[schema(value_type = Object)]
    pub skipped: BTreeMap<Uuid, String>,
    pub flash: Flash,
}

impl BulkResponse {
    pub fn new(processed: Vec<Uuid>, skipped: BTreeMap<Uuid, String>) -> Self {
        let flash = if processed.is_empty() && !skipped.is_empty() {
            Flash::error(format!("No se procesó ningún registro. Omitidos: {}.", skipped.len()))
        } else if skipped.is_empty() {
            Flash::success(format!("Procesados: {}.", processed.len()))
        } else {
            Flash::info(format!("Procesados: {}. Omitidos: {}.", processed.len(), skipped.len()))
        };

        Self { processed, skipped, flash }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::list_query::SortDir;
    use serde_json::Map;

    fn query(page: u32, per_page: u32) -> ListQuery {
        ListQuery {
            q: None,
            page,
            per_page,
            sort: "code".into(),
            dir: SortDir::Asc,
            filters: Map::new(),
        }
    }

    #[test]
    fn page_meta_computes_window() {
        let meta = PageMeta::new(&query(2, 10), 25, 10);
        assert_eq!(meta.last_page, 3);
        assert_eq!((meta.from, meta.to), (Some(11), Some(20)));
    }

    #[test]
    fn empty_page_has_no_window() {
        let meta = PageMeta::new(&query(1, 15), 0, 0);
        assert_eq!(meta.last_page, 1);
        assert_eq!((meta.from, meta.to), (None, None));
    }

    #[test]
    fn bulk_flash_reflects_outcome() {
        let id = Uuid::new_v4();
        let all_skipped = BulkResponse::new(vec![], BTreeMap::from([(id, "Rol protegido".to_string())]));
        assert!(all_skipped.flash.error.is_some());

        let clean = BulkResponse::new(vec![id], BTreeMap::new());
        assert_eq!(clean.flash.success.as_deref(), Some("Procesados: 1."));
    }
}
