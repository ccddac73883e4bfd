// src/catalogs.rs
//
// Cada catálogo é um tipo marcador que descreve tabela, colunas, regras de
// listagem e dependências. Handlers, serviço e repositório são genéricos sobre
// `CatalogDef`, então registrar um catálogo novo é só declarar o tipo aqui.

use serde::{de::DeserializeOwned, Serialize};
use sqlx::{postgres::PgRow, FromRow};
use validator::Validate;

use crate::{
    common::list_query::{FilterDef, FilterKind, IndexConfig, ListQuery, SortDef, SortDir},
    models::catalog::{
        CatalogInput, CatalogItem, CatalogItemPayload, CatalogRecord, Concessionaire,
        ConcessionairePayload, Local, LocalPayload,
    },
};

/// Tabela que referencia o catálogo (bloqueia exclusão e troca de código).
#[derive(Debug)]
pub struct Dependent {
    pub table: &'static str,
    pub column: &'static str,
}

/// Lista de opções (id, código, nome) enviada junto com formulários e filtros.
#[derive(Debug)]
pub struct OptionSource {
    pub key: &'static str,
    pub table: &'static str,
}

#[derive(Debug)]
pub struct ExportColumn {
    pub key: &'static str,
    pub header: &'static str,
}

pub trait CatalogDef: Send + Sync + 'static {
    type Row: for<'r> FromRow<'r, PgRow> + CatalogRecord + Serialize + Send + Sync + Unpin + 'static;
    type Payload: DeserializeOwned + Validate + CatalogInput + Send + Sync + 'static;

    /// Segmento da rota (`/api/{SLUG}`)
    const SLUG: &'static str;
    /// Tabela; também é o prefixo das permissões (`{TABLE}.view`)
    const TABLE: &'static str;
    /// Nome do modelo gravado na auditoria
    const AUDIT_TYPE: &'static str;
    const LABEL: &'static str;
    const LABEL_PLURAL: &'static str;
    /// Colunas do SELECT (alias `t` para a tabela principal)
    const SELECT: &'static str;
    /// FROM com os JOINs necessários
    const FROM: &'static str;

    fn index_config() -> &'static IndexConfig;

    fn dependents() -> &'static [Dependent] {
        &[]
    }

    fn option_sources() -> &'static [OptionSource] {
        &[]
    }

    fn export_columns() -> &'static [ExportColumn];

    fn permission(ability: &str) -> String {
        format!("{}.{}", Self::TABLE, ability)
    }
}

// =============================================================================
//  CATÁLOGOS SIMPLES
// =============================================================================

const SIMPLE_SELECT: &str = "t.id, t.code, t.name, t.is_active, t.created_at, t.updated_at";

static SIMPLE_INDEX: IndexConfig = IndexConfig {
    sorts: &[
        SortDef { key: "code", column: "t.code" },
        SortDef { key: "name", column: "t.name" },
        SortDef { key: "is_active", column: "t.is_active" },
        SortDef { key: "created_at", column: "t.created_at" },
        SortDef { key: "updated_at", column: "t.updated_at" },
    ],
    default_sort: "code",
    default_dir: SortDir::Asc,
    default_per_page: 15,
    max_per_page: 100,
    filters: &[
        FilterDef { key: "is_active", column: "t.is_active", kind: FilterKind::Bool },
        FilterDef { key: "code", column: "t.code", kind: FilterKind::Text },
        FilterDef { key: "name", column: "t.name", kind: FilterKind::Text },
        FilterDef { key: "created_at", column: "t.created_at", kind: FilterKind::DateRange },
        FilterDef { key: "updated_at", column: "t.updated_at", kind: FilterKind::DateRange },
    ],
    search: &["t.code", "t.name"],
    sanitize: None,
};

static SIMPLE_EXPORT: &[ExportColumn] = &[
    ExportColumn { key: "code", header: "Código" },
    ExportColumn { key: "name", header: "Nombre" },
    ExportColumn { key: "is_active", header: "Activo" },
    ExportColumn { key: "created_at", header: "Creado" },
    ExportColumn { key: "updated_at", header: "Actualizado" },
];

macro_rules! simple_catalog {
    (
        $ty:ident,
        slug: $slug:literal,
        table: $table:literal,
        audit: $audit:literal,
        label: $label:literal,
        plural: $plural:literal,
        dependents: [$(($dep_table:literal, $dep_column:literal)),* $(,)?]
    ) => {
        pub struct $ty;

        impl CatalogDef for $ty {
            type Row = CatalogItem;
            type Payload = CatalogItemPayload;

            const SLUG: &'static str = $slug;
            const TABLE: &'static str = $table;
            const AUDIT_TYPE: &'static str = $audit;
            const LABEL: &'static str = $label;
            const LABEL_PLURAL: &'static str = $plural;
            const SELECT: &'static str = SIMPLE_SELECT;
            const FROM: &'static str = concat!($table, " t");

            fn index_config() -> &'static IndexConfig {
                &SIMPLE_INDEX
            }

            fn dependents() -> &'static [Dependent] {
                &[$(Dependent { table: $dep_table, column: $dep_column }),*]
            }

            fn export_columns() -> &'static [ExportColumn] {
                SIMPLE_EXPORT
            }
        }
    };
}

simple_catalog!(
    Banks,
    slug: "banks",
    table: "banks",
    audit: "Bank",
    label: "Banco",
    plural: "Bancos",
    dependents: [("concessionaires", "bank_id")]
);

simple_catalog!(
    Markets,
    slug: "markets",
    table: "markets",
    audit: "Market",
    label: "Mercado",
    plural: "Mercados",
    dependents: [("locals", "market_id")]
);

simple_catalog!(
    DocumentTypes,
    slug: "document-types",
    table: "document_types",
    audit: "DocumentType",
    label: "Tipo de documento",
    plural: "Tipos de documento",
    dependents: [("concessionaires", "document_type_id")]
);

simple_catalog!(
    ConcessionaireTypes,
    slug: "concessionaire-types",
    table: "concessionaire_types",
    audit: "ConcessionaireType",
    label: "Tipo de concesionario",
    plural: "Tipos de concesionario",
    dependents: [("concessionaires", "concessionaire_type_id")]
);

simple_catalog!(
    BusinessLines,
    slug: "business-lines",
    table: "business_lines",
    audit: "BusinessLine",
    label: "Giro comercial",
    plural: "Giros comerciales",
    dependents: [("concessionaires", "business_line_id")]
);

// =============================================================================
//  LOCAIS
// =============================================================================

pub struct Locals;

static LOCALS_INDEX: IndexConfig = IndexConfig {
    sorts: &[
        SortDef { key: "code", column: "t.code" },
        SortDef { key: "name", column: "t.name" },
        SortDef { key: "market", column: "m.name" },
        SortDef { key: "area", column: "t.area" },
        SortDef { key: "is_active", column: "t.is_active" },
        SortDef { key: "created_at", column: "t.created_at" },
    ],
    default_sort: "code",
    default_dir: SortDir::Asc,
    default_per_page: 25,
    max_per_page: 200,
    filters: &[
        FilterDef { key: "is_active", column: "t.is_active", kind: FilterKind::Bool },
        FilterDef { key: "market_id", column: "t.market_id", kind: FilterKind::Uuid },
        FilterDef { key: "area", column: "t.area", kind: FilterKind::NumberRange },
        FilterDef { key: "created_at", column: "t.created_at", kind: FilterKind::DateRange },
    ],
    search: &["t.code", "t.name", "m.name"],
    sanitize: None,
};

impl CatalogDef for Locals {
    type Row = Local;
    type Payload = LocalPayload;

    const SLUG: &'static str = "locals";
    const TABLE: &'static str = "locals";
    const AUDIT_TYPE: &'static str = "Local";
    const LABEL: &'static str = "Local";
    const LABEL_PLURAL: &'static str = "Locales";
    const SELECT: &'static str = "t.id, t.code, t.name, t.market_id, m.name AS market_name, t.area, \
         t.is_active, t.created_at, t.updated_at";
    const FROM: &'static str = "locals t LEFT JOIN markets m ON m.id = t.market_id";

    fn index_config() -> &'static IndexConfig {
        &LOCALS_INDEX
    }

    fn dependents() -> &'static [Dependent] {
        &[Dependent { table: "concessionaires", column: "local_id" }]
    }

    fn option_sources() -> &'static [OptionSource] {
        &[OptionSource { key: "markets", table: "markets" }]
    }

    fn export_columns() -> &'static [ExportColumn] {
        &[
            ExportColumn { key: "code", header: "Código" },
            ExportColumn { key: "name", header: "Nombre" },
            ExportColumn { key: "market_name", header: "Mercado" },
            ExportColumn { key: "area", header: "Área (m²)" },
            ExportColumn { key: "is_active", header: "Activo" },
            ExportColumn { key: "created_at", header: "Creado" },
        ]
    }
}

// =============================================================================
//  CONCESSIONÁRIOS
// =============================================================================

pub struct Concessionaires;

// Espaços repetidos atrapalham a busca por número de documento
fn sanitize_concessionaires(query: &mut ListQuery) {
    if let Some(q) = query.q.as_mut() {
        let compact: String = q.split_whitespace().collect::<Vec<_>>().join(" ");
        *q = compact;
    }
}

static CONCESSIONAIRES_INDEX: IndexConfig = IndexConfig {
    sorts: &[
        SortDef { key: "code", column: "t.code" },
        SortDef { key: "name", column: "t.name" },
        SortDef { key: "document_number", column: "t.document_number" },
        SortDef { key: "concessionaire_type", column: "ct.name" },
        SortDef { key: "local", column: "l.name" },
        SortDef { key: "is_active", column: "t.is_active" },
        SortDef { key: "created_at", column: "t.created_at" },
    ],
    default_sort: "name",
    default_dir: SortDir::Asc,
    default_per_page: 25,
    max_per_page: 200,
    filters: &[
        FilterDef { key: "is_active", column: "t.is_active", kind: FilterKind::Bool },
        FilterDef { key: "document_type_id", column: "t.document_type_id", kind: FilterKind::Uuid },
        FilterDef { key: "concessionaire_type_id", column: "t.concessionaire_type_id", kind: FilterKind::Uuid },
        FilterDef { key: "business_line_id", column: "t.business_line_id", kind: FilterKind::Uuid },
        FilterDef { key: "bank_id", column: "t.bank_id", kind: FilterKind::Uuid },
        FilterDef { key: "local_id", column: "t.local_id", kind: FilterKind::Uuid },
        FilterDef { key: "market_id", column: "l.market_id", kind: FilterKind::Uuid },
        FilterDef { key: "created_at", column: "t.created_at", kind: FilterKind::DateRange },
    ],
    search: &["t.code", "t.name", "t.document_number", "t.email"],
    sanitize: Some(sanitize_concessionaires),
};

impl CatalogDef for Concessionaires {
    type Row = Concessionaire;
    type Payload = ConcessionairePayload;

    const SLUG: &'static str = "concessionaires";
    const TABLE: &'static str = "concessionaires";
    const AUDIT_TYPE: &'static str = "Concessionaire";
    const LABEL: &'static str = "Concesionario";
    const LABEL_PLURAL: &'static str = "Concesionarios";
    const SELECT: &'static str = "t.id, t.code, t.name, \
         t.document_type_id, dt.name AS document_type_name, t.document_number, \
         t.concessionaire_type_id, ct.name AS concessionaire_type_name, \
         t.business_line_id, bl.name AS business_line_name, \
         t.bank_id, b.name AS bank_name, t.bank_account, \
         t.local_id, l.name AS local_name, \
         t.email, t.phone, t.is_active, t.created_at, t.updated_at";
    const FROM: &'static str = "concessionaires t \
         LEFT JOIN document_types dt ON dt.id = t.document_type_id \
         LEFT JOIN concessionaire_types ct ON ct.id = t.concessionaire_type_id \
         LEFT JOIN business_lines bl ON bl.id = t.business_line_id \
         LEFT JOIN banks b ON b.id = t.bank_id \
         LEFT JOIN locals l ON l.id = t.local_id";

    fn index_config() -> &'static IndexConfig {
        &CONCESSIONAIRES_INDEX
    }

    fn option_sources() -> &'static [OptionSource] {
        &[
            OptionSource { key: "document_types", table: "document_types" },
            OptionSource { key: "concessionaire_types", table: "concessionaire_types" },
            OptionSource { key: "business_lines", table: "business_lines" },
            OptionSource { key: "banks", table: "banks" },
            OptionSource { key: "locals", table: "locals" },
            OptionSource { key: "markets", table: "markets" },
        ]
    }

    fn export_columns() -> &'static [ExportColumn] {
        &[
            ExportColumn { key: "code", header: "Código" },
            ExportColumn { key: "name", header: "Nombre" },
            ExportColumn { key: "document_type_name", header: "Tipo de documento" },
            ExportColumn { key: "document_number", header: "Documento" },
            ExportColumn { key: "concessionaire_type_name", header: "Tipo" },
            ExportColumn { key: "business_line_name", header: "Giro" },
            ExportColumn { key: "bank_name", header: "Banco" },
            ExportColumn { key: "bank_account", header: "Cuenta" },
            ExportColumn { key: "local_name", header: "Local" },
            ExportColumn { key: "email", header: "Correo" },
            ExportColumn { key: "phone", header: "Teléfono" },
            ExportColumn { key: "is_active", header: "Activo" },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::list_query::normalize;
    use serde_json::{json, Map, Value};

    fn check_config<R: CatalogDef>() {
        let config = R::index_config();
        assert!(config.sort_column(config.default_sort).is_some(), "{} default sort", R::SLUG);
        assert!(config.default_per_page <= config.max_per_page);
        assert!(R::FROM.starts_with(R::TABLE));
        assert!(!R::export_columns().is_empty());
    }

    #[test]
    fn every_catalog_has_a_consistent_index_config() {
        check_config::<Banks>();
        check_config::<Markets>();
        check_config::<DocumentTypes>();
        check_config::<ConcessionaireTypes>();
        check_config::<BusinessLines>();
        check_config::<Locals>();
        check_config::<Concessionaires>();
    }

    #[test]
    fn permissions_use_the_table_prefix() {
        assert_eq!(DocumentTypes::permission("view"), "document_types.view");
        assert_eq!(Banks::permission("delete"), "banks.delete");
    }

    #[test]
    fn concessionaire_search_collapses_whitespace() {
        let Value::Object(input) = json!({ "q": "  0801   1990  " }) else { unreachable!() };
        let query = normalize(&input, Concessionaires::index_config()).unwrap();
        assert_eq!(query.q.as_deref(), Some("0801 1990"));

        let query = normalize(&Map::new(), Concessionaires::index_config()).unwrap();
        assert_eq!(query.sort, "name");
    }
}
