// src/models/catalog.rs
//
// Linhas e payloads dos catálogos. Os catálogos simples (bancos, mercados,
// tipos de documento...) compartilham `CatalogItem`; locais e concessionários
// têm estruturas próprias com chaves estrangeiras.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidateEmail, ValidationError};

use crate::common::{code::validate_code, error::FieldErrors};

/// Valor de coluna para INSERT/UPDATE dinâmicos.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(Option<String>),
    Uuid(Option<Uuid>),
    Decimal(Option<Decimal>),
    Bool(bool),
}

/// Chave estrangeira informada num payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub field: &'static str,
    pub table: &'static str,
    pub label: &'static str,
    pub id: Uuid,
}

/// O que o serviço genérico precisa saber de uma linha de catálogo.
pub trait CatalogRecord {
    fn id(&self) -> Uuid;
    fn code(&self) -> &str;
    fn is_active(&self) -> bool;
    fn updated_at(&self) -> DateTime<Utc>;
}

/// O que o serviço genérico precisa saber de um payload de catálogo.
pub trait CatalogInput {
    fn code(&self) -> &str;
    fn is_active(&self) -> Option<bool>;
    fn version(&self) -> Option<DateTime<Utc>>;
    /// Colunas gravadas além de `code` e `is_active`
    fn columns(&self) -> Vec<(&'static str, SqlValue)>;
    fn references(&self) -> Vec<Reference> {
        Vec::new()
    }
    /// Regras que envolvem mais de um campo
    fn validate_consistency(&self) -> FieldErrors {
        FieldErrors::new()
    }
}

fn trimmed(value: &str) -> String {
    value.trim().to_string()
}

fn trimmed_opt(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// ---
// Validação Customizada
// ---
// Formulários mandam "" quando o campo opcional fica vazio
fn validate_optional_email(email: &str) -> Result<(), ValidationError> {
    let email = email.trim();
    if email.is_empty() || email.validate_email() {
        return Ok(());
    }
    let mut err = ValidationError::new("email");
    err.message = Some("El correo electrónico no es válido.".into());
    Err(err)
}

fn validate_not_negative(val: &Decimal) -> Result<(), ValidationError> {
    if val.is_sign_negative() {
        let mut err = ValidationError::new("range");
        err.add_param("min".into(), &0.0);
        err.message = Some("El valor no puede ser negativo.".into());
        return Err(err);
    }
    Ok(())
}

// =============================================================================
//  CATÁLOGOS SIMPLES
// =============================================================================

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct CatalogItem {
    pub id: Uuid,
    #[schema(example = "BOD")]
    pub code: String,
    #[schema(example = "Banco de Occidente")]
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CatalogRecord for CatalogItem {
    fn id(&self) -> Uuid {
        self.id
    }
    fn code(&self) -> &str {
        &self.code
    }
    fn is_active(&self) -> bool {
        self.is_active
    }
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CatalogItemPayload {
    #[validate(custom(function = "validate_code"))]
    #[schema(example = "BOD")]
    pub code: String,

    #[validate(length(min = 1, max = 150, message = "El nombre es obligatorio (máximo 150 caracteres)."))]
    #[schema(example = "Banco de Occidente")]
    pub name: String,

    pub is_active: Option<bool>,

    #[serde(rename = "_version")]
    pub version: Option<DateTime<Utc>>,
}

impl CatalogInput for CatalogItemPayload {
    fn code(&self) -> &str {
        &self.code
    }
    fn is_active(&self) -> Option<bool> {
        self.is_active
    }
    fn version(&self) -> Option<DateTime<Utc>> {
        self.version
    }
    fn columns(&self) -> Vec<(&'static str, SqlValue)> {
        vec![("name", SqlValue::Text(Some(trimmed(&self.name))))]
    }
}

// =============================================================================
//  LOCAIS
// =============================================================================

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Local {
    pub id: Uuid,
    #[schema(example = "L-101")]
    pub code: String,
    #[schema(example = "Local 101 - Pasillo A")]
    pub name: String,
    pub market_id: Uuid,
    pub market_name: Option<String>,
    pub area: Option<Decimal>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CatalogRecord for Local {
    fn id(&self) -> Uuid {
        self.id
    }
    fn code(&self) -> &str {
        &self.code
    }
    fn is_active(&self) -> bool {
        self.is_active
    }
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LocalPayload {
    #[validate(custom(function = "validate_code"))]
    pub code: String,

    #[validate(length(min = 1, max = 150, message = "El nombre es obligatorio (máximo 150 caracteres)."))]
    pub name: String,

    #[validate(required(message = "El mercado es obligatorio."))]
    pub market_id: Option<Uuid>,

    #[validate(custom(function = "validate_not_negative"))]
    pub area: Option<Decimal>,

    pub is_active: Option<bool>,

    #[serde(rename = "_version")]
    pub version: Option<DateTime<Utc>>,
}

impl CatalogInput for LocalPayload {
    fn code(&self) -> &str {
        &self.code
    }
    fn is_active(&self) -> Option<bool> {
        self.is_active
    }
    fn version(&self) -> Option<DateTime<Utc>> {
        self.version
    }
    fn columns(&self) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("name", SqlValue::Text(Some(trimmed(&self.name)))),
            ("market_id", SqlValue::Uuid(self.market_id)),
            ("area", SqlValue::Decimal(self.area)),
        ]
    }
    fn references(&self) -> Vec<Reference> {
        self.market_id
            .map(|id| Reference { field: "market_id", table: "markets", label: "mercado", id })
            .into_iter()
            .collect()
    }
}

// =============================================================================
//  CONCESSIONÁRIOS
// =============================================================================

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Concessionaire {
    pub id: Uuid,
    pub code: String,
    #[schema(example = "Comercial Pérez S.A.")]
    pub name: String,
    pub document_type_id: Uuid,
    pub document_type_name: Option<String>,
    pub document_number: String,
    pub concessionaire_type_id: Uuid,
    pub concessionaire_type_name: Option<String>,
    pub business_line_id: Option<Uuid>,
    pub business_line_name: Option<String>,
    pub bank_id: Option<Uuid>,
    pub bank_name: Option<String>,
    pub bank_account: Option<String>,
    pub local_id: Option<Uuid>,
    pub local_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CatalogRecord for Concessionaire {
    fn id(&self) -> Uuid {
        self.id
    }
    fn code(&self) -> &str {
        &self.code
    }
    fn is_active(&self) -> bool {
        self.is_active
    }
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ConcessionairePayload {
    #[validate(custom(function = "validate_code"))]
    pub code: String,

    #[validate(length(min = 1, max = 200, message = "El nombre es obligatorio (máximo 200 caracteres)."))]
    pub name: String,

    #[validate(required(message = "El tipo de documento es obligatorio."))]
    pub document_type_id: Option<Uuid>,

    #[validate(length(min = 1, max = 30, message = "El número de documento es obligatorio (máximo 30 caracteres)."))]
    pub document_number: String,

    #[validate(required(message = "El tipo de concesionario es obligatorio."))]
    pub concessionaire_type_id: Option<Uuid>,

    pub business_line_id: Option<Uuid>,
    pub bank_id: Option<Uuid>,

    #[validate(length(max = 34, message = "La cuenta bancaria no puede superar 34 caracteres."))]
    pub bank_account: Option<String>,

    pub local_id: Option<Uuid>,

    #[validate(custom(function = "validate_optional_email"))]
    pub email: Option<String>,

    #[validate(length(max = 30, message = "El teléfono no puede superar 30 caracteres."))]
    pub phone: Option<String>,

    pub is_active: Option<bool>,

    #[serde(rename = "_version")]
    pub version: Option<DateTime<Utc>>,
}

impl CatalogInput for ConcessionairePayload {
    fn code(&self) -> &str {
        &self.code
    }
    fn is_active(&self) -> Option<bool> {
        self.is_active
    }
    fn version(&self) -> Option<DateTime<Utc>> {
        self.version
    }
    fn columns(&self) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("name", SqlValue::Text(Some(trimmed(&self.name)))),
            ("document_type_id", SqlValue::Uuid(self.document_type_id)),
            ("document_number", SqlValue::Text(Some(trimmed(&self.document_number).to_uppercase()))),
            ("concessionaire_type_id", SqlValue::Uuid(self.concessionaire_type_id)),
            ("business_line_id", SqlValue::Uuid(self.business_line_id)),
            ("bank_id", SqlValue::Uuid(self.bank_id)),
            ("bank_account", SqlValue::Text(trimmed_opt(&self.bank_account))),
            ("local_id", SqlValue::Uuid(self.local_id)),
            ("email", SqlValue::Text(trimmed_opt(&self.email).map(|e| e.to_lowercase()))),
            ("phone", SqlValue::Text(trimmed_opt(&self.phone))),
        ]
    }
    fn references(&self) -> Vec<Reference> {
        [
            (self.document_type_id, "document_type_id", "document_types", "tipo de documento"),
            (self.concessionaire_type_id, "concessionaire_type_id", "concessionaire_types", "tipo de concesionario"),
            (self.business_line_id, "business_line_id", "business_lines", "giro comercial"),
            (self.bank_id, "bank_id", "banks", "banco"),
            (self.local_id, "local_id", "locals", "local"),
        ]
        .into_iter()
        .filter_map(|(id, field, table, label)| id.map(|id| Reference { field, table, label, id }))
        .collect()
    }
    // Regra: se informar a conta, precisamos saber de qual banco.
    fn validate_consistency(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if trimmed_opt(&self.bank_account).is_some() && self.bank_id.is_none() {
            errors.add("bank_id", "Debe indicar el banco de la cuenta.");
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn concessionaire(extra: serde_json::Value) -> ConcessionairePayload {
        let mut base = json!({
            "code": "C-001",
            "name": "Comercial Pérez",
            "document_type_id": Uuid::new_v4(),
            "document_number": "0801-1990",
            "concessionaire_type_id": Uuid::new_v4(),
        });
        if let (Some(base), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        serde_json::from_value(base).unwrap()
    }

    #[test]
    fn bank_account_requires_bank() {
        let payload = concessionaire(json!({ "bank_account": "123-456" }));
        assert!(payload.validate().is_ok());
        assert!(payload.validate_consistency().contains("bank_id"));

        let payload = concessionaire(json!({ "bank_account": "123-456", "bank_id": Uuid::new_v4() }));
        assert!(payload.validate_consistency().is_empty());
    }

    #[test]
    fn blank_email_passes_but_malformed_fails() {
        assert!(concessionaire(json!({ "email": "" })).validate().is_ok());
        let errors = concessionaire(json!({ "email": "nope" })).validate().unwrap_err();
        assert!(errors.field_errors().contains_key("email"));
    }

    #[test]
    fn concessionaire_references_only_include_present_ids() {
        let payload = concessionaire(json!({}));
        let fields: Vec<_> = payload.references().iter().map(|r| r.field).collect();
        assert_eq!(fields, vec!["document_type_id", "concessionaire_type_id"]);
    }

    #[test]
    fn blank_optional_text_is_stored_as_null() {
        let payload = concessionaire(json!({ "email": "  ", "phone": " 555 " }));
        let columns = payload.columns();
        let get = |name: &str| columns.iter().find(|(c, _)| *c == name).map(|(_, v)| v.clone());
        assert_eq!(get("email"), Some(SqlValue::Text(None)));
        assert_eq!(get("phone"), Some(SqlValue::Text(Some("555".into()))));
    }

    #[test]
    fn local_rejects_negative_area_and_missing_market() {
        let payload: LocalPayload = serde_json::from_value(json!({
            "code": "L-1", "name": "Local", "area": -3
        }))
        .unwrap();
        let errors = payload.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("area"));
        assert!(fields.contains_key("market_id"));
    }

    #[test]
    fn simple_payload_reads_version_field() {
        let payload: CatalogItemPayload = serde_json::from_value(json!({
            "code": " bod ", "name": "Bodega", "_version": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert!(payload.version.is_some());
        assert!(payload.validate().is_ok());
    }
}
