use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::{common::i18n::I18nStore, middleware::i18n::Locale, models::view::Flash};

// Erros por campo, no formato que o frontend espera: { "campo": ["mensagem", ...] }
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&Vec<String>> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn merge(&mut self, other: FieldErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    /// `Ok(())` quando não há erros acumulados.
    pub fn into_result(self) -> Result<(), AppError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AppError::ValidationError(self))
        }
    }
}

impl From<validator::ValidationErrors> for FieldErrors {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details = FieldErrors::new();
        for (field, field_errors) in errors.field_errors() {
            for e in field_errors.iter() {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string());
                details.add(field.to_string(), message);
            }
        }
        details
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(FieldErrors),

    // Regra de negócio: vira erro de campo + mensagem flash
    #[error("Regra de negócio violada em '{field}': {message}")]
    DomainRule { field: String, message: String },

    #[error("Permissão negada: {0}")]
    Forbidden(String),

    #[error("Registro não encontrado")]
    NotFound,

    #[error("O registro foi alterado por outro usuário")]
    VersionConflict,

    #[error("E-mail já existe")]
    EmailAlreadyExists,

    #[error("Credenciais inválidas")]
    InvalidCredentials,

    #[error("Token inválido")]
    InvalidToken,

    #[error("Usuário não encontrado")]
    UserNotFound,

    #[error("Fonte não encontrada: {0}")]
    FontNotFound(String),

    #[error("Falha ao gerar exportação: {0}")]
    ExportError(String),

    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),

    #[error("Erro de Bcrypt: {0}")]
    BcryptError(#[from] bcrypt::BcryptError),

    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::ValidationError(errors.into())
    }
}

impl AppError {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::ValidationError(FieldErrors::single(field, message))
    }

    pub fn rule(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::DomainRule {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Converte o erro interno na resposta HTTP, traduzindo a mensagem principal.
    pub fn to_api_error(self, locale: &Locale, i18n: &I18nStore) -> ApiError {
        let lang = locale.0.as_str();

        match self {
            AppError::ValidationError(errors) => ApiError {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                error: i18n.translate(lang, "validation"),
                details: Some(json!(errors)),
                flash: None,
            },
            AppError::DomainRule { field, message } => ApiError {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                error: i18n.translate(lang, "domain_rule"),
                details: Some(json!(FieldErrors::single(field, message.clone()))),
                flash: Some(Flash::error(message)),
            },
            AppError::Forbidden(permission) => {
                tracing::warn!("Acesso negado: permissão '{}' ausente", permission);
                ApiError::simple(
                    StatusCode::FORBIDDEN,
                    i18n.translate_with(lang, "forbidden", &[("permission", &permission)]),
                )
            }
            AppError::NotFound => {
                ApiError::simple(StatusCode::NOT_FOUND, i18n.translate(lang, "not_found"))
            }
            AppError::VersionConflict => ApiError::simple(
                StatusCode::CONFLICT,
                i18n.translate(lang, "version_conflict"),
            ),
            AppError::EmailAlreadyExists => {
                ApiError::simple(StatusCode::CONFLICT, i18n.translate(lang, "email_taken"))
            }
            AppError::InvalidCredentials => ApiError::simple(
                StatusCode::UNAUTHORIZED,
                i18n.translate(lang, "invalid_credentials"),
            ),
            AppError::InvalidToken => {
                ApiError::simple(StatusCode::UNAUTHORIZED, i18n.translate(lang, "invalid_token"))
            }
            AppError::UserNotFound => {
                ApiError::simple(StatusCode::NOT_FOUND, i18n.translate(lang, "user_not_found"))
            }
            // Todos os outros erros viram 500; o detalhe só vai para o log.
            ref e => {
                tracing::error!("Erro Interno do Servidor: {:?}", e);
                ApiError::simple(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    i18n.translate(lang, "internal"),
                )
            }
        }
    }
}

// O corpo de erro que sai para o cliente
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub details: Option<Value>,
    pub flash: Option<Flash>,
}

impl ApiError {
    pub fn simple(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            details: None,
            flash: None,
        }
    }
}

// Usado pelos extratores, que não conhecem o idioma da requisição
impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        err.to_api_error(&Locale::default(), I18nStore::shared())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({ "error": self.error });

        if let Some(details) = self.details {
            body["details"] = details;
        }
        if let Some(flash) = self.flash {
            body["flash"] = json!(flash);
        }

        (self.status, Json(body)).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(AppError::NotFound, StatusCode::NOT_FOUND)]
    #[case(AppError::Forbidden("banks.view".into()), StatusCode::FORBIDDEN)]
    #[case(AppError::VersionConflict, StatusCode::CONFLICT)]
    #[case(AppError::InvalidToken, StatusCode::UNAUTHORIZED)]
    #[case(AppError::field("code", "obrigatório"), StatusCode::UNPROCESSABLE_ENTITY)]
    #[case(AppError::rule("id", "Rol protegido"), StatusCode::UNPROCESSABLE_ENTITY)]
    #[case(AppError::ExportError("boom".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    fn maps_errors_to_status(#[case] err: AppError, #[case] expected: StatusCode) {
        let api = ApiError::from(err);
        assert_eq!(api.status, expected);
    }

    #[test]
    fn domain_rule_carries_field_error_and_flash() {
        let api = ApiError::from(AppError::rule("id", "Rol protegido"));

        let details = api.details.expect("details");
        assert_eq!(details["id"][0], "Rol protegido");
        assert_eq!(api.flash.and_then(|f| f.error).as_deref(), Some("Rol protegido"));
    }

    #[test]
    fn forbidden_message_names_the_permission() {
        let store = I18nStore::new();
        let api = AppError::Forbidden("roles.delete".into())
            .to_api_error(&Locale("en".into()), &store);

        assert!(api.error.contains("roles.delete"));
    }

    #[test]
    fn field_errors_merge_keeps_all_messages() {
        let mut a = FieldErrors::single("code", "uno");
        a.merge(FieldErrors::single("code", "dos"));
        a.merge(FieldErrors::single("name", "tres"));

        assert_eq!(a.get("code").map(Vec::len), Some(2));
        assert!(a.contains("name"));
        assert!(a.into_result().is_err());
        assert!(FieldErrors::new().into_result().is_ok());
    }
}
