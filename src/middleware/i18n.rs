// src/middleware/i18n.rs

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderMap};

use crate::common::i18n::{I18nStore, DEFAULT_LANG};

// Extrator de idioma (Accept-Language → "es" | "en" | "pt")
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locale(pub String);

impl Default for Locale {
    fn default() -> Self {
        Locale(DEFAULT_LANG.to_string())
    }
}

impl Locale {
    /// Primeiro idioma do cabeçalho que temos traduzido; senão o padrão.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let store = I18nStore::shared();

        headers
            .get(header::ACCEPT_LANGUAGE)
            .and_then(|header_value| header_value.to_str().ok())
            .and_then(|header_str| {
                accept_language::parse(header_str)
                    .into_iter()
                    // "pt-BR" -> "pt"
                    .map(|tag| tag.split('-').next().unwrap_or(&tag).to_ascii_lowercase())
                    .find(|lang| store.supports(lang))
            })
            .map(Locale)
            .unwrap_or_default()
    }
}

impl<S> FromRequestParts<S> for Locale
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Locale::from_headers(&parts.headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use rstest::rstest;

    #[rstest]
    #[case(Some("pt-BR,pt;q=0.9,en;q=0.8"), "pt")]
    #[case(Some("fr-FR, en;q=0.5"), "en")]
    #[case(Some("de"), "es")]
    #[case(None, "es")]
    fn picks_first_supported_language(#[case] header_value: Option<&str>, #[case] expected: &str) {
        let mut headers = HeaderMap::new();
        if let Some(value) = header_value {
            headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_str(value).unwrap());
        }
        assert_eq!(Locale::from_headers(&headers).0, expected);
    }
}
