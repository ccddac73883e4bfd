// src/middleware/json.rs

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;

use crate::{
    common::{
        error::{ApiError, AppError},
        i18n::I18nStore,
    },
    middleware::i18n::Locale,
};

/// `Json` com o mesmo corpo de erro do resto da API: um corpo que não
/// desserializa vira 422 `{ error, details }` no idioma da requisição.
pub struct AppJson<T>(pub T);

impl<S, T> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let locale = Locale::from_headers(req.headers());

        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => Err(body_error(rejection).to_api_error(&locale, I18nStore::shared())),
        }
    }
}

fn body_error(rejection: JsonRejection) -> AppError {
    tracing::debug!("Corpo JSON rejeitado ({}): {}", rejection.status(), rejection.body_text());
    AppError::field("body", rejection.body_text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, StatusCode},
        routing::post,
        Router,
    };
    use http_body_util::BodyExt;
    use serde::Deserialize;
    use serde_json::Value;
    use tower::ServiceExt;

    #[derive(Deserialize)]
    struct Item {
        code: String,
        #[allow(dead_code)]
        is_active: Option<bool>,
    }

    async fn echo(AppJson(item): AppJson<Item>) -> String {
        item.code
    }

    async fn send(body: &'static str, lang: &str) -> (StatusCode, Vec<u8>) {
        let response = Router::new()
            .route("/items", post(echo))
            .oneshot(
                axum::http::Request::post("/items")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::ACCEPT_LANGUAGE, lang)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        (status, response.into_body().collect().await.unwrap().to_bytes().to_vec())
    }

    #[tokio::test]
    async fn wrong_field_type_is_a_localized_422() {
        let (status, bytes) = send(r#"{"code":"X","name":"Y","is_active":"yes"}"#, "en").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "One or more fields are invalid.");
        assert!(body["details"]["body"][0].as_str().unwrap().contains("is_active"));
    }

    #[tokio::test]
    async fn broken_json_uses_the_same_error_shape() {
        let (status, bytes) = send(r#"{"code":"#, "pt-BR").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Um ou mais campos são inválidos.");
        assert!(body["details"]["body"].is_array());
    }

    #[tokio::test]
    async fn valid_body_reaches_the_handler() {
        let (status, bytes) = send(r#"{"code":"BOD","is_active":true}"#, "es").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bytes, b"BOD");
    }
}
