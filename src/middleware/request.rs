// src/middleware/request.rs

use std::{
    convert::Infallible,
    net::{IpAddr, SocketAddr},
};

use axum::{
    extract::{ConnectInfo, FromRequestParts, OriginalUri},
    http::{header, request::Parts, HeaderMap},
};

use crate::{middleware::auth::AuthenticatedUser, models::audit::Actor};

// Primeiro IP do x-forwarded-for (o cliente original atrás do proxy).
// Lixo no header não entra na auditoria (coluna de 45 caracteres).
fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.split(',').next())
        .and_then(|ip| ip.trim().parse::<IpAddr>().ok())
        .map(|ip| ip.to_string())
}

// Quem está fazendo a ação, para a auditoria
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts.extensions.get::<AuthenticatedUser>().map(|user| user.0.id);

        let ip_address = forwarded_ip(&parts.headers).or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });

        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        // Dentro de rotas aninhadas o `uri` perde o prefixo
        let url = parts
            .extensions
            .get::<OriginalUri>()
            .map(|OriginalUri(uri)| uri.to_string())
            .or_else(|| Some(parts.uri.to_string()));

        Ok(Actor { user_id, ip_address, user_agent, url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Request};

    #[tokio::test]
    async fn actor_prefers_forwarded_ip_and_keeps_agent() {
        let request = Request::builder()
            .uri("/api/banks/bulk")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header(header::USER_AGENT, HeaderValue::from_static("curl/8.0"))
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let actor = Actor::from_request_parts(&mut parts, &()).await.unwrap();

        assert_eq!(actor.user_id, None);
        assert_eq!(actor.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(actor.user_agent.as_deref(), Some("curl/8.0"));
        assert_eq!(actor.url.as_deref(), Some("/api/banks/bulk"));
    }

    #[tokio::test]
    async fn actor_falls_back_to_peer_address() {
        let mut request = Request::builder().uri("/api/markets").body(()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 20], 5000))));
        let (mut parts, _) = request.into_parts();

        let actor = Actor::from_request_parts(&mut parts, &()).await.unwrap();

        assert_eq!(actor.ip_address.as_deref(), Some("192.168.1.20"));
    }

    #[tokio::test]
    async fn garbage_forwarded_for_falls_back_to_peer_address() {
        let mut request = Request::builder()
            .uri("/api/banks/1")
            .header("x-forwarded-for", "x".repeat(60))
            .body(())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 1, 2, 3], 443))));
        let (mut parts, _) = request.into_parts();

        let actor = Actor::from_request_parts(&mut parts, &()).await.unwrap();

        assert_eq!(actor.ip_address.as_deref(), Some("10.1.2.3"));
    }

    #[tokio::test]
    async fn forwarded_ipv6_is_kept() {
        let request = Request::builder()
            .uri("/api/markets")
            .header("x-forwarded-for", " 2001:db8::1 ")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let actor = Actor::from_request_parts(&mut parts, &()).await.unwrap();

        assert_eq!(actor.ip_address.as_deref(), Some("2001:db8::1"));
    }
}
