// src/services/auth.rs

use bcrypt::{hash, verify};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::UserRepository,
    models::auth::{Claims, MeResponse, User},
};

#[derive(Clone)]
pub struct AuthService {
    user_repo: UserRepository,
    jwt_secret: String,
    pool: PgPool,
}

impl AuthService {
    pub fn new(user_repo: UserRepository, jwt_secret: String, pool: PgPool) -> Self {
        Self { user_repo, jwt_secret, pool }
    }

    pub async fn register_user(&self, name: &str, email: &str, password: &str) -> Result<String, AppError> {
        // 1. Hashing fora da transação (não toca no banco)
        let password_clone = password.to_owned();
        let hashed_password = tokio::task::spawn_blocking(move || hash(&password_clone, bcrypt::DEFAULT_COST))
            .await
            .map_err(|e| anyhow::anyhow!("Falha na task de hashing: {}", e))??;

        let email = email.trim().to_lowercase();

        // --- INÍCIO DA TRANSAÇÃO ---
        let mut tx = self.pool.begin().await?;

        // 2. Cria o usuário
        let new_user = self
            .user_repo
            .create_user(&mut *tx, name.trim(), &email, &hashed_password)
            .await?;

        // 3. O primeiro usuário vira administrador
        let is_first = self.user_repo.assign_bootstrap_admin(&mut *tx, new_user.id).await?;
        if is_first {
            tracing::info!("👑 Primeiro usuário {} recebeu o papel administrador", new_user.email);
        }

        tx.commit().await?;
        // --- FIM DA TRANSAÇÃO ---

        self.create_token(new_user.id)
    }

    pub async fn login_user(&self, email: &str, password: &str) -> Result<String, AppError> {
        let user = self
            .user_repo
            .find_by_email(email.trim())
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        let password_clone = password.to_owned();
        let password_hash_clone = user.password_hash.clone();

        // Executa a verificação em um thread separado
        let is_password_valid = tokio::task::spawn_blocking(move || verify(&password_clone, &password_hash_clone))
            .await
            .map_err(|e| anyhow::anyhow!("Falha na task de verificação de senha: {}", e))??;

        if !is_password_valid {
            return Err(AppError::InvalidCredentials);
        }

        self.create_token(user.id)
    }

    pub async fn validate_token(&self, token: &str) -> Result<User, AppError> {
        let claims = decode_claims(token, &self.jwt_secret)?;

        self.user_repo
            .find_by_id(claims.sub)
            .await?
            .ok_or(AppError::UserNotFound)
    }

    pub async fn me(&self, user: User) -> Result<MeResponse, AppError> {
        let roles = self.user_repo.role_names(user.id).await?;
        let permissions = self.user_repo.permission_slugs(user.id).await?;
        Ok(MeResponse { user, roles, permissions })
    }

    pub async fn find_user(&self, id: Uuid) -> Result<User, AppError> {
        self.user_repo.find_by_id(id).await?.ok_or(AppError::UserNotFound)
    }

    fn create_token(&self, user_id: Uuid) -> Result<String, AppError> {
        create_token(user_id, &self.jwt_secret)
    }
}

pub fn create_token(user_id: Uuid, secret: &str) -> Result<String, AppError> {
    let now = Utc::now();
    let expires_at = now + chrono::Duration::days(7);

    let claims = Claims {
        sub: user_id,
        exp: expires_at.timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?)
}

pub fn decode_claims(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_ref()), &Validation::default())
        .map_err(|_| AppError::InvalidToken)?;
    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips_with_the_same_secret() {
        let user_id = Uuid::new_v4();
        let token = create_token(user_id, "segredo").unwrap();

        let claims = decode_claims(&token, "segredo").unwrap();
        assert_eq!(claims.sub, user_id);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = create_token(Uuid::new_v4(), "segredo").unwrap();
        assert!(matches!(decode_claims(&token, "outro"), Err(AppError::InvalidToken)));
        assert!(matches!(decode_claims("lixo", "segredo"), Err(AppError::InvalidToken)));
    }
}
