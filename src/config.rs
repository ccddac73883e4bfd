// src/config.rs

use std::{env, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    common::i18n::I18nStore,
    db::{AuditRepository, CatalogRepository, RbacRepository, UserRepository},
    services::{
        audit_service::AuditService, auth::AuthService, catalog_service::CatalogService,
        export_service::ExportService, rbac_service::RbacService,
    },
};

/// Configuração lida do ambiente (`.env` via dotenvy).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub fonts_dir: PathBuf,
    pub export_max_rows: i64,
    pub enforce_version_check: bool,
    pub protected_roles: Vec<String>,
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = get("DATABASE_URL").context("DATABASE_URL deve ser definida")?;
        let jwt_secret = get("JWT_SECRET").context("JWT_SECRET deve ser definido")?;

        let db_max_connections = match get("DB_MAX_CONNECTIONS") {
            Some(raw) => raw.trim().parse().context("DB_MAX_CONNECTIONS deve ser um número")?,
            None => 5,
        };
        let export_max_rows = match get("EXPORT_MAX_ROWS") {
            Some(raw) => raw.trim().parse().context("EXPORT_MAX_ROWS deve ser um número")?,
            None => 5000,
        };

        let protected_roles = get("PROTECTED_ROLES")
            .unwrap_or_else(|| "Administrador,Super Admin".to_string())
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            database_url,
            jwt_secret,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            db_max_connections,
            fonts_dir: PathBuf::from(get("FONTS_DIR").unwrap_or_else(|| "./fonts".to_string())),
            export_max_rows,
            enforce_version_check: get("ENFORCE_VERSION_CHECK").is_some_and(|raw| parse_bool(&raw)),
            protected_roles,
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub config: Arc<Config>,
    pub i18n_store: Arc<I18nStore>,
    pub auth_service: AuthService,
    pub rbac_service: RbacService,
    pub catalog_service: CatalogService,
    pub audit_service: AuditService,
    pub export_service: ExportService,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        // Conecta ao banco de dados, usando '?' para propagar erros
        let db_pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.database_url)
            .await?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        Ok(Self::from_parts(db_pool, config))
    }

    // --- Monta o gráfico de dependências ---
    pub fn from_parts(db_pool: PgPool, config: Config) -> Self {
        let user_repo = UserRepository::new(db_pool.clone());
        let rbac_repo = RbacRepository::new(db_pool.clone());
        let catalog_repo = CatalogRepository::new(db_pool.clone());
        let audit_repo = AuditRepository::new(db_pool.clone());

        let auth_service = AuthService::new(user_repo, config.jwt_secret.clone(), db_pool.clone());
        let rbac_service = RbacService::new(
            rbac_repo,
            audit_repo.clone(),
            db_pool.clone(),
            config.protected_roles.clone(),
            config.enforce_version_check,
        );
        let catalog_service = CatalogService::new(
            catalog_repo,
            audit_repo.clone(),
            db_pool.clone(),
            config.enforce_version_check,
        );
        let audit_service = AuditService::new(audit_repo);
        let export_service = ExportService::new(config.fonts_dir.clone(), config.export_max_rows);

        Self {
            db_pool,
            config: Arc::new(config),
            i18n_store: Arc::new(I18nStore::new()),
            auth_service,
            rbac_service,
            catalog_service,
            audit_service,
            export_service,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_optional_vars_are_missing() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://x"), ("JWT_SECRET", "s")])).unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.db_max_connections, 5);
        assert_eq!(config.export_max_rows, 5000);
        assert!(!config.enforce_version_check);
        assert_eq!(config.protected_roles, vec!["Administrador", "Super Admin"]);
        assert_eq!(config.fonts_dir, PathBuf::from("./fonts"));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://x"),
            ("JWT_SECRET", "s"),
            ("ENFORCE_VERSION_CHECK", "TRUE"),
            ("PROTECTED_ROLES", " Root , ,Dueño "),
            ("EXPORT_MAX_ROWS", "100"),
        ]))
        .unwrap();

        assert!(config.enforce_version_check);
        assert_eq!(config.protected_roles, vec!["Root", "Dueño"]);
        assert_eq!(config.export_max_rows, 100);
    }

    #[test]
    fn missing_secret_is_an_error() {
        assert!(Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://x")])).is_err());
        assert!(Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://x"),
            ("JWT_SECRET", "s"),
            ("DB_MAX_CONNECTIONS", "muitas"),
        ]))
        .is_err());
    }
}
