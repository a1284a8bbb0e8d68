use std::str::FromStr;

use anyhow::{Context, Result};
use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use sha2::{Digest, Sha512};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tracing::info;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pool: SqlitePool,
    cookie_key: Key,
    secure_cookies: bool,
}

impl AppState {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .with_context(|| format!("invalid DATABASE_URL '{}'", config.database_url))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("failed to open SQLite database")?;

        run_migrations(&pool).await?;
        info!(database_url = %config.database_url, "database ready");

        Ok(Self::with_pool(pool, config))
    }

    pub fn with_pool(pool: SqlitePool, config: &AppConfig) -> Self {
        Self {
            pool,
            cookie_key: derive_cookie_key(&config.secret_key),
            secure_cookies: config.secure_cookies(),
        }
    }

    pub fn pool_ref(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn secure_cookies(&self) -> bool {
        self.secure_cookies
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("failed to run database migrations")
}

/// Signing keys need 64 bytes; any configured secret is stretched to that
/// length with SHA-512.
fn derive_cookie_key(secret: &str) -> Key {
    let digest = Sha512::digest(secret.as_bytes());
    Key::from(digest.as_slice())
}
