use std::env;

use anyhow::{Context, Result, anyhow};
use tracing::warn;

const DEFAULT_SECRET_KEY: &str = "dev-secret-change-this";
const DEFAULT_DATABASE_URL: &str = "sqlite://students.db";
const DEFAULT_PORT: u16 = 8080;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(anyhow!("unknown APP_ENV value '{other}'")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub secret_key: String,
    pub database_url: String,
    pub environment: Environment,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup so tests do not
    /// have to touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret_key = match lookup("SECRET_KEY").filter(|value| !value.is_empty()) {
            Some(secret) => secret,
            None => {
                warn!("SECRET_KEY is not set; falling back to the development key");
                DEFAULT_SECRET_KEY.to_string()
            }
        };

        let database_url = lookup("DATABASE_URL")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let environment = match lookup("APP_ENV") {
            Some(raw) => Environment::parse(&raw)?,
            None => Environment::default(),
        };

        let port = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("PORT must be a valid port number, got '{raw}'"))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            secret_key,
            database_url,
            environment,
            port,
        })
    }

    pub fn secure_cookies(&self) -> bool {
        self.environment == Environment::Production
    }
}
