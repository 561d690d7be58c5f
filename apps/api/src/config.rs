use anyhow::{Context, Result};

use crate::quota::gate::DEFAULT_DAILY_LIMIT;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub anthropic_api_key: String,
    pub payos_client_id: String,
    pub payos_api_key: String,
    pub payos_checksum_key: String,
    /// Public base URL, used for checkout return/cancel redirects.
    pub app_url: String,
    /// Emails allowed on the admin surface.
    pub admin_emails: Vec<String>,
    pub free_daily_limit: u32,
    /// Pro plan price in the gateway's minor currency unit.
    pub pro_price: i64,
    pub pro_plan_duration_days: i32,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            payos_client_id: require_env("PAYOS_CLIENT_ID")?,
            payos_api_key: require_env("PAYOS_API_KEY")?,
            payos_checksum_key: require_env("PAYOS_CHECKSUM_KEY")?,
            app_url: require_env("APP_URL")?,
            admin_emails: std::env::var("ADMIN_EMAILS")
                .unwrap_or_default()
                .split(',')
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect(),
            free_daily_limit: env_or("FREE_DAILY_LIMIT", DEFAULT_DAILY_LIMIT)?,
            pro_price: env_or("PRO_PRICE", 20_000)?,
            pro_plan_duration_days: env_or("PRO_PLAN_DURATION_DAYS", 30)?,
            port: env_or("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("'{key}' must be a valid value")),
        Err(_) => Ok(default),
    }
}
