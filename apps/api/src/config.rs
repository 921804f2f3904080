use std::str::FromStr;

use anyhow::{anyhow, Context, Result};

const DEFAULT_OCR_URL: &str = "https://api2.porsi.me/ocr";

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing or a value does not parse.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Base URL of the hosted auth service, e.g. `https://xyz.supabase.co`.
    pub auth_url: String,
    pub auth_anon_key: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    /// Public base URL objects are served from; the object path is appended.
    pub s3_public_url: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub recommendation_url: String,
    pub ocr_url: String,
    pub ocr_timeout_secs: u64,
    /// Shared secret a caller must present to register as a school admin.
    pub admin_registration_secret: String,
    /// Upper bound on registration wizards held in memory at once.
    pub wizard_capacity: usize,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            auth_url: require_env("AUTH_URL")?,
            auth_anon_key: require_env("AUTH_ANON_KEY")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            s3_public_url: require_env("S3_PUBLIC_URL")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            recommendation_url: require_env("RECOMMENDATION_URL")?,
            ocr_url: env_or("OCR_URL", DEFAULT_OCR_URL.to_string())?,
            ocr_timeout_secs: env_or("OCR_TIMEOUT_SECS", 300)?,
            admin_registration_secret: require_env("ADMIN_REGISTRATION_SECRET")?,
            wizard_capacity: env_or("WIZARD_CAPACITY", 500)?,
            port: env_or("PORT", 8080)?,
            rust_log: env_or("RUST_LOG", "info".to_string())?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Parses an optional variable, falling back to `default` when it is unset.
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("Environment variable '{key}' has an invalid value '{raw}': {e}")),
        Err(_) => Ok(default),
    }
}
