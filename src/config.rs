//! Environment-driven configuration, loaded once at startup.

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expires_in_minutes: i64,
    pub otp_lifespan_minutes: i64,
    pub reset_otp_lifespan_minutes: i64,
    pub smtp_host: Option<String>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub email_from: String,
    pub frontend_url: String,
    pub cors_allowed_origin: Option<String>,
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T> {
    match env_opt(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("{key} is not a valid number: {raw}")),
        None => Ok(default),
    }
}

impl Config {
    /// Reads every setting from the environment. Only `JWT_SECRET` is
    /// mandatory; everything else has a development-friendly default.
    pub fn from_env() -> anyhow::Result<Config> {
        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;

        Ok(Config {
            port: env_parse("PORT", 8000)?,
            database_url: env_or("DATABASE_URL", "sqlite:banking.db"),
            jwt_secret,
            jwt_expires_in_minutes: env_parse("JWT_EXPIRES_IN_MINUTES", 120)?,
            otp_lifespan_minutes: env_parse("OTP_LIFESPAN_MINUTES", 10)?,
            reset_otp_lifespan_minutes: env_parse("RESET_OTP_LIFESPAN_MINUTES", 15)?,
            smtp_host: env_opt("SMTP_HOST"),
            smtp_username: env_opt("SMTP_USERNAME"),
            smtp_password: env_opt("SMTP_PASSWORD"),
            email_from: env_or("EMAIL_FROM", "Banking API <no-reply@bank.example>"),
            frontend_url: env_or("FRONTEND_URL", "http://localhost:3000"),
            cors_allowed_origin: env_opt("CORS_ALLOWED_ORIGIN"),
        })
    }
}
