use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::{bail, Context};
use chrono::Duration;
use jsonwebtoken::Algorithm;

/// Process-wide settings, read once at startup and never mutated.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub secret_key: String,
    pub algorithm: Algorithm,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    /// PBKDF2 iteration count for newly hashed passwords.
    pub password_rounds: u32,
    pub smtp: Option<SmtpConfig>,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let secret_key = env::var("SECRET_KEY").context("SECRET_KEY must be set")?;
        if secret_key.is_empty() {
            bail!("SECRET_KEY must not be empty");
        }

        let algorithm = parse_algorithm(&var_or("ALGORITHM", "HS256"))?;
        let access_minutes: i64 = parse_var("ACCESS_TOKEN_EXPIRE_MINUTES", 30)?;
        let refresh_days: i64 = parse_var("REFRESH_TOKEN_EXPIRE_DAYS", 7)?;

        let smtp = match env::var("SMTP_HOST") {
            Ok(host) if !host.is_empty() => Some(SmtpConfig {
                host,
                port: parse_var("SMTP_PORT", 25)?,
                username: env::var("SMTP_USER").ok(),
                password: env::var("SMTP_PASSWORD").ok(),
                from: var_or("SMTP_FROM", "admin@localhost"),
            }),
            _ => None,
        };

        Ok(Self {
            database_url: var_or("DATABASE_URL", "sqlite://data/registry.db"),
            bind_addr: parse_var("BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 8000)))?,
            secret_key,
            algorithm,
            access_token_ttl: Duration::minutes(access_minutes),
            refresh_token_ttl: Duration::days(refresh_days),
            password_rounds: parse_var("PASSWORD_HASH_ROUNDS", 100_000)?,
            smtp,
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|err| anyhow::anyhow!("invalid {}={:?}: {}", key, raw, err)),
        Err(_) => Ok(default),
    }
}

/// Only the symmetric HMAC family is accepted.
fn parse_algorithm(name: &str) -> anyhow::Result<Algorithm> {
    let algorithm = Algorithm::from_str(name)
        .map_err(|_| anyhow::anyhow!("unknown token algorithm {:?}", name))?;
    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(algorithm),
        other => bail!("token algorithm {:?} is not symmetric", other),
    }
}
