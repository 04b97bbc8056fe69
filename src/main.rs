pub mod auth;
pub mod config;
pub mod db;
pub mod err;
pub mod journal;
pub mod mail;
pub mod models;
pub mod operators;
pub mod password;
pub mod qr;
pub mod routes;
pub mod students;
pub mod token;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::Context;
use axum::Json;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::err::Error;
use crate::mail::{DisabledMailer, QrMailer, SmtpMailer};
use crate::password::PasswordHasherService;
use crate::token::TokenService;

pub type Payload<T> = Result<Json<T>, Error>;

pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok(Json(value))
}

pub fn breaks<V>(err: Error) -> Payload<V>
where
    V: Serialize,
{
    Err(err)
}

/// Everything a request handler may touch, built once at startup.
pub struct App {
    pub db: SqlitePool,
    pub config: Config,
    pub tokens: TokenService,
    pub passwords: PasswordHasherService,
    pub mailer: Arc<dyn QrMailer>,
}

impl App {
    pub fn new(db: SqlitePool, config: Config) -> Self {
        let mailer: Arc<dyn QrMailer> = match &config.smtp {
            Some(smtp) => Arc::new(SmtpMailer::new(smtp)),
            None => Arc::new(DisabledMailer),
        };
        Self {
            db,
            tokens: TokenService::new(&config),
            passwords: PasswordHasherService::new(config.password_rounds),
            mailer,
            config,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = Config::from_env().context("invalid configuration")?;
    let pool = db::connect(&config.database_url).await?;
    log::info!("Database ready at {}", config.database_url);
    if config.smtp.is_none() {
        log::warn!("SMTP_HOST is not set, QR codes will not be emailed");
    }

    let addr = config.bind_addr;
    let app = routes::router(Arc::new(App::new(pool, config)));

    log::info!("Starting student registry on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
