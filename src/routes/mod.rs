//! HTTP surface

pub mod auth;
pub mod extract;
pub mod journal;
pub mod operators;
pub mod students;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::handler::Handler;
use axum::routing::{get, post, put};
use axum::{Extension, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::models::Message;
use crate::{err, proceeds, App, Payload};

pub const DEFAULT_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub skip: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT as u32
}

pub fn router(app: Arc<App>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/token", post(auth::login))
        .route("/refresh_token", post(auth::refresh_token))
        .route("/logout", post(auth::logout))
        .route("/operator", post(operators::create_operator))
        .route("/operator/me", get(operators::read_operator_me))
        .route("/operators", get(operators::read_operators))
        .route(
            "/operators/:id",
            put(operators::update_operator).delete(operators::delete_operator),
        )
        .route(
            "/etudiants",
            get(students::read_students).post(students::create_student),
        )
        .route(
            "/etudiants/:key",
            get(students::read_student)
                .put(students::update_student)
                .delete(students::delete_student),
        )
        .route(
            "/journal",
            get(journal::read_journals).post(journal::create_journal),
        )
        .route(
            "/journal/:id",
            get(journal::read_journal).delete(journal::delete_journal),
        )
        .fallback(err::handler404.into_service())
        .layer(CorsLayer::permissive())
        .layer(Extension(app))
}

async fn root() -> Payload<Message> {
    proceeds(Message::new("Student registry is running"))
}
