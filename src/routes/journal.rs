//! Journal routes

use std::sync::Arc;

use axum::Extension;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::extract::{Json, Path, Query};
use super::DEFAULT_LIMIT;
use crate::auth::ActiveOperator;
use crate::err::Error;
use crate::models::{JournalCreate, JournalView, Message};
use crate::{journal, proceeds, App, Payload};

/// Pagination, or a date window when `debut` is present.
#[derive(Debug, Deserialize)]
pub struct JournalQuery {
    #[serde(default)]
    pub skip: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    pub debut: Option<DateTime<Utc>>,
    pub fin: Option<DateTime<Utc>>,
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT as u32
}

pub async fn read_journals(
    _operator: ActiveOperator,
    Extension(app): Extension<Arc<App>>,
    Query(query): Query<JournalQuery>,
) -> Payload<Vec<JournalView>> {
    let rows = match query.debut {
        Some(debut) => journal::list_by_date(&app.db, debut, query.fin).await?,
        None => journal::list(&app.db, query.skip.into(), query.limit.into()).await?,
    };
    proceeds(journal::views(&app.db, rows).await?)
}

pub async fn read_journal(
    _operator: ActiveOperator,
    Extension(app): Extension<Arc<App>>,
    Path(id): Path<i64>,
) -> Payload<JournalView> {
    let row = journal::find_by_id(&app.db, id)
        .await?
        .ok_or_else(|| Error::not_found("Opération non enregistrée."))?;
    proceeds(journal::view(&app.db, row).await?)
}

pub async fn create_journal(
    operator: ActiveOperator,
    Extension(app): Extension<Arc<App>>,
    Json(entry): Json<JournalCreate>,
) -> Payload<JournalView> {
    let mut conn = app.db.acquire().await?;
    let row = journal::append(&mut conn, &operator, entry).await?;
    drop(conn);
    proceeds(journal::view(&app.db, row).await?)
}

pub async fn delete_journal(
    operator: ActiveOperator,
    Extension(app): Extension<Arc<App>>,
    Path(id): Path<i64>,
) -> Payload<Message> {
    journal::remove(&app.db, &operator, id).await?;
    proceeds(Message::new("Opération supprimée avec succès"))
}
