//! Student routes

use std::sync::Arc;

use axum::Extension;

use super::extract::{Json, Path, Query};
use super::Pagination;
use crate::auth::ActiveOperator;
use crate::err::Error;
use crate::models::{Message, StudentCreate, StudentPatch, StudentView};
use crate::{breaks, proceeds, students, App, Payload};

pub async fn read_students(
    _operator: ActiveOperator,
    Extension(app): Extension<Arc<App>>,
    Query(page): Query<Pagination>,
) -> Payload<Vec<StudentView>> {
    let rows = students::list(&app.db, page.skip.into(), page.limit.into()).await?;
    proceeds(students::views(&app.db, rows).await?)
}

/// Public lookup used by the scanners: `key` is a registration number or,
/// failing that, a QR credential token.
pub async fn read_student(
    Extension(app): Extension<Arc<App>>,
    Path(key): Path<String>,
) -> Payload<StudentView> {
    let row = match students::find_by_registration(&app.db, &key).await? {
        Some(row) => Some(row),
        None => students::find_by_qr_token(&app.db, &key).await?,
    };
    match row {
        Some(row) => proceeds(students::view(&app.db, row).await?),
        None => {
            log::debug!("No student matches {}", key);
            breaks(Error::not_found("Étudiant non enregistré."))
        }
    }
}

pub async fn create_student(
    operator: ActiveOperator,
    Extension(app): Extension<Arc<App>>,
    Json(input): Json<StudentCreate>,
) -> Payload<StudentView> {
    proceeds(students::create(&app, &operator, input).await?)
}

pub async fn update_student(
    operator: ActiveOperator,
    Extension(app): Extension<Arc<App>>,
    Path(id): Path<i64>,
    Json(patch): Json<StudentPatch>,
) -> Payload<StudentView> {
    proceeds(students::update(&app.db, &operator, id, patch).await?)
}

pub async fn delete_student(
    operator: ActiveOperator,
    Extension(app): Extension<Arc<App>>,
    Path(id): Path<i64>,
) -> Payload<Message> {
    students::delete(&app.db, &operator, id).await?;
    proceeds(Message::new("Étudiant supprimé avec succès"))
}
