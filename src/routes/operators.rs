//! Operator routes

use std::sync::Arc;

use axum::Extension;

use super::extract::{Json, Path};
use crate::auth::ActiveOperator;
use crate::models::{Message, OperatorCreate, OperatorPatch, OperatorView};
use crate::{operators, proceeds, App, Payload};

/// Open self-registration, no credential required.
pub async fn create_operator(
    Extension(app): Extension<Arc<App>>,
    Json(input): Json<OperatorCreate>,
) -> Payload<OperatorView> {
    let row = operators::register(&app, input).await?;
    proceeds(row.into())
}

pub async fn read_operator_me(operator: ActiveOperator) -> Payload<OperatorView> {
    proceeds(operator.into_row().into())
}

pub async fn read_operators(
    _operator: ActiveOperator,
    Extension(app): Extension<Arc<App>>,
) -> Payload<Vec<OperatorView>> {
    let rows = operators::list(&app.db).await?;
    proceeds(rows.into_iter().map(OperatorView::from).collect())
}

pub async fn update_operator(
    operator: ActiveOperator,
    Extension(app): Extension<Arc<App>>,
    Path(id): Path<i64>,
    Json(patch): Json<OperatorPatch>,
) -> Payload<OperatorView> {
    let row = operators::modify(&app.db, &operator, id, patch).await?;
    proceeds(row.into())
}

pub async fn delete_operator(
    operator: ActiveOperator,
    Extension(app): Extension<Arc<App>>,
    Path(id): Path<i64>,
) -> Payload<Message> {
    operators::remove(&app.db, &operator, id).await?;
    proceeds(Message::new("Opérateur supprimé avec succès"))
}
