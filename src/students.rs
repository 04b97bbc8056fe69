//! Student records. Every mutation here writes its row change and exactly one
//! journal entry inside the same transaction; nothing is committed if either
//! half fails.

use std::sync::Arc;

use chrono::Utc;
use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};

use crate::auth::ActiveOperator;
use crate::err::Error;
use crate::mail::QrMailer;
use crate::models::{StudentCreate, StudentPatch, StudentRow, StudentView};
use crate::{journal, qr, App};

pub const CREATED: &str = "Création d'un étudiant";
pub const UPDATED: &str = "Modification d'un étudiant";

pub async fn find_by_id<'e, E>(db: E, id: i64) -> Result<Option<StudentRow>, Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(
        sqlx::query_as::<_, StudentRow>("SELECT * FROM students WHERE id = $1 LIMIT 1")
            .bind(id)
            .fetch_optional(db)
            .await?,
    )
}

pub async fn find_by_registration<'e, E>(db: E, im: &str) -> Result<Option<StudentRow>, Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, StudentRow>(
        "SELECT * FROM students WHERE registration_number = $1 ORDER BY id LIMIT 1",
    )
    .bind(im)
    .fetch_optional(db)
    .await?)
}

pub async fn find_by_qr_token(db: &SqlitePool, token: &str) -> Result<Option<StudentRow>, Error> {
    match qr::find_by_token(db, token).await? {
        Some(credential) => find_by_id(db, credential.student_id).await,
        None => Ok(None),
    }
}

pub async fn list(db: &SqlitePool, skip: i64, limit: i64) -> Result<Vec<StudentRow>, Error> {
    Ok(
        sqlx::query_as::<_, StudentRow>("SELECT * FROM students ORDER BY id LIMIT $1 OFFSET $2")
            .bind(limit)
            .bind(skip)
            .fetch_all(db)
            .await?,
    )
}

pub async fn view(db: &SqlitePool, row: StudentRow) -> Result<StudentView, Error> {
    let qrcode = qr::list_for_student(db, row.id).await?;
    Ok(StudentView::from_row(row, qrcode))
}

pub async fn views(db: &SqlitePool, rows: Vec<StudentRow>) -> Result<Vec<StudentView>, Error> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(view(db, row).await?);
    }
    Ok(out)
}

/// Whether another student (not `exclude`) already holds `column = value`.
async fn taken(
    conn: &mut SqliteConnection,
    column: &'static str,
    value: &str,
    exclude: Option<i64>,
) -> Result<bool, Error> {
    let sql = format!(
        "SELECT COUNT(*) FROM students WHERE {} = $1 AND id != $2",
        column
    );
    let count = sqlx::query_scalar::<_, i64>(&sql)
        .bind(value)
        .bind(exclude.unwrap_or(-1))
        .fetch_one(&mut *conn)
        .await?;
    Ok(count > 0)
}

/// Uniqueness checks run before any write so a rejected request leaves no
/// trace.
async fn ensure_unique(
    conn: &mut SqliteConnection,
    row: &StudentRow,
    exclude: Option<i64>,
) -> Result<(), Error> {
    let mut clash = taken(conn, "registration_number", &row.registration_number, exclude).await?;
    if let Some(cin) = &row.national_id {
        clash = clash || taken(conn, "national_id", cin, exclude).await?;
    }
    if clash {
        return Err(Error::validation("L'étudiant existe déja."));
    }
    if taken(conn, "email", &row.email, exclude).await? {
        return Err(Error::validation("L'adresse email est déjà utilisée."));
    }
    Ok(())
}

async fn insert(conn: &mut SqliteConnection, row: &StudentRow) -> Result<i64, Error> {
    let res = sqlx::query(
        "INSERT INTO students (name, surname, date_of_birth, national_id, national_id_date, \
         contact, email, registration_number, address, track, level, academic_year, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
    )
    .bind(&row.name)
    .bind(&row.surname)
    .bind(row.date_of_birth)
    .bind(&row.national_id)
    .bind(row.national_id_date)
    .bind(&row.contact)
    .bind(&row.email)
    .bind(&row.registration_number)
    .bind(&row.address)
    .bind(&row.track)
    .bind(&row.level)
    .bind(&row.academic_year)
    .bind(row.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(res.last_insert_rowid())
}

async fn write(conn: &mut SqliteConnection, row: &StudentRow) -> Result<(), Error> {
    sqlx::query(
        "UPDATE students SET name = $1, surname = $2, date_of_birth = $3, national_id = $4, \
         national_id_date = $5, contact = $6, email = $7, registration_number = $8, \
         address = $9, track = $10, level = $11, academic_year = $12 WHERE id = $13",
    )
    .bind(&row.name)
    .bind(&row.surname)
    .bind(row.date_of_birth)
    .bind(&row.national_id)
    .bind(row.national_id_date)
    .bind(&row.contact)
    .bind(&row.email)
    .bind(&row.registration_number)
    .bind(&row.address)
    .bind(&row.track)
    .bind(&row.level)
    .bind(&row.academic_year)
    .bind(row.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Stores the student with a fresh QR credential and its journal entry, then
/// mails the QR code. Delivery problems are logged and never undo the
/// creation.
pub async fn create(
    app: &App,
    operator: &ActiveOperator,
    input: StudentCreate,
) -> Result<StudentView, Error> {
    input.validate()?;
    let now = Utc::now();
    let mut row = input.into_row(0, now);

    let mut tx = app.db.begin().await?;
    ensure_unique(&mut tx, &row, None).await?;
    row.id = insert(&mut tx, &row).await?;
    let credential = qr::insert(&mut tx, row.id, now).await?;
    journal::record(&mut tx, operator, CREATED, Some(&row.registration_number)).await?;
    tx.commit().await?;

    deliver_qr(app.mailer.clone(), row.email.clone(), credential.token.clone()).await;

    Ok(StudentView::from_row(row, vec![credential]))
}

pub async fn update(
    db: &SqlitePool,
    operator: &ActiveOperator,
    id: i64,
    patch: StudentPatch,
) -> Result<StudentView, Error> {
    patch.validate()?;

    let mut tx = db.begin().await?;
    let mut row = match find_by_id(&mut *tx, id).await? {
        Some(row) => row,
        None => return Err(Error::not_found("Étudiant non enregistré.")),
    };
    patch.apply(&mut row);
    ensure_unique(&mut tx, &row, Some(id)).await?;
    write(&mut tx, &row).await?;
    journal::record(&mut tx, operator, UPDATED, Some(&row.registration_number)).await?;
    tx.commit().await?;

    view(db, row).await
}

/// Reads the row before removing it: the journal text is the only place
/// its attributes survive.
pub async fn delete(db: &SqlitePool, operator: &ActiveOperator, id: i64) -> Result<(), Error> {
    let mut tx = db.begin().await?;
    let row = match find_by_id(&mut *tx, id).await? {
        Some(row) => row,
        None => return Err(Error::not_found("Étudiant non enregistré.")),
    };
    sqlx::query("DELETE FROM students WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    journal::record(
        &mut tx,
        operator,
        row.deletion_summary(),
        Some(&row.registration_number),
    )
    .await?;
    tx.commit().await?;
    Ok(())
}

async fn deliver_qr(mailer: Arc<dyn QrMailer>, to: String, token: String) {
    let recipient = to.clone();
    let sent = tokio::task::spawn_blocking(move || {
        let png = qr::render_png(&token)?;
        mailer.send_qr(&recipient, &png)
    })
    .await;
    match sent {
        Ok(Ok(())) => log::debug!("QR code delivered to {}", to),
        Ok(Err(err)) => log::warn!("Failed to deliver QR code to {}: {:#}", to, err),
        Err(err) => log::warn!("QR delivery task for {} aborted: {}", to, err),
    }
}
