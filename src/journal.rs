//! Audit journal: append-only "who did what to whom, when" entries.

use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};

use crate::auth::ActiveOperator;
use crate::err::Error;
use crate::models::{JournalCreate, JournalRow, JournalView};
use crate::{operators, students};

/// Appends one entry attributed to `operator`, dated now. Runs on the
/// caller's connection so it can share the mutation's transaction.
pub async fn record(
    conn: &mut SqliteConnection,
    operator: &ActiveOperator,
    operation: impl Into<String>,
    registration_number: Option<&str>,
) -> Result<JournalRow, Error> {
    let entry = JournalCreate {
        operation: operation.into(),
        date: Utc::now(),
        im_etudiant: registration_number.map(str::to_string),
    };
    append(conn, operator, entry).await
}

/// Stores an entry as given, attributed to `operator`.
pub async fn append(
    conn: &mut SqliteConnection,
    operator: &ActiveOperator,
    entry: JournalCreate,
) -> Result<JournalRow, Error> {
    log::info!(
        "[{}] {} ({})",
        operator.name(),
        entry.operation,
        entry.im_etudiant.as_deref().unwrap_or("-")
    );
    insert(conn, operator.id(), entry).await
}

pub async fn remove(db: &SqlitePool, operator: &ActiveOperator, id: i64) -> Result<(), Error> {
    if !delete(db, id).await? {
        return Err(Error::not_found("Opération non enregistrée."));
    }
    log::info!("[{}] Suppression de l'opération {}", operator.name(), id);
    Ok(())
}

pub async fn insert(
    conn: &mut SqliteConnection,
    operator_id: i64,
    entry: JournalCreate,
) -> Result<JournalRow, Error> {
    let res = sqlx::query(
        "INSERT INTO journal (operation, operator_id, student_registration_number, date) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(&entry.operation)
    .bind(operator_id)
    .bind(&entry.im_etudiant)
    .bind(entry.date)
    .execute(&mut *conn)
    .await?;

    Ok(JournalRow {
        id: res.last_insert_rowid(),
        operation: entry.operation,
        operator_id,
        student_registration_number: entry.im_etudiant,
        date: entry.date,
    })
}

pub async fn find_by_id<'e, E>(db: E, id: i64) -> Result<Option<JournalRow>, Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(
        sqlx::query_as::<_, JournalRow>("SELECT * FROM journal WHERE id = $1 LIMIT 1")
            .bind(id)
            .fetch_optional(db)
            .await?,
    )
}

pub async fn list(db: &SqlitePool, skip: i64, limit: i64) -> Result<Vec<JournalRow>, Error> {
    Ok(
        sqlx::query_as::<_, JournalRow>("SELECT * FROM journal ORDER BY id LIMIT $1 OFFSET $2")
            .bind(limit)
            .bind(skip)
            .fetch_all(db)
            .await?,
    )
}

/// Entries dated on or after `debut`, and on or before `fin` when given.
pub async fn list_by_date(
    db: &SqlitePool,
    debut: DateTime<Utc>,
    fin: Option<DateTime<Utc>>,
) -> Result<Vec<JournalRow>, Error> {
    let rows = match fin {
        None => {
            sqlx::query_as::<_, JournalRow>("SELECT * FROM journal WHERE date >= $1 ORDER BY date, id")
                .bind(debut)
                .fetch_all(db)
                .await?
        }
        Some(fin) => {
            sqlx::query_as::<_, JournalRow>(
                "SELECT * FROM journal WHERE date >= $1 AND date <= $2 ORDER BY date, id",
            )
            .bind(debut)
            .bind(fin)
            .fetch_all(db)
            .await?
        }
    };
    Ok(rows)
}

#[cfg(test)]
pub async fn count_for_student(db: &SqlitePool, registration_number: &str) -> Result<i64, Error> {
    Ok(
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM journal WHERE student_registration_number = $1",
        )
        .bind(registration_number)
        .fetch_one(db)
        .await?,
    )
}

pub async fn delete(db: &SqlitePool, id: i64) -> Result<bool, Error> {
    let res = sqlx::query("DELETE FROM journal WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() >= 1)
}

/// Resolves the acting operator and the referenced student, either of which
/// may no longer exist. A student created after the entry is a later holder
/// of the same registration number, not the one the entry is about.
pub async fn view(db: &SqlitePool, row: JournalRow) -> Result<JournalView, Error> {
    let operator = operators::find_by_id(db, row.operator_id).await?;
    let student = match &row.student_registration_number {
        Some(im) => match students::find_by_registration(db, im).await? {
            Some(student) if student.created_at <= row.date => {
                Some(students::view(db, student).await?)
            }
            _ => None,
        },
        None => None,
    };
    Ok(JournalView::from_row(row, operator, student))
}

pub async fn views(db: &SqlitePool, rows: Vec<JournalRow>) -> Result<Vec<JournalView>, Error> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(view(db, row).await?);
    }
    Ok(out)
}
