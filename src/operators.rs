//! Credential store: the only code that reads or writes operator rows.

use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};

use crate::auth::ActiveOperator;
use crate::err::Error;
use crate::models::{OperatorCreate, OperatorPatch, OperatorRow};
use crate::{journal, App};

/// Open self-registration.
pub async fn register(app: &App, input: OperatorCreate) -> Result<OperatorRow, Error> {
    let name = input.nom.trim();
    if name.is_empty() {
        return Err(Error::validation("Le nom de l'opérateur est obligatoire."));
    }
    if input.password.is_empty() {
        return Err(Error::validation("Le mot de passe ne peut pas être vide."));
    }
    if find_by_name(&app.db, name).await?.is_some() {
        return Err(Error::validation("L'opérateur existe déjà."));
    }

    let hash = app.passwords.hash(&input.password)?;
    let row = insert(&app.db, name, &hash).await?;
    log::info!("Registered operator {}", row.name);
    Ok(row)
}

/// Renames and/or enables/disables an operator, journaled under `actor`.
pub async fn modify(
    db: &SqlitePool,
    actor: &ActiveOperator,
    id: i64,
    patch: OperatorPatch,
) -> Result<OperatorRow, Error> {
    let mut tx = db.begin().await?;
    let mut row = find_by_id(&mut *tx, id)
        .await?
        .ok_or_else(|| Error::not_found("Opérateur non enregistré."))?;

    if let Some(name) = patch.nom {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(Error::validation("Le nom de l'opérateur est obligatoire."));
        }
        if name != row.name && find_by_name(&mut *tx, &name).await?.is_some() {
            return Err(Error::validation("L'opérateur existe déjà."));
        }
        row.name = name;
    }
    if let Some(disabled) = patch.disabled {
        row.disabled = disabled;
    }

    update(&mut tx, &row).await?;
    journal::record(
        &mut tx,
        actor,
        format!("Modification de l'opérateur {}", row.name),
        None,
    )
    .await?;
    tx.commit().await?;
    Ok(row)
}

pub async fn remove(db: &SqlitePool, actor: &ActiveOperator, id: i64) -> Result<(), Error> {
    let mut tx = db.begin().await?;
    let row = find_by_id(&mut *tx, id)
        .await?
        .ok_or_else(|| Error::not_found("Opérateur non enregistré."))?;
    delete(&mut tx, id).await?;
    journal::record(
        &mut tx,
        actor,
        format!("Suppression de l'opérateur {}", row.name),
        None,
    )
    .await?;
    tx.commit().await?;
    Ok(())
}

pub async fn find_by_name<'e, E>(db: E, name: &str) -> Result<Option<OperatorRow>, Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(
        sqlx::query_as::<_, OperatorRow>("SELECT * FROM operators WHERE name = $1 LIMIT 1")
            .bind(name)
            .fetch_optional(db)
            .await?,
    )
}

pub async fn find_by_id<'e, E>(db: E, id: i64) -> Result<Option<OperatorRow>, Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(
        sqlx::query_as::<_, OperatorRow>("SELECT * FROM operators WHERE id = $1 LIMIT 1")
            .bind(id)
            .fetch_optional(db)
            .await?,
    )
}

pub async fn list(db: &SqlitePool) -> Result<Vec<OperatorRow>, Error> {
    Ok(
        sqlx::query_as::<_, OperatorRow>("SELECT * FROM operators ORDER BY id")
            .fetch_all(db)
            .await?,
    )
}

/// Inserts a new, enabled operator with no refresh token. A name taken
/// between the caller's check and this insert is still a validation error.
pub async fn insert(db: &SqlitePool, name: &str, password_hash: &str) -> Result<OperatorRow, Error> {
    let res = sqlx::query("INSERT INTO operators (name, password_hash, disabled) VALUES ($1, $2, $3)")
        .bind(name)
        .bind(password_hash)
        .bind(false)
        .execute(db)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                Error::validation("L'opérateur existe déjà.")
            } else {
                Error::from(err)
            }
        })?;

    if res.rows_affected() < 1 {
        return Err(Error::InternalError {
            kind: "DatabaseError",
            message: "Could not save operator!".to_string(),
        });
    }

    Ok(OperatorRow {
        id: res.last_insert_rowid(),
        name: name.to_string(),
        password_hash: password_hash.to_string(),
        refresh_token: None,
        disabled: false,
    })
}

// SQLITE_CONSTRAINT_UNIQUE
const UNIQUE_VIOLATION: &str = "2067";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
                || db_err.message().starts_with("UNIQUE constraint failed")
        }
        _ => false,
    }
}

/// Replaces the single stored refresh token. `None` revokes it.
pub async fn set_refresh_token(
    db: &SqlitePool,
    id: i64,
    refresh_token: Option<&str>,
) -> Result<(), Error> {
    sqlx::query("UPDATE operators SET refresh_token = $1 WHERE id = $2")
        .bind(refresh_token)
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn update(conn: &mut SqliteConnection, row: &OperatorRow) -> Result<(), Error> {
    sqlx::query("UPDATE operators SET name = $1, disabled = $2 WHERE id = $3")
        .bind(&row.name)
        .bind(row.disabled)
        .bind(row.id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<bool, Error> {
    let res = sqlx::query("DELETE FROM operators WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(res.rows_affected() >= 1)
}
