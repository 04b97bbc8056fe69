use std::io::Cursor;

use chrono::{DateTime, Duration, Utc};
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};
use sqlx::{Executor, Sqlite, SqliteConnection};
use uuid::Uuid;

use crate::err::Error;
use crate::models::QrCredentialRow;

pub const VALIDITY_DAYS: i64 = 365;

/// Row id plus a fresh v4 uuid, so the token stays unique even if an id
/// comes back after deletions.
pub fn opaque_token(student_id: i64) -> String {
    format!("{}_{}", student_id, Uuid::new_v4())
}

pub async fn insert(
    conn: &mut SqliteConnection,
    student_id: i64,
    now: DateTime<Utc>,
) -> Result<QrCredentialRow, Error> {
    let token = opaque_token(student_id);
    let expiry_date = now + Duration::days(VALIDITY_DAYS);
    let res = sqlx::query(
        "INSERT INTO qr_credentials (student_id, expiry_date, is_valid, token, created_at) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(student_id)
    .bind(expiry_date)
    .bind(true)
    .bind(&token)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(QrCredentialRow {
        id: res.last_insert_rowid(),
        student_id,
        expiry_date,
        is_valid: true,
        token,
        created_at: now,
    })
}

pub async fn find_by_token<'e, E>(db: E, token: &str) -> Result<Option<QrCredentialRow>, Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(
        sqlx::query_as::<_, QrCredentialRow>("SELECT * FROM qr_credentials WHERE token = $1 LIMIT 1")
            .bind(token)
            .fetch_optional(db)
            .await?,
    )
}

pub async fn list_for_student<'e, E>(db: E, student_id: i64) -> Result<Vec<QrCredentialRow>, Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as::<_, QrCredentialRow>(
        "SELECT * FROM qr_credentials WHERE student_id = $1 ORDER BY id",
    )
    .bind(student_id)
    .fetch_all(db)
    .await?)
}

/// PNG of `data`: low error correction, 10px modules, 4-module quiet zone.
pub fn render_png(data: &str) -> anyhow::Result<Vec<u8>> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::L)
        .map_err(|err| anyhow::anyhow!("cannot encode QR code: {}", err))?;
    let image = code
        .render::<Luma<u8>>()
        .module_dimensions(10, 10)
        .quiet_zone(true)
        .build();
    let mut png = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(image).write_to(&mut png, ImageFormat::Png)?;
    Ok(png.into_inner())
}
