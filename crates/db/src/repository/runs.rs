//! Process run repository functions.
//!
//! A run row is rewritten whole on every transition; the engine serializes
//! writers per instance, so last-write-wins is safe here.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::ProcessRunRow, DbError};

/// Insert a run, or replace its document and status.
pub async fn upsert_run(pool: &PgPool, row: &ProcessRunRow) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO process_runs
            (id, template_id, title, status, started_by_id, start_at, document, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (id) DO UPDATE
        SET title = EXCLUDED.title,
            status = EXCLUDED.status,
            document = EXCLUDED.document,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(row.id)
    .bind(row.template_id)
    .bind(&row.title)
    .bind(&row.status)
    .bind(&row.started_by_id)
    .bind(row.start_at)
    .bind(&row.document)
    .bind(row.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_run(pool: &PgPool, id: Uuid) -> Result<Option<ProcessRunRow>, DbError> {
    let row = sqlx::query_as::<_, ProcessRunRow>(
        r#"
        SELECT id, template_id, title, status, started_by_id, start_at, document, updated_at
        FROM process_runs
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// List runs, newest first. `status` filters on the lowercase status name.
pub async fn list_runs(pool: &PgPool, status: Option<&str>) -> Result<Vec<ProcessRunRow>, DbError> {
    let rows = sqlx::query_as::<_, ProcessRunRow>(
        r#"
        SELECT id, template_id, title, status, started_by_id, start_at, document, updated_at
        FROM process_runs
        WHERE $1::text IS NULL OR status = $1
        ORDER BY start_at DESC, id
        "#,
    )
    .bind(status)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
