//! Process template repository functions.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::ProcessTemplateRow, DbError};

/// Insert a template, or overwrite it when the id already exists.
///
/// `created_at` of an existing row is kept.
pub async fn upsert_template(pool: &PgPool, row: &ProcessTemplateRow) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO process_templates
            (id, title, template_type, visibility, document, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (id) DO UPDATE
        SET title = EXCLUDED.title,
            template_type = EXCLUDED.template_type,
            visibility = EXCLUDED.visibility,
            document = EXCLUDED.document,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(row.id)
    .bind(&row.title)
    .bind(&row.template_type)
    .bind(&row.visibility)
    .bind(&row.document)
    .bind(row.created_at)
    .bind(row.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch a single template by id.
pub async fn get_template(pool: &PgPool, id: Uuid) -> Result<Option<ProcessTemplateRow>, DbError> {
    let row = sqlx::query_as::<_, ProcessTemplateRow>(
        r#"
        SELECT id, title, template_type, visibility, document, created_at, updated_at
        FROM process_templates
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// List all templates, most recently updated first.
pub async fn list_templates(pool: &PgPool) -> Result<Vec<ProcessTemplateRow>, DbError> {
    let rows = sqlx::query_as::<_, ProcessTemplateRow>(
        r#"
        SELECT id, title, template_type, visibility, document, created_at, updated_at
        FROM process_templates
        ORDER BY updated_at DESC, id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Delete a template. Fails with `NotFound` when no row matched.
pub async fn delete_template(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM process_templates WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}
