//! Import error queries

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::NewImportError;

/// Bulk-insert one flushed batch of rejected rows for a job
pub async fn insert_many(pool: &PgPool, job_id: Uuid, rows: &[NewImportError]) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }

    let line_texts: Vec<String> = rows.iter().map(|r| r.line_text.clone()).collect();
    let line_numbers: Vec<i32> = rows.iter().map(|r| r.line_number).collect();
    let messages: Vec<String> = rows.iter().map(|r| r.error_message.clone()).collect();

    sqlx::query(
        r#"
        INSERT INTO import_errors (line_text, line_number, error_message, import_job_id)
        SELECT e.line_text, e.line_number, e.error_message, $4
        FROM UNNEST($1::text[], $2::integer[], $3::text[])
            AS e(line_text, line_number, error_message)
        "#,
    )
    .bind(&line_texts)
    .bind(&line_numbers)
    .bind(&messages)
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(())
}
