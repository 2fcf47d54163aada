//! Import job queries
//!
//! State transitions are guarded by the current status in the WHERE clause so
//! they stay one-directional even if a stray second writer appears; a guard
//! miss surfaces as an error instead of silently rewriting a terminal job.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::{ImportJob, JobStatus};

/// Raw row as stored; `status` is converted on the way out.
#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    project_id: Uuid,
    file_name: String,
    status: String,
    total_lines: i32,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for ImportJob {
    type Error = anyhow::Error;

    fn try_from(row: JobRow) -> Result<Self> {
        Ok(ImportJob {
            id: row.id,
            project_id: row.project_id,
            file_name: row.file_name,
            status: row.status.parse::<JobStatus>()?,
            total_lines: row.total_lines,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

/// Insert a new job in the `pending` state and return it
pub async fn insert(pool: &PgPool, project_id: Uuid, file_name: &str) -> Result<ImportJob> {
    let row: JobRow = sqlx::query_as(
        r#"
        INSERT INTO import_jobs (project_id, file_name, status, total_lines)
        VALUES ($1, $2, 'pending', 0)
        RETURNING id, project_id, file_name, status, total_lines, created_at, completed_at
        "#,
    )
    .bind(project_id)
    .bind(file_name)
    .fetch_one(pool)
    .await?;

    row.try_into()
}

/// Fetch a job by id
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<ImportJob>> {
    let row: Option<JobRow> = sqlx::query_as(
        r#"
        SELECT id, project_id, file_name, status, total_lines, created_at, completed_at
        FROM import_jobs
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(ImportJob::try_from).transpose()
}

/// Transition `pending → processing`
pub async fn mark_processing(pool: &PgPool, id: Uuid) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE import_jobs
        SET status = 'processing'
        WHERE id = $1 AND status = 'pending'
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        bail!("job {} is not in the pending state", id);
    }
    Ok(())
}

/// Transition `processing → completed`, recording observed data rows and the
/// completion timestamp
pub async fn mark_completed(pool: &PgPool, id: Uuid, total_lines: i32) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE import_jobs
        SET status = 'completed', total_lines = $2, completed_at = now()
        WHERE id = $1 AND status = 'processing'
        "#,
    )
    .bind(id)
    .bind(total_lines)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        bail!("job {} is not in the processing state", id);
    }
    Ok(())
}

/// Transition `pending | processing → failed`. Terminal jobs are left
/// untouched; the completion timestamp is stamped like any terminal state.
pub async fn mark_failed(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE import_jobs
        SET status = 'failed', completed_at = now()
        WHERE id = $1 AND status IN ('pending', 'processing')
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}
