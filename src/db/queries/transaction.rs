//! Transaction queries
//!
//! Accepted rows are only ever written in bulk; nothing in the import
//! pipeline reads them back.

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::NewTransaction;

/// Bulk-insert one flushed batch of accepted rows for a job.
///
/// A single statement with UNNEST keeps the round trips bounded by the flush
/// size instead of the row count.
pub async fn insert_many(
    pool: &PgPool,
    job_id: Uuid,
    project_id: Uuid,
    rows: &[NewTransaction],
) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }

    let amounts: Vec<f64> = rows.iter().map(|r| r.amount).collect();
    let currencies: Vec<String> = rows.iter().map(|r| r.currency.clone()).collect();
    let descriptions: Vec<String> = rows.iter().map(|r| r.description.clone()).collect();

    sqlx::query(
        r#"
        INSERT INTO transactions (amount, currency, description, import_job_id, project_id)
        SELECT t.amount, t.currency, t.description, $4, $5
        FROM UNNEST($1::double precision[], $2::text[], $3::text[])
            AS t(amount, currency, description)
        "#,
    )
    .bind(&amounts)
    .bind(&currencies)
    .bind(&descriptions)
    .bind(job_id)
    .bind(project_id)
    .execute(pool)
    .await?;

    Ok(())
}
