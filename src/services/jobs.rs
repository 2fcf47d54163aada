//! Job store adapter
//!
//! Creates job records and stages uploaded files into their job-keyed
//! location. The staged path is derived from the job id alone, so the runner
//! can locate the file without extra bookkeeping.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sqlx::PgPool;
use tokio::fs;
use tracing::warn;
use uuid::Uuid;

use crate::db::queries;
use crate::types::ImportJob;

/// Location of a job's staged file: `<imports_dir>/<job_id>.csv`
pub fn staged_path(imports_dir: &Path, job_id: Uuid) -> PathBuf {
    imports_dir.join(format!("{}.csv", job_id))
}

/// Create a job in `pending` and move the temp upload to its job-keyed path.
///
/// If the rename fails the job record stays behind in `pending` so callers
/// can observe the discrepancy; the temp file is removed best-effort.
pub async fn create_import_job(
    pool: &PgPool,
    imports_dir: &Path,
    project_id: Uuid,
    file_name: &str,
    temp_path: &Path,
) -> Result<ImportJob> {
    let job = queries::job::insert(pool, project_id, file_name).await?;

    fs::create_dir_all(imports_dir)
        .await
        .context("Failed to create imports directory")?;

    let dest = staged_path(imports_dir, job.id);
    if let Err(e) = fs::rename(temp_path, &dest).await {
        warn!(
            "Failed to stage upload for job {} ({} -> {}): {}",
            job.id,
            temp_path.display(),
            dest.display(),
            e
        );
        if let Err(e) = fs::remove_file(temp_path).await {
            warn!("Failed to remove temp upload {}: {}", temp_path.display(), e);
        }
        anyhow::bail!("Failed to stage uploaded file for job {}", job.id);
    }

    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_path_is_keyed_by_job_id() {
        let job_id = Uuid::new_v4();
        let path = staged_path(Path::new("tmp/imports"), job_id);
        assert_eq!(
            path,
            PathBuf::from(format!("tmp/imports/{}.csv", job_id))
        );
    }
}
