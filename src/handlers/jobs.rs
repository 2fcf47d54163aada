//! Import job handlers
//!
//! The upload endpoint stages the file and creates the job, then returns
//! 202 with the job id; parsing runs entirely off the request path. Clients
//! follow up via `GET /jobs/{id}` or the real-time channel.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::queries;
use crate::services::cancellation::CancelError;
use crate::services::import_runner::ImportTask;
use crate::services::{jobs as job_service, upload};
use crate::types::{ImportJob, JobCancelResponse, JobSubmitResponse};

use super::{ApiError, AppState};

/// `POST /jobs/import` — accept a CSV upload and schedule its import
pub async fn import_jobs(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<JobSubmitResponse>), ApiError> {
    let (uploaded, project_id) = upload::receive_csv_upload(
        &mut multipart,
        &state.config.imports_dir,
        state.config.max_upload_bytes,
    )
    .await?;

    let project = match queries::project::find_by_id(&state.pool, project_id).await {
        Ok(project) => project,
        Err(e) => {
            upload::remove_file(&uploaded.path).await;
            return Err(ApiError::Internal(e));
        }
    };
    let project = match project {
        Some(project) if project.user_id == user.id => project,
        _ => {
            upload::remove_file(&uploaded.path).await;
            return Err(ApiError::NotFound("Project not found".to_string()));
        }
    };

    let job = job_service::create_import_job(
        &state.pool,
        &state.config.imports_dir,
        project.id,
        &uploaded.file_name,
        &uploaded.path,
    )
    .await?;

    // Exactly one enqueue per job; the request never awaits execution
    state
        .scheduler
        .enqueue(ImportTask {
            job_id: job.id,
            project_id: project.id,
            file_name: job.file_name.clone(),
        })
        .await?;

    info!("Import job {} accepted for project {}", job.id, project.id);

    Ok((
        StatusCode::ACCEPTED,
        Json(JobSubmitResponse {
            job_id: job.id,
            status: job.status,
        }),
    ))
}

/// `GET /jobs/{id}` — fetch the full job record
pub async fn get_job(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ImportJob>, ApiError> {
    let job = queries::job::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Import job not found".to_string()))?;

    Ok(Json(job))
}

/// `POST /jobs/{id}/cancel` — cooperatively cancel a queued or running job
pub async fn cancel_job(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<JobCancelResponse>, ApiError> {
    let job = queries::job::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Import job not found".to_string()))?;

    let owner = queries::project::find_owner(&state.pool, job.project_id).await?;
    if owner != Some(user.id) {
        return Err(ApiError::NotFound("Import job not found".to_string()));
    }

    if job.status.is_terminal() {
        return Err(ApiError::BadRequest("Job already finished".to_string()));
    }

    match state.cancellations.cancel(&id, user.id) {
        Ok(true) => debug!("Cancellation signalled for running job {}", id),
        Ok(false) => {
            // Not picked up yet: leave a pre-cancelled token for the runner
            state.cancellations.pre_cancel(id, user.id);
            debug!("Queued job {} pre-cancelled", id);
        }
        Err(CancelError::NotOwner) => {
            return Err(ApiError::Forbidden("Not the owner of this job".to_string()));
        }
    }

    Ok(Json(JobCancelResponse {
        job_id: id,
        message: "Cancellation requested".to_string(),
    }))
}
