//! Project CRUD handlers
//!
//! Reads go through the in-process cache; mutations emit invalidation events
//! instead of touching cache keys directly.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::debug;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::queries;
use crate::services::cache::{self, InvalidationEvent};
use crate::types::{CreateProjectRequest, ListProjectsParams, Project, UpdateProjectRequest};

use super::{ApiError, AppState};

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;

/// `POST /projects`
pub async fn create_project(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Project name is required".to_string()));
    }
    if queries::project::name_taken(&state.pool, name).await? {
        return Err(ApiError::BadRequest("Project name already taken".to_string()));
    }

    let project = queries::project::insert(&state.pool, name, user.id).await?;
    state
        .invalidations
        .emit(InvalidationEvent::ProjectCreated { user_id: user.id });

    Ok((StatusCode::CREATED, Json(project)))
}

/// `GET /projects` — the caller's projects, paginated
pub async fn list_projects(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<ListProjectsParams>,
) -> Result<Json<Vec<Project>>, ApiError> {
    let page = params.page.unwrap_or(1).max(1) as i64;
    let limit = (params.limit.unwrap_or(DEFAULT_PAGE_SIZE as u32) as i64).clamp(1, MAX_PAGE_SIZE);
    let offset = (page - 1) * limit;
    let sort_by = queries::project::sort_column(params.sort_by.as_deref());
    let descending = !matches!(params.sort_type.as_deref(), Some("asc"));
    let order = if descending { "desc" } else { "asc" };

    let key = cache::projects_list_key(user.id, offset, limit, sort_by, order);
    if let Some(projects) = state.cache.get::<Vec<Project>>(&key) {
        debug!("Projects list served from cache for user {}", user.id);
        return Ok(Json(projects));
    }

    let projects =
        queries::project::list_for_user(&state.pool, user.id, limit, offset, sort_by, descending)
            .await?;
    state.cache.set(&key, &projects, cache::DEFAULT_TTL);

    Ok(Json(projects))
}

/// `GET /projects/{id}`
pub async fn get_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Project>, ApiError> {
    let project = find_owned_project(&state, id, user.id).await?;
    Ok(Json(project))
}

/// `PATCH /projects/{id}`
pub async fn update_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateProjectRequest>,
) -> Result<Json<Project>, ApiError> {
    let project = find_owned_project(&state, id, user.id).await?;

    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Project name is required".to_string()));
    }
    if name != project.name && queries::project::name_taken(&state.pool, name).await? {
        return Err(ApiError::BadRequest("Project name already taken".to_string()));
    }

    let updated = queries::project::update_name(&state.pool, id, name).await?;
    state.invalidations.emit(InvalidationEvent::ProjectUpdated {
        project_id: id,
        user_id: user.id,
    });

    Ok(Json(updated))
}

/// `DELETE /projects/{id}`
pub async fn delete_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    find_owned_project(&state, id, user.id).await?;

    queries::project::delete(&state.pool, id).await?;
    state.invalidations.emit(InvalidationEvent::ProjectDeleted {
        project_id: id,
        user_id: user.id,
    });

    Ok(StatusCode::NO_CONTENT)
}

/// Read-through lookup that treats foreign projects as missing
async fn find_owned_project(
    state: &AppState,
    id: Uuid,
    user_id: Uuid,
) -> Result<Project, ApiError> {
    let key = cache::project_by_id_key(id);

    let project = match state.cache.get::<Project>(&key) {
        Some(project) => project,
        None => {
            let project = queries::project::find_by_id(&state.pool, id)
                .await?
                .ok_or_else(|| ApiError::NotFound("Project not found".to_string()))?;
            state.cache.set(&key, &project, cache::DEFAULT_TTL);
            project
        }
    };

    if project.user_id != user_id {
        return Err(ApiError::NotFound("Project not found".to_string()));
    }
    Ok(project)
}
