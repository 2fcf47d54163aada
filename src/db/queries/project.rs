//! Project queries

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::Project;

const PROJECT_COLUMNS: &str = "id, name, user_id, created_at";

/// Insert a new project owned by `user_id`
pub async fn insert(pool: &PgPool, name: &str, user_id: Uuid) -> Result<Project> {
    let project = sqlx::query_as::<_, Project>(
        r#"
        INSERT INTO projects (name, user_id)
        VALUES ($1, $2)
        RETURNING id, name, user_id, created_at
        "#,
    )
    .bind(name)
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(project)
}

/// Fetch a project by id
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Project>> {
    let project = sqlx::query_as::<_, Project>(&format!(
        "SELECT {} FROM projects WHERE id = $1",
        PROJECT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(project)
}

/// Check whether any project already uses this name
pub async fn name_taken(pool: &PgPool, name: &str) -> Result<bool> {
    let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM projects WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?;

    Ok(existing.is_some())
}

/// Resolve the owning user of a project. Used to address real-time import
/// events; `None` disables notification for the job.
pub async fn find_owner(pool: &PgPool, project_id: Uuid) -> Result<Option<Uuid>> {
    let owner: Option<Uuid> = sqlx::query_scalar("SELECT user_id FROM projects WHERE id = $1")
        .bind(project_id)
        .fetch_optional(pool)
        .await?;

    Ok(owner)
}

/// List a user's projects, paginated.
///
/// `sort_by`/`descending` are whitelisted by the caller; only column names
/// produced by [`sort_column`] reach this query.
pub async fn list_for_user(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
    sort_by: &str,
    descending: bool,
) -> Result<Vec<Project>> {
    let order = if descending { "DESC" } else { "ASC" };
    let query = format!(
        "SELECT {} FROM projects WHERE user_id = $1 ORDER BY {} {} LIMIT $2 OFFSET $3",
        PROJECT_COLUMNS, sort_by, order
    );

    let projects = sqlx::query_as::<_, Project>(&query)
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    Ok(projects)
}

/// Map a client-supplied sort field to a real column, defaulting to `name`
pub fn sort_column(requested: Option<&str>) -> &'static str {
    match requested {
        Some("createdAt") => "created_at",
        _ => "name",
    }
}

/// Rename a project
pub async fn update_name(pool: &PgPool, id: Uuid, name: &str) -> Result<Project> {
    let project = sqlx::query_as::<_, Project>(
        r#"
        UPDATE projects
        SET name = $2
        WHERE id = $1
        RETURNING id, name, user_id, created_at
        "#,
    )
    .bind(id)
    .bind(name)
    .fetch_one(pool)
    .await?;

    Ok(project)
}

/// Delete a project (jobs, transactions and errors cascade)
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}
