use axum::Json;
use axum::extract::{Path, Query, State};
use sqlx::PgPool;

use crate::error::AppError;
use crate::models::job::{Job, JobFilters};

pub async fn list(
    State(pool): State<PgPool>,
    Query(filters): Query<JobFilters>,
) -> Result<Json<Vec<Job>>, AppError> {
    let jobs = Job::list(&pool, &filters).await?;
    Ok(Json(jobs))
}

pub async fn get(State(pool): State<PgPool>, Path(id): Path<i32>) -> Result<Json<Job>, AppError> {
    let job = Job::get(&pool, id).await?;
    Ok(Json(job))
}
