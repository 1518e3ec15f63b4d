use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sqlx::types::Json;

use crate::error::AppError;
use crate::extraction::{CompletionState, ExtractedData, ScoringResult};

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Job {
    pub id: i32,
    pub company_id: Option<i32>,
    pub ruleset_id: Option<i32>,
    pub source_url: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub job_type: Option<String>,
    pub experience_level: Option<String>,
    pub education_level: Option<String>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub salary_currency: Option<String>,
    pub qualifications: Json<Vec<String>>,
    pub responsibilities: Json<Vec<String>>,
    pub benefits: Json<Vec<String>>,
    pub category: Option<String>,
    pub application_url: Option<String>,
    pub is_remote: bool,
    pub date_posted: Option<String>,
    pub valid_through: Option<String>,
    /// NULL for rows stored before scoring existed.
    pub completion_state: Option<String>,
    pub completion_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct UpsertJob<'a> {
    pub company_id: Option<i32>,
    pub ruleset_id: Option<i32>,
    pub source_url: &'a str,
    pub data: &'a ExtractedData,
    pub scoring: &'a ScoringResult,
}

#[derive(Debug, Deserialize)]
pub struct JobFilters {
    pub state: Option<String>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl JobFilters {
    /// The `state` filter as a grade; rejects text that names no grade.
    pub fn completion_state(&self) -> Result<Option<CompletionState>, AppError> {
        self.state
            .as_deref()
            .map(str::parse::<CompletionState>)
            .transpose()
            .map_err(AppError::BadRequest)
    }
}

impl Job {
    pub async fn list(pool: &PgPool, filters: &JobFilters) -> Result<Vec<Job>, AppError> {
        let state = filters.completion_state()?;
        let per_page = filters.per_page.unwrap_or(50).min(100);
        let offset = (filters.page.unwrap_or(1) - 1).max(0) * per_page;

        let jobs = sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs WHERE ($1::text IS NULL OR completion_state = $1) AND ($2::text IS NULL OR title ILIKE '%' || $2 || '%') ORDER BY updated_at DESC LIMIT $3 OFFSET $4",
        )
        .bind(state.map(|s| s.as_str()))
        .bind(&filters.search)
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool)
        .await?;
        Ok(jobs)
    }

    pub async fn get(pool: &PgPool, id: i32) -> Result<Job, AppError> {
        sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {id} not found")))
    }

    /// Insert or refresh the job extracted from `source_url`.
    /// Returns the row id and whether it was newly inserted.
    pub async fn upsert(pool: &PgPool, input: UpsertJob<'_>) -> Result<(i32, bool), AppError> {
        let data = input.data;
        let row: (i32, bool) = sqlx::query_as(
            "INSERT INTO jobs (company_id, ruleset_id, source_url, title, description, location, job_type, experience_level, education_level, salary_min, salary_max, salary_currency, qualifications, responsibilities, benefits, category, application_url, is_remote, date_posted, valid_through, completion_state, completion_score)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)
             ON CONFLICT (source_url) DO UPDATE SET
                 company_id = EXCLUDED.company_id,
                 ruleset_id = EXCLUDED.ruleset_id,
                 title = EXCLUDED.title,
                 description = EXCLUDED.description,
                 location = EXCLUDED.location,
                 job_type = EXCLUDED.job_type,
                 experience_level = EXCLUDED.experience_level,
                 education_level = EXCLUDED.education_level,
                 salary_min = EXCLUDED.salary_min,
                 salary_max = EXCLUDED.salary_max,
                 salary_currency = EXCLUDED.salary_currency,
                 qualifications = EXCLUDED.qualifications,
                 responsibilities = EXCLUDED.responsibilities,
                 benefits = EXCLUDED.benefits,
                 category = EXCLUDED.category,
                 application_url = EXCLUDED.application_url,
                 is_remote = EXCLUDED.is_remote,
                 date_posted = EXCLUDED.date_posted,
                 valid_through = EXCLUDED.valid_through,
                 completion_state = EXCLUDED.completion_state,
                 completion_score = EXCLUDED.completion_score,
                 updated_at = NOW()
             RETURNING id, (xmax = 0)",
        )
        .bind(input.company_id)
        .bind(input.ruleset_id)
        .bind(input.source_url)
        .bind(&data.title)
        .bind(&data.description)
        .bind(&data.location)
        .bind(&data.job_type)
        .bind(&data.experience_level)
        .bind(&data.education_level)
        .bind(data.salary_min)
        .bind(data.salary_max)
        .bind(&data.salary_currency)
        .bind(Json(&data.qualifications))
        .bind(Json(&data.responsibilities))
        .bind(Json(&data.benefits))
        .bind(&data.category)
        .bind(&data.application_url)
        .bind(data.is_remote)
        .bind(&data.date_posted)
        .bind(&data.valid_through)
        .bind(input.scoring.state.as_str())
        .bind(input.scoring.score)
        .fetch_one(pool)
        .await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters(state: Option<&str>) -> JobFilters {
        JobFilters {
            state: state.map(str::to_string),
            search: None,
            page: None,
            per_page: None,
        }
    }

    #[test]
    fn state_filter_is_validated() {
        assert_eq!(filters(None).completion_state().unwrap(), None);
        assert_eq!(
            filters(Some("Sufficient")).completion_state().unwrap(),
            Some(CompletionState::Sufficient)
        );
        assert!(matches!(
            filters(Some("great")).completion_state(),
            Err(AppError::BadRequest(_))
        ));
    }
}
