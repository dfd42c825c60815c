//! Repository for the `jobs` audit table.
//!
//! Uses `JobStatus` from `models::status` for every transition.

use clipforge_core::types::DbId;
use sqlx::PgPool;

use crate::models::job::{CreateJob, Job};
use crate::models::status::JobStatus;

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, project_id, clip_id, kind, status_id, attempts, \
    started_at, finished_at, error_message, created_at";

/// Provides CRUD operations for dispatch audit records.
pub struct JobRepo;

impl JobRepo {
    /// Insert a `queued` job row ahead of enqueueing its message.
    pub async fn create(pool: &PgPool, input: &CreateJob) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (id, project_id, clip_id, kind, status_id) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(input.id)
            .bind(input.project_id)
            .bind(input.clip_id)
            .bind(input.kind.as_str())
            .bind(JobStatus::Queued.id())
            .fetch_one(pool)
            .await
    }

    /// Mark a job `running` and count the attempt, creating the row if
    /// the enqueuer never did.
    pub async fn start(pool: &PgPool, input: &CreateJob) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (id, project_id, clip_id, kind, status_id, attempts, started_at) \
             VALUES ($1, $2, $3, $4, $5, 1, NOW()) \
             ON CONFLICT (id) DO UPDATE SET \
                 status_id = EXCLUDED.status_id, \
                 attempts = jobs.attempts + 1, \
                 started_at = NOW(), \
                 finished_at = NULL, \
                 error_message = NULL \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(input.id)
            .bind(input.project_id)
            .bind(input.clip_id)
            .bind(input.kind.as_str())
            .bind(JobStatus::Running.id())
            .fetch_one(pool)
            .await
    }

    pub async fn complete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET status_id = $2, finished_at = NOW(), error_message = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .bind(JobStatus::Succeeded.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn fail(pool: &PgPool, id: DbId, error_message: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET status_id = $2, finished_at = NOW(), error_message = $3 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(JobStatus::Failed.id())
        .bind(error_message)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_by_project(pool: &PgPool, project_id: DbId) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs WHERE project_id = $1 ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(project_id)
            .fetch_all(pool)
            .await
    }
}
