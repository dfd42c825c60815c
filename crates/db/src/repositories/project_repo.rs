//! Repository for the `projects` table.

use clipforge_core::types::DbId;
use sqlx::PgPool;

use crate::models::project::{CreateProject, Project, DEFAULT_TARGET_DURATION_SECS};
use crate::models::status::{ClipStatus, ProjectStatus};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "\
    id, topic, target_duration_secs, tone, aspect_ratio, voice_id, language, \
    cta, style_prompt, status_id, final_video_asset_id, error_code, error_message, \
    created_at, updated_at";

/// Provides CRUD and status transitions for projects.
pub struct ProjectRepo;

impl ProjectRepo {
    /// Insert a new `queued` project with defaults applied to unset options.
    pub async fn create(
        pool: &PgPool,
        id: DbId,
        input: &CreateProject,
    ) -> Result<Project, sqlx::Error> {
        let input = input.with_defaults();
        let query = format!(
            "INSERT INTO projects \
                (id, topic, target_duration_secs, tone, aspect_ratio, voice_id, language, cta, style_prompt, status_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .bind(&input.topic)
            .bind(input.target_duration_secs.unwrap_or(DEFAULT_TARGET_DURATION_SECS))
            .bind(&input.tone)
            .bind(&input.aspect_ratio)
            .bind(&input.voice_id)
            .bind(&input.language)
            .bind(&input.cta)
            .bind(&input.style_prompt)
            .bind(ProjectStatus::Queued.id())
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Project>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM projects WHERE id = $1");
        sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Move a non-terminal project to `status`. Returns `false` if the
    /// project is missing or already completed/failed.
    pub async fn set_status(
        pool: &PgPool,
        id: DbId,
        status: ProjectStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE projects SET status_id = $2 \
             WHERE id = $1 AND status_id NOT IN ($3, $4)",
        )
        .bind(id)
        .bind(status.id())
        .bind(ProjectStatus::Completed.id())
        .bind(ProjectStatus::Failed.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Mark a project failed with a machine-readable code. Completed
    /// projects are left alone.
    pub async fn fail(
        pool: &PgPool,
        id: DbId,
        error_code: &str,
        error_message: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE projects SET status_id = $2, error_code = $3, error_message = $4 \
             WHERE id = $1 AND status_id <> $5",
        )
        .bind(id)
        .bind(ProjectStatus::Failed.id())
        .bind(error_code)
        .bind(error_message)
        .bind(ProjectStatus::Completed.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Conditional `generating -> rendering` transition, taken only when
    /// every clip is rendered. Exactly one concurrent caller wins.
    pub async fn claim_final_render(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE projects SET status_id = $2 \
             WHERE id = $1 AND status_id = $3 \
               AND EXISTS (SELECT 1 FROM clips WHERE project_id = $1) \
               AND NOT EXISTS ( \
                   SELECT 1 FROM clips WHERE project_id = $1 AND status_id <> $4 \
               )",
        )
        .bind(id)
        .bind(ProjectStatus::Rendering.id())
        .bind(ProjectStatus::Generating.id())
        .bind(ClipStatus::Rendered.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// `rendering -> completed`, recording the final video. Refused while
    /// any clip is not rendered.
    pub async fn complete(
        pool: &PgPool,
        id: DbId,
        final_video_asset_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE projects \
             SET status_id = $2, final_video_asset_id = $3, error_code = NULL, error_message = NULL \
             WHERE id = $1 AND status_id = $4 \
               AND NOT EXISTS ( \
                   SELECT 1 FROM clips WHERE project_id = $1 AND status_id <> $5 \
               )",
        )
        .bind(id)
        .bind(ProjectStatus::Completed.id())
        .bind(final_video_asset_id)
        .bind(ProjectStatus::Rendering.id())
        .bind(ClipStatus::Rendered.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
