//! Repository for the `clips` table.
//!
//! Status writes are forward-only: every update advances `status_id` to
//! `GREATEST(current, target)` and leaves rendered/failed rows alone, so
//! the audio and visual branches can finish in either order.

use clipforge_core::types::DbId;
use sqlx::PgPool;

use crate::models::clip::{Clip, CreateClip};
use crate::models::status::ClipStatus;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "\
    id, project_id, clip_index, script, voice_style, image_prompt, video_prompt, \
    estimated_duration_secs, status_id, audio_asset_id, image_asset_id, video_asset_id, \
    audio_duration_ms, rendered_duration_ms, error_message, created_at, updated_at";

/// Forward-only status expression. Binds `$2` = target, `$3` = rendered,
/// `$4` = failed.
const ADVANCE_STATUS: &str = "\
    status_id = CASE WHEN status_id IN ($3, $4) THEN status_id ELSE GREATEST(status_id, $2) END";

/// Provides CRUD and status transitions for clips.
pub struct ClipRepo;

impl ClipRepo {
    /// Insert every clip of a plan in one transaction.
    pub async fn create_many(pool: &PgPool, clips: &[CreateClip]) -> Result<Vec<Clip>, sqlx::Error> {
        let query = format!(
            "INSERT INTO clips \
                (id, project_id, clip_index, script, voice_style, image_prompt, video_prompt, \
                 estimated_duration_secs, status_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {COLUMNS}"
        );

        let mut tx = pool.begin().await?;
        let mut created = Vec::with_capacity(clips.len());
        for clip in clips {
            let row = sqlx::query_as::<_, Clip>(&query)
                .bind(clip.id)
                .bind(clip.project_id)
                .bind(clip.clip_index)
                .bind(&clip.script)
                .bind(&clip.voice_style)
                .bind(&clip.image_prompt)
                .bind(&clip.video_prompt)
                .bind(clip.estimated_duration_secs)
                .bind(ClipStatus::Pending.id())
                .fetch_one(&mut *tx)
                .await?;
            created.push(row);
        }
        tx.commit().await?;
        Ok(created)
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Clip>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM clips WHERE id = $1");
        sqlx::query_as::<_, Clip>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// All clips of a project in concatenation order.
    pub async fn list_by_project(pool: &PgPool, project_id: DbId) -> Result<Vec<Clip>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM clips WHERE project_id = $1 ORDER BY clip_index ASC"
        );
        sqlx::query_as::<_, Clip>(&query)
            .bind(project_id)
            .fetch_all(pool)
            .await
    }

    /// Number of clips of a project that are not yet rendered.
    pub async fn count_unrendered(pool: &PgPool, project_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM clips WHERE project_id = $1 AND status_id <> $2",
        )
        .bind(project_id)
        .bind(ClipStatus::Rendered.id())
        .fetch_one(pool)
        .await
    }

    /// Point the clip at its narration and advance to at least `voiced`.
    pub async fn set_audio(
        pool: &PgPool,
        id: DbId,
        asset_id: DbId,
        duration_ms: i32,
    ) -> Result<Option<Clip>, sqlx::Error> {
        let query = format!(
            "UPDATE clips SET audio_asset_id = $5, audio_duration_ms = $6, {ADVANCE_STATUS} \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Clip>(&query)
            .bind(id)
            .bind(ClipStatus::Voiced.id())
            .bind(ClipStatus::Rendered.id())
            .bind(ClipStatus::Failed.id())
            .bind(asset_id)
            .bind(duration_ms)
            .fetch_optional(pool)
            .await
    }

    /// Point the clip at its still image and advance to at least `imaged`.
    pub async fn set_image(
        pool: &PgPool,
        id: DbId,
        asset_id: DbId,
    ) -> Result<Option<Clip>, sqlx::Error> {
        let query = format!(
            "UPDATE clips SET image_asset_id = $5, {ADVANCE_STATUS} \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Clip>(&query)
            .bind(id)
            .bind(ClipStatus::Imaged.id())
            .bind(ClipStatus::Rendered.id())
            .bind(ClipStatus::Failed.id())
            .bind(asset_id)
            .fetch_optional(pool)
            .await
    }

    /// Record the rendered clip video and mark the clip `rendered`.
    ///
    /// Returns `None` unless the clip has both audio and image assets and
    /// has not failed.
    pub async fn set_video(
        pool: &PgPool,
        id: DbId,
        asset_id: DbId,
        rendered_duration_ms: i32,
    ) -> Result<Option<Clip>, sqlx::Error> {
        let query = format!(
            "UPDATE clips \
             SET video_asset_id = $3, rendered_duration_ms = $4, status_id = $2, error_message = NULL \
             WHERE id = $1 AND status_id <> $5 \
               AND audio_asset_id IS NOT NULL AND image_asset_id IS NOT NULL \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Clip>(&query)
            .bind(id)
            .bind(ClipStatus::Rendered.id())
            .bind(asset_id)
            .bind(rendered_duration_ms)
            .bind(ClipStatus::Failed.id())
            .fetch_optional(pool)
            .await
    }

    /// Mark a clip failed with the triggering error. Rendered clips are
    /// left alone.
    pub async fn fail(
        pool: &PgPool,
        id: DbId,
        error_message: &str,
    ) -> Result<Option<Clip>, sqlx::Error> {
        let query = format!(
            "UPDATE clips SET status_id = $2, error_message = $3 \
             WHERE id = $1 AND status_id <> $4 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Clip>(&query)
            .bind(id)
            .bind(ClipStatus::Failed.id())
            .bind(error_message)
            .bind(ClipStatus::Rendered.id())
            .fetch_optional(pool)
            .await
    }
}
