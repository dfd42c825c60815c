//! The entity-store contract consumed by the pipeline, and its Postgres
//! implementation.
//!
//! Every status write is a single-row update. Guarded transitions that do
//! not apply surface as [`StoreError::Conflict`]; missing rows as
//! [`StoreError::NotFound`].

use async_trait::async_trait;
use clipforge_core::types::{new_id, DbId};
use sqlx::PgPool;

use crate::error::StoreError;
use crate::models::asset::{Asset, CreateAsset};
use crate::models::clip::{Clip, CreateClip};
use crate::models::job::{CreateJob, Job};
use crate::models::project::{CreateProject, Project};
use crate::models::status::ProjectStatus;
use crate::repositories::{AssetRepo, ClipRepo, JobRepo, ProjectRepo};

#[async_trait]
pub trait EntityStore: Send + Sync {
    // -- projects ----------------------------------------------------------

    async fn create_project(&self, input: &CreateProject) -> Result<Project, StoreError>;

    async fn get_project(&self, id: DbId) -> Result<Project, StoreError>;

    /// Move a non-terminal project to `status`.
    async fn set_project_status(&self, id: DbId, status: ProjectStatus)
        -> Result<(), StoreError>;

    /// Mark a project failed with a machine-readable code and message.
    async fn fail_project(&self, id: DbId, code: &str, message: &str) -> Result<(), StoreError>;

    /// Conditional `generating -> rendering` claim, taken only when every
    /// clip is rendered. Returns `true` for exactly one caller.
    async fn claim_final_render(&self, id: DbId) -> Result<bool, StoreError>;

    /// `rendering -> completed`, refused while any clip is not rendered.
    async fn complete_project(&self, id: DbId, final_video_asset_id: DbId)
        -> Result<(), StoreError>;

    // -- clips -------------------------------------------------------------

    async fn create_clips(&self, clips: &[CreateClip]) -> Result<Vec<Clip>, StoreError>;

    async fn get_clip(&self, id: DbId) -> Result<Clip, StoreError>;

    /// Clips of a project ordered by `clip_index`.
    async fn list_clips(&self, project_id: DbId) -> Result<Vec<Clip>, StoreError>;

    async fn count_unrendered_clips(&self, project_id: DbId) -> Result<i64, StoreError>;

    async fn set_clip_audio(
        &self,
        id: DbId,
        asset_id: DbId,
        duration_ms: i32,
    ) -> Result<Clip, StoreError>;

    async fn set_clip_image(&self, id: DbId, asset_id: DbId) -> Result<Clip, StoreError>;

    /// Mark a clip rendered. Requires audio and image assets.
    async fn set_clip_video(
        &self,
        id: DbId,
        asset_id: DbId,
        rendered_duration_ms: i32,
    ) -> Result<Clip, StoreError>;

    async fn fail_clip(&self, id: DbId, message: &str) -> Result<(), StoreError>;

    // -- assets ------------------------------------------------------------

    async fn create_asset(&self, input: &CreateAsset) -> Result<Asset, StoreError>;

    async fn get_asset(&self, id: DbId) -> Result<Asset, StoreError>;

    // -- jobs --------------------------------------------------------------

    async fn create_job(&self, input: &CreateJob) -> Result<Job, StoreError>;

    /// Upsert the job to `running`, incrementing its attempt count.
    async fn start_job(&self, input: &CreateJob) -> Result<Job, StoreError>;

    async fn complete_job(&self, id: DbId) -> Result<(), StoreError>;

    async fn fail_job(&self, id: DbId, message: &str) -> Result<(), StoreError>;

    async fn get_job(&self, id: DbId) -> Result<Job, StoreError>;

    async fn list_jobs(&self, project_id: DbId) -> Result<Vec<Job>, StoreError>;
}

fn found<T>(row: Option<T>, entity: &'static str, id: DbId) -> Result<T, StoreError> {
    row.ok_or(StoreError::NotFound { entity, id })
}

/// [`EntityStore`] backed by Postgres through the repositories.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Tell a missing row apart from a refused transition.
    async fn project_conflict(&self, id: DbId, reason: &str) -> StoreError {
        match ProjectRepo::find_by_id(&self.pool, id).await {
            Ok(Some(project)) => StoreError::conflict(
                "project",
                id,
                format!(
                    "{reason} (status {})",
                    project
                        .status()
                        .map(|s| s.as_str())
                        .unwrap_or("unknown")
                ),
            ),
            Ok(None) => StoreError::NotFound {
                entity: "project",
                id,
            },
            Err(e) => StoreError::Database(e),
        }
    }

    async fn clip_conflict(&self, id: DbId, reason: &str) -> StoreError {
        match ClipRepo::find_by_id(&self.pool, id).await {
            Ok(Some(_)) => StoreError::conflict("clip", id, reason),
            Ok(None) => StoreError::NotFound { entity: "clip", id },
            Err(e) => StoreError::Database(e),
        }
    }
}

#[async_trait]
impl EntityStore for PgStore {
    async fn create_project(&self, input: &CreateProject) -> Result<Project, StoreError> {
        Ok(ProjectRepo::create(&self.pool, new_id(), input).await?)
    }

    async fn get_project(&self, id: DbId) -> Result<Project, StoreError> {
        found(ProjectRepo::find_by_id(&self.pool, id).await?, "project", id)
    }

    async fn set_project_status(
        &self,
        id: DbId,
        status: ProjectStatus,
    ) -> Result<(), StoreError> {
        if ProjectRepo::set_status(&self.pool, id, status).await? {
            return Ok(());
        }
        Err(self
            .project_conflict(id, &format!("cannot move to {status}"))
            .await)
    }

    async fn fail_project(&self, id: DbId, code: &str, message: &str) -> Result<(), StoreError> {
        if ProjectRepo::fail(&self.pool, id, code, message).await? {
            return Ok(());
        }
        Err(self.project_conflict(id, "cannot fail").await)
    }

    async fn claim_final_render(&self, id: DbId) -> Result<bool, StoreError> {
        Ok(ProjectRepo::claim_final_render(&self.pool, id).await?)
    }

    async fn complete_project(
        &self,
        id: DbId,
        final_video_asset_id: DbId,
    ) -> Result<(), StoreError> {
        if ProjectRepo::complete(&self.pool, id, final_video_asset_id).await? {
            return Ok(());
        }
        Err(self.project_conflict(id, "cannot complete").await)
    }

    async fn create_clips(&self, clips: &[CreateClip]) -> Result<Vec<Clip>, StoreError> {
        Ok(ClipRepo::create_many(&self.pool, clips).await?)
    }

    async fn get_clip(&self, id: DbId) -> Result<Clip, StoreError> {
        found(ClipRepo::find_by_id(&self.pool, id).await?, "clip", id)
    }

    async fn list_clips(&self, project_id: DbId) -> Result<Vec<Clip>, StoreError> {
        Ok(ClipRepo::list_by_project(&self.pool, project_id).await?)
    }

    async fn count_unrendered_clips(&self, project_id: DbId) -> Result<i64, StoreError> {
        Ok(ClipRepo::count_unrendered(&self.pool, project_id).await?)
    }

    async fn set_clip_audio(
        &self,
        id: DbId,
        asset_id: DbId,
        duration_ms: i32,
    ) -> Result<Clip, StoreError> {
        found(
            ClipRepo::set_audio(&self.pool, id, asset_id, duration_ms).await?,
            "clip",
            id,
        )
    }

    async fn set_clip_image(&self, id: DbId, asset_id: DbId) -> Result<Clip, StoreError> {
        found(
            ClipRepo::set_image(&self.pool, id, asset_id).await?,
            "clip",
            id,
        )
    }

    async fn set_clip_video(
        &self,
        id: DbId,
        asset_id: DbId,
        rendered_duration_ms: i32,
    ) -> Result<Clip, StoreError> {
        match ClipRepo::set_video(&self.pool, id, asset_id, rendered_duration_ms).await? {
            Some(clip) => Ok(clip),
            None => Err(self
                .clip_conflict(id, "cannot mark rendered without audio and image assets")
                .await),
        }
    }

    async fn fail_clip(&self, id: DbId, message: &str) -> Result<(), StoreError> {
        match ClipRepo::fail(&self.pool, id, message).await? {
            Some(_) => Ok(()),
            None => Err(self.clip_conflict(id, "already rendered").await),
        }
    }

    async fn create_asset(&self, input: &CreateAsset) -> Result<Asset, StoreError> {
        Ok(AssetRepo::create(&self.pool, new_id(), input).await?)
    }

    async fn get_asset(&self, id: DbId) -> Result<Asset, StoreError> {
        found(AssetRepo::find_by_id(&self.pool, id).await?, "asset", id)
    }

    async fn create_job(&self, input: &CreateJob) -> Result<Job, StoreError> {
        Ok(JobRepo::create(&self.pool, input).await?)
    }

    async fn start_job(&self, input: &CreateJob) -> Result<Job, StoreError> {
        Ok(JobRepo::start(&self.pool, input).await?)
    }

    async fn complete_job(&self, id: DbId) -> Result<(), StoreError> {
        if JobRepo::complete(&self.pool, id).await? {
            return Ok(());
        }
        Err(StoreError::NotFound { entity: "job", id })
    }

    async fn fail_job(&self, id: DbId, message: &str) -> Result<(), StoreError> {
        if JobRepo::fail(&self.pool, id, message).await? {
            return Ok(());
        }
        Err(StoreError::NotFound { entity: "job", id })
    }

    async fn get_job(&self, id: DbId) -> Result<Job, StoreError> {
        found(JobRepo::find_by_id(&self.pool, id).await?, "job", id)
    }

    async fn list_jobs(&self, project_id: DbId) -> Result<Vec<Job>, StoreError> {
        Ok(JobRepo::list_by_project(&self.pool, project_id).await?)
    }
}
