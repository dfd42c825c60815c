//! In-process [`EntityStore`] with the same transition rules as the
//! Postgres store. Backs the pipeline tests and database-free local runs.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use clipforge_core::types::{new_id, DbId};

use crate::error::StoreError;
use crate::models::asset::{Asset, CreateAsset};
use crate::models::clip::{Clip, CreateClip};
use crate::models::job::{CreateJob, Job};
use crate::models::project::{CreateProject, Project, DEFAULT_TARGET_DURATION_SECS};
use crate::models::status::{ClipStatus, JobStatus, ProjectStatus};
use crate::store::EntityStore;

#[derive(Debug, Default)]
struct Tables {
    projects: HashMap<DbId, Project>,
    clips: HashMap<DbId, Clip>,
    assets: HashMap<DbId, Asset>,
    jobs: HashMap<DbId, Job>,
}

impl Tables {
    fn project_mut(&mut self, id: DbId) -> Result<&mut Project, StoreError> {
        self.projects.get_mut(&id).ok_or(StoreError::NotFound {
            entity: "project",
            id,
        })
    }

    fn clip_mut(&mut self, id: DbId) -> Result<&mut Clip, StoreError> {
        self.clips
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "clip", id })
    }

    fn job_mut(&mut self, id: DbId) -> Result<&mut Job, StoreError> {
        self.jobs
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "job", id })
    }

    fn clips_of(&self, project_id: DbId) -> impl Iterator<Item = &Clip> {
        self.clips.values().filter(move |c| c.project_id == project_id)
    }

    fn unrendered(&self, project_id: DbId) -> i64 {
        self.clips_of(project_id).filter(|c| !c.is_rendered()).count() as i64
    }
}

fn project_conflict(project: &Project, reason: &str) -> StoreError {
    let status = project.status().map(|s| s.as_str()).unwrap_or("unknown");
    StoreError::conflict("project", project.id, format!("{reason} (status {status})"))
}

/// Forward-only status write shared by the audio and image setters.
fn advance(clip: &mut Clip, target: ClipStatus) {
    let current = clip.status().unwrap_or(ClipStatus::Pending);
    clip.status_id = current.advance(target).id();
    clip.updated_at = Utc::now();
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn create_project(&self, input: &CreateProject) -> Result<Project, StoreError> {
        let input = input.with_defaults();
        let now = Utc::now();
        let project = Project {
            id: new_id(),
            topic: input.topic,
            target_duration_secs: input
                .target_duration_secs
                .unwrap_or(DEFAULT_TARGET_DURATION_SECS),
            tone: input.tone,
            aspect_ratio: input.aspect_ratio,
            voice_id: input.voice_id,
            language: input.language,
            cta: input.cta,
            style_prompt: input.style_prompt,
            status_id: ProjectStatus::Queued.id(),
            final_video_asset_id: None,
            error_code: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        self.tables().projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn get_project(&self, id: DbId) -> Result<Project, StoreError> {
        self.tables().project_mut(id).map(|p| p.clone())
    }

    async fn set_project_status(
        &self,
        id: DbId,
        status: ProjectStatus,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables();
        let project = tables.project_mut(id)?;
        if project.status().is_some_and(ProjectStatus::is_terminal) {
            return Err(project_conflict(project, &format!("cannot move to {status}")));
        }
        project.status_id = status.id();
        project.updated_at = Utc::now();
        Ok(())
    }

    async fn fail_project(&self, id: DbId, code: &str, message: &str) -> Result<(), StoreError> {
        let mut tables = self.tables();
        let project = tables.project_mut(id)?;
        if project.status_id == ProjectStatus::Completed.id() {
            return Err(project_conflict(project, "cannot fail"));
        }
        project.status_id = ProjectStatus::Failed.id();
        project.error_code = Some(code.to_string());
        project.error_message = Some(message.to_string());
        project.updated_at = Utc::now();
        Ok(())
    }

    async fn claim_final_render(&self, id: DbId) -> Result<bool, StoreError> {
        let mut tables = self.tables();
        let has_clips = tables.clips_of(id).next().is_some();
        let unrendered = tables.unrendered(id);
        let project = tables.project_mut(id)?;
        if project.status_id != ProjectStatus::Generating.id() || !has_clips || unrendered > 0 {
            return Ok(false);
        }
        project.status_id = ProjectStatus::Rendering.id();
        project.updated_at = Utc::now();
        Ok(true)
    }

    async fn complete_project(
        &self,
        id: DbId,
        final_video_asset_id: DbId,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables();
        let unrendered = tables.unrendered(id);
        let project = tables.project_mut(id)?;
        if project.status_id != ProjectStatus::Rendering.id() || unrendered > 0 {
            return Err(project_conflict(project, "cannot complete"));
        }
        project.status_id = ProjectStatus::Completed.id();
        project.final_video_asset_id = Some(final_video_asset_id);
        project.error_code = None;
        project.error_message = None;
        project.updated_at = Utc::now();
        Ok(())
    }

    async fn create_clips(&self, clips: &[CreateClip]) -> Result<Vec<Clip>, StoreError> {
        let mut tables = self.tables();
        for input in clips {
            tables.project_mut(input.project_id)?;
            let taken = tables
                .clips_of(input.project_id)
                .any(|c| c.clip_index == input.clip_index);
            if taken {
                return Err(StoreError::conflict(
                    "project",
                    input.project_id,
                    format!("clip_index {} already exists", input.clip_index),
                ));
            }
        }

        let now = Utc::now();
        let created: Vec<Clip> = clips
            .iter()
            .map(|input| Clip {
                id: input.id,
                project_id: input.project_id,
                clip_index: input.clip_index,
                script: input.script.clone(),
                voice_style: input.voice_style.clone(),
                image_prompt: input.image_prompt.clone(),
                video_prompt: input.video_prompt.clone(),
                estimated_duration_secs: input.estimated_duration_secs,
                status_id: ClipStatus::Pending.id(),
                audio_asset_id: None,
                image_asset_id: None,
                video_asset_id: None,
                audio_duration_ms: None,
                rendered_duration_ms: None,
                error_message: None,
                created_at: now,
                updated_at: now,
            })
            .collect();
        for clip in &created {
            tables.clips.insert(clip.id, clip.clone());
        }
        Ok(created)
    }

    async fn get_clip(&self, id: DbId) -> Result<Clip, StoreError> {
        self.tables().clip_mut(id).map(|c| c.clone())
    }

    async fn list_clips(&self, project_id: DbId) -> Result<Vec<Clip>, StoreError> {
        let tables = self.tables();
        let mut clips: Vec<Clip> = tables.clips_of(project_id).cloned().collect();
        clips.sort_by_key(|c| c.clip_index);
        Ok(clips)
    }

    async fn count_unrendered_clips(&self, project_id: DbId) -> Result<i64, StoreError> {
        Ok(self.tables().unrendered(project_id))
    }

    async fn set_clip_audio(
        &self,
        id: DbId,
        asset_id: DbId,
        duration_ms: i32,
    ) -> Result<Clip, StoreError> {
        let mut tables = self.tables();
        let clip = tables.clip_mut(id)?;
        clip.audio_asset_id = Some(asset_id);
        clip.audio_duration_ms = Some(duration_ms);
        advance(clip, ClipStatus::Voiced);
        Ok(clip.clone())
    }

    async fn set_clip_image(&self, id: DbId, asset_id: DbId) -> Result<Clip, StoreError> {
        let mut tables = self.tables();
        let clip = tables.clip_mut(id)?;
        clip.image_asset_id = Some(asset_id);
        advance(clip, ClipStatus::Imaged);
        Ok(clip.clone())
    }

    async fn set_clip_video(
        &self,
        id: DbId,
        asset_id: DbId,
        rendered_duration_ms: i32,
    ) -> Result<Clip, StoreError> {
        let mut tables = self.tables();
        let clip = tables.clip_mut(id)?;
        if clip.status_id == ClipStatus::Failed.id()
            || clip.audio_asset_id.is_none()
            || clip.image_asset_id.is_none()
        {
            return Err(StoreError::conflict(
                "clip",
                id,
                "cannot mark rendered without audio and image assets",
            ));
        }
        clip.video_asset_id = Some(asset_id);
        clip.rendered_duration_ms = Some(rendered_duration_ms);
        clip.status_id = ClipStatus::Rendered.id();
        clip.error_message = None;
        clip.updated_at = Utc::now();
        Ok(clip.clone())
    }

    async fn fail_clip(&self, id: DbId, message: &str) -> Result<(), StoreError> {
        let mut tables = self.tables();
        let clip = tables.clip_mut(id)?;
        if clip.is_rendered() {
            return Err(StoreError::conflict("clip", id, "already rendered"));
        }
        clip.status_id = ClipStatus::Failed.id();
        clip.error_message = Some(message.to_string());
        clip.updated_at = Utc::now();
        Ok(())
    }

    async fn create_asset(&self, input: &CreateAsset) -> Result<Asset, StoreError> {
        let mut tables = self.tables();
        tables.project_mut(input.project_id)?;
        let asset = Asset {
            id: new_id(),
            project_id: input.project_id,
            clip_id: input.clip_id,
            kind: input.kind.as_str().to_string(),
            storage_bucket: input.storage_bucket.clone(),
            storage_path: input.storage_path.clone(),
            content_type: input.content_type.clone(),
            byte_size: input.byte_size,
            created_at: Utc::now(),
        };
        tables.assets.insert(asset.id, asset.clone());
        Ok(asset)
    }

    async fn get_asset(&self, id: DbId) -> Result<Asset, StoreError> {
        self.tables()
            .assets
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { entity: "asset", id })
    }

    async fn create_job(&self, input: &CreateJob) -> Result<Job, StoreError> {
        let mut tables = self.tables();
        if tables.jobs.contains_key(&input.id) {
            return Err(StoreError::conflict("job", input.id, "already exists"));
        }
        let job = Job {
            id: input.id,
            project_id: input.project_id,
            clip_id: input.clip_id,
            kind: input.kind.as_str().to_string(),
            status_id: JobStatus::Queued.id(),
            attempts: 0,
            started_at: None,
            finished_at: None,
            error_message: None,
            created_at: Utc::now(),
        };
        tables.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn start_job(&self, input: &CreateJob) -> Result<Job, StoreError> {
        let mut tables = self.tables();
        let now = Utc::now();
        let job = tables.jobs.entry(input.id).or_insert_with(|| Job {
            id: input.id,
            project_id: input.project_id,
            clip_id: input.clip_id,
            kind: input.kind.as_str().to_string(),
            status_id: JobStatus::Queued.id(),
            attempts: 0,
            started_at: None,
            finished_at: None,
            error_message: None,
            created_at: now,
        });
        job.status_id = JobStatus::Running.id();
        job.attempts += 1;
        job.started_at = Some(now);
        job.finished_at = None;
        job.error_message = None;
        Ok(job.clone())
    }

    async fn complete_job(&self, id: DbId) -> Result<(), StoreError> {
        let mut tables = self.tables();
        let job = tables.job_mut(id)?;
        job.status_id = JobStatus::Succeeded.id();
        job.finished_at = Some(Utc::now());
        job.error_message = None;
        Ok(())
    }

    async fn fail_job(&self, id: DbId, message: &str) -> Result<(), StoreError> {
        let mut tables = self.tables();
        let job = tables.job_mut(id)?;
        job.status_id = JobStatus::Failed.id();
        job.finished_at = Some(Utc::now());
        job.error_message = Some(message.to_string());
        Ok(())
    }

    async fn get_job(&self, id: DbId) -> Result<Job, StoreError> {
        self.tables().job_mut(id).map(|j| j.clone())
    }

    async fn list_jobs(&self, project_id: DbId) -> Result<Vec<Job>, StoreError> {
        let tables = self.tables();
        let mut jobs: Vec<Job> = tables
            .jobs
            .values()
            .filter(|j| j.project_id == project_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.id);
        Ok(jobs)
    }
}
