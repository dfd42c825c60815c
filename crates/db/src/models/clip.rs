//! Clip entity: one segment of a project.

use clipforge_core::plan::ClipPlan;
use clipforge_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::status::{ClipStatus, StatusId};

/// A row from the `clips` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Clip {
    pub id: DbId,
    pub project_id: DbId,
    pub clip_index: i32,
    pub script: String,
    pub voice_style: String,
    pub image_prompt: String,
    pub video_prompt: String,
    pub estimated_duration_secs: i32,
    pub status_id: StatusId,
    pub audio_asset_id: Option<DbId>,
    pub image_asset_id: Option<DbId>,
    pub video_asset_id: Option<DbId>,
    pub audio_duration_ms: Option<i32>,
    pub rendered_duration_ms: Option<i32>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Clip {
    pub fn status(&self) -> Option<ClipStatus> {
        ClipStatus::from_id(self.status_id)
    }

    pub fn is_rendered(&self) -> bool {
        self.status_id == ClipStatus::Rendered.id()
    }
}

/// DTO for inserting a clip from a validated plan.
#[derive(Debug, Clone)]
pub struct CreateClip {
    pub id: DbId,
    pub project_id: DbId,
    pub clip_index: i32,
    pub script: String,
    pub voice_style: String,
    pub image_prompt: String,
    pub video_prompt: String,
    pub estimated_duration_secs: i32,
}

impl CreateClip {
    /// Build the insert for the plan entry at `position`; the position,
    /// not the planner's own index, becomes `clip_index`.
    pub fn from_plan(project_id: DbId, position: usize, plan: &ClipPlan) -> Self {
        Self {
            id: clipforge_core::types::new_id(),
            project_id,
            clip_index: position as i32,
            script: plan.script.clone(),
            voice_style: plan.voice_style.clone(),
            image_prompt: plan.image_prompt.clone(),
            video_prompt: plan.video_prompt.clone(),
            estimated_duration_secs: plan.estimated_duration_secs,
        }
    }
}
