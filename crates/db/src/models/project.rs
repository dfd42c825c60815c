//! Project entity: one "produce a video from a topic" request.

use clipforge_core::plan::PlanRequest;
use clipforge_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::{ProjectStatus, StatusId};

pub const DEFAULT_TARGET_DURATION_SECS: i32 = 60;
pub const DEFAULT_TONE: &str = "documentary";
pub const DEFAULT_ASPECT_RATIO: &str = "9:16";
pub const DEFAULT_LANGUAGE: &str = "en";

/// A row from the `projects` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Project {
    pub id: DbId,
    pub topic: String,
    pub target_duration_secs: i32,
    pub tone: Option<String>,
    pub aspect_ratio: Option<String>,
    pub voice_id: Option<String>,
    pub language: Option<String>,
    pub cta: Option<String>,
    pub style_prompt: Option<String>,
    pub status_id: StatusId,
    pub final_video_asset_id: Option<DbId>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Project {
    pub fn status(&self) -> Option<ProjectStatus> {
        ProjectStatus::from_id(self.status_id)
    }

    /// Options forwarded to the planner for this project.
    pub fn plan_request(&self) -> PlanRequest {
        PlanRequest {
            topic: self.topic.clone(),
            target_duration_secs: self.target_duration_secs,
            tone: self.tone.clone(),
            aspect_ratio: self.aspect_ratio.clone(),
            cta: self.cta.clone(),
            language: self.language.clone(),
            style_prompt: self.style_prompt.clone(),
        }
    }
}

/// DTO for creating a project. Unset options receive defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateProject {
    pub topic: String,
    pub target_duration_secs: Option<i32>,
    pub tone: Option<String>,
    pub aspect_ratio: Option<String>,
    pub voice_id: Option<String>,
    pub language: Option<String>,
    pub cta: Option<String>,
    pub style_prompt: Option<String>,
}

impl CreateProject {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Default::default()
        }
    }

    /// Fill unset duration, tone, aspect ratio and language.
    pub fn with_defaults(&self) -> Self {
        Self {
            topic: self.topic.trim().to_string(),
            target_duration_secs: Some(
                self.target_duration_secs
                    .filter(|secs| *secs > 0)
                    .unwrap_or(DEFAULT_TARGET_DURATION_SECS),
            ),
            tone: self.tone.clone().or_else(|| Some(DEFAULT_TONE.into())),
            aspect_ratio: self
                .aspect_ratio
                .clone()
                .or_else(|| Some(DEFAULT_ASPECT_RATIO.into())),
            voice_id: self.voice_id.clone(),
            language: self.language.clone().or_else(|| Some(DEFAULT_LANGUAGE.into())),
            cta: self.cta.clone(),
            style_prompt: self.style_prompt.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_only_missing_options() {
        let input = CreateProject {
            topic: "  deep sea creatures ".into(),
            tone: Some("dramatic".into()),
            target_duration_secs: Some(0),
            ..Default::default()
        };
        let filled = input.with_defaults();

        assert_eq!(filled.topic, "deep sea creatures");
        assert_eq!(filled.target_duration_secs, Some(DEFAULT_TARGET_DURATION_SECS));
        assert_eq!(filled.tone.as_deref(), Some("dramatic"));
        assert_eq!(filled.aspect_ratio.as_deref(), Some("9:16"));
        assert_eq!(filled.language.as_deref(), Some("en"));
        assert_eq!(filled.voice_id, None);
    }
}
