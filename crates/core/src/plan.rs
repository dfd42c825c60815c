//! Production plan produced by the planning provider.
//!
//! A plan is accepted whole or not at all: [`validate_plan`] rejects it
//! if any clip is missing a required field.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Per-project options forwarded to the planner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanRequest {
    pub topic: String,
    pub target_duration_secs: i32,
    pub tone: Option<String>,
    pub aspect_ratio: Option<String>,
    pub cta: Option<String>,
    pub language: Option<String>,
    pub style_prompt: Option<String>,
}

/// One planned segment. `clip_index` as returned by the planner is
/// advisory; stored clips are indexed by their position in the plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClipPlan {
    #[serde(default)]
    pub clip_index: i32,
    #[serde(default)]
    pub script: String,
    #[serde(default, alias = "voice_style_instruction")]
    pub voice_style: String,
    #[serde(default)]
    pub image_prompt: String,
    #[serde(default)]
    pub video_prompt: String,
    #[serde(default, alias = "estimated_duration_sec")]
    pub estimated_duration_secs: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoPlan {
    #[serde(default)]
    pub clips: Vec<ClipPlan>,
    #[serde(default, alias = "total_estimated_sec")]
    pub total_duration_secs: i32,
    #[serde(default, alias = "narrative_structure")]
    pub narrative_summary: String,
}

impl ClipPlan {
    /// Names of required fields that are empty or zero.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.script.trim().is_empty() {
            missing.push("script");
        }
        if self.voice_style.trim().is_empty() {
            missing.push("voice_style");
        }
        if self.image_prompt.trim().is_empty() {
            missing.push("image_prompt");
        }
        if self.video_prompt.trim().is_empty() {
            missing.push("video_prompt");
        }
        if self.estimated_duration_secs <= 0 {
            missing.push("estimated_duration_secs");
        }
        missing
    }
}

/// Reject a plan with no clips or with any incomplete clip.
pub fn validate_plan(plan: &VideoPlan) -> Result<(), CoreError> {
    if plan.clips.is_empty() {
        return Err(CoreError::Validation("plan has no clips".into()));
    }
    for (i, clip) in plan.clips.iter().enumerate() {
        let missing = clip.missing_fields();
        if !missing.is_empty() {
            return Err(CoreError::Validation(format!(
                "clip {i} missing required fields: {}",
                missing.join(", ")
            )));
        }
    }
    Ok(())
}
