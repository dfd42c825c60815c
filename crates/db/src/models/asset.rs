//! Asset entity: an immutable pointer to one stored artifact.

use std::fmt;

use clipforge_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Kind of generated artifact, stored as TEXT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    PlanJson,
    Audio,
    Image,
    ClipVideo,
    FinalVideo,
}

impl AssetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AssetKind::PlanJson => "plan_json",
            AssetKind::Audio => "audio",
            AssetKind::Image => "image",
            AssetKind::ClipVideo => "clip_video",
            AssetKind::FinalVideo => "final_video",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row from the `assets` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Asset {
    pub id: DbId,
    pub project_id: DbId,
    pub clip_id: Option<DbId>,
    pub kind: String,
    pub storage_bucket: String,
    pub storage_path: String,
    pub content_type: Option<String>,
    pub byte_size: Option<i64>,
    pub created_at: Timestamp,
}

/// DTO for recording a freshly uploaded artifact.
#[derive(Debug, Clone)]
pub struct CreateAsset {
    pub project_id: DbId,
    pub clip_id: Option<DbId>,
    pub kind: AssetKind,
    pub storage_bucket: String,
    pub storage_path: String,
    pub content_type: Option<String>,
    pub byte_size: Option<i64>,
}
