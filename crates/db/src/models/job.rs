//! Job entity: the audit record of one queue-dispatched execution.

use std::fmt;
use std::str::FromStr;

use clipforge_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::{JobStatus, StatusId};

/// Pipeline stage a job belongs to; doubles as the queue message `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Plan,
    ProcessClip,
    RenderFinal,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [JobKind::Plan, JobKind::ProcessClip, JobKind::RenderFinal];

    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Plan => "plan",
            JobKind::ProcessClip => "process_clip",
            JobKind::RenderFinal => "render_final",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown job kind: {s}"))
    }
}

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub project_id: DbId,
    pub clip_id: Option<DbId>,
    pub kind: String,
    pub status_id: StatusId,
    pub attempts: i32,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
}

impl Job {
    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::from_id(self.status_id)
    }
}

/// DTO identifying a job row. The id is shared with the queue message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateJob {
    pub id: DbId,
    pub project_id: DbId,
    pub clip_id: Option<DbId>,
    pub kind: JobKind,
}
