//! Job orchestration for clipforge.
//!
//! A project moves through three queued stages:
//!
//! 1. `plan`: the planner writes a storyboard and one clip row per segment.
//! 2. `process_clip`: each clip is voiced, illustrated and rendered.
//! 3. `render_final`: rendered clips are joined into the final video.
//!
//! [`Dispatcher`] consumes the stage queues; [`submit_project`] feeds the
//! first one.

pub mod clip;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod finalize;
pub mod plan;
pub mod queue;
pub mod submit;

pub use context::{PipelineContext, PipelineSettings, Providers};
pub use dispatcher::Dispatcher;
pub use error::PipelineError;
pub use queue::{JobQueue, MemoryQueue, QueueJob, RedisQueue};
pub use submit::submit_project;
