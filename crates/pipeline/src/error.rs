use clipforge_core::error::CoreError;
use clipforge_core::resources::SlotError;
use clipforge_db::StoreError;
use clipforge_providers::ProviderError;

use crate::queue::QueueError;

/// Failure of a stage handler or the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Core(#[from] CoreError),

    /// A resource pool stopped handing out slots.
    #[error(transparent)]
    Slot(SlotError),

    /// The entity is not in a state this stage can act on.
    #[error("{0}")]
    State(String),

    /// Work stopped because the worker is shutting down.
    #[error("cancelled")]
    Cancelled,
}

impl From<SlotError> for PipelineError {
    fn from(err: SlotError) -> Self {
        match err {
            SlotError::Cancelled(_) => PipelineError::Cancelled,
            SlotError::Closed(_) => PipelineError::Slot(err),
        }
    }
}

impl PipelineError {
    /// Whether the error is an abort rather than a real failure.
    pub fn is_cancelled(&self) -> bool {
        match self {
            PipelineError::Cancelled => true,
            PipelineError::Provider(e) => e.is_cancelled(),
            _ => false,
        }
    }
}
