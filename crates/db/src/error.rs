use clipforge_core::types::DbId;

/// Failure reported by an [`EntityStore`](crate::store::EntityStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    /// A guarded transition did not apply because the row is in the
    /// wrong state.
    #[error("{entity} {id}: {reason}")]
    Conflict {
        entity: &'static str,
        id: DbId,
        reason: String,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn conflict(entity: &'static str, id: DbId, reason: impl Into<String>) -> Self {
        StoreError::Conflict {
            entity,
            id,
            reason: reason.into(),
        }
    }
}
