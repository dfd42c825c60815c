/// All primary keys are UUIDv7, generated application-side so queue
/// messages can reference rows before any consumer reads them.
pub type DbId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Allocate a new time-ordered identifier.
pub fn new_id() -> DbId {
    uuid::Uuid::now_v7()
}
