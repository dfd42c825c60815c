//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A create DTO for inserts

pub mod asset;
pub mod clip;
pub mod job;
pub mod project;
pub mod status;
