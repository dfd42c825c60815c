//! Domain primitives shared by every clipforge crate.
//!
//! Holds the concurrency building blocks of the production pipeline
//! (resource slots, retry policy, submit-and-poll waiting) alongside the
//! plan types and storage path conventions.

pub mod error;
pub mod paths;
pub mod plan;
pub mod poll;
pub mod resources;
pub mod retry;
pub mod types;
