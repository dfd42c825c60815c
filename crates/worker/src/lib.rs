//! Worker process support: configuration and service wiring.

pub mod bootstrap;
pub mod config;
