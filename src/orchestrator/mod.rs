//! Environment orchestration.
//!
//! Sequences the process controller and both sessions through
//! initialization, scoped use and cleanup, and aggregates their status.

pub mod environment;
pub mod status;

pub use environment::SimEnvironment;
pub use status::EnvironmentStatus;
