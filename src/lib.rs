#![forbid(unsafe_code)]

//! Programmatic control of a headless physics simulator: launch or adopt
//! the simulator process, drive it over its HTTP control endpoint, and
//! receive its frame and audio stream over a persistent WebSocket.

pub mod config;
pub mod control;
pub mod errors;
pub mod orchestrator;
pub mod process;
pub mod streaming;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
pub use orchestrator::{EnvironmentStatus, SimEnvironment};
