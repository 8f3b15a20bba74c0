//! Composite environment status.

use serde::Serialize;
use serde_json::Value;

use crate::control::ControlStatus;
use crate::process::ProcessStatus;
use crate::streaming::StreamStatus;

/// Snapshot of all three subsystems plus the remote simulation status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvironmentStatus {
    /// Whether `initialize` completed and `cleanup` has not run since.
    pub is_initialized: bool,
    /// Process controller snapshot.
    pub process: ProcessStatus,
    /// Streaming session snapshot.
    pub streaming: StreamStatus,
    /// Control session snapshot.
    pub control: ControlStatus,
    /// Reply of `GET /simulation/status`, present only when initialized.
    /// Error replies are embedded as-is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation_status: Option<Value>,
}
