//! Simulator process lifecycle.
//!
//! - `controller`: launch, adopt, stop and restart the simulator process.
//! - `probe`: out-of-band discovery of an already-running instance and
//!   forwarding of the child's output pipes into `tracing`.

pub mod controller;
pub mod probe;

pub use controller::{ProcessController, ProcessStatus};
