//! Control-plane (HTTP request/response) client.
//!
//! - `reply`: the uniform [`ControlReply`] value every call returns.
//! - `session`: connection handle management and the generic `request`.
//! - `api`: typed wrappers for each simulator endpoint.

pub mod api;
pub mod reply;
pub mod session;

pub use reply::ControlReply;
pub use session::{ControlSession, ControlStatus};
