//! Data-plane streaming: a persistent message connection to the
//! simulator's streaming endpoint with frame and audio dispatch.

pub mod message;
pub mod session;
pub mod transport;

pub use message::{InboundMessage, OutboundMessage};
pub use session::{StreamCallback, StreamState, StreamStatus, StreamingSession};
pub use transport::{StreamConnector, WebSocketConnector};
