//! Tidegate Web - HTTP gateway over a torrent engine
//!
//! Serves `/info`, `/stream` and `/metrics` behind credential checks and
//! owns the lifecycle of the listener and the engine.

pub mod errors;
pub mod handlers;
pub mod range;
pub mod server;

// Re-export main types
pub use errors::ApiError;
pub use server::gateway::{Gateway, GatewayError};
pub use server::{AppState, router};
