//! HTTP request handlers organized by endpoint

pub mod api;
pub mod streaming;

// Re-export handler functions
pub use api::{InfoQuery, info, metrics};
pub use streaming::{StreamQuery, stream};
