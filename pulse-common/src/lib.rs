// pulse-common - Shared types and error definitions for Pulse
//
// This crate defines the metric sample, the analysis result, and the error
// taxonomy shared by the engine, the server, and the tooling.

pub mod error;
pub mod types;

// Re-export for convenience
pub use error::*;
pub use types::*;
