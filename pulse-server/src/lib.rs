//! Pulse server: HTTP ingestion, asynchronous analysis, and export of
//! sliding-window metric statistics.

pub mod api;
pub mod config;
pub mod dispatcher;
pub mod metrics;
pub mod server;
pub mod sink;

pub use config::{Cli, ServerConfig};
pub use server::{run, serve, shutdown_signal};
