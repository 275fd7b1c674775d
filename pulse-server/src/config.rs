//! # Configuration
//!
//! Command-line flags with environment fallbacks, folded into a plain
//! `ServerConfig` so the rest of the crate never touches clap.
//!
//! | Flag             | Env           | Default          |
//! |------------------|---------------|------------------|
//! | `--port`         | `PORT`        | `8080`           |
//! | `--bind`         | `BIND_ADDR`   | `0.0.0.0`        |
//! | `--redis-addr`   | `REDIS_ADDR`  | `127.0.0.1:6379` |
//! | `--window-size`  | `WINDOW_SIZE` | `50`             |
//! | `--queue-size`   | `QUEUE_SIZE`  | `1000`           |
//! | `--no-persist`   | `PULSE_NO_PERSIST` | off         |
//!
//! None of these affect correctness, only capacity and throughput.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::Parser;

use pulse_engine::DEFAULT_WINDOW_CAPACITY;

/// Ingest queue capacity used when none (or zero) is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default persistence store address.
pub const DEFAULT_STORE_ADDR: &str = "127.0.0.1:6379";

/// Deadline for one persistence write, covering connect, send, and reply.
/// Only the first DNS lookup of a host name falls outside it.
pub const STORE_WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Bound on the startup connectivity check.
pub const STORE_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Raw command-line interface.
#[derive(Debug, Parser)]
#[command(name = "pulse-server", version, about = "Sliding-window metric analytics service")]
pub struct Cli {
    /// HTTP listening port.
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Interface to bind.
    #[arg(long, env = "BIND_ADDR", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// Address of the Redis-compatible store receiving raw samples.
    #[arg(long, env = "REDIS_ADDR", default_value = DEFAULT_STORE_ADDR)]
    pub redis_addr: String,

    /// Number of samples kept in the sliding window.
    #[arg(long, env = "WINDOW_SIZE", default_value_t = DEFAULT_WINDOW_CAPACITY)]
    pub window_size: usize,

    /// Maximum number of samples waiting for analysis.
    #[arg(long, env = "QUEUE_SIZE", default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_size: usize,

    /// Do not forward raw samples to the store.
    #[arg(long, env = "PULSE_NO_PERSIST")]
    pub no_persist: bool,
}

/// Resolved server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// HTTP listen address.
    pub listen_addr: SocketAddr,
    /// Store address, or `None` to disable persistence.
    pub store_addr: Option<String>,
    /// Sliding window capacity.
    pub window_size: usize,
    /// Ingest queue capacity.
    pub queue_size: usize,
    /// Per-write persistence timeout.
    pub store_timeout: Duration,
    /// Startup probe timeout.
    pub probe_timeout: Duration,
}

impl ServerConfig {
    /// Replaces zero capacities with their defaults.
    pub fn normalized(mut self) -> Self {
        if self.window_size == 0 {
            self.window_size = DEFAULT_WINDOW_CAPACITY;
        }
        if self.queue_size == 0 {
            self.queue_size = DEFAULT_QUEUE_CAPACITY;
        }
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            store_addr: Some(DEFAULT_STORE_ADDR.to_string()),
            window_size: DEFAULT_WINDOW_CAPACITY,
            queue_size: DEFAULT_QUEUE_CAPACITY,
            store_timeout: STORE_WRITE_TIMEOUT,
            probe_timeout: STORE_PROBE_TIMEOUT,
        }
    }
}

impl From<Cli> for ServerConfig {
    fn from(cli: Cli) -> Self {
        ServerConfig {
            listen_addr: SocketAddr::new(cli.bind, cli.port),
            store_addr: (!cli.no_persist).then_some(cli.redis_addr),
            window_size: cli.window_size,
            queue_size: cli.queue_size,
            ..ServerConfig::default()
        }
        .normalized()
    }
}
