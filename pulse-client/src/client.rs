//! # Store Client
//!
//! Purpose: Expose a compact, blocking API for the list-append and liveness
//! commands the persistence sink issues over RESP2.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `StoreClient` hides pooling and protocol details.
//! 2. **Byte Slices In**: Keys and values are `&[u8]`; callers keep ownership.
//! 3. **Fail Fast**: Protocol violations and pool exhaustion surface
//!    immediately as errors; nothing is retried here.

use std::time::Duration;

use thiserror::Error;

use crate::pool::ConnectionPool;
use crate::resp::RespValue;

pub type ClientResult<T> = Result<T, ClientError>;

/// Failures talking to the store.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or IO failure while reading/writing (including timeouts).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Reply was not valid RESP2.
    #[error("protocol error")]
    Protocol,
    /// `-ERR ...` reply from the store.
    #[error("server error: {}", String::from_utf8_lossy(.message))]
    Server { message: Vec<u8> },
    /// Reply was well-formed but of the wrong type for the command.
    #[error("unexpected response")]
    UnexpectedResponse,
    /// Every connection slot is in use.
    #[error("connection pool exhausted")]
    PoolExhausted,
    /// Address could not be resolved into a socket address.
    #[error("invalid address")]
    InvalidAddress,
}

impl ClientError {
    /// Returns true when the failure came from a socket timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            ClientError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

/// Where to connect and how long one call may take.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Store address, e.g. "127.0.0.1:6379" or "redis:6379".
    pub addr: String,
    /// Idle connections retained between calls.
    pub max_idle: usize,
    /// Open connections allowed at once.
    pub max_total: usize,
    /// Deadline for one call, covering connect, send, and the full reply.
    /// `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        ClientConfig {
            addr: addr.into(),
            max_idle: 4,
            max_total: 8,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Limits open connections; the idle cap never exceeds it.
    pub fn with_max_connections(mut self, max_total: usize) -> Self {
        self.max_total = max_total.max(1);
        self.max_idle = self.max_idle.min(self.max_total);
        self
    }
}

/// Synchronous store client with connection pooling.
///
/// Each call acquires a connection, executes one command, and returns the
/// connection to the pool. Connections that fail mid-command are discarded.
pub struct StoreClient {
    pool: ConnectionPool,
    addr: String,
}

impl StoreClient {
    /// No connection is opened until the first command.
    pub fn with_config(config: ClientConfig) -> ClientResult<Self> {
        let addr = config.addr.clone();
        let pool = ConnectionPool::new(config)?;
        Ok(StoreClient { pool, addr })
    }

    /// Returns the configured store address.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Sends `PING`, echoing `payload` when given, and returns the reply text.
    pub fn ping(&self, payload: Option<&[u8]>) -> ClientResult<Vec<u8>> {
        let mut conn = self.pool.lease()?;
        let response = match payload {
            Some(data) => conn.command(&[b"PING", data])?,
            None => conn.command(&[b"PING"])?,
        };
        match response {
            RespValue::Simple(text) => Ok(text),
            RespValue::Bulk(Some(data)) => Ok(data),
            RespValue::Error(message) => Err(ClientError::Server { message }),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Prepends `value` to the list at `key`.
    ///
    /// Returns the list length after the push.
    pub fn lpush(&self, key: &[u8], value: &[u8]) -> ClientResult<i64> {
        let mut conn = self.pool.lease()?;
        match conn.command(&[b"LPUSH", key, value])? {
            RespValue::Integer(len) => Ok(len),
            RespValue::Error(message) => Err(ClientError::Server { message }),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }
}
