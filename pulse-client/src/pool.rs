//! # Connection Pool
//!
//! Reuses TCP connections to the store so repeated appends skip the
//! handshake, and caps how many sockets a stalled store can hold open.
//!
//! ```text
//! lease() ──> idle stack hit? ──yes──> Lease
//!                 │ no
//!                 └─> open slot free? ──yes──> dial ──> Lease
//!                           │ no
//!                           └─> PoolExhausted
//!
//! Lease dropped: healthy ─> back on idle stack (or closed if stack full)
//!                broken  ─> closed, slot freed
//! ```
//!
//! The mutex guards only slot bookkeeping; no network I/O happens under it.
//!
//! `ClientConfig::timeout` is a single deadline fixed when a lease is taken:
//! dialing, sending, and every read of the reply draw from the same budget.
//! The first DNS lookup for a host name is not covered; its result is cached
//! so later dials skip it.

use std::io::{self, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::client::{ClientConfig, ClientError, ClientResult};
use crate::resp::{encode_command, read_response, RespValue};

#[derive(Default)]
struct Slots {
    idle: Vec<StoreConnection>,
    open: usize,
}

struct Shared {
    config: ClientConfig,
    slots: Mutex<Slots>,
    /// Resolved store addresses; empty until the first successful lookup.
    resolved: Mutex<Vec<SocketAddr>>,
}

/// Cloneable handle to a bounded set of store connections.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<Shared>,
}

impl ConnectionPool {
    /// Builds an empty pool. Fails only on an empty address; dialing is lazy.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        if config.addr.trim().is_empty() {
            return Err(ClientError::InvalidAddress);
        }
        Ok(ConnectionPool {
            shared: Arc::new(Shared {
                config,
                slots: Mutex::new(Slots::default()),
                resolved: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Hands out an idle connection, or dials a new one if a slot is free.
    ///
    /// The configured timeout starts counting here.
    pub fn lease(&self) -> ClientResult<Lease> {
        let deadline = self.shared.config.timeout.map(|budget| Instant::now() + budget);
        let reused = {
            let mut slots = self.shared.slots.lock();
            match slots.idle.pop() {
                Some(conn) => Some(conn),
                None if slots.open < self.shared.config.max_total => {
                    slots.open += 1;
                    None
                }
                None => return Err(ClientError::PoolExhausted),
            }
        };

        let conn = match reused {
            Some(conn) => conn,
            None => self.dial(deadline).inspect_err(|_| self.close_one())?,
        };
        Ok(Lease {
            pool: self.clone(),
            conn: Some(conn),
            broken: false,
            deadline,
        })
    }

    fn dial(&self, deadline: Option<Instant>) -> ClientResult<StoreConnection> {
        let addrs = self.resolve()?;
        let mut last_err = None;
        for addr in addrs {
            let attempt = match remaining(deadline) {
                Ok(Some(left)) => TcpStream::connect_timeout(&addr, left),
                Ok(None) => TcpStream::connect(addr),
                Err(err) => Err(err),
            };
            match attempt {
                Ok(stream) => return StoreConnection::wrap(stream),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.map_or(ClientError::InvalidAddress, ClientError::Io))
    }

    fn resolve(&self) -> ClientResult<Vec<SocketAddr>> {
        let cached = self.shared.resolved.lock().clone();
        if !cached.is_empty() {
            return Ok(cached);
        }
        let addrs: Vec<SocketAddr> = self
            .shared
            .config
            .addr
            .to_socket_addrs()
            .map_err(|_| ClientError::InvalidAddress)?
            .collect();
        if addrs.is_empty() {
            return Err(ClientError::InvalidAddress);
        }
        *self.shared.resolved.lock() = addrs.clone();
        Ok(addrs)
    }

    fn close_one(&self) {
        let mut slots = self.shared.slots.lock();
        slots.open = slots.open.saturating_sub(1);
    }

    fn give_back(&self, conn: StoreConnection) {
        let mut slots = self.shared.slots.lock();
        if slots.idle.len() < self.shared.config.max_idle {
            slots.idle.push(conn);
        } else {
            slots.open = slots.open.saturating_sub(1);
        }
    }
}

/// A connection checked out of the pool; returned on drop.
pub struct Lease {
    pool: ConnectionPool,
    conn: Option<StoreConnection>,
    broken: bool,
    deadline: Option<Instant>,
}

impl Lease {
    /// Sends one command and reads its reply.
    ///
    /// Any failure marks the connection broken, since a partial reply may
    /// still be buffered on it.
    pub fn command(&mut self, args: &[&[u8]]) -> ClientResult<RespValue> {
        let conn = self.conn.as_mut().ok_or(ClientError::Protocol)?;
        let reply = conn.round_trip(args, self.deadline);
        self.broken |= reply.is_err();
        reply
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.broken {
                self.pool.close_one();
            } else {
                self.pool.give_back(conn);
            }
        }
    }
}

/// Error returned once a lease's deadline has passed.
fn deadline_elapsed() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "store deadline elapsed")
}

/// Time left before `deadline`; `None` means unbounded.
fn remaining(deadline: Option<Instant>) -> io::Result<Option<Duration>> {
    match deadline {
        None => Ok(None),
        Some(deadline) => {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                Err(deadline_elapsed())
            } else {
                Ok(Some(left))
            }
        }
    }
}

/// Socket whose every read and write is capped by the time left on the
/// current deadline.
struct DeadlineStream {
    stream: TcpStream,
    deadline: Option<Instant>,
}

impl Read for DeadlineStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.set_read_timeout(remaining(self.deadline)?)?;
        self.stream.read(buf)
    }
}

impl Write for DeadlineStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.set_write_timeout(remaining(self.deadline)?)?;
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

struct StoreConnection {
    reader: BufReader<DeadlineStream>,
    line: Vec<u8>,
    out: Vec<u8>,
}

impl StoreConnection {
    fn wrap(stream: TcpStream) -> ClientResult<Self> {
        stream.set_nodelay(true)?;
        Ok(StoreConnection {
            reader: BufReader::new(DeadlineStream {
                stream,
                deadline: None,
            }),
            line: Vec::with_capacity(64),
            out: Vec::with_capacity(256),
        })
    }

    fn round_trip(&mut self, args: &[&[u8]], deadline: Option<Instant>) -> ClientResult<RespValue> {
        self.out.clear();
        encode_command(args, &mut self.out);
        let stream = self.reader.get_mut();
        stream.deadline = deadline;
        stream.write_all(&self.out)?;
        stream.flush()?;
        read_response(&mut self.reader, &mut self.line)
    }
}
