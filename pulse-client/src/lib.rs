//! # Pulse Store Client
//!
//! Blocking RESP2 client used by the server's persistence sink to append raw
//! samples to a list in a Redis-compatible store.
//!
//! Only `PING` and `LPUSH` are spoken. Connections are pooled and every
//! socket operation can be bounded by a timeout, so a slow store costs the
//! caller at most that bound per call.

mod client;
mod pool;
mod resp;

pub use client::{ClientConfig, ClientError, ClientResult, StoreClient};
