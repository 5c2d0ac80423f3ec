//! Stateful SCTP-to-gRPC load balancer for 5G NGAP signalling.
//!
//! gNBs establish long-lived SCTP associations carrying NGAP traffic;
//! this crate terminates those associations, multiplexes every gNB
//! onto a DNS-discovered pool of AMF workers over persistent
//! bidirectional gRPC streams, and returns AMF responses to the
//! originating gNB. NGAP payloads are opaque byte strings throughout;
//! nothing here parses the NGAP grammar.

#![warn(rust_2018_idioms)]
#![allow(dead_code)]

use std::time::Duration;

pub mod backend;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod proto;
pub mod sctp;
pub mod service;

pub use error::{Error, Result};

/// Payload protocol identifier tagging NGAP datagrams, both directions.
pub const NGAP_PPID: u32 = 60;

/// Per-association read buffer size in bytes, reused across reads.
pub(crate) const READ_BUF_SIZE: usize = 8192;

/// Upper bound on a single SCTP read so read loops observe shutdown
/// without blocking forever.
pub(crate) const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Pause between backend discovery passes; failed DNS lookups are
/// retried on the next pass.
pub(crate) const DISCOVERY_INTERVAL: Duration = Duration::from_secs(2);
