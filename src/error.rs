use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// ErrMissingConfiguration indicates the YAML file parsed but had
    /// no `configuration` block; the process cannot start without one.
    #[error("configuration parsing failed: missing configuration block")]
    ErrMissingConfiguration,

    /// ErrNoListenAddress indicates none of the configured NGAP listen
    /// addresses resolved to a usable IPv4 address.
    #[error("no usable NGAP listen address")]
    ErrNoListenAddress,

    /// ErrNotificationTooShort indicates an SCTP notification smaller
    /// than its 8 byte header.
    #[error("notification shorter than the 8 byte header: {len} bytes")]
    ErrNotificationTooShort { len: usize },

    /// ErrNotificationTruncated indicates the notification header
    /// declared more bytes than the read returned.
    #[error("notification truncated: header declares {declared} bytes, read {len}")]
    ErrNotificationTruncated { declared: usize, len: usize },

    /// ErrAssocChangeTooShort indicates an SCTP_ASSOC_CHANGE event
    /// smaller than its fixed 20 byte layout.
    #[error("association change event shorter than 20 bytes: {len} bytes")]
    ErrAssocChangeTooShort { len: usize },

    /// ErrStreamNotOpen indicates a send on a backend whose message
    /// stream has not been established yet.
    #[error("backend stream is not open")]
    ErrStreamNotOpen,

    /// ErrStreamClosed indicates a send on a backend whose message
    /// stream has already gone away.
    #[error("backend stream closed")]
    ErrStreamClosed,

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("grpc error: {0}")]
    Status(#[from] tonic::Status),
}
