//! Error types shared by every role.
//!
//! Each layer owns a narrow error enum ([`FrameError`], [`PayloadError`],
//! [`TransportError`], [`ConfigError`]); the crate-level [`Error`] wraps them
//! and adds the request-level outcomes a client can observe.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::category::Category;
use crate::frame::FrameType;

/// Wire-frame decoding and validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Declared `dataLength` does not fit in the data field.
    #[error("malformed frame: declared data length {declared} exceeds {max}")]
    MalformedFrame { declared: u16, max: usize },

    /// Recomputed checksum disagrees with the transmitted one.
    #[error("checksum mismatch: frame carries {expected:#06x}, computed {actual:#06x}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    /// Payload handed to a frame constructor is longer than the data field.
    #[error("payload of {len} bytes does not fit in a frame (max {max})")]
    PayloadTooLong { len: usize, max: usize },
}

/// Errors raised while parsing or building a `&`-joined payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("payload is not valid UTF-8")]
    NotUtf8,

    #[error("{message} payload expects {expected} fields, got {actual}")]
    FieldCount {
        message: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{message} payload has an empty `{field}` field")]
    EmptyField {
        message: &'static str,
        field: &'static str,
    },

    #[error("field `{field}` contains the separator '&'")]
    SeparatorInField { field: &'static str },

    #[error("invalid {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("unknown category {0:?}")]
    UnknownCategory(String),

    #[error("encoded payload is {len} bytes, frame data holds at most {max}")]
    TooLong { len: usize, max: usize },
}

/// Stream-level failures. Each one is fatal for its connection only.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer shut down its side cleanly (a read returned zero bytes).
    #[error("peer closed the connection")]
    PeerClosed,

    #[error("read error: {0}")]
    Read(#[source] io::Error),

    #[error("write error: {0}")]
    Write(#[source] io::Error),

    /// A write made no progress.
    #[error("write returned zero bytes")]
    WriteZero,

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Role configuration problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("config is missing the `{0}` line")]
    MissingLine(&'static str),

    #[error("invalid port for `{field}`: {value:?}")]
    InvalidPort { field: &'static str, value: String },

    #[error("invalid worker category {0:?} (expected Text or Media)")]
    InvalidCategory(String),
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The peer answered with a frame type that makes no sense here.
    #[error("protocol violation: expected {expected}, got {actual}")]
    ProtocolViolation {
        expected: FrameType,
        actual: FrameType,
    },

    /// The peer explicitly refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("no {0} worker available")]
    NoWorkerAvailable(Category),

    #[error("unknown media category")]
    UnknownCategory,

    #[error("not connected to the coordinator")]
    NotConnected,

    #[error("already connected to the coordinator")]
    AlreadyConnected,

    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("usage: {0}")]
    Usage(String),
}

pub type Result<T> = std::result::Result<T, Error>;
