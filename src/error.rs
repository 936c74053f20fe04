//! Error types for the proxy.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while decoding or encoding DNS wire messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The packet is not a well-formed DNS message.
    #[error("malformed packet: {0}")]
    Malformed(&'static str),

    #[error("label exceeds 63 bytes")]
    LabelTooLong,

    #[error("name exceeds 255 bytes")]
    NameTooLong,

    #[error("name contains an empty label")]
    EmptyLabel,

    #[error("record data exceeds 65535 bytes")]
    RecordDataTooLong,

    #[error("too many records for one section")]
    TooManyRecords,
}

/// Errors raised by an upstream transport.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to encode query: {0}")]
    Encode(#[from] CodecError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream {endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("upstream {endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    #[error("could not resolve upstream address {0}")]
    Lookup(String),
}

/// Errors raised while fetching a blacklist source.
#[derive(Debug, Error)]
pub enum SourceFetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Startup configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no upstream servers configured")]
    NoUpstreamsConfigured,

    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("invalid access list file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failure of a single query's pipeline. Never escapes the query task.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("failed to decode query: {0}")]
    Decode(CodecError),

    #[error("failed to encode answer: {0}")]
    Encode(CodecError),

    #[error("upstream resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    #[error("failed to decode upstream response: {0}")]
    UpstreamResponse(CodecError),
}

/// Errors that stop the proxy from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        source: io::Error,
    },
}
