//! Error type shared by every stage of a scan exchange.
//!
//! All variants are terminal for the exchange in progress: nothing inside the
//! crate retries. The caller decides whether to reconnect and scan again.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type of the ICAP scan client.
#[derive(Error, Debug)]
pub enum IcapError {
    /// The transport to the ICAP server could not be established.
    #[error("Connection error: cannot connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The file to scan could not be opened or inspected.
    #[error("Cannot read {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any I/O failure while the request is written or the response is read.
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    /// A connection-layer deadline expired.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The terminator was not found within the receive buffer cap.
    #[error("Framing error: terminator {terminator:?} not found within {limit} bytes")]
    Framing {
        terminator: &'static str,
        limit: usize,
    },

    /// The peer closed the connection before the terminator arrived.
    #[error("Framing error: connection closed after {received} bytes, before terminator {terminator:?}")]
    UnexpectedEof {
        terminator: &'static str,
        received: usize,
    },

    /// Missing or unrecognized ICAP status code.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The encapsulated block page of a 200 response could not be interpreted.
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Invalid scanner configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// TLS configuration or handshake failure.
    #[cfg(feature = "tls-rustls")]
    #[error("TLS error: {0}")]
    Tls(String),
}

impl IcapError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Whether the error comes from response framing (cap hit or early EOF).
    pub fn is_framing(&self) -> bool {
        matches!(self, Self::Framing { .. } | Self::UnexpectedEof { .. })
    }
}

/// Result alias used across the crate.
pub type IcapResult<T> = Result<T, IcapError>;
