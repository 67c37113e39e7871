//! Error types for portmesh

use crate::protocol::Address;
use thiserror::Error;

/// Main error type for portmesh operations
///
/// Callers of [`Router::request`](crate::Router::request) observe exactly
/// four application-facing outcomes: success, a remote handler error
/// ([`Error::Remote`]), [`Error::Timeout`], or [`Error::Cancelled`].
/// Everything else is either a local usage error surfaced before the request
/// leaves the node, or an internal anomaly that is logged and degrades
/// gracefully.
#[derive(Error, Debug)]
pub enum Error {
    /// No path to the destination exists in the routing table
    #[error("could not forward message: no connection to {0}")]
    NoRoute(Address),

    /// No response arrived within the request deadline
    #[error("timed out request: {0}")]
    Timeout(String),

    /// No route to the destination appeared within the wait deadline
    #[error("timed out waiting for a connection to {0}")]
    ConnectTimeout(Address),

    /// The externally supplied cancellation signal fired first
    #[error("waiting was cancelled")]
    Cancelled,

    /// The remote end reported an error in its response packet
    #[error("{0}")]
    Remote(String),

    /// A local request handler failed
    #[error("{0}")]
    Handler(String),

    /// The payload did not serialize to a JSON object
    ///
    /// Packet payloads are merged with the header fields at the top level of
    /// the wire object, so only objects (or unit payloads) are representable.
    #[error("payload must serialize to a JSON object")]
    NonObjectPayload,

    /// Payload serialization or deserialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The underlying channel is closed
    #[error("channel closed")]
    ChannelClosed,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
