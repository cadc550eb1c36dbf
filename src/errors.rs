use thiserror::Error;

/// Crate-wide error type.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Transport-layer failure (REST call, stream management). Create/cancel
    /// callers treat this as "not placed" and never retry in place; the next
    /// reprice cycle is the sole retry mechanism.
    #[error("transport error: {0}")]
    Transport(String),

    /// A best-bid/ask query hit a book side with no resting levels. The
    /// current reprice cycle must be skipped, not the process.
    #[error("order book for {symbol} has no resting {side} levels")]
    EmptyBook {
        symbol: String,
        side: &'static str,
    },

    /// Depth query for a symbol that was never initialized with a snapshot.
    #[error("no depth snapshot for {0}")]
    NoSnapshot(String),

    /// A client order id that does not follow the
    /// `{strategy}_{role}_{suffix}` wire contract.
    #[error("invalid client order id: {0:?}")]
    InvalidClientId(String),

    /// Rejected configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Create a transport error from any displayable cause.
    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
