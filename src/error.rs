use thiserror::Error;

/// Library result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the packet and WebSocket layers.
///
/// Handshake validation failures are deliberately *not* represented here:
/// they are recorded as a state flag on the handshake so that the line
/// parser can keep advancing past bad input. Callers observe them through
/// `is_open`/`is_valid`.
#[derive(Error, Debug)]
pub enum Error {
    /// A length or size calculation would overflow, or a configured hard
    /// maximum was exceeded. Detected before any out-of-bounds access.
    #[error("size limit: {0}")]
    SizeLimit(String),

    /// Malformed input to a codec (bad base64 alphabet, non-block-aligned
    /// input, malformed frame header).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Propagated unchanged from the underlying channel.
    #[error("channel: {0}")]
    Channel(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}
