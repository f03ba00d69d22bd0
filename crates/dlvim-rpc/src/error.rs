/// Error type of this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Socket error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Line framing error.
    #[error(transparent)]
    Codec(#[from] tokio_util::codec::LinesCodecError),

    /// JSON serialization/deserialization error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// The server executed the call and reported a failure.
    #[error("{0}")]
    Server(String),

    /// The connection to the server is closed (or was never established).
    #[error("connection to the debug server is closed")]
    ConnectionClosed,

    /// The server replied with an ID matching no pending call.
    #[error("unexpected reply ID: {0}")]
    UnexpectedReply(u64),
}

impl Error {
    /// Whether this error means the connection is unusable (as opposed to a
    /// failure of a single call).
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Codec(_) | Self::ConnectionClosed)
    }
}

/// Result type of this crate.
pub type Result<T> = core::result::Result<T, Error>;
