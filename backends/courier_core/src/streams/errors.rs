pub type StreamResult<T> = std::result::Result<T, StreamError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Another reader already holds the stream.
    Locked,

    /// Write attempted after the producer closed the stream.
    Closed,

    /// Errored by the producer or after an unrecoverable fault.
    Errored(String),

    /// Errored by the consumer giving up on the stream.
    Cancelled(String),

    /// A fixed length stream was handed more bytes than it declared.
    LengthExceeded { declared: u64, attempted: u64 },

    /// A fixed length stream was closed before all declared bytes were written.
    LengthShort { declared: u64, written: u64 },

    /// The declared length can only be set once and only before the first write.
    AlreadyResolved,

    /// A read or write waited longer than the configured timeout.
    Timeout,
}

impl std::error::Error for StreamError {}

impl core::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
