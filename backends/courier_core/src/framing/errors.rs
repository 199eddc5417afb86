use derive_more::From;

use crate::streams::StreamError;

pub type FramingResult<T> = std::result::Result<T, FramingError>;

#[derive(Debug, From)]
pub enum FramingError {
    /// A fixed length body produced a different number of bytes than its
    /// `Content-Length` announced.
    #[from(ignore)]
    StreamProtocolViolation { expected: u64, actual: u64 },

    Stream(StreamError),

    #[from(ignore)]
    InvalidChunkSize(String),

    /// Chunk data was not followed by CRLF.
    #[from(ignore)]
    InvalidChunkEnding,

    /// Message carried both `Content-Length` and `Transfer-Encoding`.
    #[from(ignore)]
    BothFramingHeaders,

    #[from(ignore)]
    InvalidContentLength(String),

    #[from(ignore)]
    UnsupportedTransferEncoding(String),

    #[from(ignore)]
    BodyTooLarge(u64),

    /// The source ended before the framing said the body would.
    #[from(ignore)]
    UnexpectedEof,

    Io(std::io::Error),
}

impl FramingError {
    /// Maps a stream length fault onto the wire level violation it causes.
    pub(crate) fn from_stream(err: StreamError) -> Self {
        match err {
            StreamError::LengthExceeded {
                declared,
                attempted,
            } => Self::StreamProtocolViolation {
                expected: declared,
                actual: attempted,
            },
            StreamError::LengthShort { declared, written } => Self::StreamProtocolViolation {
                expected: declared,
                actual: written,
            },
            other => Self::Stream(other),
        }
    }
}

impl std::error::Error for FramingError {}

impl core::fmt::Display for FramingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
