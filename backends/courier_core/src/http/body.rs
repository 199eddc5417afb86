use bytes::Bytes;

use crate::streams::{ByteStream, StreamResult};

/// The payload of a request or response.
///
/// Buffered content is kept as [`Body::Bytes`] so the message can be cloned
/// and its length is always known, anything produced incrementally is a
/// [`Body::Stream`].
#[derive(Debug)]
pub enum Body {
    Bytes(Bytes),
    Stream(ByteStream),
}

impl Body {
    #[must_use]
    pub fn empty() -> Self {
        Self::Bytes(Bytes::new())
    }

    /// The length the body announces right now, if any.
    #[must_use]
    pub fn declared_length(&self) -> Option<u64> {
        match self {
            Self::Bytes(content) => Some(content.len() as u64),
            Self::Stream(stream) => stream.declared_length(),
        }
    }

    #[must_use]
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    #[must_use]
    pub fn into_stream(self) -> ByteStream {
        match self {
            Self::Bytes(content) => ByteStream::from_bytes(content),
            Self::Stream(stream) => stream,
        }
    }

    /// Buffered bodies can be duplicated, a stream can only be consumed once.
    #[must_use]
    pub fn try_clone(&self) -> Option<Self> {
        match self {
            Self::Bytes(content) => Some(Self::Bytes(content.clone())),
            Self::Stream(_) => None,
        }
    }

    /// Drains the body, blocking on a stream until its producer closes it.
    pub fn read_all(self) -> StreamResult<Vec<u8>> {
        match self {
            Self::Bytes(content) => Ok(content.to_vec()),
            Self::Stream(stream) => stream.read_all(),
        }
    }
}

impl From<ByteStream> for Body {
    fn from(stream: ByteStream) -> Self {
        Self::Stream(stream)
    }
}

impl From<Bytes> for Body {
    fn from(content: Bytes) -> Self {
        Self::Bytes(content)
    }
}

impl From<Vec<u8>> for Body {
    fn from(content: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(content))
    }
}

impl From<String> for Body {
    fn from(content: String) -> Self {
        Self::Bytes(Bytes::from(content))
    }
}

impl From<&str> for Body {
    fn from(content: &str) -> Self {
        Self::Bytes(Bytes::copy_from_slice(content.as_bytes()))
    }
}
