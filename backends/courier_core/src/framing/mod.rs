//! Decides how a body is delimited on the wire and moves it across in that
//! form.
//!
//! A message body is either announced up front with `Content-Length` or sent
//! as a sequence of chunks terminated by an empty one. The choice is made once,
//! from the length the body's [`ByteStream`] declares at the moment
//! transmission begins, and never revisited for that message.

mod decode;
mod encode;
mod errors;

pub use decode::*;
pub use encode::*;
pub use errors::*;

use crate::http::{HeaderName, Headers};
use crate::streams::ByteStream;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Framing {
    FixedLength(u64),
    Chunked,
}

/// Picks the framing for `stream` as it stands right now: a declared length
/// means `Content-Length`, anything else, including a length the producer may
/// still declare later, commits to chunked.
#[must_use]
pub fn negotiate(stream: &ByteStream) -> Framing {
    let framing = match stream.declared_length() {
        Some(length) => Framing::FixedLength(length),
        None => Framing::Chunked,
    };
    debug!("negotiated {:?} for {:?}", framing, stream.length());
    framing
}

impl Framing {
    /// Writes exactly one framing header into `headers`, removing the other.
    pub fn apply(&self, headers: &mut Headers) {
        match self {
            Self::FixedLength(length) => {
                headers.remove(HeaderName::TRANSFER_ENCODING);
                headers.set(HeaderName::CONTENT_LENGTH, length.to_string());
            }
            Self::Chunked => {
                headers.remove(HeaderName::CONTENT_LENGTH);
                headers.set(HeaderName::TRANSFER_ENCODING, "chunked");
            }
        }
    }

    /// Reads the framing a received message announced, `None` when it carries
    /// neither header.
    pub fn from_headers(headers: &Headers) -> FramingResult<Option<Self>> {
        let content_length = headers.get(HeaderName::CONTENT_LENGTH);
        let transfer_encoding = headers.get(HeaderName::TRANSFER_ENCODING);

        match (content_length, transfer_encoding) {
            (Some(_), Some(_)) => Err(FramingError::BothFramingHeaders),
            (Some(length), None) => {
                let trimmed = length.trim();
                match trimmed.parse::<u64>() {
                    Ok(value) => Ok(Some(Self::FixedLength(value))),
                    Err(_) => Err(FramingError::InvalidContentLength(length)),
                }
            }
            (None, Some(encoding)) => {
                // chunked must be the final coding applied
                let last = encoding
                    .rsplit(',')
                    .next()
                    .map(|part| part.trim().to_lowercase());
                if last.as_deref() == Some("chunked") {
                    Ok(Some(Self::Chunked))
                } else {
                    Err(FramingError::UnsupportedTransferEncoding(encoding))
                }
            }
            (None, None) => Ok(None),
        }
    }

    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        match self {
            Self::FixedLength(length) => Some(*length),
            Self::Chunked => None,
        }
    }
}
