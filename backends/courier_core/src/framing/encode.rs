use bytes::{BufMut, Bytes, BytesMut};

use crate::streams::{ByteStream, StreamReader};
use crate::synca::CancelSignal;

use super::{Framing, FramingError, FramingResult};

/// One unit of a chunked body as it appears on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChunkedData {
    Data(Bytes),
    DataEnded,
}

impl ChunkedData {
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        match self {
            ChunkedData::Data(data) => {
                let size_line = format!("{:x}\r\n", data.len());
                let mut chunk = BytesMut::with_capacity(size_line.len() + data.len() + 2);
                chunk.put_slice(size_line.as_bytes());
                chunk.put_slice(&data);
                chunk.put_slice(b"\r\n");
                chunk.freeze()
            }
            ChunkedData::DataEnded => Bytes::from_static(b"0\r\n\r\n"),
        }
    }
}

enum FramedState {
    Fixed {
        reader: StreamReader,
        expected: u64,
        seen: u64,
    },
    Chunked(StreamReader),
    End,
}

/// [`FramedBody`] pulls a body out of its stream and yields it in wire form
/// for the framing negotiated for it. Fixed length bodies pass through as is
/// while being counted, chunked bodies are wrapped chunk by chunk and
/// terminated with the zero sized chunk.
///
/// The body's reader lock is held for as long as the iterator lives.
pub struct FramedBody(Option<FramedState>);

impl FramedBody {
    /// Locks `stream` and prepares it for transmission under `framing`.
    pub fn new(stream: &ByteStream, framing: Framing) -> FramingResult<Self> {
        let reader = stream.get_reader().map_err(FramingError::Stream)?;
        let state = match framing {
            Framing::FixedLength(expected) => FramedState::Fixed {
                reader,
                expected,
                seen: 0,
            },
            Framing::Chunked => FramedState::Chunked(reader),
        };
        Ok(Self(Some(state)))
    }

    /// Ends a wait on a stalled producer once `signal` fires, which cancels
    /// the body stream.
    #[must_use]
    pub fn with_signal(mut self, signal: &CancelSignal) -> Self {
        match &mut self.0 {
            Some(FramedState::Fixed { reader, .. } | FramedState::Chunked(reader)) => {
                reader.watch(signal);
            }
            Some(FramedState::End) | None => {}
        }
        self
    }

    /// Drains the whole framed body into memory.
    pub fn collect_bytes(self) -> FramingResult<Vec<u8>> {
        let mut wire = Vec::new();
        for part in self {
            wire.extend_from_slice(&part?);
        }
        Ok(wire)
    }
}

impl Iterator for FramedBody {
    type Item = FramingResult<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.0.take()? {
            FramedState::Fixed {
                mut reader,
                expected,
                seen,
            } => match reader.read() {
                Ok(Some(chunk)) => {
                    let seen = seen + chunk.len() as u64;
                    if seen > expected {
                        self.0 = Some(FramedState::End);
                        return Some(Err(FramingError::StreamProtocolViolation {
                            expected,
                            actual: seen,
                        }));
                    }
                    self.0 = Some(FramedState::Fixed {
                        reader,
                        expected,
                        seen,
                    });
                    Some(Ok(chunk))
                }
                Ok(None) => {
                    self.0 = Some(FramedState::End);
                    if seen == expected {
                        trace!("fixed length body completed with {} bytes", seen);
                        return None;
                    }
                    Some(Err(FramingError::StreamProtocolViolation {
                        expected,
                        actual: seen,
                    }))
                }
                Err(err) => {
                    self.0 = Some(FramedState::End);
                    Some(Err(FramingError::from_stream(err)))
                }
            },
            FramedState::Chunked(mut reader) => match reader.read() {
                Ok(Some(chunk)) => {
                    self.0 = Some(FramedState::Chunked(reader));
                    Some(Ok(ChunkedData::Data(chunk).into_bytes()))
                }
                Ok(None) => {
                    self.0 = Some(FramedState::End);
                    Some(Ok(ChunkedData::DataEnded.into_bytes()))
                }
                Err(err) => {
                    self.0 = Some(FramedState::End);
                    Some(Err(FramingError::from_stream(err)))
                }
            },
            FramedState::End => None,
        }
    }
}
