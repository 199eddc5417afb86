use std::io::{BufRead, Read};

use bytes::Bytes;

use super::{Framing, FramingError, FramingResult};

/// Largest slice of body handed out per iteration.
const READ_SIZE: usize = 8 * 1024;

/// Longest chunk size or trailer line accepted.
const MAX_LINE_LENGTH: u64 = 4 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Fixed { remaining: u64 },
    ChunkSize,
    ChunkData { remaining: u64 },
    ChunkDataEnd,
    Trailers,
    Complete,
}

/// [`BodyDecoder`] reads a framed body back out of `source`, yielding the
/// payload bytes without any framing. Chunk extensions are ignored and
/// trailers are skipped.
pub struct BodyDecoder<R: BufRead> {
    source: R,
    state: DecodeState,
    total: u64,
    limit: Option<u64>,
}

impl<R: BufRead> BodyDecoder<R> {
    pub fn new(source: R, framing: Framing) -> Self {
        let state = match framing {
            Framing::FixedLength(0) => DecodeState::Complete,
            Framing::FixedLength(length) => DecodeState::Fixed { remaining: length },
            Framing::Chunked => DecodeState::ChunkSize,
        };
        Self {
            source,
            state,
            total: 0,
            limit: None,
        }
    }

    /// Caps the decoded size, exceeding it fails with
    /// [`FramingError::BodyTooLarge`].
    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state == DecodeState::Complete
    }

    /// Payload bytes decoded so far.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total
    }

    /// Gives back the source, positioned after whatever has been consumed.
    pub fn into_inner(self) -> R {
        self.source
    }

    pub fn read_to_end(&mut self) -> FramingResult<Vec<u8>> {
        let mut body = Vec::new();
        for part in self.by_ref() {
            body.extend_from_slice(&part?);
        }
        Ok(body)
    }

    fn read_line(&mut self) -> FramingResult<Vec<u8>> {
        let mut line = Vec::new();
        let read = (&mut self.source)
            .take(MAX_LINE_LENGTH)
            .read_until(b'\n', &mut line)?;
        if read == 0 {
            return Err(FramingError::UnexpectedEof);
        }
        if line.last() != Some(&b'\n') {
            if read as u64 >= MAX_LINE_LENGTH {
                return Err(FramingError::InvalidChunkSize(String::from(
                    "line exceeds the maximum length",
                )));
            }
            return Err(FramingError::UnexpectedEof);
        }
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(line)
    }

    fn parse_chunk_size(line: &[u8]) -> FramingResult<u64> {
        let size_part = match line.iter().position(|&b| b == b';') {
            Some(semi) => &line[..semi],
            None => line,
        };
        let size_text = std::str::from_utf8(size_part)
            .map_err(|_| FramingError::InvalidChunkSize(String::from("non utf-8 chunk size")))?
            .trim();
        if size_text.is_empty() {
            return Err(FramingError::InvalidChunkSize(String::from(
                "empty chunk size",
            )));
        }
        u64::from_str_radix(size_text, 16)
            .map_err(|_| FramingError::InvalidChunkSize(size_text.to_string()))
    }

    fn read_payload(&mut self, remaining: u64) -> FramingResult<Bytes> {
        let wanted = usize::try_from(remaining).unwrap_or(READ_SIZE).min(READ_SIZE);
        let mut buffer = vec![0u8; wanted];
        let read = self.source.read(&mut buffer)?;
        if read == 0 {
            return Err(FramingError::UnexpectedEof);
        }
        buffer.truncate(read);

        self.total += read as u64;
        if let Some(limit) = self.limit {
            if self.total > limit {
                return Err(FramingError::BodyTooLarge(limit));
            }
        }
        Ok(Bytes::from(buffer))
    }

    fn step(&mut self) -> FramingResult<Option<Bytes>> {
        loop {
            match self.state {
                DecodeState::Complete => return Ok(None),
                DecodeState::Fixed { remaining } => {
                    let data = self.read_payload(remaining)?;
                    let left = remaining - data.len() as u64;
                    self.state = if left == 0 {
                        DecodeState::Complete
                    } else {
                        DecodeState::Fixed { remaining: left }
                    };
                    return Ok(Some(data));
                }
                DecodeState::ChunkSize => {
                    let line = self.read_line()?;
                    let size = Self::parse_chunk_size(&line)?;
                    self.state = if size == 0 {
                        DecodeState::Trailers
                    } else {
                        DecodeState::ChunkData { remaining: size }
                    };
                }
                DecodeState::ChunkData { remaining } => {
                    let data = self.read_payload(remaining)?;
                    let left = remaining - data.len() as u64;
                    self.state = if left == 0 {
                        DecodeState::ChunkDataEnd
                    } else {
                        DecodeState::ChunkData { remaining: left }
                    };
                    return Ok(Some(data));
                }
                DecodeState::ChunkDataEnd => {
                    let mut ending = [0u8; 2];
                    self.source.read_exact(&mut ending).map_err(|err| {
                        if err.kind() == std::io::ErrorKind::UnexpectedEof {
                            FramingError::UnexpectedEof
                        } else {
                            FramingError::Io(err)
                        }
                    })?;
                    if &ending != b"\r\n" {
                        return Err(FramingError::InvalidChunkEnding);
                    }
                    self.state = DecodeState::ChunkSize;
                }
                DecodeState::Trailers => {
                    let line = self.read_line()?;
                    if line.is_empty() {
                        trace!("chunked body completed with {} bytes", self.total);
                        self.state = DecodeState::Complete;
                    }
                }
            }
        }
    }
}

impl<R: BufRead> Iterator for BodyDecoder<R> {
    type Item = FramingResult<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.step() {
            Ok(Some(data)) => Some(Ok(data)),
            Ok(None) => None,
            Err(err) => {
                self.state = DecodeState::Complete;
                Some(Err(err))
            }
        }
    }
}
