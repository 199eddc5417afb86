use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use courier_config::{TransportConfig, DEFAULT_HIGH_WATER_MARK, DEFAULT_WAIT_TIMEOUT};

use crate::synca::mpp::{self, Receiver, ReceiverError, Sender, SenderError};
use crate::synca::{recover_lock, CancelSignal};

use super::errors::{StreamError, StreamResult};

/// What a stream tells its consumers about its total size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamLength {
    /// Length may still be declared by the producer before its first write.
    Unresolved,

    /// The stream will produce exactly this many bytes.
    Fixed(u64),

    /// No length will ever be known.
    Unbounded,
}

impl StreamLength {
    #[must_use]
    pub fn known(&self) -> Option<u64> {
        match self {
            Self::Fixed(n) => Some(*n),
            Self::Unresolved | Self::Unbounded => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamState {
    Readable,
    Closed,
    Errored,
}

/// Buffering and waiting behaviour shared by every stream created from it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamOptions {
    /// Chunks buffered before [`StreamWriter::write`] starts blocking.
    pub high_water_mark: usize,
    pub wait_timeout: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

impl From<&TransportConfig> for StreamOptions {
    fn from(config: &TransportConfig) -> Self {
        Self {
            high_water_mark: config.stream_high_water_mark.max(1),
            wait_timeout: config.wait_timeout,
        }
    }
}

impl StreamOptions {
    /// A stream whose producer promises exactly `length` bytes.
    #[must_use]
    pub fn fixed_length(self, length: u64) -> (StreamWriter, ByteStream) {
        self.build(StreamLength::Fixed(length))
    }

    /// A stream passing bytes through without ever knowing its length.
    #[must_use]
    pub fn identity(self) -> (StreamWriter, ByteStream) {
        self.build(StreamLength::Unbounded)
    }

    /// A stream whose producer may declare the length via
    /// [`StreamWriter::declare_length`] before writing.
    #[must_use]
    pub fn deferred(self) -> (StreamWriter, ByteStream) {
        self.build(StreamLength::Unresolved)
    }

    fn build(self, length: StreamLength) -> (StreamWriter, ByteStream) {
        let (sender, receiver) = mpp::bounded(self.high_water_mark.max(1));
        let shared = Arc::new(StreamShared::new(length, self.wait_timeout));
        let writer = StreamWriter {
            shared: shared.clone(),
            sender,
            closed: false,
        };
        (writer, ByteStream { shared, receiver })
    }
}

#[must_use]
pub fn fixed_length_stream(length: u64) -> (StreamWriter, ByteStream) {
    StreamOptions::default().fixed_length(length)
}

#[must_use]
pub fn identity_stream() -> (StreamWriter, ByteStream) {
    StreamOptions::default().identity()
}

#[must_use]
pub fn deferred_length_stream() -> (StreamWriter, ByteStream) {
    StreamOptions::default().deferred()
}

struct StreamShared {
    length: Mutex<StreamLength>,
    fault: Mutex<Option<StreamError>>,
    written: AtomicU64,
    locked: AtomicBool,
    disturbed: AtomicBool,
    cancel: CancelSignal,
    wait_timeout: Duration,
}

impl StreamShared {
    fn new(length: StreamLength, wait_timeout: Duration) -> Self {
        Self {
            length: Mutex::new(length),
            fault: Mutex::new(None),
            written: AtomicU64::new(0),
            locked: AtomicBool::new(false),
            disturbed: AtomicBool::new(false),
            cancel: CancelSignal::new(),
            wait_timeout,
        }
    }

    fn fault(&self) -> Option<StreamError> {
        recover_lock(&self.fault).clone()
    }

    /// Records the first fault only, later ones are consequences of it.
    fn fail(&self, err: StreamError) {
        let mut fault = recover_lock(&self.fault);
        if fault.is_none() {
            debug!("byte stream errored: {:?}", &err);
            *fault = Some(err);
        }
        drop(fault);
        self.cancel.cancel();
    }

    fn length(&self) -> StreamLength {
        *recover_lock(&self.length)
    }
}

/// `ByteStream` is the readable half of a body: bytes pushed by a
/// [`StreamWriter`] come out of a [`StreamReader`] in order.
pub struct ByteStream {
    shared: Arc<StreamShared>,
    receiver: Receiver<Bytes>,
}

impl core::fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteStream")
            .field("length", &self.length())
            .field("state", &self.state())
            .field("locked", &self.is_locked())
            .finish()
    }
}

impl ByteStream {
    /// A closed stream carrying `content`, its length is known up front.
    pub fn from_bytes<B: Into<Bytes>>(content: B) -> Self {
        let content = content.into();
        let length = StreamLength::Fixed(content.len() as u64);
        Self::closed_with(content, length)
    }

    /// A closed stream carrying `content` that does not announce its length,
    /// it is framed as chunked when sent on.
    pub fn from_unsized<B: Into<Bytes>>(content: B) -> Self {
        Self::closed_with(content.into(), StreamLength::Unbounded)
    }

    fn closed_with(content: Bytes, length: StreamLength) -> Self {
        let (sender, receiver) = mpp::bounded(1);
        let shared = Arc::new(StreamShared::new(length, DEFAULT_WAIT_TIMEOUT));
        shared
            .written
            .store(content.len() as u64, Ordering::SeqCst);

        if !content.is_empty() {
            // a fresh single slot queue always has room
            let _ = sender.send(content);
        }
        sender.close();

        Self { shared, receiver }
    }

    pub fn from_text<S: Into<String>>(content: S) -> Self {
        Self::from_bytes(content.into().into_bytes())
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::from_bytes(Bytes::new())
    }

    /// The length the producer declared, `None` when unknown right now.
    #[must_use]
    pub fn declared_length(&self) -> Option<u64> {
        self.length().known()
    }

    #[must_use]
    pub fn length(&self) -> StreamLength {
        self.shared.length()
    }

    #[must_use]
    pub fn state(&self) -> StreamState {
        if self.shared.fault().is_some() {
            return StreamState::Errored;
        }
        if self.receiver.is_closed() && self.receiver.is_empty() {
            return StreamState::Closed;
        }
        StreamState::Readable
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.shared.locked.load(Ordering::SeqCst)
    }

    /// True once any consumer has read from the stream.
    #[must_use]
    pub fn is_disturbed(&self) -> bool {
        self.shared.disturbed.load(Ordering::SeqCst)
    }

    /// Signal fired when the stream errors or is cancelled.
    #[must_use]
    pub fn cancel_signal(&self) -> CancelSignal {
        self.shared.cancel.clone()
    }

    /// `get_reader` takes exclusive read access, the lock is released when the
    /// returned reader drops.
    pub fn get_reader(&self) -> StreamResult<StreamReader> {
        if self
            .shared
            .locked
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(StreamError::Locked);
        }

        Ok(StreamReader {
            wait: self.shared.cancel.clone(),
            shared: self.shared.clone(),
            receiver: self.receiver.clone(),
            finished: false,
        })
    }

    /// Cancels an unlocked stream, a locked one must be cancelled through its
    /// reader.
    pub fn cancel<S: Into<String>>(&self, reason: S) -> StreamResult<()> {
        if self.is_locked() {
            return Err(StreamError::Locked);
        }
        self.shared.fail(StreamError::Cancelled(reason.into()));
        self.receiver.close();
        Ok(())
    }

    /// Reads the whole stream into memory.
    pub fn read_all(&self) -> StreamResult<Vec<u8>> {
        let reader = self.get_reader()?;
        let mut content = Vec::new();
        for chunk in reader {
            content.extend_from_slice(&chunk?);
        }
        Ok(content)
    }
}

/// Exclusive consumer of a [`ByteStream`].
pub struct StreamReader {
    shared: Arc<StreamShared>,
    receiver: Receiver<Bytes>,
    /// Ends blocked reads, the stream's own signal joined with any watched.
    wait: CancelSignal,
    finished: bool,
}

impl StreamReader {
    /// Also ends blocked reads once `signal` fires. A read ended this way
    /// cancels the stream, so the producer's next write fails too.
    pub fn watch(&mut self, signal: &CancelSignal) {
        self.wait = self.wait.joined(signal);
    }

    /// Returns the next chunk, `Ok(None)` once the producer closed and every
    /// chunk was read.
    pub fn read(&mut self) -> StreamResult<Option<Bytes>> {
        if self.finished {
            return Ok(None);
        }
        if let Some(fault) = self.shared.fault() {
            return Err(fault);
        }

        self.shared.disturbed.store(true, Ordering::SeqCst);
        match self
            .receiver
            .recv_until(self.shared.wait_timeout, &self.wait)
        {
            Ok(chunk) => {
                trace!("byte stream yielded {} bytes", chunk.len());
                Ok(Some(chunk))
            }
            Err(ReceiverError::Closed) => {
                if let Some(fault) = self.shared.fault() {
                    return Err(fault);
                }
                self.finished = true;
                Ok(None)
            }
            Err(ReceiverError::Cancelled) => {
                if let Some(fault) = self.shared.fault() {
                    return Err(fault);
                }
                let err = StreamError::Cancelled(String::from("reader signal cancelled"));
                self.shared.fail(err.clone());
                self.receiver.close();
                Err(err)
            }
            Err(ReceiverError::Timeout | ReceiverError::Empty) => Err(StreamError::Timeout),
        }
    }

    #[must_use]
    pub fn length(&self) -> StreamLength {
        self.shared.length()
    }

    /// Gives up on the stream, the producer's next write fails.
    pub fn cancel<S: Into<String>>(self, reason: S) {
        self.shared.fail(StreamError::Cancelled(reason.into()));
        self.receiver.close();
    }
}

impl Iterator for StreamReader {
    type Item = StreamResult<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => None,
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        self.shared.locked.store(false, Ordering::SeqCst);
    }
}

/// Producer half of a [`ByteStream`].
pub struct StreamWriter {
    shared: Arc<StreamShared>,
    sender: Sender<Bytes>,
    closed: bool,
}

impl StreamWriter {
    /// Queues `chunk`, blocking while the stream holds a full buffer.
    ///
    /// # Errors
    /// Fails when the stream was closed, errored or cancelled, when the wait
    /// for buffer room times out, or when a fixed length stream would grow
    /// past its declared length.
    pub fn write<B: Into<Bytes>>(&mut self, chunk: B) -> StreamResult<()> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        if let Some(fault) = self.shared.fault() {
            return Err(fault);
        }

        let chunk = chunk.into();
        if chunk.is_empty() {
            return Ok(());
        }
        let size = chunk.len() as u64;

        {
            let mut length = recover_lock(&self.shared.length);
            match *length {
                StreamLength::Unresolved => *length = StreamLength::Unbounded,
                StreamLength::Fixed(declared) => {
                    let attempted = self.shared.written.load(Ordering::SeqCst) + size;
                    if attempted > declared {
                        drop(length);
                        let err = StreamError::LengthExceeded {
                            declared,
                            attempted,
                        };
                        self.fail(err.clone());
                        return Err(err);
                    }
                }
                StreamLength::Unbounded => {}
            }
        }

        match self
            .sender
            .send_until(chunk, self.shared.wait_timeout, &self.shared.cancel)
        {
            Ok(()) => {
                self.shared.written.fetch_add(size, Ordering::SeqCst);
                Ok(())
            }
            Err(SenderError::Timeout(_)) => Err(StreamError::Timeout),
            Err(SenderError::Closed(_) | SenderError::Cancelled(_) | SenderError::Full(_)) => {
                Err(self.shared.fault().unwrap_or(StreamError::Closed))
            }
        }
    }

    /// Declares the total length of a deferred stream, allowed once and only
    /// before the first byte is written.
    pub fn declare_length(&mut self, total: u64) -> StreamResult<()> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        let mut length = recover_lock(&self.shared.length);
        if *length != StreamLength::Unresolved {
            return Err(StreamError::AlreadyResolved);
        }
        *length = StreamLength::Fixed(total);
        debug!("byte stream declared length of {}", total);
        Ok(())
    }

    #[must_use]
    pub fn written(&self) -> u64 {
        self.shared.written.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Ends the data, a fixed length stream closed short errors instead.
    pub fn close(&mut self) -> StreamResult<()> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        if let Some(fault) = self.shared.fault() {
            return Err(fault);
        }

        self.closed = true;
        if let StreamLength::Fixed(declared) = self.shared.length() {
            let written = self.written();
            if written < declared {
                let err = StreamError::LengthShort { declared, written };
                self.fail(err.clone());
                return Err(err);
            }
        }

        self.sender.close();
        debug!("byte stream closed after {} bytes", self.written());
        Ok(())
    }

    /// Errors the stream, pending and future reads fail with `reason`.
    pub fn abort<S: Into<String>>(&mut self, reason: S) {
        self.closed = true;
        self.fail(StreamError::Errored(reason.into()));
    }

    fn fail(&self, err: StreamError) {
        self.shared.fail(err);
        self.sender.close();
    }
}

impl Drop for StreamWriter {
    fn drop(&mut self) {
        if !self.closed {
            self.fail(StreamError::Errored(String::from(
                "writer dropped before closing the stream",
            )));
        }
    }
}
