use std::{
    sync::Arc,
    time::{self, Instant},
};

use concurrent_queue::{ConcurrentQueue, PopError, PushError};

use super::CancelSignal;

/// [`POLL_INTERVAL`] is the longest a blocked sender or receiver parks before
/// re-checking the queue, its deadline and its cancel signal.
const POLL_INTERVAL: time::Duration = time::Duration::from_micros(250);

/// `pause` parks the current thread for at most [`POLL_INTERVAL`], returns
/// false once `dur` has elapsed since `started`.
fn pause(started: Instant, dur: time::Duration) -> bool {
    let elapsed = started.elapsed();
    if elapsed >= dur {
        return false;
    }
    let remaining = dur - elapsed;
    std::thread::park_timeout(remaining.min(POLL_INTERVAL));
    true
}

pub struct Receiver<T> {
    chan: Arc<ConcurrentQueue<T>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverError {
    Timeout,
    Empty,
    Closed,
    Cancelled,
}

impl ReceiverError {
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, ReceiverError::Timeout)
    }
}

impl core::error::Error for ReceiverError {}

impl core::fmt::Display for ReceiverError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "ReceiverError::{self:?}")
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Self {
            chan: self.chan.clone(),
        }
    }
}

impl<T> Receiver<T> {
    pub fn new(chan: Arc<ConcurrentQueue<T>>) -> Self {
        Receiver { chan }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chan.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chan.is_empty()
    }

    /// Closed only reports that no new values can arrive, values already
    /// queued can still be received.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.chan.is_closed()
    }

    pub fn close(&self) -> bool {
        self.chan.close()
    }

    pub fn recv(&self) -> Result<T, ReceiverError> {
        match self.chan.pop() {
            Ok(value) => Ok(value),
            Err(PopError::Empty) => Err(ReceiverError::Empty),
            Err(PopError::Closed) => Err(ReceiverError::Closed),
        }
    }

    /// `recv_timeout` blocks until a value is received, the channel is closed
    /// and drained, or `dur` has elapsed.
    pub fn recv_timeout(&self, dur: time::Duration) -> Result<T, ReceiverError> {
        let started = Instant::now();
        loop {
            match self.recv() {
                Err(ReceiverError::Empty) => {
                    if !pause(started, dur) {
                        return Err(ReceiverError::Timeout);
                    }
                }
                other => return other,
            }
        }
    }

    /// `recv_until` works like [`Receiver::recv_timeout`] but also gives up as
    /// soon as the provided signal is cancelled. Values already queued are
    /// still returned before the cancellation is reported.
    pub fn recv_until(
        &self,
        dur: time::Duration,
        cancel: &CancelSignal,
    ) -> Result<T, ReceiverError> {
        let started = Instant::now();
        loop {
            match self.recv() {
                Err(ReceiverError::Empty) => {
                    if cancel.is_cancelled() {
                        return Err(ReceiverError::Cancelled);
                    }
                    if !pause(started, dur) {
                        return Err(ReceiverError::Timeout);
                    }
                }
                other => return other,
            }
        }
    }
}

pub struct Sender<T> {
    chan: Arc<ConcurrentQueue<T>>,
}

/// `SenderError` hands the rejected value back to the caller.
#[derive(PartialEq, Eq)]
pub enum SenderError<T> {
    Closed(T),
    Full(T),
    Timeout(T),
    Cancelled(T),
}

impl<T> SenderError<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Closed(value)
            | Self::Full(value)
            | Self::Timeout(value)
            | Self::Cancelled(value) => value,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Closed(_) => "Closed",
            Self::Full(_) => "Full",
            Self::Timeout(_) => "Timeout",
            Self::Cancelled(_) => "Cancelled",
        }
    }
}

impl<T> From<PushError<T>> for SenderError<T> {
    fn from(value: PushError<T>) -> Self {
        match value {
            PushError::Full(inner) => Self::Full(inner),
            PushError::Closed(inner) => Self::Closed(inner),
        }
    }
}

impl<T> core::fmt::Debug for SenderError<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "SenderError::{}", self.name())
    }
}

impl<T> core::fmt::Display for SenderError<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "SenderError::{}", self.name())
    }
}

impl<T> core::error::Error for SenderError<T> {}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Sender {
            chan: self.chan.clone(),
        }
    }
}

impl<T> Sender<T> {
    pub fn new(chan: Arc<ConcurrentQueue<T>>) -> Self {
        Sender { chan }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.chan.is_closed()
    }

    pub fn close(&self) -> bool {
        self.chan.close()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chan.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chan.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        self.chan.capacity()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.chan.is_full()
    }

    /// `send` pushes without waiting, a full bounded channel rejects the value.
    pub fn send(&self, value: T) -> Result<(), SenderError<T>> {
        self.chan.push(value).map_err(SenderError::from)
    }

    /// `send_until` waits for room in a full bounded channel until `dur`
    /// elapses or `cancel` fires, this is where writers feel backpressure.
    pub fn send_until(
        &self,
        value: T,
        dur: time::Duration,
        cancel: &CancelSignal,
    ) -> Result<(), SenderError<T>> {
        let started = Instant::now();
        let mut pending = value;
        loop {
            match self.chan.push(pending) {
                Ok(()) => return Ok(()),
                Err(PushError::Closed(inner)) => return Err(SenderError::Closed(inner)),
                Err(PushError::Full(inner)) => {
                    if cancel.is_cancelled() {
                        return Err(SenderError::Cancelled(inner));
                    }
                    if !pause(started, dur) {
                        return Err(SenderError::Timeout(inner));
                    }
                    pending = inner;
                }
            }
        }
    }
}

/// bounded creates a new bounded channel with the specified capacity.
#[must_use]
pub fn bounded<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let chan = Arc::new(ConcurrentQueue::bounded(capacity));
    let sender = Sender::new(chan.clone());
    let receiver = Receiver::new(chan);
    (sender, receiver)
}

/// unbounded creates a new unbounded channel.
#[must_use]
pub fn unbounded<T>() -> (Sender<T>, Receiver<T>) {
    let chan = Arc::new(ConcurrentQueue::unbounded());
    let sender = Sender::new(chan.clone());
    let receiver = Receiver::new(chan);
    (sender, receiver)
}

/// channel creates a bounded channel when a capacity is given, else an
/// unbounded one.
#[must_use]
pub fn channel<T>(capacity: Option<usize>) -> (Sender<T>, Receiver<T>) {
    match capacity {
        Some(size) => bounded(size),
        None => unbounded(),
    }
}

#[cfg(test)]
mod test_channels {
    use std::{thread, time::Duration};

    use ntest::timeout;

    use super::{bounded, unbounded, ReceiverError, SenderError};
    use crate::synca::CancelSignal;

    #[test]
    fn unbounded_channel() {
        let (sender, receiver) = unbounded();
        sender.send(42).unwrap();
        assert_eq!(receiver.recv().unwrap(), 42);
    }

    #[test]
    fn full_bounded_channel_rejects_send() {
        let (sender, receiver) = bounded(1);
        sender.send(42).unwrap();
        assert!(matches!(sender.send(43), Err(SenderError::Full(43))));
        assert_eq!(receiver.recv().unwrap(), 42);
    }

    #[test]
    fn closed_channel_drains_before_reporting_closed() {
        let (sender, receiver) = unbounded();
        sender.send(1).unwrap();
        sender.send(2).unwrap();
        sender.close();

        assert_eq!(receiver.recv().unwrap(), 1);
        assert_eq!(receiver.recv().unwrap(), 2);
        assert_eq!(receiver.recv(), Err(ReceiverError::Closed));
        assert!(matches!(sender.send(3), Err(SenderError::Closed(3))));
    }

    #[test]
    #[timeout(5000)]
    fn fail_to_receive_item_after_timeout() {
        let (sender, receiver) = bounded(1);

        let sender_clone = sender.clone();
        let join_handler = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            sender_clone.send(42).unwrap();
        });

        assert_eq!(
            receiver.recv_timeout(Duration::from_millis(20)),
            Err(ReceiverError::Timeout)
        );

        join_handler.join().expect("should finish");
    }

    #[test]
    #[timeout(5000)]
    fn can_receive_item_sent_later() {
        let (sender, receiver) = bounded(1);

        let sender_clone = sender.clone();
        let join_handler = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            sender_clone.send(42).unwrap();
        });

        assert_eq!(receiver.recv_timeout(Duration::from_secs(2)).unwrap(), 42);
        join_handler.join().expect("should finish");
    }

    #[test]
    #[timeout(5000)]
    fn cancel_ends_blocked_receive() {
        let (_sender, receiver) = bounded::<usize>(1);
        let cancel = CancelSignal::new();

        let trigger = cancel.clone();
        let join_handler = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            trigger.cancel();
        });

        assert_eq!(
            receiver.recv_until(Duration::from_secs(10), &cancel),
            Err(ReceiverError::Cancelled)
        );
        join_handler.join().expect("should finish");
    }

    #[test]
    #[timeout(5000)]
    fn send_until_waits_for_room() {
        let (sender, receiver) = bounded(1);
        let cancel = CancelSignal::new();
        sender.send(1).unwrap();

        let join_handler = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            receiver.recv().unwrap()
        });

        sender
            .send_until(2, Duration::from_secs(2), &cancel)
            .expect("should find room once the reader pops");
        assert_eq!(join_handler.join().expect("should finish"), 1);
    }

    #[test]
    fn send_until_gives_back_value_on_timeout() {
        let (sender, _receiver) = bounded(1);
        let cancel = CancelSignal::new();
        sender.send(1).unwrap();

        let result = sender.send_until(2, Duration::from_millis(5), &cancel);
        assert!(matches!(result, Err(SenderError::Timeout(2))));
        assert_eq!(result.unwrap_err().into_inner(), 2);
    }
}
