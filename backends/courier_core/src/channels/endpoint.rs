use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use courier_config::{TransportConfig, DEFAULT_WAIT_TIMEOUT};

use crate::synca::mpp::{self, Receiver, ReceiverError, Sender, SenderError};
use crate::synca::{recover_lock, CancelSignal};

use super::{
    ChannelEvent, ChannelResult, ChannelStateError, CloseEvent, EventKind, Frame, Message,
    ReadyState, ABNORMAL_CLOSURE, MAX_REASON_BYTES, NORMAL_CLOSURE,
};

static PAIR_IDS: AtomicU64 = AtomicU64::new(1);

pub type Listener = Box<dyn FnMut(&ChannelEvent) + Send + 'static>;

/// Queue sizing and waiting behaviour for the endpoints of a pair.
#[derive(Clone, Debug)]
pub struct ChannelOptions {
    /// Inbound queue capacity per endpoint, unbounded when `None`.
    pub capacity: Option<usize>,
    pub wait_timeout: Duration,
    /// Endpoints are cancelled along with this signal when set.
    pub parent: Option<CancelSignal>,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            capacity: None,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            parent: None,
        }
    }
}

impl From<&TransportConfig> for ChannelOptions {
    fn from(config: &TransportConfig) -> Self {
        Self {
            capacity: config.channel_capacity.map(|size| size.max(1)),
            wait_timeout: config.wait_timeout,
            parent: None,
        }
    }
}

impl ChannelOptions {
    #[must_use]
    pub fn with_parent(mut self, parent: &CancelSignal) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// Creates two linked endpoints, both [`ReadyState::Connecting`].
    #[must_use]
    pub fn create_pair(self) -> (Endpoint, Endpoint) {
        let pair = PAIR_IDS.fetch_add(1, Ordering::Relaxed);
        let first = Arc::new(EndpointState::new(pair, "first", &self));
        let second = Arc::new(EndpointState::new(pair, "second", &self));

        // both cells are fresh, neither set can fail
        let _ = first.sibling.set(Arc::downgrade(&second));
        let _ = second.sibling.set(Arc::downgrade(&first));

        debug!("created channel pair {}", pair);
        (Endpoint { state: first }, Endpoint { state: second })
    }
}

#[must_use]
pub fn create_pair() -> (Endpoint, Endpoint) {
    ChannelOptions::default().create_pair()
}

struct EndpointState {
    pair: u64,
    side: &'static str,
    ready: AtomicU8,
    sender: Sender<Frame>,
    receiver: Receiver<Frame>,
    sibling: OnceLock<Weak<EndpointState>>,
    listeners: Mutex<Vec<(EventKind, Listener)>>,
    backlog: Mutex<VecDeque<ChannelEvent>>,
    dispatching: AtomicBool,
    close_event: Mutex<Option<CloseEvent>>,
    cancel: CancelSignal,
    wait_timeout: Duration,
}

impl EndpointState {
    fn new(pair: u64, side: &'static str, options: &ChannelOptions) -> Self {
        let (sender, receiver) = mpp::channel(options.capacity);
        let cancel = match &options.parent {
            Some(parent) => parent.derive(),
            None => CancelSignal::new(),
        };
        Self {
            pair,
            side,
            ready: AtomicU8::new(ReadyState::Connecting as u8),
            sender,
            receiver,
            sibling: OnceLock::new(),
            listeners: Mutex::new(Vec::new()),
            backlog: Mutex::new(VecDeque::new()),
            dispatching: AtomicBool::new(false),
            close_event: Mutex::new(None),
            cancel,
            wait_timeout: options.wait_timeout,
        }
    }

    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.ready.load(Ordering::SeqCst))
    }

    fn sibling(&self) -> Option<Arc<EndpointState>> {
        self.sibling.get().and_then(Weak::upgrade)
    }

    /// Moves Connecting or Open to Closing, returns false from any other state.
    fn begin_closing(&self) -> bool {
        self.ready
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                match ReadyState::from_u8(current) {
                    ReadyState::Connecting | ReadyState::Open => {
                        Some(ReadyState::Closing as u8)
                    }
                    ReadyState::Closing | ReadyState::Closed => None,
                }
            })
            .is_ok()
    }

    /// Pushes `frame` onto this endpoint's inbound queue.
    fn push(&self, frame: Frame, cancel: &CancelSignal) -> Result<(), SenderError<Frame>> {
        self.sender.send_until(frame, self.wait_timeout, cancel)
    }

    fn finish(&self, event: CloseEvent) {
        self.ready.store(ReadyState::Closed as u8, Ordering::SeqCst);
        info!(
            "channel {}/{} closed with {} (clean: {})",
            self.pair, self.side, event.code, event.was_clean
        );

        *recover_lock(&self.close_event) = Some(event.clone());
        recover_lock(&self.backlog).push_back(ChannelEvent::Close(event));
        self.sender.close();
        self.cancel.cancel();
    }

    fn process(&self, frame: Frame) {
        match frame {
            Frame::Message(message) => match self.ready_state() {
                ReadyState::Open | ReadyState::Closing => {
                    recover_lock(&self.backlog).push_back(ChannelEvent::Message(message));
                }
                state => {
                    trace!(
                        "channel {}/{} dropped a message while {:?}",
                        self.pair,
                        self.side,
                        state
                    );
                }
            },
            Frame::Close { code, reason } => match self.ready_state() {
                ReadyState::Connecting | ReadyState::Open => {
                    self.begin_closing();
                    if let Some(sibling) = self.sibling() {
                        let echo = Frame::Close {
                            code,
                            reason: reason.clone(),
                        };
                        if sibling.push(echo, &self.cancel).is_err() {
                            debug!(
                                "channel {}/{} could not echo close to its sibling",
                                self.pair, self.side
                            );
                        }
                    }
                    self.finish(CloseEvent {
                        code,
                        reason,
                        was_clean: true,
                    });
                }
                ReadyState::Closing => self.finish(CloseEvent {
                    code,
                    reason,
                    was_clean: true,
                }),
                ReadyState::Closed => {}
            },
            Frame::Gone => {
                if self.ready_state() != ReadyState::Closed {
                    warn!(
                        "channel {}/{} lost its sibling without a close",
                        self.pair, self.side
                    );
                    recover_lock(&self.backlog).push_back(ChannelEvent::Error(String::from(
                        "sibling endpoint dropped without closing",
                    )));
                    self.finish(CloseEvent {
                        code: ABNORMAL_CLOSURE,
                        reason: String::new(),
                        was_clean: false,
                    });
                }
            }
        }
    }

    /// A sibling that vanished without managing to queue [`Frame::Gone`] is
    /// noticed once the inbound queue runs dry.
    fn detect_lost_sibling(&self) -> bool {
        if self.ready_state() == ReadyState::Closed || !self.receiver.is_empty() {
            return false;
        }
        if self.sibling().is_some() {
            return false;
        }
        self.process(Frame::Gone);
        true
    }

    fn next_ready(&self) -> Option<ChannelEvent> {
        recover_lock(&self.backlog).pop_front()
    }

    fn deliver(&self, event: &ChannelEvent) {
        let mut active = std::mem::take(&mut *recover_lock(&self.listeners));
        let kind = event.kind();
        for (_, listener) in active.iter_mut().filter(|(wanted, _)| *wanted == kind) {
            listener(event);
        }

        let mut guard = recover_lock(&self.listeners);
        let added = std::mem::take(&mut *guard);
        if kind == EventKind::Close {
            // listeners often hold clones of this endpoint, release them
            drop(guard);
            drop(active);
            drop(added);
            return;
        }
        active.extend(added);
        *guard = active;
    }

    fn try_dispatch(&self) -> Option<DispatchGuard<'_>> {
        self.dispatching
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| DispatchGuard(&self.dispatching))
    }
}

impl Drop for EndpointState {
    fn drop(&mut self) {
        if self.ready_state() == ReadyState::Closed {
            return;
        }
        if let Some(sibling) = self.sibling() {
            debug!("channel {}/{} dropped while open", self.pair, self.side);
            let _ = sibling.sender.send(Frame::Gone);
        }
    }
}

struct DispatchGuard<'a>(&'a AtomicBool);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// One side of a duplex channel pair.
///
/// Clones are handles onto the same endpoint. The sibling is only weakly
/// referenced, dropping the last handle of one side is seen by the other as
/// an abnormal close.
#[derive(Clone)]
pub struct Endpoint {
    state: Arc<EndpointState>,
}

impl core::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("pair", &self.state.pair)
            .field("side", &self.state.side)
            .field("ready_state", &self.ready_state())
            .finish()
    }
}

/// Non-owning handle to an [`Endpoint`], see [`Endpoint::downgrade`].
#[derive(Clone, Debug)]
pub struct WeakEndpoint {
    state: Weak<EndpointState>,
}

impl WeakEndpoint {
    /// The endpoint, unless every owning handle was dropped.
    #[must_use]
    pub fn upgrade(&self) -> Option<Endpoint> {
        self.state.upgrade().map(|state| Endpoint { state })
    }
}

impl Endpoint {
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        self.state.ready_state()
    }

    /// State of the other endpoint, `None` once it was dropped.
    #[must_use]
    pub fn sibling_ready_state(&self) -> Option<ReadyState> {
        self.state.sibling().map(|sibling| sibling.ready_state())
    }

    #[must_use]
    pub fn is_sibling_of(&self, other: &Endpoint) -> bool {
        self.state
            .sibling()
            .is_some_and(|sibling| Arc::ptr_eq(&sibling, &other.state))
    }

    /// A handle that does not keep the endpoint alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakEndpoint {
        WeakEndpoint {
            state: Arc::downgrade(&self.state),
        }
    }

    /// How this endpoint closed, once it has.
    #[must_use]
    pub fn close_event(&self) -> Option<CloseEvent> {
        recover_lock(&self.state.close_event).clone()
    }

    /// Fired when the endpoint reaches [`ReadyState::Closed`].
    #[must_use]
    pub fn cancel_signal(&self) -> CancelSignal {
        self.state.cancel.clone()
    }

    /// Frames received but not yet dispatched.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.receiver.len()
    }

    /// Opens a connecting endpoint. Accepting an open endpoint again does
    /// nothing, a closing or closed one cannot be accepted.
    pub fn accept(&self) -> ChannelResult<()> {
        match self.state.ready.compare_exchange(
            ReadyState::Connecting as u8,
            ReadyState::Open as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => {
                debug!("channel {}/{} accepted", self.state.pair, self.state.side);
                Ok(())
            }
            Err(current) => match ReadyState::from_u8(current) {
                ReadyState::Open => Ok(()),
                other => Err(ChannelStateError::NotAcceptable(other)),
            },
        }
    }

    /// Queues `message` for the sibling and returns without waiting for it
    /// to be dispatched. A sibling that started closing still receives it,
    /// its close is only final once it dispatches the echo of its close.
    pub fn send<M: Into<Message>>(&self, message: M) -> ChannelResult<()> {
        let own = self.ready_state();
        if own != ReadyState::Open {
            return Err(ChannelStateError::NotOpen(own));
        }

        let sibling = self.state.sibling().ok_or(ChannelStateError::SiblingGone)?;
        let theirs = sibling.ready_state();
        if !matches!(theirs, ReadyState::Open | ReadyState::Closing) {
            return Err(ChannelStateError::SiblingNotOpen(theirs));
        }

        match sibling.push(Frame::Message(message.into()), &self.state.cancel) {
            Ok(()) => Ok(()),
            Err(SenderError::Timeout(_) | SenderError::Full(_)) => {
                Err(ChannelStateError::Timeout)
            }
            Err(SenderError::Cancelled(_)) => Err(ChannelStateError::Cancelled),
            Err(SenderError::Closed(_)) => {
                Err(ChannelStateError::SiblingNotOpen(sibling.ready_state()))
            }
        }
    }

    /// Closes with the normal closure code and no reason.
    pub fn close(&self) -> ChannelResult<()> {
        self.close_with(NORMAL_CLOSURE, "")
    }

    /// Starts the close handshake. The close frame is queued behind messages
    /// already sent, the sibling answers it once dispatched and each side
    /// becomes closed as it dispatches the other's close. Closing twice is a
    /// no-op.
    pub fn close_with(&self, code: u16, reason: &str) -> ChannelResult<()> {
        if code != NORMAL_CLOSURE && !(3000..=4999).contains(&code) {
            return Err(ChannelStateError::InvalidCloseCode(code));
        }
        if reason.len() > MAX_REASON_BYTES {
            return Err(ChannelStateError::ReasonTooLong(reason.len()));
        }
        if !self.state.begin_closing() {
            return Ok(());
        }

        debug!(
            "channel {}/{} closing with {}",
            self.state.pair, self.state.side, code
        );
        let frame = Frame::Close {
            code,
            reason: reason.to_string(),
        };
        let handed_over = match self.state.sibling() {
            Some(sibling) => sibling.push(frame, &self.state.cancel).is_ok(),
            None => false,
        };
        if !handed_over {
            self.state.finish(CloseEvent {
                code,
                reason: reason.to_string(),
                was_clean: false,
            });
        }
        Ok(())
    }

    /// Registers `listener` for every future event of `kind`. Listeners are
    /// released once the endpoint's close event was delivered.
    ///
    /// A listener holding a clone of this same endpoint keeps it alive until
    /// then, an endpoint that never closes is never freed. Listeners that
    /// answer on their own endpoint should hold [`Endpoint::downgrade`].
    pub fn add_event_listener<F>(&self, kind: EventKind, listener: F)
    where
        F: FnMut(&ChannelEvent) + Send + 'static,
    {
        recover_lock(&self.state.listeners).push((kind, Box::new(listener)));
    }

    /// Delivers every event already received to the listeners, in order,
    /// without waiting. Returns the number of events delivered, zero when
    /// called from within a dispatch on this same endpoint.
    pub fn dispatch_pending(&self) -> usize {
        let Some(_guard) = self.state.try_dispatch() else {
            return 0;
        };

        let mut delivered = 0;
        loop {
            if let Some(event) = self.state.next_ready() {
                self.state.deliver(&event);
                delivered += 1;
                continue;
            }
            match self.state.receiver.recv() {
                Ok(frame) => self.state.process(frame),
                Err(_) => {
                    if !self.state.detect_lost_sibling() {
                        break;
                    }
                }
            }
        }
        delivered
    }

    /// Waits up to `timeout` for the next event, delivers it to the
    /// listeners and returns it.
    ///
    /// # Errors
    /// [`ChannelStateError::NotOpen`] once closed with nothing left to
    /// deliver, `Timeout` when nothing arrives in time and `Cancelled` when a
    /// parent signal ended the wait.
    pub fn next_event(&self, timeout: Duration) -> ChannelResult<ChannelEvent> {
        let Some(_guard) = self.state.try_dispatch() else {
            return Err(ChannelStateError::Dispatching);
        };

        loop {
            if let Some(event) = self.state.next_ready() {
                self.state.deliver(&event);
                return Ok(event);
            }
            if self.ready_state() == ReadyState::Closed {
                return Err(ChannelStateError::NotOpen(ReadyState::Closed));
            }
            if self.state.detect_lost_sibling() {
                continue;
            }

            match self.state.receiver.recv_until(timeout, &self.state.cancel) {
                Ok(frame) => self.state.process(frame),
                Err(ReceiverError::Timeout | ReceiverError::Empty) => {
                    return Err(ChannelStateError::Timeout)
                }
                Err(ReceiverError::Cancelled | ReceiverError::Closed) => {
                    if self.ready_state() != ReadyState::Closed {
                        return Err(ChannelStateError::Cancelled);
                    }
                }
            }
        }
    }

    /// Pulls and delivers events until the endpoint is closed, failing if any
    /// single wait exceeds `idle_timeout`.
    pub fn run_until_closed(&self, idle_timeout: Duration) -> ChannelResult<()> {
        loop {
            match self.next_event(idle_timeout) {
                Ok(_) => {}
                Err(ChannelStateError::NotOpen(ReadyState::Closed)) => return Ok(()),
                Err(err) => return Err(err),
            }
        }
    }

    /// Runs [`Endpoint::run_until_closed`] on its own thread with the
    /// endpoint's wait timeout.
    #[must_use]
    pub fn spawn_dispatcher(&self) -> JoinHandle<ChannelResult<()>> {
        let endpoint = self.clone();
        let idle_timeout = self.state.wait_timeout;
        thread::spawn(move || endpoint.run_until_closed(idle_timeout))
    }
}

#[cfg(test)]
mod test_endpoint {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use ntest::timeout;

    use super::{create_pair, ChannelOptions};
    use crate::channels::{
        ChannelEvent, ChannelStateError, CloseEvent, EventKind, Message, ReadyState,
        ABNORMAL_CLOSURE,
    };
    use crate::synca::CancelSignal;

    fn record(endpoint: &super::Endpoint, kind: EventKind) -> Arc<Mutex<Vec<ChannelEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        endpoint.add_event_listener(kind, move |event| {
            sink.lock().expect("not poisoned").push(event.clone());
        });
        seen
    }

    fn opened_pair() -> (super::Endpoint, super::Endpoint) {
        let (left, right) = create_pair();
        left.accept().expect("should accept");
        right.accept().expect("should accept");
        (left, right)
    }

    #[test]
    fn accept_opens_once() {
        let (left, right) = create_pair();
        assert_eq!(left.ready_state(), ReadyState::Connecting);
        assert_eq!(right.ready_state(), ReadyState::Connecting);

        left.accept().expect("should accept");
        assert_eq!(left.ready_state(), ReadyState::Open);
        assert!(left.accept().is_ok());
        assert!(left.is_sibling_of(&right));
        assert!(right.is_sibling_of(&left));
    }

    #[test]
    fn accept_after_close_fails() {
        let (left, _right) = create_pair();
        left.close().expect("should close");
        assert_eq!(
            left.accept(),
            Err(ChannelStateError::NotAcceptable(ReadyState::Closing))
        );
    }

    #[test]
    fn send_requires_both_sides_open() {
        let (left, right) = create_pair();
        assert_eq!(
            left.send("early"),
            Err(ChannelStateError::NotOpen(ReadyState::Connecting))
        );

        left.accept().expect("should accept");
        assert_eq!(
            left.send("early"),
            Err(ChannelStateError::SiblingNotOpen(ReadyState::Connecting))
        );

        right.accept().expect("should accept");
        assert!(left.send("now").is_ok());
    }

    #[test]
    fn message_reaches_sibling_listener_exactly_once() {
        let (left, right) = opened_pair();
        let seen = record(&right, EventKind::Message);

        left.send("payload").expect("should send");
        assert_eq!(right.dispatch_pending(), 1);
        assert_eq!(right.dispatch_pending(), 0);

        let seen = seen.lock().expect("not poisoned");
        assert_eq!(
            *seen,
            vec![ChannelEvent::Message(Message::Text(String::from("payload")))]
        );
    }

    #[test]
    fn messages_arrive_in_send_order() {
        let (left, right) = opened_pair();
        for index in 0..10 {
            left.send(format!("message-{index}")).expect("should send");
        }
        left.send(vec![1u8, 2, 3]).expect("should send");

        let mut received = Vec::new();
        while let Ok(event) = right.next_event(Duration::from_millis(10)) {
            received.push(event);
        }

        assert_eq!(received.len(), 11);
        for (index, event) in received.iter().take(10).enumerate() {
            assert_eq!(
                event.as_message().and_then(Message::as_text),
                Some(format!("message-{index}").as_str())
            );
        }
        assert_eq!(
            received[10].as_message().map(Message::as_bytes),
            Some([1u8, 2, 3].as_slice())
        );
    }

    #[test]
    fn close_handshake_closes_both_sides() {
        let (left, right) = opened_pair();
        let left_closes = record(&left, EventKind::Close);
        let right_closes = record(&right, EventKind::Close);

        left.close_with(3001, "done").expect("should close");
        assert_eq!(left.ready_state(), ReadyState::Closing);

        right.dispatch_pending();
        assert_eq!(right.ready_state(), ReadyState::Closed);

        left.dispatch_pending();
        assert_eq!(left.ready_state(), ReadyState::Closed);

        let expected = ChannelEvent::Close(CloseEvent {
            code: 3001,
            reason: String::from("done"),
            was_clean: true,
        });
        assert_eq!(*left_closes.lock().expect("not poisoned"), vec![expected.clone()]);
        assert_eq!(*right_closes.lock().expect("not poisoned"), vec![expected]);
    }

    #[test]
    fn queued_messages_are_delivered_before_close() {
        let (left, right) = opened_pair();
        left.send("one").expect("should send");
        left.send("two").expect("should send");
        left.close().expect("should close");

        let kinds: Vec<EventKind> = (0..3)
            .map(|_| {
                right
                    .next_event(Duration::from_millis(50))
                    .expect("should receive")
                    .kind()
            })
            .collect();

        assert_eq!(
            kinds,
            vec![EventKind::Message, EventKind::Message, EventKind::Close]
        );
    }

    #[test]
    fn send_after_close_is_an_error() {
        let (left, right) = opened_pair();
        left.close().expect("should close");
        assert_eq!(
            left.send("late"),
            Err(ChannelStateError::NotOpen(ReadyState::Closing))
        );

        right.dispatch_pending();
        assert_eq!(
            right.send("late"),
            Err(ChannelStateError::NotOpen(ReadyState::Closed))
        );

        left.dispatch_pending();
        assert_eq!(
            left.send("late"),
            Err(ChannelStateError::NotOpen(ReadyState::Closed))
        );
        assert!(left.close().is_ok());
    }

    #[test]
    fn rejects_invalid_close_arguments() {
        let (left, _right) = opened_pair();
        assert_eq!(
            left.close_with(1001, ""),
            Err(ChannelStateError::InvalidCloseCode(1001))
        );
        assert_eq!(
            left.close_with(1000, &"x".repeat(124)),
            Err(ChannelStateError::ReasonTooLong(124))
        );
        assert_eq!(left.ready_state(), ReadyState::Open);
    }

    #[test]
    fn dropped_sibling_is_an_abnormal_close() {
        let (left, right) = opened_pair();
        let errors = record(&left, EventKind::Error);
        drop(right);

        let event = left
            .next_event(Duration::from_millis(50))
            .expect("should see the error");
        assert_eq!(event.kind(), EventKind::Error);

        let event = left
            .next_event(Duration::from_millis(50))
            .expect("should see the close");
        assert_eq!(
            event,
            ChannelEvent::Close(CloseEvent {
                code: ABNORMAL_CLOSURE,
                reason: String::new(),
                was_clean: false,
            })
        );
        assert_eq!(left.ready_state(), ReadyState::Closed);
        assert_eq!(errors.lock().expect("not poisoned").len(), 1);
        assert_eq!(left.sibling_ready_state(), None);
    }

    #[test]
    #[timeout(5000)]
    fn next_event_times_out() {
        let (left, _right) = opened_pair();
        assert_eq!(
            left.next_event(Duration::from_millis(20)),
            Err(ChannelStateError::Timeout)
        );
    }

    #[test]
    #[timeout(5000)]
    fn parent_signal_cancels_waits() {
        let parent = CancelSignal::new();
        let (left, right) = ChannelOptions::default().with_parent(&parent).create_pair();
        left.accept().expect("should accept");
        right.accept().expect("should accept");

        parent.cancel();
        assert_eq!(
            left.next_event(Duration::from_secs(10)),
            Err(ChannelStateError::Cancelled)
        );
    }

    #[test]
    #[timeout(5000)]
    fn dispatcher_thread_echoes_until_closed() {
        let (client, server) = opened_pair();
        let echo = server.downgrade();
        server.add_event_listener(EventKind::Message, move |event| {
            if let (ChannelEvent::Message(message), Some(server)) = (event, echo.upgrade()) {
                server.send(message.clone()).expect("should echo");
            }
        });
        let dispatcher = server.spawn_dispatcher();

        client.send("ping").expect("should send");
        let reply = client
            .next_event(Duration::from_secs(2))
            .expect("should get the echo");
        assert_eq!(reply.as_message().and_then(Message::as_text), Some("ping"));

        client.close().expect("should close");
        let closing = client
            .next_event(Duration::from_secs(2))
            .expect("should get the close");
        assert_eq!(closing.kind(), EventKind::Close);

        assert!(dispatcher.join().expect("should finish").is_ok());
        assert_eq!(server.ready_state(), ReadyState::Closed);
        assert_eq!(client.ready_state(), ReadyState::Closed);
    }

    #[test]
    fn dispatch_from_inside_a_listener_is_refused() {
        let (left, right) = opened_pair();
        let nested = Arc::new(Mutex::new(None));
        let probe = right.clone();
        let result = nested.clone();
        right.add_event_listener(EventKind::Message, move |_| {
            *result.lock().expect("not poisoned") = Some(probe.dispatch_pending());
        });

        left.send("hi").expect("should send");
        assert_eq!(right.dispatch_pending(), 1);
        assert_eq!(*nested.lock().expect("not poisoned"), Some(0));
    }

    #[test]
    fn closing_side_still_receives_replies() {
        let (client, server) = opened_pair();
        let echo = server.downgrade();
        let replies = Arc::new(Mutex::new(Vec::new()));
        let results = replies.clone();
        server.add_event_listener(EventKind::Message, move |event| {
            if let (ChannelEvent::Message(message), Some(server)) = (event, echo.upgrade()) {
                results
                    .lock()
                    .expect("not poisoned")
                    .push(server.send(message.clone()));
            }
        });

        client.send("data").expect("should send");
        client.close().expect("should close");
        assert_eq!(server.dispatch_pending(), 2);
        assert_eq!(*replies.lock().expect("not poisoned"), vec![Ok(())]);

        let reply = client
            .next_event(Duration::from_millis(50))
            .expect("should get the reply");
        assert_eq!(reply.as_message().and_then(Message::as_text), Some("data"));

        let closing = client
            .next_event(Duration::from_millis(50))
            .expect("should get the close");
        assert_eq!(closing.kind(), EventKind::Close);
        assert_eq!(client.ready_state(), ReadyState::Closed);
    }

    #[test]
    fn weak_listener_handle_lets_the_endpoint_go() {
        let (left, right) = opened_pair();
        let handle = right.downgrade();
        let echo = handle.clone();
        right.add_event_listener(EventKind::Message, move |event| {
            if let (ChannelEvent::Message(message), Some(right)) = (event, echo.upgrade()) {
                let _ = right.send(message.clone());
            }
        });

        drop(right);
        assert!(handle.upgrade().is_none());

        let event = left
            .next_event(Duration::from_millis(50))
            .expect("should see the error");
        assert_eq!(event.kind(), EventKind::Error);
    }
}
