//! Ordered, terminating event streams.
//!
//! Two flavours share the same terminal rules:
//!
//! - [`Queue`] buffers values for a single consumer and drops them once
//!   delivered. Download records and response heads use it.
//! - [`Multicast`] keeps its whole history so every subscriber, however
//!   late, replays all values from the start. Upload progress uses it.
//!   Values are held until the last handle is dropped, so it suits streams
//!   with one small value per event, not bulk data.
//!
//! A stream terminates at most once, with either a failure or a normal end.
//! Values appended after that are dropped. Values appended before it are
//! still delivered, in order, ahead of the terminal signal. Each consumer
//! sees exactly one terminal signal.
//!
//! Observer callbacks run on the producer's thread and must not call back
//! into the same stream.

use std::collections::VecDeque;
use std::pin::pin;
use std::sync::Arc;

use futures_util::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::data::StreamEvent;
use crate::error::TransportError;

type Observer<T> = Box<dyn FnMut(StreamEvent<T>) + Send>;

#[derive(Debug, Clone)]
enum Terminal {
    End,
    Failure(TransportError),
}

impl Terminal {
    fn event<T>(&self) -> StreamEvent<T> {
        match self {
            Terminal::End => StreamEvent::End,
            Terminal::Failure(err) => StreamEvent::Failure(err.clone()),
        }
    }

    fn into_item<T>(self) -> Option<Result<T, TransportError>> {
        match self {
            Terminal::End => None,
            Terminal::Failure(err) => Some(Err(err)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Consumer {
    Reader,
    Observer,
    Gone,
}

struct QueueState<T> {
    items:     VecDeque<T>,
    terminal:  Option<Terminal>,
    delivered: bool,
    consumer:  Consumer,
}

struct QueueShared<T> {
    state:    Mutex<QueueState<T>>,
    /// Also serialises delivery so an observer sees events in append order.
    observer: Mutex<Option<Observer<T>>>,
    readable: Notify,
    drained:  Notify,
}

/// Producer side of a single-consumer stream.
pub struct Queue<T> {
    shared: Arc<QueueShared<T>>,
}

impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Queue")
            .field("pending", &state.items.len())
            .field("terminated", &state.terminal.is_some())
            .finish()
    }
}

impl<T: Send + 'static> Queue<T> {
    pub fn new() -> (Queue<T>, QueueReader<T>) {
        let shared = Arc::new(QueueShared {
            state:    Mutex::new(QueueState {
                items:     VecDeque::new(),
                terminal:  None,
                delivered: false,
                consumer:  Consumer::Reader,
            }),
            observer: Mutex::new(None),
            readable: Notify::new(),
            drained:  Notify::new(),
        });
        (
            Queue {
                shared: Arc::clone(&shared),
            },
            QueueReader { shared },
        )
    }

    /// Appends a value. Returns `false` if the stream already terminated or
    /// its consumer went away, in which case the value is dropped.
    pub fn append(&self, value: T) -> bool {
        let mut observer = self.shared.observer.lock();
        {
            let mut state = self.shared.state.lock();
            if state.terminal.is_some() || state.consumer == Consumer::Gone {
                return false;
            }
            if observer.is_none() {
                state.items.push_back(value);
                drop(state);
                self.shared.readable.notify_waiters();
                return true;
            }
        }
        if let Some(callback) = observer.as_mut() {
            callback(StreamEvent::Value(value));
        }
        true
    }

    /// Terminates with a failure. Returns `false` if already terminated.
    pub fn fail(&self, err: TransportError) -> bool { self.terminate(Terminal::Failure(err)) }

    /// Terminates normally. Returns `false` if already terminated.
    pub fn close(&self) -> bool { self.terminate(Terminal::End) }

    pub fn is_terminated(&self) -> bool { self.shared.state.lock().terminal.is_some() }

    /// Values appended but not yet consumed.
    pub fn pending(&self) -> usize { self.shared.state.lock().items.len() }

    /// Resolves once fewer than `high_water` values are pending, or once
    /// nobody will consume them anymore.
    pub async fn ready(&self, high_water: usize) {
        loop {
            let mut drained = pin!(self.shared.drained.notified());
            drained.as_mut().enable();
            {
                let state = self.shared.state.lock();
                let stalled = state.items.len() >= high_water
                    && state.consumer == Consumer::Reader
                    && state.terminal.is_none();
                if !stalled {
                    return;
                }
            }
            drained.await;
        }
    }

    fn terminate(&self, terminal: Terminal) -> bool {
        let mut observer = self.shared.observer.lock();
        {
            let mut state = self.shared.state.lock();
            if state.terminal.is_some() {
                return false;
            }
            state.terminal = Some(terminal.clone());
            if observer.is_some() {
                state.delivered = true;
            }
        }
        if let Some(callback) = observer.as_mut() {
            callback(terminal.event());
        }
        *observer = None;
        self.shared.readable.notify_waiters();
        self.shared.drained.notify_waiters();
        true
    }
}

/// Consumer side of a [`Queue`].
pub struct QueueReader<T> {
    shared: Arc<QueueShared<T>>,
}

impl<T> std::fmt::Debug for QueueReader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueReader").finish_non_exhaustive()
    }
}

impl<T: Send + 'static> QueueReader<T> {
    /// Next value. `Some(Err)` carries the failure, `None` marks the end.
    /// After the terminal signal every call returns `None`.
    pub async fn next(&mut self) -> Option<Result<T, TransportError>> {
        loop {
            let mut readable = pin!(self.shared.readable.notified());
            readable.as_mut().enable();
            {
                let mut state = self.shared.state.lock();
                if let Some(value) = state.items.pop_front() {
                    drop(state);
                    self.shared.drained.notify_waiters();
                    return Some(Ok(value));
                }
                if state.delivered {
                    return None;
                }
                if let Some(terminal) = state.terminal.clone() {
                    state.delivered = true;
                    return terminal.into_item();
                }
            }
            readable.await;
        }
    }

    /// Values and the terminal failure, if any, as a `Stream`.
    pub fn into_stream(self) -> BoxStream<'static, Result<T, TransportError>> {
        stream::unfold(self, |mut reader| async move {
            let item = reader.next().await?;
            Some((item, reader))
        })
        .boxed()
    }

    /// Switches to callback delivery: the backlog is delivered immediately,
    /// later events as they are appended.
    pub fn observe(self, mut callback: impl FnMut(StreamEvent<T>) + Send + 'static) {
        let mut observer = self.shared.observer.lock();
        let (backlog, terminal) = {
            let mut state = self.shared.state.lock();
            state.consumer = Consumer::Observer;
            let backlog: Vec<T> = state.items.drain(..).collect();
            let terminal = if state.delivered {
                None
            } else {
                state.terminal.clone()
            };
            if terminal.is_some() {
                state.delivered = true;
            }
            (backlog, terminal)
        };
        self.shared.drained.notify_waiters();

        for value in backlog {
            callback(StreamEvent::Value(value));
        }
        match terminal {
            Some(terminal) => callback(terminal.event()),
            None => {
                if !self.shared.state.lock().delivered {
                    *observer = Some(Box::new(callback));
                }
            }
        }
    }
}

impl<T> Drop for QueueReader<T> {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        if state.consumer == Consumer::Reader {
            state.consumer = Consumer::Gone;
            state.items.clear();
            drop(state);
            self.shared.drained.notify_waiters();
        }
    }
}

struct MulticastState<T> {
    history:  Vec<T>,
    terminal: Option<Terminal>,
}

struct MulticastShared<T> {
    state:     Mutex<MulticastState<T>>,
    observers: Mutex<Vec<Observer<T>>>,
    notify:    Notify,
}

/// Multi-consumer stream with full replay.
///
/// Every appended value stays in memory for the stream's lifetime, which
/// ends when the last [`Multicast`] and [`Subscription`] are dropped. Closing
/// does not release the history.
pub struct Multicast<T> {
    shared: Arc<MulticastShared<T>>,
}

impl<T> Clone for Multicast<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for Multicast<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Multicast")
            .field("values", &state.history.len())
            .field("terminated", &state.terminal.is_some())
            .finish()
    }
}

impl<T: Clone + Send + 'static> Default for Multicast<T> {
    fn default() -> Self { Self::new() }
}

impl<T: Clone + Send + 'static> Multicast<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(MulticastShared {
                state:     Mutex::new(MulticastState {
                    history:  Vec::new(),
                    terminal: None,
                }),
                observers: Mutex::new(Vec::new()),
                notify:    Notify::new(),
            }),
        }
    }

    /// Returns `false` if the stream already terminated.
    pub fn append(&self, value: T) -> bool {
        let mut observers = self.shared.observers.lock();
        {
            let mut state = self.shared.state.lock();
            if state.terminal.is_some() {
                return false;
            }
            state.history.push(value.clone());
        }
        for observer in observers.iter_mut() {
            observer(StreamEvent::Value(value.clone()));
        }
        drop(observers);
        self.shared.notify.notify_waiters();
        true
    }

    pub fn fail(&self, err: TransportError) -> bool { self.terminate(Terminal::Failure(err)) }

    pub fn close(&self) -> bool { self.terminate(Terminal::End) }

    pub fn is_terminated(&self) -> bool { self.shared.state.lock().terminal.is_some() }

    /// Every value appended so far.
    pub fn values(&self) -> Vec<T> { self.shared.state.lock().history.clone() }

    /// Cursor that replays from the first value.
    pub fn subscribe(&self) -> Subscription<T> {
        Subscription {
            shared: Arc::clone(&self.shared),
            cursor: 0,
            done:   false,
        }
    }

    /// Replays the history into `callback`, then forwards later events.
    pub fn observe(&self, mut callback: impl FnMut(StreamEvent<T>) + Send + 'static) {
        let mut observers = self.shared.observers.lock();
        let (history, terminal) = {
            let state = self.shared.state.lock();
            (state.history.clone(), state.terminal.clone())
        };

        for value in history {
            callback(StreamEvent::Value(value));
        }
        match terminal {
            Some(terminal) => callback(terminal.event()),
            None => observers.push(Box::new(callback)),
        }
    }

    fn terminate(&self, terminal: Terminal) -> bool {
        let mut observers = self.shared.observers.lock();
        {
            let mut state = self.shared.state.lock();
            if state.terminal.is_some() {
                return false;
            }
            state.terminal = Some(terminal.clone());
        }
        for mut observer in observers.drain(..) {
            observer(terminal.event());
        }
        drop(observers);
        self.shared.notify.notify_waiters();
        true
    }
}

/// Independent replaying reader of a [`Multicast`].
pub struct Subscription<T> {
    shared: Arc<MulticastShared<T>>,
    cursor: usize,
    done:   bool,
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("cursor", &self.cursor)
            .field("done", &self.done)
            .finish()
    }
}

impl<T: Clone + Send + 'static> Subscription<T> {
    /// Next value. `Some(Err)` carries the failure, `None` marks the end.
    pub async fn next(&mut self) -> Option<Result<T, TransportError>> {
        if self.done {
            return None;
        }
        loop {
            let mut notified = pin!(self.shared.notify.notified());
            notified.as_mut().enable();
            {
                let state = self.shared.state.lock();
                if let Some(value) = state.history.get(self.cursor) {
                    self.cursor += 1;
                    return Some(Ok(value.clone()));
                }
                if let Some(terminal) = state.terminal.clone() {
                    self.done = true;
                    return terminal.into_item();
                }
            }
            notified.await;
        }
    }

    pub fn into_stream(self) -> BoxStream<'static, Result<T, TransportError>> {
        stream::unfold(self, |mut subscription| async move {
            let item = subscription.next().await?;
            Some((item, subscription))
        })
        .boxed()
    }
}
