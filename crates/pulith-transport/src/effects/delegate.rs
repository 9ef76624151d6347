//! The transport delegate: turns engine callbacks into stream events.
//!
//! A [`RequestDriver`] is owned by the task driving the transport. Every
//! callback is checked against the lifecycle table in
//! [`transition`](crate::transition) before it has any effect. The matching
//! [`RequestHandle`] is handed to whoever consumes the response.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream, StreamExt};

use super::mirror::CacheMirror;
use super::reassembler::Reassembler;
use super::stream::{Multicast, Queue, QueueReader, Subscription};
use crate::core::transition;
use crate::data::{Callback, Phase, ResponseHead, State, TransportOptions};
use crate::error::{ProtocolViolation, TransportError};

/// Callbacks an HTTP engine delivers while executing one request.
pub trait TransportDelegate {
    fn part_sent(&mut self, bytes: usize);

    fn request_sent(&mut self);

    /// The returned continuation resolves when the engine may deliver more
    /// of the response.
    fn head_received(&mut self, head: ResponseHead) -> Continuation;

    fn body_part_received(&mut self, bytes: Bytes) -> Continuation;

    fn request_finished(&mut self);

    fn request_failed(&mut self, err: TransportError);
}

/// Receives callbacks that arrive outside their legal `(state, phase)` pair.
///
/// By the time the handler runs the request is halted and every outward
/// stream has been terminated with [`TransportError::Aborted`].
pub trait ViolationHandler: Send {
    fn on_violation(&mut self, violation: &ProtocolViolation);
}

/// Aborts the driving task by panicking.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanicOnViolation;

impl ViolationHandler for PanicOnViolation {
    fn on_violation(&mut self, violation: &ProtocolViolation) {
        panic!("transport protocol violation: {violation}");
    }
}

/// Resolves once the download backlog is below the high-water mark.
#[must_use = "the engine should not deliver more data before this resolves"]
pub struct Continuation {
    wait: Option<BoxFuture<'static, ()>>,
}

impl Continuation {
    pub fn ready() -> Self { Self { wait: None } }

    /// Whether the engine may continue without awaiting.
    pub fn is_ready(&self) -> bool { self.wait.is_none() }

    fn after(wait: impl Future<Output = ()> + Send + 'static) -> Self {
        Self {
            wait: Some(Box::pin(wait)),
        }
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl Future for Continuation {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        match this.wait.as_mut() {
            None => Poll::Ready(()),
            Some(wait) => {
                let poll = wait.as_mut().poll(cx);
                if poll.is_ready() {
                    this.wait = None;
                }
                poll
            }
        }
    }
}

/// Body records of the final response.
pub type BodyStream = QueueReader<Bytes>;

/// What a caller observes while a request executes.
#[derive(Debug)]
pub enum ResponseEvent {
    /// Total request body bytes handed to the transport so far.
    Upload(u64),
    /// A 1xx head preceding the final one.
    Informational(ResponseHead),
    /// The final head and its body records.
    Download(ResponseHead, BodyStream),
}

/// Consumer side of a request.
pub struct RequestHandle {
    upload: Multicast<u64>,
    heads:  QueueReader<ResponseHead>,
    body:   BodyStream,
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle")
            .field("upload", &self.upload)
            .finish_non_exhaustive()
    }
}

struct Events {
    upload: Option<Subscription<u64>>,
    heads:  QueueReader<ResponseHead>,
    body:   Option<BodyStream>,
}

impl RequestHandle {
    /// Upload progress, replayed from the first update.
    pub fn upload(&self) -> Subscription<u64> { self.upload.subscribe() }

    pub fn upload_stream(&self) -> &Multicast<u64> { &self.upload }

    pub fn into_parts(self) -> (Multicast<u64>, QueueReader<ResponseHead>, BodyStream) {
        (self.upload, self.heads, self.body)
    }

    /// Every upload update, then informational heads, then the final head
    /// with its body. A failure ends the sequence.
    pub fn events(self) -> BoxStream<'static, Result<ResponseEvent, TransportError>> {
        let events = Events {
            upload: Some(self.upload.subscribe()),
            heads:  self.heads,
            body:   Some(self.body),
        };

        stream::unfold(events, |mut events| async move {
            events.body.as_ref()?;

            if let Some(upload) = events.upload.as_mut() {
                match upload.next().await {
                    Some(Ok(total)) => return Some((Ok(ResponseEvent::Upload(total)), events)),
                    Some(Err(err)) => {
                        events.body = None;
                        return Some((Err(err), events));
                    }
                    None => events.upload = None,
                }
            }

            match events.heads.next().await? {
                Ok(head) if head.is_informational() => {
                    Some((Ok(ResponseEvent::Informational(head)), events))
                }
                Ok(head) => {
                    let body = events.body.take()?;
                    Some((Ok(ResponseEvent::Download(head, body)), events))
                }
                Err(err) => {
                    events.body = None;
                    Some((Err(err), events))
                }
            }
        })
        .boxed()
    }
}

/// Producer side of a request: implements [`TransportDelegate`].
///
/// Mutated only by the task driving the transport.
pub struct RequestDriver<H: ViolationHandler = PanicOnViolation> {
    state:       State,
    phase:       Phase,
    halted:      bool,
    uploaded:    u64,
    high_water:  usize,
    upload:      Multicast<u64>,
    heads:       Queue<ResponseHead>,
    download:    Queue<Bytes>,
    reassembler: Reassembler,
    mirror:      Option<CacheMirror>,
    handler:     H,
}

impl RequestDriver {
    pub fn new(options: &TransportOptions) -> (Self, RequestHandle) {
        Self::with_handler(options, PanicOnViolation)
    }
}

impl<H: ViolationHandler> RequestDriver<H> {
    pub fn with_handler(options: &TransportOptions, handler: H) -> (Self, RequestHandle) {
        let upload = Multicast::new();
        let (heads, head_reader) = Queue::new();
        let (download, body) = Queue::new();

        let driver = Self {
            state: State::Idle,
            phase: Phase::Upload,
            halted: false,
            uploaded: 0,
            high_water: options.high_water_mark.max(1),
            upload: upload.clone(),
            heads,
            download: download.clone(),
            reassembler: Reassembler::new(options.reading_mode.clone(), download),
            mirror: None,
            handler,
        };
        let handle = RequestHandle {
            upload,
            heads: head_reader,
            body,
        };
        (driver, handle)
    }

    /// Stores the final 2xx body in a cache once the request finishes.
    #[must_use]
    pub fn mirror_into(mut self, mirror: CacheMirror) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn state(&self) -> State { self.state }

    pub fn phase(&self) -> Phase { self.phase }

    /// Set after a protocol violation; every later callback is ignored.
    pub fn is_halted(&self) -> bool { self.halted }

    pub fn uploaded_bytes(&self) -> u64 { self.uploaded }

    pub fn handler(&self) -> &H { &self.handler }

    fn advance(&mut self, callback: Callback, cause: Option<&TransportError>) -> bool {
        if self.halted {
            tracing::debug!(%callback, "ignoring callback on halted request");
            return false;
        }

        match transition(self.state, self.phase, callback) {
            Some((state, phase)) => {
                tracing::debug!(%callback, from = %self.state, to = %state, %phase, "transport callback");
                self.state = state;
                self.phase = phase;
                true
            }
            None => {
                self.violate(callback, cause.cloned());
                false
            }
        }
    }

    fn violate(&mut self, callback: Callback, cause: Option<TransportError>) {
        let violation = ProtocolViolation {
            callback,
            state: self.state,
            phase: self.phase,
            cause,
        };
        tracing::error!(
            %callback,
            state = %self.state,
            phase = %self.phase,
            cause = ?violation.cause,
            "transport protocol violation"
        );

        self.halted = true;
        self.mirror = None;
        let aborted = TransportError::Aborted {
            state: self.state,
            phase: self.phase,
        };
        self.upload.fail(aborted.clone());
        self.heads.fail(aborted.clone());
        self.reassembler.failed(aborted);

        self.handler.on_violation(&violation);
    }

    fn continuation(&self) -> Continuation {
        if self.download.pending() < self.high_water || self.download.is_terminated() {
            return Continuation::ready();
        }
        let download = self.download.clone();
        let high_water = self.high_water;
        Continuation::after(async move { download.ready(high_water).await })
    }
}

impl<H: ViolationHandler> TransportDelegate for RequestDriver<H> {
    fn part_sent(&mut self, bytes: usize) {
        if self.advance(Callback::PartSent, None) {
            self.uploaded += bytes as u64;
            self.upload.append(self.uploaded);
        }
    }

    fn request_sent(&mut self) { self.advance(Callback::RequestSent, None); }

    fn head_received(&mut self, head: ResponseHead) -> Continuation {
        if !self.advance(Callback::HeadReceived, None) {
            return Continuation::ready();
        }

        self.upload.close();
        if let Some(mirror) = self.mirror.as_mut() {
            mirror.head(&head);
        }
        tracing::debug!(status = head.status, version = %head.version, "response head");
        self.heads.append(head);
        self.continuation()
    }

    fn body_part_received(&mut self, bytes: Bytes) -> Continuation {
        if !self.advance(Callback::BodyPartReceived, None) {
            return Continuation::ready();
        }

        if let Some(mirror) = self.mirror.as_mut() {
            mirror.extend(&bytes);
        }
        self.reassembler.append(bytes);
        self.continuation()
    }

    fn request_finished(&mut self) {
        if !self.advance(Callback::RequestFinished, None) {
            return;
        }

        self.reassembler.close();
        self.heads.close();
        if let Some(mirror) = self.mirror.take() {
            mirror.finish();
        }
    }

    fn request_failed(&mut self, err: TransportError) {
        if !self.advance(Callback::RequestFailed, Some(&err)) {
            return;
        }

        tracing::debug!(%err, "request failed");
        self.mirror = None;
        self.upload.close();
        self.heads.fail(err.clone());
        self.reassembler.failed(err);
    }
}

impl<H: ViolationHandler> fmt::Debug for RequestDriver<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDriver")
            .field("state", &self.state)
            .field("phase", &self.phase)
            .field("halted", &self.halted)
            .field("uploaded", &self.uploaded)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Version;

    #[derive(Debug, Default)]
    struct Record(Vec<ProtocolViolation>);

    impl ViolationHandler for Record {
        fn on_violation(&mut self, violation: &ProtocolViolation) { self.0.push(violation.clone()); }
    }

    fn head(status: u16) -> ResponseHead { ResponseHead::new(status, Vec::new(), Version::HTTP_11) }

    #[test]
    fn test_progress_is_cumulative() {
        let (mut driver, handle) = RequestDriver::new(&TransportOptions::default());
        driver.part_sent(10);
        driver.part_sent(5);
        driver.request_sent();

        assert_eq!(driver.uploaded_bytes(), 15);
        assert_eq!(handle.upload_stream().values(), vec![10, 15]);
        assert!(!handle.upload_stream().is_terminated());
    }

    #[test]
    fn test_head_closes_upload_stream() {
        let (mut driver, handle) = RequestDriver::new(&TransportOptions::default());
        driver.request_sent();
        let _ = driver.head_received(head(200));

        assert!(handle.upload_stream().is_terminated());
        assert_eq!(driver.phase(), Phase::Download);
    }

    #[test]
    #[should_panic(expected = "transport protocol violation")]
    fn test_default_handler_panics() {
        let (mut driver, _handle) = RequestDriver::new(&TransportOptions::default());
        let _ = driver.body_part_received(Bytes::from_static(b"early"));
    }

    #[tokio::test]
    async fn test_violation_halts_and_aborts_streams() {
        let (mut driver, handle) =
            RequestDriver::with_handler(&TransportOptions::default(), Record::default());
        let _ = driver.head_received(head(200));
        driver.part_sent(3);
        driver.request_finished();

        assert!(driver.is_halted());
        assert_eq!(driver.handler().0.len(), 1);
        let violation = &driver.handler().0[0];
        assert_eq!(violation.callback, Callback::PartSent);
        assert_eq!(violation.state, State::HeadReceived);
        assert_eq!(violation.phase, Phase::Download);

        let (_, mut heads, mut body) = handle.into_parts();
        assert_eq!(heads.next().await.unwrap().unwrap().status, 200);
        assert!(matches!(
            heads.next().await,
            Some(Err(TransportError::Aborted { state: State::HeadReceived, .. }))
        ));
        assert!(matches!(body.next().await, Some(Err(TransportError::Aborted { .. }))));
    }

    #[tokio::test]
    async fn test_failure_reaches_heads_and_body() {
        let (mut driver, handle) = RequestDriver::new(&TransportOptions::default());
        driver.part_sent(4);
        driver.request_failed(TransportError::transport("connection reset"));

        assert_eq!(driver.state(), State::Failed);
        let (upload, mut heads, mut body) = handle.into_parts();
        assert_eq!(upload.values(), vec![4]);
        assert!(upload.is_terminated());
        assert!(matches!(heads.next().await, Some(Err(TransportError::Transport(_)))));
        assert!(matches!(body.next().await, Some(Err(TransportError::Transport(_)))));
    }

    #[test]
    fn test_failure_after_end_is_a_violation() {
        let (mut driver, _handle) =
            RequestDriver::with_handler(&TransportOptions::default(), Record::default());
        let _ = driver.head_received(head(204));
        driver.request_finished();
        driver.request_failed(TransportError::Cancelled);

        assert_eq!(driver.state(), State::End);
        let violation = &driver.handler().0[0];
        assert_eq!(violation.callback, Callback::RequestFailed);
        assert!(matches!(violation.cause, Some(TransportError::Cancelled)));
    }

    #[test]
    fn test_repeated_finish_is_harmless() {
        let (mut driver, _handle) = RequestDriver::new(&TransportOptions::default());
        let _ = driver.head_received(head(200));
        driver.request_finished();
        driver.request_finished();
        assert_eq!(driver.state(), State::End);
    }

    #[tokio::test]
    async fn test_continuation_waits_for_consumer() {
        let options = TransportOptions::default().high_water_mark(2);
        let (mut driver, handle) = RequestDriver::new(&options);
        let (_, _heads, mut body) = handle.into_parts();

        assert!(driver.head_received(head(200)).is_ready());
        assert!(driver.body_part_received(Bytes::from_static(b"a")).is_ready());
        let pending = driver.body_part_received(Bytes::from_static(b"b"));
        assert!(!pending.is_ready());

        let waiter = tokio::spawn(pending);
        body.next().await.unwrap().unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
