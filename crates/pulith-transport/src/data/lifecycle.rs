use std::fmt;

use crate::error::TransportError;

/// Progress of a request through its transport callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// No callback observed yet.
    #[default]
    Idle,
    /// At least one body part has been handed to the transport.
    Uploading,
    /// A response head arrived; no body part yet.
    HeadReceived,
    /// Body parts are arriving.
    Downloading,
    /// The transport reported completion.
    End,
    /// The transport reported failure, or the request was aborted.
    Failed,
}

impl State {
    pub fn is_terminal(self) -> bool { matches!(self, State::End | State::Failed) }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Idle => write!(f, "idle"),
            State::Uploading => write!(f, "uploading"),
            State::HeadReceived => write!(f, "head-received"),
            State::Downloading => write!(f, "downloading"),
            State::End => write!(f, "end"),
            State::Failed => write!(f, "failed"),
        }
    }
}

/// Which direction of the exchange the request is in. Switches from
/// `Upload` to `Download` exactly once, on the first response head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Upload,
    Download,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Upload => write!(f, "upload"),
            Phase::Download => write!(f, "download"),
        }
    }
}

/// The transport callbacks a request delegate receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callback {
    PartSent,
    RequestSent,
    HeadReceived,
    BodyPartReceived,
    RequestFinished,
    RequestFailed,
}

impl fmt::Display for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::PartSent => write!(f, "part-sent"),
            Callback::RequestSent => write!(f, "request-sent"),
            Callback::HeadReceived => write!(f, "head-received"),
            Callback::BodyPartReceived => write!(f, "body-part-received"),
            Callback::RequestFinished => write!(f, "request-finished"),
            Callback::RequestFailed => write!(f, "request-failed"),
        }
    }
}

/// One event of a broadcast stream, as seen by a callback observer.
///
/// `Failure` and `End` are terminal: an observer sees exactly one of them,
/// last.
#[derive(Debug, Clone)]
pub enum StreamEvent<T> {
    Value(T),
    Failure(TransportError),
    End,
}

impl<T> StreamEvent<T> {
    pub fn is_terminal(&self) -> bool { !matches!(self, StreamEvent::Value(_)) }
}
