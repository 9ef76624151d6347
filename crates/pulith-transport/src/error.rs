//! Error types for pulith-transport.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::data::{Callback, Phase, State};

/// Terminal failure delivered on the outward streams of a request.
///
/// `Clone` so that a single failure can reach every observer of a
/// multicast stream.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("transport failed: {0}")]
    Transport(String),

    #[error("request aborted in state {state} during {phase} phase")]
    Aborted { state: State, phase: Phase },

    #[error("request cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[source] Arc<io::Error>),
}

impl TransportError {
    pub fn transport(message: impl std::fmt::Display) -> Self { Self::Transport(message.to_string()) }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self { TransportError::Io(Arc::new(e)) }
}

/// Cursor moves that would break `reader <= writer <= written`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("reader index {to} is past writer index {writer}")]
    ReaderPastWriter { to: usize, writer: usize },

    #[error("writer index {to} is before reader index {reader}")]
    WriterBeforeReader { to: usize, reader: usize },

    #[error("writer index {to} is past the {written} written bytes")]
    WriterPastEnd { to: usize, written: usize },
}

/// A transport callback arrived in a `(state, phase)` pair that does not
/// allow it. This is a defect in the transport integration, not a network
/// error, and is handed to a [`ViolationHandler`](crate::ViolationHandler)
/// rather than returned.
#[derive(Debug, Clone, Error)]
#[error("{callback} is illegal in state {state} during {phase} phase")]
pub struct ProtocolViolation {
    pub callback: Callback,
    pub state:    State,
    pub phase:    Phase,
    /// The failure carried by the offending callback, if any.
    pub cause:    Option<TransportError>,
}

pub type Result<T> = std::result::Result<T, TransportError>;
