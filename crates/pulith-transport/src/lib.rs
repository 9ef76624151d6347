//! Request execution core for an HTTP client.
//!
//! Shapes outgoing bodies into chunks, checks transport callbacks against the
//! request lifecycle, regroups incoming bytes into records and publishes
//! everything on ordered streams. Socket, TLS and DNS work belong to the
//! engine driving the [`TransportDelegate`].
//!
//! # Architecture
//!
//! This crate follows the three-layer pattern:
//! - `data` - Immutable configuration and types
//! - `core` - Pure transformations: lifecycle table, chunk sizing, record framing
//! - `effects` - Buffers, streams and the delegate
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use pulith_transport::{
//!     ReadingMode, RequestDriver, ResponseHead, TransportDelegate, TransportOptions, Version,
//! };
//!
//! let options = TransportOptions::default().reading_mode(ReadingMode::lines());
//! let (mut driver, handle) = RequestDriver::new(&options);
//!
//! driver.request_sent();
//! let _ = driver.head_received(ResponseHead::new(200, Vec::new(), Version::HTTP_11));
//! let _ = driver.body_part_received(Bytes::from_static(b"one\ntw"));
//! let _ = driver.body_part_received(Bytes::from_static(b"o\n"));
//! driver.request_finished();
//!
//! let (_, _, mut body) = handle.into_parts();
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async move {
//! assert_eq!(body.next().await.unwrap().unwrap(), "one\n");
//! assert_eq!(body.next().await.unwrap().unwrap(), "two\n");
//! assert!(body.next().await.is_none());
//! # });
//! ```

mod core;
mod data;
mod effects;
mod error;

pub use core::{DEFAULT_MAX_CHUNK_SIZE, DEFAULT_MIN_CHUNK_SIZE, Framer, default_chunk_size, transition};
pub use data::options::DEFAULT_HIGH_WATER_MARK;
pub use data::{
    Callback, Phase, ReadingMode, ResponseHead, State, StreamEvent, TransportOptions, Version,
};
pub use effects::{
    BodyStream, BodyWriter, Buffer, CacheMirror, ChunkedBody, Chunks, Continuation, FileBuffer,
    MemoryBuffer, Multicast, PanicOnViolation, Queue, QueueReader, Reassembler, RequestDriver,
    RequestHandle, ResponseEvent, Subscription, TransportDelegate, ViolationHandler, write_body,
};
pub use error::{BufferError, ProtocolViolation, Result, TransportError};
