pub mod buffer;
pub mod delegate;
pub mod encoder;
pub mod mirror;
pub mod reassembler;
pub mod stream;
pub mod upload;

pub use buffer::{Buffer, FileBuffer, MemoryBuffer};
pub use delegate::{
    BodyStream, Continuation, PanicOnViolation, RequestDriver, RequestHandle, ResponseEvent,
    TransportDelegate, ViolationHandler,
};
pub use encoder::{ChunkedBody, Chunks};
pub use mirror::CacheMirror;
pub use reassembler::Reassembler;
pub use stream::{Multicast, Queue, QueueReader, Subscription};
pub use upload::{BodyWriter, write_body};
