pub mod chunking;
pub mod framing;
pub mod lifecycle;

pub use chunking::{DEFAULT_MAX_CHUNK_SIZE, DEFAULT_MIN_CHUNK_SIZE, default_chunk_size};
pub use framing::Framer;
pub use lifecycle::transition;
