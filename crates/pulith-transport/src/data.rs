pub mod head;
pub mod lifecycle;
pub mod mode;
pub mod options;

pub use head::{ResponseHead, Version};
pub use lifecycle::{Callback, Phase, State, StreamEvent};
pub use mode::ReadingMode;
pub use options::TransportOptions;
