pub mod builder;
pub mod message;

pub use builder::{build, FrameError, FramePolicy};
pub use message::{Frame, RawId, TraceRecord};
