//! Host event sources feeding the orchestrator.

pub mod stream;

pub use stream::{HostStreamSource, StreamStats};
