//! doech-daemon: async host for the doech monitor.
//! Feeds host events from channels and NDJSON streams into a single event
//! loop, runs security lookups off the loop, sweeps expired observations and
//! pushes sink messages to subscribers.

pub mod error;
pub mod handle;
pub mod lookup;
mod ndjson;
pub mod orchestrator;
pub mod sink;
pub mod sources;

pub use doech_core::{protocol, types};
pub use error::DaemonError;
pub use handle::MonitorHandle;
pub use orchestrator::Orchestrator;
