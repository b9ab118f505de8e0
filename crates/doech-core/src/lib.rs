//! doech-core: request correlation and ECH / private DNS aggregation.
//! Classifies per-tab network observations into navigation groups, finalizes
//! them once their security info is known, and keeps running summaries per
//! tab and for the whole process.
//!
//! Synchronous and IO-free: time is passed in by the caller.

pub mod aggregate;
pub mod config;
pub mod correlator;
pub mod error;
pub mod export;
pub mod lifecycle;
pub mod monitor;
pub mod protocol;
pub mod store;
pub mod types;

pub use config::MonitorConfig;
pub use error::CoreError;
pub use monitor::Monitor;
