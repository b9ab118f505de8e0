//! Error types for the daemon.

use doech_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("monitor loop is not running")]
    LoopClosed,

    #[error("monitor loop dropped the reply")]
    ReplyDropped,

    #[error("stream io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}
