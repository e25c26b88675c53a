//! Error types for trace decoding and contention aggregation
//!
//! Two layers, mirroring how the stream fails in practice:
//! - [`FrameError`]: the bytes of one buffer cannot be decoded any further
//!   (unknown tag, truncated frame). Non-fatal; the buffer is abandoned.
//! - [`TraceError`]: the event stream itself is inconsistent, or the session
//!   can no longer accept input. Fatal to the decode session.

use crate::registry::{MonitorId, ThreadId};
use thiserror::Error;

/// Reasons a buffer stops decoding before its end
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Unknown event tag {tag} at offset {offset}")]
    UnknownTag { tag: u8, offset: usize },

    #[error("Truncated {event} frame at offset {offset}: need {needed} more bytes, {available} left")]
    Truncated {
        event: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },
}

/// Why an event contradicts the open-episode state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Desync {
    /// Entry while the thread already waits on a monitor
    EntryWhileOpen {
        open_monitor: MonitorId,
        new_monitor: MonitorId,
    },
    /// Exit with no open episode on the thread
    ExitWithoutEntry { monitor: MonitorId },
    /// Exit naming a different monitor than the open episode
    ExitMismatch {
        open_monitor: MonitorId,
        exit_monitor: MonitorId,
    },
}

impl std::fmt::Display for Desync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Desync::EntryWhileOpen {
                open_monitor,
                new_monitor,
            } => write!(
                f,
                "entry on monitor {} while already waiting on monitor {}",
                new_monitor, open_monitor
            ),
            Desync::ExitWithoutEntry { monitor } => {
                write!(f, "exit from monitor {} without a matching entry", monitor)
            }
            Desync::ExitMismatch {
                open_monitor,
                exit_monitor,
            } => write!(
                f,
                "exit from monitor {} while waiting on monitor {}",
                exit_monitor, open_monitor
            ),
        }
    }
}

/// Errors that end a decode session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TraceError {
    #[error("Inconsistent trace on thread {thread}: {reason}")]
    InconsistentTrace { thread: ThreadId, reason: Desync },

    #[error("Session rejected buffer after an earlier inconsistent trace; reset required")]
    Poisoned,

    #[error("Session has been shut down")]
    ShutDown,

    #[error("Decoder thread is no longer running")]
    DecoderGone,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result type for trace operations
pub type Result<T> = std::result::Result<T, TraceError>;
