//! lockgraph - Monitor contention aggregation for profiler event streams
//!
//! Decodes the binary event buffers a profiling agent emits while it
//! watches monitor (lock) acquisition, pairs each blocked entry with its
//! exit, and aggregates who waited on whom, for how long, and on which
//! monitor. Aggregates are exposed as immutable snapshots and browsed
//! through a lazily expanded tree.
//!
//! ```text
//! bytes ─▶ FrameDecoder ─▶ TraceEvent ─▶ ContentionGraph ─▶ ContentionSnapshot ─▶ LockNode
//!                           (EventSink)   (inside Session)
//! ```

pub mod builder;
pub mod cli;
pub mod config;
pub mod decoder;
pub mod decoder_thread;
pub mod encoder;
pub mod error;
pub mod registry;
pub mod report;
pub mod session;
pub mod snapshot;
pub mod tree;
pub mod wire;
