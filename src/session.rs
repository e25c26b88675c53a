//! Profiling session: the transactional gate around the contention graph
//!
//! The session owns the live [`ContentionGraph`] outright. Every access goes
//! through one transaction (a mutex):
//!
//! ```text
//!  decoder thread                         UI / reporting thread
//!  ──────────────                         ─────────────────────
//!  start_batch()   ─┐
//!  process_buffer() ├─ one transaction    snapshot() ─ one transaction,
//!  process_buffer() │  per call           held only for the deep copy
//!  stop_batch()    ─┘
//!                                         reset() ─ try only; dropped if
//!                                                   the gate is busy
//! ```
//!
//! A buffer is decoded to completion inside its transaction, so a snapshot
//! never sees half a buffer. Session-control resets never wait: a reset that
//! finds the gate busy is dropped and counted, favoring decoder throughput
//! over reset precision. Callers are not expected to retry.

use crate::builder::{BuilderStats, ContentionGraph};
use crate::config::{LockgraphConfig, TreeConfig};
use crate::decoder::{DecodeSummary, FrameDecoder};
use crate::error::{Result, TraceError};
use crate::snapshot::ContentionSnapshot;
use crate::tree::LockNode;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// Session-level counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub batches: u64,
    pub buffers: u64,
    /// Buffers that stopped on an unknown tag or truncated frame
    pub abandoned_buffers: u64,
    pub resets_applied: u64,
    pub resets_dropped: u64,
    pub snapshots: u64,
    pub builder: BuilderStats,
}

#[derive(Debug, Default)]
struct State {
    graph: ContentionGraph,
    batch_active: bool,
    poisoned: bool,
    shut_down: bool,
    batches: u64,
    buffers: u64,
    abandoned_buffers: u64,
    resets_applied: u64,
    snapshots: u64,
    batch_frames: usize,
}

/// Owner of the live registries for one profiling session
#[derive(Debug)]
pub struct Session {
    decoder: FrameDecoder,
    tree: TreeConfig,
    state: Mutex<State>,
    resets_dropped: AtomicU64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(&LockgraphConfig::default())
    }
}

impl Session {
    pub fn new(config: &LockgraphConfig) -> Self {
        Self {
            decoder: FrameDecoder::new(config.decoder),
            tree: config.tree,
            state: Mutex::new(State::default()),
            resets_dropped: AtomicU64::new(0),
        }
    }

    /// Open a batch of buffers
    pub fn start_batch(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.shut_down {
            return Err(TraceError::ShutDown);
        }
        state.batch_active = true;
        state.batches += 1;
        state.batch_frames = 0;
        debug!("Batch {} started", state.batches);
        Ok(())
    }

    /// Close the current batch
    pub fn stop_batch(&self) {
        let mut state = self.state.lock();
        if state.batch_active {
            debug!(
                "Batch {} stopped after {} frames",
                state.batches, state.batch_frames
            );
        }
        state.batch_active = false;
    }

    pub fn is_batch_active(&self) -> bool {
        self.state.lock().batch_active
    }

    /// Decode one buffer into the graph
    ///
    /// Buffers must be supplied in delivery order. A buffer that stops on a
    /// bad frame is still `Ok`; see [`DecodeSummary::stopped`].
    ///
    /// # Errors
    ///
    /// - [`TraceError::InconsistentTrace`] when the stream desyncs; the
    ///   session is poisoned until the next applied [`Session::reset`]
    /// - [`TraceError::Poisoned`] for buffers after such an error
    /// - [`TraceError::ShutDown`] after [`Session::shutdown`]
    pub fn process_buffer(&self, buf: &[u8]) -> Result<DecodeSummary> {
        let mut state = self.state.lock();
        if state.shut_down {
            return Err(TraceError::ShutDown);
        }
        if state.poisoned {
            return Err(TraceError::Poisoned);
        }

        state.buffers += 1;
        match self.decoder.decode(buf, &mut state.graph) {
            Ok(summary) => {
                state.batch_frames += summary.frames;
                if !summary.is_complete() {
                    state.abandoned_buffers += 1;
                }
                Ok(summary)
            }
            Err(err) => {
                error!("Stopping aggregation for this session: {}", err);
                state.poisoned = true;
                Err(err)
            }
        }
    }

    pub fn is_poisoned(&self) -> bool {
        self.state.lock().poisoned
    }

    /// Clear all registries, unless the gate is busy
    ///
    /// Returns `false` when the reset was dropped because a snapshot or a
    /// buffer decode held the transaction. A dropped reset is not queued.
    pub fn reset(&self) -> bool {
        let Some(mut state) = self.state.try_lock() else {
            self.resets_dropped.fetch_add(1, Ordering::Relaxed);
            debug!("Reset dropped: transaction in progress");
            return false;
        };

        if state.shut_down {
            return false;
        }
        state.graph.clear();
        state.poisoned = false;
        state.resets_applied += 1;
        debug!("Session reset");
        true
    }

    /// Terminal: drop all state and refuse further input
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.graph = ContentionGraph::new();
        state.batch_active = false;
        state.shut_down = true;
        debug!("Session shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().shut_down
    }

    /// Deep copy of the current aggregates
    ///
    /// Blocks only while the copy is made.
    pub fn snapshot(&self) -> ContentionSnapshot {
        let mut state = self.state.lock();
        state.snapshots += 1;
        state.graph.snapshot()
    }

    /// Root of a lazy presentation tree over a fresh snapshot
    pub fn root_node(&self) -> LockNode {
        LockNode::root(Arc::new(self.snapshot()), self.tree)
    }

    /// Hold the transaction for read access to the live graph
    ///
    /// While the returned guard lives, buffers, snapshots and batch marks
    /// wait and resets are dropped.
    pub fn begin_transaction(&self) -> Transaction<'_> {
        Transaction {
            state: self.state.lock(),
        }
    }

    pub fn stats(&self) -> SessionStats {
        let state = self.state.lock();
        SessionStats {
            batches: state.batches,
            buffers: state.buffers,
            abandoned_buffers: state.abandoned_buffers,
            resets_applied: state.resets_applied,
            resets_dropped: self.resets_dropped.load(Ordering::Relaxed),
            snapshots: state.snapshots,
            builder: state.graph.stats(),
        }
    }
}

/// Exclusive, read-only hold on the session's live graph
pub struct Transaction<'a> {
    state: MutexGuard<'a, State>,
}

impl std::ops::Deref for Transaction<'_> {
    type Target = ContentionGraph;

    fn deref(&self) -> &ContentionGraph {
        &self.state.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::FrameEncoder;

    fn contended_buffer() -> Vec<u8> {
        let mut enc = FrameEncoder::default();
        enc.new_thread(1, "T1", "")
            .new_thread(2, "T2", "")
            .new_monitor(9, "java.lang.Object")
            .set_current_thread(1)
            .monitor_entry(100, 9, 2)
            .monitor_exit(150, 9);
        enc.into_bytes()
    }

    #[test]
    fn test_batch_bracket() {
        let session = Session::default();
        session.start_batch().unwrap();
        assert!(session.is_batch_active());
        session.process_buffer(&contended_buffer()).unwrap();
        session.stop_batch();
        assert!(!session.is_batch_active());

        let stats = session.stats();
        assert_eq!(stats.batches, 1);
        assert_eq!(stats.buffers, 1);
        assert_eq!(stats.builder.episodes_closed, 1);
    }

    #[test]
    fn test_reset_applied_when_idle() {
        let session = Session::default();
        session.process_buffer(&contended_buffer()).unwrap();
        assert!(session.reset());
        assert!(session.snapshot().is_empty());
        assert_eq!(session.stats().resets_applied, 1);
    }

    #[test]
    fn test_reset_dropped_while_transaction_held() {
        let session = Session::default();
        session.process_buffer(&contended_buffer()).unwrap();

        let txn = session.begin_transaction();
        assert_eq!(txn.open_episode(1), None);
        assert!(!session.reset());
        drop(txn);

        assert!(!session.snapshot().is_empty());
        let stats = session.stats();
        assert_eq!(stats.resets_dropped, 1);
        assert_eq!(stats.resets_applied, 0);
    }

    #[test]
    fn test_desync_poisons_until_reset() {
        let session = Session::default();
        let mut enc = FrameEncoder::default();
        enc.new_thread(1, "T1", "")
            .set_current_thread(1)
            .monitor_exit(10, 3);
        let err = session.process_buffer(enc.as_bytes()).unwrap_err();
        assert!(matches!(err, TraceError::InconsistentTrace { thread: 1, .. }));
        assert!(session.is_poisoned());

        assert_eq!(
            session.process_buffer(&contended_buffer()),
            Err(TraceError::Poisoned)
        );

        assert!(session.reset());
        assert!(!session.is_poisoned());
        session.process_buffer(&contended_buffer()).unwrap();
        assert_eq!(session.snapshot().total_wait_time(), 50);
    }

    #[test]
    fn test_shutdown_is_terminal() {
        let session = Session::default();
        session.process_buffer(&contended_buffer()).unwrap();
        session.shutdown();

        assert!(session.is_shut_down());
        assert!(session.snapshot().is_empty());
        assert_eq!(session.start_batch(), Err(TraceError::ShutDown));
        assert_eq!(
            session.process_buffer(&contended_buffer()),
            Err(TraceError::ShutDown)
        );
        assert!(!session.reset());
    }

    #[test]
    fn test_abandoned_buffer_counted() {
        let session = Session::default();
        let mut enc = FrameEncoder::default();
        enc.set_current_thread(1).raw(&[0xEE, 1, 2, 3]);
        let summary = session.process_buffer(enc.as_bytes()).unwrap();
        assert_eq!(summary.frames, 1);
        assert!(!summary.is_complete());
        assert_eq!(session.stats().abandoned_buffers, 1);
        assert!(!session.is_poisoned());
    }

    #[test]
    fn test_root_node_wraps_snapshot() {
        let session = Session::default();
        session.process_buffer(&contended_buffer()).unwrap();
        let root = session.root_node();
        assert_eq!(root.children().len(), 3);
        assert_eq!(session.stats().snapshots, 1);
    }
}
