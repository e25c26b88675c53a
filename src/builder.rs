//! Contention graph builder: the event-driven state machine
//!
//! Every monitor wait is an *episode*:
//!
//! ```text
//!   METHOD_ENTRY_MONITOR(t0, M, owner O)      METHOD_EXIT_MONITOR(t1, M)
//!              │                                        │
//!   thread T ──┼──────────── waiting on M ──────────────┼──▶
//!              │         ADJUST_TIME shifts t0          │
//!              ▼                                        ▼
//!     open on T and on M                  wait = t1 - t0 added to
//!                                           T.wait_monitors[M]  (peer O)
//!                                           O.owner_monitors[M] (peer T)
//!                                           M.wait_threads[T]   (peer O)
//!                                           M.owner_threads[O]  (peer T)
//! ```
//!
//! A thread has at most one open episode. Entry while one is open, or an
//! exit that does not match the open one, means the stream is out of sync
//! and is reported as [`TraceError::InconsistentTrace`]. Handlers validate
//! before mutating, so a rejected event leaves every aggregate untouched.
//!
//! Events addressed to a thread the session has not registered yet are
//! dropped: the agent starts streaming before every thread is announced.
//! The monitor of such a dropped entry is remembered per thread id, so the
//! matching exit is dropped too even if NEW_THREAD arrives in between.

use crate::decoder::{route, EventSink, TraceEvent};
use crate::error::{Desync, Result, TraceError};
use crate::registry::{MonitorId, MonitorInfos, OpenEpisode, OpenWait, ThreadId, ThreadInfos};
use crate::snapshot::ContentionSnapshot;
use crate::wire::Timestamps;
use fnv::FnvHashMap;
use tracing::{debug, error, trace};

/// Counters describing what the builder has seen since creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuilderStats {
    /// Events dispatched to the builder
    pub frames: u64,
    pub episodes_opened: u64,
    pub episodes_closed: u64,
    /// Events addressed to unknown threads, the exits of dropped entries,
    /// or thread ids the wire format cannot carry
    pub dropped_events: u64,
    pub point_hits: u64,
    /// RESET frames and applied session resets
    pub resets: u64,
}

/// Live contention graph
#[derive(Debug, Default)]
pub struct ContentionGraph {
    threads: ThreadInfos,
    monitors: MonitorInfos,
    current_thread: Option<ThreadId>,
    /// Entries dropped while their thread was unregistered, by thread id
    pending_skips: FnvHashMap<ThreadId, MonitorId>,
    stats: BuilderStats,
}

impl ContentionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> BuilderStats {
        self.stats
    }

    pub fn current_thread(&self) -> Option<ThreadId> {
        self.current_thread
    }

    /// Number of registered threads (contended or not)
    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Number of known monitors (contended or not)
    pub fn monitor_count(&self) -> usize {
        self.monitors.len()
    }

    /// Monitor the thread is currently waiting on
    pub fn open_episode(&self, thread: ThreadId) -> Option<MonitorId> {
        self.threads
            .get(thread)
            .and_then(|t| t.open)
            .map(|ep| ep.monitor)
    }

    /// Threads with an in-flight wait on `monitor`
    pub fn open_waiters(&self, monitor: MonitorId) -> Vec<ThreadId> {
        let mut waiters: Vec<ThreadId> = self
            .monitors
            .get(monitor)
            .map(|m| m.open_threads.keys().copied().collect())
            .unwrap_or_default();
        waiters.sort_unstable();
        waiters
    }

    /// Deep copy of all aggregates
    pub fn snapshot(&self) -> ContentionSnapshot {
        ContentionSnapshot::capture(&self.threads, &self.monitors)
    }

    /// Forget every thread, monitor and open episode
    pub fn clear(&mut self) {
        self.threads.clear();
        self.monitors.clear();
        self.current_thread = None;
        self.pending_skips.clear();
        self.stats.resets += 1;
    }

    /// The current thread, if it is registered
    fn ready_thread(&mut self, event: &'static str) -> Option<ThreadId> {
        match self.current_thread {
            Some(id) if self.threads.contains(id) => Some(id),
            other => {
                debug!("Dropping {} for unregistered thread {:?}", event, other);
                self.stats.dropped_events += 1;
                None
            }
        }
    }
}

impl EventSink for ContentionGraph {
    fn reset(&mut self) -> Result<()> {
        debug!(
            "Resetting contention graph ({} threads, {} monitors)",
            self.threads.len(),
            self.monitors.len()
        );
        self.clear();
        Ok(())
    }

    fn profile_point_hit(&mut self, point: u16, _timestamp: Timestamps, thread: ThreadId) -> Result<()> {
        trace!("Profile point {} hit on thread {}", point, thread);
        self.stats.point_hits += 1;
        Ok(())
    }

    fn set_current_thread(&mut self, thread: ThreadId) -> Result<()> {
        self.current_thread = Some(thread);
        Ok(())
    }

    fn new_thread(&mut self, thread: ThreadId, name: String, class_name: String) -> Result<()> {
        trace!("New thread {} '{}' ({})", thread, name, class_name);
        if !self.threads.new_thread(thread, name, class_name) {
            debug!("Dropping thread {}: id out of range", thread);
            self.stats.dropped_events += 1;
            return Ok(());
        }
        if let Some(monitor) = self.pending_skips.remove(&thread) {
            if let Some(t) = self.threads.get_mut(thread).filter(|t| t.open.is_none()) {
                t.skipped = Some(monitor);
            }
        }
        Ok(())
    }

    fn new_monitor(&mut self, monitor: MonitorId, class_name: String) -> Result<()> {
        trace!("New monitor {} ({})", monitor, class_name);
        self.monitors.new_monitor(monitor, class_name);
        Ok(())
    }

    fn monitor_entry(&mut self, timestamp: Timestamps, monitor: MonitorId, owner: i32) -> Result<()> {
        let Some(thread) = self.ready_thread("monitor entry") else {
            if let Some(id) = self.current_thread {
                self.pending_skips.insert(id, monitor);
            }
            return Ok(());
        };

        // A skipped entry still holds the thread until its exit arrives
        let in_flight = self
            .threads
            .get(thread)
            .and_then(|t| t.open.map(|ep| ep.monitor).or(t.skipped));
        if let Some(open_monitor) = in_flight {
            let reason = Desync::EntryWhileOpen {
                open_monitor,
                new_monitor: monitor,
            };
            error!("Inconsistent trace on thread {}: {}", thread, reason);
            return Err(TraceError::InconsistentTrace { thread, reason });
        }

        let owner = match ThreadId::try_from(owner) {
            Ok(owner) if self.threads.contains(owner) => owner,
            _ => {
                debug!(
                    "Dropping entry of thread {} on monitor {}: owner {} not registered",
                    thread, monitor, owner
                );
                if let Some(t) = self.threads.get_mut(thread) {
                    t.skipped = Some(monitor);
                }
                self.stats.dropped_events += 1;
                return Ok(());
            }
        };

        let start = timestamp.wall;
        if let Some(t) = self.threads.get_mut(thread) {
            t.skipped = None;
            t.open = Some(OpenEpisode {
                monitor,
                owner,
                start,
            });
        }
        self.monitors
            .get_or_unknown(monitor)
            .open_threads
            .insert(thread, OpenWait { owner, start });

        trace!(
            "Thread {} waits on monitor {} owned by {} since {}",
            thread,
            monitor,
            owner,
            start
        );
        self.stats.episodes_opened += 1;
        Ok(())
    }

    fn monitor_exit(&mut self, timestamp: Timestamps, monitor: MonitorId) -> Result<()> {
        let Some(thread) = self.ready_thread("monitor exit") else {
            if let Some(id) = self.current_thread {
                if self.pending_skips.get(&id) == Some(&monitor) {
                    self.pending_skips.remove(&id);
                }
            }
            return Ok(());
        };

        let Some(info) = self.threads.get_mut(thread) else {
            return Ok(());
        };

        let episode = match info.open {
            Some(ep) if ep.monitor == monitor => ep,
            Some(ep) => {
                let reason = Desync::ExitMismatch {
                    open_monitor: ep.monitor,
                    exit_monitor: monitor,
                };
                error!("Inconsistent trace on thread {}: {}", thread, reason);
                return Err(TraceError::InconsistentTrace { thread, reason });
            }
            None if info.skipped == Some(monitor) => {
                debug!(
                    "Dropping exit of thread {} from monitor {}: entry was dropped",
                    thread, monitor
                );
                info.skipped = None;
                self.stats.dropped_events += 1;
                return Ok(());
            }
            None => {
                let reason = Desync::ExitWithoutEntry { monitor };
                error!("Inconsistent trace on thread {}: {}", thread, reason);
                return Err(TraceError::InconsistentTrace { thread, reason });
            }
        };

        let wait = timestamp.wall.saturating_sub(episode.start);
        info.open = None;
        info.record_wait(monitor, episode.owner, wait);

        if let Some(owner) = self.threads.get_mut(episode.owner) {
            owner.record_owned(monitor, thread, wait);
        }

        let m = self.monitors.get_or_unknown(monitor);
        m.open_threads.remove(&thread);
        m.record_wait(thread, episode.owner, wait);

        trace!(
            "Thread {} acquired monitor {} after {} (owner {})",
            thread,
            monitor,
            wait,
            episode.owner
        );
        self.stats.episodes_closed += 1;
        Ok(())
    }

    fn adjust_time(&mut self, diff: Timestamps) -> Result<()> {
        let Some(thread) = self.ready_thread("time adjust") else {
            return Ok(());
        };

        let Some(episode) = self.threads.get_mut(thread).and_then(|t| t.open.as_mut()) else {
            return Ok(());
        };
        episode.start = episode.start.saturating_add(diff.wall);
        let monitor = episode.monitor;
        let start = episode.start;

        if let Some(open) = self
            .monitors
            .get_mut(monitor)
            .and_then(|m| m.open_threads.get_mut(&thread))
        {
            open.start = start;
        }
        Ok(())
    }

    fn dispatch(&mut self, event: TraceEvent) -> Result<()> {
        self.stats.frames += 1;
        route(self, event)
    }
}
