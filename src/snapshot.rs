//! Immutable deep copies of the contention registries
//!
//! A [`ContentionSnapshot`] owns plain vectors copied out of the live
//! registries. Nothing in here refers back to live state and there are no
//! mutating methods, so later events cannot change a snapshot once taken.

use crate::registry::{
    ContentionDetail, MonitorId, MonitorInfo, MonitorInfos, ThreadId, ThreadInfo, ThreadInfos,
};
use fnv::FnvHashMap;

/// What an aggregate is keyed by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Subject {
    Thread(ThreadId),
    Monitor(MonitorId),
}

/// Wait time and count against one peer thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAggregate {
    thread: ThreadId,
    name: String,
    wait_time: u64,
    wait_count: u64,
}

impl PeerAggregate {
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn wait_time(&self) -> u64 {
        self.wait_time
    }

    pub fn wait_count(&self) -> u64 {
        self.wait_count
    }
}

/// Wait time and count for one subject, split by peer thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    subject: Subject,
    name: String,
    wait_time: u64,
    wait_count: u64,
    peers: Vec<PeerAggregate>,
}

impl Aggregate {
    pub fn subject(&self) -> Subject {
        self.subject
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn wait_time(&self) -> u64 {
        self.wait_time
    }

    pub fn wait_count(&self) -> u64 {
        self.wait_count
    }

    pub fn peers(&self) -> &[PeerAggregate] {
        &self.peers
    }

    /// The peer entry for `thread`, if it was on the other side of any wait
    pub fn peer(&self, thread: ThreadId) -> Option<&PeerAggregate> {
        self.peers.iter().find(|p| p.thread == thread)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSnapshot {
    id: ThreadId,
    name: String,
    class_name: String,
    waited: Vec<Aggregate>,
    owned: Vec<Aggregate>,
}

impl ThreadSnapshot {
    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Monitors this thread waited on (peers: owners)
    pub fn waited(&self) -> &[Aggregate] {
        &self.waited
    }

    /// Monitors this thread owned while others waited (peers: waiters)
    pub fn owned(&self) -> &[Aggregate] {
        &self.owned
    }

    pub fn waited_on(&self, monitor: MonitorId) -> Option<&Aggregate> {
        find(&self.waited, Subject::Monitor(monitor))
    }

    pub fn owned_monitor(&self, monitor: MonitorId) -> Option<&Aggregate> {
        find(&self.owned, Subject::Monitor(monitor))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSnapshot {
    id: MonitorId,
    class_name: String,
    waiters: Vec<Aggregate>,
    owners: Vec<Aggregate>,
}

impl MonitorSnapshot {
    pub fn id(&self) -> MonitorId {
        self.id
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn display_name(&self) -> String {
        monitor_name(&self.class_name, self.id)
    }

    /// Threads that waited on this monitor (peers: owners)
    pub fn waiters(&self) -> &[Aggregate] {
        &self.waiters
    }

    /// Threads that owned this monitor while others waited (peers: waiters)
    pub fn owners(&self) -> &[Aggregate] {
        &self.owners
    }

    pub fn waiter(&self, thread: ThreadId) -> Option<&Aggregate> {
        find(&self.waiters, Subject::Thread(thread))
    }

    pub fn owner(&self, thread: ThreadId) -> Option<&Aggregate> {
        find(&self.owners, Subject::Thread(thread))
    }
}

/// Point-in-time view of every contended thread and monitor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentionSnapshot {
    threads: Vec<ThreadSnapshot>,
    monitors: Vec<MonitorSnapshot>,
}

impl ContentionSnapshot {
    /// Deep-copy the live registries
    ///
    /// Only threads and monitors with at least one aggregate are kept. Open
    /// episodes are not part of the copy.
    pub(crate) fn capture(threads: &ThreadInfos, monitors: &MonitorInfos) -> Self {
        let thread_names: FnvHashMap<ThreadId, &str> =
            threads.iter().map(|t| (t.id, t.name.as_str())).collect();
        let monitor_names: FnvHashMap<MonitorId, String> = monitors
            .iter()
            .map(|m| (m.id, monitor_name(&m.class_name, m.id)))
            .collect();

        let mut thread_snaps: Vec<ThreadSnapshot> = threads
            .iter()
            .filter(|t| t.has_contention())
            .map(|t| copy_thread(t, &thread_names, &monitor_names))
            .collect();
        thread_snaps.sort_by_key(|t| t.id);

        let mut monitor_snaps: Vec<MonitorSnapshot> = monitors
            .iter()
            .filter(|m| m.has_contention())
            .map(|m| copy_monitor(m, &thread_names))
            .collect();
        monitor_snaps.sort_by_key(|m| m.id);

        Self {
            threads: thread_snaps,
            monitors: monitor_snaps,
        }
    }

    pub fn threads(&self) -> &[ThreadSnapshot] {
        &self.threads
    }

    pub fn monitors(&self) -> &[MonitorSnapshot] {
        &self.monitors
    }

    pub fn thread(&self, id: ThreadId) -> Option<&ThreadSnapshot> {
        self.threads
            .binary_search_by_key(&id, |t| t.id)
            .ok()
            .map(|i| &self.threads[i])
    }

    pub fn monitor(&self, id: MonitorId) -> Option<&MonitorSnapshot> {
        self.monitors
            .binary_search_by_key(&id, |m| m.id)
            .ok()
            .map(|i| &self.monitors[i])
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty() && self.monitors.is_empty()
    }

    /// Sum of wait time over every thread's wait side
    pub fn total_wait_time(&self) -> u64 {
        self.threads
            .iter()
            .flat_map(|t| t.waited.iter())
            .map(|a| a.wait_time)
            .sum()
    }
}

fn monitor_name(class_name: &str, id: MonitorId) -> String {
    format!("{}@{:x}", class_name, id)
}

fn thread_name(names: &FnvHashMap<ThreadId, &str>, id: ThreadId) -> String {
    names
        .get(&id)
        .map(|n| (*n).to_string())
        .unwrap_or_else(|| format!("Thread {}", id))
}

fn find(aggregates: &[Aggregate], subject: Subject) -> Option<&Aggregate> {
    aggregates.iter().find(|a| a.subject == subject)
}

fn copy_table<K: Copy>(
    table: &FnvHashMap<K, ContentionDetail>,
    subject: impl Fn(K) -> Subject,
    name: impl Fn(K) -> String,
    thread_names: &FnvHashMap<ThreadId, &str>,
) -> Vec<Aggregate> {
    let mut aggregates: Vec<Aggregate> = table
        .iter()
        .map(|(&key, detail)| {
            let mut peers: Vec<PeerAggregate> = detail
                .peers
                .iter()
                .map(|(&thread, tally)| PeerAggregate {
                    thread,
                    name: thread_name(thread_names, thread),
                    wait_time: tally.wait_time,
                    wait_count: tally.wait_count,
                })
                .collect();
            peers.sort_by(|a, b| b.wait_time.cmp(&a.wait_time).then(a.thread.cmp(&b.thread)));

            Aggregate {
                subject: subject(key),
                name: name(key),
                wait_time: detail.tally.wait_time,
                wait_count: detail.tally.wait_count,
                peers,
            }
        })
        .collect();
    aggregates.sort_by(|a, b| b.wait_time.cmp(&a.wait_time).then(a.subject.cmp(&b.subject)));
    aggregates
}

fn copy_thread(
    thread: &ThreadInfo,
    thread_names: &FnvHashMap<ThreadId, &str>,
    monitor_names: &FnvHashMap<MonitorId, String>,
) -> ThreadSnapshot {
    let name_of = |id: MonitorId| {
        monitor_names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| monitor_name(crate::registry::UNKNOWN_CLASS, id))
    };

    ThreadSnapshot {
        id: thread.id,
        name: thread.name.clone(),
        class_name: thread.class_name.clone(),
        waited: copy_table(&thread.wait_monitors, Subject::Monitor, name_of, thread_names),
        owned: copy_table(&thread.owner_monitors, Subject::Monitor, name_of, thread_names),
    }
}

fn copy_monitor(monitor: &MonitorInfo, thread_names: &FnvHashMap<ThreadId, &str>) -> MonitorSnapshot {
    let name_of = |id: ThreadId| thread_name(thread_names, id);

    MonitorSnapshot {
        id: monitor.id,
        class_name: monitor.class_name.clone(),
        waiters: copy_table(&monitor.wait_threads, Subject::Thread, name_of, thread_names),
        owners: copy_table(&monitor.owner_threads, Subject::Thread, name_of, thread_names),
    }
}
