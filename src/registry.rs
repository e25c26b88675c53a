//! Live identity registries for threads and monitors
//!
//! These types hold the mutable state the builder drives: identity, open
//! episodes and the four aggregation tables. They are crate-private on
//! purpose; readers only ever see the deep copies in [`crate::snapshot`].
//!
//! Threads live in a dense table indexed by id (ids are small and assigned
//! by the runtime agent in increasing order). Monitors are keyed by an
//! identity hash, so they live in a hash map.

use fnv::FnvHashMap;

/// Thread id as assigned by the runtime agent
pub type ThreadId = u32;

/// Largest thread id the wire format can carry
pub const MAX_THREAD_ID: ThreadId = u16::MAX as ThreadId;

/// Monitor id (identity hash of the runtime object)
pub type MonitorId = i32;

/// Class name for monitors referenced before NEW_MONITOR named them
pub const UNKNOWN_CLASS: &str = "unknown";

/// Accumulated wait time and number of waits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Tally {
    pub wait_time: u64,
    pub wait_count: u64,
}

impl Tally {
    fn add(&mut self, wait: u64) {
        self.wait_time = self.wait_time.saturating_add(wait);
        self.wait_count += 1;
    }
}

/// Aggregate for one (subject, key) pair, with the peers on the other side
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ContentionDetail {
    pub tally: Tally,
    pub peers: FnvHashMap<ThreadId, Tally>,
}

impl ContentionDetail {
    fn add(&mut self, peer: ThreadId, wait: u64) {
        self.tally.add(wait);
        self.peers.entry(peer).or_default().add(wait);
    }
}

/// The single in-flight wait of a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OpenEpisode {
    pub monitor: MonitorId,
    pub owner: ThreadId,
    pub start: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct ThreadInfo {
    pub id: ThreadId,
    pub name: String,
    pub class_name: String,
    /// Monitors this thread waited on, peers are the owners
    pub wait_monitors: FnvHashMap<MonitorId, ContentionDetail>,
    /// Monitors this thread owned while others waited, peers are the waiters
    pub owner_monitors: FnvHashMap<MonitorId, ContentionDetail>,
    pub open: Option<OpenEpisode>,
    /// Entry dropped because its owner was not registered yet
    pub skipped: Option<MonitorId>,
}

impl ThreadInfo {
    fn new(id: ThreadId, name: String, class_name: String) -> Self {
        Self {
            id,
            name,
            class_name,
            wait_monitors: FnvHashMap::default(),
            owner_monitors: FnvHashMap::default(),
            open: None,
            skipped: None,
        }
    }

    pub fn has_contention(&self) -> bool {
        !self.wait_monitors.is_empty() || !self.owner_monitors.is_empty()
    }

    pub fn record_wait(&mut self, monitor: MonitorId, owner: ThreadId, wait: u64) {
        self.wait_monitors.entry(monitor).or_default().add(owner, wait);
    }

    pub fn record_owned(&mut self, monitor: MonitorId, waiter: ThreadId, wait: u64) {
        self.owner_monitors.entry(monitor).or_default().add(waiter, wait);
    }
}

/// Dense, id-indexed thread table
#[derive(Debug, Clone, Default)]
pub(crate) struct ThreadInfos {
    threads: Vec<Option<ThreadInfo>>,
}

impl ThreadInfos {
    /// Register a thread, growing the table to fit `id`
    ///
    /// An existing entry keeps its aggregates and open episode; only its
    /// identity is replaced. Ids above [`MAX_THREAD_ID`] are refused and
    /// `false` is returned.
    pub fn new_thread(&mut self, id: ThreadId, name: String, class_name: String) -> bool {
        if id > MAX_THREAD_ID {
            return false;
        }
        let idx = id as usize;
        if idx >= self.threads.len() {
            self.threads.resize_with(idx + 1, || None);
        }
        match &mut self.threads[idx] {
            Some(existing) => {
                existing.name = name;
                existing.class_name = class_name;
            }
            slot @ None => *slot = Some(ThreadInfo::new(id, name, class_name)),
        }
        true
    }

    pub fn get(&self, id: ThreadId) -> Option<&ThreadInfo> {
        self.threads.get(id as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: ThreadId) -> Option<&mut ThreadInfo> {
        self.threads.get_mut(id as usize).and_then(Option::as_mut)
    }

    pub fn contains(&self, id: ThreadId) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ThreadInfo> {
        self.threads.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn clear(&mut self) {
        self.threads.clear();
    }
}

/// A waiting thread's view of its in-flight wait, as recorded by the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OpenWait {
    pub owner: ThreadId,
    pub start: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct MonitorInfo {
    pub id: MonitorId,
    pub class_name: String,
    /// Threads that waited on this monitor, peers are the owners
    pub wait_threads: FnvHashMap<ThreadId, ContentionDetail>,
    /// Threads that held this monitor while others waited, peers are the waiters
    pub owner_threads: FnvHashMap<ThreadId, ContentionDetail>,
    /// In-flight waits keyed by waiting thread
    pub open_threads: FnvHashMap<ThreadId, OpenWait>,
}

impl MonitorInfo {
    fn new(id: MonitorId, class_name: String) -> Self {
        Self {
            id,
            class_name,
            wait_threads: FnvHashMap::default(),
            owner_threads: FnvHashMap::default(),
            open_threads: FnvHashMap::default(),
        }
    }

    pub fn has_contention(&self) -> bool {
        !self.wait_threads.is_empty() || !self.owner_threads.is_empty()
    }

    pub fn record_wait(&mut self, waiter: ThreadId, owner: ThreadId, wait: u64) {
        self.wait_threads.entry(waiter).or_default().add(owner, wait);
        self.owner_threads.entry(owner).or_default().add(waiter, wait);
    }
}

/// Monitor table keyed by identity hash
#[derive(Debug, Clone, Default)]
pub(crate) struct MonitorInfos {
    monitors: FnvHashMap<MonitorId, MonitorInfo>,
}

impl MonitorInfos {
    /// Register a monitor, or correct the class of one referenced earlier
    pub fn new_monitor(&mut self, id: MonitorId, class_name: String) {
        self.monitors
            .entry(id)
            .and_modify(|m| m.class_name.clone_from(&class_name))
            .or_insert_with(|| MonitorInfo::new(id, class_name));
    }

    /// Look up a monitor, registering it as [`UNKNOWN_CLASS`] if unseen
    pub fn get_or_unknown(&mut self, id: MonitorId) -> &mut MonitorInfo {
        self.monitors
            .entry(id)
            .or_insert_with(|| MonitorInfo::new(id, UNKNOWN_CLASS.to_string()))
    }

    pub fn get(&self, id: MonitorId) -> Option<&MonitorInfo> {
        self.monitors.get(&id)
    }

    pub fn get_mut(&mut self, id: MonitorId) -> Option<&mut MonitorInfo> {
        self.monitors.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MonitorInfo> {
        self.monitors.values()
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn clear(&mut self) {
        self.monitors.clear();
    }
}
