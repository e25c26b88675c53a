//! Lazy presentation tree over a contention snapshot
//!
//! ```text
//! Root
//! ├─ Thread T1
//! │  ├─ Waited on                         (WaitGroup)
//! │  │  └─ java.lang.Object@9             (PeerDetail: aggregate)
//! │  │     └─ T2                          (PeerDetail: peer owner)
//! │  │        └─ java.util.Vector@4       (T2's own waits, chain)
//! │  └─ Owned while others waited         (WaitGroup)
//! └─ Monitor java.lang.Object@9
//!    ├─ Waited on by
//!    │  └─ T1 ── T2
//!    └─ Owned by, waited on by others
//!       └─ T2 ── T1
//! ```
//!
//! Nodes compute their children and totals the first time they are asked
//! and keep them (`OnceLock`), so repeated reads return the same slice and
//! never walk the snapshot twice. Root, thread, monitor and group nodes sum
//! their children; detail nodes report their own aggregate.
//!
//! A peer thread under a detail node expands into that thread's own
//! aggregates in the same direction, so chains like "T1 waited for T2, who
//! was itself waiting for T3" can be followed. Expansion stops at
//! [`TreeConfig::max_chain_depth`] and at any thread already on the path.

use crate::config::TreeConfig;
use crate::registry::{MonitorId, ThreadId};
use crate::snapshot::{Aggregate, ContentionSnapshot, Subject};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock, Weak};

/// Which side of a contention relationship a group collects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKind {
    /// Waits of the holder (thread), or waits on the holder (monitor)
    Waited,
    /// Waits others spent while the holder owned the monitor
    Owned,
}

/// Logical identity of a node, unique among its siblings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeIdent {
    Root,
    Thread(ThreadId),
    Monitor(MonitorId),
    Group(GroupKind),
}

impl From<Subject> for NodeIdent {
    fn from(subject: Subject) -> Self {
        match subject {
            Subject::Thread(id) => NodeIdent::Thread(id),
            Subject::Monitor(id) => NodeIdent::Monitor(id),
        }
    }
}

/// Identity of a node and, recursively, of its parent
///
/// Two trees built from different snapshots produce equal keys for the same
/// logical node, which lets a display diff successive refreshes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeKey {
    ident: NodeIdent,
    parent: Option<Arc<NodeKey>>,
}

impl NodeKey {
    pub fn ident(&self) -> NodeIdent {
        self.ident
    }

    pub fn parent(&self) -> Option<&NodeKey> {
        self.parent.as_deref()
    }

    fn ancestors(&self) -> impl Iterator<Item = &NodeKey> {
        std::iter::successors(self.parent(), |k| k.parent())
    }
}

/// Where a detail node's numbers and children come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailSource {
    /// The aggregate of `holder` keyed by `subject`, on the `group` side
    Aggregate {
        holder: Subject,
        group: GroupKind,
        subject: Subject,
        depth: usize,
    },
    /// A peer thread of the parent aggregate
    Peer {
        thread: ThreadId,
        group: GroupKind,
        depth: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Thread(ThreadId),
    Monitor(MonitorId),
    WaitGroup { holder: Subject, group: GroupKind },
    PeerDetail(DetailSource),
}

/// Aggregated wait time and wait count of a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub time: u64,
    pub wait_count: u64,
}

struct NodeInner {
    key: Arc<NodeKey>,
    kind: NodeKind,
    name: String,
    snapshot: Arc<ContentionSnapshot>,
    config: TreeConfig,
    parent: Weak<NodeInner>,
    /// Detail nodes carry their own totals
    own: Option<Totals>,
    children: OnceLock<Vec<LockNode>>,
    totals: OnceLock<Totals>,
}

/// One node of the presentation tree (cheap to clone)
#[derive(Clone)]
pub struct LockNode(Arc<NodeInner>);

impl LockNode {
    /// Root of a new tree over `snapshot`
    pub fn root(snapshot: Arc<ContentionSnapshot>, config: TreeConfig) -> Self {
        LockNode(Arc::new(NodeInner {
            key: Arc::new(NodeKey {
                ident: NodeIdent::Root,
                parent: None,
            }),
            kind: NodeKind::Root,
            name: "Lock contention".to_string(),
            snapshot,
            config,
            parent: Weak::new(),
            own: None,
            children: OnceLock::new(),
            totals: OnceLock::new(),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn kind(&self) -> NodeKind {
        self.0.kind
    }

    pub fn key(&self) -> &NodeKey {
        &self.0.key
    }

    pub fn snapshot(&self) -> &ContentionSnapshot {
        &self.0.snapshot
    }

    /// Total wait time
    pub fn time(&self) -> u64 {
        self.totals().time
    }

    pub fn wait_count(&self) -> u64 {
        self.totals().wait_count
    }

    pub fn totals(&self) -> Totals {
        *self.0.totals.get_or_init(|| match self.0.own {
            Some(own) => own,
            None => self.children().iter().fold(Totals::default(), |acc, c| {
                let t = c.totals();
                Totals {
                    time: acc.time.saturating_add(t.time),
                    wait_count: acc.wait_count + t.wait_count,
                }
            }),
        })
    }

    /// Share of the parent's time, in percent
    ///
    /// The root is always 100. Chain expansions describe a different
    /// aggregate than their parent and may exceed 100. A node that outlived
    /// its parent reports 0.
    pub fn percent_of_parent(&self) -> f64 {
        if matches!(self.0.kind, NodeKind::Root) {
            return 100.0;
        }
        let Some(parent) = self.0.parent.upgrade().map(LockNode) else {
            return 0.0;
        };
        let parent_time = parent.time();
        if parent_time == 0 {
            0.0
        } else {
            self.time() as f64 / parent_time as f64 * 100.0
        }
    }

    /// Children, computed on first call
    pub fn children(&self) -> &[LockNode] {
        self.0.children.get_or_init(|| self.build_children())
    }

    /// Whether `children()` has already run
    pub fn is_materialized(&self) -> bool {
        self.0.children.get().is_some()
    }

    /// First child with the given display name
    pub fn child(&self, name: &str) -> Option<&LockNode> {
        self.children().iter().find(|c| c.name() == name)
    }

    pub fn is_leaf(&self) -> bool {
        self.children().is_empty()
    }

    pub fn is_thread_node(&self) -> bool {
        matches!(self.0.key.ident, NodeIdent::Thread(_))
    }

    pub fn is_monitor_node(&self) -> bool {
        matches!(self.0.key.ident, NodeIdent::Monitor(_))
    }

    fn child_node(&self, ident: NodeIdent, kind: NodeKind, name: String, own: Option<Totals>) -> LockNode {
        LockNode(Arc::new(NodeInner {
            key: Arc::new(NodeKey {
                ident,
                parent: Some(Arc::clone(&self.0.key)),
            }),
            kind,
            name,
            snapshot: Arc::clone(&self.0.snapshot),
            config: self.0.config,
            parent: Arc::downgrade(&self.0),
            own,
            children: OnceLock::new(),
            totals: OnceLock::new(),
        }))
    }

    fn group_node(&self, holder: Subject, group: GroupKind) -> LockNode {
        let name = match (holder, group) {
            (Subject::Thread(_), GroupKind::Waited) => "Waited on",
            (Subject::Thread(_), GroupKind::Owned) => "Owned while others waited",
            (Subject::Monitor(_), GroupKind::Waited) => "Waited on by",
            (Subject::Monitor(_), GroupKind::Owned) => "Owned by, waited on by others",
        };
        self.child_node(
            NodeIdent::Group(group),
            NodeKind::WaitGroup { holder, group },
            name.to_string(),
            None,
        )
    }

    fn aggregate_nodes(&self, holder: Subject, group: GroupKind, depth: usize) -> Vec<LockNode> {
        aggregates_of(&self.0.snapshot, holder, group)
            .iter()
            .map(|a| {
                self.child_node(
                    a.subject().into(),
                    NodeKind::PeerDetail(DetailSource::Aggregate {
                        holder,
                        group,
                        subject: a.subject(),
                        depth,
                    }),
                    a.name().to_string(),
                    Some(Totals {
                        time: a.wait_time(),
                        wait_count: a.wait_count(),
                    }),
                )
            })
            .collect()
    }

    fn build_children(&self) -> Vec<LockNode> {
        let snapshot = &self.0.snapshot;
        match self.0.kind {
            NodeKind::Root => {
                let threads = snapshot.threads().iter().map(|t| {
                    self.child_node(
                        NodeIdent::Thread(t.id()),
                        NodeKind::Thread(t.id()),
                        t.name().to_string(),
                        None,
                    )
                });
                let monitors = snapshot.monitors().iter().map(|m| {
                    self.child_node(
                        NodeIdent::Monitor(m.id()),
                        NodeKind::Monitor(m.id()),
                        m.display_name(),
                        None,
                    )
                });
                threads.chain(monitors).collect()
            }
            NodeKind::Thread(id) => {
                let holder = Subject::Thread(id);
                [GroupKind::Waited, GroupKind::Owned]
                    .into_iter()
                    .filter(|&g| !aggregates_of(snapshot, holder, g).is_empty())
                    .map(|g| self.group_node(holder, g))
                    .collect()
            }
            NodeKind::Monitor(id) => {
                let holder = Subject::Monitor(id);
                [GroupKind::Waited, GroupKind::Owned]
                    .into_iter()
                    .filter(|&g| !aggregates_of(snapshot, holder, g).is_empty())
                    .map(|g| self.group_node(holder, g))
                    .collect()
            }
            NodeKind::WaitGroup { holder, group } => self.aggregate_nodes(holder, group, 0),
            NodeKind::PeerDetail(DetailSource::Aggregate {
                holder,
                group,
                subject,
                depth,
            }) => {
                let Some(aggregate) = aggregates_of(snapshot, holder, group)
                    .iter()
                    .find(|a| a.subject() == subject)
                else {
                    return Vec::new();
                };
                aggregate
                    .peers()
                    .iter()
                    .map(|p| {
                        self.child_node(
                            NodeIdent::Thread(p.thread()),
                            NodeKind::PeerDetail(DetailSource::Peer {
                                thread: p.thread(),
                                group,
                                depth: depth + 1,
                            }),
                            p.name().to_string(),
                            Some(Totals {
                                time: p.wait_time(),
                                wait_count: p.wait_count(),
                            }),
                        )
                    })
                    .collect()
            }
            NodeKind::PeerDetail(DetailSource::Peer {
                thread,
                group,
                depth,
            }) => {
                if depth > self.0.config.max_chain_depth || self.on_path(thread) {
                    return Vec::new();
                }
                self.aggregate_nodes(Subject::Thread(thread), group, depth)
            }
        }
    }

    /// Whether `thread` already appears above this node
    fn on_path(&self, thread: ThreadId) -> bool {
        self.0
            .key
            .ancestors()
            .any(|k| k.ident == NodeIdent::Thread(thread))
    }
}

fn aggregates_of(snapshot: &ContentionSnapshot, holder: Subject, group: GroupKind) -> &[Aggregate] {
    let empty: &[Aggregate] = &[];
    match (holder, group) {
        (Subject::Thread(id), GroupKind::Waited) => snapshot.thread(id).map_or(empty, |t| t.waited()),
        (Subject::Thread(id), GroupKind::Owned) => snapshot.thread(id).map_or(empty, |t| t.owned()),
        (Subject::Monitor(id), GroupKind::Waited) => snapshot.monitor(id).map_or(empty, |m| m.waiters()),
        (Subject::Monitor(id), GroupKind::Owned) => snapshot.monitor(id).map_or(empty, |m| m.owners()),
    }
}

impl PartialEq for LockNode {
    fn eq(&self, other: &Self) -> bool {
        self.0.key == other.0.key
    }
}

impl Eq for LockNode {}

impl Hash for LockNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.key.hash(state);
    }
}

impl std::fmt::Debug for LockNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockNode")
            .field("name", &self.0.name)
            .field("kind", &self.0.kind)
            .field("materialized", &self.is_materialized())
            .finish()
    }
}
