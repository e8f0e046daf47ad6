//! Manually managed render resources.
//!
//! Every scene node and atlas the engine hands to a renderer is tracked here.
//! A handle is live until released; releasing twice is tolerated and reports
//! `false`. Detached handles are live but not part of the drawn scene.

use std::collections::{BTreeMap, HashMap};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(u64);

impl NodeHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Node,
    Atlas,
    Actor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    kind: ResourceKind,
    attached: bool,
}

#[derive(Debug, Default)]
pub struct ResourceArena {
    next: u64,
    live: HashMap<NodeHandle, Slot>,
    released_total: u64,
}

impl ResourceArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, kind: ResourceKind) -> NodeHandle {
        self.next += 1;
        let h = NodeHandle(self.next);
        self.live.insert(
            h,
            Slot {
                kind,
                attached: true,
            },
        );
        h
    }

    pub fn release(&mut self, handle: NodeHandle) -> bool {
        if self.live.remove(&handle).is_some() {
            self.released_total += 1;
            true
        } else {
            trace!(handle = handle.0, "release of dead handle ignored");
            false
        }
    }

    pub fn detach(&mut self, handle: NodeHandle) -> bool {
        match self.live.get_mut(&handle) {
            Some(slot) => {
                slot.attached = false;
                true
            }
            None => false,
        }
    }

    pub fn reattach(&mut self, handle: NodeHandle) -> bool {
        match self.live.get_mut(&handle) {
            Some(slot) => {
                slot.attached = true;
                true
            }
            None => false,
        }
    }

    pub fn is_live(&self, handle: NodeHandle) -> bool {
        self.live.contains_key(&handle)
    }

    pub fn is_attached(&self, handle: NodeHandle) -> bool {
        self.live.get(&handle).is_some_and(|s| s.attached)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn live_of(&self, kind: ResourceKind) -> usize {
        self.live.values().filter(|s| s.kind == kind).count()
    }

    pub fn released_total(&self) -> u64 {
        self.released_total
    }

    pub fn release_all(&mut self) -> usize {
        let n = self.live.len();
        self.released_total += n as u64;
        self.live.clear();
        n
    }
}

/// Stable identity for static scene nodes across rebuilds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKey {
    Room(String),
    Sign(String),
    Placeholder(String),
    Desk(String),
    Agent(String),
    Helper(String),
    Zone(&'static str),
    Seat(usize),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub kept: usize,
    pub released: usize,
}

#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: BTreeMap<NodeKey, NodeHandle>,
}

impl SceneGraph {
    /// Make the graph hold exactly `keys`: persisting keys keep their handle,
    /// vanished keys are released, new keys are allocated.
    pub fn sync<I>(&mut self, keys: I, arena: &mut ResourceArena) -> SyncReport
    where
        I: IntoIterator<Item = NodeKey>,
    {
        let mut next = BTreeMap::new();
        let mut report = SyncReport::default();
        for key in keys {
            if next.contains_key(&key) {
                continue;
            }
            let handle = match self.nodes.remove(&key) {
                Some(h) if arena.is_live(h) => {
                    report.kept += 1;
                    h
                }
                _ => {
                    report.created += 1;
                    arena.allocate(ResourceKind::Node)
                }
            };
            next.insert(key, handle);
        }
        for (_, stale) in std::mem::take(&mut self.nodes) {
            if arena.release(stale) {
                report.released += 1;
            }
        }
        self.nodes = next;
        report
    }

    pub fn handle(&self, key: &NodeKey) -> Option<NodeHandle> {
        self.nodes.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self, arena: &mut ResourceArena) {
        for (_, h) in std::mem::take(&mut self.nodes) {
            arena.release(h);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_release_is_tolerated() {
        let mut arena = ResourceArena::new();
        let h = arena.allocate(ResourceKind::Atlas);
        assert!(arena.release(h));
        assert!(!arena.release(h));
        assert_eq!(arena.live_count(), 0);
        assert_eq!(arena.released_total(), 1);
    }

    #[test]
    fn detach_keeps_handle_live() {
        let mut arena = ResourceArena::new();
        let h = arena.allocate(ResourceKind::Actor);
        assert!(arena.detach(h));
        assert!(arena.is_live(h));
        assert!(!arena.is_attached(h));
        assert!(arena.reattach(h));
        assert!(arena.is_attached(h));
    }

    #[test]
    fn sync_keeps_persisting_keys() {
        let mut arena = ResourceArena::new();
        let mut graph = SceneGraph::default();
        let first = graph.sync(
            [NodeKey::Room("a".into()), NodeKey::Room("b".into())],
            &mut arena,
        );
        assert_eq!(first.created, 2);
        let a = graph.handle(&NodeKey::Room("a".into())).unwrap();

        let second = graph.sync(
            [NodeKey::Room("a".into()), NodeKey::Room("c".into())],
            &mut arena,
        );
        assert_eq!(second, SyncReport { created: 1, kept: 1, released: 1 });
        assert_eq!(graph.handle(&NodeKey::Room("a".into())), Some(a));
        assert_eq!(arena.live_count(), 2);
    }
}
