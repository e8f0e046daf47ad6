use std::collections::{HashSet, VecDeque};

use crate::config::DedupConfig;

/// Fixed-capacity set of event ids that forgets the oldest insertions first.
#[derive(Debug, Clone)]
pub struct BoundedIdSet {
    capacity: usize,
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl BoundedIdSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            members: HashSet::new(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    /// Returns `false` when the id was already present (nothing changes then).
    pub fn insert(&mut self, id: &str) -> bool {
        if self.members.contains(id) {
            return false;
        }
        self.members.insert(id.to_string());
        self.order.push_back(id.to_string());
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.members.remove(&old);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    Handoff,
    Collaboration,
    Meeting,
}

/// One bounded set per event category; ids from different categories never collide.
#[derive(Debug, Clone)]
pub struct ProcessedEvents {
    handoff: BoundedIdSet,
    collaboration: BoundedIdSet,
    meeting: BoundedIdSet,
}

impl ProcessedEvents {
    pub fn new(cfg: &DedupConfig) -> Self {
        Self {
            handoff: BoundedIdSet::new(cfg.handoff_capacity),
            collaboration: BoundedIdSet::new(cfg.collaboration_capacity),
            meeting: BoundedIdSet::new(cfg.meeting_capacity),
        }
    }

    fn set(&self, category: EventCategory) -> &BoundedIdSet {
        match category {
            EventCategory::Handoff => &self.handoff,
            EventCategory::Collaboration => &self.collaboration,
            EventCategory::Meeting => &self.meeting,
        }
    }

    fn set_mut(&mut self, category: EventCategory) -> &mut BoundedIdSet {
        match category {
            EventCategory::Handoff => &mut self.handoff,
            EventCategory::Collaboration => &mut self.collaboration,
            EventCategory::Meeting => &mut self.meeting,
        }
    }

    pub fn seen(&self, category: EventCategory, id: &str) -> bool {
        self.set(category).contains(id)
    }

    pub fn mark(&mut self, category: EventCategory, id: &str) -> bool {
        self.set_mut(category).insert(id)
    }

    pub fn len(&self, category: EventCategory) -> usize {
        self.set(category).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_first() {
        let mut set = BoundedIdSet::new(3);
        for id in ["a", "b", "c", "d"] {
            assert!(set.insert(id));
        }
        assert_eq!(set.len(), 3);
        assert!(!set.contains("a"));
        assert!(set.contains("b"));
        assert!(set.contains("d"));
    }

    #[test]
    fn reinsert_does_not_refresh_position() {
        let mut set = BoundedIdSet::new(2);
        set.insert("a");
        set.insert("b");
        assert!(!set.insert("a"));
        set.insert("c");
        assert!(!set.contains("a"));
        assert!(set.contains("b"));
    }

    #[test]
    fn categories_are_independent() {
        let mut p = ProcessedEvents::new(&DedupConfig::default());
        assert!(p.mark(EventCategory::Meeting, "x"));
        assert!(!p.seen(EventCategory::Collaboration, "x"));
        assert!(p.seen(EventCategory::Meeting, "x"));
        assert_eq!(p.len(EventCategory::Meeting), 1);
    }
}
