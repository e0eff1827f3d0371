use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

use pkg_types::workload::Workload;

/// Position of a workload in a ClusterQueue: oldest first, then higher
/// priority, then key. Total and deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct OrderKey {
    created_at: DateTime<Utc>,
    priority: Reverse<i32>,
    key: String,
}

impl OrderKey {
    fn of(wl: &Workload) -> Self {
        Self {
            created_at: wl.created_at,
            priority: Reverse(wl.priority),
            key: wl.key(),
        }
    }
}

/// Ordered pending workloads of one ClusterQueue.
#[derive(Debug, Default)]
pub(crate) struct PendingSet {
    order: BTreeSet<OrderKey>,
    items: HashMap<String, (OrderKey, Workload)>,
}

impl PendingSet {
    /// Insert or reposition. Returns false when the workload was already
    /// present with the same ordering fields, in which case its position is kept.
    pub(crate) fn push(&mut self, wl: Workload) -> bool {
        let order = OrderKey::of(&wl);
        let key = order.key.clone();
        if let Some((existing, stored)) = self.items.get_mut(&key)
            && *existing == order
        {
            *stored = wl;
            return false;
        }
        if let Some((old, _)) = self.items.remove(&key) {
            self.order.remove(&old);
        }
        self.order.insert(order.clone());
        self.items.insert(key, (order, wl));
        true
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<Workload> {
        let (order, wl) = self.items.remove(key)?;
        self.order.remove(&order);
        Some(wl)
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    pub(crate) fn heads(&self, limit: usize) -> Vec<Workload> {
        self.order
            .iter()
            .take(limit)
            .filter_map(|o| self.items.get(&o.key).map(|(_, wl)| wl.clone()))
            .collect()
    }

    /// Remove every workload submitted through `queue_key`.
    pub(crate) fn drain_queue(&mut self, queue_key: &str) -> Vec<Workload> {
        let keys: Vec<String> = self
            .items
            .values()
            .filter(|(_, wl)| pkg_types::queue::queue_key(&wl.namespace, &wl.queue_name) == queue_key)
            .map(|(o, _)| o.key.clone())
            .collect();
        keys.iter().filter_map(|k| self.remove(k)).collect()
    }

    pub(crate) fn drain(&mut self) -> Vec<Workload> {
        self.order.clear();
        self.items.drain().map(|(_, (_, wl))| wl).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }
}
