//! Admission queue: per-ClusterQueue ordered sets of pending workloads.
//!
//! The manager knows ordering, never quota. A workload whose Queue targets
//! a ClusterQueue the manager has not seen yet is parked on that Queue and
//! moves into the pool's set once `add_cluster_queue` is called for it.

mod pending;

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use pkg_types::cluster_queue::{ClusterQueue, QueueingStrategy};
use pkg_types::queue::{Queue, queue_key};
use pkg_types::workload::Workload;
use pkg_types::{Error, ObjectKind, Result};

use pending::PendingSet;

struct QueueState {
    spec: Queue,
    /// Workloads waiting for the target ClusterQueue to be defined.
    parked: BTreeMap<String, Workload>,
}

struct ClusterQueueEntry {
    strategy: QueueingStrategy,
    pending: PendingSet,
}

#[derive(Default)]
struct ManagerInner {
    queues: HashMap<String, QueueState>,
    cluster_queues: HashMap<String, ClusterQueueEntry>,
    /// Workload key -> key of the Queue it currently sits under.
    locations: HashMap<String, String>,
}

impl ManagerInner {
    /// Place a workload under its queue: into the pool set when the pool is
    /// known, parked otherwise. Returns whether the pool set changed.
    fn place(&mut self, qkey: &str, wl: Workload) -> Result<bool> {
        let Some(queue) = self.queues.get_mut(qkey) else {
            return Err(Error::not_found(ObjectKind::Queue, wl.queue_name.clone()));
        };
        let key = wl.key();
        self.locations.insert(key.clone(), qkey.to_string());
        match self.cluster_queues.get_mut(&queue.spec.cluster_queue) {
            Some(cq) => Ok(cq.pending.push(wl)),
            None => {
                queue.parked.insert(key, wl);
                Err(Error::not_found(
                    ObjectKind::ClusterQueue,
                    queue.spec.cluster_queue.clone(),
                ))
            }
        }
    }

    fn remove(&mut self, key: &str) -> Option<Workload> {
        let qkey = self.locations.remove(key)?;
        let queue = self.queues.get_mut(&qkey)?;
        if let Some(wl) = queue.parked.remove(key) {
            return Some(wl);
        }
        self.cluster_queues
            .get_mut(&queue.spec.cluster_queue)
            .and_then(|cq| cq.pending.remove(key))
    }

    /// Take every workload of a queue out of wherever it currently sits.
    fn take_queue(&mut self, qkey: &str) -> Vec<Workload> {
        let Some(queue) = self.queues.get_mut(qkey) else {
            return Vec::new();
        };
        let mut taken: Vec<Workload> = std::mem::take(&mut queue.parked).into_values().collect();
        if let Some(cq) = self.cluster_queues.get_mut(&queue.spec.cluster_queue) {
            taken.extend(cq.pending.drain_queue(qkey));
        }
        for wl in &taken {
            self.locations.remove(&wl.key());
        }
        taken
    }
}

/// Ordered pending workloads for every ClusterQueue, plus the Queue
/// definitions that route workloads to them.
#[derive(Default)]
pub struct Manager {
    inner: RwLock<ManagerInner>,
}

impl Manager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pool. Workloads parked on queues targeting it move into its set.
    pub fn add_cluster_queue(&self, cq: &ClusterQueue) {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        if let Some(entry) = inner.cluster_queues.get_mut(&cq.name) {
            entry.strategy = cq.queueing_strategy;
            return;
        }
        inner.cluster_queues.insert(
            cq.name.clone(),
            ClusterQueueEntry {
                strategy: cq.queueing_strategy,
                pending: PendingSet::default(),
            },
        );

        let mut released = 0;
        let ManagerInner {
            queues,
            cluster_queues,
            ..
        } = inner;
        if let Some(entry) = cluster_queues.get_mut(&cq.name) {
            for queue in queues.values_mut().filter(|q| q.spec.cluster_queue == cq.name) {
                for (_, wl) in std::mem::take(&mut queue.parked) {
                    entry.pending.push(wl);
                    released += 1;
                }
            }
        }
        info!(
            "ClusterQueue {} added to queue manager ({}, {} released)",
            cq.name, cq.queueing_strategy, released
        );
    }

    pub fn update_cluster_queue(&self, cq: &ClusterQueue) -> Result<()> {
        let mut inner = self.inner.write();
        let entry = inner
            .cluster_queues
            .get_mut(&cq.name)
            .ok_or_else(|| Error::not_found(ObjectKind::ClusterQueue, cq.name.clone()))?;
        entry.strategy = cq.queueing_strategy;
        Ok(())
    }

    /// Forget a pool. Its pending workloads are parked back on their queues.
    pub fn delete_cluster_queue(&self, name: &str) -> Result<()> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let mut entry = inner
            .cluster_queues
            .remove(name)
            .ok_or_else(|| Error::not_found(ObjectKind::ClusterQueue, name))?;
        let workloads = entry.pending.drain();
        let parked = workloads.len();
        for wl in workloads {
            let qkey = queue_key(&wl.namespace, &wl.queue_name);
            match inner.queues.get_mut(&qkey) {
                Some(queue) => {
                    queue.parked.insert(wl.key(), wl);
                }
                None => {
                    inner.locations.remove(&wl.key());
                }
            }
        }
        info!("ClusterQueue {} removed from queue manager, {} parked", name, parked);
        Ok(())
    }

    /// Create or update a Queue. A new target moves every pending workload
    /// of the queue to the new pool, or parks them if that pool is unknown.
    /// Returns the keys of the workloads parked by the move.
    pub fn upsert_queue(&self, queue: Queue) -> Vec<String> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let qkey = queue.key();
        let retarget = match inner.queues.get(&qkey) {
            None => {
                info!("Queue {} added for ClusterQueue {}", qkey, queue.cluster_queue);
                inner.queues.insert(
                    qkey,
                    QueueState {
                        spec: queue,
                        parked: BTreeMap::new(),
                    },
                );
                return Vec::new();
            }
            Some(state) => state.spec.cluster_queue != queue.cluster_queue,
        };
        if !retarget {
            return Vec::new();
        }

        let moving = inner.take_queue(&qkey);
        info!(
            "Queue {} retargeted to ClusterQueue {}, moving {} workload(s)",
            qkey,
            queue.cluster_queue,
            moving.len()
        );
        if let Some(state) = inner.queues.get_mut(&qkey) {
            state.spec = queue;
        }
        let mut parked = Vec::new();
        for wl in moving {
            let key = wl.key();
            if inner.place(&qkey, wl).is_err() {
                parked.push(key);
            }
        }
        parked
    }

    /// Remove a Queue and every workload pending under it. Returns the removed keys.
    pub fn delete_queue(&self, namespace: &str, name: &str) -> Result<Vec<String>> {
        let mut inner = self.inner.write();
        let qkey = queue_key(namespace, name);
        if !inner.queues.contains_key(&qkey) {
            return Err(Error::not_found(ObjectKind::Queue, name));
        }
        let removed: Vec<String> = inner.take_queue(&qkey).iter().map(Workload::key).collect();
        inner.queues.remove(&qkey);
        info!("Queue {} deleted with {} pending workload(s)", qkey, removed.len());
        Ok(removed)
    }

    /// Insert or reposition a pending workload. Returns `Ok(false)` when
    /// nothing changed: the workload is admitted or was already present with
    /// the same ordering fields.
    pub fn enqueue(&self, wl: Workload) -> Result<bool> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let key = wl.key();
        if wl.is_admitted() {
            inner.remove(&key);
            return Ok(false);
        }
        let qkey = queue_key(&wl.namespace, &wl.queue_name);
        if !inner.queues.contains_key(&qkey) {
            inner.remove(&key);
            return Err(Error::not_found(ObjectKind::Queue, wl.queue_name.clone()));
        }
        if inner.locations.get(&key).is_some_and(|current| *current != qkey) {
            inner.remove(&key);
        }
        let changed = inner.place(&qkey, wl)?;
        if changed {
            debug!("Workload {} enqueued in {}", key, qkey);
        }
        Ok(changed)
    }

    /// Remove a workload wherever it is pending. Unknown keys are ignored.
    pub fn dequeue(&self, key: &str) -> Option<Workload> {
        self.inner.write().remove(key)
    }

    /// Up to `limit` pending workloads of a pool in admission order, without removing them.
    pub fn heads(&self, cluster_queue: &str, limit: usize) -> Vec<Workload> {
        self.inner
            .read()
            .cluster_queues
            .get(cluster_queue)
            .map(|cq| cq.pending.heads(limit))
            .unwrap_or_default()
    }

    /// Remove one workload from a pool's pending set.
    pub fn pop(&self, cluster_queue: &str, key: &str) -> Option<Workload> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let wl = inner
            .cluster_queues
            .get_mut(cluster_queue)?
            .pending
            .remove(key)?;
        inner.locations.remove(key);
        Some(wl)
    }

    pub fn pending(&self, cluster_queue: &str) -> usize {
        self.inner
            .read()
            .cluster_queues
            .get(cluster_queue)
            .map_or(0, |cq| cq.pending.len())
    }

    pub fn strategy(&self, cluster_queue: &str) -> Option<QueueingStrategy> {
        self.inner
            .read()
            .cluster_queues
            .get(cluster_queue)
            .map(|cq| cq.strategy)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().locations.contains_key(key)
    }
}
