//! Resource inventory: quota definitions, live usage and flavor fitting
//! for every ClusterQueue.
//!
//! The cache knows nothing about queue ordering. All state sits behind one
//! `RwLock`: `snapshot` and `cycle_snapshot` take the read side, every other
//! operation the write side.

mod cluster_queue;
mod snapshot;

use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{error, info, warn};

use pkg_types::assignment::Assignment;
use pkg_types::cluster_queue::{ClusterQueue, ClusterQueueStatus};
use pkg_types::flavor::ResourceFlavor;
use pkg_types::validate::validate_cluster_queue;
use pkg_types::workload::PodSet;
use pkg_types::{Error, ObjectKind, Result};

use cluster_queue::ClusterQueueState;
pub use snapshot::Snapshot;

#[derive(Default)]
struct CacheInner {
    queues: Snapshot,
    flavors: HashMap<String, ResourceFlavor>,
}

impl CacheInner {
    fn join_cohort(&mut self, cohort: &Option<String>, name: &str) {
        if let Some(cohort) = cohort {
            self.queues
                .cohorts
                .entry(cohort.clone())
                .or_default()
                .insert(name.to_string());
        }
    }

    fn leave_cohort(&mut self, cohort: &Option<String>, name: &str) {
        if let Some(cohort) = cohort
            && let Some(members) = self.queues.cohorts.get_mut(cohort)
        {
            members.remove(name);
            if members.is_empty() {
                self.queues.cohorts.remove(cohort);
            }
        }
    }

    fn cluster_queue(&self, name: &str) -> Result<&ClusterQueueState> {
        self.queues
            .cluster_queues
            .get(name)
            .ok_or_else(|| Error::not_found(ObjectKind::ClusterQueue, name))
    }

    fn cluster_queue_mut(&mut self, name: &str) -> Result<&mut ClusterQueueState> {
        self.queues
            .cluster_queues
            .get_mut(name)
            .ok_or_else(|| Error::not_found(ObjectKind::ClusterQueue, name))
    }
}

/// In-memory quota ledger. Construct once and share by `Arc`.
#[derive(Default)]
pub struct Cache {
    inner: RwLock<CacheInner>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a ClusterQueue definition. Committed usage is kept and
    /// never rebalanced when the cohort changes.
    pub fn upsert_cluster_queue(&self, cq: ClusterQueue) -> Result<()> {
        validate_cluster_queue(&cq)?;
        let mut inner = self.inner.write();
        let name = cq.name.clone();
        let cohort = cq.cohort.clone();

        let old_cohort = inner
            .queues
            .cluster_queues
            .get(&name)
            .map(|existing| existing.spec.cohort.clone());
        if let Some(old_cohort) = &old_cohort {
            inner.leave_cohort(old_cohort, &name);
        }

        let CacheInner { queues, flavors } = &mut *inner;
        let active = match queues.cluster_queues.get_mut(&name) {
            Some(state) => {
                state.update(cq, flavors);
                state.active
            }
            None => {
                let state = ClusterQueueState::new(cq, flavors);
                let active = state.active;
                queues.cluster_queues.insert(name.clone(), state);
                active
            }
        };
        inner.join_cohort(&cohort, &name);

        info!(
            "{} ClusterQueue {} (cohort={}, active={})",
            if old_cohort.is_some() { "Updated" } else { "Added" },
            name,
            cohort.as_deref().unwrap_or("-"),
            active
        );
        Ok(())
    }

    /// Remove a ClusterQueue together with its usage.
    pub fn delete_cluster_queue(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let state = inner
            .queues
            .cluster_queues
            .remove(name)
            .ok_or_else(|| Error::not_found(ObjectKind::ClusterQueue, name))?;
        inner.leave_cohort(&state.spec.cohort, name);
        info!(
            "Deleted ClusterQueue {} ({} admitted workloads dropped from accounting)",
            name, state.admitted
        );
        Ok(())
    }

    /// Add or replace a flavor. ClusterQueues that were only missing this
    /// flavor become active again.
    pub fn upsert_flavor(&self, flavor: ResourceFlavor) {
        let mut inner = self.inner.write();
        let name = flavor.name.clone();
        let CacheInner { queues, flavors } = &mut *inner;
        flavors.insert(name.clone(), flavor);
        for cq in queues.cluster_queues.values_mut() {
            if cq.references_flavor(&name) {
                let was_active = cq.active;
                cq.refresh_active(flavors);
                if !was_active && cq.active {
                    info!("ClusterQueue {} is active again (flavor {} added)", cq.spec.name, name);
                }
            }
        }
    }

    /// Remove a flavor. Every ClusterQueue referencing it stops admitting;
    /// usage already committed stays counted.
    pub fn delete_flavor(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let CacheInner { queues, flavors } = &mut *inner;
        if flavors.remove(name).is_none() {
            return Err(Error::not_found(ObjectKind::ResourceFlavor, name));
        }
        for cq in queues.cluster_queues.values_mut() {
            if cq.references_flavor(name) {
                cq.active = false;
                warn!(
                    "ClusterQueue {} is inactive: flavor {} was deleted",
                    cq.spec.name, name
                );
            }
        }
        Ok(())
    }

    /// Find flavors for every pod set against the current usage.
    /// `Ok(None)` when the pool is inactive or any resource does not fit.
    pub fn try_fit(&self, name: &str, pod_sets: &[PodSet]) -> Result<Option<Assignment>> {
        let inner = self.inner.write();
        inner.queues.try_fit(name, pod_sets)
    }

    /// Add an assignment's usage. Only call once the admission is persisted.
    pub fn commit(&self, name: &str, assignment: &Assignment) -> Result<()> {
        let mut inner = self.inner.write();
        check_target(name, assignment)?;
        let cq = inner.cluster_queue_mut(name)?;
        cq.usage = cq.apply(assignment, true).inspect_err(|e| {
            error!("Commit to ClusterQueue {} rejected: {}", name, e);
        })?;
        cq.admitted += 1;
        cq.pending = cq.pending.saturating_sub(1);
        Ok(())
    }

    /// Remove the usage of a workload that was evicted or deleted.
    pub fn release(&self, name: &str, assignment: &Assignment) -> Result<()> {
        let mut inner = self.inner.write();
        check_target(name, assignment)?;
        let cq = inner.cluster_queue_mut(name)?;
        if cq.admitted == 0 {
            return Err(Error::invariant(format!(
                "release on ClusterQueue {} without admitted workloads",
                name
            )));
        }
        cq.usage = cq.apply(assignment, false).inspect_err(|e| {
            error!("Release from ClusterQueue {} rejected: {}", name, e);
        })?;
        cq.admitted -= 1;
        Ok(())
    }

    /// Mirror the number of pending workloads the queue manager holds.
    pub fn set_pending(&self, name: &str, pending: usize) -> Result<()> {
        self.inner.write().cluster_queue_mut(name)?.pending = pending;
        Ok(())
    }

    /// Counters and usage of one ClusterQueue, for status reporting.
    pub fn snapshot(&self, name: &str) -> Result<ClusterQueueStatus> {
        Ok(self.inner.read().cluster_queue(name)?.status())
    }

    /// A private copy of every ClusterQueue for one scheduling cycle.
    pub fn cycle_snapshot(&self) -> Snapshot {
        self.inner.read().queues.clone()
    }

    pub fn cluster_queue_names(&self) -> Vec<String> {
        self.inner.read().queues.cluster_queue_names()
    }

    pub fn is_active(&self, name: &str) -> Result<bool> {
        Ok(self.inner.read().cluster_queue(name)?.active)
    }
}

fn check_target(name: &str, assignment: &Assignment) -> Result<()> {
    if assignment.cluster_queue != name {
        return Err(Error::invariant(format!(
            "assignment for ClusterQueue {} applied to {}",
            assignment.cluster_queue, name
        )));
    }
    Ok(())
}
