use std::collections::{BTreeMap, HashMap};

use pkg_types::assignment::Assignment;
use pkg_types::cluster_queue::{ClusterQueue, ClusterQueueStatus, UsedResource, UsedResources};
use pkg_types::flavor::ResourceFlavor;
use pkg_types::{Error, Quantity, Result};

/// resource → flavor → total
pub(crate) type Usage = BTreeMap<String, BTreeMap<String, Quantity>>;

/// Accounting state the cache keeps for one ClusterQueue.
#[derive(Debug, Clone)]
pub(crate) struct ClusterQueueState {
    pub(crate) spec: ClusterQueue,
    /// False while any referenced flavor is missing.
    pub(crate) active: bool,
    pub(crate) usage: Usage,
    pub(crate) pending: usize,
    pub(crate) admitted: usize,
}

impl ClusterQueueState {
    pub(crate) fn new(spec: ClusterQueue, flavors: &HashMap<String, ResourceFlavor>) -> Self {
        let mut state = Self {
            spec,
            active: false,
            usage: Usage::new(),
            pending: 0,
            admitted: 0,
        };
        state.refresh_active(flavors);
        state
    }

    /// Swap in a new definition. Committed usage is kept as is, including
    /// usage of entries the new definition no longer declares.
    pub(crate) fn update(&mut self, spec: ClusterQueue, flavors: &HashMap<String, ResourceFlavor>) {
        self.spec = spec;
        self.refresh_active(flavors);
    }

    pub(crate) fn refresh_active(&mut self, flavors: &HashMap<String, ResourceFlavor>) {
        self.active = self
            .spec
            .referenced_flavors()
            .iter()
            .all(|f| flavors.contains_key(*f));
    }

    pub(crate) fn references_flavor(&self, flavor: &str) -> bool {
        self.spec.referenced_flavors().contains(flavor)
    }

    pub(crate) fn total(&self, resource: &str, flavor: &str) -> Quantity {
        self.usage
            .get(resource)
            .and_then(|flavors| flavors.get(flavor))
            .copied()
            .unwrap_or_default()
    }

    pub(crate) fn guaranteed(&self, resource: &str, flavor: &str) -> Quantity {
        self.spec
            .quota(resource, flavor)
            .map(|q| q.guaranteed)
            .unwrap_or_default()
    }

    pub(crate) fn borrowed(&self, resource: &str, flavor: &str) -> Quantity {
        self.total(resource, flavor)
            .saturating_excess(self.guaranteed(resource, flavor))
    }

    /// Usage after adding (or removing) an assignment. Nothing is mutated;
    /// the caller swaps the result in once every entry passed its checks.
    pub(crate) fn apply(&self, assignment: &Assignment, add: bool) -> Result<Usage> {
        let mut usage = self.usage.clone();
        for ((resource, flavor), q) in assignment.usage()? {
            if q.is_negative() {
                return Err(Error::invariant(format!(
                    "assignment to ClusterQueue {} carries a negative {}/{} request",
                    self.spec.name, resource, flavor
                )));
            }
            let current = usage
                .get(&resource)
                .and_then(|f| f.get(&flavor))
                .copied()
                .unwrap_or_default();
            let next = if add {
                current.checked_add(q)
            } else {
                current.checked_sub(q)
            }
            .ok_or_else(|| {
                Error::invariant(format!(
                    "usage of {}/{} in ClusterQueue {} overflows",
                    resource, flavor, self.spec.name
                ))
            })?;

            if next.is_negative() {
                return Err(Error::invariant(format!(
                    "usage of {}/{} in ClusterQueue {} would go negative ({} - {})",
                    resource, flavor, self.spec.name, current, q
                )));
            }
            if add {
                let quota = self.spec.quota(&resource, &flavor).ok_or_else(|| {
                    Error::invariant(format!(
                        "ClusterQueue {} has no quota for {}/{}",
                        self.spec.name, resource, flavor
                    ))
                })?;
                if let Some(ceiling) = quota.ceiling
                    && next > ceiling
                {
                    return Err(Error::invariant(format!(
                        "usage of {}/{} in ClusterQueue {} would exceed ceiling ({} > {})",
                        resource, flavor, self.spec.name, next, ceiling
                    )));
                }
            }
            usage.entry(resource).or_default().insert(flavor, next);
        }
        Ok(usage)
    }

    pub(crate) fn status(&self) -> ClusterQueueStatus {
        let mut used = UsedResources::new();
        for resource in &self.spec.requestable_resources {
            for flavor in &resource.flavors {
                used.entry(resource.name.clone()).or_default().insert(
                    flavor.name.clone(),
                    UsedResource {
                        total: self.total(&resource.name, &flavor.name),
                        borrowed: self.borrowed(&resource.name, &flavor.name),
                    },
                );
            }
        }
        // usage left behind by a shrunk definition stays visible
        for (resource, flavors) in &self.usage {
            for (flavor, total) in flavors {
                if *total == Quantity::ZERO {
                    continue;
                }
                used.entry(resource.clone())
                    .or_default()
                    .entry(flavor.clone())
                    .or_insert(UsedResource {
                        total: *total,
                        borrowed: self.borrowed(resource, flavor),
                    });
            }
        }
        ClusterQueueStatus {
            name: self.spec.name.clone(),
            cohort: self.spec.cohort.clone(),
            active: self.active,
            pending_workloads: self.pending,
            admitted_workloads: self.admitted,
            used_resources: used,
        }
    }
}
