//! Flavor assignment over a consistent view of every ClusterQueue.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use pkg_types::assignment::{Assignment, PodSetAssignment};
use pkg_types::cluster_queue::{QueueingStrategy, Resource};
use pkg_types::workload::PodSet;
use pkg_types::{Error, ObjectKind, Quantity, Result};
use tracing::debug;

use crate::cluster_queue::ClusterQueueState;

/// Working copy of the cache taken at the start of a scheduling cycle.
///
/// Admissions made during the cycle are folded in with `add_usage`, so later
/// fits in the same cycle (including other members of a cohort) see them,
/// while the live cache is only written through `Cache::commit`.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub(crate) cluster_queues: HashMap<String, ClusterQueueState>,
    pub(crate) cohorts: HashMap<String, BTreeSet<String>>,
}

impl Snapshot {
    /// Names of every ClusterQueue, sorted.
    pub fn cluster_queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.cluster_queues.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.cluster_queues.get(name).is_some_and(|cq| cq.active)
    }

    pub fn queueing_strategy(&self, name: &str) -> Option<QueueingStrategy> {
        self.cluster_queues
            .get(name)
            .map(|cq| cq.spec.queueing_strategy)
    }

    pub fn try_fit(&self, name: &str, pod_sets: &[PodSet]) -> Result<Option<Assignment>> {
        try_fit(&self.cluster_queues, &self.cohorts, name, pod_sets)
    }

    /// Account an admission made earlier in the same cycle.
    pub fn add_usage(&mut self, assignment: &Assignment) -> Result<()> {
        let cq = self
            .cluster_queues
            .get_mut(&assignment.cluster_queue)
            .ok_or_else(|| Error::not_found(ObjectKind::ClusterQueue, &assignment.cluster_queue))?;
        cq.usage = cq.apply(assignment, true)?;
        Ok(())
    }
}

/// Σ guaranteed − Σ total over the cohort's members for one (resource, flavor).
fn cohort_free(
    cluster_queues: &HashMap<String, ClusterQueueState>,
    members: &BTreeSet<String>,
    resource: &str,
    flavor: &str,
) -> Quantity {
    members
        .iter()
        .filter_map(|m| cluster_queues.get(m))
        .fold(Quantity::ZERO, |free, cq| {
            free.saturating_add(cq.guaranteed(resource, flavor).saturating_sub(cq.total(resource, flavor)))
        })
}

/// Pick a flavor for `request` units of `resource`.
/// Returns the flavor and whether the pool has to borrow to use it.
fn choose_flavor(
    cluster_queues: &HashMap<String, ClusterQueueState>,
    cohorts: &HashMap<String, BTreeSet<String>>,
    cq: &ClusterQueueState,
    resource: &Resource,
    request: Quantity,
    assigned: &BTreeMap<(String, String), Quantity>,
) -> Option<(String, bool)> {
    let in_attempt = |flavor: &str| {
        assigned
            .get(&(resource.name.clone(), flavor.to_string()))
            .copied()
            .unwrap_or_default()
    };

    // Pass 1: own guaranteed quota.
    for flavor in &resource.flavors {
        let used = cq
            .total(&resource.name, &flavor.name)
            .saturating_add(in_attempt(&flavor.name));
        if flavor.quota.guaranteed.saturating_sub(used) >= request {
            return Some((flavor.name.clone(), false));
        }
    }

    // Pass 2: borrow from the cohort, up to the ceiling.
    let members = cq.spec.cohort.as_ref().and_then(|c| cohorts.get(c));
    for flavor in &resource.flavors {
        let used = cq
            .total(&resource.name, &flavor.name)
            .saturating_add(in_attempt(&flavor.name));
        let under_ceiling = match (flavor.quota.ceiling, members) {
            (Some(ceiling), _) => used.saturating_add(request) <= ceiling,
            (None, Some(_)) => true,
            // no ceiling and nobody to borrow from
            (None, None) => false,
        };
        if !under_ceiling {
            continue;
        }
        if let Some(members) = members {
            let headroom = cohort_free(cluster_queues, members, &resource.name, &flavor.name)
                .saturating_sub(in_attempt(&flavor.name));
            if request > headroom {
                debug!(
                    "cohort headroom for {}/{} is {}, {} requested",
                    resource.name, flavor.name, headroom, request
                );
                continue;
            }
        }
        return Some((flavor.name.clone(), true));
    }
    None
}

pub(crate) fn try_fit(
    cluster_queues: &HashMap<String, ClusterQueueState>,
    cohorts: &HashMap<String, BTreeSet<String>>,
    name: &str,
    pod_sets: &[PodSet],
) -> Result<Option<Assignment>> {
    let cq = cluster_queues
        .get(name)
        .ok_or_else(|| Error::not_found(ObjectKind::ClusterQueue, name))?;
    if !cq.active {
        debug!("ClusterQueue {} is inactive", name);
        return Ok(None);
    }

    let mut assigned: BTreeMap<(String, String), Quantity> = BTreeMap::new();
    let mut assignments = Vec::with_capacity(pod_sets.len());
    let mut borrows = false;

    for pod_set in pod_sets {
        let requests = match pod_set.total_requests() {
            Ok(requests) => requests,
            Err(e) => {
                debug!("ClusterQueue {} cannot fit pod set {}: {}", name, pod_set.name, e);
                return Ok(None);
            }
        };
        let mut flavors = BTreeMap::new();
        for (resource_name, request) in &requests {
            let Some(resource) = cq
                .spec
                .requestable_resources
                .iter()
                .find(|r| &r.name == resource_name)
            else {
                debug!(
                    "ClusterQueue {} does not provide resource {}",
                    name, resource_name
                );
                return Ok(None);
            };
            let Some((flavor, borrow)) =
                choose_flavor(cluster_queues, cohorts, cq, resource, *request, &assigned)
            else {
                debug!(
                    "no flavor of {} in ClusterQueue {} fits {} for pod set {}",
                    resource_name, name, request, pod_set.name
                );
                return Ok(None);
            };
            borrows |= borrow;
            let slot = assigned
                .entry((resource_name.clone(), flavor.clone()))
                .or_default();
            let Some(next) = slot.checked_add(*request) else {
                return Ok(None);
            };
            *slot = next;
            flavors.insert(resource_name.clone(), flavor);
        }
        assignments.push(PodSetAssignment {
            name: pod_set.name.clone(),
            flavors,
            requests,
        });
    }

    Ok(Some(Assignment {
        cluster_queue: name.to_string(),
        pod_sets: assignments,
        borrows,
    }))
}
