use std::collections::HashSet;

use crate::cluster_queue::ClusterQueue;
use crate::error::{Error, Result};
use crate::workload::Workload;

/// Reject a ClusterQueue definition that could break quota accounting.
/// Rules: non-empty names, no duplicate resources or flavors within a
/// resource, non-negative guaranteed quota, ceiling ≥ guaranteed.
pub fn validate_cluster_queue(cq: &ClusterQueue) -> Result<()> {
    if cq.name.is_empty() {
        return Err(Error::invalid("ClusterQueue name must not be empty"));
    }
    let mut resources = HashSet::new();
    for resource in &cq.requestable_resources {
        if !resources.insert(resource.name.as_str()) {
            return Err(Error::invalid(format!(
                "ClusterQueue {} declares resource {} twice",
                cq.name, resource.name
            )));
        }
        let mut flavors = HashSet::new();
        for flavor in &resource.flavors {
            if !flavors.insert(flavor.name.as_str()) {
                return Err(Error::invalid(format!(
                    "ClusterQueue {} declares flavor {} twice for {}",
                    cq.name, flavor.name, resource.name
                )));
            }
            if flavor.quota.guaranteed.is_negative() {
                return Err(Error::invalid(format!(
                    "ClusterQueue {}: guaranteed {}/{} is negative",
                    cq.name, resource.name, flavor.name
                )));
            }
            if let Some(ceiling) = flavor.quota.ceiling
                && ceiling < flavor.quota.guaranteed
            {
                return Err(Error::invalid(format!(
                    "ClusterQueue {}: ceiling {} of {}/{} is below guaranteed {}",
                    cq.name, ceiling, resource.name, flavor.name, flavor.quota.guaranteed
                )));
            }
        }
    }
    Ok(())
}

/// Reject a workload whose requests cannot be accounted.
pub fn validate_workload(wl: &Workload) -> Result<()> {
    if wl.name.is_empty() {
        return Err(Error::invalid("workload name must not be empty"));
    }
    if wl.pod_sets.is_empty() {
        return Err(Error::invalid(format!(
            "workload {} has no pod sets",
            wl.key()
        )));
    }
    let mut names = HashSet::new();
    for ps in &wl.pod_sets {
        if !names.insert(ps.name.as_str()) {
            return Err(Error::invalid(format!(
                "workload {} declares pod set {} twice",
                wl.key(),
                ps.name
            )));
        }
        if ps.count == 0 {
            return Err(Error::invalid(format!(
                "pod set {} of workload {} has no replicas",
                ps.name,
                wl.key()
            )));
        }
        let requests = ps.total_requests()?;
        if let Some((resource, _)) = requests.iter().find(|(_, q)| q.is_negative()) {
            return Err(Error::invalid(format!(
                "pod set {} of workload {} requests a negative amount of {}",
                ps.name,
                wl.key(),
                resource
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster_queue::{FlavorQuota, Resource};
    use crate::quantity::Quantity;
    use crate::workload::PodSet;

    #[test]
    fn valid_cluster_queue() {
        let cq = ClusterQueue::new("P1").resource(
            Resource::new("cpu")
                .flavor(FlavorQuota::new("od", 5).ceiling(10))
                .flavor(FlavorQuota::new("spot", 0)),
        );
        assert!(validate_cluster_queue(&cq).is_ok());
    }

    #[test]
    fn invalid_cluster_queues() {
        let below = ClusterQueue::new("cq")
            .resource(Resource::new("cpu").flavor(FlavorQuota::new("od", 5).ceiling(4)));
        assert!(validate_cluster_queue(&below).is_err());

        let dup_flavor = ClusterQueue::new("cq").resource(
            Resource::new("cpu")
                .flavor(FlavorQuota::new("od", 5))
                .flavor(FlavorQuota::new("od", 1)),
        );
        assert!(validate_cluster_queue(&dup_flavor).is_err());

        let dup_resource = ClusterQueue::new("cq")
            .resource(Resource::new("cpu"))
            .resource(Resource::new("cpu"));
        assert!(validate_cluster_queue(&dup_resource).is_err());

        let negative = ClusterQueue::new("cq").resource(
            Resource::new("cpu").flavor(FlavorQuota::new("od", Quantity::from_millis(-1))),
        );
        assert!(validate_cluster_queue(&negative).is_err());

        assert!(validate_cluster_queue(&ClusterQueue::new("")).is_err());
    }

    #[test]
    fn invalid_workloads() {
        assert!(validate_workload(&Workload::new("a", "ns").request("cpu", 1)).is_ok());
        assert!(validate_workload(&Workload::new("a", "ns").pod_sets(vec![])).is_err());
        assert!(
            validate_workload(
                &Workload::new("a", "ns")
                    .pod_sets(vec![PodSet::new("x", 1), PodSet::new("x", 2)])
            )
            .is_err()
        );
        assert!(
            validate_workload(&Workload::new("a", "ns").pod_sets(vec![PodSet::new("x", 0)]))
                .is_err()
        );

        let huge = Workload::new("a", "ns").pod_sets(vec![
            PodSet::new("w", 3000).request("memory", Quantity::parse("4Ti").unwrap()),
        ]);
        assert!(matches!(validate_workload(&huge), Err(Error::Invalid(_))));
    }
}
