use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::quantity::Quantity;
use crate::workload::{Admission, PodSetFlavors, ResourceList, Workload};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PodSetAssignment {
    pub name: String,
    /// resource name → flavor name
    pub flavors: BTreeMap<String, String>,
    /// Total requests of the pod set (all replicas).
    pub requests: ResourceList,
}

/// Flavors chosen for every pod set of a workload, and the usage they add.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment {
    pub cluster_queue: String,
    pub pod_sets: Vec<PodSetAssignment>,
    /// Whether any part of the usage is above the pool's guaranteed quota.
    #[serde(default)]
    pub borrows: bool,
}

impl Assignment {
    /// Usage per (resource, flavor), summed over pod sets.
    pub fn usage(&self) -> Result<BTreeMap<(String, String), Quantity>> {
        let mut usage: BTreeMap<(String, String), Quantity> = BTreeMap::new();
        for ps in &self.pod_sets {
            for (resource, q) in &ps.requests {
                if let Some(flavor) = ps.flavors.get(resource) {
                    let entry = usage.entry((resource.clone(), flavor.clone())).or_default();
                    *entry = entry.checked_add(*q).ok_or_else(|| {
                        Error::invalid(format!(
                            "usage of {}/{} in ClusterQueue {} is out of range",
                            resource, flavor, self.cluster_queue
                        ))
                    })?;
                }
            }
        }
        Ok(usage)
    }

    pub fn to_admission(&self) -> Admission {
        Admission {
            cluster_queue: self.cluster_queue.clone(),
            pod_set_flavors: self
                .pod_sets
                .iter()
                .map(|ps| PodSetFlavors {
                    name: ps.name.clone(),
                    flavors: ps.flavors.clone(),
                })
                .collect(),
        }
    }

    /// Rebuild the assignment of an already admitted workload, e.g. one found
    /// in the state store at start-up, so its usage can be committed again.
    pub fn from_admission(workload: &Workload) -> Result<Self> {
        let admission = workload.admission.as_ref().ok_or_else(|| {
            Error::invalid(format!("workload {} is not admitted", workload.key()))
        })?;

        let mut pod_sets = Vec::with_capacity(workload.pod_sets.len());
        for ps in &workload.pod_sets {
            let flavors = admission
                .pod_set_flavors
                .iter()
                .find(|f| f.name == ps.name)
                .ok_or_else(|| {
                    Error::invalid(format!(
                        "admission of {} has no flavors for pod set {}",
                        workload.key(),
                        ps.name
                    ))
                })?;
            let requests = ps.total_requests()?;
            if let Some(resource) = requests.keys().find(|r| !flavors.flavors.contains_key(*r)) {
                return Err(Error::invalid(format!(
                    "admission of {} has no flavor for resource {} of pod set {}",
                    workload.key(),
                    resource,
                    ps.name
                )));
            }
            pod_sets.push(PodSetAssignment {
                name: ps.name.clone(),
                flavors: flavors.flavors.clone(),
                requests,
            });
        }

        Ok(Self {
            cluster_queue: admission.cluster_queue.clone(),
            pod_sets,
            borrows: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::PodSet;

    #[test]
    fn rebuilds_usage_from_admission() {
        let wl = Workload::new("one", "default")
            .pod_sets(vec![
                PodSet::new("driver", 1).request("cpu", 1),
                PodSet::new("workers", 4).request("cpu", 2),
            ])
            .admit(
                Admission::new("cq")
                    .pod_set("driver", [("cpu".to_string(), "od".to_string())])
                    .pod_set("workers", [("cpu".to_string(), "spot".to_string())]),
            );

        let assignment = Assignment::from_admission(&wl).unwrap();
        assert_eq!(assignment.cluster_queue, "cq");
        let usage = assignment.usage().unwrap();
        assert_eq!(
            usage[&("cpu".to_string(), "od".to_string())],
            Quantity::from_units(1)
        );
        assert_eq!(
            usage[&("cpu".to_string(), "spot".to_string())],
            Quantity::from_units(8)
        );
        assert_eq!(assignment.to_admission(), wl.admission.clone().unwrap());
    }

    #[test]
    fn missing_flavor_is_rejected() {
        let wl = Workload::new("one", "default")
            .request("cpu", 1)
            .request("memory", 1)
            .admit(Admission::new("cq").pod_set("main", [("cpu".to_string(), "od".to_string())]));
        assert!(matches!(
            Assignment::from_admission(&wl),
            Err(Error::Invalid(_))
        ));
        assert!(Assignment::from_admission(&Workload::new("two", "default")).is_err());
    }
}
