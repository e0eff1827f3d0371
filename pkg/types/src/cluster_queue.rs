use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::quantity::Quantity;

// --- Queueing strategy ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum QueueingStrategy {
    /// A head that does not fit blocks every later workload of the pool.
    #[default]
    StrictFIFO,
    /// A head that does not fit is skipped for the rest of the cycle.
    BestEffortFIFO,
}

impl std::fmt::Display for QueueingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueingStrategy::StrictFIFO => write!(f, "StrictFIFO"),
            QueueingStrategy::BestEffortFIFO => write!(f, "BestEffortFIFO"),
        }
    }
}

// --- Quota ---

/// Quota for one (resource, flavor) pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Quota {
    /// Amount the pool always owns.
    pub guaranteed: Quantity,
    /// Upper bound on usage including borrowed quota. `None` means the pool
    /// may borrow as much as its cohort has idle.
    #[serde(default)]
    pub ceiling: Option<Quantity>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlavorQuota {
    /// Referenced `ResourceFlavor` name.
    pub name: String,
    pub quota: Quota,
}

impl FlavorQuota {
    pub fn new(flavor: impl Into<String>, guaranteed: impl Into<Quantity>) -> Self {
        Self {
            name: flavor.into(),
            quota: Quota {
                guaranteed: guaranteed.into(),
                ceiling: None,
            },
        }
    }

    pub fn ceiling(mut self, ceiling: impl Into<Quantity>) -> Self {
        self.quota.ceiling = Some(ceiling.into());
        self
    }
}

/// A requestable resource with its flavors in order of preference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resource {
    pub name: String,
    #[serde(default)]
    pub flavors: Vec<FlavorQuota>,
}

impl Resource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flavors: Vec::new(),
        }
    }

    pub fn flavor(mut self, flavor: FlavorQuota) -> Self {
        self.flavors.push(flavor);
        self
    }
}

// --- ClusterQueue ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterQueue {
    pub name: String,
    /// Pools sharing a cohort name may borrow each other's idle quota.
    #[serde(default)]
    pub cohort: Option<String>,
    #[serde(default)]
    pub queueing_strategy: QueueingStrategy,
    #[serde(default)]
    pub requestable_resources: Vec<Resource>,
}

impl ClusterQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cohort: None,
            queueing_strategy: QueueingStrategy::default(),
            requestable_resources: Vec::new(),
        }
    }

    pub fn cohort(mut self, cohort: impl Into<String>) -> Self {
        self.cohort = Some(cohort.into());
        self
    }

    pub fn queueing_strategy(mut self, strategy: QueueingStrategy) -> Self {
        self.queueing_strategy = strategy;
        self
    }

    pub fn resource(mut self, resource: Resource) -> Self {
        self.requestable_resources.push(resource);
        self
    }

    /// Every flavor name referenced by any resource.
    pub fn referenced_flavors(&self) -> BTreeSet<&str> {
        self.requestable_resources
            .iter()
            .flat_map(|r| r.flavors.iter().map(|f| f.name.as_str()))
            .collect()
    }

    pub fn quota(&self, resource: &str, flavor: &str) -> Option<&Quota> {
        self.requestable_resources
            .iter()
            .find(|r| r.name == resource)?
            .flavors
            .iter()
            .find(|f| f.name == flavor)
            .map(|f| &f.quota)
    }
}

// --- Status ---

/// Usage of one (resource, flavor) pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct UsedResource {
    pub total: Quantity,
    /// Portion of `total` above the guaranteed quota.
    #[serde(default)]
    pub borrowed: Quantity,
}

/// resource → flavor → usage
pub type UsedResources = BTreeMap<String, BTreeMap<String, UsedResource>>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ClusterQueueStatus {
    pub name: String,
    #[serde(default)]
    pub cohort: Option<String>,
    pub active: bool,
    pub pending_workloads: usize,
    pub admitted_workloads: usize,
    #[serde(default)]
    pub used_resources: UsedResources,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_lookup_and_referenced_flavors() {
        let cq = ClusterQueue::new("p1")
            .resource(
                Resource::new("cpu")
                    .flavor(FlavorQuota::new("od", 5).ceiling(10))
                    .flavor(FlavorQuota::new("spot", 3)),
            )
            .resource(Resource::new("memory").flavor(FlavorQuota::new("od", 1024)));

        let q = cq.quota("cpu", "od").unwrap();
        assert_eq!(q.guaranteed, Quantity::from_units(5));
        assert_eq!(q.ceiling, Some(Quantity::from_units(10)));
        assert!(cq.quota("cpu", "arm").is_none());
        assert!(cq.quota("gpu", "od").is_none());

        let flavors: Vec<_> = cq.referenced_flavors().into_iter().collect();
        assert_eq!(flavors, vec!["od", "spot"]);
    }

    #[test]
    fn deserialize_yaml_definition() {
        let yaml = r#"
name: team-a
cohort: research
queueing_strategy: BestEffortFIFO
requestable_resources:
  - name: cpu
    flavors:
      - name: on-demand
        quota:
          guaranteed: "5"
          ceiling: 10
"#;
        let cq: ClusterQueue = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cq.cohort.as_deref(), Some("research"));
        assert_eq!(cq.queueing_strategy, QueueingStrategy::BestEffortFIFO);
        assert_eq!(
            cq.quota("cpu", "on-demand").unwrap().ceiling,
            Some(Quantity::from_units(10))
        );
    }
}
