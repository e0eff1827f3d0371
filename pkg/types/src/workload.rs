use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use pkg_constants::workload::CONDITION_ADMITTED;

use crate::error::{Error, Result};
use crate::quantity::Quantity;

/// resource name → quantity
pub type ResourceList = BTreeMap<String, Quantity>;

// --- PodSet ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Container {
    pub name: String,
    #[serde(default)]
    pub requests: ResourceList,
    #[serde(default)]
    pub limits: ResourceList,
}

/// A homogeneous group of `count` replicas with identical requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PodSet {
    pub name: String,
    pub count: u32,
    pub containers: Vec<Container>,
    #[serde(default)]
    pub runtime_class_name: Option<String>,
    /// Per-pod overhead, filled in from the runtime class by `adjust_resources`.
    #[serde(default)]
    pub overhead: ResourceList,
}

impl PodSet {
    /// A pod set with a single container named `c` and no requests.
    pub fn new(name: impl Into<String>, count: u32) -> Self {
        Self {
            name: name.into(),
            count,
            containers: vec![Container {
                name: "c".to_string(),
                requests: ResourceList::new(),
                limits: ResourceList::new(),
            }],
            runtime_class_name: None,
            overhead: ResourceList::new(),
        }
    }

    pub fn request(mut self, resource: impl Into<String>, q: impl Into<Quantity>) -> Self {
        if let Some(c) = self.containers.first_mut() {
            c.requests.insert(resource.into(), q.into());
        }
        self
    }

    pub fn limit(mut self, resource: impl Into<String>, q: impl Into<Quantity>) -> Self {
        if let Some(c) = self.containers.first_mut() {
            c.limits.insert(resource.into(), q.into());
        }
        self
    }

    pub fn runtime_class(mut self, name: impl Into<String>) -> Self {
        self.runtime_class_name = Some(name.into());
        self
    }

    /// Requests of a single pod: every container plus overhead.
    pub fn pod_requests(&self) -> Result<ResourceList> {
        let mut total = ResourceList::new();
        let requests = self
            .containers
            .iter()
            .flat_map(|c| &c.requests)
            .chain(&self.overhead);
        for (name, q) in requests {
            let sum = total
                .get(name)
                .copied()
                .unwrap_or_default()
                .checked_add(*q)
                .ok_or_else(|| self.overflow(name))?;
            total.insert(name.clone(), sum);
        }
        Ok(total)
    }

    /// Requests of the whole pod set (`pod_requests × count`).
    pub fn total_requests(&self) -> Result<ResourceList> {
        self.pod_requests()?
            .into_iter()
            .map(|(name, q)| match q.checked_mul(i64::from(self.count)) {
                Some(total) => Ok((name, total)),
                None => Err(self.overflow(&name)),
            })
            .collect()
    }

    fn overflow(&self, resource: &str) -> Error {
        Error::invalid(format!(
            "{} requested by pod set {} is out of range",
            resource, self.name
        ))
    }
}

// --- Admission ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PodSetFlavors {
    pub name: String,
    /// resource name → flavor name
    pub flavors: BTreeMap<String, String>,
}

/// The scheduler's decision: which pool, and which flavor each pod set got.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Admission {
    pub cluster_queue: String,
    pub pod_set_flavors: Vec<PodSetFlavors>,
}

impl Admission {
    pub fn new(cluster_queue: impl Into<String>) -> Self {
        Self {
            cluster_queue: cluster_queue.into(),
            pod_set_flavors: Vec::new(),
        }
    }

    pub fn pod_set(
        mut self,
        name: impl Into<String>,
        flavors: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        self.pod_set_flavors.push(PodSetFlavors {
            name: name.into(),
            flavors: flavors.into_iter().collect(),
        });
        self
    }
}

// --- Conditions ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkloadCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

impl WorkloadCondition {
    pub fn admitted(
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: CONDITION_ADMITTED.to_string(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }
}

// --- Workload ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Workload {
    pub name: String,
    pub namespace: String,
    /// Queue the workload was submitted to.
    #[serde(default)]
    pub queue_name: String,
    pub pod_sets: Vec<PodSet>,
    #[serde(default)]
    pub priority: i32,
    /// Informational; `priority` is what orders the queue.
    #[serde(default)]
    pub priority_class_name: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Bumped on every persisted change; used to detect concurrent writers.
    #[serde(default)]
    pub resource_version: u64,
    /// Set once by the scheduler.
    #[serde(default)]
    pub admission: Option<Admission>,
    #[serde(default)]
    pub conditions: Vec<WorkloadCondition>,
}

impl Workload {
    /// A workload with a single pod set `main` of one pod.
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            queue_name: String::new(),
            pod_sets: vec![PodSet::new("main", 1)],
            priority: 0,
            priority_class_name: None,
            created_at: Utc::now(),
            resource_version: 0,
            admission: None,
            conditions: Vec::new(),
        }
    }

    pub fn key(&self) -> String {
        workload_key(&self.namespace, &self.name)
    }

    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue_name = queue.into();
        self
    }

    /// Adds a request to the first container of the first pod set.
    pub fn request(mut self, resource: impl Into<String>, q: impl Into<Quantity>) -> Self {
        if let Some(ps) = self.pod_sets.first_mut()
            && let Some(c) = ps.containers.first_mut()
        {
            c.requests.insert(resource.into(), q.into());
        }
        self
    }

    pub fn pod_sets(mut self, pod_sets: Vec<PodSet>) -> Self {
        self.pod_sets = pod_sets;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn creation(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn admit(mut self, admission: Admission) -> Self {
        self.admission = Some(admission);
        self
    }

    pub fn is_admitted(&self) -> bool {
        self.admission.is_some()
    }

    pub fn condition(&self, type_: &str) -> Option<&WorkloadCondition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    pub fn in_condition(&self, type_: &str) -> bool {
        self.condition(type_)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    /// Replace the condition of the same type. The transition time is kept
    /// when the status does not change.
    pub fn set_condition(&mut self, mut condition: WorkloadCondition) {
        match self.conditions.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) => {
                if existing.status == condition.status {
                    condition.last_transition_time = existing.last_transition_time;
                }
                *existing = condition;
            }
            None => self.conditions.push(condition),
        }
    }
}

pub fn workload_key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

// --- Normalization ---

/// Per-pod overhead added by a runtime class (e.g. a sandboxed runtime).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuntimeClass {
    pub name: String,
    #[serde(default)]
    pub overhead: ResourceList,
}

impl RuntimeClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            overhead: ResourceList::new(),
        }
    }

    pub fn overhead(mut self, resource: impl Into<String>, q: impl Into<Quantity>) -> Self {
        self.overhead.insert(resource.into(), q.into());
        self
    }
}

/// Resolve the requests a workload will be accounted with.
///
/// A limit without a matching request becomes the request. Pods with a known
/// runtime class get its overhead; an unknown runtime class adds nothing.
pub fn adjust_resources(workload: &mut Workload, runtime_classes: &HashMap<String, RuntimeClass>) {
    for pod_set in &mut workload.pod_sets {
        for container in &mut pod_set.containers {
            for (name, limit) in &container.limits {
                container.requests.entry(name.clone()).or_insert(*limit);
            }
        }
        pod_set.overhead = pod_set
            .runtime_class_name
            .as_ref()
            .and_then(|rc| runtime_classes.get(rc))
            .map(|rc| rc.overhead.clone())
            .unwrap_or_default();
    }
}
