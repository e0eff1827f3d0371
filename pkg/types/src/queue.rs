use serde::{Deserialize, Serialize};

/// Client-facing submission point. Routes workloads into one ClusterQueue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Queue {
    pub name: String,
    pub namespace: String,
    pub cluster_queue: String,
}

impl Queue {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            cluster_queue: String::new(),
        }
    }

    pub fn cluster_queue(mut self, cluster_queue: impl Into<String>) -> Self {
        self.cluster_queue = cluster_queue.into();
        self
    }

    pub fn key(&self) -> String {
        queue_key(&self.namespace, &self.name)
    }
}

pub fn queue_key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}
