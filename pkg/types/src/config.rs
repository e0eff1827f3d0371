use serde::{Deserialize, Serialize};

use crate::cluster_queue::ClusterQueue;
use crate::flavor::ResourceFlavor;
use crate::queue::Queue;
use crate::workload::{RuntimeClass, Workload};

/// Server configuration file (YAML).
///
/// Example `config.yaml`:
/// ```yaml
/// data-dir: /var/lib/kq/data
/// manifest: /etc/kq/manifest.yaml
/// scheduler:
///   heads-limit: 16
///   max-attempts: 3
///   attempt-timeout-ms: 2000
///   cycle-interval-secs: 5
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfigFile {
    #[serde(default, alias = "data-dir")]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub manifest: Option<String>,
    #[serde(default)]
    pub scheduler: SchedulerConfigFile,
}

/// Scheduler tuning. Unset values fall back to `pkg_constants::scheduler`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfigFile {
    #[serde(default, alias = "heads-limit")]
    pub heads_limit: Option<usize>,
    #[serde(default, alias = "max-attempts")]
    pub max_attempts: Option<u32>,
    #[serde(default, alias = "attempt-timeout-ms")]
    pub attempt_timeout_ms: Option<u64>,
    #[serde(default, alias = "retry-backoff-ms")]
    pub retry_backoff_ms: Option<u64>,
    #[serde(default, alias = "cycle-timeout-ms")]
    pub cycle_timeout_ms: Option<u64>,
    #[serde(default, alias = "cycle-interval-secs")]
    pub cycle_interval_secs: Option<u64>,
}

/// Objects loaded at start-up (YAML).
///
/// Example `manifest.yaml`:
/// ```yaml
/// flavors:
///   - name: on-demand
/// cluster_queues:
///   - name: team-a
///     requestable_resources:
///       - name: cpu
///         flavors:
///           - name: on-demand
///             quota: { guaranteed: 5, ceiling: 10 }
/// queues:
///   - { name: main, namespace: default, cluster_queue: team-a }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub flavors: Vec<ResourceFlavor>,
    #[serde(default, alias = "cluster-queues")]
    pub cluster_queues: Vec<ClusterQueue>,
    #[serde(default)]
    pub queues: Vec<Queue>,
    #[serde(default, alias = "runtime-classes")]
    pub runtime_classes: Vec<RuntimeClass>,
    #[serde(default)]
    pub workloads: Vec<Workload>,
}

/// Load a YAML config file, returning the default if the file doesn't exist.
pub fn load_config_file<T: serde::de::DeserializeOwned + Default>(path: &str) -> anyhow::Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(T::default());
        }
        Err(e) => return Err(e.into()),
    };
    let config: T = serde_yaml::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_default() {
        let cfg: ServerConfigFile = load_config_file("/nonexistent/kq/config.yaml").unwrap();
        assert!(cfg.data_dir.is_none());
        assert!(cfg.scheduler.heads_limit.is_none());
    }

    #[test]
    fn kebab_case_aliases() {
        let cfg: ServerConfigFile = serde_yaml::from_str(
            "data-dir: /data\nscheduler:\n  heads-limit: 4\n  max-attempts: 5\n",
        )
        .unwrap();
        assert_eq!(cfg.data_dir.as_deref(), Some("/data"));
        assert_eq!(cfg.scheduler.heads_limit, Some(4));
        assert_eq!(cfg.scheduler.max_attempts, Some(5));
    }

    #[test]
    fn manifest_parses() {
        let manifest: Manifest = serde_yaml::from_str(
            r#"
flavors:
  - name: on-demand
cluster_queues:
  - name: team-a
    requestable_resources:
      - name: cpu
        flavors:
          - name: on-demand
            quota: { guaranteed: 5, ceiling: 10 }
queues:
  - { name: main, namespace: default, cluster_queue: team-a }
workloads:
  - name: job-1
    namespace: default
    queue_name: main
    created_at: 2024-01-01T00:00:00Z
    pod_sets:
      - name: main
        count: 2
        containers:
          - name: c
            requests: { cpu: 500m }
"#,
        )
        .unwrap();
        assert_eq!(manifest.flavors.len(), 1);
        assert_eq!(manifest.queues[0].cluster_queue, "team-a");
        assert_eq!(
            manifest.workloads[0].pod_sets[0].total_requests().unwrap()["cpu"],
            crate::quantity::Quantity::from_units(1)
        );
    }
}
