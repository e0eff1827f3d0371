//! Workload objects stored as JSON under `/registry/workloads/<ns>/<name>`.

use tokio::sync::Mutex;
use tracing::{debug, info};

use pkg_constants::state::WORKLOADS_PREFIX;
use pkg_constants::workload::REASON_ADMITTED;
use pkg_types::workload::{Admission, ConditionStatus, Workload, WorkloadCondition};
use pkg_types::{Error, ObjectKind};

use crate::client::StateStore;

pub fn workload_path(namespace: &str, name: &str) -> String {
    format!("{}{}/{}", WORKLOADS_PREFIX, namespace, name)
}

/// Workload repository with compare-and-set admission writes.
///
/// Every write goes through one lock, so a read-check-write sequence is
/// atomic with respect to other writers in this process.
pub struct WorkloadStore {
    store: StateStore,
    write_lock: Mutex<()>,
}

impl WorkloadStore {
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn get(&self, namespace: &str, name: &str) -> anyhow::Result<Option<Workload>> {
        self.store.get_json(&workload_path(namespace, name)).await
    }

    pub async fn list(&self) -> anyhow::Result<Vec<Workload>> {
        let mut workloads = Vec::new();
        for (key, bytes) in self.store.list_prefix(WORKLOADS_PREFIX).await? {
            let wl: Workload = serde_json::from_slice(&bytes)
                .map_err(|e| anyhow::anyhow!("Corrupt workload at {}: {}", key, e))?;
            workloads.push(wl);
        }
        Ok(workloads)
    }

    /// Create or replace a workload. The stored copy gets the next
    /// resource version and is returned.
    pub async fn put(&self, mut wl: Workload) -> anyhow::Result<Workload> {
        let _guard = self.write_lock.lock().await;
        let path = workload_path(&wl.namespace, &wl.name);
        let current: Option<Workload> = self.store.get_json(&path).await?;
        wl.resource_version = current.map_or(0, |c| c.resource_version) + 1;
        self.store.put_json(&path, &wl).await?;
        debug!("Stored workload {} (version {})", wl.key(), wl.resource_version);
        Ok(wl)
    }

    pub async fn delete(&self, namespace: &str, name: &str) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        self.store.delete(&workload_path(namespace, name)).await
    }

    /// Store `admission` on the exact version of `wl` that was scheduled.
    ///
    /// Writing the same admission again is a no-op success, so a retry after
    /// a lost acknowledgement does not fail. Fails with `PersistenceConflict`
    /// when the stored workload has moved on or holds another admission, and
    /// with `NotFound` when it was deleted.
    pub async fn record_admission(
        &self,
        wl: &Workload,
        admission: &Admission,
    ) -> pkg_types::Result<Workload> {
        let _guard = self.write_lock.lock().await;
        let path = workload_path(&wl.namespace, &wl.name);
        let mut current: Workload = self
            .store
            .get_json(&path)
            .await
            .map_err(storage)?
            .ok_or_else(|| Error::not_found(ObjectKind::Workload, wl.key()))?;
        if current.admission.as_ref() == Some(admission)
            && current.resource_version == wl.resource_version + 1
        {
            debug!("Admission of {} already recorded", current.key());
            return Ok(current);
        }
        if current.resource_version != wl.resource_version || current.is_admitted() {
            return Err(Error::PersistenceConflict(wl.key()));
        }

        current.admission = Some(admission.clone());
        current.set_condition(WorkloadCondition::admitted(
            ConditionStatus::True,
            REASON_ADMITTED,
            format!("Admitted by ClusterQueue {}", admission.cluster_queue),
        ));
        current.resource_version += 1;
        self.store.put_json(&path, &current).await.map_err(storage)?;
        info!(
            "Recorded admission of {} in {} (version {})",
            current.key(),
            admission.cluster_queue,
            current.resource_version
        );
        Ok(current)
    }

    /// Set a status condition. Status writes keep the resource version, so
    /// they never make a pending copy of the workload stale. Deleted or
    /// admitted workloads are left alone.
    pub async fn record_condition(
        &self,
        wl: &Workload,
        condition: WorkloadCondition,
    ) -> pkg_types::Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = workload_path(&wl.namespace, &wl.name);
        let Some(mut current) = self
            .store
            .get_json::<Workload>(&path)
            .await
            .map_err(storage)?
        else {
            return Ok(());
        };
        if current.is_admitted() {
            return Ok(());
        }
        if let Some(existing) = current.condition(&condition.type_)
            && existing.status == condition.status
            && existing.reason == condition.reason
            && existing.message == condition.message
        {
            return Ok(());
        }
        current.set_condition(condition);
        self.store.put_json(&path, &current).await.map_err(storage)
    }
}

fn storage(e: anyhow::Error) -> Error {
    Error::Storage(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_constants::workload::{CONDITION_ADMITTED, REASON_PENDING};

    async fn store() -> WorkloadStore {
        WorkloadStore::new(StateStore::in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn put_bumps_version_and_lists() {
        let store = store().await;
        let a = store.put(Workload::new("a", "ns")).await.unwrap();
        assert_eq!(a.resource_version, 1);
        let a = store.put(a).await.unwrap();
        assert_eq!(a.resource_version, 2);
        store.put(Workload::new("b", "ns")).await.unwrap();

        let keys: Vec<String> = store.list().await.unwrap().iter().map(Workload::key).collect();
        assert_eq!(keys, vec!["ns/a", "ns/b"]);

        store.delete("ns", "a").await.unwrap();
        assert!(store.get("ns", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn admission_is_compare_and_set() {
        let store = store().await;
        let wl = store.put(Workload::new("a", "ns")).await.unwrap();
        let admission = Admission::new("cq").pod_set("main", [("cpu".to_string(), "default".to_string())]);

        let stored = store.record_admission(&wl, &admission).await.unwrap();
        assert_eq!(stored.admission, Some(admission.clone()));
        assert_eq!(stored.resource_version, wl.resource_version + 1);
        let condition = stored.condition(CONDITION_ADMITTED).unwrap();
        assert_eq!(condition.status, ConditionStatus::True);
        assert_eq!(condition.reason, REASON_ADMITTED);

        let again = store.record_admission(&wl, &admission).await.unwrap();
        assert_eq!(again.resource_version, stored.resource_version);

        let other = Admission::new("other");
        let err = store.record_admission(&wl, &other).await.unwrap_err();
        assert_eq!(err, Error::PersistenceConflict("ns/a".to_string()));
        let err = store.record_admission(&stored, &admission).await.unwrap_err();
        assert_eq!(err, Error::PersistenceConflict("ns/a".to_string()));
    }

    #[tokio::test]
    async fn stale_version_conflicts() {
        let store = store().await;
        let old = store.put(Workload::new("a", "ns")).await.unwrap();
        store.put(old.clone().priority(5)).await.unwrap();

        let err = store
            .record_admission(&old, &Admission::new("cq"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(!store.get("ns", "a").await.unwrap().unwrap().is_admitted());
    }

    #[tokio::test]
    async fn deleted_workload_is_not_found() {
        let store = store().await;
        let err = store
            .record_admission(&Workload::new("gone", "ns"), &Admission::new("cq"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Workload ns/gone doesn't exist");
    }

    #[tokio::test]
    async fn conditions_keep_the_version() {
        let store = store().await;
        let wl = store.put(Workload::new("a", "ns")).await.unwrap();
        let pending = WorkloadCondition::admitted(ConditionStatus::False, REASON_PENDING, "waiting");
        store.record_condition(&wl, pending).await.unwrap();

        let stored = store.get("ns", "a").await.unwrap().unwrap();
        assert_eq!(stored.resource_version, wl.resource_version);
        assert_eq!(stored.condition(CONDITION_ADMITTED).unwrap().reason, REASON_PENDING);

        store.record_admission(&wl, &Admission::new("cq")).await.unwrap();
    }
}
