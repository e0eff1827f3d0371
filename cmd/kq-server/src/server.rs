use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use pkg_cache::Cache;
use pkg_constants::workload::REASON_INADMISSIBLE;
use pkg_queue::Manager;
use pkg_scheduler::{AdmissionRecorder, Scheduler, SchedulerConfig};
use pkg_state::client::StateStore;
use pkg_state::workloads::WorkloadStore;
use pkg_types::assignment::Assignment;
use pkg_types::config::Manifest;
use pkg_types::validate::validate_workload;
use pkg_types::workload::{ConditionStatus, RuntimeClass, WorkloadCondition, adjust_resources};
use pkg_types::Error;

use crate::recorder::StoreRecorder;

pub struct ServerConfig {
    pub data_dir: String,
    pub manifest: Manifest,
    pub scheduler: SchedulerConfig,
}

/// Counts of what `bootstrap` loaded.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BootstrapSummary {
    pub cluster_queues: usize,
    pub queues: usize,
    /// Admitted workloads whose usage was committed again.
    pub admitted: usize,
    /// Workloads in a ClusterQueue's pending set.
    pub pending: usize,
    /// Workloads whose queue or ClusterQueue is missing. Those with a known
    /// queue stay parked until their ClusterQueue appears.
    pub inadmissible: usize,
}

/// Load manifest objects and stored workloads into the cache and the queue
/// manager. Manifest workloads are stored only if not already present, so a
/// restart keeps earlier admissions.
pub async fn bootstrap(
    manifest: &Manifest,
    cache: &Cache,
    queues: &Manager,
    workloads: &WorkloadStore,
    recorder: &dyn AdmissionRecorder,
) -> anyhow::Result<BootstrapSummary> {
    let mut summary = BootstrapSummary::default();

    for flavor in &manifest.flavors {
        cache.upsert_flavor(flavor.clone());
    }
    for cq in &manifest.cluster_queues {
        if let Err(e) = cache.upsert_cluster_queue(cq.clone()) {
            warn!("Skipping ClusterQueue {}: {}", cq.name, e);
            continue;
        }
        queues.add_cluster_queue(cq);
        summary.cluster_queues += 1;
    }
    for queue in &manifest.queues {
        for key in queues.upsert_queue(queue.clone()) {
            warn!("Workload {} parked: ClusterQueue {} is unknown", key, queue.cluster_queue);
        }
        summary.queues += 1;
    }

    let runtime_classes: HashMap<String, RuntimeClass> = manifest
        .runtime_classes
        .iter()
        .map(|rc| (rc.name.clone(), rc.clone()))
        .collect();

    for wl in &manifest.workloads {
        if let Err(e) = validate_workload(wl) {
            warn!("Skipping workload {}: {}", wl.key(), e);
            continue;
        }
        if workloads.get(&wl.namespace, &wl.name).await?.is_none() {
            workloads.put(wl.clone()).await?;
        }
    }

    for mut wl in workloads.list().await? {
        adjust_resources(&mut wl, &runtime_classes);
        if let Some(admission) = &wl.admission {
            let cluster_queue = admission.cluster_queue.clone();
            match Assignment::from_admission(&wl).and_then(|a| cache.commit(&cluster_queue, &a)) {
                Ok(()) => summary.admitted += 1,
                Err(e) => error!("Usage of admitted workload {} not restored: {}", wl.key(), e),
            }
            continue;
        }

        let key = wl.key();
        match queues.enqueue(wl.clone()) {
            Ok(_) => summary.pending += 1,
            Err(e) if matches!(e, Error::NotFound { .. }) => {
                info!("Workload {} is inadmissible: {}", key, e);
                summary.inadmissible += 1;
                let condition = WorkloadCondition::admitted(
                    ConditionStatus::False,
                    REASON_INADMISSIBLE,
                    e.to_string(),
                );
                if let Err(e) = recorder.record_condition(&wl, condition).await {
                    warn!("Failed to update status of {}: {}", key, e);
                }
            }
            Err(e) => warn!("Failed to enqueue workload {}: {}", key, e),
        }
    }

    for name in cache.cluster_queue_names() {
        cache.set_pending(&name, queues.pending(&name))?;
    }
    Ok(summary)
}

/// Open the store, load state and schedule until `cancel` fires.
pub async fn run(config: ServerConfig, cancel: CancellationToken) -> anyhow::Result<()> {
    let store = StateStore::new(&config.data_dir).await?;
    let workloads = Arc::new(WorkloadStore::new(store.clone()));
    let cache = Arc::new(Cache::new());
    let queues = Arc::new(Manager::new());
    let recorder = Arc::new(StoreRecorder::new(workloads.clone()));

    let summary = bootstrap(
        &config.manifest,
        &cache,
        &queues,
        &workloads,
        recorder.as_ref(),
    )
    .await?;
    info!(
        "Loaded {} ClusterQueue(s), {} queue(s), {} admitted, {} pending and {} inadmissible workload(s)",
        summary.cluster_queues,
        summary.queues,
        summary.admitted,
        summary.pending,
        summary.inadmissible
    );

    let scheduler = Arc::new(Scheduler::new(
        cache.clone(),
        queues.clone(),
        recorder,
        config.scheduler,
    ));
    let handle = scheduler.clone().start(cancel.clone());
    scheduler.trigger();

    cancel.cancelled().await;
    if let Err(e) = handle.await {
        error!("Scheduler task failed: {}", e);
    }
    for name in cache.cluster_queue_names() {
        if let Ok(status) = cache.snapshot(&name) {
            info!(
                "ClusterQueue {}: {} admitted, {} pending",
                name, status.admitted_workloads, status.pending_workloads
            );
        }
    }
    store.close().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use pkg_types::Result;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use pkg_constants::workload::CONDITION_ADMITTED;
    use pkg_types::Quantity;
    use pkg_types::cluster_queue::{ClusterQueue, FlavorQuota, Resource};
    use pkg_types::flavor::ResourceFlavor;
    use pkg_types::queue::Queue;
    use pkg_types::workload::{Admission, PodSet, Workload};

    fn manifest() -> Manifest {
        Manifest {
            flavors: vec![ResourceFlavor::new("default")],
            cluster_queues: vec![
                ClusterQueue::new("cq")
                    .resource(Resource::new("cpu").flavor(FlavorQuota::new("default", 4))),
            ],
            queues: vec![
                Queue::new("main", "ns").cluster_queue("cq"),
                Queue::new("later", "ns").cluster_queue("missing"),
            ],
            runtime_classes: vec![RuntimeClass::new("kata").overhead("cpu", 1)],
            workloads: Vec::new(),
        }
    }

    async fn env() -> (Arc<Cache>, Arc<Manager>, Arc<WorkloadStore>, StoreRecorder) {
        let store = StateStore::in_memory().await.unwrap();
        let workloads = Arc::new(WorkloadStore::new(store));
        let recorder = StoreRecorder::new(workloads.clone());
        (
            Arc::new(Cache::new()),
            Arc::new(Manager::new()),
            workloads,
            recorder,
        )
    }

    #[tokio::test]
    async fn bootstrap_enqueues_and_restores_usage() {
        let (cache, queues, workloads, recorder) = env().await;
        let mut manifest = manifest();
        manifest.workloads = vec![
            Workload::new("pending", "ns").queue("main").request("cpu", 1),
            Workload::new("orphan", "ns").queue("nope").request("cpu", 1),
            Workload::new("parked", "ns").queue("later").request("cpu", 1),
        ];
        let admitted = Workload::new("running", "ns")
            .queue("main")
            .request("cpu", 2)
            .admit(Admission::new("cq").pod_set(
                "main",
                [("cpu".to_string(), "default".to_string())],
            ));
        workloads.put(admitted).await.unwrap();

        let summary = bootstrap(&manifest, &cache, &queues, &workloads, &recorder)
            .await
            .unwrap();
        assert_eq!(summary.queues, 2);
        assert_eq!(summary.admitted, 1);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.inadmissible, 2);
        assert!(queues.contains("ns/parked"));

        let status = cache.snapshot("cq").unwrap();
        assert_eq!(status.admitted_workloads, 1);
        assert_eq!(status.pending_workloads, 1);
        assert_eq!(
            status.used_resources["cpu"]["default"].total,
            Quantity::from_units(2)
        );

        let orphan = workloads.get("ns", "orphan").await.unwrap().unwrap();
        let condition = orphan.condition(CONDITION_ADMITTED).unwrap();
        assert_eq!(condition.reason, REASON_INADMISSIBLE);
        assert_eq!(condition.message, "Queue nope doesn't exist");
        let parked = workloads.get("ns", "parked").await.unwrap().unwrap();
        assert_eq!(
            parked.condition(CONDITION_ADMITTED).unwrap().message,
            "ClusterQueue missing doesn't exist"
        );
    }

    #[tokio::test]
    async fn stored_workloads_win_over_the_manifest() {
        let (cache, queues, workloads, recorder) = env().await;
        let stored = workloads
            .put(Workload::new("a", "ns").queue("main").priority(7))
            .await
            .unwrap();
        let mut manifest = manifest();
        manifest.workloads = vec![Workload::new("a", "ns").queue("main")];

        bootstrap(&manifest, &cache, &queues, &workloads, &recorder)
            .await
            .unwrap();
        let heads = queues.heads("cq", 10);
        assert_eq!(heads.len(), 1);
        assert_eq!(heads[0].priority, 7);
        assert_eq!(heads[0].resource_version, stored.resource_version);
    }

    #[tokio::test]
    async fn scheduled_admission_is_persisted() {
        let (cache, queues, workloads, recorder) = env().await;
        let mut manifest = manifest();
        manifest.workloads = vec![
            Workload::new("a", "ns")
                .queue("main")
                .creation(Utc.timestamp_opt(1_700_000_000, 0).unwrap())
                .pod_sets(vec![PodSet::new("main", 1).limit("cpu", 2).runtime_class("kata")]),
        ];
        bootstrap(&manifest, &cache, &queues, &workloads, &recorder)
            .await
            .unwrap();

        let scheduler = Scheduler::new(
            cache.clone(),
            queues.clone(),
            Arc::new(recorder),
            SchedulerConfig::default(),
        );
        let report = scheduler
            .schedule_cycle(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.admitted, vec!["ns/a"]);

        let stored = workloads.get("ns", "a").await.unwrap().unwrap();
        assert!(stored.is_admitted());
        assert_eq!(
            cache.snapshot("cq").unwrap().used_resources["cpu"]["default"].total,
            Quantity::from_units(3)
        );
    }

    /// Stores the admission, then stalls before acknowledging the first one.
    struct SlowAck {
        inner: StoreRecorder,
        calls: AtomicU32,
    }

    #[async_trait]
    impl AdmissionRecorder for SlowAck {
        async fn record_admission(&self, workload: &Workload, admission: &Admission) -> Result<()> {
            self.inner.record_admission(workload, admission).await?;
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok(())
        }

        async fn record_condition(
            &self,
            workload: &Workload,
            condition: WorkloadCondition,
        ) -> Result<()> {
            self.inner.record_condition(workload, condition).await
        }
    }

    #[tokio::test]
    async fn lost_acknowledgement_is_retried_into_one_admission() {
        let (cache, queues, workloads, recorder) = env().await;
        let mut manifest = manifest();
        manifest.workloads = vec![Workload::new("a", "ns").queue("main").request("cpu", 1)];
        bootstrap(&manifest, &cache, &queues, &workloads, &recorder)
            .await
            .unwrap();

        let config = SchedulerConfig {
            attempt_timeout: Duration::from_millis(300),
            retry_backoff: Duration::from_millis(10),
            ..SchedulerConfig::default()
        };
        let scheduler = Scheduler::new(
            cache.clone(),
            queues.clone(),
            Arc::new(SlowAck {
                inner: recorder,
                calls: AtomicU32::new(0),
            }),
            config,
        );
        let report = scheduler
            .schedule_cycle(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.admitted, vec!["ns/a"]);
        assert!(report.failed.is_empty());

        let status = cache.snapshot("cq").unwrap();
        assert_eq!(status.admitted_workloads, 1);
        assert_eq!(
            status.used_resources["cpu"]["default"].total,
            Quantity::from_units(1)
        );
        assert_eq!(queues.pending("cq"), 0);
        assert!(workloads.get("ns", "a").await.unwrap().unwrap().is_admitted());

        let report = scheduler
            .schedule_cycle(&CancellationToken::new())
            .await
            .unwrap();
        assert!(report.admitted.is_empty());
    }
}
