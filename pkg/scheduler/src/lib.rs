//! Admission scheduling: pulls pending heads from the queue manager, fits
//! them against a cycle snapshot of the cache, persists the admission and
//! only then commits usage.

mod config;
mod recorder;

pub use config::SchedulerConfig;
pub use recorder::AdmissionRecorder;

use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use pkg_cache::{Cache, Snapshot};
use pkg_constants::workload::{REASON_INADMISSIBLE, REASON_PENDING};
use pkg_queue::Manager;
use pkg_types::cluster_queue::QueueingStrategy;
use pkg_types::workload::{Admission, ConditionStatus, Workload, WorkloadCondition};
use pkg_types::{Error, Result};

/// Outcome of one scheduling cycle, as workload keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub admitted: Vec<String>,
    /// Did not fit this cycle.
    pub pending: Vec<String>,
    /// Pool inactive.
    pub inadmissible: Vec<String>,
    /// Fit, but the admission could not be persisted.
    pub failed: Vec<String>,
    /// Stopped early by cancellation or the cycle deadline.
    pub interrupted: bool,
}

pub struct Scheduler {
    cache: Arc<Cache>,
    queues: Arc<Manager>,
    recorder: Arc<dyn AdmissionRecorder>,
    config: SchedulerConfig,
    cycle_lock: Mutex<()>,
    notify: Notify,
}

impl Scheduler {
    pub fn new(
        cache: Arc<Cache>,
        queues: Arc<Manager>,
        recorder: Arc<dyn AdmissionRecorder>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            cache,
            queues,
            recorder,
            config,
            cycle_lock: Mutex::new(()),
            notify: Notify::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Ask for a cycle. Triggers arriving while a cycle runs collapse into
    /// a single follow-up cycle.
    pub fn trigger(&self) {
        self.notify.notify_one();
    }

    /// Run cycles on every trigger and every `cycle_interval` until `cancel` fires.
    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Scheduler started (interval={}s, heads-limit={})",
                self.config.cycle_interval.as_secs(),
                self.config.heads_limit
            );
            let mut interval = tokio::time::interval(self.config.cycle_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = self.notify.notified() => {}
                    _ = interval.tick() => {}
                }
                match self.schedule_cycle(&cancel).await {
                    Ok(report) if !report.admitted.is_empty() => {
                        info!("Scheduling cycle admitted {} workload(s)", report.admitted.len());
                    }
                    Ok(_) => {}
                    Err(e) => error!("Scheduling cycle aborted: {}", e),
                }
            }
            info!("Scheduler stopped");
        })
    }

    /// One pass over every ClusterQueue in name order.
    ///
    /// Only an invariant violation from the cache is returned as an error;
    /// persistence failures are reported and the workload stays queued.
    pub async fn schedule_cycle(&self, cancel: &CancellationToken) -> Result<CycleReport> {
        let _cycle = self.cycle_lock.lock().await;
        let deadline = Instant::now() + self.config.cycle_timeout;
        let mut snapshot = self.cache.cycle_snapshot();
        let mut report = CycleReport::default();

        let names = snapshot.cluster_queue_names();
        for name in &names {
            if cancel.is_cancelled() {
                debug!("Scheduling cycle cancelled before ClusterQueue {}", name);
                report.interrupted = true;
                break;
            }
            if Instant::now() >= deadline {
                warn!("Scheduling cycle deadline exceeded before ClusterQueue {}", name);
                report.interrupted = true;
                break;
            }
            self.schedule_cluster_queue(name, &mut snapshot, &mut report)
                .await?;
        }

        for name in &names {
            // A pool deleted mid-cycle has nothing left to mirror.
            let _ = self.cache.set_pending(name, self.queues.pending(name));
        }
        Ok(report)
    }

    async fn schedule_cluster_queue(
        &self,
        name: &str,
        snapshot: &mut Snapshot,
        report: &mut CycleReport,
    ) -> Result<()> {
        let heads = self.queues.heads(name, self.config.heads_limit);
        if heads.is_empty() {
            return Ok(());
        }

        if !snapshot.is_active(name) {
            let message = Error::Inactive(name.to_string()).to_string();
            for wl in &heads {
                self.report(wl, REASON_INADMISSIBLE, &message).await;
                report.inadmissible.push(wl.key());
            }
            return Ok(());
        }

        let strategy = snapshot.queueing_strategy(name).unwrap_or_default();
        for wl in heads {
            let key = wl.key();
            let Some(assignment) = snapshot.try_fit(name, &wl.pod_sets)? else {
                let message = Error::Infeasible {
                    workload: key.clone(),
                    cluster_queue: name.to_string(),
                }
                .to_string();
                debug!("{}", message);
                self.report(&wl, REASON_PENDING, &message).await;
                report.pending.push(key);
                if strategy == QueueingStrategy::StrictFIFO {
                    break;
                }
                continue;
            };

            let admission = assignment.to_admission();
            if let Err(e) = self.persist(&wl, &admission).await {
                warn!("Failed to record admission of {} in {}: {}", key, name, e);
                report.failed.push(key);
                if strategy == QueueingStrategy::StrictFIFO {
                    break;
                }
                continue;
            }

            // The admission is durable from here on; never schedule it twice.
            self.queues.pop(name, &key);
            if let Err(e) = self.cache.commit(name, &assignment) {
                error!("Admission of {} recorded but not committed: {}", key, e);
                return Err(e);
            }
            info!("Admitted workload {} to ClusterQueue {}", key, name);
            report.admitted.push(key);
            snapshot.add_usage(&assignment)?;
        }
        Ok(())
    }

    /// Record the admission with bounded attempts, a per-attempt timeout
    /// and a fixed backoff between retryable failures.
    async fn persist(&self, wl: &Workload, admission: &Admission) -> Result<()> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(
                self.config.attempt_timeout,
                self.recorder.record_admission(wl, admission),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout(format!(
                    "recording admission of {} took longer than {:?}",
                    wl.key(),
                    self.config.attempt_timeout
                ))),
            };
            match result {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(
                        "Attempt {}/{} to record admission of {} failed: {}",
                        attempt,
                        max_attempts,
                        wl.key(),
                        e
                    );
                    attempt += 1;
                    tokio::time::sleep(self.config.retry_backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn report(&self, wl: &Workload, reason: &str, message: &str) {
        let condition = WorkloadCondition::admitted(ConditionStatus::False, reason, message);
        if let Err(e) = self.recorder.record_condition(wl, condition).await {
            warn!("Failed to update status of {}: {}", wl.key(), e);
        }
    }
}
