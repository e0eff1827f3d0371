use async_trait::async_trait;
use std::sync::Arc;

use pkg_scheduler::AdmissionRecorder;
use pkg_state::workloads::WorkloadStore;
use pkg_types::Result;
use pkg_types::workload::{Admission, Workload, WorkloadCondition};

/// Records scheduling decisions in the state store.
pub struct StoreRecorder {
    workloads: Arc<WorkloadStore>,
}

impl StoreRecorder {
    pub fn new(workloads: Arc<WorkloadStore>) -> Self {
        Self { workloads }
    }
}

#[async_trait]
impl AdmissionRecorder for StoreRecorder {
    async fn record_admission(&self, workload: &Workload, admission: &Admission) -> Result<()> {
        self.workloads
            .record_admission(workload, admission)
            .await
            .map(|_| ())
    }

    async fn record_condition(
        &self,
        workload: &Workload,
        condition: WorkloadCondition,
    ) -> Result<()> {
        self.workloads.record_condition(workload, condition).await
    }
}
