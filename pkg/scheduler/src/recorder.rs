use async_trait::async_trait;

use pkg_types::Result;
use pkg_types::workload::{Admission, Workload, WorkloadCondition};

/// Persists scheduling decisions on workloads.
///
/// `record_admission` must be atomic: either the admission is stored on the
/// exact workload version passed in, or an error is returned and nothing is
/// written. `Error::PersistenceConflict` and `Error::Timeout` are retried by
/// the scheduler.
#[async_trait]
pub trait AdmissionRecorder: Send + Sync {
    async fn record_admission(&self, workload: &Workload, admission: &Admission) -> Result<()>;

    /// Best effort status update for workloads that were not admitted.
    async fn record_condition(&self, workload: &Workload, condition: WorkloadCondition)
    -> Result<()>;
}
