//! Workload status vocabulary.

/// Condition type set on a workload once the scheduler has decided on it.
pub const CONDITION_ADMITTED: &str = "Admitted";

/// Workload is waiting for quota.
pub const REASON_PENDING: &str = "Pending";

/// Workload cannot be considered (missing queue, missing or inactive ClusterQueue).
pub const REASON_INADMISSIBLE: &str = "Inadmissible";

/// Workload was admitted by the scheduler.
pub const REASON_ADMITTED: &str = "Admitted";
