//! State store key layout.

/// Key prefix for persisted workloads. Full key = `prefix + namespace + "/" + name`.
pub const WORKLOADS_PREFIX: &str = "/registry/workloads/";
