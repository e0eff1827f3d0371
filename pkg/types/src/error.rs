//! Error type shared by the cache, the queue manager and the scheduler.

use thiserror::Error;

/// Result alias used across the admission core.
pub type Result<T> = std::result::Result<T, Error>;

/// Kind of object a `NotFound` refers to. Renders as the object's API kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Queue,
    ClusterQueue,
    ResourceFlavor,
    Workload,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectKind::Queue => write!(f, "Queue"),
            ObjectKind::ClusterQueue => write!(f, "ClusterQueue"),
            ObjectKind::ResourceFlavor => write!(f, "ResourceFlavor"),
            ObjectKind::Workload => write!(f, "Workload"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Unknown queue, ClusterQueue, flavor or workload reference.
    /// The message is the one persisted on the workload's condition.
    #[error("{kind} {name} doesn't exist")]
    NotFound { kind: ObjectKind, name: String },

    /// ClusterQueue references a flavor that is currently missing.
    #[error("ClusterQueue {0} is inactive")]
    Inactive(String),

    /// No flavor combination satisfies the request.
    #[error("workload {workload} doesn't fit in ClusterQueue {cluster_queue}")]
    Infeasible {
        workload: String,
        cluster_queue: String,
    },

    /// The stored workload changed while the admission was being recorded.
    #[error("conflict while recording admission of workload {0}")]
    PersistenceConflict(String),

    /// An operation did not finish within its deadline.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Usage would go negative or above a ceiling. Never corrected silently.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Definition rejected before touching any state.
    #[error("invalid definition: {0}")]
    Invalid(String),

    /// Backing store failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    pub fn not_found(kind: ObjectKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    /// Whether retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::PersistenceConflict(_) | Error::Timeout(_) | Error::Storage(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_messages_match_status_vocabulary() {
        assert_eq!(
            Error::not_found(ObjectKind::Queue, "main").to_string(),
            "Queue main doesn't exist"
        );
        assert_eq!(
            Error::not_found(ObjectKind::ClusterQueue, "fooclusterqueue").to_string(),
            "ClusterQueue fooclusterqueue doesn't exist"
        );
        assert_eq!(
            Error::Inactive("P1".to_string()).to_string(),
            "ClusterQueue P1 is inactive"
        );
    }

    #[test]
    fn retryable_errors() {
        assert!(Error::PersistenceConflict("ns/a".into()).is_retryable());
        assert!(Error::Timeout("persist".into()).is_retryable());
        assert!(!Error::invariant("negative").is_retryable());
        assert!(!Error::not_found(ObjectKind::Workload, "ns/a").is_retryable());
    }
}
