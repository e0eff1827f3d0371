//! Scheduler defaults. Every value can be overridden from the config file.

/// Maximum number of pending heads pulled per ClusterQueue in one cycle.
pub const DEFAULT_HEADS_LIMIT: usize = 16;

/// Attempts made to persist one admission before it is given up for the cycle.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Per-attempt timeout when persisting an admission, in milliseconds.
pub const DEFAULT_ATTEMPT_TIMEOUT_MS: u64 = 2_000;

/// Pause between persistence attempts, in milliseconds.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 100;

/// Deadline for a whole cycle, in milliseconds.
pub const DEFAULT_CYCLE_TIMEOUT_MS: u64 = 10_000;

/// Periodic cycle interval when no trigger arrives, in seconds.
pub const DEFAULT_CYCLE_INTERVAL_SECS: u64 = 5;
