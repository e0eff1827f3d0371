//! Filesystem path constants.

/// Default config file path for the server.
pub const DEFAULT_SERVER_CONFIG: &str = "/etc/kq/config.yaml";

/// Default manifest with flavors, cluster queues, queues and workloads.
pub const DEFAULT_MANIFEST: &str = "/etc/kq/manifest.yaml";

/// Default data directory for the server state store.
pub const DEFAULT_SERVER_DATA_DIR: &str = "/tmp/kq-data";
