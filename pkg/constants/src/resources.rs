//! Well-known resource names.

pub const RESOURCE_CPU: &str = "cpu";
pub const RESOURCE_MEMORY: &str = "memory";
pub const RESOURCE_GPU: &str = "nvidia.com/gpu";

/// Number of milli-units in one whole unit of a quantity.
pub const MILLIS_PER_UNIT: i64 = 1000;
