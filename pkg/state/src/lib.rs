pub mod client;
pub mod workloads;
