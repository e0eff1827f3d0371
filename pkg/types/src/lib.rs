//! Object model shared by the admission core.

pub mod assignment;
pub mod cluster_queue;
pub mod config;
pub mod error;
pub mod flavor;
pub mod quantity;
pub mod queue;
pub mod validate;
pub mod workload;

pub use error::{Error, ObjectKind, Result};
pub use quantity::Quantity;
