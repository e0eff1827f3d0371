//! Centralized constants for the kq project.
//!
//! All project-wide constant values live here.
//! Change a value in one place and it applies everywhere.

pub mod paths;
pub mod resources;
pub mod scheduler;
pub mod state;
pub mod workload;
