//! Immutable descriptions and per-job tracking records shared by the agents.

pub mod job;
pub mod lifecycle;
pub mod system;

pub use job::{load_workload, JobDescription, JobType};
pub use lifecycle::{FinalStatus, JobLifecycle};
pub use system::{HpcSystemDescription, HpcSystemStatus, ResourceType};
