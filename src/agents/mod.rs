//! The simulated agents: per-site schedulers, their heartbeat monitors, the
//! workload submitter, the lifecycle tracker, and the failure injector.

pub mod heartbeat;
pub mod scheduler;
pub mod submission;
pub mod switching;
pub mod tracker;

pub use heartbeat::{HeartbeatMonitorAgent, MonitorPeer};
pub use scheduler::JobSchedulingAgent;
pub use submission::{SubmissionMode, SubmissionTarget, WorkloadSubmissionAgent};
pub use switching::{load_failure_profile, FailureEvent, ResourceSwitchingAgent};
pub use tracker::{JobLifecycleTrackerAgent, SharedTrackerState, TrackerState};
