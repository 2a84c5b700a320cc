//! # swarm-sched
//!
//! A discrete-event simulator of a federation of independent HPC sites.
//! Each site runs an autonomous scheduling agent; incoming jobs are placed
//! through a first-price sealed-bid auction between the agents (or, in
//! centralized mode, by an external selector). The simulator produces a
//! full lifecycle trace per job: submission, bidding, scheduling decision,
//! start, completion/failure/rejection, and the derived latencies.
//!
//! ## Architecture
//!
//! - **Kernel** (`sim`): virtual clock, deterministic event loop, actors,
//!   hosts with power state, batch compute services
//! - **Policies** (`policies`): pluggable bid computation and winner
//!   election, including external-process policies
//! - **Agents** (`agents`): per-site schedulers, heartbeat failure
//!   detectors, workload submission, lifecycle tracking, failure injection
//! - **Composer** (`simulation`): builds a federation from an experiment
//!   description and runs it to completion

pub mod agents;
pub mod config;
pub mod error;
pub mod info;
pub mod messages;
pub mod platform;
pub mod policies;
pub mod sim;
pub mod simulation;
pub mod telemetry;

pub use error::{ErrorCode, ErrorContext, Result, SimError};

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::agents::{
        HeartbeatMonitorAgent, JobLifecycleTrackerAgent, JobSchedulingAgent,
        ResourceSwitchingAgent, TrackerState, WorkloadSubmissionAgent,
    };
    pub use crate::config::ExperimentConfig;
    pub use crate::error::{ErrorCode, Result, SimError};
    pub use crate::info::{
        FinalStatus, HpcSystemDescription, HpcSystemStatus, JobDescription, JobLifecycle, JobType,
        ResourceType,
    };
    pub use crate::messages::{AgentEndpoint, ControlMessage, LifecycleEventKind};
    pub use crate::policies::{determine_winner, Bid, CentralizedPolicy, Policy, PolicyKind};
    pub use crate::sim::{Actor, ActorId, Context, Simulation};
    pub use crate::simulation::run_experiment;
}
