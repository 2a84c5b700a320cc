//! Top-level composition.
//!
//! Wires a full federation from an experiment description: hosts and batch
//! services from the platform, one scheduling agent and heartbeat monitor
//! per cluster, the lifecycle tracker, the workload submission agent, and
//! (when a failure profile is given) the resource switching agent. Runs the
//! event loop to completion and hands back the tracker's record book.

use tracing::info;

use crate::agents::{
    load_failure_profile, HeartbeatMonitorAgent, JobLifecycleTrackerAgent, JobSchedulingAgent,
    MonitorPeer, ResourceSwitchingAgent, SubmissionMode, SubmissionTarget, TrackerState,
    WorkloadSubmissionAgent,
};
use crate::config::ExperimentConfig;
use crate::error::{Result, SimError};
use crate::info::load_workload;
use crate::messages::AgentEndpoint;
use crate::platform::{system_description, Platform};
use crate::policies::{CentralizedPolicy, Policy, PolicyKind};
use crate::sim::Simulation;

/// The host carrying the federation-level agents (submission, tracker,
/// failure injection). It is never part of a cluster and never fails.
const USER_HOST: &str = "UserHost";

/// Build and run one experiment, returning the tracker's final state.
pub fn run_experiment(config: &ExperimentConfig) -> Result<TrackerState> {
    let platform = Platform::load(&config.platform)?;
    let workload = load_workload(&config.workload)?;

    let mut sim = Simulation::new(config.max_simulated_time);

    // ── Hosts and batch services ─────────────────────────────────────────
    sim.add_host(USER_HOST, None);
    let mut descriptions = Vec::new();
    let mut batches = Vec::new();
    for cluster in &platform.clusters {
        for host in &cluster.hosts {
            sim.add_host(host.clone(), Some(cluster.name.clone()));
        }
        descriptions.push(system_description(cluster)?);
        batches.push(sim.add_batch_service(cluster.name.clone(), cluster.compute_nodes().to_vec()));
    }

    // Every job must target a system that exists.
    for job in &workload {
        if !descriptions.iter().any(|d| d.name == job.hpc_system) {
            return Err(SimError::configuration(format!(
                "Job #{} targets unknown HPC system '{}'",
                job.job_id, job.hpc_system
            )));
        }
    }

    // ── Actor slots ──────────────────────────────────────────────────────
    // Reserved up front so agents can be built knowing everyone's id.
    let tracker_id = sim.reserve_actor(USER_HOST)?;
    let mut jsa_ids = Vec::new();
    let mut monitor_ids = Vec::new();
    for cluster in &platform.clusters {
        jsa_ids.push(sim.reserve_actor(cluster.head_node())?);
        monitor_ids.push(sim.reserve_actor(cluster.head_node())?);
    }
    let submission_id = sim.reserve_actor(USER_HOST)?;

    let endpoints: Vec<AgentEndpoint> = jsa_ids
        .iter()
        .zip(&descriptions)
        .map(|(&actor, description)| AgentEndpoint {
            actor,
            system_name: description.name.clone(),
        })
        .collect();

    // ── Tracker ──────────────────────────────────────────────────────────
    let (tracker, tracker_state) = JobLifecycleTrackerAgent::new(&workload)?;
    sim.install_actor(tracker_id, Box::new(tracker));

    // ── Scheduling agents and their monitors ─────────────────────────────
    for (i, description) in descriptions.iter().enumerate() {
        // Under centralized submission the placement decision is already
        // made when a request arrives, so every agent runs a one-bidder
        // local auction.
        let mut policy = if config.centralized_submission {
            Policy::new(PolicyKind::PureLocal)
        } else {
            Policy::create(
                &config.decentralized_policy,
                config.decentralized_bidder.as_deref(),
                &config.script_interpreter,
            )?
        };
        policy.set_network(endpoints.clone());

        let jsa = JobSchedulingAgent::new(
            endpoints[i].clone(),
            description.clone(),
            policy,
            batches[i],
            tracker_id,
        );
        sim.install_actor(jsa_ids[i], Box::new(jsa));

        let peers: Vec<MonitorPeer> = (0..descriptions.len())
            .filter(|&j| j != i)
            .map(|j| MonitorPeer {
                monitor: monitor_ids[j],
                paired_system: descriptions[j].name.clone(),
            })
            .collect();
        let monitor = HeartbeatMonitorAgent::new(
            &description.name,
            jsa_ids[i],
            config.heartbeat_period,
            config.heartbeat_expiration,
            peers,
        );
        sim.install_actor(monitor_ids[i], Box::new(monitor));
        sim.link_death(jsa_ids[i], monitor_ids[i]);
    }

    // ── Workload submission ──────────────────────────────────────────────
    let targets: Vec<SubmissionTarget> = endpoints
        .iter()
        .zip(&descriptions)
        .zip(&batches)
        .map(|((endpoint, description), &batch)| SubmissionTarget {
            endpoint: endpoint.clone(),
            description: description.clone(),
            batch,
        })
        .collect();
    let mode = if config.centralized_submission {
        let script = config.centralized_policy.as_deref().ok_or_else(|| {
            SimError::configuration("Centralized submission requires 'centralized_policy'")
        })?;
        SubmissionMode::Centralized(CentralizedPolicy::new(&config.script_interpreter, script)?)
    } else {
        SubmissionMode::Decentralized
    };
    let submitter = WorkloadSubmissionAgent::new(workload.clone(), targets, tracker_id, mode);
    sim.install_actor(submission_id, Box::new(submitter));

    // ── Failure injection ────────────────────────────────────────────────
    if let Some(profile) = &config.hardware_failure_profile {
        let events = load_failure_profile(profile)?;
        sim.add_actor(USER_HOST, Box::new(ResourceSwitchingAgent::new(events)))?;
    }

    info!(
        clusters = platform.clusters.len(),
        jobs = workload.len(),
        centralized = config.centralized_submission,
        policy = %config.decentralized_policy,
        "Simulation assembled, starting the event loop"
    );

    sim.run()?;

    let state = tracker_state.borrow().clone();
    info!(
        end_time = sim.now(),
        completed = state.completed,
        failed = state.failed,
        rejected = state.rejected,
        "Simulation finished"
    );
    Ok(state)
}
