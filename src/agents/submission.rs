//! Workload Submission Agent.
//!
//! Releases the workload's jobs at their submission times. In decentralized
//! mode each job goes to the scheduling agent of its targeted system as a
//! forwardable request, seeding the auction. In centralized mode the agent
//! gathers every system's status, asks the centralized policy for the best
//! system, and either sends a non-forwardable request there (a one-bidder
//! auction on the receiving side) or rejects the job outright.

use tracing::{debug, info};

use crate::error::{Result, SimError};
use crate::info::{HpcSystemDescription, JobDescription};
use crate::messages::{AgentEndpoint, ControlMessage, LifecycleEventKind};
use crate::policies::{CentralizedPolicy, SystemInfo};
use crate::sim::{Actor, ActorId, BatchId, Context, EventPayload};

const SUBMIT_TIMER: &str = "submit_next_job";
const CENTRAL_SUBMITTER: &str = "WorkloadCentralizedSubmissionAgent";

/// One reachable scheduling agent, with enough context to snapshot its
/// system for the centralized selector.
#[derive(Debug, Clone)]
pub struct SubmissionTarget {
    pub endpoint: AgentEndpoint,
    pub description: HpcSystemDescription,
    pub batch: BatchId,
}

/// How jobs are routed into the federation.
pub enum SubmissionMode {
    /// Seed the decentralized auction at the job's targeted system.
    Decentralized,
    /// Ask an external selector; no auction.
    Centralized(CentralizedPolicy),
}

/// Releases jobs into the federation at their submission times.
pub struct WorkloadSubmissionAgent {
    name: String,
    jobs: Vec<JobDescription>,
    next: usize,
    targets: Vec<SubmissionTarget>,
    tracker: ActorId,
    mode: SubmissionMode,
}

impl WorkloadSubmissionAgent {
    pub fn new(
        jobs: Vec<JobDescription>,
        targets: Vec<SubmissionTarget>,
        tracker: ActorId,
        mode: SubmissionMode,
    ) -> Self {
        Self {
            name: "workload-submission".to_string(),
            jobs,
            next: 0,
            targets,
            tracker,
            mode,
        }
    }

    fn submit_next(&mut self, ctx: &mut Context<'_>) -> Result<()> {
        let job = self.jobs[self.next].clone();
        match &self.mode {
            SubmissionMode::Decentralized => self.submit_decentralized(ctx, job)?,
            SubmissionMode::Centralized(policy) => self.submit_centralized(ctx, job, policy)?,
        }

        self.next += 1;
        if self.next < self.jobs.len() {
            ctx.set_timer(self.jobs[self.next].submission_time, SUBMIT_TIMER);
        }
        Ok(())
    }

    fn submit_decentralized(&self, ctx: &mut Context<'_>, job: JobDescription) -> Result<()> {
        let target = self
            .targets
            .iter()
            .find(|t| t.endpoint.system_name == job.hpc_system)
            .ok_or_else(|| {
                SimError::internal(format!(
                    "Job #{} targets unknown system '{}'",
                    job.job_id, job.hpc_system
                ))
            })?;

        info!(
            job_id = job.job_id,
            target = %job.hpc_system,
            submission_time = job.submission_time,
            "Releasing job to its scheduling agent"
        );
        self.emit_submission(ctx, job.job_id, &job.hpc_system);
        ctx.send(
            target.endpoint.actor,
            ControlMessage::JobRequest {
                job,
                can_forward: true,
            },
        );
        Ok(())
    }

    fn submit_centralized(
        &self,
        ctx: &mut Context<'_>,
        job: JobDescription,
        policy: &CentralizedPolicy,
    ) -> Result<()> {
        let systems: Vec<SystemInfo> = self
            .targets
            .iter()
            .map(|t| {
                let batch = ctx.batch(t.batch);
                SystemInfo {
                    description: t.description.clone(),
                    status: crate::info::HpcSystemStatus {
                        available_nodes: batch.available_nodes(),
                        estimated_start_time: batch.estimate_start_time(job.num_nodes, ctx.now()),
                        queue_length: batch.queue_length(),
                    },
                }
            })
            .collect();

        match policy.select_best_system(&job, &systems, ctx.now())? {
            None => {
                info!(job_id = job.job_id, "No feasible system, rejecting the job");
                let when = ctx.now();
                ctx.send(
                    self.tracker,
                    ControlMessage::LifecycleEvent {
                        job_id: job.job_id,
                        system: CENTRAL_SUBMITTER.to_string(),
                        when,
                        kind: LifecycleEventKind::Reject,
                        bids: None,
                        failure_cause: Some("No feasible HPC system".to_string()),
                    },
                );
            }
            Some(selected) => {
                let target = self
                    .targets
                    .iter()
                    .find(|t| t.endpoint.system_name == selected)
                    .ok_or_else(|| {
                        SimError::internal(format!("selected system '{}' has no agent", selected))
                    })?;
                debug!(
                    job_id = job.job_id,
                    selected = %selected,
                    "Sending job to the centrally-selected system"
                );
                self.emit_submission(ctx, job.job_id, &selected);
                ctx.send(
                    target.endpoint.actor,
                    ControlMessage::JobRequest {
                        job,
                        can_forward: false,
                    },
                );
            }
        }
        Ok(())
    }

    fn emit_submission(&self, ctx: &mut Context<'_>, job_id: u32, system: &str) {
        let when = ctx.now();
        ctx.send(
            self.tracker,
            ControlMessage::LifecycleEvent {
                job_id,
                system: system.to_string(),
                when,
                kind: LifecycleEventKind::Submission,
                bids: None,
                failure_cause: None,
            },
        );
    }
}

impl Actor for WorkloadSubmissionAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_start(&mut self, ctx: &mut Context<'_>) -> Result<()> {
        info!(total_jobs = self.jobs.len(), "Workload Submission Agent starting");
        if let Some(first) = self.jobs.first() {
            ctx.set_timer(first.submission_time, SUBMIT_TIMER);
        }
        Ok(())
    }

    fn on_event(&mut self, ctx: &mut Context<'_>, event: EventPayload) -> Result<()> {
        if let EventPayload::Timer { .. } = event {
            if self.next < self.jobs.len() {
                self.submit_next(ctx)?;
            }
        }
        Ok(())
    }
}
