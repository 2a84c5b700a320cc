//! Job Scheduling Agent.
//!
//! One per HPC system, running on its head node. The agent drives the
//! auction for every job it hears about: on a request it samples its batch
//! service, computes a bid through its policy, and broadcasts the bid after
//! the computation's simulated cost has elapsed; on each incoming bid it
//! tallies the auction and, once all needed bids are in, elects the winner.
//! The winner alone runs the acceptance tests and submits to its local
//! batch service; everyone else discards the job. Lifecycle events stream
//! to the tracker throughout.

use std::collections::{BTreeMap, HashMap};

use rand::thread_rng;
use tracing::{debug, info};

use crate::error::{Result, SimError};
use crate::info::{HpcSystemDescription, HpcSystemStatus, JobDescription};
use crate::messages::{AgentEndpoint, ControlMessage, LifecycleEventKind};
use crate::policies::{
    acceptance_failure, determine_winner, draw_tie_breaker, format_bids, Bid, Policy,
};
use crate::sim::{Actor, ActorId, BatchEventKind, BatchId, Context, EventPayload};

/// Per-site scheduling agent: auction state machine plus local batch
/// submission.
pub struct JobSchedulingAgent {
    name: String,
    endpoint: AgentEndpoint,
    description: HpcSystemDescription,
    policy: Policy,
    batch: BatchId,
    tracker: ActorId,

    /// Collected bids per open auction, keyed by bidder system name.
    all_bids: HashMap<u32, BTreeMap<String, Bid>>,
    /// Descriptions of jobs with an open auction.
    jobs: HashMap<u32, JobDescription>,
    /// Locally computed bids awaiting their deferred broadcast.
    pending_bids: HashMap<u32, f64>,
}

impl JobSchedulingAgent {
    pub fn new(
        endpoint: AgentEndpoint,
        description: HpcSystemDescription,
        policy: Policy,
        batch: BatchId,
        tracker: ActorId,
    ) -> Self {
        Self {
            name: format!("jsa@{}", description.name),
            endpoint,
            description,
            policy,
            batch,
            tracker,
            all_bids: HashMap::new(),
            jobs: HashMap::new(),
            pending_bids: HashMap::new(),
        }
    }

    pub fn system_name(&self) -> &str {
        &self.endpoint.system_name
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Auction: request, bid, tally
    // ─────────────────────────────────────────────────────────────────────────

    fn handle_job_request(
        &mut self,
        ctx: &mut Context<'_>,
        job: JobDescription,
        can_forward: bool,
    ) -> Result<()> {
        debug!(
            agent = %self.name,
            job_id = job.job_id,
            num_nodes = job.num_nodes,
            walltime = job.walltime,
            can_forward = can_forward,
            "Received a job request"
        );

        // An initial submission opens the auction and is re-broadcast
        // (non-forwardable) to the quorum; a re-broadcast is bid on as-is.
        if can_forward {
            self.policy
                .broadcast_job_description(ctx, &self.endpoint.system_name, &job);
        }

        let status = self.sample_status(ctx, &job);
        let (bid, generation_time) =
            self.policy
                .compute_bid(&job, &self.description, &status, ctx.now())?;
        debug!(
            agent = %self.name,
            job_id = job.job_id,
            bid = bid,
            generation_time = generation_time,
            "Computed local bid"
        );

        // The broadcast is deferred by the bid computation's simulated cost.
        let fire_at = ctx.now() + generation_time;
        self.pending_bids.insert(job.job_id, bid);
        let label = format!("bid_{}", job.job_id);
        self.jobs.insert(job.job_id, job);
        ctx.set_timer(fire_at, label);
        Ok(())
    }

    fn handle_bid_timer(&mut self, ctx: &mut Context<'_>, label: &str) -> Result<()> {
        let Some(job_id) = label.strip_prefix("bid_").and_then(|s| s.parse::<u32>().ok()) else {
            return Err(SimError::internal(format!(
                "{}: unexpected timer label '{}'",
                self.name, label
            )));
        };
        let Some(bid) = self.pending_bids.remove(&job_id) else {
            // The auction settled before the deferred broadcast fired.
            return Ok(());
        };
        let Some(job) = self.jobs.get(&job_id).cloned() else {
            return Ok(());
        };

        let tie_breaker = draw_tie_breaker(&mut thread_rng());
        let bidder = self.endpoint.clone();
        self.policy
            .broadcast_bid(ctx, &bidder, &job, bid, tie_breaker);
        Ok(())
    }

    fn handle_bid(
        &mut self,
        ctx: &mut Context<'_>,
        bidder: AgentEndpoint,
        job: JobDescription,
        bid: f64,
        tie_breaker: f64,
    ) -> Result<()> {
        let job_id = job.job_id;
        self.jobs.entry(job_id).or_insert(job);
        self.all_bids
            .entry(job_id)
            .or_default()
            .entry(bidder.system_name.clone())
            .or_insert(Bid {
                value: bid,
                tie_breaker,
            });

        let received = self
            .policy
            .received_bid_for(&self.endpoint.system_name, job_id);
        let needed = self.policy.num_needed_bids();
        debug!(
            agent = %self.name,
            job_id = job_id,
            bidder = %bidder.system_name,
            bid = bid,
            tie_breaker = tie_breaker,
            received = received,
            needed = needed,
            "Received a bid"
        );

        if received == needed {
            self.settle_auction(ctx, job_id)?;
        }
        Ok(())
    }

    /// Close an auction: elect the winner, and if it is this agent, run the
    /// acceptance tests and submit to the local batch service. Every agent
    /// computes the same winner from the same bid map, so no further
    /// coordination is needed.
    fn settle_auction(&mut self, ctx: &mut Context<'_>, job_id: u32) -> Result<()> {
        let Some(bids) = self.all_bids.remove(&job_id) else {
            return Ok(());
        };
        self.policy.forget_job(job_id);
        self.pending_bids.remove(&job_id);
        let job = self.jobs.remove(&job_id);

        let won = determine_winner(&bids) == Some(self.endpoint.system_name.as_str());
        if !won {
            debug!(agent = %self.name, job_id = job_id, "Lost the auction, dropping the job");
            return Ok(());
        }

        let job = job.ok_or_else(|| {
            SimError::internal(format!(
                "{}: won the auction for job {} without its description",
                self.name, job_id
            ))
        })?;
        let bids_string = format_bids(&bids);

        if let Some(failure) = acceptance_failure(&job, &self.description) {
            debug!(
                agent = %self.name,
                job_id = job_id,
                code = failure.code(),
                "Job did not pass acceptance, rejecting"
            );
            self.emit_lifecycle(
                ctx,
                job_id,
                LifecycleEventKind::Reject,
                Some(bids_string),
                Some(failure.cause().to_string()),
            );
            return Ok(());
        }

        info!(
            agent = %self.name,
            job_id = job_id,
            num_nodes = job.num_nodes,
            walltime = job.walltime,
            "Won the auction, submitting to the local batch service"
        );
        self.emit_lifecycle(
            ctx,
            job_id,
            LifecycleEventKind::Scheduling,
            Some(bids_string),
            None,
        );

        let duration = job.walltime as f64 / self.description.walltime_scaling_factor();
        let owner = ctx.self_id();
        ctx.batch_submit(self.batch, owner, job_id, job.num_nodes, duration);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Peer failure
    // ─────────────────────────────────────────────────────────────────────────

    /// A peer was declared dead: shrink the quorum and re-examine every
    /// in-flight auction as if the peer had never bid. Any auction that now
    /// holds bids from every remaining healthy peer settles immediately;
    /// without this, an auction opened before the failure would wait
    /// forever at one missing bid.
    fn handle_peer_failure(&mut self, ctx: &mut Context<'_>, failed_system: &str) -> Result<()> {
        if !self.policy.mark_failed(failed_system) {
            return Ok(());
        }
        info!(
            agent = %self.name,
            failed = failed_system,
            quorum = self.policy.num_needed_bids(),
            "Peer marked as failed"
        );

        let needed = self.policy.num_needed_bids();
        let open: Vec<u32> = self.all_bids.keys().copied().collect();
        for job_id in open {
            let ready = match self.all_bids.get_mut(&job_id) {
                Some(bids) => {
                    bids.remove(failed_system);
                    bids.len() >= needed
                }
                None => false,
            };
            if ready {
                self.settle_auction(ctx, job_id)?;
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn sample_status(&self, ctx: &Context<'_>, job: &JobDescription) -> HpcSystemStatus {
        let batch = ctx.batch(self.batch);
        HpcSystemStatus {
            available_nodes: batch.available_nodes(),
            estimated_start_time: batch.estimate_start_time(job.num_nodes, ctx.now()),
            queue_length: batch.queue_length(),
        }
    }

    fn emit_lifecycle(
        &self,
        ctx: &mut Context<'_>,
        job_id: u32,
        kind: LifecycleEventKind,
        bids: Option<String>,
        failure_cause: Option<String>,
    ) {
        let when = ctx.now();
        ctx.send(
            self.tracker,
            ControlMessage::LifecycleEvent {
                job_id,
                system: self.endpoint.system_name.clone(),
                when,
                kind,
                bids,
                failure_cause,
            },
        );
    }
}

impl Actor for JobSchedulingAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_start(&mut self, _ctx: &mut Context<'_>) -> Result<()> {
        info!(agent = %self.name, system = %self.description, "Job Scheduling Agent starting");
        Ok(())
    }

    fn on_event(&mut self, ctx: &mut Context<'_>, event: EventPayload) -> Result<()> {
        match event {
            EventPayload::Message { message, .. } => match message {
                ControlMessage::JobRequest { job, can_forward } => {
                    self.handle_job_request(ctx, job, can_forward)
                }
                ControlMessage::BidOnJob {
                    bidder,
                    job,
                    bid,
                    tie_breaker,
                } => self.handle_bid(ctx, bidder, job, bid, tie_breaker),
                ControlMessage::HeartbeatFailureNotification { failed_system } => {
                    self.handle_peer_failure(ctx, &failed_system)
                }
                other => Err(SimError::internal(format!(
                    "{}: unexpected message {:?}",
                    self.name, other
                ))),
            },
            EventPayload::Timer { label } => self.handle_bid_timer(ctx, &label),
            EventPayload::Batch(batch_event) => {
                let kind = match batch_event.kind {
                    BatchEventKind::Started => LifecycleEventKind::Start,
                    BatchEventKind::Completed => LifecycleEventKind::Completion,
                    BatchEventKind::Failed => LifecycleEventKind::Fail,
                };
                debug!(
                    agent = %self.name,
                    job_id = batch_event.job_id,
                    event = ?batch_event.kind,
                    "Local batch job event"
                );
                self.emit_lifecycle(ctx, batch_event.job_id, kind, None, None);
                Ok(())
            }
        }
    }
}
