//! Scheduling policies.
//!
//! A policy is the pluggable half of the auction protocol: it decides who
//! hears about a job, what the local bid is, who hears the bid, and how a
//! winner is elected from the collected bids. Policies are expressed as a
//! tagged variant rather than a trait hierarchy; each scheduling agent owns
//! one instance, and the instance also carries the agent's view of the
//! auction bookkeeping (needed/received bid counts, healthy and failed
//! peers).

pub mod centralized;
pub mod heuristic;
pub mod python;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use rand::Rng;
use tracing::debug;

use crate::error::{Result, SimError};
use crate::info::{HpcSystemDescription, HpcSystemStatus, JobDescription};
use crate::messages::{AgentEndpoint, ControlMessage};
use crate::sim::Context;

pub use centralized::{CentralizedPolicy, SystemInfo};
pub use python::BidScript;

// ═══════════════════════════════════════════════════════════════════════════════
// Bids
// ═══════════════════════════════════════════════════════════════════════════════

/// One agent's sealed bid: a value in [-1, 1] (negative declares
/// infeasibility) and a tie-breaker in [0, 100).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bid {
    pub value: f64,
    pub tie_breaker: f64,
}

/// Draw a fresh tie-breaker, uniform in [0, 100).
pub fn draw_tie_breaker<R: Rng>(rng: &mut R) -> f64 {
    rng.gen_range(0.0..100.0)
}

/// Elect the auction winner from the collected bids.
///
/// Highest bid wins; equal bids fall back to the higher tie-breaker; equal
/// tie-breakers fall back to the lexicographically smallest system name, a
/// total order every peer computes identically. Returns `None` iff the map
/// is empty.
pub fn determine_winner(all_bids: &BTreeMap<String, Bid>) -> Option<&str> {
    all_bids
        .iter()
        .max_by(|(name_a, a), (name_b, b)| {
            a.value
                .total_cmp(&b.value)
                .then_with(|| a.tie_breaker.total_cmp(&b.tie_breaker))
                .then_with(|| name_b.cmp(name_a))
        })
        .map(|(name, _)| name.as_str())
}

/// Render the collected bid values for the lifecycle report: two decimals,
/// joined with `:`, in system-name order.
pub fn format_bids(all_bids: &BTreeMap<String, Bid>) -> String {
    let joined = all_bids
        .values()
        .map(|b| format!("{:.2}", b.value))
        .collect::<Vec<_>>()
        .join(":");
    format!("\"{}\"", joined)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Acceptance Tests
// ═══════════════════════════════════════════════════════════════════════════════

/// Why a job cannot run on a system. Checked after an auction win, before
/// batch submission, against the system's static capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptanceFailure {
    GpuUnavailable,
    NotEnoughNodes,
    NotEnoughMemory,
}

impl AcceptanceFailure {
    pub const fn code(&self) -> u8 {
        match self {
            Self::GpuUnavailable => 1,
            Self::NotEnoughNodes => 2,
            Self::NotEnoughMemory => 3,
        }
    }

    pub const fn cause(&self) -> &'static str {
        match self {
            Self::GpuUnavailable => "Job requires GPU while System has none",
            Self::NotEnoughNodes => "Job requires more nodes than the System has",
            Self::NotEnoughMemory => "Job requires more memory than the System has",
        }
    }
}

/// Run the acceptance tests; `None` means the job is feasible. When several
/// tests fail, the highest-numbered failure wins, matching the order the
/// checks overwrite each other.
pub fn acceptance_failure(
    job: &JobDescription,
    system: &HpcSystemDescription,
) -> Option<AcceptanceFailure> {
    let mut failure = None;
    if job.needs_gpu && !system.has_gpu {
        failure = Some(AcceptanceFailure::GpuUnavailable);
    }
    if job.num_nodes > system.num_nodes {
        failure = Some(AcceptanceFailure::NotEnoughNodes);
    }
    if job.requested_memory_gb > system.num_nodes as f64 * system.memory_gb_per_node {
        failure = Some(AcceptanceFailure::NotEnoughMemory);
    }
    failure
}

// ═══════════════════════════════════════════════════════════════════════════════
// Policy
// ═══════════════════════════════════════════════════════════════════════════════

/// The pluggable bid computation.
#[derive(Debug)]
pub enum PolicyKind {
    /// Never forwards; the originating agent is the only bidder.
    PureLocal,
    /// Uniform random bid in [0, 1].
    RandomBidding,
    /// Deterministic scoring of the system's fit for the job.
    HeuristicBidding,
    /// Delegates the bid to an external script.
    PythonBidding(BidScript),
}

/// One scheduling agent's policy instance: the bid computation plus the
/// agent's auction bookkeeping. Mutated only by its owning agent.
#[derive(Debug)]
pub struct Policy {
    kind: PolicyKind,
    num_needed_bids: usize,
    /// Received-bid counters per job, keyed by the counting agent's name.
    num_received_bids: HashMap<u32, HashMap<String, usize>>,
    healthy: Vec<AgentEndpoint>,
    failed: Vec<AgentEndpoint>,
}

impl Policy {
    /// Create a policy by configuration name, mirroring the experiment
    /// description vocabulary.
    pub fn create(
        policy_name: &str,
        bid_script: Option<&Path>,
        interpreter: &str,
    ) -> Result<Self> {
        let kind = match policy_name {
            "PureLocal" => PolicyKind::PureLocal,
            "RandomBidding" => PolicyKind::RandomBidding,
            "HeuristicBidding" => PolicyKind::HeuristicBidding,
            "PythonBidding" => {
                let script = bid_script.ok_or_else(|| {
                    SimError::configuration("PythonBidding requires a bid script")
                })?;
                PolicyKind::PythonBidding(BidScript::new(interpreter, script)?)
            }
            other => return Err(SimError::unknown_policy(other)),
        };
        Ok(Self::new(kind))
    }

    pub fn new(kind: PolicyKind) -> Self {
        Self {
            kind,
            num_needed_bids: 1,
            num_received_bids: HashMap::new(),
            healthy: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn kind(&self) -> &PolicyKind {
        &self.kind
    }

    /// Whether this policy keeps the auction local to the originating agent.
    pub fn is_pure_local(&self) -> bool {
        matches!(self.kind, PolicyKind::PureLocal)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Peer Network
    // ─────────────────────────────────────────────────────────────────────────

    /// Install the full agent network (self included). Also initializes the
    /// needed-bid count: one for a local auction, the quorum size otherwise.
    pub fn set_network(&mut self, network: Vec<AgentEndpoint>) {
        self.healthy = network;
        self.refresh_needed_bids();
    }

    /// Move a peer from the healthy to the failed set. Returns false when
    /// the peer was already gone. Failure is monotone; there is no way back.
    pub fn mark_failed(&mut self, system_name: &str) -> bool {
        let Some(pos) = self
            .healthy
            .iter()
            .position(|a| a.system_name == system_name)
        else {
            return false;
        };
        let agent = self.healthy.remove(pos);
        debug!(failed = %agent.system_name, "Peer excised from the auction quorum");
        self.failed.push(agent);
        self.refresh_needed_bids();
        true
    }

    /// Recompute the needed-bid count from the current healthy set.
    fn refresh_needed_bids(&mut self) {
        self.num_needed_bids = if self.is_pure_local() {
            1
        } else {
            self.healthy.len()
        };
    }

    pub fn healthy_peers(&self) -> &[AgentEndpoint] {
        &self.healthy
    }

    pub fn failed_peers(&self) -> &[AgentEndpoint] {
        &self.failed
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Auction Bookkeeping
    // ─────────────────────────────────────────────────────────────────────────

    pub fn num_needed_bids(&self) -> usize {
        self.num_needed_bids
    }

    /// Count one received bid for `agent_name` on `job_id`.
    pub fn received_bid_for(&mut self, agent_name: &str, job_id: u32) -> usize {
        let counter = self
            .num_received_bids
            .entry(job_id)
            .or_default()
            .entry(agent_name.to_string())
            .or_insert(0);
        *counter += 1;
        *counter
    }

    pub fn num_received_bids(&self, agent_name: &str, job_id: u32) -> usize {
        self.num_received_bids
            .get(&job_id)
            .and_then(|per_agent| per_agent.get(agent_name))
            .copied()
            .unwrap_or(0)
    }

    /// Drop the bookkeeping of a closed auction.
    pub fn forget_job(&mut self, job_id: u32) {
        self.num_received_bids.remove(&job_id);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Protocol Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Step 1 of the auction: initialize the received-bid counters for every
    /// healthy peer (self included) and, unless the policy is purely local,
    /// re-broadcast the job request (non-forwardable) to every other peer.
    pub fn broadcast_job_description(
        &mut self,
        ctx: &mut Context<'_>,
        self_name: &str,
        job: &JobDescription,
    ) {
        let counters = self.num_received_bids.entry(job.job_id).or_default();
        for agent in &self.healthy {
            counters.entry(agent.system_name.clone()).or_insert(0);
        }

        if self.is_pure_local() {
            self.num_needed_bids = 1;
            return;
        }

        for agent in &self.healthy {
            if agent.system_name != self_name {
                ctx.send(
                    agent.actor,
                    ControlMessage::JobRequest {
                        job: job.clone(),
                        can_forward: false,
                    },
                );
            }
        }
    }

    /// Compute the local bid. Returns the bid value and the simulated time
    /// the computation cost; the caller defers the bid broadcast by that
    /// much.
    pub fn compute_bid(
        &self,
        job: &JobDescription,
        system: &HpcSystemDescription,
        status: &HpcSystemStatus,
        now: f64,
    ) -> Result<(f64, f64)> {
        match &self.kind {
            PolicyKind::PureLocal => Ok((1.0, 0.0)),
            PolicyKind::RandomBidding => {
                let bid = rand::thread_rng().gen_range(0.0..=1.0);
                Ok((bid, 0.0))
            }
            PolicyKind::HeuristicBidding => {
                Ok((heuristic::compute_bid(job, system, status, now), 0.0))
            }
            PolicyKind::PythonBidding(script) => script.compute_bid(job, system, status, now),
        }
    }

    /// Step 2 of the auction: fix the needed-bid count to the current quorum
    /// size and send the bid to every healthy peer, self included. A purely
    /// local policy sends the bid only back to the originating agent.
    pub fn broadcast_bid(
        &mut self,
        ctx: &mut Context<'_>,
        bidder: &AgentEndpoint,
        job: &JobDescription,
        bid: f64,
        tie_breaker: f64,
    ) {
        let message = ControlMessage::BidOnJob {
            bidder: bidder.clone(),
            job: job.clone(),
            bid,
            tie_breaker,
        };

        if self.is_pure_local() {
            self.num_needed_bids = 1;
            ctx.send(bidder.actor, message);
            return;
        }

        self.num_needed_bids = self.healthy.len();
        for agent in &self.healthy {
            ctx.send(agent.actor, message.clone());
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
