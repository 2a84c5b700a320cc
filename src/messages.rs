//! Control messages exchanged between agents.
//!
//! Messages carry a notional byte size used only for network-cost
//! accounting: point-to-point control traffic is free, auction broadcasts
//! cost a kilobyte. Channels are logically unbounded; the sizes never
//! throttle anything.

use serde::{Deserialize, Serialize};

use crate::info::JobDescription;
use crate::sim::ActorId;

/// Size of a point-to-point control message, in bytes.
pub const CONTROL_MESSAGE_SIZE: u64 = 0;

/// Size of an auction broadcast message, in bytes.
pub const BROADCAST_MESSAGE_SIZE: u64 = 1024;

// ═══════════════════════════════════════════════════════════════════════════════
// Agent Endpoint
// ═══════════════════════════════════════════════════════════════════════════════

/// Identity plus send-endpoint of a scheduling agent. Peers hold these
/// instead of references to each other, which keeps ownership acyclic: each
/// agent owns its own state and only weak handles to everyone else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentEndpoint {
    pub actor: ActorId,
    pub system_name: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Lifecycle Events
// ═══════════════════════════════════════════════════════════════════════════════

/// Kind of a job lifecycle event reported to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LifecycleEventKind {
    Submission,
    Scheduling,
    Reject,
    Start,
    Completion,
    Fail,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Control Messages
// ═══════════════════════════════════════════════════════════════════════════════

/// A message between agents.
#[derive(Debug, Clone)]
pub enum ControlMessage {
    /// A job request sent to a scheduling agent. The initial submission is
    /// forwardable; the auction re-broadcast is not.
    JobRequest {
        job: JobDescription,
        can_forward: bool,
    },

    /// One agent's sealed bid on a job, broadcast to the auction quorum.
    /// The tie-breaker travels with the bid so every peer breaks ties
    /// identically.
    BidOnJob {
        bidder: AgentEndpoint,
        job: JobDescription,
        bid: f64,
        tie_breaker: f64,
    },

    /// Periodic liveness beacon between heartbeat monitors.
    Heartbeat { sender: ActorId },

    /// A monitor telling its paired scheduling agent that a peer is gone.
    HeartbeatFailureNotification { failed_system: String },

    /// A lifecycle event reported to the tracker.
    LifecycleEvent {
        job_id: u32,
        system: String,
        when: f64,
        kind: LifecycleEventKind,
        bids: Option<String>,
        failure_cause: Option<String>,
    },
}

impl ControlMessage {
    /// Notional size of this message on the wire.
    pub fn size_bytes(&self) -> u64 {
        match self {
            Self::JobRequest { can_forward, .. } => {
                if *can_forward {
                    CONTROL_MESSAGE_SIZE
                } else {
                    BROADCAST_MESSAGE_SIZE
                }
            }
            Self::BidOnJob { .. } => BROADCAST_MESSAGE_SIZE,
            Self::Heartbeat { .. }
            | Self::HeartbeatFailureNotification { .. }
            | Self::LifecycleEvent { .. } => CONTROL_MESSAGE_SIZE,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
