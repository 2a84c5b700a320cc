//! Heartbeat Monitor Agent.
//!
//! One per scheduling agent, sharing its head node. On every period tick it
//! broadcasts a heartbeat to its peer monitors and checks how long ago each
//! peer was last heard from; a peer silent for longer than the expiration
//! window is reported to the paired scheduling agent, at most once. The
//! monitor dies with its paired agent.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::messages::ControlMessage;
use crate::sim::{Actor, ActorId, Context, EventPayload};

const HEARTBEAT_TIMER: &str = "heartbeat_timer";

/// A peer monitor and the scheduling agent it watches over.
#[derive(Debug, Clone)]
pub struct MonitorPeer {
    pub monitor: ActorId,
    pub paired_system: String,
}

/// Failure detector paired with one scheduling agent.
pub struct HeartbeatMonitorAgent {
    name: String,
    paired_jsa: ActorId,
    period: f64,
    expiration: f64,
    peers: Vec<MonitorPeer>,
    last_heartbeat: HashMap<ActorId, f64>,
    /// Peers already reported; failure notifications are at-most-once.
    notified: HashSet<ActorId>,
}

impl HeartbeatMonitorAgent {
    pub fn new(
        system_name: &str,
        paired_jsa: ActorId,
        period: f64,
        expiration: f64,
        peers: Vec<MonitorPeer>,
    ) -> Self {
        let last_heartbeat = peers.iter().map(|p| (p.monitor, 0.0)).collect();
        Self {
            name: format!("monitor@{}", system_name),
            paired_jsa,
            period,
            expiration,
            peers,
            last_heartbeat,
            notified: HashSet::new(),
        }
    }

    fn send_heartbeats(&self, ctx: &mut Context<'_>) {
        let sender = ctx.self_id();
        for peer in &self.peers {
            ctx.send(peer.monitor, ControlMessage::Heartbeat { sender });
        }
    }

    fn check_expired_heartbeats(&mut self, ctx: &mut Context<'_>) {
        let now = ctx.now();
        for peer in &self.peers {
            let last = self.last_heartbeat.get(&peer.monitor).copied().unwrap_or(0.0);
            if now - last > self.expiration && !self.notified.contains(&peer.monitor) {
                warn!(
                    monitor = %self.name,
                    peer = %peer.paired_system,
                    last_heartbeat = last,
                    "Peer failed to send heartbeats, notifying the scheduling agent"
                );
                ctx.send(
                    self.paired_jsa,
                    ControlMessage::HeartbeatFailureNotification {
                        failed_system: peer.paired_system.clone(),
                    },
                );
                self.notified.insert(peer.monitor);
            }
        }
    }
}

impl Actor for HeartbeatMonitorAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_start(&mut self, ctx: &mut Context<'_>) -> Result<()> {
        info!(monitor = %self.name, period = self.period, expiration = self.expiration,
            "Heartbeat Monitor Agent starting");
        ctx.set_timer(self.period, HEARTBEAT_TIMER);
        Ok(())
    }

    fn on_event(&mut self, ctx: &mut Context<'_>, event: EventPayload) -> Result<()> {
        match event {
            EventPayload::Timer { .. } => {
                self.send_heartbeats(ctx);
                self.check_expired_heartbeats(ctx);
                let next = ctx.now() + self.period;
                ctx.set_timer(next, HEARTBEAT_TIMER);
            }
            EventPayload::Message {
                message: ControlMessage::Heartbeat { sender },
                ..
            } => {
                debug!(monitor = %self.name, from = sender, "Received heartbeat");
                self.last_heartbeat.insert(sender, ctx.now());
            }
            _ => {}
        }
        Ok(())
    }
}
