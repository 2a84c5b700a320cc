//! Discrete-event simulation kernel.
//!
//! A single-threaded cooperative kernel: every agent is a logical actor
//! driven by the virtual clock, one event is delivered to one actor at a
//! time, and a handler runs to completion before any other actor observes
//! time advancing. Events scheduled for the same virtual time are delivered
//! in scheduling order (a global sequence number), which makes delivery
//! FIFO per sender/receiver pair and the whole run deterministic.
//!
//! The kernel also owns what the protocol layer treats as infrastructure:
//! hosts with a power state (grouped into clusters), network links, the
//! batch compute services, and death links between paired actors.

pub mod batch;

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use tracing::{debug, trace, warn};

use crate::error::{Result, SimError};
use crate::messages::ControlMessage;

use batch::BatchService;

/// Identifies an actor within one simulation.
pub type ActorId = usize;

/// Identifies a batch compute service within one simulation.
pub type BatchId = usize;

// ═══════════════════════════════════════════════════════════════════════════════
// Events
// ═══════════════════════════════════════════════════════════════════════════════

/// What a batch service reports back to the agent that submitted a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchEventKind {
    Started,
    Completed,
    Failed,
}

/// A batch job event delivered to the owning agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchJobEvent {
    pub job_id: u32,
    pub kind: BatchEventKind,
}

/// Payload delivered to an actor's event handler.
#[derive(Debug, Clone)]
pub enum EventPayload {
    /// A message from another actor.
    Message {
        from: ActorId,
        message: ControlMessage,
    },
    /// A timer previously set by this actor.
    Timer { label: String },
    /// A notification from this actor's batch compute service.
    Batch(BatchJobEvent),
}

#[derive(Debug)]
enum QueueEntry {
    Deliver {
        target: ActorId,
        payload: EventPayload,
    },
    /// Internal wake-up for a batch service (job completions, dispatch).
    BatchAdvance { batch: BatchId },
}

#[derive(Debug)]
struct ScheduledEvent {
    time: f64,
    seq: u64,
    entry: QueueEntry,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Earliest time first, then scheduling order. BinaryHeap is a
        // max-heap, so the comparison is reversed.
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Event Queue
// ═══════════════════════════════════════════════════════════════════════════════

/// The virtual clock and the pending-event heap.
pub struct EventQueue {
    now: f64,
    next_seq: u64,
    heap: BinaryHeap<ScheduledEvent>,
    stop_requested: bool,
}

impl EventQueue {
    fn new() -> Self {
        Self {
            now: 0.0,
            next_seq: 0,
            heap: BinaryHeap::new(),
            stop_requested: false,
        }
    }

    /// Current virtual time, in seconds.
    pub fn now(&self) -> f64 {
        self.now
    }

    fn push_at(&mut self, time: f64, entry: QueueEntry) {
        let time = time.max(self.now);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(ScheduledEvent { time, seq, entry });
    }

    fn pop(&mut self) -> Option<ScheduledEvent> {
        self.heap.pop()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Hosts
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
struct Host {
    name: String,
    cluster: Option<String>,
    powered_on: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Actor Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// A simulated agent. Handlers are invoked by the kernel, one event at a
/// time; all interaction with the outside world goes through the [`Context`].
pub trait Actor {
    /// Human-readable actor name, used in logs.
    fn name(&self) -> &str;

    /// Called once, at virtual time zero, before any event is delivered.
    fn on_start(&mut self, _ctx: &mut Context<'_>) -> Result<()> {
        Ok(())
    }

    /// Called for every event addressed to this actor.
    fn on_event(&mut self, ctx: &mut Context<'_>, event: EventPayload) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Simulation Core
// ═══════════════════════════════════════════════════════════════════════════════

/// Kernel state shared with actors through [`Context`]: the clock, the
/// queue, hosts, links, batch services, and liveness bookkeeping.
pub struct SimCore {
    queue: EventQueue,
    hosts: Vec<Host>,
    host_index: HashMap<String, usize>,
    link_powered: HashMap<String, bool>,
    batches: Vec<BatchService>,
    actor_names: Vec<String>,
    actor_hosts: Vec<usize>,
    actor_alive: Vec<bool>,
    /// When the first actor dies, the second is killed too.
    death_links: Vec<(ActorId, ActorId)>,
    pending_kills: Vec<ActorId>,
}

impl SimCore {
    fn new() -> Self {
        Self {
            queue: EventQueue::new(),
            hosts: Vec::new(),
            host_index: HashMap::new(),
            link_powered: HashMap::new(),
            batches: Vec::new(),
            actor_names: Vec::new(),
            actor_hosts: Vec::new(),
            actor_alive: Vec::new(),
            death_links: Vec::new(),
            pending_kills: Vec::new(),
        }
    }

    fn host_id(&self, name: &str) -> Result<usize> {
        self.host_index
            .get(name)
            .copied()
            .ok_or_else(|| SimError::internal(format!("unknown host '{}'", name)))
    }

    fn kill_actor(&mut self, id: ActorId) {
        if self.actor_alive[id] {
            self.actor_alive[id] = false;
            debug!(actor = %self.actor_names[id], time = self.queue.now(), "Actor killed");
            // Cascade through death links.
            let dependents: Vec<ActorId> = self
                .death_links
                .iter()
                .filter(|(owner, _)| *owner == id)
                .map(|(_, dep)| *dep)
                .collect();
            for dep in dependents {
                self.kill_actor(dep);
            }
        }
    }

    fn set_host_power(&mut self, host: &str, on: bool) -> Result<()> {
        let host_id = self.host_id(host)?;
        if self.hosts[host_id].powered_on == on {
            return Ok(());
        }
        self.hosts[host_id].powered_on = on;
        debug!(host = host, on = on, time = self.queue.now(), "Host power switched");

        if !on {
            // Actors placed on the host die with it.
            let victims: Vec<ActorId> = (0..self.actor_hosts.len())
                .filter(|&a| self.actor_hosts[a] == host_id && self.actor_alive[a])
                .collect();
            for v in victims {
                self.pending_kills.push(v);
            }
        }

        // Batch services with this host as a compute node adjust capacity;
        // powering off fails the jobs occupying the node.
        let host_name = self.hosts[host_id].name.clone();
        for batch in &mut self.batches {
            batch.on_host_power(&host_name, on, &mut self.queue);
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Context
// ═══════════════════════════════════════════════════════════════════════════════

/// The kernel interface handed to an actor for the duration of one handler.
pub struct Context<'a> {
    core: &'a mut SimCore,
    self_id: ActorId,
}

impl Context<'_> {
    /// Current virtual time, in seconds.
    pub fn now(&self) -> f64 {
        self.core.queue.now()
    }

    /// This actor's id.
    pub fn self_id(&self) -> ActorId {
        self.self_id
    }

    /// Send a message to another actor. Delivery is immediate in virtual
    /// time but strictly after the current handler returns; per-pair order
    /// is FIFO. The message's notional byte size is accounted for logging
    /// only, never flow control.
    pub fn send(&mut self, to: ActorId, message: ControlMessage) {
        trace!(
            from = %self.core.actor_names[self.self_id],
            to = %self.core.actor_names[to],
            size_bytes = message.size_bytes(),
            "Message sent"
        );
        let now = self.core.queue.now();
        self.core.queue.push_at(
            now,
            QueueEntry::Deliver {
                target: to,
                payload: EventPayload::Message {
                    from: self.self_id,
                    message,
                },
            },
        );
    }

    /// Arm a timer that fires back into this actor at the given virtual
    /// time (clamped to now).
    pub fn set_timer(&mut self, at: f64, label: impl Into<String>) {
        self.core.queue.push_at(
            at,
            QueueEntry::Deliver {
                target: self.self_id,
                payload: EventPayload::Timer {
                    label: label.into(),
                },
            },
        );
    }

    /// Ask the kernel to end the run once this handler returns.
    pub fn request_stop(&mut self) {
        self.core.queue.stop_requested = true;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Batch service access
    // ─────────────────────────────────────────────────────────────────────────

    /// Read-only queries against a batch compute service.
    pub fn batch(&self, id: BatchId) -> &BatchService {
        &self.core.batches[id]
    }

    /// Submit a job to a batch compute service. The service reports
    /// Started / Completed / Failed events back to `owner`.
    pub fn batch_submit(
        &mut self,
        id: BatchId,
        owner: ActorId,
        job_id: u32,
        num_nodes: u64,
        duration: f64,
    ) {
        let SimCore { queue, batches, .. } = self.core;
        batches[id].submit(owner, job_id, num_nodes, duration, queue);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Infrastructure control (resource switching)
    // ─────────────────────────────────────────────────────────────────────────

    /// Names of the hosts of a cluster, head node first.
    pub fn cluster_hosts(&self, cluster: &str) -> Vec<String> {
        self.core
            .hosts
            .iter()
            .filter(|h| h.cluster.as_deref() == Some(cluster))
            .map(|h| h.name.clone())
            .collect()
    }

    /// Power a host on or off. Powering off kills the actors placed on the
    /// host and fails the batch jobs occupying it.
    pub fn set_host_power(&mut self, host: &str, on: bool) -> Result<()> {
        self.core.set_host_power(host, on)
    }

    /// Power a network link on or off. Link state is recorded for the
    /// failure trace; message delivery itself is not degraded.
    pub fn set_link_power(&mut self, link: &str, on: bool) {
        self.core.link_powered.insert(link.to_string(), on);
        debug!(link = link, on = on, time = self.now(), "Link power switched");
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Simulation
// ═══════════════════════════════════════════════════════════════════════════════

/// The simulation: kernel state plus the actor arena.
pub struct Simulation {
    core: SimCore,
    actors: Vec<Option<Box<dyn Actor>>>,
    /// Virtual-time safety horizon; the run aborts past it.
    horizon: f64,
}

impl Simulation {
    pub fn new(horizon: f64) -> Self {
        Self {
            core: SimCore::new(),
            actors: Vec::new(),
            horizon,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Construction
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a host. Hosts belonging to a cluster are schedulable batch
    /// resources; standalone hosts only place actors.
    pub fn add_host(&mut self, name: impl Into<String>, cluster: Option<String>) {
        let name = name.into();
        let id = self.core.hosts.len();
        self.core.host_index.insert(name.clone(), id);
        self.core.hosts.push(Host {
            name,
            cluster,
            powered_on: true,
        });
    }

    /// Register a batch compute service over the given compute nodes.
    pub fn add_batch_service(&mut self, cluster: impl Into<String>, compute_nodes: Vec<String>) -> BatchId {
        let id = self.core.batches.len();
        self.core
            .batches
            .push(BatchService::new(id, cluster.into(), compute_nodes));
        id
    }

    /// Reserve an actor slot on a host, returning its id. The actor itself
    /// is supplied later with [`Simulation::install_actor`]; this two-phase
    /// construction lets mutually-referencing agents learn each other's ids
    /// before any of them is built.
    pub fn reserve_actor(&mut self, host: &str) -> Result<ActorId> {
        let host_id = self.core.host_id(host)?;
        let id = self.actors.len();
        self.actors.push(None);
        self.core.actor_names.push(format!("actor-{}", id));
        self.core.actor_hosts.push(host_id);
        self.core.actor_alive.push(true);
        Ok(id)
    }

    /// Install an actor into a reserved slot.
    pub fn install_actor(&mut self, id: ActorId, actor: Box<dyn Actor>) {
        self.core.actor_names[id] = actor.name().to_string();
        self.actors[id] = Some(actor);
    }

    /// Reserve and install in one step, for actors with no forward references.
    pub fn add_actor(&mut self, host: &str, actor: Box<dyn Actor>) -> Result<ActorId> {
        let id = self.reserve_actor(host)?;
        self.install_actor(id, actor);
        Ok(id)
    }

    /// When `owner` dies, `dependent` is killed too.
    pub fn link_death(&mut self, owner: ActorId, dependent: ActorId) {
        self.core.death_links.push((owner, dependent));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Execution
    // ─────────────────────────────────────────────────────────────────────────

    /// Run the simulation until the event queue drains, an actor requests a
    /// stop, or the virtual-time horizon is crossed.
    pub fn run(&mut self) -> Result<()> {
        // Start every installed actor at virtual time zero, in id order.
        for id in 0..self.actors.len() {
            if self.actors[id].is_none() && self.core.actor_alive[id] {
                return Err(SimError::internal(format!(
                    "actor slot {} was reserved but never installed",
                    id
                )));
            }
        }
        for id in 0..self.actors.len() {
            if self.core.actor_alive[id] {
                self.dispatch(id, None)?;
            }
        }

        while !self.core.queue.stop_requested {
            let Some(event) = self.core.queue.pop() else {
                debug!(time = self.core.queue.now(), "Event queue drained");
                break;
            };
            if event.time > self.horizon {
                warn!(
                    horizon = self.horizon,
                    "Virtual-time horizon crossed, aborting the run"
                );
                break;
            }
            self.core.queue.now = event.time;

            match event.entry {
                QueueEntry::Deliver { target, payload } => {
                    if !self.core.actor_alive[target] {
                        trace!(
                            target = %self.core.actor_names[target],
                            "Dropped event for dead actor"
                        );
                        continue;
                    }
                    self.dispatch(target, Some(payload))?;
                }
                QueueEntry::BatchAdvance { batch } => {
                    let SimCore { queue, batches, .. } = &mut self.core;
                    batches[batch].advance(queue);
                }
            }
        }
        Ok(())
    }

    /// Deliver one event (or the start signal) to one actor, then apply any
    /// deaths the handler caused.
    fn dispatch(&mut self, id: ActorId, payload: Option<EventPayload>) -> Result<()> {
        let mut actor = self.actors[id]
            .take()
            .ok_or_else(|| SimError::internal("actor is already executing"))?;
        let mut ctx = Context {
            core: &mut self.core,
            self_id: id,
        };
        let outcome = match payload {
            Some(payload) => actor.on_event(&mut ctx, payload),
            None => actor.on_start(&mut ctx),
        };
        self.actors[id] = Some(actor);
        outcome?;

        // Deaths requested during the handler (host power-off, cascades).
        while let Some(victim) = self.core.pending_kills.pop() {
            self.core.kill_actor(victim);
        }
        // Drop dead actors' state.
        for a in 0..self.actors.len() {
            if !self.core.actor_alive[a] {
                self.actors[a] = None;
            }
        }
        Ok(())
    }

    /// Current virtual time (after `run`, the time the run ended).
    pub fn now(&self) -> f64 {
        self.core.queue.now()
    }

    /// Whether an actor is still alive.
    pub fn is_alive(&self, id: ActorId) -> bool {
        self.core.actor_alive[id]
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    /// Idle test actor that optionally arms one timer at start.
    struct Recorder {
        name: String,
        chain: Option<(f64, String)>,
    }

    impl Recorder {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                chain: None,
            }
        }
    }

    impl Actor for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        fn on_start(&mut self, ctx: &mut Context<'_>) -> Result<()> {
            if let Some((at, label)) = self.chain.take() {
                ctx.set_timer(at, label);
            }
            Ok(())
        }

        fn on_event(&mut self, _ctx: &mut Context<'_>, _event: EventPayload) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_timers_fire_in_virtual_time_order() {
        let mut sim = Simulation::new(1e9);
        sim.add_host("h", None);

        let mut a = Recorder::new("a");
        a.chain = Some((10.0, "late".to_string()));
        let mut b = Recorder::new("b");
        b.chain = Some((5.0, "early".to_string()));

        sim.add_actor("h", Box::new(a)).unwrap();
        sim.add_actor("h", Box::new(b)).unwrap();
        sim.run().unwrap();

        assert_eq!(sim.now(), 10.0);
    }

    #[test]
    fn test_same_time_events_fire_in_scheduling_order() {
        // Two timers at the same instant keep their scheduling order; the
        // actor errors out of the run if they arrive out of order.
        let mut sim = Simulation::new(1e9);
        sim.add_host("h", None);

        struct TwoTimers {
            expected: Vec<&'static str>,
        }
        impl Actor for TwoTimers {
            fn name(&self) -> &str {
                "two-timers"
            }
            fn on_start(&mut self, ctx: &mut Context<'_>) -> Result<()> {
                ctx.set_timer(3.0, "first");
                ctx.set_timer(3.0, "second");
                Ok(())
            }
            fn on_event(&mut self, _ctx: &mut Context<'_>, event: EventPayload) -> Result<()> {
                let EventPayload::Timer { label } = event else {
                    return Ok(());
                };
                if self.expected.is_empty() || label != self.expected.remove(0) {
                    return Err(SimError::internal(format!("unexpected timer '{}'", label)));
                }
                Ok(())
            }
        }

        sim.add_actor(
            "h",
            Box::new(TwoTimers {
                expected: vec!["first", "second"],
            }),
        )
        .unwrap();
        assert!(sim.run().is_ok());
    }

    #[test]
    fn test_host_power_off_kills_resident_actors() {
        let mut sim = Simulation::new(1e9);
        sim.add_host("head", None);
        sim.add_host("other", None);

        struct Killer {
            victim_host: String,
        }
        impl Actor for Killer {
            fn name(&self) -> &str {
                "killer"
            }
            fn on_start(&mut self, ctx: &mut Context<'_>) -> Result<()> {
                ctx.set_timer(1.0, "switch");
                Ok(())
            }
            fn on_event(&mut self, ctx: &mut Context<'_>, _event: EventPayload) -> Result<()> {
                ctx.set_host_power(&self.victim_host, false)?;
                Ok(())
            }
        }

        let victim = sim.add_actor("head", Box::new(Recorder::new("victim"))).unwrap();
        let killer = sim
            .add_actor(
                "other",
                Box::new(Killer {
                    victim_host: "head".to_string(),
                }),
            )
            .unwrap();

        sim.run().unwrap();
        assert!(!sim.is_alive(victim));
        assert!(sim.is_alive(killer));
    }

    #[test]
    fn test_death_links_cascade() {
        let mut sim = Simulation::new(1e9);
        sim.add_host("head", None);
        sim.add_host("other", None);

        struct Suicide;
        impl Actor for Suicide {
            fn name(&self) -> &str {
                "suicide"
            }
            fn on_start(&mut self, ctx: &mut Context<'_>) -> Result<()> {
                ctx.set_timer(1.0, "die");
                Ok(())
            }
            fn on_event(&mut self, ctx: &mut Context<'_>, _event: EventPayload) -> Result<()> {
                let host = "head".to_string();
                ctx.set_host_power(&host, false)?;
                Ok(())
            }
        }

        let owner = sim.add_actor("head", Box::new(Recorder::new("owner"))).unwrap();
        let dependent = sim
            .add_actor("other", Box::new(Recorder::new("dependent")))
            .unwrap();
        sim.link_death(owner, dependent);
        sim.add_actor("other", Box::new(Suicide)).unwrap();

        sim.run().unwrap();
        assert!(!sim.is_alive(owner));
        assert!(!sim.is_alive(dependent));
    }

    #[test]
    fn test_horizon_aborts_runaway_runs() {
        let mut sim = Simulation::new(100.0);
        sim.add_host("h", None);

        struct Forever;
        impl Actor for Forever {
            fn name(&self) -> &str {
                "forever"
            }
            fn on_start(&mut self, ctx: &mut Context<'_>) -> Result<()> {
                ctx.set_timer(1.0, "tick");
                Ok(())
            }
            fn on_event(&mut self, ctx: &mut Context<'_>, _event: EventPayload) -> Result<()> {
                let next = ctx.now() + 1.0;
                ctx.set_timer(next, "tick");
                Ok(())
            }
        }

        sim.add_actor("h", Box::new(Forever)).unwrap();
        sim.run().unwrap();
        assert!(sim.now() <= 100.0);
    }
}
