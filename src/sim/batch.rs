//! Batch compute service.
//!
//! One per cluster, owned by the kernel. Agents consume it through three
//! queries (available nodes, queue length, start-time estimate) and a
//! submission call; the service reports Started / Completed / Failed events
//! back to the submitting agent. Admission is FCFS with one core per node.

use std::collections::VecDeque;

use tracing::debug;

use super::{ActorId, BatchEventKind, BatchId, BatchJobEvent, EventPayload, EventQueue, QueueEntry};

#[derive(Debug)]
struct Node {
    name: String,
    up: bool,
    /// Job currently occupying this node, if any.
    running: Option<u32>,
}

#[derive(Debug)]
struct WaitingJob {
    owner: ActorId,
    job_id: u32,
    num_nodes: u64,
    duration: f64,
}

#[derive(Debug)]
struct RunningJob {
    owner: ActorId,
    job_id: u32,
    nodes: Vec<usize>,
    end: f64,
}

/// A batch compute service over the compute nodes of one cluster.
pub struct BatchService {
    id: BatchId,
    cluster: String,
    nodes: Vec<Node>,
    waiting: VecDeque<WaitingJob>,
    running: Vec<RunningJob>,
}

impl BatchService {
    pub(super) fn new(id: BatchId, cluster: String, compute_nodes: Vec<String>) -> Self {
        let nodes = compute_nodes
            .into_iter()
            .map(|name| Node {
                name,
                up: true,
                running: None,
            })
            .collect();
        Self {
            id,
            cluster,
            nodes,
            waiting: VecDeque::new(),
            running: Vec::new(),
        }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Number of idle, powered-on compute nodes.
    pub fn available_nodes(&self) -> u64 {
        self.nodes
            .iter()
            .filter(|n| n.up && n.running.is_none())
            .count() as u64
    }

    /// Number of jobs admitted but not yet started.
    pub fn queue_length(&self) -> usize {
        self.waiting.len()
    }

    /// Conservative start-time estimate for a hypothetical job needing
    /// `num_nodes` nodes: replay the running jobs' releases and the FCFS
    /// waiting queue, and return the earliest time the job could start
    /// behind everything already admitted. Returns infinity when the
    /// request can never be satisfied with the nodes currently up.
    pub fn estimate_start_time(&self, num_nodes: u64, now: f64) -> f64 {
        let mut free = self.available_nodes();
        // (release time, nodes released), kept sorted by time.
        let mut releases: Vec<(f64, u64)> = self
            .running
            .iter()
            .map(|r| (r.end, r.nodes.len() as u64))
            .collect();
        releases.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut t = now;
        fn admit(needed: u64, free: &mut u64, t: &mut f64, releases: &mut Vec<(f64, u64)>) -> bool {
            while *free < needed {
                if releases.is_empty() {
                    return false;
                }
                let (release_time, count) = releases.remove(0);
                *t = t.max(release_time);
                *free += count;
            }
            true
        }

        for job in &self.waiting {
            if !admit(job.num_nodes, &mut free, &mut t, &mut releases) {
                return f64::INFINITY;
            }
            free -= job.num_nodes;
            let end = t + job.duration;
            let pos = releases.partition_point(|(rt, _)| *rt <= end);
            releases.insert(pos, (end, job.num_nodes));
        }

        if !admit(num_nodes, &mut free, &mut t, &mut releases) {
            return f64::INFINITY;
        }
        t
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Submission and progress
    // ─────────────────────────────────────────────────────────────────────────

    /// Admit a job. Dispatch happens immediately if enough idle nodes
    /// exist, otherwise the job waits in FCFS order.
    pub(super) fn submit(
        &mut self,
        owner: ActorId,
        job_id: u32,
        num_nodes: u64,
        duration: f64,
        queue: &mut EventQueue,
    ) {
        debug!(
            cluster = %self.cluster,
            job_id = job_id,
            num_nodes = num_nodes,
            duration = duration,
            "Batch job admitted"
        );
        self.waiting.push_back(WaitingJob {
            owner,
            job_id,
            num_nodes,
            duration,
        });
        self.dispatch(queue);
    }

    /// Complete every running job whose end time has been reached, then
    /// dispatch from the waiting queue.
    pub(super) fn advance(&mut self, queue: &mut EventQueue) {
        let now = queue.now();
        let mut i = 0;
        while i < self.running.len() {
            if self.running[i].end <= now {
                let job = self.running.remove(i);
                for n in &job.nodes {
                    self.nodes[*n].running = None;
                }
                debug!(cluster = %self.cluster, job_id = job.job_id, "Batch job completed");
                self.notify(queue, job.owner, job.job_id, BatchEventKind::Completed);
            } else {
                i += 1;
            }
        }
        self.dispatch(queue);
    }

    /// React to a compute node powering on or off. Powering off fails any
    /// job occupying the node; powering on restores capacity.
    pub(super) fn on_host_power(&mut self, host: &str, on: bool, queue: &mut EventQueue) {
        let Some(idx) = self.nodes.iter().position(|n| n.name == host) else {
            return;
        };
        self.nodes[idx].up = on;
        if !on {
            if let Some(job_id) = self.nodes[idx].running {
                if let Some(pos) = self.running.iter().position(|r| r.job_id == job_id) {
                    let job = self.running.remove(pos);
                    for n in &job.nodes {
                        self.nodes[*n].running = None;
                    }
                    debug!(
                        cluster = %self.cluster,
                        job_id = job.job_id,
                        host = host,
                        "Batch job failed: compute node powered off"
                    );
                    self.notify(queue, job.owner, job.job_id, BatchEventKind::Failed);
                }
            }
        } else {
            self.dispatch(queue);
        }
    }

    /// FCFS dispatch: start the head of the waiting queue for as long as
    /// enough idle nodes exist.
    fn dispatch(&mut self, queue: &mut EventQueue) {
        let now = queue.now();
        loop {
            match self.waiting.front() {
                Some(front) if self.available_nodes() >= front.num_nodes => {}
                _ => break,
            }
            let Some(job) = self.waiting.pop_front() else {
                break;
            };
            let mut assigned = Vec::with_capacity(job.num_nodes as usize);
            for (i, node) in self.nodes.iter_mut().enumerate() {
                if assigned.len() as u64 == job.num_nodes {
                    break;
                }
                if node.up && node.running.is_none() {
                    node.running = Some(job.job_id);
                    assigned.push(i);
                }
            }
            let end = now + job.duration;
            debug!(
                cluster = %self.cluster,
                job_id = job.job_id,
                start = now,
                end = end,
                "Batch job started"
            );
            self.notify(queue, job.owner, job.job_id, BatchEventKind::Started);
            queue.push_at(end, QueueEntry::BatchAdvance { batch: self.id });
            self.running.push(RunningJob {
                owner: job.owner,
                job_id: job.job_id,
                nodes: assigned,
                end,
            });
        }
    }

    fn notify(&self, queue: &mut EventQueue, owner: ActorId, job_id: u32, kind: BatchEventKind) {
        let now = queue.now();
        queue.push_at(
            now,
            QueueEntry::Deliver {
                target: owner,
                payload: EventPayload::Batch(BatchJobEvent { job_id, kind }),
            },
        );
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn make_service(nodes: usize) -> (BatchService, EventQueue) {
        let names = (0..nodes).map(|i| format!("node{}", i)).collect();
        (
            BatchService::new(0, "Sys1".to_string(), names),
            EventQueue::new(),
        )
    }

    #[test]
    fn test_idle_service_reports_all_nodes_available() {
        let (service, _) = make_service(4);
        assert_eq!(service.available_nodes(), 4);
        assert_eq!(service.queue_length(), 0);
        assert_eq!(service.estimate_start_time(2, 0.0), 0.0);
    }

    #[test]
    fn test_submit_dispatches_immediately_when_idle() {
        let (mut service, mut queue) = make_service(4);
        service.submit(0, 1, 2, 10.0, &mut queue);

        assert_eq!(service.available_nodes(), 2);
        assert_eq!(service.queue_length(), 0);
    }

    #[test]
    fn test_submit_queues_when_full() {
        let (mut service, mut queue) = make_service(4);
        service.submit(0, 1, 4, 10.0, &mut queue);
        service.submit(0, 2, 1, 5.0, &mut queue);

        assert_eq!(service.available_nodes(), 0);
        assert_eq!(service.queue_length(), 1);
        // Job 2 can only start when job 1 releases its nodes at t=10.
        assert_eq!(service.estimate_start_time(1, 0.0), 10.0);
    }

    #[test]
    fn test_estimate_accounts_for_waiting_queue() {
        let (mut service, mut queue) = make_service(4);
        service.submit(0, 1, 4, 10.0, &mut queue);
        service.submit(0, 2, 4, 20.0, &mut queue);

        // A hypothetical 4-node job starts after both: t = 10 + 20.
        assert_eq!(service.estimate_start_time(4, 0.0), 30.0);
    }

    #[test]
    fn test_estimate_is_infinite_when_request_cannot_fit() {
        let (service, _) = make_service(2);
        assert!(service.estimate_start_time(3, 0.0).is_infinite());
    }

    #[test]
    fn test_advance_completes_and_dispatches() {
        let (mut service, mut queue) = make_service(2);
        service.submit(0, 1, 2, 10.0, &mut queue);
        service.submit(0, 2, 2, 5.0, &mut queue);

        queue.now = 10.0;
        service.advance(&mut queue);

        // Job 1 is done, job 2 now occupies the nodes.
        assert_eq!(service.queue_length(), 0);
        assert_eq!(service.available_nodes(), 0);
    }

    #[test]
    fn test_powering_off_occupied_node_fails_the_job() {
        let (mut service, mut queue) = make_service(2);
        service.submit(0, 1, 2, 10.0, &mut queue);

        service.on_host_power("node0", false, &mut queue);

        assert_eq!(service.queue_length(), 0);
        // node0 down, node1 freed by the failure.
        assert_eq!(service.available_nodes(), 1);
    }

    #[test]
    fn test_powering_node_back_on_restores_capacity() {
        let (mut service, mut queue) = make_service(2);
        service.on_host_power("node0", false, &mut queue);
        assert_eq!(service.available_nodes(), 1);

        service.on_host_power("node0", true, &mut queue);
        assert_eq!(service.available_nodes(), 2);
    }
}
