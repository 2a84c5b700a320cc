//! Job Lifecycle Tracker Agent.
//!
//! A single actor that folds lifecycle events into per-job records and, when
//! every job has reached a terminal status, ends the run. The collected
//! state is shared with the composer through a handle so the final report
//! can be rendered after the simulation, whether or not it ran to
//! completion.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use tracing::{debug, info};

use crate::error::{Result, SimError};
use crate::info::{FinalStatus, JobDescription, JobLifecycle};
use crate::messages::{ControlMessage, LifecycleEventKind};
use crate::sim::{Actor, Context, EventPayload};

// ═══════════════════════════════════════════════════════════════════════════════
// Tracker State and Report
// ═══════════════════════════════════════════════════════════════════════════════

/// The tracker's record book: one lifecycle per job plus terminal counters.
#[derive(Debug, Clone)]
pub struct TrackerState {
    pub lifecycles: Vec<JobLifecycle>,
    pub completed: usize,
    pub failed: usize,
    pub rejected: usize,
}

/// Shared handle to the tracker state. The simulation is single-threaded;
/// the composer only reads it after the run.
pub type SharedTrackerState = Rc<RefCell<TrackerState>>;

impl TrackerState {
    /// Every job has reached a terminal status.
    pub fn is_finished(&self) -> bool {
        self.completed + self.failed + self.rejected >= self.lifecycles.len()
    }

    /// Write the per-job CSV report.
    pub fn write_csv(&self, out: &mut impl Write) -> std::io::Result<()> {
        writeln!(out, "{}", JobLifecycle::CSV_HEADER)?;
        for lifecycle in &self.lifecycles {
            writeln!(out, "{}", lifecycle.to_csv_row())?;
        }
        Ok(())
    }

    /// Write the aggregate statistics (avg/min/max/count per metric).
    pub fn write_summary(&self, out: &mut impl Write) -> std::io::Result<()> {
        let mut decision = Aggregate::default();
        let mut waiting = Aggregate::default();
        let mut execution = Aggregate::default();
        let mut turnaround = Aggregate::default();

        for lifecycle in &self.lifecycles {
            decision.record(lifecycle.decision_time());
            waiting.record(lifecycle.waiting_time());
            execution.record(lifecycle.execution_time());
            turnaround.record(lifecycle.turnaround_time());
        }

        decision.write("DecisionTime", out)?;
        waiting.write("WaitingTime", out)?;
        execution.write("ExecutionTime", out)?;
        turnaround.write("TurnaroundTime", out)?;
        Ok(())
    }
}

/// Streaming avg/min/max/count accumulator over optional samples.
#[derive(Debug, Default)]
struct Aggregate {
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
    count: usize,
}

impl Aggregate {
    fn record(&mut self, sample: Option<f64>) {
        let Some(v) = sample else { return };
        if v < 0.0 {
            return;
        }
        self.sum += v;
        self.min = Some(self.min.map_or(v, |m| m.min(v)));
        self.max = Some(self.max.map_or(v, |m| m.max(v)));
        self.count += 1;
    }

    fn write(&self, name: &str, out: &mut impl Write) -> std::io::Result<()> {
        match (self.min, self.max) {
            (Some(min), Some(max)) if self.count > 0 => writeln!(
                out,
                "{}: avg={} min={} max={} (n={})",
                name,
                self.sum / self.count as f64,
                min,
                max,
                self.count
            ),
            _ => writeln!(out, "{}: no valid samples", name),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tracker Agent
// ═══════════════════════════════════════════════════════════════════════════════

/// Consumes lifecycle events and maintains the shared record book.
pub struct JobLifecycleTrackerAgent {
    name: String,
    state: SharedTrackerState,
}

impl JobLifecycleTrackerAgent {
    /// Pre-create one pending lifecycle per job, indexed by `job_id - 1`.
    pub fn new(jobs: &[JobDescription]) -> Result<(Self, SharedTrackerState)> {
        let mut lifecycles: Vec<Option<JobLifecycle>> = vec![None; jobs.len()];
        for job in jobs {
            let pos = job.job_id as usize - 1;
            let slot = lifecycles.get_mut(pos).ok_or_else(|| {
                SimError::workload(format!(
                    "Job ids must be 1..={}, got {}",
                    jobs.len(),
                    job.job_id
                ))
            })?;
            if slot.is_some() {
                return Err(SimError::workload(format!("duplicate job id {}", job.job_id)));
            }
            *slot = Some(JobLifecycle::new(
                job.job_id,
                job.hpc_system.clone(),
                job.submission_time,
            ));
        }
        let lifecycles = lifecycles.into_iter().flatten().collect();

        let state = Rc::new(RefCell::new(TrackerState {
            lifecycles,
            completed: 0,
            failed: 0,
            rejected: 0,
        }));
        let tracker = Self {
            name: "lifecycle-tracker".to_string(),
            state: Rc::clone(&state),
        };
        Ok((tracker, state))
    }

    fn apply(
        &mut self,
        job_id: u32,
        system: String,
        when: f64,
        kind: LifecycleEventKind,
        bids: Option<String>,
        failure_cause: Option<String>,
    ) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let pos = job_id as usize - 1;
        if pos >= state.lifecycles.len() {
            return Err(SimError::internal(format!(
                "lifecycle event for unknown job {}",
                job_id
            )));
        }

        match kind {
            LifecycleEventKind::Submission => {
                info!(job_id = job_id, submitted_to = %system, "Job submitted");
                if !system.is_empty() {
                    state.lifecycles[pos].set_submitted_to(system);
                }
            }
            LifecycleEventKind::Scheduling => {
                info!(job_id = job_id, scheduled_on = %system, "Job scheduled");
                let lifecycle = &mut state.lifecycles[pos];
                if lifecycle.scheduling_time().is_none() {
                    lifecycle.set_scheduling_time(when)?;
                }
                lifecycle.set_scheduled_on(system);
                if let Some(bids) = bids {
                    lifecycle.set_bids(bids);
                }
            }
            LifecycleEventKind::Reject => {
                info!(job_id = job_id, on = %system, cause = ?failure_cause, "Job rejected");
                if !state.lifecycles[pos].final_status().is_terminal() {
                    let lifecycle = &mut state.lifecycles[pos];
                    lifecycle.set_reject_time(when);
                    lifecycle.set_final_status(FinalStatus::Rejected);
                    lifecycle.set_scheduled_on(system);
                    if let Some(bids) = bids {
                        lifecycle.set_bids(bids);
                    }
                    if let Some(cause) = failure_cause {
                        lifecycle.set_failure_cause(cause);
                    }
                    state.rejected += 1;
                }
            }
            LifecycleEventKind::Start => {
                info!(job_id = job_id, "Job started");
                let lifecycle = &mut state.lifecycles[pos];
                if lifecycle.start_time().is_none() {
                    lifecycle.set_start_time(when)?;
                }
            }
            LifecycleEventKind::Completion => {
                info!(job_id = job_id, "Job completed");
                if !state.lifecycles[pos].final_status().is_terminal() {
                    state.lifecycles[pos].set_end_time(when)?;
                    state.lifecycles[pos].set_final_status(FinalStatus::Completed);
                    state.completed += 1;
                }
            }
            LifecycleEventKind::Fail => {
                info!(job_id = job_id, "Job failed");
                if !state.lifecycles[pos].final_status().is_terminal() {
                    state.lifecycles[pos].set_end_time(when)?;
                    state.lifecycles[pos].set_final_status(FinalStatus::Failed);
                    state.failed += 1;
                }
            }
        }
        Ok(())
    }
}

impl Actor for JobLifecycleTrackerAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_start(&mut self, ctx: &mut Context<'_>) -> Result<()> {
        let total = self.state.borrow().lifecycles.len();
        info!(total_jobs = total, "Job Lifecycle Tracker Agent starting");
        if total == 0 {
            ctx.request_stop();
        }
        Ok(())
    }

    fn on_event(&mut self, ctx: &mut Context<'_>, event: EventPayload) -> Result<()> {
        let EventPayload::Message {
            message:
                ControlMessage::LifecycleEvent {
                    job_id,
                    system,
                    when,
                    kind,
                    bids,
                    failure_cause,
                },
            ..
        } = event
        else {
            return Ok(());
        };

        self.apply(job_id, system, when, kind, bids, failure_cause)?;

        let state = self.state.borrow();
        if state.is_finished() {
            info!(
                completed = state.completed,
                failed = state.failed,
                rejected = state.rejected,
                "All jobs reached a terminal status"
            );
            drop(state);
            ctx.request_stop();
        } else {
            debug!(
                completed = state.completed,
                failed = state.failed,
                rejected = state.rejected,
                total = state.lifecycles.len(),
                "Lifecycle progress"
            );
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
