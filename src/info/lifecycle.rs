//! Per-job lifecycle records.
//!
//! One record per workload job, owned exclusively by the lifecycle tracker.
//! Setters derive the documented latencies and enforce event ordering:
//! deriving a latency from an unset predecessor is a programmer error.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

// ═══════════════════════════════════════════════════════════════════════════════
// Final Status
// ═══════════════════════════════════════════════════════════════════════════════

/// Terminal (or not-yet-terminal) status of a job.
///
/// The status is monotone: PENDING -> SCHEDULED -> {COMPLETED, FAILED}, or
/// PENDING -> REJECTED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FinalStatus {
    Pending,
    Scheduled,
    Completed,
    Failed,
    Rejected,
}

impl FinalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Rejected)
    }
}

impl std::fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Scheduled => "SCHEDULED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Rejected => "REJECTED",
        };
        write!(f, "{}", s)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Lifecycle
// ═══════════════════════════════════════════════════════════════════════════════

/// Timestamps and derived latencies for one job, filled in as lifecycle
/// events arrive.
#[derive(Debug, Clone)]
pub struct JobLifecycle {
    job_id: u32,
    submitted_to: String,
    scheduled_on: Option<String>,

    submission_time: f64,
    scheduling_time: Option<f64>,
    start_time: Option<f64>,
    end_time: Option<f64>,

    // Derived quantities
    decision_time: Option<f64>,  // scheduling - submission
    waiting_time: Option<f64>,   // start - scheduling
    execution_time: Option<f64>, // end - start

    bids: Option<String>,
    final_status: FinalStatus,
    failure_cause: Option<String>,
}

impl JobLifecycle {
    /// Create a pending record from the workload entry.
    pub fn new(job_id: u32, submitted_to: impl Into<String>, submission_time: f64) -> Self {
        Self {
            job_id,
            submitted_to: submitted_to.into(),
            scheduled_on: None,
            submission_time,
            scheduling_time: None,
            start_time: None,
            end_time: None,
            decision_time: None,
            waiting_time: None,
            execution_time: None,
            bids: None,
            final_status: FinalStatus::Pending,
            failure_cause: None,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Event Setters
    // ─────────────────────────────────────────────────────────────────────────

    /// Record the scheduling decision; derives the decision time.
    pub fn set_scheduling_time(&mut self, when: f64) -> Result<()> {
        if self.submission_time < 0.0 {
            return Err(SimError::lifecycle_order(format!(
                "Job #{}: scheduling recorded before submission",
                self.job_id
            )));
        }
        self.scheduling_time = Some(when);
        self.decision_time = Some(when - self.submission_time);
        self.final_status = FinalStatus::Scheduled;
        Ok(())
    }

    /// Record the batch start; derives the waiting time.
    pub fn set_start_time(&mut self, when: f64) -> Result<()> {
        let scheduling = self.scheduling_time.ok_or_else(|| {
            SimError::lifecycle_order(format!(
                "Job #{}: start recorded before scheduling",
                self.job_id
            ))
        })?;
        self.start_time = Some(when);
        self.waiting_time = Some(when - scheduling);
        Ok(())
    }

    /// Record completion or failure; derives the execution time.
    pub fn set_end_time(&mut self, when: f64) -> Result<()> {
        let start = self.start_time.ok_or_else(|| {
            SimError::lifecycle_order(format!(
                "Job #{}: end recorded before start",
                self.job_id
            ))
        })?;
        self.end_time = Some(when);
        self.execution_time = Some(when - start);
        Ok(())
    }

    /// Record a rejection; the decision time of a rejected job runs to the
    /// rejection instant.
    pub fn set_reject_time(&mut self, when: f64) {
        self.end_time = Some(when);
        self.decision_time = Some(when - self.submission_time);
    }

    pub fn set_submitted_to(&mut self, system: impl Into<String>) {
        self.submitted_to = system.into();
    }

    pub fn set_scheduled_on(&mut self, system: impl Into<String>) {
        self.scheduled_on = Some(system.into());
    }

    pub fn set_bids(&mut self, bids: impl Into<String>) {
        self.bids = Some(bids.into());
    }

    pub fn set_final_status(&mut self, status: FinalStatus) {
        self.final_status = status;
    }

    pub fn set_failure_cause(&mut self, cause: impl Into<String>) {
        self.failure_cause = Some(cause.into());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn job_id(&self) -> u32 {
        self.job_id
    }

    pub fn submitted_to(&self) -> &str {
        &self.submitted_to
    }

    pub fn scheduled_on(&self) -> Option<&str> {
        self.scheduled_on.as_deref()
    }

    pub fn submission_time(&self) -> f64 {
        self.submission_time
    }

    pub fn scheduling_time(&self) -> Option<f64> {
        self.scheduling_time
    }

    pub fn start_time(&self) -> Option<f64> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<f64> {
        self.end_time
    }

    pub fn decision_time(&self) -> Option<f64> {
        self.decision_time
    }

    pub fn waiting_time(&self) -> Option<f64> {
        self.waiting_time
    }

    pub fn execution_time(&self) -> Option<f64> {
        self.execution_time
    }

    pub fn final_status(&self) -> FinalStatus {
        self.final_status
    }

    pub fn failure_cause(&self) -> Option<&str> {
        self.failure_cause.as_deref()
    }

    pub fn bids(&self) -> Option<&str> {
        self.bids.as_deref()
    }

    /// Turnaround time: decision time alone for rejected jobs, otherwise
    /// decision + waiting + execution, if all are known.
    pub fn turnaround_time(&self) -> Option<f64> {
        match self.final_status {
            FinalStatus::Rejected => self.decision_time,
            _ => match (self.decision_time, self.waiting_time, self.execution_time) {
                (Some(d), Some(w), Some(e)) => Some(d + w + e),
                _ => None,
            },
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // CSV Export
    // ─────────────────────────────────────────────────────────────────────────

    /// The CSV header matching `to_csv_row`.
    pub const CSV_HEADER: &'static str = "JobId,FinalStatus,SubmittedTo,ScheduledOn,SubmissionTime,SchedulingTime,StartTime,EndTime,DecisionTime,WaitingTime,ExecutionTime,Bids,FailureCause";

    /// One CSV row; unset timestamps are exported as -1.
    pub fn to_csv_row(&self) -> String {
        fn t(v: Option<f64>) -> String {
            match v {
                Some(v) => format!("{:.2}", v),
                None => "-1".to_string(),
            }
        }

        format!(
            "{},{},{},{},{:.2},{},{},{},{},{},{},{},{}",
            self.job_id,
            self.final_status,
            self.submitted_to,
            self.scheduled_on.as_deref().unwrap_or(""),
            self.submission_time,
            t(self.scheduling_time),
            t(self.start_time),
            t(self.end_time),
            t(self.decision_time),
            t(self.waiting_time),
            t(self.execution_time),
            self.bids.as_deref().unwrap_or("\"\""),
            self.failure_cause.as_deref().unwrap_or(""),
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_latencies() {
        let mut lc = JobLifecycle::new(1, "Sys1", 10.0);
        lc.set_scheduling_time(12.0).unwrap();
        lc.set_start_time(15.0).unwrap();
        lc.set_end_time(75.0).unwrap();

        assert_eq!(lc.decision_time(), Some(2.0));
        assert_eq!(lc.waiting_time(), Some(3.0));
        assert_eq!(lc.execution_time(), Some(60.0));
    }

    #[test]
    fn test_start_before_scheduling_is_an_error() {
        let mut lc = JobLifecycle::new(1, "Sys1", 0.0);
        assert!(lc.set_start_time(5.0).is_err());
    }

    #[test]
    fn test_end_before_start_is_an_error() {
        let mut lc = JobLifecycle::new(1, "Sys1", 0.0);
        lc.set_scheduling_time(1.0).unwrap();
        assert!(lc.set_end_time(5.0).is_err());
    }

    #[test]
    fn test_rejected_turnaround_is_decision_time() {
        let mut lc = JobLifecycle::new(1, "Sys1", 10.0);
        lc.set_reject_time(12.5);
        lc.set_final_status(FinalStatus::Rejected);

        assert_eq!(lc.turnaround_time(), Some(2.5));
    }

    #[test]
    fn test_completed_turnaround_sums_phases() {
        let mut lc = JobLifecycle::new(1, "Sys1", 0.0);
        lc.set_scheduling_time(1.0).unwrap();
        lc.set_start_time(2.0).unwrap();
        lc.set_end_time(4.0).unwrap();
        lc.set_final_status(FinalStatus::Completed);

        assert_eq!(lc.turnaround_time(), Some(4.0));
    }

    #[test]
    fn test_csv_row_with_unset_fields() {
        let lc = JobLifecycle::new(3, "Sys2", 7.0);
        let row = lc.to_csv_row();
        assert!(row.starts_with("3,PENDING,Sys2,,7.00,-1,-1,-1,"));
    }

    #[test]
    fn test_status_terminality() {
        assert!(FinalStatus::Completed.is_terminal());
        assert!(FinalStatus::Rejected.is_terminal());
        assert!(!FinalStatus::Pending.is_terminal());
        assert!(!FinalStatus::Scheduled.is_terminal());
    }
}
