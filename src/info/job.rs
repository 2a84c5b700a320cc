//! Job descriptions and workload loading.
//!
//! A workload is a JSON array of job records using the upstream generator's
//! key names (`JobID`, `SubmissionTime`, ...). Descriptions are immutable
//! after load and are shared by value between agents.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

// ═══════════════════════════════════════════════════════════════════════════════
// Job Type
// ═══════════════════════════════════════════════════════════════════════════════

/// Workload category of a job, matched against the system type during
/// heuristic bidding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobType {
    Hpc,
    Ai,
    Hybrid,
    Gpu,
    Memory,
    Storage,
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Hpc => "HPC",
            Self::Ai => "AI",
            Self::Hybrid => "HYBRID",
            Self::Gpu => "GPU",
            Self::Memory => "MEMORY",
            Self::Storage => "STORAGE",
        };
        write!(f, "{}", s)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Description
// ═══════════════════════════════════════════════════════════════════════════════

/// An immutable description of one job in the workload.
///
/// Field names mirror the workload generator's JSON schema so that loading
/// and re-serializing a workload round-trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescription {
    #[serde(rename = "JobID")]
    pub job_id: u32,

    #[serde(rename = "UserID")]
    pub user_id: u32,

    #[serde(rename = "GroupID")]
    pub group_id: u32,

    #[serde(rename = "JobType")]
    pub job_type: JobType,

    /// Virtual time at which the job enters the federation, in seconds.
    #[serde(rename = "SubmissionTime")]
    pub submission_time: f64,

    /// Requested walltime, in seconds.
    #[serde(rename = "Walltime")]
    pub walltime: u64,

    #[serde(rename = "Nodes")]
    pub num_nodes: u64,

    #[serde(rename = "RequestedGPU")]
    pub needs_gpu: bool,

    #[serde(rename = "MemoryGB")]
    pub requested_memory_gb: f64,

    #[serde(rename = "RequestedStorageGB")]
    pub requested_storage_gb: f64,

    /// Site the user targeted with this submission.
    #[serde(rename = "HPCSite")]
    pub hpc_site: String,

    /// System the job is initially submitted to.
    #[serde(rename = "HPCSystem")]
    pub hpc_system: String,
}

impl JobDescription {
    /// Serialize for the external script protocol, which uses snake_case
    /// field names rather than the workload file's key names.
    pub fn to_protocol_json(&self) -> serde_json::Value {
        serde_json::json!({
            "job_id": self.job_id,
            "user_id": self.user_id,
            "group_id": self.group_id,
            "job_type": self.job_type.to_string(),
            "submission_time": self.submission_time,
            "walltime": self.walltime,
            "num_nodes": self.num_nodes,
            "needs_gpu": self.needs_gpu,
            "requested_memory_gb": self.requested_memory_gb,
            "requested_storage_gb": self.requested_storage_gb,
            "hpc_site": self.hpc_site,
            "hpc_system": self.hpc_system,
        })
    }
}

impl std::fmt::Display for JobDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Job #{} ({} nodes for {}s, type {}, target {})",
            self.job_id, self.num_nodes, self.walltime, self.job_type, self.hpc_system
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Workload Loading
// ═══════════════════════════════════════════════════════════════════════════════

/// Load a workload file and return its jobs sorted by submission time.
///
/// Ties on submission time keep the file order, so release order stays
/// deterministic.
pub fn load_workload(path: impl AsRef<Path>) -> Result<Vec<JobDescription>> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .map_err(|e| SimError::workload(format!("{}: {}", path.display(), e)))?;

    let mut jobs: Vec<JobDescription> = serde_json::from_str(&contents)
        .map_err(|e| SimError::workload(format!("{}: {}", path.display(), e)))?;

    for job in &jobs {
        if job.job_id < 1 {
            return Err(SimError::workload(format!(
                "job ids start at 1, got {}",
                job.job_id
            )));
        }
        if job.num_nodes < 1 {
            return Err(SimError::workload(format!(
                "Job #{} requests zero nodes",
                job.job_id
            )));
        }
        if job.submission_time < 0.0 {
            return Err(SimError::workload(format!(
                "Job #{} has a negative submission time",
                job.job_id
            )));
        }
    }

    jobs.sort_by(|a, b| a.submission_time.total_cmp(&b.submission_time));
    Ok(jobs)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const WORKLOAD: &str = r#"[
        {"JobID": 2, "UserID": 7, "GroupID": 1, "JobType": "AI",
         "SubmissionTime": 5.0, "Walltime": 120, "Nodes": 1,
         "RequestedGPU": true, "MemoryGB": 8.0, "RequestedStorageGB": 0.0,
         "HPCSite": "SiteB", "HPCSystem": "Sys2"},
        {"JobID": 1, "UserID": 3, "GroupID": 1, "JobType": "HPC",
         "SubmissionTime": 0.0, "Walltime": 60, "Nodes": 2,
         "RequestedGPU": false, "MemoryGB": 4.0, "RequestedStorageGB": 0.0,
         "HPCSite": "SiteA", "HPCSystem": "Sys1"}
    ]"#;

    fn write_workload(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_workload_sorts_by_submission_time() {
        let file = write_workload(WORKLOAD);
        let jobs = load_workload(file.path()).unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].job_id, 1);
        assert_eq!(jobs[1].job_id, 2);
        assert_eq!(jobs[1].job_type, JobType::Ai);
        assert!(jobs[1].needs_gpu);
    }

    #[test]
    fn test_workload_roundtrip() {
        let file = write_workload(WORKLOAD);
        let jobs = load_workload(file.path()).unwrap();

        // Serialize back and compare as JSON values: key set and contents
        // must survive the trip (order of keys is irrelevant).
        let reserialized = serde_json::to_string(&jobs).unwrap();
        let reparsed: serde_json::Value = serde_json::from_str(&reserialized).unwrap();
        let mut original: serde_json::Value = serde_json::from_str(WORKLOAD).unwrap();
        original
            .as_array_mut()
            .unwrap()
            .sort_by_key(|j| j["JobID"].as_u64());

        assert_eq!(reparsed, original);
    }

    #[test]
    fn test_load_workload_rejects_zero_nodes() {
        let file = write_workload(
            r#"[{"JobID": 1, "UserID": 1, "GroupID": 1, "JobType": "HPC",
                 "SubmissionTime": 0.0, "Walltime": 60, "Nodes": 0,
                 "RequestedGPU": false, "MemoryGB": 0.0, "RequestedStorageGB": 0.0,
                 "HPCSite": "S", "HPCSystem": "Sys1"}]"#,
        );
        assert!(load_workload(file.path()).is_err());
    }

    #[test]
    fn test_load_workload_rejects_unknown_job_type() {
        let file = write_workload(
            r#"[{"JobID": 1, "UserID": 1, "GroupID": 1, "JobType": "QUANTUM",
                 "SubmissionTime": 0.0, "Walltime": 60, "Nodes": 1,
                 "RequestedGPU": false, "MemoryGB": 0.0, "RequestedStorageGB": 0.0,
                 "HPCSite": "S", "HPCSystem": "Sys1"}]"#,
        );
        assert!(load_workload(file.path()).is_err());
    }

    #[test]
    fn test_load_workload_missing_file() {
        assert!(load_workload("/nonexistent/workload.json").is_err());
    }
}
