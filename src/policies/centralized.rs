//! Centralized scheduling policy.
//!
//! In centralized mode there is no auction: the submission agent gathers
//! every system's description and current status and asks an external
//! selector script for the single best system. The script answers with a
//! system name, or null when no system can run the job.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::warn;

use crate::error::{Result, SimError};
use crate::info::{HpcSystemDescription, HpcSystemStatus, JobDescription};

use super::python::run_script;

/// One system's view offered to the selector.
#[derive(Debug, Clone)]
pub struct SystemInfo {
    pub description: HpcSystemDescription,
    pub status: HpcSystemStatus,
}

/// A configured external selector script.
#[derive(Debug, Clone)]
pub struct CentralizedPolicy {
    interpreter: String,
    script: PathBuf,
}

impl CentralizedPolicy {
    /// Configure a selector script; the script file must exist.
    pub fn new(interpreter: &str, script: &Path) -> Result<Self> {
        if !script.exists() {
            return Err(SimError::script_not_found(script.display().to_string()));
        }
        Ok(Self {
            interpreter: interpreter.to_string(),
            script: script.to_path_buf(),
        })
    }

    /// Ask the selector for the best system. `Ok(None)` means no feasible
    /// system exists and the job must be rejected.
    pub fn select_best_system(
        &self,
        job: &JobDescription,
        systems: &[SystemInfo],
        now: f64,
    ) -> Result<Option<String>> {
        if systems.is_empty() {
            return Ok(None);
        }

        let systems_json: Vec<Value> = systems
            .iter()
            .map(|info| {
                serde_json::json!({
                    "system_name": info.description.name,
                    "description": info.description,
                    "status": info.status,
                })
            })
            .collect();
        let input = serde_json::json!({
            "job_description": job.to_protocol_json(),
            "current_simulated_time": now,
            "systems": systems_json,
        });

        let response = run_script(&self.interpreter, &self.script, &input)?;
        match response.get("selected_system") {
            Some(Value::String(name)) => {
                if systems.iter().any(|s| &s.description.name == name) {
                    Ok(Some(name.clone()))
                } else {
                    warn!(selected = %name, "Selector returned an unknown system name");
                    Ok(None)
                }
            }
            Some(Value::Null) => Ok(None),
            _ => Err(SimError::script_protocol(
                "'selected_system' not found or invalid type",
            )),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::{JobType, ResourceType};
    use std::io::Write as _;

    fn make_job() -> JobDescription {
        JobDescription {
            job_id: 1,
            user_id: 1,
            group_id: 1,
            job_type: JobType::Hpc,
            submission_time: 0.0,
            walltime: 60,
            num_nodes: 2,
            needs_gpu: false,
            requested_memory_gb: 4.0,
            requested_storage_gb: 0.0,
            hpc_site: "SiteA".to_string(),
            hpc_system: "Sys1".to_string(),
        }
    }

    fn make_systems() -> Vec<SystemInfo> {
        ["Sys1", "Sys2"]
            .iter()
            .map(|name| SystemInfo {
                description: HpcSystemDescription {
                    name: name.to_string(),
                    site: "SiteA".to_string(),
                    system_type: ResourceType::Hpc,
                    num_nodes: 4,
                    node_speed: 1.0e9,
                    memory_gb_per_node: 16.0,
                    storage_gb: 1000.0,
                    has_gpu: false,
                    interconnect: "infiniband".to_string(),
                },
                status: HpcSystemStatus {
                    available_nodes: 4,
                    estimated_start_time: 0.0,
                    queue_length: 0,
                },
            })
            .collect()
    }

    fn write_script(response: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cat > /dev/null").unwrap();
        writeln!(file, "echo '{}'", response).unwrap();
        file
    }

    #[test]
    fn test_selector_picks_a_system() {
        let script = write_script(r#"{"selected_system": "Sys2"}"#);
        let policy = CentralizedPolicy::new("sh", script.path()).unwrap();

        let selected = policy
            .select_best_system(&make_job(), &make_systems(), 0.0)
            .unwrap();
        assert_eq!(selected.as_deref(), Some("Sys2"));
    }

    #[test]
    fn test_null_selection_means_no_feasible_system() {
        let script = write_script(r#"{"selected_system": null}"#);
        let policy = CentralizedPolicy::new("sh", script.path()).unwrap();

        let selected = policy
            .select_best_system(&make_job(), &make_systems(), 0.0)
            .unwrap();
        assert_eq!(selected, None);
    }

    #[test]
    fn test_unknown_system_name_is_treated_as_no_selection() {
        let script = write_script(r#"{"selected_system": "SysX"}"#);
        let policy = CentralizedPolicy::new("sh", script.path()).unwrap();

        let selected = policy
            .select_best_system(&make_job(), &make_systems(), 0.0)
            .unwrap();
        assert_eq!(selected, None);
    }

    #[test]
    fn test_missing_selection_field_is_a_protocol_error() {
        let script = write_script(r#"{"verdict": "Sys1"}"#);
        let policy = CentralizedPolicy::new("sh", script.path()).unwrap();

        assert!(policy
            .select_best_system(&make_job(), &make_systems(), 0.0)
            .is_err());
    }

    #[test]
    fn test_empty_system_list_short_circuits() {
        let script = write_script(r#"{"selected_system": "Sys1"}"#);
        let policy = CentralizedPolicy::new("sh", script.path()).unwrap();

        let selected = policy.select_best_system(&make_job(), &[], 0.0).unwrap();
        assert_eq!(selected, None);
    }
}
