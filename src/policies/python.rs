//! External bid scripts.
//!
//! The bid computation can be delegated to an external interpreter: the
//! simulator writes one JSON document describing the job, the system, its
//! status, and the clock to the child's standard input, and reads one JSON
//! document `{"bid": number, "bid_generation_time_seconds": number}` from
//! its standard output. The child blocks the simulator in real time, but in
//! simulated time the computation costs only the reported generation time:
//! the caller defers the bid broadcast by that much.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde_json::Value;
use tracing::trace;

use crate::error::{Result, SimError};
use crate::info::{HpcSystemDescription, HpcSystemStatus, JobDescription};

// ═══════════════════════════════════════════════════════════════════════════════
// Script Runner
// ═══════════════════════════════════════════════════════════════════════════════

/// Run one script invocation: JSON in on stdin, JSON out on stdout.
///
/// There is deliberately no timeout; a stuck script hangs the run.
pub(crate) fn run_script(interpreter: &str, script: &Path, input: &Value) -> Result<Value> {
    if !script.exists() {
        return Err(SimError::script_not_found(script.display().to_string()));
    }

    let mut child = Command::new(interpreter)
        .arg(script)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|e| {
            SimError::with_internal(
                crate::error::ErrorCode::ScriptSpawnFailed,
                format!("Failed to spawn '{} {}'", interpreter, script.display()),
                e.to_string(),
            )
        })?;

    {
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SimError::internal("child stdin not captured"))?;
        stdin
            .write_all(input.to_string().as_bytes())
            .map_err(|e| SimError::script_protocol(format!("writing to script stdin: {}", e)))?;
        // Dropping stdin signals EOF so the script can read its document.
    }

    let output = child
        .wait_with_output()
        .map_err(|e| SimError::script_protocol(format!("waiting for script: {}", e)))?;

    let response = String::from_utf8_lossy(&output.stdout);
    trace!(script = %script.display(), response = %response, "Script responded");
    serde_json::from_str(&response)
        .map_err(|e| SimError::script_protocol(format!("parsing script response: {}", e)))
}

fn number_field(response: &Value, field: &str) -> Result<f64> {
    response
        .get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| SimError::script_protocol(format!("'{}' not found or not a number", field)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Bid Script
// ═══════════════════════════════════════════════════════════════════════════════

/// A configured external bid script.
#[derive(Debug, Clone)]
pub struct BidScript {
    interpreter: String,
    script: PathBuf,
}

impl BidScript {
    /// Configure a bid script; the script file must exist.
    pub fn new(interpreter: &str, script: &Path) -> Result<Self> {
        if !script.exists() {
            return Err(SimError::script_not_found(script.display().to_string()));
        }
        Ok(Self {
            interpreter: interpreter.to_string(),
            script: script.to_path_buf(),
        })
    }

    /// Ask the script for a bid. Returns the bid and the simulated time the
    /// computation is declared to have cost.
    pub fn compute_bid(
        &self,
        job: &JobDescription,
        system: &HpcSystemDescription,
        status: &HpcSystemStatus,
        now: f64,
    ) -> Result<(f64, f64)> {
        let input = serde_json::json!({
            "job_description": job.to_protocol_json(),
            "hpc_system_description": system,
            "hpc_system_status": status,
            "current_simulated_time": now,
        });

        let response = run_script(&self.interpreter, &self.script, &input)?;
        let generation_time = number_field(&response, "bid_generation_time_seconds")?;
        let bid = number_field(&response, "bid")?;
        Ok((bid, generation_time))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
