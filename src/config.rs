//! Experiment configuration.
//!
//! An experiment description is a JSON document naming the platform and
//! workload files, the scheduling mode and policy, the heartbeat protocol
//! parameters, and an optional hardware failure profile. Validation happens
//! before the simulation is built; any problem here is fatal.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, SimError};

/// Names of the decentralized bidding policies.
pub const POLICY_NAMES: &[&str] = &[
    "PureLocal",
    "RandomBidding",
    "HeuristicBidding",
    "PythonBidding",
];

/// Main experiment configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentConfig {
    /// Platform description file.
    pub platform: PathBuf,

    /// Workload file (JSON array of job records).
    pub workload: PathBuf,

    /// Use the centralized selector instead of the decentralized auction.
    #[serde(default)]
    pub centralized_submission: bool,

    /// Selector script; required iff `centralized_submission`.
    #[serde(default)]
    pub centralized_policy: Option<PathBuf>,

    /// Decentralized bidding policy name.
    #[serde(default = "default_policy")]
    pub decentralized_policy: String,

    /// Bid script; required iff the policy is PythonBidding.
    #[serde(default)]
    pub decentralized_bidder: Option<PathBuf>,

    /// Heartbeat broadcast period, in simulated seconds.
    #[serde(default = "default_heartbeat_period")]
    pub heartbeat_period: f64,

    /// Heartbeat staleness threshold, in simulated seconds.
    #[serde(default = "default_heartbeat_expiration")]
    pub heartbeat_expiration: f64,

    /// Hardware failure profile file, if any.
    #[serde(default)]
    pub hardware_failure_profile: Option<PathBuf>,

    /// Interpreter used to run external policy scripts.
    #[serde(default = "default_script_interpreter")]
    pub script_interpreter: String,

    /// Virtual-time safety horizon; a run that crosses it is aborted.
    #[serde(default = "default_max_simulated_time")]
    pub max_simulated_time: f64,
}

fn default_policy() -> String {
    "PureLocal".to_string()
}

fn default_heartbeat_period() -> f64 {
    5.0
}

fn default_heartbeat_expiration() -> f64 {
    15.0
}

fn default_script_interpreter() -> String {
    "python3".to_string()
}

fn default_max_simulated_time() -> f64 {
    1.0e6
}

impl ExperimentConfig {
    /// Load an experiment description and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SimError::with_internal(
                crate::error::ErrorCode::MissingConfiguration,
                format!("Cannot read experiment description '{}'", path.display()),
                e.to_string(),
            )
        })?;
        let config: ExperimentConfig = serde_json::from_str(&contents).map_err(|e| {
            SimError::with_internal(
                crate::error::ErrorCode::InvalidConfiguration,
                format!("Malformed experiment description '{}'", path.display()),
                e.to_string(),
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field validation: file presence, policy name, script
    /// requirements, protocol parameters.
    pub fn validate(&self) -> Result<()> {
        if !self.platform.exists() {
            return Err(SimError::configuration(format!(
                "Platform file not found: {}",
                self.platform.display()
            )));
        }
        if !self.workload.exists() {
            return Err(SimError::configuration(format!(
                "Workload file not found: {}",
                self.workload.display()
            )));
        }

        if !POLICY_NAMES.contains(&self.decentralized_policy.as_str()) {
            return Err(SimError::unknown_policy(&self.decentralized_policy));
        }

        if self.decentralized_policy == "PythonBidding" {
            match &self.decentralized_bidder {
                None => {
                    return Err(SimError::configuration(
                        "PythonBidding requires 'decentralized_bidder'",
                    ))
                }
                Some(script) if !script.exists() => {
                    return Err(SimError::script_not_found(script.display().to_string()))
                }
                Some(_) => {}
            }
        }

        if self.centralized_submission {
            match &self.centralized_policy {
                None => {
                    return Err(SimError::configuration(
                        "Centralized submission requires 'centralized_policy'",
                    ))
                }
                Some(script) if !script.exists() => {
                    return Err(SimError::script_not_found(script.display().to_string()))
                }
                Some(_) => {}
            }
        }

        if let Some(profile) = &self.hardware_failure_profile {
            if !profile.exists() {
                return Err(SimError::configuration(format!(
                    "Hardware failure profile not found: {}",
                    profile.display()
                )));
            }
        }

        if self.heartbeat_period <= 0.0 || self.heartbeat_expiration <= 0.0 {
            return Err(SimError::configuration(
                "Heartbeat period and expiration must be positive",
            ));
        }

        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn touch() -> tempfile::NamedTempFile {
        tempfile::NamedTempFile::new().unwrap()
    }

    fn base_config(platform: &Path, workload: &Path) -> ExperimentConfig {
        ExperimentConfig {
            platform: platform.to_path_buf(),
            workload: workload.to_path_buf(),
            centralized_submission: false,
            centralized_policy: None,
            decentralized_policy: default_policy(),
            decentralized_bidder: None,
            heartbeat_period: default_heartbeat_period(),
            heartbeat_expiration: default_heartbeat_expiration(),
            hardware_failure_profile: None,
            script_interpreter: default_script_interpreter(),
            max_simulated_time: default_max_simulated_time(),
        }
    }

    #[test]
    fn test_defaults_validate() {
        let platform = touch();
        let workload = touch();
        let config = base_config(platform.path(), workload.path());
        assert!(config.validate().is_ok());
        assert_eq!(config.decentralized_policy, "PureLocal");
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let platform = touch();
        let workload = touch();
        let mut config = base_config(platform.path(), workload.path());
        config.decentralized_policy = "GreedyBidding".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_python_bidding_requires_script() {
        let platform = touch();
        let workload = touch();
        let mut config = base_config(platform.path(), workload.path());
        config.decentralized_policy = "PythonBidding".to_string();
        assert!(config.validate().is_err());

        let script = touch();
        config.decentralized_bidder = Some(script.path().to_path_buf());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_centralized_requires_selector_script() {
        let platform = touch();
        let workload = touch();
        let mut config = base_config(platform.path(), workload.path());
        config.centralized_submission = true;
        assert!(config.validate().is_err());

        let script = touch();
        config.centralized_policy = Some(script.path().to_path_buf());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_json_with_defaults() {
        let platform = touch();
        let workload = touch();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"platform": "{}", "workload": "{}"}}"#,
            platform.path().display(),
            workload.path().display()
        )
        .unwrap();

        let config = ExperimentConfig::load(file.path()).unwrap();
        assert_eq!(config.heartbeat_period, 5.0);
        assert_eq!(config.heartbeat_expiration, 15.0);
        assert!(!config.centralized_submission);
    }

    #[test]
    fn test_missing_experiment_file() {
        assert!(ExperimentConfig::load("/nonexistent/experiment.json").is_err());
    }
}
