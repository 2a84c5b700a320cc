//! End-to-end scenarios: full experiments over temporary platform and
//! workload files, checked against the tracker's final record book.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use swarm_sched::agents::TrackerState;
use swarm_sched::config::ExperimentConfig;
use swarm_sched::info::{FinalStatus, JobDescription, JobType};
use swarm_sched::simulation::run_experiment;

// ═══════════════════════════════════════════════════════════════════════════════
// Fixtures
// ═══════════════════════════════════════════════════════════════════════════════

struct SystemSpec {
    name: &'static str,
    site: &'static str,
    compute_nodes: usize,
    has_gpu: bool,
}

fn write_platform(systems: &[SystemSpec]) -> NamedTempFile {
    let clusters: Vec<serde_json::Value> = systems
        .iter()
        .map(|s| {
            let mut hosts = vec![format!("{}Head", s.name)];
            hosts.extend((1..=s.compute_nodes).map(|i| format!("{}Node{}", s.name, i)));
            serde_json::json!({
                "name": s.name,
                "hosts": hosts,
                "properties": {
                    "site": s.site,
                    "type": "HPC",
                    "memory_amount_in_gb": "16",
                    "storage_amount_in_gb": "1000",
                    "has_gpu": if s.has_gpu { "True" } else { "False" },
                    "network_interconnect": "infiniband"
                }
            })
        })
        .collect();

    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        "{}",
        serde_json::json!({ "clusters": clusters })
    )
    .unwrap();
    file
}

fn make_job(job_id: u32, submission_time: f64, nodes: u64, target: &str) -> JobDescription {
    JobDescription {
        job_id,
        user_id: 1,
        group_id: 1,
        job_type: JobType::Hpc,
        submission_time,
        walltime: 60,
        num_nodes: nodes,
        needs_gpu: false,
        requested_memory_gb: 4.0,
        requested_storage_gb: 0.0,
        hpc_site: site_of(target).to_string(),
        hpc_system: target.to_string(),
    }
}

// Test platforms put Sys1 on SiteA and Sys2 on SiteB.
fn site_of(system: &str) -> &'static str {
    match system {
        "Sys1" => "SiteA",
        _ => "SiteB",
    }
}

fn write_workload(jobs: &[JobDescription]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", serde_json::to_string(jobs).unwrap()).unwrap();
    file
}

fn make_config(platform: &Path, workload: &Path) -> ExperimentConfig {
    let config_json = serde_json::json!({
        "platform": platform,
        "workload": workload,
    });
    serde_json::from_value(config_json).unwrap()
}

fn run(config: &ExperimentConfig) -> TrackerState {
    run_experiment(config).unwrap()
}

/// Write a selector script for `sh` that answers with a fixed response.
fn write_selector_script(response: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "cat > /dev/null").unwrap();
    writeln!(file, "echo '{}'", response).unwrap();
    file
}

// ═══════════════════════════════════════════════════════════════════════════════
// Scenarios
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn pure_local_single_job_completes_locally() {
    let platform = write_platform(&[SystemSpec {
        name: "Sys1",
        site: "SiteA",
        compute_nodes: 4,
        has_gpu: false,
    }]);
    let workload = write_workload(&[make_job(1, 0.0, 2, "Sys1")]);
    let config = make_config(platform.path(), workload.path());

    let state = run(&config);

    assert_eq!(state.completed, 1);
    let lifecycle = &state.lifecycles[0];
    assert_eq!(lifecycle.final_status(), FinalStatus::Completed);
    assert_eq!(lifecycle.submitted_to(), "Sys1");
    assert_eq!(lifecycle.scheduled_on(), Some("Sys1"));
    assert_eq!(lifecycle.decision_time(), Some(0.0));
    assert_eq!(lifecycle.waiting_time(), Some(0.0));
    // 60 s of walltime under the 50x scaling floor.
    assert!((lifecycle.execution_time().unwrap() - 1.2).abs() < 1e-9);
}

#[test]
fn gpu_job_on_cpu_only_system_is_rejected() {
    let platform = write_platform(&[SystemSpec {
        name: "Sys1",
        site: "SiteA",
        compute_nodes: 4,
        has_gpu: false,
    }]);
    let mut job = make_job(1, 0.0, 2, "Sys1");
    job.needs_gpu = true;
    let workload = write_workload(&[job]);
    let config = make_config(platform.path(), workload.path());

    let state = run(&config);

    assert_eq!(state.rejected, 1);
    let lifecycle = &state.lifecycles[0];
    assert_eq!(lifecycle.final_status(), FinalStatus::Rejected);
    assert_eq!(
        lifecycle.failure_cause(),
        Some("Job requires GPU while System has none")
    );
}

#[test]
fn heuristic_auction_prefers_the_targeted_site() {
    let platform = write_platform(&[
        SystemSpec {
            name: "Sys1",
            site: "SiteA",
            compute_nodes: 4,
            has_gpu: false,
        },
        SystemSpec {
            name: "Sys2",
            site: "SiteB",
            compute_nodes: 4,
            has_gpu: false,
        },
    ]);
    let workload = write_workload(&[make_job(1, 0.0, 2, "Sys1")]);
    let mut config = make_config(platform.path(), workload.path());
    config.decentralized_policy = "HeuristicBidding".to_string();

    let state = run(&config);

    assert_eq!(state.completed, 1);
    let lifecycle = &state.lifecycles[0];
    // Sys1 bids 1.0 (targeted, same site), Sys2 only 0.7 (remote site).
    assert_eq!(lifecycle.scheduled_on(), Some("Sys1"));
    assert_eq!(lifecycle.bids(), Some("\"1.00:0.70\""));
}

#[test]
fn heuristic_auction_prefers_the_lightly_loaded_system() {
    let platform = write_platform(&[
        SystemSpec {
            name: "Sys1",
            site: "SiteA",
            compute_nodes: 4,
            has_gpu: false,
        },
        SystemSpec {
            name: "Sys2",
            site: "SiteB",
            compute_nodes: 4,
            has_gpu: false,
        },
    ]);
    // A long job saturates Sys1 first; the small job then lands on the idle
    // remote system despite the locality penalty.
    let mut long_job = make_job(1, 0.0, 4, "Sys1");
    long_job.walltime = 10_000;
    let small_job = make_job(2, 1.0, 2, "Sys1");
    let workload = write_workload(&[long_job, small_job]);
    let mut config = make_config(platform.path(), workload.path());
    config.decentralized_policy = "HeuristicBidding".to_string();

    let state = run(&config);

    assert_eq!(state.completed, 2);
    assert_eq!(state.lifecycles[0].scheduled_on(), Some("Sys1"));
    assert_eq!(state.lifecycles[1].scheduled_on(), Some("Sys2"));
}

#[test]
fn heartbeat_detects_a_dead_site_and_the_quorum_shrinks() {
    let platform = write_platform(&[
        SystemSpec {
            name: "Sys1",
            site: "SiteA",
            compute_nodes: 4,
            has_gpu: false,
        },
        SystemSpec {
            name: "Sys2",
            site: "SiteB",
            compute_nodes: 4,
            has_gpu: false,
        },
    ]);
    // Sys1 has 5 hosts; a 0.2 fraction switches off exactly the head node,
    // killing its scheduling agent and monitor at t=50.
    let mut profile = NamedTempFile::new().unwrap();
    write!(
        profile,
        r#"[{{"type": "cluster", "resource": "Sys1", "fraction": 0.2, "turn_off_time": 50.0}}]"#
    )
    .unwrap();

    let workload = write_workload(&[make_job(1, 100.0, 2, "Sys2")]);
    let mut config = make_config(platform.path(), workload.path());
    config.decentralized_policy = "HeuristicBidding".to_string();
    config.hardware_failure_profile = Some(profile.path().to_path_buf());

    let state = run(&config);

    // With period 5 and expiration 15, Sys2 declares Sys1 dead by t=65; the
    // job at t=100 runs a one-bidder auction and stays on Sys2.
    assert_eq!(state.completed, 1);
    let lifecycle = &state.lifecycles[0];
    assert_eq!(lifecycle.scheduled_on(), Some("Sys2"));
    assert!(lifecycle.scheduling_time().unwrap() >= 100.0);
}

#[test]
fn centralized_selector_rejects_infeasible_jobs() {
    let platform = write_platform(&[
        SystemSpec {
            name: "Sys1",
            site: "SiteA",
            compute_nodes: 4,
            has_gpu: false,
        },
        SystemSpec {
            name: "Sys2",
            site: "SiteB",
            compute_nodes: 4,
            has_gpu: false,
        },
    ]);
    let script = write_selector_script(r#"{"selected_system": null}"#);
    let workload = write_workload(&[make_job(1, 0.0, 1000, "Sys1")]);
    let mut config = make_config(platform.path(), workload.path());
    config.centralized_submission = true;
    config.centralized_policy = Some(script.path().to_path_buf());
    config.script_interpreter = "sh".to_string();

    let state = run(&config);

    assert_eq!(state.rejected, 1);
    let lifecycle = &state.lifecycles[0];
    assert_eq!(lifecycle.final_status(), FinalStatus::Rejected);
    assert_eq!(lifecycle.failure_cause(), Some("No feasible HPC system"));
}

#[test]
fn centralized_selector_places_jobs_on_the_chosen_system() {
    let platform = write_platform(&[
        SystemSpec {
            name: "Sys1",
            site: "SiteA",
            compute_nodes: 4,
            has_gpu: false,
        },
        SystemSpec {
            name: "Sys2",
            site: "SiteB",
            compute_nodes: 4,
            has_gpu: false,
        },
    ]);
    let script = write_selector_script(r#"{"selected_system": "Sys2"}"#);
    let workload = write_workload(&[make_job(1, 0.0, 2, "Sys1")]);
    let mut config = make_config(platform.path(), workload.path());
    config.centralized_submission = true;
    config.centralized_policy = Some(script.path().to_path_buf());
    config.script_interpreter = "sh".to_string();

    let state = run(&config);

    assert_eq!(state.completed, 1);
    let lifecycle = &state.lifecycles[0];
    assert_eq!(lifecycle.scheduled_on(), Some("Sys2"));
    // The submission event renames the record's target to the selection.
    assert_eq!(lifecycle.submitted_to(), "Sys2");
}

#[test]
fn python_bidding_defers_the_broadcast_by_the_generation_time() {
    let platform = write_platform(&[SystemSpec {
        name: "Sys1",
        site: "SiteA",
        compute_nodes: 4,
        has_gpu: false,
    }]);
    // The script charges 3 simulated seconds per bid, so the scheduling
    // decision lands at t = 3 even though the job arrives at t = 0.
    let mut script = NamedTempFile::new().unwrap();
    writeln!(script, "cat > /dev/null").unwrap();
    writeln!(
        script,
        r#"echo '{{"bid": 0.9, "bid_generation_time_seconds": 3.0}}'"#
    )
    .unwrap();

    let workload = write_workload(&[make_job(1, 0.0, 2, "Sys1")]);
    let mut config = make_config(platform.path(), workload.path());
    config.decentralized_policy = "PythonBidding".to_string();
    config.decentralized_bidder = Some(script.path().to_path_buf());
    config.script_interpreter = "sh".to_string();

    let state = run(&config);

    assert_eq!(state.completed, 1);
    let lifecycle = &state.lifecycles[0];
    assert_eq!(lifecycle.scheduling_time(), Some(3.0));
    assert_eq!(lifecycle.decision_time(), Some(3.0));
}

#[test]
fn missing_workload_file_is_a_startup_error() {
    let platform = write_platform(&[SystemSpec {
        name: "Sys1",
        site: "SiteA",
        compute_nodes: 4,
        has_gpu: false,
    }]);
    let config = make_config(platform.path(), Path::new("/nonexistent/workload.json"));
    assert!(run_experiment(&config).is_err());
}
