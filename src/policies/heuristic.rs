//! Heuristic bid scoring.
//!
//! A deterministic score of how well a system fits a job right now,
//! combining node availability, job/system type compatibility, site
//! locality, queue pressure, and the estimated start delay. The result is
//! truncated to two decimals so equal situations produce exactly equal
//! bids across peers.

use crate::info::{HpcSystemDescription, HpcSystemStatus, JobDescription, JobType, ResourceType};

use super::acceptance_failure;

/// Compute the heuristic bid. Returns -1 when the job cannot run on the
/// system at all (the auction still elects a winner; a -1 winner is
/// rejected by the acceptance tests).
pub fn compute_bid(
    job: &JobDescription,
    system: &HpcSystemDescription,
    status: &HpcSystemStatus,
    now: f64,
) -> f64 {
    if acceptance_failure(job, system).is_some() {
        return -1.0;
    }

    let total_nodes = system.num_nodes as f64;
    let available = status.available_nodes as f64;

    let used = total_nodes - available;
    let node_util = used / total_nodes;
    let node_score = 1.0 - node_util;

    let node_compat = (available / job.num_nodes as f64).min(1.0);

    let queue_factor = (1.0 - 0.1 * status.queue_length as f64).max(0.1);

    let resource_factor = resource_factor(job.job_type, system.system_type);
    let site_factor = site_factor(job, system);

    let delay = status.estimated_start_time - now;
    let delay_penalty = (1.0 - delay / 100.0).max(0.1);

    let base = node_score * node_compat * resource_factor * site_factor * delay_penalty;
    let final_bid = (base * queue_factor).min(1.0);

    (final_bid * 100.0).trunc() / 100.0
}

/// How well the system's specialization matches the job's category.
fn resource_factor(job_type: JobType, system_type: ResourceType) -> f64 {
    if system_type.matches(job_type) {
        return 1.0;
    }
    match job_type {
        JobType::Hpc | JobType::Ai | JobType::Hybrid => 0.8,
        JobType::Storage => 0.3,
        // GPU and MEMORY jobs on a mismatched system, storage systems
        // serving compute work: middling fit either way.
        _ => 0.5,
    }
}

/// Locality preference: the targeted system beats its site siblings, which
/// beat remote sites.
fn site_factor(job: &JobDescription, system: &HpcSystemDescription) -> f64 {
    if job.hpc_site == system.site {
        if job.hpc_system == system.name {
            1.0
        } else {
            0.9
        }
    } else {
        0.7
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

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

    fn make_system(name: &str, site: &str) -> HpcSystemDescription {
        HpcSystemDescription {
            name: name.to_string(),
            site: site.to_string(),
            system_type: ResourceType::Hpc,
            num_nodes: 4,
            node_speed: 1.0e9,
            memory_gb_per_node: 16.0,
            storage_gb: 1000.0,
            has_gpu: false,
            interconnect: "infiniband".to_string(),
        }
    }

    fn idle_status() -> HpcSystemStatus {
        HpcSystemStatus {
            available_nodes: 4,
            estimated_start_time: 0.0,
            queue_length: 0,
        }
    }

    #[test]
    fn test_idle_targeted_system_bids_one() {
        let bid = compute_bid(&make_job(), &make_system("Sys1", "SiteA"), &idle_status(), 0.0);
        assert_eq!(bid, 1.0);
    }

    #[test]
    fn test_remote_site_pays_the_locality_penalty() {
        let bid = compute_bid(&make_job(), &make_system("Sys2", "SiteB"), &idle_status(), 0.0);
        assert_eq!(bid, 0.7);
    }

    #[test]
    fn test_site_sibling_beats_remote_system() {
        let sibling = compute_bid(&make_job(), &make_system("Sys2", "SiteA"), &idle_status(), 0.0);
        let remote = compute_bid(&make_job(), &make_system("Sys3", "SiteB"), &idle_status(), 0.0);
        assert!(sibling > remote);
        assert_eq!(sibling, 0.9);
    }

    #[test]
    fn test_infeasible_job_bids_negative() {
        let mut job = make_job();
        job.needs_gpu = true;
        let bid = compute_bid(&job, &make_system("Sys1", "SiteA"), &idle_status(), 0.0);
        assert_eq!(bid, -1.0);
    }

    #[test]
    fn test_busy_system_scores_lower() {
        let busy = HpcSystemStatus {
            available_nodes: 1,
            estimated_start_time: 0.0,
            queue_length: 0,
        };
        let idle_bid = compute_bid(&make_job(), &make_system("Sys1", "SiteA"), &idle_status(), 0.0);
        let busy_bid = compute_bid(&make_job(), &make_system("Sys1", "SiteA"), &busy, 0.0);
        assert!(busy_bid < idle_bid);
    }

    #[test]
    fn test_long_start_delay_floors_the_penalty() {
        let delayed = HpcSystemStatus {
            available_nodes: 4,
            estimated_start_time: 10_000.0,
            queue_length: 0,
        };
        let bid = compute_bid(&make_job(), &make_system("Sys1", "SiteA"), &delayed, 0.0);
        // delay_penalty bottoms out at 0.1.
        assert_eq!(bid, 0.1);
    }

    #[test]
    fn test_queue_pressure_discounts_the_bid() {
        let queued = HpcSystemStatus {
            available_nodes: 4,
            estimated_start_time: 0.0,
            queue_length: 3,
        };
        let bid = compute_bid(&make_job(), &make_system("Sys1", "SiteA"), &queued, 0.0);
        assert_eq!(bid, 0.7);
    }

    #[test]
    fn test_type_mismatch_discounts() {
        let mut job = make_job();
        job.job_type = JobType::Ai;
        let bid = compute_bid(&job, &make_system("Sys1", "SiteA"), &idle_status(), 0.0);
        assert_eq!(bid, 0.8);
    }

    #[test]
    fn test_storage_job_on_compute_system_is_heavily_discounted() {
        let mut job = make_job();
        job.job_type = JobType::Storage;
        let bid = compute_bid(&job, &make_system("Sys1", "SiteA"), &idle_status(), 0.0);
        // 0.3 resource factor, truncated at two decimals.
        assert!((bid - 0.3).abs() < 0.011);
    }

    #[test]
    fn test_truncation_stabilizes_ties() {
        // Any bid comes out with at most two decimals.
        let status = HpcSystemStatus {
            available_nodes: 3,
            estimated_start_time: 7.0,
            queue_length: 1,
        };
        let bid = compute_bid(&make_job(), &make_system("Sys1", "SiteA"), &status, 0.0);
        assert_eq!(bid, (bid * 100.0).trunc() / 100.0);
    }
}
