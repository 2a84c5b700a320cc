//! Static HPC system descriptions and per-auction status snapshots.

use serde::{Deserialize, Serialize};

use super::job::JobType;

// ═══════════════════════════════════════════════════════════════════════════════
// Resource Type
// ═══════════════════════════════════════════════════════════════════════════════

/// Declared specialization of an HPC system. Shares the job-type vocabulary
/// so the heuristic can compare the two directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceType {
    Hpc,
    Ai,
    Hybrid,
    Gpu,
    Memory,
    Storage,
}

impl ResourceType {
    /// Parse the `type` cluster property.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "HPC" => Some(Self::Hpc),
            "AI" => Some(Self::Ai),
            "HYBRID" => Some(Self::Hybrid),
            "GPU" => Some(Self::Gpu),
            "MEMORY" => Some(Self::Memory),
            "STORAGE" => Some(Self::Storage),
            _ => None,
        }
    }

    /// Whether a job of the given type is this system's specialty.
    pub fn matches(&self, job_type: JobType) -> bool {
        matches!(
            (self, job_type),
            (Self::Hpc, JobType::Hpc)
                | (Self::Ai, JobType::Ai)
                | (Self::Hybrid, JobType::Hybrid)
                | (Self::Gpu, JobType::Gpu)
                | (Self::Memory, JobType::Memory)
                | (Self::Storage, JobType::Storage)
        )
    }
}

impl std::fmt::Display for ResourceType {
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
// System Description
// ═══════════════════════════════════════════════════════════════════════════════

/// Immutable description of one HPC system, derived from the platform file
/// at instantiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HpcSystemDescription {
    pub name: String,
    pub site: String,
    #[serde(rename = "type")]
    pub system_type: ResourceType,
    /// Number of compute nodes (the head node is not schedulable).
    pub num_nodes: u64,
    /// Flop rate of one node.
    pub node_speed: f64,
    pub memory_gb_per_node: f64,
    pub storage_gb: f64,
    pub has_gpu: bool,
    pub interconnect: String,
}

impl HpcSystemDescription {
    /// Walltime scaling factor so long batch jobs stay tractable in
    /// simulated time. Faster nodes compress walltime further.
    pub fn walltime_scaling_factor(&self) -> f64 {
        (self.node_speed / 1.5e12).max(50.0)
    }
}

impl std::fmt::Display for HpcSystemDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} {} nodes at {}, gpu={})",
            self.name, self.num_nodes, self.system_type, self.site, self.has_gpu
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// System Status
// ═══════════════════════════════════════════════════════════════════════════════

/// Snapshot of a batch service at bid-computation time. Recreated for every
/// bid and discarded afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HpcSystemStatus {
    pub available_nodes: u64,
    pub estimated_start_time: f64,
    pub queue_length: usize,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
