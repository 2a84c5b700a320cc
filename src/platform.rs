//! Platform loading.
//!
//! A platform file describes the federation's clusters: host lists (head
//! node first) and the string properties each HPC system advertises. The
//! kernel instantiates hosts from it; the composer derives one
//! [`HpcSystemDescription`] per cluster.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, SimError};
use crate::info::{HpcSystemDescription, ResourceType};

// ═══════════════════════════════════════════════════════════════════════════════
// File Schema
// ═══════════════════════════════════════════════════════════════════════════════

/// Cluster properties, all read as strings.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterProperties {
    pub site: String,
    #[serde(rename = "type")]
    pub system_type: String,
    pub memory_amount_in_gb: String,
    pub storage_amount_in_gb: String,
    /// "True" or "False".
    pub has_gpu: String,
    pub network_interconnect: String,
}

/// One cluster: a name, its hosts (head node first), node speed, and
/// advertised properties.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterSpec {
    pub name: String,
    pub hosts: Vec<String>,
    #[serde(default = "default_speed_flops")]
    pub speed_flops: f64,
    pub properties: ClusterProperties,
}

fn default_speed_flops() -> f64 {
    1.0e9
}

#[derive(Debug, Clone, Deserialize)]
pub struct Platform {
    pub clusters: Vec<ClusterSpec>,
}

impl ClusterSpec {
    /// Head node of this cluster.
    pub fn head_node(&self) -> &str {
        &self.hosts[0]
    }

    /// Compute nodes of this cluster (everything but the head node).
    pub fn compute_nodes(&self) -> &[String] {
        &self.hosts[1..]
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Loading
// ═══════════════════════════════════════════════════════════════════════════════

impl Platform {
    /// Load and validate a platform file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SimError::platform(format!("{}: {}", path.display(), e)))?;
        let platform: Platform = serde_json::from_str(&contents)
            .map_err(|e| SimError::platform(format!("{}: {}", path.display(), e)))?;

        let mut seen = HashSet::new();
        for cluster in &platform.clusters {
            if cluster.hosts.len() < 2 {
                return Err(SimError::platform(format!(
                    "cluster '{}' needs a head node and at least one compute node",
                    cluster.name
                )));
            }
            if !seen.insert(cluster.name.clone()) {
                return Err(SimError::platform(format!(
                    "duplicate cluster name '{}'",
                    cluster.name
                )));
            }
        }
        if platform.clusters.is_empty() {
            return Err(SimError::platform("platform has no clusters"));
        }
        Ok(platform)
    }
}

/// Derive the immutable system description of one cluster.
pub fn system_description(cluster: &ClusterSpec) -> Result<HpcSystemDescription> {
    let props = &cluster.properties;
    let system_type = ResourceType::parse(&props.system_type).ok_or_else(|| {
        SimError::platform(format!(
            "cluster '{}': unknown system type '{}'",
            cluster.name, props.system_type
        ))
    })?;
    let memory_gb_per_node: f64 = props.memory_amount_in_gb.parse().map_err(|_| {
        SimError::platform(format!(
            "cluster '{}': bad memory_amount_in_gb '{}'",
            cluster.name, props.memory_amount_in_gb
        ))
    })?;
    let storage_gb: f64 = props.storage_amount_in_gb.parse().map_err(|_| {
        SimError::platform(format!(
            "cluster '{}': bad storage_amount_in_gb '{}'",
            cluster.name, props.storage_amount_in_gb
        ))
    })?;

    Ok(HpcSystemDescription {
        name: cluster.name.clone(),
        site: props.site.clone(),
        system_type,
        num_nodes: cluster.compute_nodes().len() as u64,
        node_speed: cluster.speed_flops,
        memory_gb_per_node,
        storage_gb,
        has_gpu: props.has_gpu == "True",
        interconnect: props.network_interconnect.clone(),
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PLATFORM: &str = r#"{
        "clusters": [
            {
                "name": "Sys1",
                "hosts": ["Sys1Head", "Sys1Node1", "Sys1Node2"],
                "properties": {
                    "site": "SiteA",
                    "type": "HPC",
                    "memory_amount_in_gb": "16",
                    "storage_amount_in_gb": "1000",
                    "has_gpu": "False",
                    "network_interconnect": "infiniband"
                }
            }
        ]
    }"#;

    fn write_platform(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_platform() {
        let file = write_platform(PLATFORM);
        let platform = Platform::load(file.path()).unwrap();

        assert_eq!(platform.clusters.len(), 1);
        let cluster = &platform.clusters[0];
        assert_eq!(cluster.head_node(), "Sys1Head");
        assert_eq!(cluster.compute_nodes().len(), 2);
    }

    #[test]
    fn test_system_description_from_cluster() {
        let file = write_platform(PLATFORM);
        let platform = Platform::load(file.path()).unwrap();
        let description = system_description(&platform.clusters[0]).unwrap();

        assert_eq!(description.name, "Sys1");
        assert_eq!(description.num_nodes, 2);
        assert_eq!(description.memory_gb_per_node, 16.0);
        assert!(!description.has_gpu);
        assert_eq!(description.system_type, ResourceType::Hpc);
    }

    #[test]
    fn test_cluster_without_compute_nodes_is_rejected() {
        let file = write_platform(
            r#"{"clusters": [{"name": "Sys1", "hosts": ["OnlyHead"],
                "properties": {"site": "S", "type": "HPC",
                "memory_amount_in_gb": "16", "storage_amount_in_gb": "10",
                "has_gpu": "False", "network_interconnect": "eth"}}]}"#,
        );
        assert!(Platform::load(file.path()).is_err());
    }

    #[test]
    fn test_unknown_system_type_is_rejected() {
        let file = write_platform(
            r#"{"clusters": [{"name": "Sys1", "hosts": ["H", "N1"],
                "properties": {"site": "S", "type": "QUANTUM",
                "memory_amount_in_gb": "16", "storage_amount_in_gb": "10",
                "has_gpu": "False", "network_interconnect": "eth"}}]}"#,
        );
        let platform = Platform::load(file.path()).unwrap();
        assert!(system_description(&platform.clusters[0]).is_err());
    }

    #[test]
    fn test_missing_platform_file() {
        assert!(Platform::load("/nonexistent/platform.json").is_err());
    }
}
