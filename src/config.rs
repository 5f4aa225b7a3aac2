//! Cluster configuration: the immutable-after-startup inputs every
//! component derives its behaviour from.
//!
//! `ClusterConfig` is constructed once, either from a TOML file via
//! [`ClusterConfig::from_toml_str`]/[`ClusterConfig::from_toml_file`] or
//! directly in-process (as the test suite does), and handed to the shuffle
//! driver by reference. There is no global/singleton instance.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::NodeId;

/// Cluster-wide configuration, identical in every field except `my_id`
/// across all N nodes.
///
/// Every field — including each peer's input size — must be knowable by
/// every node without asking: a node's [`crate::memory::Layout`] stacks
/// its receive region after its own input, barrier counter, and histogram
/// row, so reconstructing a *peer's* layout (needed to address a remote
/// write) requires knowing that peer's row count too. `num_rows` is
/// therefore a per-node table, not a single node's own count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Fabric port, same for all nodes.
    pub rdma_port: u16,

    /// This node's index in `[0, N)`.
    pub my_id: NodeId,

    /// Total number of nodes in the cluster (`N`).
    pub num_nodes: u32,

    /// Total number of logical partitions (`P`). `P >= N`; `P % N` need
    /// not hold.
    pub num_partitions: u32,

    /// Number of input tuples on each node, indexed by node id; length
    /// `N`. May differ per node.
    pub num_rows: Vec<u64>,

    /// Size in bytes of the registered memory region. Identical across
    /// the cluster.
    pub mem_size: u64,

    /// Ordered list of node endpoints, length `N`, index = node id.
    pub node_ips: Vec<String>,

    /// Number of worker threads used for the local histogram scan.
    /// `1` (the default) means sequential; any larger value partitions
    /// the input slice into disjoint chunks and reduces per-chunk counts
    /// associatively (§5 permits, does not require, this).
    #[serde(default = "default_scan_threads")]
    pub scan_threads: usize,

    /// Wall-clock ceiling for a single barrier invocation before
    /// [`Error::BarrierTimeout`] is raised.
    #[serde(with = "duration_millis", default = "default_barrier_timeout")]
    pub barrier_timeout: std::time::Duration,
}

fn default_scan_threads() -> usize {
    1
}

fn default_barrier_timeout() -> std::time::Duration {
    std::time::Duration::from_secs(30)
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

impl ClusterConfig {
    /// Parses a cluster configuration from a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: ClusterConfig = toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parses a cluster configuration from a TOML file on disk.
    pub fn from_toml_file(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    /// Validates the cluster-wide invariants that must hold before any
    /// transport traffic is issued.
    pub fn validate(&self) -> Result<()> {
        if self.num_nodes == 0 {
            return Err(Error::Config("num_nodes must be > 0".into()));
        }
        if self.num_partitions < self.num_nodes {
            return Err(Error::Config(format!(
                "num_partitions ({}) must be >= num_nodes ({})",
                self.num_partitions, self.num_nodes
            )));
        }
        if self.my_id >= self.num_nodes {
            return Err(Error::Config(format!(
                "my_id ({}) must be < num_nodes ({})",
                self.my_id, self.num_nodes
            )));
        }
        if self.node_ips.len() != self.num_nodes as usize {
            return Err(Error::Config(format!(
                "node_ips has {} entries, expected num_nodes = {}",
                self.node_ips.len(),
                self.num_nodes
            )));
        }
        if self.num_rows.len() != self.num_nodes as usize {
            return Err(Error::Config(format!(
                "num_rows has {} entries, expected num_nodes = {}",
                self.num_rows.len(),
                self.num_nodes
            )));
        }
        if self.scan_threads == 0 {
            return Err(Error::Config("scan_threads must be >= 1".into()));
        }
        Ok(())
    }

    /// The endpoint for a given node id.
    pub fn endpoint(&self, node_id: NodeId) -> Result<&str> {
        self.node_ips
            .get(node_id as usize)
            .map(String::as_str)
            .ok_or_else(|| Error::Config(format!("no endpoint configured for node {node_id}")))
    }

    /// The number of input rows a given node holds.
    pub fn num_rows_of(&self, node_id: NodeId) -> Result<u64> {
        self.num_rows
            .get(node_id as usize)
            .copied()
            .ok_or_else(|| Error::Config(format!("no num_rows entry for node {node_id}")))
    }

    /// The number of input rows on this node (`num_rows[my_id]`).
    pub fn my_num_rows(&self) -> Result<u64> {
        self.num_rows_of(self.my_id)
    }
}

/// Command-line overrides for [`ClusterConfig`], mirroring the flags the
/// original implementation's CLI parser recognised
/// (`--rdma_port`, `--my_id`, `--num_nodes`, `--num_partitions`,
/// `--num_rows`, `--mem_size`, `--node_ips`).
#[derive(Debug, clap::Parser)]
#[command(version, about = "Run one node of a distributed RDMA shuffle")]
pub struct Args {
    /// Path to a TOML cluster configuration file.
    #[arg(long)]
    pub config: std::path::PathBuf,

    /// Override this node's index.
    #[arg(long)]
    pub my_id: Option<NodeId>,

    /// Override the number of input rows on this node (only; the rest of
    /// the table is left as configured).
    #[arg(long)]
    pub num_rows: Option<u64>,
}

impl Args {
    /// Loads the configured file and applies any CLI overrides.
    pub fn resolve(&self) -> Result<ClusterConfig> {
        let mut cfg = ClusterConfig::from_toml_file(&self.config)?;
        if let Some(id) = self.my_id {
            cfg.my_id = id;
        }
        if let Some(n) = self.num_rows {
            let slot = cfg.num_rows.get_mut(cfg.my_id as usize).ok_or_else(|| {
                Error::Config(format!("no num_rows entry for node {}", cfg.my_id))
            })?;
            *slot = n;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}
