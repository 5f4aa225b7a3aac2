//! C1 — Partitioner: pure, total, allocation-free mapping from keys to
//! owning nodes.

use crate::config::ClusterConfig;
use crate::types::{NodeId, PartitionId};

/// Maps a key to its partition id: `key mod P`.
pub fn part_of(cfg: &ClusterConfig, key: u64) -> PartitionId {
    (key % cfg.num_partitions as u64) as PartitionId
}

/// Maps a partition id to its owning node: `part mod N`.
pub fn owner_of(cfg: &ClusterConfig, part: PartitionId) -> NodeId {
    part % cfg.num_nodes
}

/// Composition: the destination node for a tuple with the given key.
pub fn owner_of_key(cfg: &ClusterConfig, key: u64) -> NodeId {
    owner_of(cfg, part_of(cfg, key))
}
