//! C4 — Offset resolver.
//!
//! Every node derives, from the histogram matrix alone, a canonical,
//! contiguous per-sender layout inside its own receive region: sender
//! `s`'s rows (destined for this node) start at `place[s]`, a running sum
//! over how many rows each earlier sender is about to deliver. No
//! messages are exchanged to agree on this — the matrix already is the
//! agreement.

use crate::config::ClusterConfig;
use crate::error::{Error, Result};
use crate::partition::owner_of;
use crate::types::{NodeId, ROW_SIZE};

/// Per-sender contiguous placement inside this node's receive region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// `place[s]`, in row units, for every sender `s`.
    pub place: Vec<u64>,
    /// Total rows this node is about to receive, across all senders.
    pub total_rows: u64,
}

impl Placement {
    /// Byte offset, within the receive region, where sender `s`'s rows
    /// begin.
    pub fn byte_offset(&self, sender: NodeId) -> usize {
        self.place[sender as usize] as usize * ROW_SIZE
    }
}

/// How many rows sender `sender` is sending to `my_id`, summed over every
/// partition `my_id` owns.
fn rows_from_sender(cfg: &ClusterConfig, matrix: &[Vec<u64>], sender: NodeId) -> u64 {
    matrix[sender as usize]
        .iter()
        .enumerate()
        .filter(|(part, _)| owner_of(cfg, *part as u32) == cfg.my_id)
        .map(|(_, count)| *count)
        .sum()
}

/// Resolves this node's placement table from the shared `N x P` matrix,
/// rejecting it if the total would overrun the receive region.
pub fn resolve(cfg: &ClusterConfig, matrix: &[Vec<u64>], recv_capacity: usize) -> Result<Placement> {
    let mut place = Vec::with_capacity(cfg.num_nodes as usize);
    let mut running = 0u64;
    for sender in 0..cfg.num_nodes {
        place.push(running);
        running += rows_from_sender(cfg, matrix, sender);
    }

    let needed = running as usize * ROW_SIZE;
    if needed > recv_capacity {
        return Err(Error::Overflow { needed, capacity: recv_capacity });
    }

    Ok(Placement { place, total_rows: running })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cfg(num_nodes: u32, num_partitions: u32, my_id: u32) -> ClusterConfig {
        ClusterConfig {
            rdma_port: 0,
            my_id,
            num_nodes,
            num_partitions,
            num_rows: vec![0; num_nodes as usize],
            mem_size: 0,
            node_ips: vec!["x".into(); num_nodes as usize],
            scan_threads: 1,
            barrier_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn two_node_four_partition_placement() {
        // node 0 owns partitions 0,2; node 1 owns partitions 1,3.
        let matrix = vec![
            vec![3, 1, 2, 0], // sender 0: 3+2=5 rows to node 0, 1+0=1 row to node 1
            vec![0, 4, 1, 2], // sender 1: 0+1=1 row to node 0, 4+2=6 rows to node 1
        ];
        let placement = resolve(&cfg(2, 4, 0), &matrix, 1 << 20).unwrap();
        assert_eq!(placement.place, vec![0, 5]);
        assert_eq!(placement.total_rows, 6);

        let placement1 = resolve(&cfg(2, 4, 1), &matrix, 1 << 20).unwrap();
        assert_eq!(placement1.place, vec![0, 1]);
        assert_eq!(placement1.total_rows, 7);
    }

    #[test]
    fn overflow_when_capacity_too_small() {
        let matrix = vec![vec![10, 0]];
        let err = resolve(&cfg(1, 2, 0), &matrix, ROW_SIZE).unwrap_err();
        assert!(matches!(err, Error::Overflow { .. }));
    }
}
