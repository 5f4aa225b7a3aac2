//! C3 — Histogram exchange.
//!
//! Each node counts its own input rows per destination partition, writes
//! that row into its own histogram matrix (the "self-publish"), then
//! one-sided-writes the same row into every peer's matrix at the
//! identical offset (the "remote-publish"). After the barrier that
//! follows, every node holds an identical `N x P` matrix: row `s` is
//! sender `s`'s per-partition row counts.

use crate::config::ClusterConfig;
use crate::memory::{Layout, MemoryRegion};
use crate::partition::part_of;
use crate::transport::Connection;
use crate::types::{NodeId, Row};

/// Counts `rows` into `num_partitions` buckets by destination partition.
/// Split across `scan_threads` disjoint chunks and summed when more than
/// one is configured; sequential otherwise.
pub fn scan_counts(cfg: &ClusterConfig, rows: &[Row]) -> Vec<u64> {
    let num_partitions = cfg.num_partitions as usize;
    if cfg.scan_threads <= 1 || rows.len() < cfg.scan_threads {
        return scan_chunk(cfg, rows, num_partitions);
    }

    let chunk_len = rows.len().div_ceil(cfg.scan_threads);
    let partials: Vec<Vec<u64>> = std::thread::scope(|scope| {
        rows.chunks(chunk_len.max(1))
            .map(|chunk| scope.spawn(move || scan_chunk(cfg, chunk, num_partitions)))
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().expect("scan thread panicked"))
            .collect()
    });

    let mut total = vec![0u64; num_partitions];
    for partial in partials {
        for (t, p) in total.iter_mut().zip(partial) {
            *t += p;
        }
    }
    total
}

fn scan_chunk(cfg: &ClusterConfig, rows: &[Row], num_partitions: usize) -> Vec<u64> {
    let mut counts = vec![0u64; num_partitions];
    for row in rows {
        counts[part_of(cfg, row.key) as usize] += 1;
    }
    counts
}

/// Publishes this node's histogram row locally and into every peer's
/// matrix, addressed by `connections[peer]`.
///
/// The remote row's offset depends on *the peer's own* layout — its
/// histogram matrix sits after its own input and barrier counter, whose
/// size depends on the peer's own row count — so each peer's layout is
/// resolved locally via [`Layout::plan_for`] rather than reused from this
/// node's own region.
pub fn publish<C: Connection>(
    cfg: &ClusterConfig,
    region: &MemoryRegion,
    counts: &[u64],
    connections: &[(NodeId, C)],
) -> crate::error::Result<()> {
    let bytes: Vec<u8> = counts.iter().flat_map(|c| c.to_le_bytes()).collect();
    let own_range = region.layout().histogram_row_range(cfg.my_id, cfg.num_partitions);
    region.write_bytes(own_range.start, &bytes);

    for (peer, conn) in connections {
        if *peer == cfg.my_id {
            continue;
        }
        let peer_layout = Layout::plan_for(cfg, *peer)?;
        let remote_range = peer_layout.histogram_row_range(cfg.my_id, cfg.num_partitions);
        crate::transport::chunk_writes(conn, remote_range.start, &bytes)?;
    }
    Ok(())
}

/// Reads back the full `N x P` matrix from this node's own region. Call
/// only after the barrier following [`publish`] has returned.
pub fn read_matrix(cfg: &ClusterConfig, region: &MemoryRegion) -> Vec<Vec<u64>> {
    (0..cfg.num_nodes)
        .map(|sender| {
            let range = region.layout().histogram_row_range(sender, cfg.num_partitions);
            let bytes = region.read_bytes(range.start, range.len());
            bytes
                .chunks_exact(8)
                .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cfg(num_nodes: u32, num_partitions: u32, scan_threads: usize) -> ClusterConfig {
        ClusterConfig {
            rdma_port: 0,
            my_id: 0,
            num_nodes,
            num_partitions,
            num_rows: vec![0; num_nodes as usize],
            mem_size: 0,
            node_ips: vec!["x".into(); num_nodes as usize],
            scan_threads,
            barrier_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn scan_counts_matches_partitioner() {
        let cfg = cfg(2, 4, 1);
        let rows = vec![Row::new(0, 0), Row::new(1, 0), Row::new(1, 0), Row::new(5, 0)];
        let counts = scan_counts(&cfg, &rows);
        assert_eq!(counts, vec![1, 2, 0, 0]);
    }

    #[test]
    fn parallel_scan_matches_sequential() {
        let rows: Vec<Row> = (0..97u64).map(|k| Row::new(k, k)).collect();
        let sequential = scan_counts(&cfg(1, 5, 1), &rows);
        let parallel = scan_counts(&cfg(1, 5, 4), &rows);
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn remote_publish_lands_on_peer_despite_different_row_counts() {
        use crate::transport::loopback::{ClusterRegistry, LoopbackTransport};
        use crate::transport::Transport;
        use std::sync::Arc;

        // node 0 has a much larger input than node 1, so their layouts
        // (and therefore their histogram offsets) differ.
        let mut cfg0 = cfg(2, 3, 1);
        cfg0.num_rows = vec![50, 1];
        let mut cfg1 = cfg0.clone();
        cfg1.my_id = 1;

        let registry = ClusterRegistry::new(2);
        let region0 = Arc::new(MemoryRegion::new(&cfg0).unwrap());
        let region1 = Arc::new(MemoryRegion::new(&cfg1).unwrap());

        let t0 = LoopbackTransport::new(0, Arc::clone(&registry));
        let t1 = LoopbackTransport::new(1, Arc::clone(&registry));
        t0.register_memory(&region0).unwrap();
        t1.register_memory(&region1).unwrap();

        let conn_0_to_1 = t0.connect(1).unwrap();
        let counts = vec![7u64, 8, 9];
        publish(&cfg0, &region0, &counts, &[(1, conn_0_to_1)]).unwrap();

        // node 1 must see node 0's row in *its own* matrix, at the offset
        // node 1's own layout predicts — not node 0's.
        let matrix = read_matrix(&cfg1, &region1);
        assert_eq!(matrix[0], counts);
    }
}
