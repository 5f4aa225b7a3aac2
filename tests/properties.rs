//! Property tests for the invariants that must hold for *every* valid
//! cluster configuration, not just the hand-picked scenarios in
//! `scenarios.rs`: ownership correctness, row conservation, and layout
//! determinism.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use rdma_shuffle::driver::{CancellationToken, ShuffleDriver};
use rdma_shuffle::memory::Layout;
use rdma_shuffle::partition::owner_of_key;
use rdma_shuffle::transport::loopback::{ClusterRegistry, LoopbackTransport};
use rdma_shuffle::{ClusterConfig, MemoryRegion, Row};

fn cluster_cfg(num_nodes: u32, num_partitions: u32, mem_size: u64) -> ClusterConfig {
    ClusterConfig {
        rdma_port: 0,
        my_id: 0,
        num_nodes,
        num_partitions,
        num_rows: vec![0; num_nodes as usize],
        mem_size,
        node_ips: vec!["x".into(); num_nodes as usize],
        scan_threads: 1,
        barrier_timeout: Duration::from_millis(500),
    }
}

proptest! {
    /// Invariant 6: `Layout::plan` is a pure function of `ClusterConfig`
    /// alone — same config in, byte-identical layout out, every time.
    #[test]
    fn layout_is_a_pure_function_of_config(
        num_nodes in 1u32..8,
        num_partitions in 1u32..32,
        num_rows in 0u64..200,
        mem_size in 1u64..1_000_000,
    ) {
        let num_partitions = num_partitions.max(num_nodes);
        let cfg = cluster_cfg(num_nodes, num_partitions, mem_size);
        let cfg = ClusterConfig { num_rows: vec![num_rows; num_nodes as usize], ..cfg };

        let a = Layout::plan(&cfg);
        let b = Layout::plan(&cfg);
        prop_assert_eq!(a.is_ok(), b.is_ok());
        if let (Ok(a), Ok(b)) = (a, b) {
            prop_assert_eq!(a, b);
        }
    }

    /// Invariant 1: every key maps to exactly one owning node, and that
    /// mapping never depends on anything but the config.
    #[test]
    fn ownership_is_total_and_deterministic(
        num_nodes in 1u32..16,
        num_partitions in 1u32..64,
        key in any::<u64>(),
    ) {
        let num_partitions = num_partitions.max(num_nodes);
        let cfg = cluster_cfg(num_nodes, num_partitions, 1 << 20);

        let owner = owner_of_key(&cfg, key);
        prop_assert!(owner < num_nodes);
        prop_assert_eq!(owner, owner_of_key(&cfg, key));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Invariant 2: a full shuffle never creates or drops rows, no
    /// matter how the input is spread across nodes.
    #[test]
    fn shuffle_conserves_row_count(
        num_nodes in 2u32..4,
        num_partitions in 2u32..8,
        row_counts in prop::collection::vec(0u64..20, 2..4),
    ) {
        let num_nodes = num_nodes.min(row_counts.len() as u32).max(2);
        let num_partitions = num_partitions.max(num_nodes);
        let row_counts: Vec<u64> = row_counts.into_iter().take(num_nodes as usize).collect();

        let mut cfg = cluster_cfg(num_nodes, num_partitions, 1 << 16);
        cfg.num_rows = row_counts.clone();
        let registry = ClusterRegistry::new(num_nodes);
        let cancel = CancellationToken::new();

        let handles: Vec<_> = row_counts
            .iter()
            .enumerate()
            .map(|(id, &n)| {
                let mut node_cfg = cfg.clone();
                node_cfg.my_id = id as u32;
                let registry = Arc::clone(&registry);
                let cancel = cancel.clone();
                std::thread::spawn(move || -> rdma_shuffle::Result<usize> {
                    let region = Arc::new(MemoryRegion::new(&node_cfg)?);
                    let rows: Vec<Row> = (0..n).map(|i| Row::new(id as u64 * 10_000 + i, i)).collect();
                    region.write_input_rows(&rows);
                    let transport = LoopbackTransport::new(id as u32, registry);
                    let driver = ShuffleDriver::new(&node_cfg, Arc::clone(&region), &transport);
                    Ok(driver.run(&cancel)?.len())
                })
            })
            .collect();

        let sent_total: u64 = row_counts.iter().sum();
        let mut received_total = 0usize;
        for h in handles {
            received_total += h.join().expect("node thread panicked")?;
        }
        prop_assert_eq!(received_total as u64, sent_total);
    }
}
