//! Runs a full, in-process shuffle cluster from a single cluster
//! configuration file — one OS thread per configured node, wired together
//! with [`rdma_shuffle::transport::loopback`].
//!
//! A deployment against real fabric hardware would instead launch one
//! process per node, each with its own `--my_id`, talking over a real
//! [`rdma_shuffle::transport::Transport`] implementation; that transport
//! is out of scope here, so this binary doubles as the demo harness the
//! loopback transport was built for.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use rdma_shuffle::config::Args;
use rdma_shuffle::driver::{CancellationToken, ShuffleDriver};
use rdma_shuffle::transport::loopback::{ClusterRegistry, LoopbackTransport};
use rdma_shuffle::{ClusterConfig, MemoryRegion, Row};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let base_cfg = args.resolve()?;
    run_cluster(&base_cfg)
}

fn run_cluster(base_cfg: &ClusterConfig) -> anyhow::Result<()> {
    let registry = ClusterRegistry::new(base_cfg.num_nodes);
    let cancel = CancellationToken::new();

    let handles: Vec<_> = (0..base_cfg.num_nodes)
        .map(|id| {
            let mut cfg = base_cfg.clone();
            cfg.my_id = id;
            let registry = Arc::clone(&registry);
            let cancel = cancel.clone();
            std::thread::spawn(move || -> rdma_shuffle::Result<(u32, usize, usize)> {
                let region = Arc::new(MemoryRegion::new(&cfg)?);
                let rows = synthetic_rows(&cfg)?;
                let sent = rows.len();
                region.write_input_rows(&rows);

                let transport = LoopbackTransport::new(id, registry);
                let driver = ShuffleDriver::new(&cfg, Arc::clone(&region), &transport);
                let received = driver.run(&cancel)?;
                Ok((id, sent, received.len()))
            })
        })
        .collect();

    let mut total_sent = 0usize;
    let mut total_received = 0usize;
    for handle in handles {
        let (id, sent, received) = handle.join().expect("node thread panicked")?;
        tracing::info!(node = id, sent, received, "node finished");
        total_sent += sent;
        total_received += received;
    }

    if total_sent != total_received {
        anyhow::bail!("row conservation violated: sent {total_sent}, received {total_received}");
    }
    println!("shuffle complete: {total_sent} rows redistributed across {} nodes", base_cfg.num_nodes);
    Ok(())
}

/// Deterministic per-node input: `num_rows[my_id]` rows with keys spread
/// across the full key space so every partition sees traffic from every
/// node.
fn synthetic_rows(cfg: &ClusterConfig) -> rdma_shuffle::Result<Vec<Row>> {
    let n = cfg.my_num_rows()?;
    Ok((0..n).map(|i| Row::new(cfg.my_id as u64 + i * cfg.num_nodes as u64, i)).collect())
}
