//! C7 — Shuffle driver.
//!
//! Drives one node through the full protocol on a single thread, with
//! every transport call blocking: connect to every peer, exchange
//! histograms, resolve placements, exchange data, and collect what
//! landed. The state machine exists so a caller inspecting a driver
//! mid-run (or a panic unwinding through it) can tell exactly how far the
//! shuffle got; it is not used to resume a shuffle; a failed shuffle is
//! retried from `Init` by constructing a fresh driver.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::barrier::Barrier;
use crate::config::ClusterConfig;
use crate::error::{Error, Result};
use crate::histogram;
use crate::memory::MemoryRegion;
use crate::offsets;
use crate::transport::{Connection, Transport};
use crate::types::{NodeId, Row};
use crate::{exchange, partition};

/// Phase markers for a single shuffle run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    Connected,
    HistPosted,
    HistReady,
    Placed,
    DataPosted,
    DataReady,
    Done,
    Failed,
}

/// A cooperative cancellation flag checked at every phase boundary. Does
/// not interrupt a blocking transport call already in flight.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Drives a single node through one shuffle.
pub struct ShuffleDriver<'a, T: Transport> {
    cfg: &'a ClusterConfig,
    region: Arc<MemoryRegion>,
    transport: &'a T,
    connections: Vec<(NodeId, T::Conn)>,
    state: State,
}

impl<'a, T: Transport> ShuffleDriver<'a, T> {
    pub fn new(cfg: &'a ClusterConfig, region: Arc<MemoryRegion>, transport: &'a T) -> Self {
        Self { cfg, region, transport, connections: Vec::new(), state: State::Init }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Runs the full protocol and returns the rows this node received,
    /// ordered by sender then by original position within that sender's
    /// input.
    pub fn run(mut self, cancel: &CancellationToken) -> Result<Vec<Row>> {
        match self.run_inner(cancel) {
            Ok(rows) => {
                self.state = State::Done;
                self.release_connections();
                Ok(rows)
            }
            Err(e) => {
                self.state = State::Failed;
                self.release_connections();
                Err(e)
            }
        }
    }

    fn run_inner(&mut self, cancel: &CancellationToken) -> Result<Vec<Row>> {
        self.transport.register_memory(&self.region)?;
        self.connect_all()?;
        cancel.check()?;

        let counts = self.run_histogram_phase(cancel)?;
        let matrix = histogram::read_matrix(self.cfg, &self.region);
        self.state = State::HistReady;
        info!(node = self.cfg.my_id, local_rows_by_partition = ?counts, "histogram ready");

        let placement = self.run_placement_phase(&matrix)?;
        info!(node = self.cfg.my_id, total_rows = placement.total_rows, "placement resolved");

        self.run_data_phase(cancel, &matrix)?;

        let rows = self.region.recv_rows(placement.total_rows as usize);
        self.state = State::DataReady;
        info!(node = self.cfg.my_id, received = rows.len(), "shuffle complete");
        Ok(rows)
    }

    fn connect_all(&mut self) -> Result<()> {
        for peer in 0..self.cfg.num_nodes {
            let conn = self.transport.connect(peer)?;
            self.connections.push((peer, conn));
        }
        self.state = State::Connected;
        info!(node = self.cfg.my_id, peers = self.connections.len(), "connected to cluster");
        Ok(())
    }

    fn run_histogram_phase(&mut self, cancel: &CancellationToken) -> Result<Vec<u64>> {
        let counts = self.region.with_input_rows(|rows| histogram::scan_counts(self.cfg, rows));
        histogram::publish(self.cfg, &self.region, &counts, &self.connections)?;
        self.state = State::HistPosted;
        cancel.check()?;

        let coordinator = self.coordinator_connection();
        let barrier = Barrier::new(coordinator, self.region.layout().barrier_offset, self.cfg.num_nodes, self.cfg.barrier_timeout);
        barrier.enter(1)?;
        Ok(counts)
    }

    fn run_placement_phase(&mut self, matrix: &[Vec<u64>]) -> Result<offsets::Placement> {
        let placement = offsets::resolve(self.cfg, matrix, self.region.layout().recv_capacity)?;
        self.state = State::Placed;
        Ok(placement)
    }

    fn run_data_phase(&mut self, cancel: &CancellationToken, matrix: &[Vec<u64>]) -> Result<()> {
        cancel.check()?;
        exchange::run(self.cfg, &self.region, matrix, &self.connections)?;
        self.state = State::DataPosted;

        let coordinator = self.coordinator_connection();
        let barrier = Barrier::new(coordinator, self.region.layout().barrier_offset, self.cfg.num_nodes, self.cfg.barrier_timeout);
        barrier.enter(2)?;
        Ok(())
    }

    fn coordinator_connection(&self) -> &T::Conn {
        &self.connections.iter().find(|(peer, _)| *peer == 0).expect("connection to node 0 always established").1
    }

    fn release_connections(&mut self) {
        for (_, conn) in self.connections.drain(..) {
            let _ = self.transport.close(conn);
        }
    }
}

/// Destination node for a key, re-exported here for callers that only
/// need to reason about where a row ends up without driving a shuffle.
pub fn destination_of(cfg: &ClusterConfig, key: u64) -> NodeId {
    partition::owner_of_key(cfg, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::loopback::{ClusterRegistry, LoopbackTransport};
    use std::time::Duration;

    fn cfg(my_id: u32, num_nodes: u32, num_partitions: u32, num_rows: u64) -> ClusterConfig {
        ClusterConfig {
            rdma_port: 0,
            my_id,
            num_nodes,
            num_partitions,
            num_rows: vec![num_rows; num_nodes as usize],
            mem_size: 1 << 16,
            node_ips: vec!["x".into(); num_nodes as usize],
            scan_threads: 1,
            barrier_timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn two_node_shuffle_conserves_all_rows() {
        let num_nodes = 2;
        let registry = ClusterRegistry::new(num_nodes);

        let handles: Vec<_> = (0..num_nodes)
            .map(|id| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let cfg = cfg(id, num_nodes, 4, 10);
                    let region = Arc::new(MemoryRegion::new(&cfg).unwrap());
                    let rows: Vec<Row> = (0..10u64).map(|i| Row::new(id as u64 * 100 + i, i)).collect();
                    region.write_input_rows(&rows);

                    let transport = LoopbackTransport::new(id, registry);
                    let driver = ShuffleDriver::new(&cfg, Arc::clone(&region), &transport);
                    let received = driver.run(&CancellationToken::new()).unwrap();
                    (rows, received)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let mut sent_total = 0usize;
        let mut received_total = 0usize;
        for (sent, _) in &results {
            sent_total += sent.len();
        }
        for (_, received) in &results {
            received_total += received.len();
        }
        assert_eq!(sent_total, received_total);

        // Every received row must actually belong to the node that received it.
        for (id, (_, received)) in results.iter().enumerate() {
            let cfg = cfg(id as u32, num_nodes, 4, 10);
            for row in received {
                assert_eq!(destination_of(&cfg, row.key), id as u32);
            }
        }
    }

    #[test]
    fn cancellation_before_connect_aborts_cleanly() {
        let registry = ClusterRegistry::new(1);
        let cfg = cfg(0, 1, 1, 0);
        let region = Arc::new(MemoryRegion::new(&cfg).unwrap());
        let transport = LoopbackTransport::new(0, registry);
        let driver = ShuffleDriver::new(&cfg, region, &transport);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = driver.run(&cancel).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
