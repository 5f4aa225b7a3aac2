//! An in-process stand-in for the RDMA transport, used by the integration
//! tests and the demo binary so the protocol in `driver.rs` can be
//! exercised without real fabric hardware.
//!
//! Every simulated node runs on its own OS thread inside the same process;
//! a [`ClusterRegistry`] shared via `Arc` plays the role the fabric plays
//! for real hardware — a way for one node's `write`/`read`/`fetch_add` to
//! reach another node's registered memory. Grounded on the same pattern
//! `other_examples`' userspace RDMA memory pool uses (a mutex-guarded
//! buffer standing in for a registered region).

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::memory::MemoryRegion;
use crate::types::NodeId;

use super::Connection;

/// Shared slots, one per node, populated as each node registers its local
/// memory region. Construct once per test/demo run and hand an `Arc` clone
/// to every simulated node.
pub struct ClusterRegistry {
    slots: Vec<Mutex<Option<Arc<MemoryRegion>>>>,
}

impl ClusterRegistry {
    pub fn new(num_nodes: u32) -> Arc<Self> {
        Arc::new(Self { slots: (0..num_nodes).map(|_| Mutex::new(None)).collect() })
    }
}

/// A node's handle onto the shared registry; implements
/// [`crate::transport::Transport`].
pub struct LoopbackTransport {
    my_id: NodeId,
    registry: Arc<ClusterRegistry>,
    connect_deadline: Duration,
}

impl LoopbackTransport {
    pub fn new(my_id: NodeId, registry: Arc<ClusterRegistry>) -> Self {
        Self { my_id, registry, connect_deadline: Duration::from_secs(5) }
    }
}

impl super::Transport for LoopbackTransport {
    type Conn = LoopbackConnection;

    fn register_memory(&self, region: &Arc<MemoryRegion>) -> Result<()> {
        *self.registry.slots[self.my_id as usize].lock() = Some(Arc::clone(region));
        Ok(())
    }

    fn connect(&self, peer: NodeId) -> Result<Self::Conn> {
        let start = Instant::now();
        loop {
            if let Some(region) = self.registry.slots[peer as usize].lock().clone() {
                return Ok(LoopbackConnection { peer, region });
            }
            if start.elapsed() > self.connect_deadline {
                return Err(Error::Connect {
                    node_id: peer,
                    message: "timed out waiting for peer to register its memory".into(),
                });
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn close(&self, _conn: Self::Conn) -> Result<()> {
        Ok(())
    }
}

/// A one-sided handle onto a peer's (in-process) registered region.
pub struct LoopbackConnection {
    peer: NodeId,
    region: Arc<MemoryRegion>,
}

impl Connection for LoopbackConnection {
    fn write(&self, remote_offset: usize, src: &[u8]) -> Result<()> {
        self.region.write_bytes(remote_offset, src);
        Ok(())
    }

    fn read(&self, remote_offset: usize, dst: &mut [u8]) -> Result<()> {
        let bytes = self.region.read_bytes(remote_offset, dst.len());
        dst.copy_from_slice(&bytes);
        Ok(())
    }

    fn fetch_add(&self, remote_offset: usize, delta: u64) -> Result<u64> {
        Ok(self.region.fetch_add_u64(remote_offset, delta))
    }

    fn peer(&self) -> NodeId {
        self.peer
    }
}
