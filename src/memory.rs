//! C2 — Memory-region layout planner and the [`MemoryRegion`] view over a
//! node's single RDMA-registered buffer.
//!
//! The offsets table is a pure function of [`ClusterConfig`] alone, so it
//! is reproducible on every node without any coordination (§3's central
//! invariant: "deterministic functions of ClusterConfig alone"). All byte
//! access goes through copy-in/copy-out accessors rather than borrowed
//! slices, mirroring the abstract transport verbs in §6 (`write(src, ...)`,
//! `read(dst, ...)`) which themselves never hand out a reference into
//! remote memory — only ever a local copy.

use parking_lot::Mutex;

use crate::config::ClusterConfig;
use crate::error::{Error, Result};
use crate::types::{NodeId, Row, ROW_SIZE};

/// Absolute byte offsets of every sub-region inside a node's
/// [`MemoryRegion`], identical across the cluster for a given
/// `ClusterConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub input_offset: usize,
    pub input_len: usize,
    pub barrier_offset: usize,
    pub hist_offset: usize,
    pub hist_len: usize,
    pub recv_offset: usize,
    pub recv_capacity: usize,
}

const BARRIER_COUNTER_SIZE: usize = 8;

impl Layout {
    /// Computes the layout table for this node (`cfg.my_id`), rejecting
    /// configurations whose fixed-size prefix (input + barrier +
    /// histogram) doesn't fit in `mem_size`, or that leave no room at all
    /// for a receive region.
    pub fn plan(cfg: &ClusterConfig) -> Result<Self> {
        Self::plan_for(cfg, cfg.my_id)
    }

    /// Computes the layout table for an arbitrary node `node` in the
    /// cluster. Every node can call this for every other node: the
    /// inputs (`node`'s own row count plus the cluster-wide fields) are
    /// all present in `cfg`, so this never requires asking `node`
    /// anything — which is exactly what lets a sender address a remote
    /// write without a round trip.
    pub fn plan_for(cfg: &ClusterConfig, node: NodeId) -> Result<Self> {
        let input_len = cfg.num_rows_of(node)? as usize * ROW_SIZE;
        let hist_len = cfg.num_nodes as usize * cfg.num_partitions as usize * 8;

        let barrier_offset = input_len;
        let hist_offset = barrier_offset + BARRIER_COUNTER_SIZE;
        let recv_offset = hist_offset + hist_len;

        let mem_size = cfg.mem_size as usize;
        if recv_offset >= mem_size {
            return Err(Error::Config(format!(
                "mem_size ({mem_size}) too small for node {node}: input+barrier+histogram needs {recv_offset} bytes, leaving no room for a receive region"
            )));
        }

        Ok(Self {
            input_offset: 0,
            input_len,
            barrier_offset,
            hist_offset,
            hist_len,
            recv_offset,
            recv_capacity: mem_size - recv_offset,
        })
    }

    /// Byte range of sender `s`'s row in the histogram matrix.
    pub fn histogram_row_range(&self, sender: NodeId, num_partitions: u32) -> std::ops::Range<usize> {
        let row_len = num_partitions as usize * 8;
        let start = self.hist_offset + sender as usize * row_len;
        start..start + row_len
    }
}

/// A single contiguous, RDMA-registered byte buffer, sub-divided per
/// [`Layout`]. Exactly one per node, reused across shuffles.
///
/// Storage is mutex-guarded so the same type serves both the driver's own
/// local region and (via [`crate::transport`]) the handle a peer's
/// in-process loopback connection writes into; real RDMA hardware would
/// never contend on this lock, since remote writes land via the device
/// rather than this struct.
pub struct MemoryRegion {
    bytes: Mutex<Vec<u8>>,
    layout: Layout,
    size: usize,
}

impl MemoryRegion {
    /// Allocates a fresh, zeroed region sized and laid out for `cfg`.
    pub fn new(cfg: &ClusterConfig) -> Result<Self> {
        let layout = Layout::plan(cfg)?;
        let size = cfg.mem_size as usize;
        Ok(Self { bytes: Mutex::new(vec![0u8; size]), layout, size })
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Populates the input region with the given rows (test-harness /
    /// demo entry point — mirrors the original's contract that the caller
    /// pre-fills the first `num_rows * row_size` bytes before the shuffle
    /// starts).
    pub fn write_input_rows(&self, rows: &[Row]) {
        let bytes = Row::as_bytes(rows);
        self.write_bytes(self.layout.input_offset, bytes);
    }

    /// Runs `f` over the input rows without copying them out; used by the
    /// local histogram scan and the staging step.
    pub fn with_input_rows<R>(&self, f: impl FnOnce(&[Row]) -> R) -> R {
        let guard = self.bytes.lock();
        let slice = &guard[self.layout.input_offset..self.layout.input_offset + self.layout.input_len];
        f(Row::slice_from_bytes(slice))
    }

    /// Copies `data` into the region at `offset`. This is what a local
    /// "write" and the final local-copy step of the data exchange use;
    /// remote one-sided writes go through [`crate::transport::Connection`]
    /// instead, which for the loopback transport calls this same method on
    /// the destination node's region.
    pub fn write_bytes(&self, offset: usize, data: &[u8]) {
        let mut guard = self.bytes.lock();
        guard[offset..offset + data.len()].copy_from_slice(data);
    }

    /// Copies `len` bytes out of the region starting at `offset`.
    pub fn read_bytes(&self, offset: usize, len: usize) -> Vec<u8> {
        let guard = self.bytes.lock();
        guard[offset..offset + len].to_vec()
    }

    /// Atomic (within this process) fetch-and-add on the 8-byte counter at
    /// `offset`, returning the pre-addition value — the one verb in the
    /// abstract transport that genuinely needs atomicity rather than mere
    /// one-sidedness.
    pub fn fetch_add_u64(&self, offset: usize, delta: u64) -> u64 {
        let mut guard = self.bytes.lock();
        let slot = &mut guard[offset..offset + 8];
        let prev = u64::from_le_bytes(slot.try_into().unwrap());
        slot.copy_from_slice(&(prev.wrapping_add(delta)).to_le_bytes());
        prev
    }

    pub fn read_u64(&self, offset: usize) -> u64 {
        u64::from_le_bytes(self.read_bytes(offset, 8).try_into().unwrap())
    }

    pub fn write_u64(&self, offset: usize, value: u64) {
        self.write_bytes(offset, &value.to_le_bytes());
    }

    /// Copies out the `count` rows starting at the receive region's base.
    pub fn recv_rows(&self, count: usize) -> Vec<Row> {
        let bytes = self.read_bytes(self.layout.recv_offset, count * ROW_SIZE);
        Row::slice_from_bytes(&bytes).to_vec()
    }
}
