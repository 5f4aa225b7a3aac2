//! C6 — Distributed barrier.
//!
//! Every node, including node 0, fetch-adds `1` onto the single shared
//! counter that lives in node 0's region at `Layout::barrier_offset`, then
//! polls that same counter until it reaches `phase * num_nodes`. This is
//! the pull-style redesign: the original coordinator instead waited for
//! `N - 1` fetch-adds and then pushed a `done` flag into each peer's own
//! slot. Pull-style drops the push fan-out and the per-peer `done` slots
//! entirely — one counter, one poll loop, identical on every node.

use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::transport::Connection;

const POLL_BACKOFF: Duration = Duration::from_micros(200);

/// A handle onto the shared barrier counter, reached through a connection
/// to node 0 (on node 0 itself this connection loops back to its own
/// region).
pub struct Barrier<'a, C: Connection> {
    coordinator: &'a C,
    offset: usize,
    num_nodes: u32,
    timeout: Duration,
}

impl<'a, C: Connection> Barrier<'a, C> {
    pub fn new(coordinator: &'a C, offset: usize, num_nodes: u32, timeout: Duration) -> Self {
        Self { coordinator, offset, num_nodes, timeout }
    }

    /// Blocks until every node has entered barrier `phase` (1-indexed: the
    /// first call is phase 1, raising the counter from `0` to `num_nodes`).
    pub fn enter(&self, phase: u64) -> Result<()> {
        self.coordinator.fetch_add(self.offset, 1)?;
        let target = phase * self.num_nodes as u64;
        let start = Instant::now();
        loop {
            let mut buf = [0u8; 8];
            self.coordinator.read(self.offset, &mut buf)?;
            let observed = u64::from_le_bytes(buf);
            if observed >= target {
                return Ok(());
            }
            if start.elapsed() > self.timeout {
                return Err(Error::BarrierTimeout { phase, observed });
            }
            std::thread::sleep(POLL_BACKOFF);
        }
    }
}
