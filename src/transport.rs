//! The abstract transport verb set the shuffle core consumes (§6).
//!
//! The real RDMA transport library — connection establishment, queue-pair
//! management, completion polling — is out of scope (§1): this module only
//! defines the trait boundary plus an in-process [`loopback`]
//! implementation used by tests and the demo binary.

pub mod loopback;

use crate::types::NodeId;
use crate::error::Result;

/// A one-sided handle to a single peer's registered memory region.
///
/// All three verbs address the *peer's* memory by an absolute byte offset
/// into its region; none of them involve the peer's CPU.
pub trait Connection {
    /// Largest single write/read this connection can perform before the
    /// caller must split the transfer into segments. Real fabrics impose a
    /// maximum message size; the loopback transport has none.
    const MAX_MESSAGE_LEN: usize = usize::MAX;

    /// One-sided write of `src` into the peer's region at `remote_offset`.
    /// Returns once the write has locally completed.
    fn write(&self, remote_offset: usize, src: &[u8]) -> Result<()>;

    /// One-sided read of `dst.len()` bytes from the peer's region at
    /// `remote_offset` into `dst`.
    fn read(&self, remote_offset: usize, dst: &mut [u8]) -> Result<()>;

    /// Atomic fetch-and-add of `delta` onto the 8-byte counter at
    /// `remote_offset`; returns the pre-addition value.
    fn fetch_add(&self, remote_offset: usize, delta: u64) -> Result<u64>;

    /// The peer this connection talks to.
    fn peer(&self) -> NodeId;
}

/// Establishes and tears down [`Connection`]s, and registers local memory
/// for remote access.
pub trait Transport {
    type Conn: Connection;

    /// Registers `region` for remote access. Must be called before any
    /// peer can target this node with `write`/`read`/`fetch_add`.
    fn register_memory(&self, region: &std::sync::Arc<crate::memory::MemoryRegion>) -> Result<()>;

    /// Establishes a connection to `peer`, retrying transient failures up
    /// to the transport's own deadline.
    fn connect(&self, peer: NodeId) -> Result<Self::Conn>;

    /// Releases a connection's resources.
    fn close(&self, conn: Self::Conn) -> Result<()>;
}

/// Splits `data` into segments no longer than `max_len` and applies `write`
/// to each at its correct sub-offset, awaiting every segment's completion
/// before returning — so the caller can safely increment a barrier counter
/// immediately afterwards. Addresses the Non-goal-adjacent "chunking" open
/// question in §9: no fabric in this crate currently enforces a ceiling
/// below `usize::MAX`, but a real `Connection` only needs to set
/// `MAX_MESSAGE_LEN` for this to kick in.
pub fn chunk_writes<C: Connection>(conn: &C, remote_offset: usize, data: &[u8]) -> Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    let max_len = C::MAX_MESSAGE_LEN;
    for (i, segment) in data.chunks(max_len.max(1)).enumerate() {
        conn.write(remote_offset + i * max_len, segment)?;
    }
    Ok(())
}
