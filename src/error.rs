//! Error types for the shuffle pipeline.
//!
//! A single sum type covers the taxonomy the driver can surface; there is
//! no retry policy at this layer (§7: recovery is the caller's job, by
//! tearing the node down and retrying the whole shuffle).

use thiserror::Error;

/// Errors a shuffle can terminate with.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid cluster configuration, or a layout that doesn't fit in
    /// `mem_size`. Fatal pre-flight: no transport traffic is issued.
    #[error("configuration error: {0}")]
    Config(String),

    /// The transport failed to establish a connection within its retry
    /// budget. Fatal; aborts before the histogram phase.
    #[error("failed to connect to node {node_id}: {message}")]
    Connect { node_id: crate::types::NodeId, message: String },

    /// A `write`/`read`/`fetch_add` reported a non-transient failure
    /// mid-protocol. Fatal for this shuffle; no retry at this layer.
    #[error("transport error talking to node {node_id}: {message}")]
    Transport { node_id: crate::types::NodeId, message: String },

    /// The barrier's polling loop exceeded its wall-clock ceiling.
    #[error("barrier timed out waiting for phase {phase} (last observed counter: {observed})")]
    BarrierTimeout { phase: u64, observed: u64 },

    /// The computed receive-region footprint exceeds its capacity.
    /// Detected at offset resolution, before any data write is issued.
    #[error("receive region overflow: need {needed} bytes, have {capacity}")]
    Overflow { needed: usize, capacity: usize },

    /// Cancellation was observed at a suspension point.
    #[error("shuffle cancelled")]
    Cancelled,
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
