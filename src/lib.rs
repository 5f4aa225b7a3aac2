//! Distributed data shuffle over a one-sided RDMA-style fabric.
//!
//! A fixed number of nodes `N`, each holding some input rows, redistribute
//! those rows by key so that every row ends up on the node that owns its
//! partition. The core protocol has four phases, run identically and
//! independently by every node with no central coordinator beyond a shared
//! barrier counter:
//!
//! 1. [`histogram`] — each node counts its rows per destination partition
//!    and publishes that count to every peer.
//! 2. [`offsets`] — each node resolves, from the shared histogram matrix
//!    alone, exactly where every sender's rows will land in its receive
//!    region.
//! 3. [`exchange`] — each node delivers its rows: local copy for itself,
//!    one-sided writes for everyone else.
//! 4. A final [`barrier`] confirms every write has landed before any node
//!    reads its receive region.
//!
//! [`driver::ShuffleDriver`] runs all four phases end to end; [`transport`]
//! defines the one-sided verb set the protocol is built on, with
//! [`transport::loopback`] providing an in-process implementation for
//! tests and demos.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]

pub mod barrier;
pub mod config;
pub mod driver;
pub mod error;
pub mod exchange;
pub mod histogram;
pub mod memory;
pub mod offsets;
pub mod partition;
pub mod transport;
pub mod types;

pub use config::ClusterConfig;
pub use driver::{CancellationToken, ShuffleDriver, State};
pub use error::{Error, Result};
pub use memory::{Layout, MemoryRegion};
pub use types::{NodeId, PartitionId, Row, ROW_SIZE};
