//! C5 — Data exchange.
//!
//! Every node restages its own input rows by destination, then delivers
//! each destination's share: a local copy for itself, a one-sided write
//! for everyone else. The remote slot for each (sender, destination) pair
//! is never negotiated over the wire — `destination`'s [`crate::offsets`]
//! placement is a deterministic function of the shared histogram matrix,
//! so the sender computes it locally by resolving as if it were that
//! destination.

use crate::config::ClusterConfig;
use crate::memory::{Layout, MemoryRegion};
use crate::offsets::{self, Placement};
use crate::partition::{owner_of, part_of};
use crate::transport::Connection;
use crate::types::{NodeId, Row};

/// Groups `rows` by destination node, preserving relative order within
/// each group (stable restage, mirroring a single left-to-right scan).
fn stage_by_destination(cfg: &ClusterConfig, rows: &[Row]) -> Vec<Vec<Row>> {
    let mut staged = vec![Vec::new(); cfg.num_nodes as usize];
    for row in rows {
        let dest = owner_of(cfg, part_of(cfg, row.key));
        staged[dest as usize].push(*row);
    }
    staged
}

/// The placement every other node computed for this node's rows, paired
/// with that destination's own receive-region base offset, indexed by
/// destination — both derived locally from `matrix` and `cfg` without any
/// network round trip.
///
/// Each destination's receive region starts after *its own* input,
/// barrier counter, and histogram — sizes that depend on that
/// destination's row count, not this node's — so its layout must be
/// resolved per destination via [`Layout::plan_for`] rather than reused
/// from this node's own region.
fn placements_for_every_destination(
    cfg: &ClusterConfig,
    matrix: &[Vec<u64>],
) -> crate::error::Result<Vec<(Placement, usize)>> {
    (0..cfg.num_nodes)
        .map(|dest| {
            let mut dest_cfg = cfg.clone();
            dest_cfg.my_id = dest;
            let dest_layout = Layout::plan_for(cfg, dest)?;
            let placement = offsets::resolve(&dest_cfg, matrix, dest_layout.recv_capacity)?;
            Ok((placement, dest_layout.recv_offset))
        })
        .collect()
}

/// Delivers every staged group to its destination: local memcpy for
/// `cfg.my_id`, one-sided writes for everyone else.
pub fn run<C: Connection>(
    cfg: &ClusterConfig,
    region: &MemoryRegion,
    matrix: &[Vec<u64>],
    connections: &[(NodeId, C)],
) -> crate::error::Result<()> {
    let placements = placements_for_every_destination(cfg, matrix)?;
    let staged = region.with_input_rows(|rows| stage_by_destination(cfg, rows));

    for (dest, group) in staged.into_iter().enumerate() {
        if group.is_empty() {
            continue;
        }
        let (placement, recv_offset) = &placements[dest];
        let offset = recv_offset + placement.byte_offset(cfg.my_id);
        let bytes = Row::as_bytes(&group);

        if dest as u32 == cfg.my_id {
            region.write_bytes(offset, bytes);
            continue;
        }
        let (_, conn) = connections
            .iter()
            .find(|(peer, _)| *peer == dest as u32)
            .expect("connection to every peer must exist before the data exchange");
        crate::transport::chunk_writes(conn, offset, bytes)?;
    }
    Ok(())
}
