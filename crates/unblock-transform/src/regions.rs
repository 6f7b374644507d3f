// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Exception-region rewriting.
//!
//! Each input region becomes one region per segment it touches. Pieces are
//! emitted in (input priority, segment index) order, so an inner region
//! still wins over the regions enclosing it. The eager-join block of a
//! suspension and the resumption block of its state are covered by the
//! regions of the suspension site: a failed future surfaces exactly where
//! the marker call stood.

use std::collections::BTreeSet;

use unblock_ir::{BlockId, RegionId, RegionKind};

use crate::cfg::Cfg;
use crate::dispatch::Emitted;
use crate::segment::Segmentation;
use crate::suspend::SuspensionPoint;

/// One segment's share of an input region.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionPiece {
    pub origin: RegionId,
    pub segment: u32,
    pub blocks: BTreeSet<BlockId>,
    pub handler: BlockId,
    pub kind: RegionKind,
}

pub fn rewrite(
    cfg: &Cfg,
    seg: &Segmentation,
    points: &[SuspensionPoint],
    emitted: &Emitted,
) -> Vec<RegionPiece> {
    let mut pieces = Vec::new();

    for region in &cfg.regions {
        let Some(&handler) = emitted.node_blocks.get(&region.handler) else {
            continue;
        };
        for segment in &seg.segments {
            let mut blocks = BTreeSet::new();
            for &node in &region.nodes {
                if seg.owner(node) != Some(segment.index) {
                    continue;
                }
                blocks.extend(emitted.node_blocks.get(&node).copied());
                if let Some(point) = points.iter().find(|p| p.node == node) {
                    blocks.extend(emitted.fast_blocks.get(&point.index).copied());
                }
            }
            if let Some(point) = points.iter().find(|p| p.index == segment.index) {
                if region.nodes.contains(&point.resume) {
                    blocks.extend(emitted.resume_blocks.get(&point.index).copied());
                }
            }

            if blocks.is_empty() {
                continue;
            }
            pieces.push(RegionPiece {
                origin: region.origin,
                segment: segment.index,
                blocks,
                handler,
                kind: region.kind.clone(),
            });
        }
    }

    tracing::debug!(
        target: "unblock::synth",
        regions = cfg.regions.len(),
        pieces = pieces.len(),
        "exception regions projected onto segments"
    );
    pieces
}
