// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Partition of the CFG into segments.
//!
//! Segment 0 starts at the method entry; segment k starts where suspension
//! point k resumes. A node belongs to the lowest-numbered segment that
//! reaches it without crossing a suspension, so code after a loop's back
//! edge stays with the segment that first entered the loop and a loop with
//! K suspensions yields K resumption segments however often it iterates.

use std::collections::BTreeSet;

use unblock_ir::{Method, Terminator};

use crate::cfg::{Cfg, Exit, NodeId};
use crate::liveness::LiveSet;
use crate::suspend::SuspensionPoint;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentExit {
    FallsIntoSuspension(u32),
    Returns,
    Throws,
    /// Plain jump into a node owned by an earlier segment.
    Continues(u32),
}

#[derive(Debug, Clone)]
pub struct Segment {
    pub index: u32,
    pub entry: NodeId,
    /// Owned nodes in discovery order.
    pub nodes: Vec<NodeId>,
    pub entry_live: LiveSet,
    pub exits: Vec<SegmentExit>,
}

pub struct Segmentation {
    pub segments: Vec<Segment>,
    owner: Vec<Option<u32>>,
}

impl Segmentation {
    pub fn owner(&self, node: NodeId) -> Option<u32> {
        self.owner[node.0 as usize]
    }
}

pub fn segment(
    cfg: &Cfg,
    method: &Method,
    points: &[SuspensionPoint],
    reachable: &BTreeSet<NodeId>,
) -> Segmentation {
    let mut owner: Vec<Option<u32>> = vec![None; cfg.nodes.len()];
    let suspend_index = |id: NodeId| points.iter().find(|p| p.node == id).map(|p| p.index);

    let mut entry_live = LiveSet::new();
    for p in &method.params {
        entry_live.insert(p.id, p.ty.clone());
    }
    let starts = std::iter::once((0u32, cfg.entry, entry_live))
        .chain(points.iter().map(|p| (p.index, p.resume, p.live.clone())));

    let mut segments = Vec::new();
    for (index, entry, entry_live) in starts {
        let mut nodes = Vec::new();
        let mut exits = Vec::new();
        let mut stack = vec![entry];

        while let Some(id) = stack.pop() {
            if !reachable.contains(&id) {
                continue;
            }
            match owner[id.0 as usize] {
                Some(o) if o == index => continue,
                Some(o) => {
                    push_exit(&mut exits, SegmentExit::Continues(o));
                    continue;
                }
                None => owner[id.0 as usize] = Some(index),
            }
            nodes.push(id);

            let node = cfg.node(id);
            let mut next: Vec<NodeId> = cfg.handlers_of(id).collect();
            match &node.exit {
                Exit::Suspend { .. } => {
                    if let Some(k) = suspend_index(id) {
                        push_exit(&mut exits, SegmentExit::FallsIntoSuspension(k));
                    }
                }
                Exit::Term(Terminator::Return) => push_exit(&mut exits, SegmentExit::Returns),
                Exit::Term(Terminator::Throw) => push_exit(&mut exits, SegmentExit::Throws),
                Exit::Term(_) => {
                    let mut succs = node.successors();
                    succs.append(&mut next);
                    next = succs;
                }
            }
            stack.extend(next.into_iter().rev());
        }

        tracing::debug!(
            target: "unblock::segment",
            segment = index,
            nodes = nodes.len(),
            live = entry_live.len(),
            "segment formed"
        );
        segments.push(Segment {
            index,
            entry,
            nodes,
            entry_live,
            exits,
        });
    }

    Segmentation { segments, owner }
}

fn push_exit(exits: &mut Vec<SegmentExit>, exit: SegmentExit) {
    if !exits.contains(&exit) {
        exits.push(exit);
    }
}
