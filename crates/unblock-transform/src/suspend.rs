// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Suspension points in forward-walk order.

use std::collections::BTreeSet;

use unblock_ir::{Location, Method, Type};

use crate::cfg::{Cfg, Exit, NodeId};
use crate::liveness::{LiveSet, Liveness};

/// One suspend marker call. State index `index` resumes at `resume`.
#[derive(Debug, Clone)]
pub struct SuspensionPoint {
    pub index: u32,
    /// Node ending with the marker call.
    pub node: NodeId,
    pub resume: NodeId,
    /// The marker call in the input method.
    pub location: Location,
    /// Instruction that left the future on the stack, when it sits in the
    /// same node. `None` when the future is the value of an earlier
    /// suspension or flows in from a predecessor.
    pub producer: Option<Location>,
    pub resume_ty: Type,
    /// A local handler can observe a failure of the awaited future.
    pub may_throw: bool,
    pub live: LiveSet,
}

/// Depth-first from the entry: successors in terminator order, then
/// handlers in priority order. The walk order numbers the states.
pub fn walk_order(cfg: &Cfg, reachable: &BTreeSet<NodeId>) -> Vec<NodeId> {
    let mut order = Vec::new();
    let mut seen = BTreeSet::new();
    let mut stack = vec![cfg.entry];
    while let Some(id) = stack.pop() {
        if !reachable.contains(&id) || !seen.insert(id) {
            continue;
        }
        order.push(id);
        let mut next = cfg.node(id).successors();
        next.extend(cfg.handlers_of(id));
        stack.extend(next.into_iter().rev());
    }
    order
}

pub fn collect(
    cfg: &Cfg,
    method: &Method,
    order: &[NodeId],
    liveness: &Liveness,
) -> Vec<SuspensionPoint> {
    let mut points = Vec::new();
    for &id in order {
        let node = cfg.node(id);
        let Exit::Suspend { marker, resume } = &node.exit else {
            continue;
        };
        let index = points.len() as u32 + 1;
        let producer = find_producer(cfg, id);
        points.push(SuspensionPoint {
            index,
            node: id,
            resume: *resume,
            location: node.exit_location(),
            producer,
            resume_ty: marker.ret.clone(),
            may_throw: cfg.regions_covering(id).next().is_some(),
            live: liveness.live_across(cfg, method, id, *resume),
        });
        tracing::trace!(
            target: "unblock::analyze",
            state = index,
            at = %node.exit_location(),
            live = points[points.len() - 1].live.len(),
            "suspension point"
        );
    }
    points
}

/// Walk back from the marker until an instruction pushes the future.
fn find_producer(cfg: &Cfg, id: NodeId) -> Option<Location> {
    let node = cfg.node(id);
    let mut needed = 1usize;
    for (i, instr) in node.instrs.iter().enumerate().rev() {
        let (pops, pushes) = instr.stack_effect();
        if pushes >= needed {
            return Some(node.location(i));
        }
        needed = needed - pushes + pops;
    }
    None
}
