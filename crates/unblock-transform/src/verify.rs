// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Structural checks on the input method, run before any rewriting.

use std::collections::BTreeSet;

use unblock_ir::{BlockId, Instr, Location, Method};

use crate::cfg::{Cfg, NodeId};
use crate::{MethodCtx, TransformError};

/// Every block, region and local a method mentions must exist.
pub fn check_references(method: &Method, ctx: &MethodCtx<'_>) -> Result<(), TransformError> {
    let block_count = method.blocks.len() as u32;
    let valid = |b: BlockId| b.0 < block_count;

    if !valid(method.entry_block) {
        return Err(ctx.malformed(
            Location::new(method.entry_block, 0),
            "entry block does not exist",
        ));
    }

    for (idx, block) in method.blocks.iter().enumerate() {
        if block.id.0 as usize != idx {
            return Err(ctx.malformed(
                Location::new(BlockId(idx as u32), 0),
                format!("block listed at position {} is numbered bb{}", idx, block.id.0),
            ));
        }
        for (offset, instr) in block.instrs.iter().enumerate() {
            let locals = instr.used_local().into_iter().chain(instr.defined_local());
            for local in locals {
                if method.local(local).is_none() {
                    return Err(ctx.malformed(
                        Location::new(block.id, offset),
                        format!("undeclared local _{}", local.0),
                    ));
                }
            }
        }
        for target in block.terminator.successors() {
            if !valid(target) {
                return Err(ctx.malformed(
                    Location::new(block.id, block.instrs.len()),
                    format!("jump to missing block bb{}", target.0),
                ));
            }
        }
    }

    for region in &method.regions {
        if !valid(region.handler) {
            return Err(ctx.malformed(
                Location::new(region.handler, 0),
                format!("region r{} names a missing handler", region.id.0),
            ));
        }
        if let Some(missing) = region.blocks.iter().find(|b| !valid(**b)) {
            return Err(ctx.malformed(
                Location::new(*missing, 0),
                format!("region r{} covers a missing block", region.id.0),
            ));
        }
    }
    Ok(())
}

/// Regions must nest, and an inner region must come before any region
/// that strictly contains it. Identical try-sets (one try, several
/// catches) are fine in any order.
pub fn check_region_shape(method: &Method, ctx: &MethodCtx<'_>) -> Result<(), TransformError> {
    for (i, first) in method.regions.iter().enumerate() {
        for second in &method.regions[i + 1..] {
            if first.blocks.is_empty() || second.blocks.is_empty() {
                continue;
            }
            let shared: BTreeSet<BlockId> =
                first.blocks.intersection(&second.blocks).copied().collect();
            let Some(&at) = shared.iter().next() else {
                continue;
            };
            let first_in_second = first.blocks.is_subset(&second.blocks);
            let second_in_first = second.blocks.is_subset(&first.blocks);

            let detail = if !first_in_second && !second_in_first {
                "try-sets partially overlap"
            } else if second_in_first && !first_in_second {
                "enclosing region listed before the region it contains"
            } else {
                continue;
            };
            return Err(TransformError::AmbiguousExceptionRegion {
                method: ctx.qualified.to_string(),
                first: first.id,
                second: second.id,
                at: Location::new(at, 0),
                handlers: (
                    Location::new(first.handler, 0),
                    Location::new(second.handler, 0),
                ),
                detail: detail.to_string(),
            });
        }
    }
    Ok(())
}

/// Blocks reachable from the entry along normal and exceptional edges.
pub fn reachable_blocks(method: &Method) -> BTreeSet<BlockId> {
    let mut seen = BTreeSet::new();
    let mut stack = vec![method.entry_block];
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        let Some(block) = method.block(id) else {
            continue;
        };
        stack.extend(block.terminator.successors());
        stack.extend(method.regions_covering(id).map(|r| r.handler));
    }
    seen
}

/// A suspend marker in dead code would get a state no dispatch can enter.
pub fn check_reachable_suspensions(
    method: &Method,
    ctx: &MethodCtx<'_>,
) -> Result<(), TransformError> {
    let reachable = reachable_blocks(method);
    for block in &method.blocks {
        if reachable.contains(&block.id) {
            continue;
        }
        if let Some(offset) = block.instrs.iter().position(|i| ctx.is_marker(i)) {
            return Err(TransformError::UnreachableSuspensionState {
                method: ctx.qualified.to_string(),
                at: Location::new(block.id, offset),
            });
        }
    }
    Ok(())
}

/// Same check on the split CFG, once flow analysis knows which handlers
/// can actually be entered: a handler whose region never throws is dead.
/// Only blocks of `input` count; finally copies added by normalization may
/// legitimately go unused.
pub fn check_entered_suspensions(
    input: &Method,
    cfg: &Cfg,
    reachable: &BTreeSet<NodeId>,
    ctx: &MethodCtx<'_>,
) -> Result<(), TransformError> {
    match cfg.nodes.iter().find(|n| {
        n.is_suspend() && !reachable.contains(&n.id) && input.block(n.origin).is_some()
    }) {
        Some(node) => Err(TransformError::UnreachableSuspensionState {
            method: ctx.qualified.to_string(),
            at: node.exit_location(),
        }),
        None => Ok(()),
    }
}

/// Marker calls must take exactly the awaited future.
pub fn check_marker_arity(method: &Method, ctx: &MethodCtx<'_>) -> Result<(), TransformError> {
    for block in &method.blocks {
        for (offset, instr) in block.instrs.iter().enumerate() {
            if let Instr::Invoke { func } = instr {
                if ctx.options.is_suspend_marker(&func.name) && func.argc != 1 {
                    return Err(TransformError::UnsupportedSuspensionPosition {
                        method: ctx.qualified.to_string(),
                        at: Location::new(block.id, offset),
                        detail: format!(
                            "`{}` takes exactly one future, called with {}",
                            func.name, func.argc
                        ),
                    });
                }
            }
        }
    }
    Ok(())
}
