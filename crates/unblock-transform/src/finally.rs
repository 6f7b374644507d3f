// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Finally normalization.
//!
//! Rewrites every `Finally` region into plain control flow: the finally
//! body is copied onto each exit edge of the try-set, and the exceptional
//! edge becomes a `CatchAll` handler that runs its own copy and rethrows.
//! Afterwards a resumption that re-enters the try-set is indistinguishable
//! from fall-through, so a finally body runs once per exit no matter how
//! many times the method suspended inside the try.
//!
//! Block ids of the input are preserved. Copies are appended, and the
//! original bodies are stubbed out (empty, `Unreachable`) once nothing
//! reaches them.

use std::collections::{BTreeSet, HashMap};

use unblock_ir::{
    Block, BlockId, ExceptionRegion, Instr, Local, LocalId, Location, Method, RegionKind,
    Terminator, Type,
};

use crate::verify::reachable_blocks;
use crate::{MethodCtx, TransformError};

/// How a finally copy continues after its body.
#[derive(Debug, Clone, Copy)]
enum Continuation {
    Jump(BlockId),
    Return(Option<LocalId>),
    Rethrow(LocalId),
}

pub fn normalize(method: &Method, ctx: &MethodCtx<'_>) -> Result<Method, TransformError> {
    check_end_finally(method, ctx)?;

    if !method
        .regions
        .iter()
        .any(|r| matches!(r.kind, RegionKind::Finally))
    {
        return Ok(method.clone());
    }

    let mut m = method.clone();
    // Table order is innermost first.
    for idx in 0..m.regions.len() {
        if matches!(m.regions[idx].kind, RegionKind::Finally) {
            expand_region(&mut m, idx, ctx)?;
        }
    }

    stub_unreachable(&mut m);
    tracing::debug!(
        target: "unblock::analyze",
        method = ctx.qualified,
        blocks = m.blocks.len(),
        "finally regions normalized"
    );
    Ok(m)
}

/// `EndFinally` may only close a block reached from a finally handler.
fn check_end_finally(method: &Method, ctx: &MethodCtx<'_>) -> Result<(), TransformError> {
    let mut bodies = BTreeSet::new();
    for region in &method.regions {
        if matches!(region.kind, RegionKind::Finally) {
            bodies.extend(finally_body(method, region.handler));
        }
    }
    for block in &method.blocks {
        if matches!(block.terminator, Terminator::EndFinally) && !bodies.contains(&block.id) {
            return Err(ctx.malformed(
                Location::new(block.id, block.instrs.len()),
                "end_finally outside a finally body",
            ));
        }
    }
    Ok(())
}

/// Blocks of the finally body starting at `handler`, in discovery order.
fn finally_body(method: &Method, handler: BlockId) -> Vec<BlockId> {
    let mut order = Vec::new();
    let mut seen = BTreeSet::new();
    let mut stack = vec![handler];
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        order.push(id);
        if let Some(block) = method.block(id) {
            for succ in block.terminator.successors().into_iter().rev() {
                stack.push(succ);
            }
        }
    }
    order
}

fn expand_region(m: &mut Method, idx: usize, ctx: &MethodCtx<'_>) -> Result<(), TransformError> {
    let region = m.regions[idx].clone();
    let body = finally_body(m, region.handler);

    if let Some(inside) = body.iter().find(|b| region.blocks.contains(b)) {
        return Err(ctx.malformed(
            Location::new(*inside, 0),
            format!("finally body of r{} overlaps its own try-set", region.id.0),
        ));
    }
    let body_set: BTreeSet<BlockId> = body.iter().copied().collect();

    let (handler_head, handler_tail) = split_handler_prologue(m, region.handler, ctx)?;

    let mut exit_copies: HashMap<BlockId, BlockId> = HashMap::new();
    let mut return_copy: Option<(Option<LocalId>, BlockId)> = None;

    for &id in &region.blocks {
        let term = m.blocks[id.0 as usize].terminator.clone();
        match term {
            Terminator::Return => {
                let (slot, copy) = match return_copy {
                    Some(found) => found,
                    None => {
                        let ret_ty = m.ret_ty.clone();
                        let slot = (!ret_ty.is_void())
                            .then(|| add_temp(m, "__finally_ret", ret_ty));
                        let copy = copy_body(
                            m,
                            idx,
                            &body,
                            handler_tail,
                            Continuation::Return(slot),
                        );
                        return_copy = Some((slot, copy));
                        (slot, copy)
                    }
                };
                let block = &mut m.blocks[id.0 as usize];
                if let Some(slot) = slot {
                    block.instrs.push(Instr::Store(slot));
                }
                block.terminator = Terminator::Goto { target: copy };
            }
            Terminator::Goto { .. } | Terminator::Branch { .. } | Terminator::Switch { .. } => {
                let mut targets = Vec::new();
                for target in term.successors() {
                    if region.blocks.contains(&target) {
                        continue;
                    }
                    if body_set.contains(&target) {
                        return Err(ctx.malformed(
                            Location::new(id, m.blocks[id.0 as usize].instrs.len()),
                            format!("jump into the finally body of r{}", region.id.0),
                        ));
                    }
                    targets.push(target);
                }
                for target in targets {
                    if !exit_copies.contains_key(&target) {
                        let copy =
                            copy_body(m, idx, &body, handler_tail, Continuation::Jump(target));
                        exit_copies.insert(target, copy);
                    }
                }
                let rewritten = term.map_targets(|t| exit_copies.get(&t).copied().unwrap_or(t));
                m.blocks[id.0 as usize].terminator = rewritten;
            }
            Terminator::Throw | Terminator::EndFinally | Terminator::Unreachable => {}
        }
    }

    // Exceptional edge: catch everything, run a copy, rethrow.
    let exc = add_temp(m, "__finally_exc", Type::object("Throwable"));
    let rethrow = copy_body(m, idx, &body, handler_tail, Continuation::Rethrow(exc));
    let handler = push_block(
        m,
        handler_head.into_iter().chain([Instr::Store(exc)]).collect(),
        Terminator::Goto { target: rethrow },
    );
    inherit_membership(m, idx, region.handler, handler);

    m.regions[idx] = ExceptionRegion {
        id: region.id,
        blocks: region.blocks,
        handler,
        kind: RegionKind::CatchAll,
    };
    Ok(())
}

/// The handler's first instruction consumes the exception. Normal-path
/// copies skip it; the exceptional path keeps any store it makes and
/// additionally saves the exception for the rethrow.
fn split_handler_prologue(
    m: &Method,
    handler: BlockId,
    ctx: &MethodCtx<'_>,
) -> Result<(Vec<Instr>, usize), TransformError> {
    let block = &m.blocks[handler.0 as usize];
    match block.instrs.first() {
        Some(Instr::Pop) => Ok((Vec::new(), 1)),
        Some(Instr::Store(slot)) => Ok((vec![Instr::Dup, Instr::Store(*slot)], 1)),
        _ => Err(ctx.malformed(
            Location::new(handler, 0),
            "finally handler must begin by consuming the exception",
        )),
    }
}

fn copy_body(
    m: &mut Method,
    region_idx: usize,
    body: &[BlockId],
    skip_prologue: usize,
    cont: Continuation,
) -> BlockId {
    let base = m.blocks.len() as u32;
    let map: HashMap<BlockId, BlockId> = body
        .iter()
        .enumerate()
        .map(|(i, b)| (*b, BlockId(base + i as u32)))
        .collect();

    for (i, &orig) in body.iter().enumerate() {
        let source = &m.blocks[orig.0 as usize];
        let mut instrs = if i == 0 {
            source.instrs[skip_prologue.min(source.instrs.len())..].to_vec()
        } else {
            source.instrs.clone()
        };
        let terminator = match source.terminator {
            Terminator::EndFinally => match cont {
                Continuation::Jump(target) => Terminator::Goto { target },
                Continuation::Return(slot) => {
                    instrs.extend(slot.map(Instr::Load));
                    Terminator::Return
                }
                Continuation::Rethrow(slot) => {
                    instrs.push(Instr::Load(slot));
                    Terminator::Throw
                }
            },
            ref other => other.map_targets(|t| map.get(&t).copied().unwrap_or(t)),
        };
        let id = push_block(m, instrs, terminator);
        inherit_membership(m, region_idx, orig, id);
    }
    map[&body[0]]
}

fn push_block(m: &mut Method, instrs: Vec<Instr>, terminator: Terminator) -> BlockId {
    let id = BlockId(m.blocks.len() as u32);
    m.blocks.push(Block {
        id,
        instrs,
        terminator,
    });
    id
}

/// `copy` joins every region (other than the one being expanded) that
/// covers `orig`.
fn inherit_membership(m: &mut Method, region_idx: usize, orig: BlockId, copy: BlockId) {
    for (i, region) in m.regions.iter_mut().enumerate() {
        if i != region_idx && region.blocks.contains(&orig) {
            region.blocks.insert(copy);
        }
    }
}

fn add_temp(m: &mut Method, name: &str, ty: Type) -> LocalId {
    let id = LocalId(m.locals.iter().map(|l| l.id.0 + 1).max().unwrap_or(0));
    m.locals.push(Local {
        id,
        name: Some(format!("{}{}", name, id.0)),
        ty,
        is_param: false,
    });
    id
}

fn stub_unreachable(m: &mut Method) {
    let reachable = reachable_blocks(m);
    for block in &mut m.blocks {
        if !reachable.contains(&block.id) {
            block.instrs.clear();
            block.terminator = Terminator::Unreachable;
        }
    }
    for region in &mut m.regions {
        region.blocks.retain(|b| reachable.contains(b));
    }
    m.regions.retain(|r| !r.blocks.is_empty());
}
