// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Suspension-split control-flow graph.
//!
//! Every block becomes one node per suspend marker it contains plus one:
//! the marker call ends a node and the remainder of the block starts a
//! fresh one. Node `n` for `n < blocks.len()` is the head of block `n`,
//! so terminator targets read directly as node ids.

use std::collections::BTreeSet;

use unblock_ir::{BlockId, FunctionRef, Instr, Location, Method, RegionId, RegionKind, Terminator};

use crate::MethodCtx;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Head node of `block`.
    pub fn head(block: BlockId) -> Self {
        NodeId(block.0)
    }
}

#[derive(Debug, Clone)]
pub enum Exit {
    /// The block's own terminator. Targets are head nodes.
    Term(Terminator),
    /// Marker call consuming the future on top of the stack.
    Suspend { marker: FunctionRef, resume: NodeId },
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub origin: BlockId,
    /// Offset of `instrs[0]` within the origin block.
    pub start: usize,
    pub instrs: Vec<Instr>,
    pub exit: Exit,
}

impl Node {
    pub fn location(&self, index: usize) -> Location {
        Location::new(self.origin, self.start + index)
    }

    /// Location of the marker call or terminator ending this node.
    pub fn exit_location(&self) -> Location {
        self.location(self.instrs.len())
    }

    /// Normal-flow successors in terminator order.
    pub fn successors(&self) -> Vec<NodeId> {
        match &self.exit {
            Exit::Term(term) => term.successors().into_iter().map(NodeId::head).collect(),
            Exit::Suspend { resume, .. } => vec![*resume],
        }
    }

    pub fn is_suspend(&self) -> bool {
        matches!(self.exit, Exit::Suspend { .. })
    }
}

/// An exception region over nodes.
#[derive(Debug, Clone)]
pub struct CfgRegion {
    pub origin: RegionId,
    pub nodes: BTreeSet<NodeId>,
    pub handler: NodeId,
    pub kind: RegionKind,
}

#[derive(Debug, Clone)]
pub struct Cfg {
    pub nodes: Vec<Node>,
    pub entry: NodeId,
    /// Priority order, as in the method.
    pub regions: Vec<CfgRegion>,
}

impl Cfg {
    pub fn build(method: &Method, ctx: &MethodCtx<'_>) -> Cfg {
        let mut nodes: Vec<Node> = method
            .blocks
            .iter()
            .map(|b| Node {
                id: NodeId::head(b.id),
                origin: b.id,
                start: 0,
                instrs: Vec::new(),
                exit: Exit::Term(b.terminator.clone()),
            })
            .collect();
        // Pieces of each block, head first.
        let mut pieces: Vec<Vec<NodeId>> = vec![Vec::new(); method.blocks.len()];

        for block in &method.blocks {
            let mut current = NodeId::head(block.id);
            let mut start = 0;
            pieces[block.id.0 as usize].push(current);

            for (offset, instr) in block.instrs.iter().enumerate() {
                let Instr::Invoke { func } = instr else {
                    continue;
                };
                if !ctx.options.is_suspend_marker(&func.name) {
                    continue;
                }
                let resume = NodeId(nodes.len() as u32);
                nodes.push(Node {
                    id: resume,
                    origin: block.id,
                    start: offset + 1,
                    instrs: Vec::new(),
                    exit: Exit::Term(block.terminator.clone()),
                });
                let node = &mut nodes[current.0 as usize];
                node.instrs = block.instrs[start..offset].to_vec();
                node.exit = Exit::Suspend {
                    marker: func.clone(),
                    resume,
                };
                pieces[block.id.0 as usize].push(resume);
                current = resume;
                start = offset + 1;
            }
            nodes[current.0 as usize].instrs = block.instrs[start..].to_vec();
        }

        let regions = method
            .regions
            .iter()
            .map(|r| CfgRegion {
                origin: r.id,
                nodes: r
                    .blocks
                    .iter()
                    .flat_map(|b| pieces[b.0 as usize].iter().copied())
                    .collect(),
                handler: NodeId::head(r.handler),
                kind: r.kind.clone(),
            })
            .collect();

        Cfg {
            nodes,
            entry: NodeId::head(method.entry_block),
            regions,
        }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    /// Regions covering `node`, in priority order.
    pub fn regions_covering(&self, node: NodeId) -> impl Iterator<Item = &CfgRegion> {
        self.regions.iter().filter(move |r| r.nodes.contains(&node))
    }

    pub fn handlers_of(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.regions_covering(node).map(|r| r.handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransformOptions;
    use unblock_ir::{Const, LocalId, MethodBuilder, Type};

    fn await_int() -> Instr {
        Instr::Invoke {
            func: FunctionRef::new("Await.await", 1, Type::Int),
        }
    }

    #[test]
    fn block_splits_after_each_marker() {
        let mut b = MethodBuilder::new("m", Type::Int);
        let f = b.add_param("f", Type::Future);
        b.push_all([
            Instr::Load(f),
            await_int(),
            Instr::Pop,
            Instr::Load(f),
            await_int(),
        ]);
        b.terminate(Terminator::Return);
        let m = b.finish();
        let options = TransformOptions::default();
        let cfg = Cfg::build(&m, &MethodCtx::new("T.m", &options));

        assert_eq!(cfg.nodes.len(), 3);
        let head = cfg.node(NodeId(0));
        assert_eq!(head.instrs, vec![Instr::Load(LocalId(0))]);
        assert_eq!(head.exit_location(), Location::new(BlockId(0), 1));
        assert_eq!(head.successors(), vec![NodeId(1)]);

        let middle = cfg.node(NodeId(1));
        assert_eq!(middle.start, 2);
        assert_eq!(middle.instrs, vec![Instr::Pop, Instr::Load(LocalId(0))]);
        assert!(middle.is_suspend());

        let last = cfg.node(NodeId(2));
        assert!(last.instrs.is_empty());
        assert!(matches!(last.exit, Exit::Term(Terminator::Return)));
    }

    #[test]
    fn region_covers_every_piece_of_its_blocks() {
        let mut b = MethodBuilder::new("m", Type::Void);
        let f = b.add_param("f", Type::Future);
        let body = b.create_block();
        let handler = b.create_block();
        b.terminate(Terminator::Goto { target: body });
        b.switch_to_block(body);
        b.push_all([Instr::Load(f), await_int(), Instr::Pop]);
        b.terminate(Terminator::Return);
        b.switch_to_block(handler);
        b.push_all([Instr::Pop, Instr::Push(Const::Null), Instr::Pop]);
        b.terminate(Terminator::Return);
        b.add_region([body], handler, RegionKind::CatchAll);
        let m = b.finish();
        let options = TransformOptions::default();
        let cfg = Cfg::build(&m, &MethodCtx::new("T.m", &options));

        let covered: Vec<NodeId> = cfg.regions[0].nodes.iter().copied().collect();
        assert_eq!(covered, vec![NodeId(1), NodeId(3)]);
        assert_eq!(cfg.handlers_of(NodeId(3)).collect::<Vec<_>>(), vec![NodeId(2)]);
    }
}
