// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! MethodBuilder - helper for CFG construction.

use std::collections::BTreeSet;

use crate::{
    Annotation, Block, BlockId, ExceptionRegion, Instr, Local, LocalId, Method, MethodFlags,
    RegionId, RegionKind, Terminator, Type,
};

pub struct MethodBuilder {
    method: Method,
    current_block: BlockId,
    next_local_id: u32,
    next_block_id: u32,
}

impl MethodBuilder {
    pub fn new(name: impl Into<String>, ret_ty: Type) -> Self {
        let entry_block = BlockId(0);
        let method = Method {
            name: name.into(),
            params: Vec::new(),
            ret_ty,
            locals: Vec::new(),
            blocks: vec![Block {
                id: entry_block,
                instrs: Vec::new(),
                terminator: Terminator::Unreachable,
            }],
            entry_block,
            regions: Vec::new(),
            annotations: Vec::new(),
            throws: Vec::new(),
            flags: MethodFlags::default(),
        };

        Self {
            method,
            current_block: entry_block,
            next_local_id: 0,
            next_block_id: 1,
        }
    }

    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block_id);
        self.next_block_id += 1;
        self.method.blocks.push(Block {
            id,
            instrs: Vec::new(),
            terminator: Terminator::Unreachable,
        });
        id
    }

    pub fn switch_to_block(&mut self, block: BlockId) {
        self.current_block = block;
    }

    pub fn current_block(&self) -> BlockId {
        self.current_block
    }

    pub fn alloc_temp(&mut self, ty: Type) -> LocalId {
        self.push_local(None, ty, false)
    }

    pub fn alloc_local(&mut self, name: impl Into<String>, ty: Type) -> LocalId {
        self.push_local(Some(name.into()), ty, false)
    }

    pub fn add_param(&mut self, name: impl Into<String>, ty: Type) -> LocalId {
        let id = self.push_local(Some(name.into()), ty, true);
        let local = self.method.locals[self.method.locals.len() - 1].clone();
        self.method.params.push(local);
        id
    }

    fn push_local(&mut self, name: Option<String>, ty: Type, is_param: bool) -> LocalId {
        let id = LocalId(self.next_local_id);
        self.next_local_id += 1;
        self.method.locals.push(Local {
            id,
            name,
            ty,
            is_param,
        });
        id
    }

    pub fn push(&mut self, instr: Instr) {
        let block = &mut self.method.blocks[self.current_block.0 as usize];
        block.instrs.push(instr);
    }

    pub fn push_all(&mut self, instrs: impl IntoIterator<Item = Instr>) {
        for instr in instrs {
            self.push(instr);
        }
    }

    pub fn terminate(&mut self, term: Terminator) {
        let block = &mut self.method.blocks[self.current_block.0 as usize];
        block.terminator = term;
    }

    /// Check if the current block still has the default Unreachable terminator.
    pub fn current_block_unterminated(&self) -> bool {
        matches!(
            self.method.blocks[self.current_block.0 as usize].terminator,
            Terminator::Unreachable
        )
    }

    /// Append a region at the lowest priority so far.
    pub fn add_region(
        &mut self,
        blocks: impl IntoIterator<Item = BlockId>,
        handler: BlockId,
        kind: RegionKind,
    ) -> RegionId {
        let id = RegionId(self.method.regions.len() as u32);
        self.method.regions.push(ExceptionRegion {
            id,
            blocks: blocks.into_iter().collect::<BTreeSet<_>>(),
            handler,
            kind,
        });
        id
    }

    pub fn annotate(&mut self, annotation: Annotation) {
        self.method.annotations.push(annotation);
    }

    pub fn declare_throws(&mut self, class: impl Into<String>) {
        self.method.throws.push(class.into());
    }

    pub fn set_flags(&mut self, flags: MethodFlags) {
        self.method.flags = flags;
    }

    pub fn finish(self) -> Method {
        self.method
    }
}
