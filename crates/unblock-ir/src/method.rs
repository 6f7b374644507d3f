// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Method representation - control-flow graph of basic blocks plus an
//! exception-region table.

use std::collections::BTreeSet;

use crate::{Const, Instr, Terminator, Type};

/// A method: signature, locals, blocks and exception regions.
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub name: String,
    pub params: Vec<Local>,
    pub ret_ty: Type,
    /// All locals, parameters first.
    pub locals: Vec<Local>,
    pub blocks: Vec<Block>,
    pub entry_block: BlockId,
    /// Priority order: the first region whose set covers the throwing block
    /// and whose kind matches the exception handles it.
    pub regions: Vec<ExceptionRegion>,
    pub annotations: Vec<Annotation>,
    /// Declared checked exceptions.
    pub throws: Vec<String>,
    pub flags: MethodFlags,
}

/// Basic block.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: BlockId,
    pub instrs: Vec<Instr>,
    pub terminator: Terminator,
}

/// Local variable or temporary.
#[derive(Debug, Clone, PartialEq)]
pub struct Local {
    pub id: LocalId,
    pub name: Option<String>,
    pub ty: Type,
    pub is_param: bool,
}

/// A try-set guarded by one handler.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionRegion {
    pub id: RegionId,
    pub blocks: BTreeSet<BlockId>,
    pub handler: BlockId,
    pub kind: RegionKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionKind {
    /// Catches exceptions of this class or any registered subclass.
    Catch(String),
    CatchAll,
    /// Handler is a finally body ending in `EndFinally`.
    Finally,
}

/// Source-level method annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub name: String,
    pub args: Vec<(String, Const)>,
}

impl Annotation {
    pub fn marker(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MethodFlags {
    pub public: bool,
    pub is_static: bool,
    /// Compiler-generated, not part of the callable API surface.
    pub synthetic: bool,
    /// Body of a closure; captured values arrive as leading parameters.
    pub lambda: bool,
}

/// A named group of methods transformed together.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassUnit {
    pub name: String,
    pub methods: Vec<Method>,
}

impl ClassUnit {
    pub fn new(name: impl Into<String>, methods: Vec<Method>) -> Self {
        Self {
            name: name.into(),
            methods,
        }
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// Instruction position inside a method: block plus instruction offset.
/// An offset equal to the block length designates the terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Location {
    pub block: BlockId,
    pub offset: u32,
}

impl Location {
    pub fn new(block: BlockId, offset: usize) -> Self {
        Self {
            block,
            offset: offset as u32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LocalId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegionId(pub u32);

impl Method {
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.0 as usize)
    }

    pub fn local(&self, id: LocalId) -> Option<&Local> {
        self.locals.iter().find(|l| l.id == id)
    }

    /// Static type of a local; unknown ids read as `Object("?")`.
    pub fn local_ty(&self, id: LocalId) -> Type {
        self.local(id)
            .map(|l| l.ty.clone())
            .unwrap_or_else(|| Type::object("?"))
    }

    pub fn local_name(&self, id: LocalId) -> String {
        self.local(id)
            .and_then(|l| l.name.clone())
            .unwrap_or_else(|| format!("_{}", id.0))
    }

    /// Regions covering `block`, in priority order.
    pub fn regions_covering(&self, block: BlockId) -> impl Iterator<Item = &ExceptionRegion> {
        self.regions.iter().filter(move |r| r.blocks.contains(&block))
    }

    /// Whether any instruction calls `pred`-matching functions.
    pub fn calls_any(&self, pred: impl Fn(&str) -> bool) -> bool {
        self.blocks.iter().any(|b| {
            b.instrs
                .iter()
                .any(|i| matches!(i, Instr::Invoke { func } if pred(&func.name)))
        })
    }

    /// Qualified name used in diagnostics: `Class.method`.
    pub fn qualified(&self, class: &str) -> String {
        if class.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", class, self.name)
        }
    }
}
