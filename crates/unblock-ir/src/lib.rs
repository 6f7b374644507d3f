// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Method model - stack-machine code organized as a control-flow graph.
//!
//! A method is a list of basic blocks. Each block holds straight-line
//! instructions operating on an operand stack and ends in a terminator.
//! Exception handling is a side table of regions (try-set → handler).

mod builder;
mod display;
mod instr;
mod method;
mod operand;
mod types;

pub use builder::MethodBuilder;
pub use instr::{Instr, Terminator};
pub use method::{
    Annotation, Block, BlockId, ClassUnit, ExceptionRegion, Local, LocalId, Location, Method,
    MethodFlags, RegionId, RegionKind,
};
pub use operand::{BinOp, Const, FunctionRef, UnaryOp};
pub use types::Type;
