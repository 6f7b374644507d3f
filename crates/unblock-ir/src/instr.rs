// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Instructions and terminators.

use crate::{BinOp, BlockId, Const, FunctionRef, LocalId, Type, UnaryOp};

/// Straight-line instruction. Operands come from the operand stack.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    Push(Const),
    Load(LocalId),
    Store(LocalId),
    Dup,
    Pop,
    Swap,
    Binary(BinOp),
    Unary(UnaryOp),
    Invoke {
        func: FunctionRef,
    },
    /// Construct an object (typically an exception) from `argc` arguments.
    New {
        class: String,
        argc: u32,
    },
    MonitorEnter,
    MonitorExit,
    /// Build a closure over `captures` stack values. The body is the
    /// method named `method` in the same class unit; captures become its
    /// leading parameters.
    MakeClosure {
        method: String,
        captures: u32,
    },
    /// Pops `argc` arguments, then the closure.
    CallClosure {
        argc: u32,
        ret: Type,
    },

    // ── Continuation protocol ───────────────────────────────────────
    // Emitted by the transform only; never expected in source methods.
    /// Push a fresh pending future.
    FutureNew,
    /// Pop a future, push whether it is already settled.
    FutureIsDone,
    /// Pop a settled future, push its value or throw its failure.
    FutureJoin,
    /// Pop value, pop future, fulfill it.
    FutureFulfill,
    /// Pop exception, pop future, reject it.
    FutureReject,
    /// Pop the outer future, push a frame with `slots` empty local slots.
    FrameNew {
        slots: u32,
    },
    FrameLoad {
        frame: LocalId,
        slot: u32,
    },
    FrameStore {
        frame: LocalId,
        slot: u32,
    },
    /// Push the outer future recorded in `frame`.
    FrameOuter {
        frame: LocalId,
    },
    /// Pop an outcome, push its value or throw its failure.
    OutcomeUnwrap,
    /// Pop a pending future; when it settles, call
    /// `dispatcher(state, outcome, frame)`.
    Resume {
        dispatcher: String,
        state: u32,
        frame: LocalId,
    },
}

impl Instr {
    /// `(pops, pushes)` on the operand stack.
    pub fn stack_effect(&self) -> (usize, usize) {
        match self {
            Instr::Push(_) | Instr::Load(_) => (0, 1),
            Instr::Store(_) | Instr::Pop => (1, 0),
            Instr::Dup => (1, 2),
            Instr::Swap => (2, 2),
            Instr::Binary(_) => (2, 1),
            Instr::Unary(_) => (1, 1),
            Instr::Invoke { func } => (func.argc as usize, func.ret.stack_slots()),
            Instr::New { argc, .. } => (*argc as usize, 1),
            Instr::MonitorEnter | Instr::MonitorExit => (1, 0),
            Instr::MakeClosure { captures, .. } => (*captures as usize, 1),
            Instr::CallClosure { argc, ret } => (*argc as usize + 1, ret.stack_slots()),
            Instr::FutureNew => (0, 1),
            Instr::FutureIsDone | Instr::FutureJoin | Instr::OutcomeUnwrap => (1, 1),
            Instr::FutureFulfill | Instr::FutureReject => (2, 0),
            Instr::FrameNew { .. } => (1, 1),
            Instr::FrameLoad { .. } | Instr::FrameOuter { .. } => (0, 1),
            Instr::FrameStore { .. } => (1, 0),
            Instr::Resume { .. } => (1, 0),
        }
    }

    /// Whether executing this instruction can raise an exception.
    pub fn may_throw(&self) -> bool {
        !matches!(
            self,
            Instr::Push(_)
                | Instr::Load(_)
                | Instr::Store(_)
                | Instr::Dup
                | Instr::Pop
                | Instr::Swap
                | Instr::FutureNew
                | Instr::FutureIsDone
                | Instr::FrameLoad { .. }
                | Instr::FrameStore { .. }
                | Instr::FrameOuter { .. }
        )
    }

    /// Local read by this instruction, if any.
    pub fn used_local(&self) -> Option<LocalId> {
        match self {
            Instr::Load(l) => Some(*l),
            Instr::FrameLoad { frame, .. }
            | Instr::FrameStore { frame, .. }
            | Instr::FrameOuter { frame }
            | Instr::Resume { frame, .. } => Some(*frame),
            _ => None,
        }
    }

    /// Local written by this instruction, if any.
    pub fn defined_local(&self) -> Option<LocalId> {
        match self {
            Instr::Store(l) => Some(*l),
            _ => None,
        }
    }

    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Instr::FutureNew
                | Instr::FutureIsDone
                | Instr::FutureJoin
                | Instr::FutureFulfill
                | Instr::FutureReject
                | Instr::FrameNew { .. }
                | Instr::FrameLoad { .. }
                | Instr::FrameStore { .. }
                | Instr::FrameOuter { .. }
                | Instr::OutcomeUnwrap
                | Instr::Resume { .. }
        )
    }
}

/// Block terminator.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Goto {
        target: BlockId,
    },
    /// Pops a bool.
    Branch {
        then_block: BlockId,
        else_block: BlockId,
    },
    /// Pops an int.
    Switch {
        cases: Vec<(i64, BlockId)>,
        default: BlockId,
    },
    /// Pops the return value unless the method returns `Void`.
    Return,
    /// Pops an exception.
    Throw,
    /// End of a finally body: continue along whichever exit edge entered it.
    EndFinally,
    Unreachable,
}

impl Terminator {
    /// Normal-flow successors in terminator order.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Goto { target } => vec![*target],
            Terminator::Branch {
                then_block,
                else_block,
            } => vec![*then_block, *else_block],
            Terminator::Switch { cases, default } => {
                let mut out: Vec<BlockId> = cases.iter().map(|(_, b)| *b).collect();
                out.push(*default);
                out
            }
            Terminator::Return
            | Terminator::Throw
            | Terminator::EndFinally
            | Terminator::Unreachable => Vec::new(),
        }
    }

    /// Rewrite every successor through `f`.
    pub fn map_targets(&self, mut f: impl FnMut(BlockId) -> BlockId) -> Terminator {
        match self {
            Terminator::Goto { target } => Terminator::Goto { target: f(*target) },
            Terminator::Branch {
                then_block,
                else_block,
            } => Terminator::Branch {
                then_block: f(*then_block),
                else_block: f(*else_block),
            },
            Terminator::Switch { cases, default } => Terminator::Switch {
                cases: cases.iter().map(|(v, b)| (*v, f(*b))).collect(),
                default: f(*default),
            },
            other => other.clone(),
        }
    }

    /// Operand-stack values consumed, given the method's return type.
    pub fn pops(&self, ret_ty: &Type) -> usize {
        match self {
            Terminator::Branch { .. } | Terminator::Switch { .. } | Terminator::Throw => 1,
            Terminator::Return => ret_ty.stack_slots(),
            _ => 0,
        }
    }
}
