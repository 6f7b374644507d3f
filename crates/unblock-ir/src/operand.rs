// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Constants, operators and call targets.

use crate::Type;

/// Constant pushed by `Instr::Push`.
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Call target. `argc` values are popped; a non-void `ret` pushes one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionRef {
    pub name: String,
    pub argc: u32,
    pub ret: Type,
}

impl FunctionRef {
    pub fn new(name: impl Into<String>, argc: u32, ret: Type) -> Self {
        Self {
            name: name.into(),
            argc,
            ret,
        }
    }

    /// Call returning nothing.
    pub fn void(name: impl Into<String>, argc: u32) -> Self {
        Self::new(name, argc, Type::Void)
    }
}
