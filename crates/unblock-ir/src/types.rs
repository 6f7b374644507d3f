// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Static types of locals and stack values.

/// Static type. Object types carry their class name; everything the
/// continuation protocol introduces has a dedicated variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Bool,
    Int,
    Float,
    Str,
    Object(String),
    /// A future-like value: pending, fulfilled or rejected.
    Future,
    /// Saved continuation state (state index, outer future, live locals).
    Frame,
    /// Value-or-failure delivered to a resumed dispatcher.
    Outcome,
}

impl Type {
    pub fn object(class: impl Into<String>) -> Self {
        Type::Object(class.into())
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    /// Number of operand-stack slots a call returning this type pushes.
    pub fn stack_slots(&self) -> usize {
        if self.is_void() {
            0
        } else {
            1
        }
    }
}
