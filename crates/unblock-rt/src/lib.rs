// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Runtime support for transformed methods.
//!
//! - [`future`]: the future contract ([`Settle`]) and [`Promise`]
//! - [`ambient`]: thread-local context captured across suspensions
//! - [`vm`]: an interpreter that executes source and generated methods

pub mod ambient;
pub mod future;
pub mod value;
pub mod vm;

pub use future::{Outcome, Promise, Settle, SettleCallback};
pub use value::{Closure, Frame, Object, Value};
pub use vm::{NativeFn, Unwind, Vm, VmBuilder, VmError};
