// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Entry method synthesis.
//!
//! The entry keeps the source method's name, parameters, annotations,
//! declared throws and flags, and returns a future. Its body seeds a frame
//! with the arguments and runs the dispatcher at state 0, which either
//! finishes synchronously or returns the pending outer future.

use unblock_ir::{Const, Instr, Method, MethodBuilder, Terminator, Type};

use crate::dispatch::dispatcher_ref;

pub fn synthesize(input: &Method, dispatcher: &str) -> Method {
    let mut b = MethodBuilder::new(input.name.clone(), Type::Future);
    let params: Vec<_> = input
        .params
        .iter()
        .map(|p| {
            let name = p.name.clone().unwrap_or_else(|| format!("_{}", p.id.0));
            b.add_param(name, p.ty.clone())
        })
        .collect();
    let frame = b.alloc_local("__frame", Type::Frame);

    b.push_all([
        Instr::FutureNew,
        Instr::FrameNew {
            slots: params.len() as u32,
        },
        Instr::Store(frame),
    ]);
    for (slot, param) in params.iter().enumerate() {
        b.push_all([
            Instr::Load(*param),
            Instr::FrameStore {
                frame,
                slot: slot as u32,
            },
        ]);
    }
    b.push_all([
        Instr::Push(Const::Int(0)),
        Instr::Push(Const::Null),
        Instr::Load(frame),
        Instr::Invoke {
            func: dispatcher_ref(dispatcher),
        },
    ]);
    b.terminate(Terminator::Return);

    for annotation in &input.annotations {
        b.annotate(annotation.clone());
    }
    for class in &input.throws {
        b.declare_throws(class.clone());
    }
    b.set_flags(input.flags);
    b.finish()
}
