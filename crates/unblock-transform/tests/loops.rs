// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Suspensions inside loops: bounded state count and flat resumption.

mod common;

use common::*;
use unblock_ir::{
    BinOp, ClassUnit, Const, FunctionRef, Instr, Method, MethodBuilder, RegionKind, Terminator,
    Type,
};
use unblock_rt::{Promise, Settle, Unwind, Value, Vm};
use unblock_transform::SegmentExit;

/// i = 0
/// while i < limit {
///     try { await fork(i); i = i + 1 } catch * { return i }
/// }
/// return i
fn drain(fork: &str, guarded: bool) -> Method {
    let mut b = MethodBuilder::new("drain", Type::Int);
    let limit = b.add_param("limit", Type::Int);
    let i = b.alloc_local("i", Type::Int);
    let head = b.create_block();
    let body = b.create_block();
    let handler = b.create_block();
    let exit = b.create_block();

    b.push_all([Instr::Push(Const::Int(0)), Instr::Store(i)]);
    b.terminate(Terminator::Goto { target: head });

    b.switch_to_block(head);
    b.push_all([Instr::Load(i), Instr::Load(limit), Instr::Binary(BinOp::Lt)]);
    b.terminate(Terminator::Branch {
        then_block: body,
        else_block: exit,
    });

    b.switch_to_block(body);
    b.push_all([
        Instr::Load(i),
        Instr::Invoke {
            func: FunctionRef::new(fork, 1, Type::Future),
        },
        await_value(Type::Int),
        Instr::Pop,
        Instr::Load(i),
        Instr::Push(Const::Int(1)),
        Instr::Binary(BinOp::Add),
        Instr::Store(i),
    ]);
    b.terminate(Terminator::Goto { target: head });

    b.switch_to_block(handler);
    b.push_all([Instr::Pop, Instr::Load(i)]);
    b.terminate(Terminator::Return);

    b.switch_to_block(exit);
    b.push(Instr::Load(i));
    b.terminate(Terminator::Return);

    if guarded {
        b.add_region([body], handler, RegionKind::CatchAll);
    }
    b.finish()
}

/// Completed futures, failing once the tag reaches `fail_at`.
fn ready(fail_at: i64) -> impl Fn(&Vm, Vec<Value>) -> Result<Value, Unwind> + Send + Sync {
    move |_, args| {
        let tag = args.first().and_then(Value::as_int).unwrap_or(0);
        let promise = if tag >= fail_at {
            Promise::rejected(Value::exception("LimitException", "done"))
        } else {
            Promise::fulfilled(Value::Int(tag))
        };
        Ok(Value::Future(promise))
    }
}

#[test]
fn loop_with_one_suspension_has_one_resumption_state() {
    let out = transform(ClassUnit::new("Jobs", vec![drain("Fork.start", true)]));
    assert!(out.report.is_clean());
    let pair = out.classes[0].methods[0].as_pair().expect("transformed");

    assert_eq!(pair.suspension_points.len(), 1);
    assert_eq!(pair.segments.len(), 2);
    // The resumption jumps back to the loop head owned by the entry segment.
    assert!(pair.segments[1].exits.contains(&SegmentExit::Continues(0)));
    // Only `i` and `limit` survive the await; the future itself does not.
    assert_eq!(pair.suspension_points[0].live.len(), 2);
}

#[test]
fn deferred_iterations_resume_without_nesting() {
    let unit = transform_clean(ClassUnit::new("Jobs", vec![drain("Fork.start", true)]));
    let pending = Pending::default();
    // Every resumption starts from a settle callback at depth zero.
    let vm = Vm::builder()
        .class(&unit)
        .native("Fork.start", pending.native())
        .max_depth(8)
        .build();

    let outer = returned_future(vm.invoke("drain", vec![Value::Int(1_000)]));
    let mut rounds = 0;
    while let Some((tag, promise)) = pending.next() {
        rounds += 1;
        if tag > 60 {
            promise.reject(Value::exception("LimitException", "enough"));
        } else {
            promise.fulfill(Value::Int(tag));
        }
    }

    assert_eq!(rounds, 62);
    assert_eq!(pending.len(), 0);
    assert_eq!(fulfilled_int(&outer), Some(61));
}

#[test]
fn eager_iterations_stay_in_one_activation() {
    let unit = transform_clean(ClassUnit::new("Jobs", vec![drain("Fork.ready", true)]));
    let vm = Vm::builder()
        .class(&unit)
        .native("Fork.ready", ready(5_000))
        .max_depth(8)
        .build();

    let outer = returned_future(vm.invoke("drain", vec![Value::Int(100_000)]));
    assert!(outer.is_settled());
    assert_eq!(fulfilled_int(&outer), Some(5_000));
}

#[test]
fn eager_failure_without_handler_throws_synchronously() {
    let unit = transform_clean(ClassUnit::new("Jobs", vec![drain("Fork.ready", false)]));
    let vm = Vm::builder()
        .class(&unit)
        .native("Fork.ready", ready(3))
        .build();

    match vm.invoke("drain", vec![Value::Int(10)]) {
        Err(Unwind::Throw(exc)) => assert_eq!(exc.class_name(), Some("LimitException")),
        other => panic!("expected a synchronous throw, got {:?}", other.map(|v| v.to_string())),
    }
}

#[test]
fn loop_that_never_runs_fulfills_immediately() {
    let unit = transform_clean(ClassUnit::new("Jobs", vec![drain("Fork.start", true)]));
    let pending = Pending::default();
    let vm = Vm::builder()
        .class(&unit)
        .native("Fork.start", pending.native())
        .build();

    let outer = returned_future(vm.invoke("drain", vec![Value::Int(0)]));
    assert_eq!(fulfilled_int(&outer), Some(0));
    assert_eq!(pending.len(), 0);
}
