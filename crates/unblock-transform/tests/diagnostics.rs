// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Every failure category, with the location it points at.

mod common;

use common::*;
use unblock_diagnostics::formatter::DiagnosticFormatter;
use unblock_diagnostics::ToDiagnostic;
use unblock_ir::{
    BinOp, BlockId, ClassUnit, Const, FunctionRef, Instr, Location, Method, MethodBuilder,
    RegionKind, Terminator, Type,
};
use unblock_transform::{transform_method, FailureKind, TransformError, TransformOptions};

fn fail(method: &Method) -> TransformError {
    match transform_method(method, "Svc", &TransformOptions::default()) {
        Err(e) => e,
        Ok(_) => panic!("`{}` should not transform", method.name),
    }
}

/// return 1 + await f
fn operand_beneath_await() -> Method {
    let mut b = MethodBuilder::new("sum", Type::Int);
    let f = b.add_param("f", Type::Future);
    b.push_all([
        Instr::Push(Const::Int(1)),
        Instr::Load(f),
        await_value(Type::Int),
        Instr::Binary(BinOp::Add),
    ]);
    b.terminate(Terminator::Return);
    b.finish()
}

#[test]
fn operand_left_on_the_stack() {
    let err = fail(&operand_beneath_await());
    assert_eq!(err.kind(), FailureKind::UnsupportedSuspensionPosition);
    assert_eq!(err.location(), Location::new(BlockId(0), 2));
    assert_eq!(err.method(), "Svc.sum");
    assert!(err.detail().contains("1 value"));
}

#[test]
fn monitor_held_across_await() {
    let mut b = MethodBuilder::new("refresh", Type::Void);
    let lock = b.add_param("lock", Type::object("Object"));
    let f = b.add_param("f", Type::Future);
    let body = b.create_block();
    b.push_all([Instr::Load(lock), Instr::MonitorEnter]);
    b.terminate(Terminator::Goto { target: body });
    b.switch_to_block(body);
    b.push_all([
        Instr::Load(f),
        await_value(Type::Int),
        Instr::Pop,
        Instr::Load(lock),
        Instr::MonitorExit,
    ]);
    b.terminate(Terminator::Return);

    let err = fail(&b.finish());
    assert_eq!(err.kind(), FailureKind::UnbalancedSynchronizedRegion);
    assert_eq!(err.location(), Location::new(body, 1));
}

#[test]
fn monitor_released_on_one_path_only() {
    let mut b = MethodBuilder::new("leaky", Type::Void);
    let lock = b.add_param("lock", Type::object("Object"));
    let flag = b.add_param("flag", Type::Bool);
    let f = b.add_param("f", Type::Future);
    let release = b.create_block();
    let join = b.create_block();
    b.push_all([Instr::Load(lock), Instr::MonitorEnter, Instr::Load(flag)]);
    b.terminate(Terminator::Branch {
        then_block: release,
        else_block: join,
    });
    b.switch_to_block(release);
    b.push_all([Instr::Load(lock), Instr::MonitorExit]);
    b.terminate(Terminator::Goto { target: join });
    b.switch_to_block(join);
    b.push_all([Instr::Load(f), await_value(Type::Int), Instr::Pop]);
    b.terminate(Terminator::Return);

    assert_eq!(
        fail(&b.finish()).kind(),
        FailureKind::UnbalancedSynchronizedRegion
    );
}

#[test]
fn await_in_dead_code() {
    let mut b = MethodBuilder::new("dead", Type::Int);
    let f = b.add_param("f", Type::Future);
    let orphan = b.create_block();
    b.push(Instr::Push(Const::Int(0)));
    b.terminate(Terminator::Return);
    b.switch_to_block(orphan);
    b.push_all([Instr::Load(f), await_value(Type::Int)]);
    b.terminate(Terminator::Return);

    let err = fail(&b.finish());
    assert_eq!(err.kind(), FailureKind::UnreachableSuspensionState);
    assert_eq!(err.location(), Location::new(orphan, 1));
}

#[test]
fn await_in_handler_of_a_region_that_cannot_throw() {
    // try { x = 1 } catch * { return await f }
    let mut b = MethodBuilder::new("quiet", Type::Int);
    let f = b.add_param("f", Type::Future);
    let x = b.alloc_local("x", Type::Int);
    let body = b.create_block();
    let done = b.create_block();
    let handler = b.create_block();
    b.terminate(Terminator::Goto { target: body });
    b.switch_to_block(body);
    b.push_all([Instr::Push(Const::Int(1)), Instr::Store(x)]);
    b.terminate(Terminator::Goto { target: done });
    b.switch_to_block(done);
    b.push(Instr::Load(x));
    b.terminate(Terminator::Return);
    b.switch_to_block(handler);
    b.push_all([Instr::Pop, Instr::Load(f), await_value(Type::Int)]);
    b.terminate(Terminator::Return);
    b.add_region([body], handler, RegionKind::CatchAll);

    let err = fail(&b.finish());
    assert_eq!(err.kind(), FailureKind::UnreachableSuspensionState);
    assert_eq!(err.location(), Location::new(handler, 2));
}

#[test]
fn partially_overlapping_regions() {
    let mut b = MethodBuilder::new("tangled", Type::Int);
    let f = b.add_param("f", Type::Future);
    let b1 = b.create_block();
    let b2 = b.create_block();
    let b3 = b.create_block();
    let h0 = b.create_block();
    let h1 = b.create_block();
    b.terminate(Terminator::Goto { target: b1 });
    b.switch_to_block(b1);
    b.terminate(Terminator::Goto { target: b2 });
    b.switch_to_block(b2);
    b.push_all([Instr::Load(f), await_value(Type::Int), Instr::Pop]);
    b.terminate(Terminator::Goto { target: b3 });
    b.switch_to_block(b3);
    b.push(Instr::Push(Const::Int(0)));
    b.terminate(Terminator::Return);
    for h in [h0, h1] {
        b.switch_to_block(h);
        b.push_all([Instr::Pop, Instr::Push(Const::Int(-1))]);
        b.terminate(Terminator::Return);
    }
    b.add_region([b1, b2], h0, RegionKind::CatchAll);
    b.add_region([b2, b3], h1, RegionKind::CatchAll);

    let err = fail(&b.finish());
    assert_eq!(err.kind(), FailureKind::AmbiguousExceptionRegion);
    assert_eq!(err.location(), Location::new(b2, 0));
}

#[test]
fn marker_with_wrong_arity() {
    let mut b = MethodBuilder::new("odd", Type::Int);
    let f = b.add_param("f", Type::Future);
    b.push_all([
        Instr::Load(f),
        Instr::Load(f),
        Instr::Invoke {
            func: FunctionRef::new("Await.await", 2, Type::Int),
        },
    ]);
    b.terminate(Terminator::Return);

    let err = fail(&b.finish());
    assert_eq!(err.kind(), FailureKind::UnsupportedSuspensionPosition);
    assert_eq!(err.location(), Location::new(BlockId(0), 2));
    assert!(err.detail().contains("exactly one future"));
}

#[test]
fn batch_report_lists_every_category() {
    let out = transform(ClassUnit::new("Svc", vec![operand_beneath_await()]));
    let codes: Vec<&str> = out.report.failures.iter().map(|f| f.kind.code()).collect();
    assert_eq!(codes, vec!["T0001"]);
    assert!(out.units()[0].methods.is_empty());
}

#[test]
fn formatted_diagnostic_quotes_the_marker_call() {
    let method = operand_beneath_await();
    let err = fail(&method);

    colored::control::set_override(false);
    let text = DiagnosticFormatter::new()
        .with_method(&method)
        .format(&err.to_diagnostic());

    assert!(text.starts_with("error[T0001]: "));
    assert!(text.contains("--> Svc.sum bb0:2"));
    assert!(text.contains("invoke Await.await/1 -> int"));
    assert!(text.contains("1 value beneath the awaited future"));
    assert!(text.contains("= help: "));
}
