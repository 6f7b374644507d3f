// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Shared helpers for the transform integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use unblock_ir::{ClassUnit, Const, FunctionRef, Instr, Type};
use unblock_rt::{Outcome, Promise, Settle, Unwind, Value, Vm};
use unblock_transform::{transform_batch, BatchOutput, TransformOptions};

pub fn await_value(ty: Type) -> Instr {
    Instr::Invoke {
        func: FunctionRef::new("Await.await", 1, ty),
    }
}

pub fn call(name: &str, argc: u32, ret: Type) -> Instr {
    Instr::Invoke {
        func: FunctionRef::new(name, argc, ret),
    }
}

pub fn log(msg: &str) -> [Instr; 2] {
    [
        Instr::Push(Const::Str(msg.into())),
        Instr::Invoke {
            func: FunctionRef::void("Log.info", 1),
        },
    ]
}

pub fn throw_new(class: &str, msg: &str) -> [Instr; 2] {
    [
        Instr::Push(Const::Str(msg.into())),
        Instr::New {
            class: class.into(),
            argc: 1,
        },
    ]
}

pub fn sequential() -> TransformOptions {
    TransformOptions {
        parallel: false,
        ..TransformOptions::default()
    }
}

pub fn transform(unit: ClassUnit) -> BatchOutput {
    transform_batch(&[unit], &sequential())
}

/// Transform `unit`, requiring every method to succeed.
pub fn transform_clean(unit: ClassUnit) -> ClassUnit {
    let out = transform(unit);
    assert!(
        out.report.is_clean(),
        "unexpected failures: {:?}",
        out.report.failures
    );
    out.units().remove(0)
}

/// Records `Log.info` calls.
#[derive(Clone, Default)]
pub struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn native(&self) -> impl Fn(&Vm, Vec<Value>) -> Result<Value, Unwind> + Send + Sync {
        let sink = self.0.clone();
        move |_, args| {
            let line = args.first().map(|v| v.to_string()).unwrap_or_default();
            sink.lock().push(line);
            Ok(Value::Null)
        }
    }
}

/// A producer handing out pending futures, completed later by the test.
#[derive(Clone, Default)]
pub struct Pending(Arc<Mutex<VecDeque<(i64, Promise)>>>);

impl Pending {
    pub fn native(&self) -> impl Fn(&Vm, Vec<Value>) -> Result<Value, Unwind> + Send + Sync {
        let queue = self.0.clone();
        move |_, args| {
            let tag = args.first().and_then(Value::as_int).unwrap_or(0);
            let promise = Promise::new();
            queue.lock().push_back((tag, promise.clone()));
            Ok(Value::Future(promise))
        }
    }

    /// Oldest outstanding future. The lock is released before returning,
    /// so completing it may hand out new ones.
    pub fn next(&self) -> Option<(i64, Promise)> {
        self.0.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }
}

/// The future an entry method returned.
pub fn returned_future(result: Result<Value, Unwind>) -> Promise {
    match result {
        Ok(Value::Future(p)) => p,
        Ok(other) => panic!("entry returned {} instead of a future", other),
        Err(e) => panic!("entry failed synchronously: {}", e),
    }
}

pub fn fulfilled_int(p: &Promise) -> Option<i64> {
    match p.outcome() {
        Some(Outcome::Fulfilled(v)) => v.as_int(),
        _ => None,
    }
}

pub fn rejection_class(p: &Promise) -> Option<String> {
    match p.outcome() {
        Some(Outcome::Rejected(e)) => e.class_name().map(str::to_string),
        _ => None,
    }
}
