// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Interpreter for the method model.
//!
//! Runs source methods and generated entry/dispatcher pairs alike. In
//! untransformed code a suspend marker joins its future and faults with
//! [`VmError::WouldBlock`] when the future is still pending, which is
//! exactly the blocking the transform removes.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use unblock_ir::{
    BinOp, BlockId, ClassUnit, Instr, LocalId, Location, Method, RegionKind, Terminator, UnaryOp,
};

use crate::ambient;
use crate::future::{Outcome, Promise, Settle};
use crate::value::{Closure, Frame, Value};

const DEFAULT_MAX_DEPTH: usize = 256;

static NULL: Value = Value::Null;

/// A native function. Void natives return `Value::Null`.
pub type NativeFn = Arc<dyn Fn(&Vm, Vec<Value>) -> Result<Value, Unwind> + Send + Sync>;

/// A runtime fault: a bug in the executed code or the host, never a
/// user-level exception.
#[derive(Debug, Clone, thiserror::Error)]
pub enum VmError {
    #[error("undefined function `{0}`")]
    UnknownFunction(String),

    #[error("operand stack underflow in `{method}` at {at}")]
    StackUnderflow { method: String, at: Location },

    #[error("type error in `{method}` at {at}: {detail}")]
    Type {
        method: String,
        at: Location,
        detail: String,
    },

    #[error("`{marker}` would block: the awaited future is still pending")]
    WouldBlock { marker: String },

    #[error("reached unreachable code in `{method}` at {at}")]
    Unreachable { method: String, at: Location },

    #[error("`{method}` uses end_finally; normalize finally regions before running it")]
    RawFinally { method: String },

    #[error("expected {expected} argument{}, got {got} calling `{name}`", if *.expected == 1 { "" } else { "s" })]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("no block bb{block} in `{method}`")]
    UnknownBlock { method: String, block: u32 },

    #[error("monitor exit without a held monitor in `{method}` at {at}")]
    MonitorUnderflow { method: String, at: Location },

    #[error("call depth limit of {0} exceeded")]
    DepthLimit(usize),
}

/// Abrupt completion of a call.
#[derive(Debug, Clone)]
pub enum Unwind {
    /// A user-level exception.
    Throw(Value),
    Fault(VmError),
}

impl From<VmError> for Unwind {
    fn from(e: VmError) -> Self {
        Unwind::Fault(e)
    }
}

impl fmt::Display for Unwind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unwind::Throw(exc) => write!(f, "uncaught {}", exc),
            Unwind::Fault(e) => write!(f, "{}", e),
        }
    }
}

impl Unwind {
    /// The thrown exception, if this is one.
    pub fn exception(&self) -> Option<&Value> {
        match self {
            Unwind::Throw(v) => Some(v),
            Unwind::Fault(_) => None,
        }
    }
}

struct VmInner {
    methods: IndexMap<String, Arc<Method>>,
    natives: IndexMap<String, NativeFn>,
    parents: IndexMap<String, String>,
    markers: Vec<String>,
    max_depth: usize,
}

/// Shared handle to a loaded program. Clones are cheap.
#[derive(Clone)]
pub struct Vm {
    inner: Arc<VmInner>,
}

pub struct VmBuilder {
    inner: VmInner,
}

impl VmBuilder {
    fn new() -> Self {
        let mut builder = Self {
            inner: VmInner {
                methods: IndexMap::new(),
                natives: IndexMap::new(),
                parents: IndexMap::new(),
                markers: vec!["Await.await".to_string(), "suspend".to_string()],
                max_depth: DEFAULT_MAX_DEPTH,
            },
        };
        builder.install_builtins();
        builder
    }

    /// Load every method of `unit`, by bare and by qualified name.
    pub fn class(mut self, unit: &ClassUnit) -> Self {
        for method in &unit.methods {
            let method = Arc::new(method.clone());
            self.inner
                .methods
                .insert(method.qualified(&unit.name), method.clone());
            self.inner.methods.insert(method.name.clone(), method);
        }
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.inner
            .methods
            .insert(method.name.clone(), Arc::new(method));
        self
    }

    pub fn native<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Vm, Vec<Value>) -> Result<Value, Unwind> + Send + Sync + 'static,
    {
        self.inner.natives.insert(name.into(), Arc::new(f));
        self
    }

    /// Declare `child` a subclass of `parent` for catch matching.
    pub fn subclass(mut self, child: impl Into<String>, parent: impl Into<String>) -> Self {
        self.inner.parents.insert(child.into(), parent.into());
        self
    }

    pub fn suspend_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.markers = markers.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.inner.max_depth = depth;
        self
    }

    pub fn build(self) -> Vm {
        Vm {
            inner: Arc::new(self.inner),
        }
    }

    fn install_builtins(&mut self) {
        let builtins: [(&str, NativeFn); 4] = [
            (
                "Future.completed",
                Arc::new(|_: &Vm, args: Vec<Value>| {
                    let value = args.into_iter().next().unwrap_or(Value::Null);
                    Ok(Value::Future(Promise::fulfilled(value)))
                }),
            ),
            (
                "Future.failed",
                Arc::new(|_: &Vm, args: Vec<Value>| {
                    let exc = args.into_iter().next().unwrap_or(Value::Null);
                    Ok(Value::Future(Promise::rejected(exc)))
                }),
            ),
            (
                "Context.get",
                Arc::new(|_: &Vm, args: Vec<Value>| {
                    let key = args.first().map(|k| k.to_string()).unwrap_or_default();
                    Ok(ambient::get(&key).unwrap_or(Value::Null))
                }),
            ),
            (
                "Context.set",
                Arc::new(|_: &Vm, args: Vec<Value>| {
                    let mut args = args.into_iter();
                    let key = args.next().map(|k| k.to_string()).unwrap_or_default();
                    ambient::set(key, args.next().unwrap_or(Value::Null));
                    Ok(Value::Null)
                }),
            ),
        ];
        for (name, f) in builtins {
            self.inner.natives.insert(name.to_string(), f);
        }
    }
}

/// Per-call interpreter state.
struct Activation<'m> {
    method: &'m Method,
    locals: Vec<Value>,
    stack: Vec<Value>,
    monitors: usize,
    block: BlockId,
    offset: usize,
}

enum Flow {
    Jump(BlockId),
    Return(Value),
}

impl Vm {
    pub fn builder() -> VmBuilder {
        VmBuilder::new()
    }

    /// Call a method or native by name.
    pub fn invoke(&self, name: &str, args: Vec<Value>) -> Result<Value, Unwind> {
        self.call(name, args, 0)
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.inner.methods.contains_key(name)
    }

    /// Whether `class` is `ancestor` or inherits from it. Every class is a
    /// `Throwable`.
    pub fn is_subclass(&self, class: &str, ancestor: &str) -> bool {
        if ancestor == "Throwable" {
            return true;
        }
        let mut current = Some(class);
        let mut hops = 0;
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            hops += 1;
            if hops > self.inner.parents.len() {
                break;
            }
            current = self.inner.parents.get(c).map(String::as_str);
        }
        false
    }

    fn call(&self, name: &str, args: Vec<Value>, depth: usize) -> Result<Value, Unwind> {
        if self.inner.markers.iter().any(|m| m == name) {
            return self.join_marker(name, args);
        }
        if let Some(native) = self.inner.natives.get(name) {
            return native(self, args);
        }
        let Some(method) = self.inner.methods.get(name).cloned() else {
            return Err(VmError::UnknownFunction(name.to_string()).into());
        };
        if args.len() != method.params.len() {
            return Err(VmError::Arity {
                name: name.to_string(),
                expected: method.params.len(),
                got: args.len(),
            }
            .into());
        }
        if depth >= self.inner.max_depth {
            return Err(VmError::DepthLimit(self.inner.max_depth).into());
        }
        self.run(&method, args, depth + 1)
    }

    /// Blocking semantics of a marker in code that was not transformed.
    fn join_marker(&self, marker: &str, args: Vec<Value>) -> Result<Value, Unwind> {
        match args.first() {
            Some(Value::Future(p)) => match p.outcome() {
                Some(Outcome::Fulfilled(v)) => Ok(v),
                Some(Outcome::Rejected(e)) => Err(Unwind::Throw(e)),
                None => Err(VmError::WouldBlock {
                    marker: marker.to_string(),
                }
                .into()),
            },
            _ => Err(VmError::Arity {
                name: marker.to_string(),
                expected: 1,
                got: args.len(),
            }
            .into()),
        }
    }

    fn run(&self, method: &Method, args: Vec<Value>, depth: usize) -> Result<Value, Unwind> {
        let slots = method
            .locals
            .iter()
            .map(|l| l.id.0 as usize + 1)
            .max()
            .unwrap_or(0);
        let mut act = Activation {
            method,
            locals: vec![Value::Null; slots],
            stack: Vec::new(),
            monitors: 0,
            block: method.entry_block,
            offset: 0,
        };
        for (param, arg) in method.params.iter().zip(args) {
            act.locals[param.id.0 as usize] = arg;
        }

        loop {
            match self.run_block(&mut act, depth) {
                Ok(Flow::Jump(next)) => act.block = next,
                Ok(Flow::Return(value)) => return Ok(value),
                Err(Unwind::Throw(exc)) => match self.find_handler(method, act.block, &exc) {
                    Some(handler) => {
                        act.stack.clear();
                        act.stack.push(exc);
                        act.block = handler;
                    }
                    None => return Err(Unwind::Throw(exc)),
                },
                Err(fault) => return Err(fault),
            }
        }
    }

    fn find_handler(&self, method: &Method, block: BlockId, exc: &Value) -> Option<BlockId> {
        method
            .regions_covering(block)
            .find(|r| match &r.kind {
                RegionKind::Catch(class) => exc
                    .class_name()
                    .is_some_and(|c| self.is_subclass(c, class)),
                RegionKind::CatchAll | RegionKind::Finally => true,
            })
            .map(|r| r.handler)
    }

    fn run_block(&self, act: &mut Activation<'_>, depth: usize) -> Result<Flow, Unwind> {
        let method = act.method;
        let Some(block) = method.block(act.block) else {
            return Err(VmError::UnknownBlock {
                method: method.name.clone(),
                block: act.block.0,
            }
            .into());
        };
        for (offset, instr) in block.instrs.iter().enumerate() {
            act.offset = offset;
            self.exec(act, instr, depth)?;
        }
        act.offset = block.instrs.len();

        match &block.terminator {
            Terminator::Goto { target } => Ok(Flow::Jump(*target)),
            Terminator::Branch {
                then_block,
                else_block,
            } => match act.pop()? {
                Value::Bool(true) => Ok(Flow::Jump(*then_block)),
                Value::Bool(false) => Ok(Flow::Jump(*else_block)),
                other => Err(act.type_error(format!("branch on {}", other.type_name()))),
            },
            Terminator::Switch { cases, default } => {
                let scrutinee = act.pop()?;
                let Some(v) = scrutinee.as_int() else {
                    return Err(act.type_error(format!("switch on {}", scrutinee.type_name())));
                };
                let target = cases
                    .iter()
                    .find(|(case, _)| *case == v)
                    .map(|(_, b)| *b)
                    .unwrap_or(*default);
                Ok(Flow::Jump(target))
            }
            Terminator::Return => {
                if method.ret_ty.is_void() {
                    Ok(Flow::Return(Value::Null))
                } else {
                    Ok(Flow::Return(act.pop()?))
                }
            }
            Terminator::Throw => Err(Unwind::Throw(act.pop()?)),
            Terminator::EndFinally => Err(VmError::RawFinally {
                method: method.name.clone(),
            }
            .into()),
            Terminator::Unreachable => Err(VmError::Unreachable {
                method: method.name.clone(),
                at: act.location(),
            }
            .into()),
        }
    }

    fn exec(&self, act: &mut Activation<'_>, instr: &Instr, depth: usize) -> Result<(), Unwind> {
        match instr {
            Instr::Push(c) => act.stack.push(Value::from_const(c)),
            Instr::Load(l) => {
                let v = act.local(*l).clone();
                act.stack.push(v);
            }
            Instr::Store(l) => {
                let v = act.pop()?;
                act.set_local(*l, v);
            }
            Instr::Dup => {
                let v = act.pop()?;
                act.stack.push(v.clone());
                act.stack.push(v);
            }
            Instr::Pop => {
                act.pop()?;
            }
            Instr::Swap => {
                let b = act.pop()?;
                let a = act.pop()?;
                act.stack.push(b);
                act.stack.push(a);
            }
            Instr::Binary(op) => {
                let b = act.pop()?;
                let a = act.pop()?;
                let v = binary(act, *op, a, b)?;
                act.stack.push(v);
            }
            Instr::Unary(op) => {
                let v = act.pop()?;
                let out = match (op, v) {
                    (UnaryOp::Neg, Value::Int(i)) => Value::Int(i.wrapping_neg()),
                    (UnaryOp::Neg, Value::Float(x)) => Value::Float(-x),
                    (UnaryOp::Not, Value::Bool(b)) => Value::Bool(!b),
                    (op, v) => return Err(act.type_error(format!("{} on {}", op, v.type_name()))),
                };
                act.stack.push(out);
            }
            Instr::Invoke { func } => {
                let args = act.pop_n(func.argc as usize)?;
                let result = self.call(&func.name, args, depth)?;
                if !func.ret.is_void() {
                    act.stack.push(result);
                }
            }
            Instr::New { class, argc } => {
                let fields = act.pop_n(*argc as usize)?;
                act.stack.push(Value::object(class.clone(), fields));
            }
            Instr::MonitorEnter => {
                act.pop()?;
                act.monitors += 1;
            }
            Instr::MonitorExit => {
                act.pop()?;
                if act.monitors == 0 {
                    return Err(VmError::MonitorUnderflow {
                        method: act.method.name.clone(),
                        at: act.location(),
                    }
                    .into());
                }
                act.monitors -= 1;
            }
            Instr::MakeClosure { method, captures } => {
                let captures = act.pop_n(*captures as usize)?;
                act.stack.push(Value::Closure(Arc::new(Closure {
                    method: method.clone(),
                    captures,
                })));
            }
            Instr::CallClosure { argc, ret } => {
                let args = act.pop_n(*argc as usize)?;
                let closure = match act.pop()? {
                    Value::Closure(c) => c,
                    other => {
                        return Err(act.type_error(format!("call on {}", other.type_name())));
                    }
                };
                let mut full = closure.captures.clone();
                full.extend(args);
                let result = self.call(&closure.method, full, depth)?;
                if !ret.is_void() {
                    act.stack.push(result);
                }
            }

            // ── Continuation protocol ───────────────────────────────
            Instr::FutureNew => act.stack.push(Value::Future(Promise::new())),
            Instr::FutureIsDone => {
                let p = act.pop_future()?;
                act.stack.push(Value::Bool(p.is_settled()));
            }
            Instr::FutureJoin => {
                let p = act.pop_future()?;
                match p.outcome() {
                    Some(Outcome::Fulfilled(v)) => act.stack.push(v),
                    Some(Outcome::Rejected(e)) => return Err(Unwind::Throw(e)),
                    None => {
                        return Err(VmError::WouldBlock {
                            marker: "future_join".to_string(),
                        }
                        .into())
                    }
                }
            }
            Instr::FutureFulfill => {
                let value = act.pop()?;
                act.pop_future()?.fulfill(value);
            }
            Instr::FutureReject => {
                let exc = act.pop()?;
                act.pop_future()?.reject(exc);
            }
            Instr::FrameNew { slots } => {
                let outer = act.pop_future()?;
                act.stack
                    .push(Value::Frame(Frame::new(outer, *slots as usize)));
            }
            Instr::FrameLoad { frame, slot } => {
                let f = act.frame(*frame)?;
                let Some(v) = f.load(*slot as usize) else {
                    return Err(act.type_error(format!("frame slot {} out of range", slot)));
                };
                act.stack.push(v);
            }
            Instr::FrameStore { frame, slot } => {
                let v = act.pop()?;
                let f = act.frame(*frame)?;
                if !f.store(*slot as usize, v) {
                    return Err(act.type_error(format!("frame slot {} out of range", slot)));
                }
            }
            Instr::FrameOuter { frame } => {
                let f = act.frame(*frame)?;
                act.stack.push(Value::Future(f.outer().clone()));
            }
            Instr::OutcomeUnwrap => match act.pop()? {
                Value::Outcome(o) => match *o {
                    Outcome::Fulfilled(v) => act.stack.push(v),
                    Outcome::Rejected(e) => return Err(Unwind::Throw(e)),
                },
                Value::Null => act.stack.push(Value::Null),
                other => {
                    return Err(act.type_error(format!("unwrap of {}", other.type_name())));
                }
            },
            Instr::Resume {
                dispatcher,
                state,
                frame,
            } => {
                let pending = act.pop_future()?;
                let frame = Value::Frame(act.frame(*frame)?);
                self.schedule_resume(pending, dispatcher.clone(), *state, frame);
            }
        }
        Ok(())
    }

    /// Register the continuation; it runs on whichever thread settles
    /// `pending`, with the ambient context of the registering thread.
    fn schedule_resume(&self, pending: Promise, dispatcher: String, state: u32, frame: Value) {
        let vm = self.clone();
        let snapshot = ambient::capture();
        tracing::trace!(target: "unblock::vm", %dispatcher, state, "continuation registered");
        pending.on_settle(Box::new(move |outcome| {
            let _guard = snapshot.enter();
            let outer = match &frame {
                Value::Frame(f) => Some(f.outer().clone()),
                _ => None,
            };
            let args = vec![
                Value::Int(state as i64),
                Value::Outcome(Box::new(outcome)),
                frame,
            ];
            if let Err(e) = vm.invoke(&dispatcher, args) {
                tracing::error!(
                    target: "unblock::vm",
                    %dispatcher,
                    state,
                    error = %e,
                    "resumed dispatch failed"
                );
                // After a suspension the outer future is the only way back.
                let exception = match e {
                    Unwind::Throw(exc) => exc,
                    Unwind::Fault(fault) => Value::exception("VmFault", &fault.to_string()),
                };
                if let Some(outer) = outer {
                    outer.reject(exception);
                }
            }
        }));
    }
}

impl Activation<'_> {
    fn location(&self) -> Location {
        Location::new(self.block, self.offset)
    }

    fn pop(&mut self) -> Result<Value, Unwind> {
        self.stack.pop().ok_or_else(|| {
            VmError::StackUnderflow {
                method: self.method.name.clone(),
                at: self.location(),
            }
            .into()
        })
    }

    /// Pop `n` values, first-pushed first.
    fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, Unwind> {
        if self.stack.len() < n {
            return Err(VmError::StackUnderflow {
                method: self.method.name.clone(),
                at: self.location(),
            }
            .into());
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    fn pop_future(&mut self) -> Result<Promise, Unwind> {
        match self.pop()? {
            Value::Future(p) => Ok(p),
            other => Err(self.type_error(format!("expected future, found {}", other.type_name()))),
        }
    }

    fn local(&self, id: LocalId) -> &Value {
        self.locals.get(id.0 as usize).unwrap_or(&NULL)
    }

    fn set_local(&mut self, id: LocalId, value: Value) {
        let idx = id.0 as usize;
        if idx >= self.locals.len() {
            self.locals.resize(idx + 1, Value::Null);
        }
        self.locals[idx] = value;
    }

    fn frame(&self, id: LocalId) -> Result<Frame, Unwind> {
        match self.local(id) {
            Value::Frame(f) => Ok(f.clone()),
            other => Err(self.type_error(format!("expected frame, found {}", other.type_name()))),
        }
    }

    fn type_error(&self, detail: String) -> Unwind {
        VmError::Type {
            method: self.method.name.clone(),
            at: self.location(),
            detail,
        }
        .into()
    }
}

fn binary(act: &Activation<'_>, op: BinOp, a: Value, b: Value) -> Result<Value, Unwind> {
    use Value::{Bool, Float, Int, Str};

    let v = match (op, &a, &b) {
        (BinOp::Eq, _, _) => Bool(a.same(&b)),
        (BinOp::Ne, _, _) => Bool(!a.same(&b)),
        (BinOp::And, Bool(x), Bool(y)) => Bool(*x && *y),
        (BinOp::Or, Bool(x), Bool(y)) => Bool(*x || *y),
        (BinOp::Add, Str(x), _) => Value::str(&format!("{}{}", x, b)),
        (BinOp::Div | BinOp::Rem, Int(_), Int(0)) => {
            return Err(Unwind::Throw(Value::exception(
                "ArithmeticException",
                "/ by zero",
            )));
        }
        (_, Int(x), Int(y)) => match op {
            BinOp::Add => Int(x.wrapping_add(*y)),
            BinOp::Sub => Int(x.wrapping_sub(*y)),
            BinOp::Mul => Int(x.wrapping_mul(*y)),
            BinOp::Div => Int(x.wrapping_div(*y)),
            BinOp::Rem => Int(x.wrapping_rem(*y)),
            BinOp::Lt => Bool(x < y),
            BinOp::Gt => Bool(x > y),
            BinOp::Le => Bool(x <= y),
            BinOp::Ge => Bool(x >= y),
            _ => return Err(act.type_error(format!("{} on int", op))),
        },
        (_, Int(_) | Float(_), Int(_) | Float(_)) => {
            let x = as_float(&a);
            let y = as_float(&b);
            match op {
                BinOp::Add => Float(x + y),
                BinOp::Sub => Float(x - y),
                BinOp::Mul => Float(x * y),
                BinOp::Div => Float(x / y),
                BinOp::Rem => Float(x % y),
                BinOp::Lt => Bool(x < y),
                BinOp::Gt => Bool(x > y),
                BinOp::Le => Bool(x <= y),
                BinOp::Ge => Bool(x >= y),
                _ => return Err(act.type_error(format!("{} on float", op))),
            }
        }
        _ => {
            return Err(act.type_error(format!(
                "{} on {} and {}",
                op,
                a.type_name(),
                b.type_name()
            )));
        }
    };
    Ok(v)
}

fn as_float(v: &Value) -> f64 {
    match v {
        Value::Int(i) => *i as f64,
        Value::Float(f) => *f,
        _ => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unblock_ir::{Const, FunctionRef, MethodBuilder, Type};

    fn divide() -> Method {
        // try { return a / b } catch ArithmeticException { return -1 }
        let mut b = MethodBuilder::new("divide", Type::Int);
        let x = b.add_param("a", Type::Int);
        let y = b.add_param("b", Type::Int);
        let body = b.create_block();
        let handler = b.create_block();
        b.terminate(Terminator::Goto { target: body });
        b.switch_to_block(body);
        b.push_all([Instr::Load(x), Instr::Load(y), Instr::Binary(BinOp::Div)]);
        b.terminate(Terminator::Return);
        b.switch_to_block(handler);
        b.push_all([Instr::Pop, Instr::Push(Const::Int(-1))]);
        b.terminate(Terminator::Return);
        b.add_region(
            [body],
            handler,
            RegionKind::Catch("ArithmeticException".into()),
        );
        b.finish()
    }

    #[test]
    fn arithmetic_and_catch() {
        let vm = Vm::builder().method(divide()).build();
        let ok = vm.invoke("divide", vec![Value::Int(9), Value::Int(3)]);
        assert_eq!(ok.ok().and_then(|v| v.as_int()), Some(3));
        let caught = vm.invoke("divide", vec![Value::Int(9), Value::Int(0)]);
        assert_eq!(caught.ok().and_then(|v| v.as_int()), Some(-1));
    }

    #[test]
    fn fault_in_resumed_dispatch_rejects_outer_future() {
        // park(f): register `broken` on f and hand back the outer future.
        let mut b = MethodBuilder::new("park", Type::Future);
        let f = b.add_param("f", Type::Future);
        let frame = b.alloc_temp(Type::Frame);
        b.push_all([
            Instr::FutureNew,
            Instr::FrameNew { slots: 0 },
            Instr::Store(frame),
            Instr::Load(f),
            Instr::Resume {
                dispatcher: "broken".into(),
                state: 1,
                frame,
            },
            Instr::FrameOuter { frame },
        ]);
        b.terminate(Terminator::Return);
        let park = b.finish();

        let mut b = MethodBuilder::new("broken", Type::Future);
        b.add_param("state", Type::Int);
        b.add_param("resume", Type::Outcome);
        b.add_param("frame", Type::Frame);
        b.terminate(Terminator::Unreachable);
        let broken = b.finish();

        let vm = Vm::builder().method(park).method(broken).build();
        let pending = Promise::new();
        let outer = match vm.invoke("park", vec![Value::Future(pending.clone())]) {
            Ok(Value::Future(p)) => p,
            other => panic!("unexpected {:?}", other.map(|v| v.to_string())),
        };
        assert!(!outer.is_settled());

        pending.fulfill(Value::Int(1));
        match outer.outcome() {
            Some(Outcome::Rejected(e)) => assert_eq!(e.class_name(), Some("VmFault")),
            other => panic!("outer not rejected: {:?}", other.is_some()),
        }
    }

    #[test]
    fn marker_on_pending_future_would_block() {
        let mut b = MethodBuilder::new("wait", Type::Int);
        let f = b.add_param("f", Type::Future);
        b.push_all([
            Instr::Load(f),
            Instr::Invoke {
                func: FunctionRef::new("Await.await", 1, Type::Int),
            },
        ]);
        b.terminate(Terminator::Return);
        let vm = Vm::builder().method(b.finish()).build();

        let done = vm.invoke("wait", vec![Value::Future(Promise::fulfilled(Value::Int(4)))]);
        assert_eq!(done.ok().and_then(|v| v.as_int()), Some(4));

        let pending = vm.invoke("wait", vec![Value::Future(Promise::new())]);
        assert!(matches!(
            pending,
            Err(Unwind::Fault(VmError::WouldBlock { .. }))
        ));
    }

    #[test]
    fn catch_matches_declared_subclasses() {
        let vm = Vm::builder()
            .subclass("FileNotFound", "IOException")
            .subclass("IOException", "Exception")
            .build();
        assert!(vm.is_subclass("FileNotFound", "Exception"));
        assert!(!vm.is_subclass("IOException", "FileNotFound"));
        assert!(vm.is_subclass("Anything", "Throwable"));
    }

    #[test]
    fn unknown_function_is_a_fault() {
        let vm = Vm::builder().build();
        let err = vm.invoke("missing", Vec::new()).unwrap_err();
        assert_eq!(err.to_string(), "undefined function `missing`");
    }
}
