// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Runtime values.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use unblock_ir::Const;

use crate::future::{Outcome, Promise};

/// A runtime value in the interpreter.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    /// Object instance; exceptions are objects whose first field is the
    /// message.
    Object(Arc<Object>),
    Future(Promise),
    Frame(Frame),
    Outcome(Box<Outcome>),
    Closure(Arc<Closure>),
}

#[derive(Debug)]
pub struct Object {
    pub class: String,
    pub fields: Vec<Value>,
}

#[derive(Debug)]
pub struct Closure {
    pub method: String,
    pub captures: Vec<Value>,
}

impl Value {
    pub fn from_const(c: &Const) -> Self {
        match c {
            Const::Null => Value::Null,
            Const::Bool(b) => Value::Bool(*b),
            Const::Int(i) => Value::Int(*i),
            Const::Float(f) => Value::Float(*f),
            Const::Str(s) => Value::Str(Arc::from(s.as_str())),
        }
    }

    pub fn str(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }

    pub fn object(class: impl Into<String>, fields: Vec<Value>) -> Self {
        Value::Object(Arc::new(Object {
            class: class.into(),
            fields,
        }))
    }

    pub fn exception(class: impl Into<String>, message: &str) -> Self {
        Value::object(class, vec![Value::str(message)])
    }

    pub fn class_name(&self) -> Option<&str> {
        match self {
            Value::Object(obj) => Some(obj.class.as_str()),
            _ => None,
        }
    }

    /// Exception message, when the value is an exception built with one.
    pub fn message(&self) -> Option<&str> {
        match self {
            Value::Object(obj) => match obj.fields.first() {
                Some(Value::Str(s)) => Some(&**s),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
            Value::Future(_) => "future",
            Value::Frame(_) => "frame",
            Value::Outcome(_) => "outcome",
            Value::Closure(_) => "closure",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_future(&self) -> Option<&Promise> {
        match self {
            Value::Future(p) => Some(p),
            _ => None,
        }
    }

    /// Equality as `BinOp::Eq` sees it: by value for scalars and strings,
    /// by identity for everything else.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Future(a), Value::Future(b)) => a.ptr_eq(b),
            (Value::Closure(a), Value::Closure(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::Object(obj) => match self.message() {
                Some(msg) => write!(f, "{}: {}", obj.class, msg),
                None => write!(f, "{}", obj.class),
            },
            Value::Future(_) => write!(f, "<future>"),
            Value::Frame(_) => write!(f, "<frame>"),
            Value::Outcome(o) => match o.as_ref() {
                Outcome::Fulfilled(v) => write!(f, "<fulfilled {}>", v),
                Outcome::Rejected(e) => write!(f, "<rejected {}>", e),
            },
            Value::Closure(c) => write!(f, "<closure {}>", c.method),
        }
    }
}

/// Saved continuation state: the outer future plus live-local slots.
#[derive(Debug, Clone)]
pub struct Frame {
    inner: Arc<FrameData>,
}

#[derive(Debug)]
struct FrameData {
    outer: Promise,
    slots: Mutex<Vec<Value>>,
}

impl Frame {
    pub fn new(outer: Promise, slots: usize) -> Self {
        Self {
            inner: Arc::new(FrameData {
                outer,
                slots: Mutex::new(vec![Value::Null; slots]),
            }),
        }
    }

    pub fn outer(&self) -> &Promise {
        &self.inner.outer
    }

    pub fn load(&self, slot: usize) -> Option<Value> {
        self.inner.slots.lock().get(slot).cloned()
    }

    /// Returns false when `slot` is out of range.
    pub fn store(&self, slot: usize, value: Value) -> bool {
        match self.inner.slots.lock().get_mut(slot) {
            Some(cell) => {
                *cell = value;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
