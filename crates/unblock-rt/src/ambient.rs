// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Ambient context carried across suspensions.
//!
//! Values set on the current thread (trace ids, tenant, deadlines) are
//! captured when a continuation is registered and reinstated around the
//! resumed dispatch, whichever thread completes the awaited future.

use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::value::Value;

thread_local! {
    static AMBIENT: RefCell<BTreeMap<String, Value>> = const { RefCell::new(BTreeMap::new()) };
}

pub fn set(key: impl Into<String>, value: Value) {
    AMBIENT.with(|a| {
        a.borrow_mut().insert(key.into(), value);
    });
}

pub fn get(key: &str) -> Option<Value> {
    AMBIENT.with(|a| a.borrow().get(key).cloned())
}

pub fn clear() {
    AMBIENT.with(|a| a.borrow_mut().clear());
}

/// The ambient values of one thread at one moment.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    values: BTreeMap<String, Value>,
}

pub fn capture() -> Snapshot {
    Snapshot {
        values: AMBIENT.with(|a| a.borrow().clone()),
    }
}

impl Snapshot {
    /// Install this snapshot until the guard drops.
    pub fn enter(self) -> AmbientGuard {
        let previous = AMBIENT.with(|a| std::mem::replace(&mut *a.borrow_mut(), self.values));
        AmbientGuard { previous }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Restores the previous ambient values on drop.
pub struct AmbientGuard {
    previous: BTreeMap<String, Value>,
}

impl Drop for AmbientGuard {
    fn drop(&mut self) {
        let previous = std::mem::take(&mut self.previous);
        AMBIENT.with(|a| *a.borrow_mut() = previous);
    }
}
