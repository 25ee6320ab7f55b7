//! The `bind(name, fn)` native-function extension point
//!
//! Per the external interface, a native function receives the callee's
//! argument slice, read-only access to the heap (so a native function
//! can inspect a string or array argument rather than only see an
//! opaque reference), and a mutable slot for its return value; it
//! reports back one of four statuses. This is the only way host code
//! extends a running program; the VM itself never special-cases any
//! particular name.

use crate::gc::Heap;
use silk_core::object::FfiHandle;
use silk_core::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiStatus {
    Ok,
    ArityMismatch,
    TypeMismatch,
    Error,
}

pub type NativeFn = dyn Fn(&Heap, &[Value], &mut Value) -> FfiStatus;

/// Maps externally-declared function names to host closures. A name
/// bound here is wired to its global slot once, at VM startup (see
/// `Vm::bind_externs`); `CAL` then dispatches by the `FfiHandle` an
/// `FfiFunction` heap object carries rather than by name lookup.
#[derive(Default)]
pub struct FfiTable {
    fns: Vec<Box<NativeFn>>,
    names: Vec<String>,
    index_of: HashMap<String, usize>,
}

impl FfiTable {
    pub fn new() -> Self {
        FfiTable {
            fns: Vec::new(),
            names: Vec::new(),
            index_of: HashMap::new(),
        }
    }

    /// Registers a native function under `name`, returning the handle
    /// that identifies it from then on.
    pub fn bind(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&Heap, &[Value], &mut Value) -> FfiStatus + 'static,
    ) -> FfiHandle {
        let name = name.into();
        let index = self.fns.len();
        self.fns.push(Box::new(f));
        self.names.push(name.clone());
        self.index_of.insert(name, index);
        FfiHandle(index)
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.index_of.contains_key(name)
    }

    pub fn handle_of(&self, name: &str) -> Option<FfiHandle> {
        self.index_of.get(name).map(|&i| FfiHandle(i))
    }

    pub fn name_of(&self, handle: FfiHandle) -> Option<&str> {
        self.names.get(handle.0).map(String::as_str)
    }

    pub fn call(&self, heap: &Heap, handle: FfiHandle, args: &[Value], ret: &mut Value) -> Option<FfiStatus> {
        self.fns.get(handle.0).map(|f| f(heap, args, ret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_function_is_reachable_by_handle() {
        let mut table = FfiTable::new();
        let handle = table.bind("double", |_heap, args, ret| match args {
            [Value::Int(n)] => {
                *ret = Value::Int(n * 2);
                FfiStatus::Ok
            }
            _ => FfiStatus::TypeMismatch,
        });
        let heap = Heap::new();
        let mut ret = Value::Void;
        let status = table.call(&heap, handle, &[Value::Int(21)], &mut ret);
        assert_eq!(status, Some(FfiStatus::Ok));
        assert_eq!(ret, Value::Int(42));
        assert_eq!(table.name_of(handle), Some("double"));
    }

    #[test]
    fn unbound_name_has_no_handle() {
        let table = FfiTable::new();
        assert_eq!(table.handle_of("missing"), None);
    }
}
