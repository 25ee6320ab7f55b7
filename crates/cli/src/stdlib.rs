//! A minimal pre-bound standard library
//!
//! Exercises the `bind(name, fn)` extension point with the two
//! primitives an original-source native call table would expose first:
//! writing a value and measuring a collection. Neither is required by
//! the core language; both demonstrate that the extension point works
//! end to end rather than leaving it theoretical.

use silk_core::object::HeapObject;
use silk_core::Value;
use silk_runtime::{FfiStatus, FfiTable};
use std::io::Write;

pub fn install(ffi: &mut FfiTable) {
    ffi.bind("print", |heap, args, ret| {
        let Some(value) = args.first() else {
            return FfiStatus::ArityMismatch;
        };
        let rendered = display(heap, *value);
        let mut stdout = std::io::stdout().lock();
        if writeln!(stdout, "{rendered}").is_err() {
            return FfiStatus::Error;
        }
        *ret = Value::Void;
        FfiStatus::Ok
    });

    ffi.bind("len", |heap, args, ret| {
        let Some(Value::Obj(r)) = args.first() else {
            return FfiStatus::TypeMismatch;
        };
        let length = match heap.get(*r) {
            Some(HeapObject::String(s)) => s.len(),
            Some(HeapObject::Array(items)) => items.len(),
            Some(HeapObject::Dictionary(dict)) => dict.len(),
            _ => return FfiStatus::TypeMismatch,
        };
        *ret = Value::Int(length as i64);
        FfiStatus::Ok
    });
}

fn display(heap: &silk_runtime::Heap, value: Value) -> String {
    match value {
        Value::Obj(r) => match heap.get(r) {
            Some(HeapObject::String(s)) => s.bytes.clone(),
            Some(HeapObject::Array(items)) => {
                let rendered: Vec<String> = items.iter().map(|v| display(heap, *v)).collect();
                format!("[{}]", rendered.join(", "))
            }
            Some(other) => format!("<{:?}#{r}>", other.tag()),
            None => format!("<dangling#{r}>"),
        },
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn len_reports_a_heap_string_s_byte_length() {
        let mut heap = silk_runtime::Heap::new();
        let r = heap.allocate(HeapObject::String(silk_core::object::SilkString::new("hello")));
        let mut table = FfiTable::new();
        install(&mut table);
        let handle = table.handle_of("len").unwrap();
        let mut ret = Value::Void;
        let status = table.call(&heap, handle, &[Value::Obj(r)], &mut ret);
        assert_eq!(status, Some(FfiStatus::Ok));
        assert_eq!(ret, Value::Int(5));
    }

    #[test]
    fn print_rejects_a_missing_argument() {
        let heap = silk_runtime::Heap::new();
        let mut table = FfiTable::new();
        install(&mut table);
        let handle = table.handle_of("print").unwrap();
        let mut ret = Value::Void;
        let status = table.call(&heap, handle, &[], &mut ret);
        assert_eq!(status, Some(FfiStatus::ArityMismatch));
    }
}
