//! The Moth execution loop
//!
//! `Vm::run` fetches, decodes, and executes one opcode at a time against
//! a value stack and a call-frame stack until it hits `FIN` or an
//! opcode handler returns an error status. Locals live directly on the
//! value stack at `base + slot`; there is no separate environment
//! structure. Functions are compiled into their own byte buffers (see
//! `silk-compiler`), so a call swaps `self.code` for the callee's
//! buffer rather than jumping within one shared buffer.

use crate::error::RuntimeError;
use crate::ffi::FfiTable;
use crate::frame::Frame;
use crate::gc::Heap;
use crate::globals::Globals;
use silk_core::object::{Dictionary, FfiHandle, HeapObject, SilkFunction, SilkString};
use silk_core::opcode::{Opcode, Width};
use silk_core::program::{Constant, Program};
use silk_core::value::Value;
use std::rc::Rc;

/// Allocations between automatic collections. Chosen small enough that
/// the mark-sweep tests exercise more than one collection without
/// needing thousands of allocations.
const DEFAULT_GC_THRESHOLD: usize = 256;

pub struct Vm {
    program: Program,
    heap: Heap,
    globals: Globals,
    ffi: FfiTable,
    stack: Vec<Value>,
    frames: Vec<Frame>,
    code: Rc<Vec<u8>>,
    ip: usize,
    gc_threshold: usize,
}

impl Vm {
    pub fn new(program: Program) -> Self {
        let code = Rc::new(program.bytes.clone());
        let mut vm = Vm {
            program,
            heap: Heap::new(),
            globals: Globals::new(),
            ffi: FfiTable::new(),
            stack: Vec::new(),
            frames: Vec::new(),
            code,
            ip: 0,
            gc_threshold: DEFAULT_GC_THRESHOLD,
        };
        vm.bind_externs();
        vm
    }

    pub fn ffi_mut(&mut self) -> &mut FfiTable {
        &mut self.ffi
    }

    /// Wires every symbol name the compiler interned for an extern
    /// declaration to its native implementation, if one has been
    /// registered. Ordinary globals are left alone — they only gain a
    /// value once `DEF*` executes, never at construction time. Called
    /// once by `new`; call again after registering further bindings
    /// through [`Vm::ffi_mut`] to link them in too.
    pub fn bind_externs(&mut self) {
        let names: Vec<(usize, String)> = self
            .program
            .symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (i, s.name.clone()))
            .collect();
        for (index, name) in names {
            if let Some(handle) = self.ffi.handle_of(&name) {
                let reference = self.heap.allocate(HeapObject::FfiFunction(handle));
                self.globals.define(index, Value::Obj(reference));
            }
        }
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        let index = self.program.symbols.find(name)?;
        self.globals.get(index)
    }

    fn base(&self) -> usize {
        self.frames.last().map(|f| f.base).unwrap_or(0)
    }

    fn roots(&self) -> Vec<Value> {
        let mut roots: Vec<Value> = self.stack.clone();
        roots.extend(self.globals.values());
        roots
    }

    fn maybe_collect(&mut self) {
        if self.heap.allocations_since_gc >= self.gc_threshold {
            let roots = self.roots();
            self.heap.collect(roots);
        }
    }

    fn collect_garbage(&mut self) {
        let roots = self.roots();
        self.heap.collect(roots);
    }

    fn allocate(&mut self, object: HeapObject) -> Value {
        let reference = self.heap.allocate(object);
        self.maybe_collect();
        Value::Obj(reference)
    }

    /// Materializes a rodata entry into a runtime `Value`. Value
    /// constants are inline; object constants (currently only compiled
    /// functions) are heap-allocated fresh on every load, mirroring how
    /// any other heap-producing opcode behaves.
    fn load_constant(&mut self, index: usize) -> Result<Value, RuntimeError> {
        let constant = self
            .program
            .rodata
            .get(index)
            .ok_or_else(|| RuntimeError::inva(format!("rodata index {index} out of range")))?
            .clone();
        Ok(match constant {
            Constant::Value(v) => v,
            Constant::Object(o) => self.allocate(o),
        })
    }

    fn fetch_u8(&mut self) -> u8 {
        let b = self.code[self.ip];
        self.ip += 1;
        b
    }

    fn fetch_width(&mut self, width: Width) -> Result<usize, RuntimeError> {
        let bytes = width.bytes();
        let slice = self
            .code
            .get(self.ip..self.ip + bytes)
            .ok_or_else(|| RuntimeError::inva("truncated operand"))?;
        let value = width
            .decode(slice)
            .ok_or_else(|| RuntimeError::inva("truncated operand"))?;
        self.ip += bytes;
        Ok(value as usize)
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack
            .pop()
            .ok_or_else(|| RuntimeError::inva("stack underflow"))
    }

    fn peek(&self) -> Result<Value, RuntimeError> {
        self.stack
            .last()
            .copied()
            .ok_or_else(|| RuntimeError::inva("stack underflow"))
    }

    fn heap_object(&self, value: Value) -> Result<&HeapObject, RuntimeError> {
        match value {
            Value::Obj(r) => self
                .heap
                .get(r)
                .ok_or_else(|| RuntimeError::inva("dangling heap reference")),
            _ => Err(RuntimeError::inv_typ(format!(
                "expected a heap object, found '{}'",
                value.type_name()
            ))),
        }
    }

    /// Renders a value the way `Value`'s own `Display` can't: a heap
    /// reference is resolved and rendered by content (a string prints
    /// its bytes, an array prints its elements recursively) rather than
    /// as an opaque `<obj#N>`. Used by host code that wants to show a
    /// program's result to a person rather than consume it further.
    pub fn display_value(&self, value: Value) -> String {
        match value {
            Value::Obj(r) => match self.heap.get(r) {
                Some(HeapObject::String(s)) => s.bytes.clone(),
                Some(HeapObject::Array(items)) => {
                    let rendered: Vec<String> =
                        items.iter().map(|v| self.display_value(*v)).collect();
                    format!("[{}]", rendered.join(", "))
                }
                Some(HeapObject::Vector(components)) => {
                    let rendered: Vec<String> = components.iter().map(|c| c.to_string()).collect();
                    format!("<{}>", rendered.join(", "))
                }
                Some(HeapObject::Dictionary(dict)) => {
                    let rendered: Vec<String> = dict
                        .entries()
                        .map(|(k, v)| format!("{}: {}", self.display_value(k), self.display_value(v)))
                        .collect();
                    format!("#{{{}}}", rendered.join(", "))
                }
                Some(other) => format!("<{:?}#{r}>", other.tag()),
                None => format!("<dangling#{r}>"),
            },
            other => other.to_string(),
        }
    }

    /// Runs until `FIN` or an error. Returns the top-of-stack value at
    /// halt time (`Void` if the stack is empty), mirroring the VM's
    /// status-then-inspect usage pattern.
    pub fn run(&mut self) -> Result<Value, RuntimeError> {
        loop {
            if self.ip >= self.code.len() {
                return Err(RuntimeError::inva("ip ran past the end of the buffer"));
            }
            let byte = self.fetch_u8();
            let op = Opcode::from_byte(byte)
                .ok_or_else(|| RuntimeError::inv_typ(format!("unknown opcode 0x{byte:02X}")))?;
            match op {
                Opcode::Fin => return Ok(self.stack.last().copied().unwrap_or(Value::Void)),
                Opcode::Nop => {}
                Opcode::Gc => self.collect_garbage(),

                Opcode::Pop => {
                    self.pop()?;
                }
                Opcode::Psh => {
                    let slot = self.fetch_width(Width::Two)?;
                    let value = *self
                        .stack
                        .get(self.base() + slot)
                        .ok_or_else(|| RuntimeError::inva("local slot out of range"))?;
                    self.stack.push(value);
                }
                Opcode::Str => {
                    let slot = self.fetch_width(Width::Two)?;
                    let value = self.peek()?;
                    let base = self.base();
                    let cell = self
                        .stack
                        .get_mut(base + slot)
                        .ok_or_else(|| RuntimeError::inva("local slot out of range"))?;
                    *cell = value;
                }

                Opcode::Val1 | Opcode::Val2 | Opcode::Val3 | Opcode::Val4 => {
                    let width = op.operand_width().expect("VAL* always has a width");
                    let index = self.fetch_width(width)?;
                    let value = self.load_constant(index)?;
                    self.stack.push(value);
                }
                Opcode::Def1 | Opcode::Def2 | Opcode::Def3 | Opcode::Def4 => {
                    let width = op.operand_width().expect("DEF* always has a width");
                    let id = self.fetch_width(width)?;
                    let value = self.pop()?;
                    self.globals.define(id, value);
                }
                Opcode::Sym1 | Opcode::Sym2 | Opcode::Sym3 | Opcode::Sym4 => {
                    let width = op.operand_width().expect("SYM* always has a width");
                    let id = self.fetch_width(width)?;
                    let value = self
                        .globals
                        .get(id)
                        .ok_or_else(|| RuntimeError::inva(format!("undefined global {id}")))?;
                    self.stack.push(value);
                }
                Opcode::Asn1 | Opcode::Asn2 | Opcode::Asn3 | Opcode::Asn4 => {
                    let width = op.operand_width().expect("ASN* always has a width");
                    let id = self.fetch_width(width)?;
                    let value = self.peek()?;
                    if !self.globals.set(id, value) {
                        return Err(RuntimeError::inva(format!("undefined global {id}")));
                    }
                }

                Opcode::Jmp => {
                    let offset = self.fetch_width(Width::Two)?;
                    self.ip += offset;
                }
                Opcode::Jpt => {
                    let offset = self.fetch_width(Width::Two)?;
                    if self.peek()?.is_truthy() {
                        self.ip += offset;
                    }
                }
                Opcode::Jpf => {
                    let offset = self.fetch_width(Width::Two)?;
                    if !self.peek()?.is_truthy() {
                        self.ip += offset;
                    }
                }
                Opcode::Jbw => {
                    let offset = self.fetch_width(Width::Two)?;
                    self.ip = self
                        .ip
                        .checked_sub(offset)
                        .ok_or_else(|| RuntimeError::inva("backward jump before buffer start"))?;
                }

                Opcode::Frm1 | Opcode::Frm2 | Opcode::Frm3 | Opcode::Frm4 | Opcode::Clo => {
                    return Err(RuntimeError::inv_typ(
                        "FRM*/CLO are reserved and never emitted by this compiler",
                    ));
                }
                Opcode::Cal => self.execute_call()?,
                Opcode::Ret => self.execute_return(Value::Void)?,
                Opcode::Retv => {
                    let value = self.pop()?;
                    self.execute_return(value)?;
                }

                Opcode::Neg => self.unary_numeric(|n| Value::Int(n.wrapping_neg()), |r| Value::Real(-r))?,
                Opcode::Not => {
                    let v = self.pop()?;
                    self.stack.push(Value::Bool(!v.is_truthy()));
                }
                Opcode::Add => self.binary_add()?,
                Opcode::Sub => self.binary_arith(i64::wrapping_sub, |a, b| a - b)?,
                Opcode::Mul => self.binary_arith(i64::wrapping_mul, |a, b| a * b)?,
                Opcode::Div => self.binary_div()?,
                Opcode::Riv => self.binary_floor_div()?,
                Opcode::Pow => self.binary_pow()?,
                Opcode::Mod => self.binary_mod()?,

                Opcode::Eq => {
                    let (a, b) = self.pop_pair()?;
                    self.stack.push(Value::Bool(self.values_equal(a, b)?));
                }
                Opcode::Neq => {
                    let (a, b) = self.pop_pair()?;
                    self.stack.push(Value::Bool(!self.values_equal(a, b)?));
                }
                Opcode::Gt => self.compare(|o| o == std::cmp::Ordering::Greater)?,
                Opcode::Gte => self.compare(|o| o != std::cmp::Ordering::Less)?,
                Opcode::Lt => self.compare(|o| o == std::cmp::Ordering::Less)?,
                Opcode::Lte => self.compare(|o| o != std::cmp::Ordering::Greater)?,

                Opcode::Arr => {
                    let n = self.fetch_u8() as usize;
                    let items = self.pop_n(n)?;
                    let value = self.allocate(HeapObject::Array(items));
                    self.stack.push(value);
                }
                Opcode::Vec => {
                    let n = self.fetch_u8() as usize;
                    let items = self.pop_n(n)?;
                    let mut floats = Vec::with_capacity(n);
                    for item in items {
                        floats.push(match item {
                            Value::Int(i) => i as f64,
                            Value::Real(r) => r,
                            other => {
                                return Err(RuntimeError::inv_typ(format!(
                                    "vector components must be numeric, found '{}'",
                                    other.type_name()
                                )))
                            }
                        });
                    }
                    let value = self.allocate(HeapObject::Vector(floats));
                    self.stack.push(value);
                }
                Opcode::Dct => {
                    let n = self.fetch_u8() as usize;
                    let mut dict = Dictionary::new();
                    let mut pairs = Vec::with_capacity(n);
                    for _ in 0..n {
                        let value = self.pop()?;
                        let key = self.pop()?;
                        pairs.push((key, value));
                    }
                    pairs.reverse();
                    for (key, value) in pairs {
                        dict.insert(key, value);
                    }
                    let value = self.allocate(HeapObject::Dictionary(dict));
                    self.stack.push(value);
                }
                Opcode::Idx => self.execute_index()?,
                Opcode::Ida => self.execute_index_assign()?,
                Opcode::Mrg => self.execute_merge()?,

                Opcode::Vid => self.stack.push(Value::Void),
                Opcode::Tru => self.stack.push(Value::Bool(true)),
                Opcode::Fal => self.stack.push(Value::Bool(false)),
                Opcode::Pi => self.stack.push(Value::Real(std::f64::consts::PI)),
                Opcode::Tau => self.stack.push(Value::Real(std::f64::consts::TAU)),
                Opcode::Eul => self.stack.push(Value::Real(std::f64::consts::E)),
            }
        }
    }

    fn pop_pair(&mut self) -> Result<(Value, Value), RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        Ok((a, b))
    }

    fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, RuntimeError> {
        if self.stack.len() < n {
            return Err(RuntimeError::inva("stack underflow"));
        }
        let split = self.stack.len() - n;
        Ok(self.stack.split_off(split))
    }

    fn unary_numeric(
        &mut self,
        on_int: impl Fn(i64) -> Value,
        on_real: impl Fn(f64) -> Value,
    ) -> Result<(), RuntimeError> {
        let v = self.pop()?;
        let result = match v {
            Value::Int(n) => on_int(n),
            Value::Real(r) => on_real(r),
            other => {
                return Err(RuntimeError::inv_typ(format!(
                    "expected a number, found '{}'",
                    other.type_name()
                )))
            }
        };
        self.stack.push(result);
        Ok(())
    }

    /// `STR + STR` concatenates (see `binary_add`'s override); every
    /// other arithmetic family follows the table: `INT op INT -> INT`,
    /// `REAL op (either) -> REAL`, anything else is `INVTYP`.
    fn binary_arith(
        &mut self,
        on_ints: impl Fn(i64, i64) -> i64,
        on_reals: impl Fn(f64, f64) -> f64,
    ) -> Result<(), RuntimeError> {
        let (a, b) = self.pop_pair()?;
        let result = match (a, b) {
            (Value::Int(x), Value::Int(y)) => Value::Int(on_ints(x, y)),
            (Value::Real(x), Value::Real(y)) => Value::Real(on_reals(x, y)),
            (Value::Int(x), Value::Real(y)) => Value::Real(on_reals(x as f64, y)),
            (Value::Real(x), Value::Int(y)) => Value::Real(on_reals(x, y as f64)),
            _ => {
                return Err(RuntimeError::inv_typ(format!(
                    "cannot apply this operator to '{}' and '{}'",
                    a.type_name(),
                    b.type_name()
                )))
            }
        };
        self.stack.push(result);
        Ok(())
    }

    fn binary_add(&mut self) -> Result<(), RuntimeError> {
        let (a, b) = self.pop_pair()?;
        let strings = match (a, b) {
            (Value::Obj(x), Value::Obj(y)) => match (self.heap.get(x), self.heap.get(y)) {
                (Some(HeapObject::String(sa)), Some(HeapObject::String(sb))) => {
                    Some(SilkString::concat(sa, sb))
                }
                _ => None,
            },
            _ => None,
        };
        if let Some(concatenated) = strings {
            let value = self.allocate(HeapObject::String(concatenated));
            self.stack.push(value);
            return Ok(());
        }
        self.stack.push(a);
        self.stack.push(b);
        self.binary_arith(i64::wrapping_add, |x, y| x + y)
    }

    /// `DIV` always yields `REAL`, matching the original VM's
    /// `divide_()`: even `INT / INT` promotes to native double
    /// division, so division by zero produces IEEE-754 infinity rather
    /// than an `INVA` status. See `DESIGN.md`.
    fn binary_div(&mut self) -> Result<(), RuntimeError> {
        let (a, b) = self.pop_pair()?;
        let (x, y) = self.as_f64_pair(a, b)?;
        self.stack.push(Value::Real(x / y));
        Ok(())
    }

    /// `RIV` (`//`) is the original's `rounddiv_()`: `INT // INT`
    /// truncates to `INT`; `REAL // REAL` divides then truncates back
    /// to `INT`.
    fn binary_floor_div(&mut self) -> Result<(), RuntimeError> {
        let (a, b) = self.pop_pair()?;
        let result = match (a, b) {
            (Value::Int(x), Value::Int(y)) => {
                if y == 0 {
                    return Err(RuntimeError::inva("integer division by zero"));
                }
                Value::Int(x.wrapping_div(y))
            }
            _ => {
                let (x, y) = self.as_f64_pair(a, b)?;
                Value::Int((x / y) as i64)
            }
        };
        self.stack.push(result);
        Ok(())
    }

    fn binary_pow(&mut self) -> Result<(), RuntimeError> {
        let (a, b) = self.pop_pair()?;
        let (x, y) = self.as_f64_pair(a, b)?;
        self.stack.push(Value::Real(x.powf(y)));
        Ok(())
    }

    fn binary_mod(&mut self) -> Result<(), RuntimeError> {
        let (a, b) = self.pop_pair()?;
        let result = match (a, b) {
            (Value::Int(x), Value::Int(y)) => {
                if y == 0 {
                    return Err(RuntimeError::inva("integer modulo by zero"));
                }
                Value::Int(x.wrapping_rem(y))
            }
            (Value::Real(x), Value::Real(y)) => Value::Real(x % y),
            (Value::Int(x), Value::Real(y)) => Value::Real(x as f64 % y),
            (Value::Real(x), Value::Int(y)) => Value::Real(x % y as f64),
            _ => {
                return Err(RuntimeError::inv_typ(format!(
                    "cannot apply '%' to '{}' and '{}'",
                    a.type_name(),
                    b.type_name()
                )))
            }
        };
        self.stack.push(result);
        Ok(())
    }

    fn as_f64_pair(&self, a: Value, b: Value) -> Result<(f64, f64), RuntimeError> {
        let to_f64 = |v: Value| match v {
            Value::Int(n) => Ok(n as f64),
            Value::Real(r) => Ok(r),
            other => Err(RuntimeError::inv_typ(format!(
                "expected a number, found '{}'",
                other.type_name()
            ))),
        };
        Ok((to_f64(a)?, to_f64(b)?))
    }

    /// Sane, name-matching comparisons. The original source's case
    /// table maps `VM_LT` to `greater_eq_` and `VM_GTE` to `less_` —
    /// almost certainly transcription damage rather than intent — so
    /// this VM implements the mapping its opcode names actually claim.
    /// See `DESIGN.md`.
    fn compare(&mut self, accept: impl Fn(std::cmp::Ordering) -> bool) -> Result<(), RuntimeError> {
        let (a, b) = self.pop_pair()?;
        let ordering = match (a, b) {
            (Value::Int(x), Value::Int(y)) => x.cmp(&y),
            (Value::Char(x), Value::Char(y)) => x.cmp(&y),
            _ => {
                let (x, y) = self.as_f64_pair(a, b)?;
                x.partial_cmp(&y)
                    .ok_or_else(|| RuntimeError::inv_typ("comparison against NaN"))?
            }
        };
        self.stack.push(Value::Bool(accept(ordering)));
        Ok(())
    }

    /// Sane equality in place of the original's tag-only `T_OBJ`
    /// comparison (which treats any two objects of the same heap kind
    /// as equal): strings compare by content, every other heap kind by
    /// reference identity. See `DESIGN.md`.
    fn values_equal(&self, a: Value, b: Value) -> Result<bool, RuntimeError> {
        Ok(match (a, b) {
            (Value::Obj(x), Value::Obj(y)) => {
                match (self.heap.get(x), self.heap.get(y)) {
                    (Some(HeapObject::String(sa)), Some(HeapObject::String(sb))) => sa == sb,
                    _ => x == y,
                }
            }
            _ => a == b,
        })
    }

    fn execute_index(&mut self) -> Result<(), RuntimeError> {
        let key = self.pop()?;
        let collection = self.pop()?;
        let value = self.index_into(collection, key)?;
        self.stack.push(value);
        Ok(())
    }

    fn index_into(&self, collection: Value, key: Value) -> Result<Value, RuntimeError> {
        let object = self.heap_object(collection)?;
        match object {
            HeapObject::Array(items) => {
                let i = Self::as_index(key)?;
                items
                    .get(i)
                    .copied()
                    .ok_or_else(|| RuntimeError::inva(format!("array index {i} out of range")))
            }
            HeapObject::Vector(items) => {
                let i = Self::as_index(key)?;
                items
                    .get(i)
                    .map(|&f| Value::Real(f))
                    .ok_or_else(|| RuntimeError::inva(format!("vector index {i} out of range")))
            }
            HeapObject::Dictionary(dict) => Ok(dict.get(&key).unwrap_or(Value::Void)),
            HeapObject::String(s) => {
                let i = Self::as_index(key)?;
                s.bytes
                    .chars()
                    .nth(i)
                    .map(Value::Char)
                    .ok_or_else(|| RuntimeError::inva(format!("string index {i} out of range")))
            }
            other => Err(RuntimeError::inv_typ(format!(
                "'{:?}' is not indexable",
                other.tag()
            ))),
        }
    }

    fn as_index(key: Value) -> Result<usize, RuntimeError> {
        match key {
            Value::Int(n) if n >= 0 => Ok(n as usize),
            other => Err(RuntimeError::inv_typ(format!(
                "expected a non-negative integer index, found '{}'",
                other.type_name()
            ))),
        }
    }

    /// `IDA`: `array[index] = value` in place. Not emitted by this
    /// compiler (assignment targets must be bare identifiers — see
    /// `DESIGN.md`), but implemented for a complete VM contract.
    fn execute_index_assign(&mut self) -> Result<(), RuntimeError> {
        let value = self.pop()?;
        let key = self.pop()?;
        let collection = self.pop()?;
        let reference = collection
            .as_heap_ref()
            .ok_or_else(|| RuntimeError::inv_typ("index assignment target is not a heap object"))?;
        let object = self
            .heap
            .get_mut(reference)
            .ok_or_else(|| RuntimeError::inva("dangling heap reference"))?;
        match object {
            HeapObject::Array(items) => {
                let i = Self::as_index(key)?;
                let slot = items
                    .get_mut(i)
                    .ok_or_else(|| RuntimeError::inva(format!("array index {i} out of range")))?;
                *slot = value;
            }
            HeapObject::Dictionary(dict) => dict.insert(key, value),
            other => {
                return Err(RuntimeError::inv_typ(format!(
                    "'{:?}' does not support index assignment",
                    other.tag()
                )))
            }
        }
        self.stack.push(value);
        Ok(())
    }

    /// `MRG`: array concatenation or dictionary union (right operand's
    /// entries win on key collision).
    fn execute_merge(&mut self) -> Result<(), RuntimeError> {
        let (a, b) = self.pop_pair()?;
        let left = self.heap_object(a)?.clone();
        let right = self.heap_object(b)?.clone();
        let merged = match (left, right) {
            (HeapObject::Array(mut xs), HeapObject::Array(ys)) => {
                xs.extend(ys);
                HeapObject::Array(xs)
            }
            (HeapObject::Dictionary(mut xs), HeapObject::Dictionary(ys)) => {
                for (k, v) in ys.entries() {
                    xs.insert(k, v);
                }
                HeapObject::Dictionary(xs)
            }
            (x, y) => {
                return Err(RuntimeError::inv_typ(format!(
                    "cannot merge '{:?}' and '{:?}'",
                    x.tag(),
                    y.tag()
                )))
            }
        };
        let value = self.allocate(merged);
        self.stack.push(value);
        Ok(())
    }

    fn execute_call(&mut self) -> Result<(), RuntimeError> {
        let argc = self.fetch_u8() as usize;
        let callee = self.pop()?;
        let object = self.heap_object(callee)?;
        match object {
            HeapObject::Function(SilkFunction { bytes, arity, .. }) => {
                if *arity as usize != argc {
                    return Err(RuntimeError::inva(format!(
                        "expected {arity} argument(s), found {argc}"
                    )));
                }
                let callee_code = Rc::new(bytes.clone());
                self.enter_call(callee_code, argc)
            }
            HeapObject::Closure(closure) => {
                let function_ref = closure.function;
                let function = match self.heap.get(function_ref) {
                    Some(HeapObject::Function(f)) => f.clone(),
                    _ => return Err(RuntimeError::inva("closure points at a non-function")),
                };
                if function.arity as usize != argc {
                    return Err(RuntimeError::inva(format!(
                        "expected {} argument(s), found {argc}",
                        function.arity
                    )));
                }
                let callee_code = Rc::new(function.bytes);
                self.enter_call(callee_code, argc)
            }
            HeapObject::FfiFunction(handle) => self.call_native(*handle, argc),
            _ => Err(RuntimeError::not_fct(&callee)),
        }
    }

    fn enter_call(&mut self, callee_code: Rc<Vec<u8>>, argc: usize) -> Result<(), RuntimeError> {
        let base = self
            .stack
            .len()
            .checked_sub(argc)
            .ok_or_else(|| RuntimeError::inva("stack underflow at call"))?;
        let frame = Frame::new(self.code.clone(), self.ip, base);
        self.frames.push(frame);
        self.code = callee_code;
        self.ip = 0;
        Ok(())
    }

    fn call_native(&mut self, handle: FfiHandle, argc: usize) -> Result<(), RuntimeError> {
        let args = self.pop_n(argc)?;
        let mut ret = Value::Void;
        match self.ffi.call(&self.heap, handle, &args, &mut ret) {
            Some(crate::ffi::FfiStatus::Ok) => {
                self.stack.push(ret);
                Ok(())
            }
            Some(crate::ffi::FfiStatus::ArityMismatch) => {
                Err(RuntimeError::inva("FFI call arity mismatch"))
            }
            Some(crate::ffi::FfiStatus::TypeMismatch) => {
                Err(RuntimeError::inv_typ("FFI call received an unsupported argument type"))
            }
            Some(crate::ffi::FfiStatus::Error) => Err(RuntimeError::inva("FFI call failed")),
            None => Err(RuntimeError::inva("FFI handle has no registered implementation")),
        }
    }

    fn execute_return(&mut self, value: Value) -> Result<(), RuntimeError> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| RuntimeError::inva("return with no active call frame"))?;
        self.stack.truncate(frame.base);
        self.code = frame.return_code;
        self.ip = frame.return_ip;
        self.stack.push(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use silk_compiler::compile_source;

    fn compile(source: &str) -> Program {
        let staged = compile_source(source);
        assert!(
            !staged.diagnostics.has_errors(),
            "unexpected compile errors: {:?}",
            staged.diagnostics.iter().collect::<Vec<_>>()
        );
        staged.value
    }

    #[test]
    fn square_of_seven_leaves_forty_nine_on_top_of_stack() {
        let mut vm = Vm::new(compile("main;\nfun square(x) => x * x;\nsquare(7);"));
        let result = vm.run().unwrap();
        assert_eq!(result, Value::Int(49));
    }

    #[test]
    fn while_loop_accumulates_sum_to_fifty_five() {
        let program = compile(
            "main;\ndef n = 10;\ndef sum = 0;\nwhile (n > 0) {\n  sum = sum + n;\n  n = n - 1;\n}",
        );
        let mut vm = Vm::new(program);
        vm.run().unwrap();
        assert_eq!(vm.global("sum"), Some(Value::Int(55)));
        assert_eq!(vm.global("n"), Some(Value::Int(0)));
    }

    #[test]
    fn short_circuit_or_and_and_compute_expected_booleans() {
        let program = compile("main;\ndef x = false or true;\ndef y = true and false;");
        let mut vm = Vm::new(program);
        vm.run().unwrap();
        assert_eq!(vm.global("x"), Some(Value::Bool(true)));
        assert_eq!(vm.global("y"), Some(Value::Bool(false)));
    }

    #[test]
    fn string_concatenation_produces_a_twelve_byte_heap_string() {
        let program = compile("main;\nconst greeting = 'hello, ' + 'world';");
        let mut vm = Vm::new(program);
        vm.run().unwrap();
        let greeting = vm.global("greeting").unwrap();
        let object = vm.heap_object(greeting).unwrap();
        match object {
            HeapObject::String(s) => {
                assert_eq!(s.bytes, "hello, world");
                assert_eq!(s.len(), 12);
                assert_eq!(s.hash, silk_core::fnv::hash(b"hello, world"));
            }
            other => panic!("expected a string, found {other:?}"),
        }
    }

    #[test]
    fn division_by_zero_promotes_to_real_infinity() {
        let mut vm = Vm::new(compile("main;\n1 / 0;"));
        let result = vm.run().unwrap();
        assert_eq!(result, Value::Real(f64::INFINITY));
    }

    #[test]
    fn integer_addition_wraps_on_overflow() {
        let mut vm = Vm::new(compile(&format!("main;\n{} + 1;", i64::MAX)));
        let result = vm.run().unwrap();
        assert_eq!(result, Value::Int(i64::MIN));
    }

    #[test]
    fn calling_a_non_function_reports_notfct() {
        let mut vm = Vm::new(compile("main;\ndef n = 1;\nn();"));
        let err = vm.run().unwrap_err();
        assert_eq!(err.status, crate::error::VmStatus::NotFct);
    }

    #[test]
    fn array_indexing_reads_the_requested_element() {
        let mut vm = Vm::new(compile("main;\n[10, 20, 30][1];"));
        let result = vm.run().unwrap();
        assert_eq!(result, Value::Int(20));
    }

    #[test]
    fn display_value_renders_a_string_by_content_and_an_array_recursively() {
        let mut vm = Vm::new(compile("main;\n[1, 'two', 3];"));
        let result = vm.run().unwrap();
        assert_eq!(vm.display_value(result), "[1, two, 3]");
    }

    #[test]
    fn ffi_bound_name_is_callable_from_silk() {
        let program = compile("main;\ndll 'native' {\n  fun double(x) :: int;\n}\ndouble(21);");
        let mut vm = Vm::new(program);
        vm.ffi_mut().bind("double", |_heap, args, ret| match args {
            [Value::Int(n)] => {
                *ret = Value::Int(n * 2);
                crate::ffi::FfiStatus::Ok
            }
            _ => crate::ffi::FfiStatus::TypeMismatch,
        });
        // The binding above didn't exist yet when `new` ran `bind_externs`
        // the first time; re-run it now so the global picks it up.
        vm.bind_externs();
        let result = vm.run().unwrap();
        assert_eq!(result, Value::Int(42));
    }
}
