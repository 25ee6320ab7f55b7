//! Heap objects
//!
//! Every object lives behind a [`crate::value::HeapRef`] handle owned by
//! the VM's garbage collector (see `silk-runtime::gc`). This module only
//! defines the tagged payloads and the traversal rules the collector
//! needs (`children`); it knows nothing about allocation or reachability
//! bookkeeping.

use crate::fnv;
use crate::value::{HeapRef, Value};

/// Maximum number of components a vector literal may hold (`VEC n` limits
/// `n` to a byte, and the object mirrors that bound).
pub const MAX_VECTOR_CARDINALITY: usize = 255;

/// Sentinel stored in a dictionary value-slot with a `Value::Void` key to
/// mark a deleted (tombstone) entry, distinguishing it from a genuinely
/// empty slot (`Value::Void` key *and* value).
pub const TOMBSTONE_MARK: i64 = 0x46;

/// Dictionaries rehash once they would exceed this load factor.
pub const MAX_LOAD_FACTOR: f64 = 0.65;

#[derive(Debug, Clone, PartialEq)]
pub enum HeapObject {
    /// Immutable, FNV-1a-hashed UTF-8 string.
    String(SilkString),
    /// A growable, heterogeneous array of `Value`.
    Array(Vec<Value>),
    /// A fixed-cardinality array of `f64`, capped at
    /// [`MAX_VECTOR_CARDINALITY`].
    Vector(Vec<f64>),
    /// An open-addressed hash table, see [`Dictionary`].
    Dictionary(Dictionary),
    /// A compiled function's instruction buffer.
    Function(SilkFunction),
    /// A function plus its captured upvalues.
    Closure(Closure),
    /// A boxed `Value`, used when a local must outlive its stack frame
    /// because a closure captured it by reference.
    Heapval(Value),
    /// An opaque handle to a host function; equality is pointer identity.
    FfiFunction(FfiHandle),
    /// An opaque handle to host-owned memory; equality is pointer identity.
    FfiPointer(FfiHandle),
}

impl HeapObject {
    /// Collection truthiness: empty string/array/dictionary are falsy;
    /// everything else (including a zero-length vector, which has no
    /// natural "emptiness" reading in the original language) is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            HeapObject::String(s) => !s.bytes.is_empty(),
            HeapObject::Array(items) => !items.is_empty(),
            HeapObject::Dictionary(dict) => dict.len() != 0,
            HeapObject::Vector(_)
            | HeapObject::Function(_)
            | HeapObject::Closure(_)
            | HeapObject::Heapval(_)
            | HeapObject::FfiFunction(_)
            | HeapObject::FfiPointer(_) => true,
        }
    }

    /// Every `Value` directly owned by this object, for the GC's mark
    /// phase. Does not recurse into the heap graph; the collector does
    /// that by following each returned reference in turn.
    pub fn children(&self) -> Vec<Value> {
        match self {
            HeapObject::String(_) | HeapObject::Vector(_) => Vec::new(),
            HeapObject::Array(items) => items.clone(),
            HeapObject::Dictionary(dict) => dict.entries_values(),
            HeapObject::Function(_) => Vec::new(),
            HeapObject::Closure(closure) => {
                let mut out = vec![Value::Obj(closure.function)];
                out.extend(closure.upvalues.iter().copied());
                out
            }
            HeapObject::Heapval(v) => vec![*v],
            HeapObject::FfiFunction(_) | HeapObject::FfiPointer(_) => Vec::new(),
        }
    }

    pub fn tag(&self) -> ObjectTag {
        match self {
            HeapObject::String(_) => ObjectTag::String,
            HeapObject::Array(_) => ObjectTag::Array,
            HeapObject::Vector(_) => ObjectTag::Vector,
            HeapObject::Dictionary(_) => ObjectTag::Dictionary,
            HeapObject::Function(_) => ObjectTag::Function,
            HeapObject::Closure(_) => ObjectTag::Closure,
            HeapObject::Heapval(_) => ObjectTag::Heapval,
            HeapObject::FfiFunction(_) => ObjectTag::FfiFunction,
            HeapObject::FfiPointer(_) => ObjectTag::FfiPointer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ObjectTag {
    String = 0,
    Array = 1,
    Vector = 2,
    Dictionary = 3,
    Function = 4,
    Closure = 5,
    Heapval = 6,
    FfiFunction = 7,
    FfiPointer = 8,
}

impl ObjectTag {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(ObjectTag::String),
            1 => Some(ObjectTag::Array),
            2 => Some(ObjectTag::Vector),
            3 => Some(ObjectTag::Dictionary),
            4 => Some(ObjectTag::Function),
            5 => Some(ObjectTag::Closure),
            6 => Some(ObjectTag::Heapval),
            7 => Some(ObjectTag::FfiFunction),
            8 => Some(ObjectTag::FfiPointer),
            _ => None,
        }
    }
}

/// An immutable, length-prefixed, FNV-1a-hashed string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SilkString {
    pub bytes: String,
    pub hash: u64,
}

impl SilkString {
    pub fn new(bytes: impl Into<String>) -> Self {
        let bytes = bytes.into();
        let hash = fnv::hash(bytes.as_bytes());
        SilkString { bytes, hash }
    }

    pub fn concat(a: &SilkString, b: &SilkString) -> Self {
        let mut s = String::with_capacity(a.bytes.len() + b.bytes.len());
        s.push_str(&a.bytes);
        s.push_str(&b.bytes);
        SilkString::new(s)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Open-addressed `(Value, Value)` hash table.
///
/// `Value::Void` in the key slot marks an empty slot. A tombstone is a
/// `Value::Void` key paired with a `Value::Int(TOMBSTONE_MARK)` value,
/// which keeps probe chains intact across deletions without requiring a
/// separate "occupied" bitmap.
#[derive(Debug, Clone, PartialEq)]
pub struct Dictionary {
    slots: Vec<(Value, Value)>,
    len: usize,
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl Dictionary {
    const INITIAL_CAPACITY: usize = 8;

    pub fn new() -> Self {
        Dictionary {
            slots: vec![(Value::Void, Value::Void); Self::INITIAL_CAPACITY],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn is_tombstone(key: &Value, value: &Value) -> bool {
        matches!(key, Value::Void) && matches!(value, Value::Int(n) if *n == TOMBSTONE_MARK)
    }

    fn is_empty_slot(key: &Value, value: &Value) -> bool {
        matches!(key, Value::Void) && !Self::is_tombstone(key, value)
    }

    fn hash_of(key: &Value) -> u64 {
        match key {
            Value::Void => 0,
            Value::Bool(b) => u64::from(*b),
            Value::Int(n) => *n as u64,
            Value::Real(r) => r.to_bits(),
            Value::Char(c) => *c as u64,
            Value::Obj(r) => *r as u64,
        }
    }

    fn keys_equal(a: &Value, b: &Value) -> bool {
        a == b
    }

    pub fn insert(&mut self, key: Value, value: Value) {
        if self.needs_rehash() {
            self.rehash();
        }
        let cap = self.slots.len();
        let mut idx = (Self::hash_of(&key) as usize) % cap;
        let mut first_tombstone: Option<usize> = None;
        loop {
            let (slot_key, slot_value) = self.slots[idx];
            if Self::is_empty_slot(&slot_key, &slot_value) {
                let target = first_tombstone.unwrap_or(idx);
                self.slots[target] = (key, value);
                self.len += 1;
                return;
            }
            if Self::is_tombstone(&slot_key, &slot_value) {
                if first_tombstone.is_none() {
                    first_tombstone = Some(idx);
                }
            } else if Self::keys_equal(&slot_key, &key) {
                self.slots[idx] = (key, value);
                return;
            }
            idx = (idx + 1) % cap;
        }
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        let cap = self.slots.len();
        if cap == 0 {
            return None;
        }
        let mut idx = (Self::hash_of(key) as usize) % cap;
        for _ in 0..cap {
            let (slot_key, slot_value) = &self.slots[idx];
            if Self::is_empty_slot(slot_key, slot_value) {
                return None;
            }
            if !Self::is_tombstone(slot_key, slot_value) && Self::keys_equal(slot_key, key) {
                return Some(*slot_value);
            }
            idx = (idx + 1) % cap;
        }
        None
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        let cap = self.slots.len();
        let mut idx = (Self::hash_of(key) as usize) % cap;
        for _ in 0..cap {
            let (slot_key, slot_value) = self.slots[idx];
            if Self::is_empty_slot(&slot_key, &slot_value) {
                return None;
            }
            if !Self::is_tombstone(&slot_key, &slot_value) && Self::keys_equal(&slot_key, key) {
                self.slots[idx] = (Value::Void, Value::Int(TOMBSTONE_MARK));
                self.len -= 1;
                return Some(slot_value);
            }
            idx = (idx + 1) % cap;
        }
        None
    }

    fn needs_rehash(&self) -> bool {
        let cap = self.slots.len();
        cap == 0 || (self.len + 1) as f64 / cap as f64 > MAX_LOAD_FACTOR
    }

    fn rehash(&mut self) {
        let new_cap = (self.slots.len() * 2).max(Self::INITIAL_CAPACITY);
        let old = std::mem::replace(&mut self.slots, vec![(Value::Void, Value::Void); new_cap]);
        self.len = 0;
        for (key, value) in old {
            if !Self::is_empty_slot(&key, &value) && !Self::is_tombstone(&key, &value) {
                self.insert(key, value);
            }
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (Value, Value)> + '_ {
        self.slots
            .iter()
            .filter(|(k, v)| !Self::is_empty_slot(k, v) && !Self::is_tombstone(k, v))
            .copied()
    }

    fn entries_values(&self) -> Vec<Value> {
        self.entries().flat_map(|(k, v)| [k, v]).collect()
    }
}

/// A compiled function's instruction buffer, stored as a heap object so
/// it can live in `rodata` and be referenced by `VAL*`.
#[derive(Debug, Clone, PartialEq)]
pub struct SilkFunction {
    pub name: String,
    pub arity: u8,
    pub bytes: Vec<u8>,
}

/// A function plus the upvalue slots it closed over.
///
/// Upvalue capture is not yet emitted by the compiler (see
/// `DESIGN.md`); the representation exists so the runtime contract is
/// in place once capture lands.
#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    pub function: HeapRef,
    pub upvalues: Vec<Value>,
}

/// An opaque foreign handle. Equality and hashing are by identity only;
/// the wrapped pointer/slot is never dereferenced by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FfiHandle(pub usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_concat_hashes_like_a_fresh_string() {
        let a = SilkString::new("hello, ");
        let b = SilkString::new("world");
        let c = SilkString::concat(&a, &b);
        assert_eq!(c.bytes, "hello, world");
        assert_eq!(c.hash, fnv::hash(b"hello, world"));
        assert_eq!(c.len(), 12);
    }

    #[test]
    fn dictionary_insert_get_remove_roundtrip() {
        let mut dict = Dictionary::new();
        dict.insert(Value::Int(1), Value::Bool(true));
        dict.insert(Value::Int(2), Value::Bool(false));
        assert_eq!(dict.get(&Value::Int(1)), Some(Value::Bool(true)));
        assert_eq!(dict.len(), 2);
        assert_eq!(dict.remove(&Value::Int(1)), Some(Value::Bool(true)));
        assert_eq!(dict.get(&Value::Int(1)), None);
        assert_eq!(dict.len(), 1);
        // Removed slot must not break the probe chain to the survivor.
        assert_eq!(dict.get(&Value::Int(2)), Some(Value::Bool(false)));
    }

    #[test]
    fn dictionary_rehashes_past_the_load_factor() {
        let mut dict = Dictionary::new();
        for i in 0..100 {
            dict.insert(Value::Int(i), Value::Int(i * 2));
        }
        assert_eq!(dict.len(), 100);
        for i in 0..100 {
            assert_eq!(dict.get(&Value::Int(i)), Some(Value::Int(i * 2)));
        }
    }

    #[test]
    fn empty_collections_are_falsy() {
        assert!(!HeapObject::String(SilkString::new("")).is_truthy());
        assert!(!HeapObject::Array(Vec::new()).is_truthy());
        assert!(!HeapObject::Dictionary(Dictionary::new()).is_truthy());
        assert!(HeapObject::Vector(Vec::new()).is_truthy());
    }
}
