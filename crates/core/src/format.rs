//! The `SILKEXE` binary file format
//!
//! ```text
//! "SILKEXE"            literal 7 bytes
//! version              u16 LE
//! ins_len              u32 LE
//! rodata_len           u32 LE
//! symbol_len           u32 LE
//! bytes[ins_len]       raw instructions
//! rodata[rodata_len]   tagged values
//! symbols[symbol_len]  NUL-terminated strings
//! checksum             u32 LE (FNV-1a over bytes and symbol strings)
//! "SILKEND"            literal 7 bytes
//! ```
//!
//! All multi-byte integers are written little-endian regardless of host
//! endianness (`to_le_bytes` / `from_le_bytes` already normalize this,
//! so no explicit byte-swap is needed on big-endian hosts). A reader
//! rejects any mismatch in the header, version, a section length, a
//! value tag, the checksum, or the footer as "malformed executable"
//! rather than guessing at recovery.

use crate::fnv;
use crate::object::{HeapObject, SilkFunction};
use crate::program::{Constant, Program};
use crate::symbol::SymbolTable;
use crate::value::Value;
use std::fmt;

const MAGIC_HEADER: &[u8; 7] = b"SILKEXE";
const MAGIC_FOOTER: &[u8; 7] = b"SILKEND";

/// The format version written by this crate. `REAL` values are lossily
/// quantized (see [`encode_value`]); bumping this is the documented
/// escape hatch if a future version switches to verbatim IEEE-754 bits.
pub const FORMAT_VERSION: u16 = 1;

const TAG_VOID: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_REAL: u8 = 3;
const TAG_CHAR: u8 = 4;
const TAG_STR: u8 = 5;
const TAG_OBJ: u8 = 6;

const OBJ_TAG_FUNCTION: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    Malformed(String),
    UnsupportedVersion(u16),
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::Malformed(msg) => write!(f, "malformed executable: {msg}"),
            FormatError::UnsupportedVersion(v) => {
                write!(f, "malformed executable: unsupported version {v}")
            }
        }
    }
}

impl std::error::Error for FormatError {}

/// A scaling factor matching the specification's ×10¹⁰ fixed-point
/// encoding for `REAL` constants.
const REAL_SCALE: f64 = 1e10;

fn encode_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Void => out.push(TAG_VOID),
        Value::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(u8::from(*b));
        }
        Value::Int(n) => {
            out.push(TAG_INT);
            out.extend_from_slice(&n.to_le_bytes());
        }
        Value::Real(r) => {
            out.push(TAG_REAL);
            let integral = r.trunc() as i64 as u32;
            let fraction = ((r.fract().abs()) * REAL_SCALE) as u32;
            out.extend_from_slice(&integral.to_le_bytes());
            out.extend_from_slice(&fraction.to_le_bytes());
        }
        Value::Char(c) => {
            out.push(TAG_CHAR);
            out.extend_from_slice(&(*c as u32).to_le_bytes());
        }
        Value::Obj(_) => {
            // Inline string/object literals are encoded as `Constant::Object`
            // entries in rodata, never as a live heap reference.
            unreachable!("bare heap references are not serializable; use Constant::Object")
        }
    }
}

fn decode_value(bytes: &[u8], pos: &mut usize) -> Result<Value, FormatError> {
    let tag = *bytes
        .get(*pos)
        .ok_or_else(|| FormatError::Malformed("truncated value tag".into()))?;
    *pos += 1;
    match tag {
        TAG_VOID => Ok(Value::Void),
        TAG_BOOL => {
            let b = read_u8(bytes, pos)?;
            Ok(Value::Bool(b != 0))
        }
        TAG_INT => {
            let n = read_i64(bytes, pos)?;
            Ok(Value::Int(n))
        }
        TAG_REAL => {
            let integral = read_u32(bytes, pos)? as i64;
            let fraction = read_u32(bytes, pos)?;
            let value = integral as f64 + (fraction as f64) / REAL_SCALE;
            Ok(Value::Real(value))
        }
        TAG_CHAR => {
            let scalar = read_u32(bytes, pos)?;
            let c = char::from_u32(scalar)
                .ok_or_else(|| FormatError::Malformed("invalid char scalar value".into()))?;
            Ok(Value::Char(c))
        }
        other => Err(FormatError::Malformed(format!(
            "unexpected inline value tag {other:#x}"
        ))),
    }
}

fn encode_constant(constant: &Constant, out: &mut Vec<u8>) {
    match constant {
        Constant::Value(Value::Obj(_)) => {
            unreachable!("bare heap references are not serializable")
        }
        Constant::Value(value) => encode_value(value, out),
        Constant::Object(HeapObject::String(s)) => {
            out.push(TAG_STR);
            out.extend_from_slice(s.bytes.as_bytes());
            out.push(0);
        }
        Constant::Object(HeapObject::Function(function)) => {
            out.push(TAG_OBJ);
            out.push(OBJ_TAG_FUNCTION);
            out.extend_from_slice(function.name.as_bytes());
            out.push(0);
            out.push(function.arity);
            out.extend_from_slice(&(function.bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(&function.bytes);
        }
        Constant::Object(other) => {
            unreachable!(
                "{:?} is not serializable; only strings and functions may live in rodata",
                other.tag()
            )
        }
    }
}

fn decode_constant(bytes: &[u8], pos: &mut usize) -> Result<Constant, FormatError> {
    let tag = *bytes
        .get(*pos)
        .ok_or_else(|| FormatError::Malformed("truncated constant tag".into()))?;
    match tag {
        TAG_STR => {
            *pos += 1;
            let s = read_nul_terminated(bytes, pos)?;
            Ok(Constant::Object(HeapObject::String(
                crate::object::SilkString::new(s),
            )))
        }
        TAG_OBJ => {
            *pos += 1;
            let obj_tag = read_u8(bytes, pos)?;
            if obj_tag != OBJ_TAG_FUNCTION {
                return Err(FormatError::Malformed(format!(
                    "object tag {obj_tag:#x} is not serializable"
                )));
            }
            let name = read_nul_terminated(bytes, pos)?;
            let arity = read_u8(bytes, pos)?;
            let len = read_u32(bytes, pos)? as usize;
            let fn_bytes = bytes
                .get(*pos..*pos + len)
                .ok_or_else(|| FormatError::Malformed("truncated function body".into()))?
                .to_vec();
            *pos += len;
            Ok(Constant::Object(HeapObject::Function(SilkFunction {
                name,
                arity,
                bytes: fn_bytes,
            })))
        }
        _ => Ok(Constant::Value(decode_value(bytes, pos)?)),
    }
}

fn read_u8(bytes: &[u8], pos: &mut usize) -> Result<u8, FormatError> {
    let b = *bytes
        .get(*pos)
        .ok_or_else(|| FormatError::Malformed("truncated byte".into()))?;
    *pos += 1;
    Ok(b)
}

fn read_u32(bytes: &[u8], pos: &mut usize) -> Result<u32, FormatError> {
    let slice = bytes
        .get(*pos..*pos + 4)
        .ok_or_else(|| FormatError::Malformed("truncated u32".into()))?;
    *pos += 4;
    Ok(u32::from_le_bytes(slice.try_into().unwrap()))
}

fn read_i64(bytes: &[u8], pos: &mut usize) -> Result<i64, FormatError> {
    let slice = bytes
        .get(*pos..*pos + 8)
        .ok_or_else(|| FormatError::Malformed("truncated i64".into()))?;
    *pos += 8;
    Ok(i64::from_le_bytes(slice.try_into().unwrap()))
}

fn read_nul_terminated(bytes: &[u8], pos: &mut usize) -> Result<String, FormatError> {
    let start = *pos;
    let end = bytes[start..]
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| FormatError::Malformed("unterminated string".into()))?
        + start;
    let s = String::from_utf8(bytes[start..end].to_vec())
        .map_err(|_| FormatError::Malformed("string is not valid UTF-8".into()))?;
    *pos = end + 1;
    Ok(s)
}

fn encode_symbols(symbols: &SymbolTable, out: &mut Vec<u8>) {
    for symbol in symbols.iter() {
        out.extend_from_slice(symbol.name.as_bytes());
        out.push(0);
    }
}

fn decode_symbols(bytes: &[u8], count: usize) -> Result<SymbolTable, FormatError> {
    let mut table = SymbolTable::new();
    let mut pos = 0;
    for _ in 0..count {
        let name = read_nul_terminated(bytes, &mut pos)?;
        table.intern(&name);
    }
    Ok(table)
}

/// Serialize `program` to the `SILKEXE` binary format.
pub fn write_program(program: &Program) -> Vec<u8> {
    let mut rodata_bytes = Vec::new();
    for constant in &program.rodata {
        encode_constant(constant, &mut rodata_bytes);
    }

    let mut symbol_bytes = Vec::new();
    encode_symbols(&program.symbols, &mut symbol_bytes);

    let checksum = fnv::hash_seeded(fnv::hash(&program.bytes), &symbol_bytes);

    let mut out = Vec::new();
    out.extend_from_slice(MAGIC_HEADER);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&(program.bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&(rodata_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&(symbol_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&program.bytes);
    out.extend_from_slice(&rodata_bytes);
    out.extend_from_slice(&symbol_bytes);
    out.extend_from_slice(&(checksum as u32).to_le_bytes());
    out.extend_from_slice(MAGIC_FOOTER);
    out
}

/// Deserialize a `SILKEXE` file, validating the header, version, every
/// section length, every value tag, the checksum, and the footer.
pub fn read_program(bytes: &[u8]) -> Result<Program, FormatError> {
    let mut pos = 0usize;

    let header = bytes
        .get(0..7)
        .ok_or_else(|| FormatError::Malformed("file too short for header".into()))?;
    if header != MAGIC_HEADER {
        return Err(FormatError::Malformed("bad magic header".into()));
    }
    pos += 7;

    let version = u16::from_le_bytes(
        bytes
            .get(pos..pos + 2)
            .ok_or_else(|| FormatError::Malformed("truncated version".into()))?
            .try_into()
            .unwrap(),
    );
    pos += 2;
    if version != FORMAT_VERSION {
        return Err(FormatError::UnsupportedVersion(version));
    }

    let ins_len = read_u32(bytes, &mut pos)? as usize;
    let rodata_len = read_u32(bytes, &mut pos)? as usize;
    let symbol_len = read_u32(bytes, &mut pos)? as usize;

    let ins_bytes = bytes
        .get(pos..pos + ins_len)
        .ok_or_else(|| FormatError::Malformed("truncated instruction section".into()))?
        .to_vec();
    pos += ins_len;

    let rodata_bytes = bytes
        .get(pos..pos + rodata_len)
        .ok_or_else(|| FormatError::Malformed("truncated rodata section".into()))?;
    let rodata_section = rodata_bytes.to_vec();
    pos += rodata_len;

    let symbol_bytes = bytes
        .get(pos..pos + symbol_len)
        .ok_or_else(|| FormatError::Malformed("truncated symbol section".into()))?;
    let symbol_section = symbol_bytes.to_vec();
    pos += symbol_len;

    let stored_checksum = read_u32(bytes, &mut pos)?;
    let computed_checksum =
        fnv::hash_seeded(fnv::hash(&ins_bytes), &symbol_section) as u32;
    if stored_checksum != computed_checksum {
        return Err(FormatError::Malformed("checksum mismatch".into()));
    }

    let footer = bytes
        .get(pos..pos + 7)
        .ok_or_else(|| FormatError::Malformed("truncated footer".into()))?;
    if footer != MAGIC_FOOTER {
        return Err(FormatError::Malformed("bad magic footer".into()));
    }

    let mut rodata = Vec::new();
    let mut rpos = 0;
    while rpos < rodata_section.len() {
        rodata.push(decode_constant(&rodata_section, &mut rpos)?);
    }

    let symbol_count = {
        // Re-walk the symbol section to count entries (each is NUL-terminated).
        symbol_section.iter().filter(|&&b| b == 0).count()
    };
    let symbols = decode_symbols(&symbol_section, symbol_count)?;

    Ok(Program {
        bytes: ins_bytes,
        rodata,
        symbols,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::SilkString;
    use crate::opcode::Opcode;

    fn sample_program() -> Program {
        let mut program = Program::new();
        program.bytes = vec![Opcode::Val1 as u8, 0, Opcode::Fin as u8];
        program.push_constant(Constant::Value(Value::Int(49)));
        program.push_constant(Constant::Object(HeapObject::String(SilkString::new(
            "hello, world",
        ))));
        program.symbols.intern("square");
        program
    }

    #[test]
    fn round_trips_byte_for_byte_modulo_real_quantization() {
        let program = sample_program();
        let bytes = write_program(&program);
        let read_back = read_program(&bytes).expect("should parse");
        assert_eq!(read_back.bytes, program.bytes);
        assert_eq!(read_back.rodata, program.rodata);
        assert_eq!(read_back.symbols, program.symbols);
    }

    #[test]
    fn single_bit_flip_in_bytes_changes_the_checksum() {
        let program = sample_program();
        let mut bytes = write_program(&program);
        // Flip a bit inside the instruction section (right after the 17-byte header).
        bytes[17] ^= 0x01;
        let err = read_program(&bytes).unwrap_err();
        assert!(matches!(err, FormatError::Malformed(_)));
    }

    #[test]
    fn rejects_bad_header() {
        let mut bytes = write_program(&sample_program());
        bytes[0] = b'X';
        assert!(read_program(&bytes).is_err());
    }

    #[test]
    fn rejects_bad_footer() {
        let mut bytes = write_program(&sample_program());
        let len = bytes.len();
        bytes[len - 1] = b'X';
        assert!(read_program(&bytes).is_err());
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut bytes = write_program(&sample_program());
        bytes[7] = 0xFF;
        assert!(matches!(
            read_program(&bytes),
            Err(FormatError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn real_quantization_is_lossy_but_close() {
        let mut program = Program::new();
        let idx = program.push_constant(Constant::Value(Value::Real(3.14159)));
        let bytes = write_program(&program);
        let read_back = read_program(&bytes).unwrap();
        match &read_back.rodata[idx] {
            Constant::Value(Value::Real(r)) => assert!((r - 3.14159).abs() < 1e-9),
            other => panic!("expected Real, got {other:?}"),
        }
    }
}
