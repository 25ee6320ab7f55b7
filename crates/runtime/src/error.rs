//! VM status codes and the error type the execution loop raises
//!
//! Mirrors the original VM's four-way halt status (`OK`, `FIN`,
//! `INVTYP`, `INVA`, `NOTFCT`) but surfaces it the idiomatic way: a
//! `Result<Value, RuntimeError>` from [`crate::vm::Vm::run`] rather than
//! a status field polled after the fact.

use silk_core::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmStatus {
    /// Still running; never observed outside the loop itself.
    Ok,
    /// Halted cleanly via `FIN`.
    Fin,
    /// An operation received operand types it doesn't support.
    InvTyp,
    /// An operand value was out of range for the operation (e.g. an
    /// out-of-bounds index, a call to an undefined symbol).
    Inva,
    /// `CAL` targeted a value that is not a function or closure.
    NotFct,
}

impl fmt::Display for VmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VmStatus::Ok => "OK",
            VmStatus::Fin => "FIN",
            VmStatus::InvTyp => "INVTYP",
            VmStatus::Inva => "INVA",
            VmStatus::NotFct => "NOTFCT",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub status: VmStatus,
    pub message: String,
}

impl RuntimeError {
    pub fn new(status: VmStatus, message: impl Into<String>) -> Self {
        RuntimeError {
            status,
            message: message.into(),
        }
    }

    pub fn inv_typ(message: impl Into<String>) -> Self {
        Self::new(VmStatus::InvTyp, message)
    }

    pub fn inva(message: impl Into<String>) -> Self {
        Self::new(VmStatus::Inva, message)
    }

    pub fn not_fct(value: &Value) -> Self {
        Self::new(
            VmStatus::NotFct,
            format!("cannot call a value of type '{}'", value.type_name()),
        )
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for RuntimeError {}
