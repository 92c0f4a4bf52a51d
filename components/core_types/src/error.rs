//! Execution result codes and interpreter faults.
//!
//! Faults never unwind through user code: every fallible interpreter
//! operation returns a `VmError`, and the execution boundary turns it into
//! the matching `VmResult` code.

use crate::HeapId;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Closed set of result codes produced by an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VmResult {
    /// Execution finished normally
    Success,
    /// Integer or float division (or modulo) by zero
    DivisionByZero,
    /// Array index outside `0..len`
    ArrayIndexOutOfBounds,
    /// Pop from an empty operand stack (or below the current frame)
    StackUnderflow,
    /// Unrecognised opcode or control transfer outside the function
    InvalidOpcode,
    /// Reference to an array that does not exist
    InvalidHeapId,
    /// Release of an array whose count is already zero
    NegativeRefCount,
    /// `CALL` operand outside the function table
    InvalidFunctionIndex,
    /// Constant-load operand outside the constant table
    InvalidConstantIndex,
    /// Local slot index outside the frame
    InvalidLocalIndex,
    /// Unknown array element type or mismatched element store
    InvalidArrayType,
    /// Operand of the wrong type for an operation
    InvalidValueType,
    /// Call depth limit exceeded
    CallStackOverflow,
    /// Operand stack size limit exceeded
    StackOverflow,
}

impl VmResult {
    /// Whether this code reports a normal termination
    pub fn is_success(self) -> bool {
        self == VmResult::Success
    }

    /// Upper-case name of the code
    pub fn name(self) -> &'static str {
        match self {
            VmResult::Success => "SUCCESS",
            VmResult::DivisionByZero => "DIVISION_BY_ZERO",
            VmResult::ArrayIndexOutOfBounds => "ARRAY_INDEX_OUT_OF_BOUNDS",
            VmResult::StackUnderflow => "STACK_UNDERFLOW",
            VmResult::InvalidOpcode => "INVALID_OPCODE",
            VmResult::InvalidHeapId => "INVALID_HEAP_ID",
            VmResult::NegativeRefCount => "NEGATIVE_REF_COUNT",
            VmResult::InvalidFunctionIndex => "INVALID_FUNCTION_INDEX",
            VmResult::InvalidConstantIndex => "INVALID_CONSTANT_INDEX",
            VmResult::InvalidLocalIndex => "INVALID_LOCAL_INDEX",
            VmResult::InvalidArrayType => "INVALID_ARRAY_TYPE",
            VmResult::InvalidValueType => "INVALID_VALUE_TYPE",
            VmResult::CallStackOverflow => "CALL_STACK_OVERFLOW",
            VmResult::StackOverflow => "STACK_OVERFLOW",
        }
    }
}

impl fmt::Display for VmResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A fault raised while executing bytecode.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmError {
    /// Division or modulo by zero
    #[error("division by zero")]
    DivisionByZero,

    /// Array index outside bounds
    #[error("index {index} out of bounds for array of length {length}")]
    ArrayIndexOutOfBounds {
        /// Requested index
        index: i64,
        /// Array length
        length: usize,
    },

    /// Operand stack underflow
    #[error("operand stack underflow")]
    StackUnderflow,

    /// Unknown opcode byte
    #[error("invalid opcode 0x{opcode:02x} at address {address}")]
    InvalidOpcode {
        /// Raw opcode byte
        opcode: u8,
        /// Instruction address
        address: usize,
    },

    /// Control flow left the instruction stream
    #[error("jump from {address} to {target} leaves the function ({length} instructions)")]
    InvalidJumpTarget {
        /// Jump instruction address
        address: usize,
        /// Computed target address
        target: i64,
        /// Number of instructions in the function
        length: usize,
    },

    /// Stale or unknown heap id
    #[error("invalid heap id {0}")]
    InvalidHeapId(HeapId),

    /// Release of an array with no outstanding references
    #[error("negative reference count for heap id {0}")]
    NegativeRefCount(HeapId),

    /// Function index outside the function table
    #[error("invalid function index {0}")]
    InvalidFunctionIndex(usize),

    /// Constant index outside the constant table
    #[error("invalid constant index {0}")]
    InvalidConstantIndex(usize),

    /// Local index outside the frame's slot array
    #[error("invalid local index {index} (frame has {count} slots)")]
    InvalidLocalIndex {
        /// Requested slot
        index: usize,
        /// Number of slots in the frame
        count: usize,
    },

    /// Bad element type tag or element of the wrong type
    #[error("invalid array element type: {0}")]
    InvalidArrayType(String),

    /// Operand of the wrong type
    #[error("invalid value type: expected {expected}, found {found}")]
    InvalidValueType {
        /// Expected type name
        expected: &'static str,
        /// Actual type name
        found: &'static str,
    },

    /// Call depth limit exceeded
    #[error("call stack overflow (limit {0})")]
    CallStackOverflow(usize),

    /// Operand stack limit exceeded
    #[error("operand stack overflow (limit {0})")]
    StackOverflow(usize),
}

impl VmError {
    /// The result code reported for this fault
    pub fn code(&self) -> VmResult {
        match self {
            VmError::DivisionByZero => VmResult::DivisionByZero,
            VmError::ArrayIndexOutOfBounds { .. } => VmResult::ArrayIndexOutOfBounds,
            VmError::StackUnderflow => VmResult::StackUnderflow,
            VmError::InvalidOpcode { .. } | VmError::InvalidJumpTarget { .. } => {
                VmResult::InvalidOpcode
            }
            VmError::InvalidHeapId(_) => VmResult::InvalidHeapId,
            VmError::NegativeRefCount(_) => VmResult::NegativeRefCount,
            VmError::InvalidFunctionIndex(_) => VmResult::InvalidFunctionIndex,
            VmError::InvalidConstantIndex(_) => VmResult::InvalidConstantIndex,
            VmError::InvalidLocalIndex { .. } => VmResult::InvalidLocalIndex,
            VmError::InvalidArrayType(_) => VmResult::InvalidArrayType,
            VmError::InvalidValueType { .. } => VmResult::InvalidValueType,
            VmError::CallStackOverflow(_) => VmResult::CallStackOverflow,
            VmError::StackOverflow(_) => VmResult::StackOverflow,
        }
    }

    /// Shorthand for a type mismatch
    pub fn type_mismatch(expected: &'static str, found: &crate::Value) -> Self {
        VmError::InvalidValueType {
            expected,
            found: found.type_name(),
        }
    }
}

impl From<VmError> for VmResult {
    fn from(err: VmError) -> Self {
        err.code()
    }
}

/// Result type for interpreter and memory-manager operations
pub type VmOutcome<T> = Result<T, VmError>;
