//! Errors raised while building, decoding or rewriting bytecode

use thiserror::Error;

/// Encoding and decoding errors.
///
/// These are programmer errors of the producer of the bytecode (or of a
/// rewrite), distinct from the runtime faults reported by the interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BytecodeError {
    /// Patch target is not a fully emitted instruction
    #[error("address {address} out of range ({emitted} instructions emitted)")]
    AddressOutOfRange {
        /// Requested address
        address: usize,
        /// Number of complete instructions
        emitted: usize,
    },

    /// Opcode byte not present in the opcode table
    #[error("unknown opcode 0x{opcode:02x} at address {address}")]
    UnknownOpcode {
        /// Raw byte
        opcode: u8,
        /// Instruction address
        address: usize,
    },

    /// Byte stream length is not a multiple of the instruction size
    #[error("instruction stream of {0} bytes is not a whole number of instructions")]
    TruncatedStream(usize),

    /// Relative jump lands outside the function
    #[error("jump at {address} targets {target}, outside 0..={length}")]
    JumpOutOfRange {
        /// Jump instruction address
        address: usize,
        /// Computed target
        target: i64,
        /// Instruction count
        length: usize,
    },

    /// Rewritten jump offset does not fit the 24-bit operand
    #[error("jump offset {0} does not fit in 24 bits")]
    OffsetOverflow(i64),
}
