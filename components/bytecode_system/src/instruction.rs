//! Fixed-width instruction encoding
//!
//! An instruction is a 4-byte record: one opcode byte followed by a 24-bit
//! big-endian operand. Addresses count instructions, not bytes.

use crate::error::BytecodeError;
use crate::opcode::Opcode;
use std::fmt;

/// Size of one encoded instruction in bytes
pub const INSTRUCTION_SIZE: usize = 4;

/// Mask selecting the 24 operand bits
pub const OPERAND_MASK: u32 = 0x00ff_ffff;

/// Largest positive value representable by a signed 24-bit operand
pub const MAX_SIGNED_OPERAND: i64 = 0x7f_ffff;

/// Smallest value representable by a signed 24-bit operand
pub const MIN_SIGNED_OPERAND: i64 = -0x80_0000;

/// Recover a signed value from a 24-bit operand
///
/// ```
/// use bytecode_system::instruction::sign_extend_24;
///
/// assert_eq!(sign_extend_24(0x00_0005), 5);
/// assert_eq!(sign_extend_24(0xff_fffb), -5);
/// ```
pub fn sign_extend_24(operand: u32) -> i32 {
    (((operand & OPERAND_MASK) << 8) as i32) >> 8
}

/// A decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// The opcode
    pub opcode: Opcode,
    /// Raw 24-bit operand
    pub operand: u32,
}

impl Instruction {
    /// Create an instruction; the operand is truncated to 24 bits
    pub fn new(opcode: Opcode, operand: i64) -> Self {
        Self {
            opcode,
            operand: (operand as u32) & OPERAND_MASK,
        }
    }

    /// Operand interpreted as a signed relative offset
    pub fn signed_operand(&self) -> i32 {
        sign_extend_24(self.operand)
    }

    /// Operand interpreted as an index
    pub fn index(&self) -> usize {
        self.operand as usize
    }

    /// Absolute target of a relative jump located at `address`
    pub fn jump_target(&self, address: usize) -> i64 {
        address as i64 + i64::from(self.signed_operand())
    }

    /// Encode into a 4-byte record
    pub fn encode(&self) -> [u8; INSTRUCTION_SIZE] {
        let [_, b1, b2, b3] = self.operand.to_be_bytes();
        [self.opcode.byte(), b1, b2, b3]
    }

    /// Decode one 4-byte record found at `address`
    pub fn decode(record: [u8; INSTRUCTION_SIZE], address: usize) -> Result<Self, BytecodeError> {
        let opcode = Opcode::from_byte(record[0]).ok_or(BytecodeError::UnknownOpcode {
            opcode: record[0],
            address,
        })?;
        let operand = u32::from_be_bytes([0, record[1], record[2], record[3]]);
        Ok(Self { opcode, operand })
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use crate::opcode::OperandKind;
        match self.opcode.operand_kind() {
            OperandKind::None => write!(f, "{}", self.opcode),
            OperandKind::RelativeJump => write!(f, "{} {:+}", self.opcode, self.signed_operand()),
            _ => write!(f, "{} {}", self.opcode, self.operand),
        }
    }
}

/// Number of whole instructions in a byte stream
pub fn instruction_count(bytes: &[u8]) -> usize {
    bytes.len() / INSTRUCTION_SIZE
}

/// Read the raw record at an instruction address
pub fn record_at(bytes: &[u8], address: usize) -> Option<[u8; INSTRUCTION_SIZE]> {
    let start = address.checked_mul(INSTRUCTION_SIZE)?;
    let slice = bytes.get(start..start + INSTRUCTION_SIZE)?;
    let mut record = [0u8; INSTRUCTION_SIZE];
    record.copy_from_slice(slice);
    Some(record)
}

/// Decode a whole instruction stream
pub fn decode_all(bytes: &[u8]) -> Result<Vec<Instruction>, BytecodeError> {
    if bytes.len() % INSTRUCTION_SIZE != 0 {
        return Err(BytecodeError::TruncatedStream(bytes.len()));
    }
    bytes
        .chunks_exact(INSTRUCTION_SIZE)
        .enumerate()
        .map(|(address, chunk)| {
            let mut record = [0u8; INSTRUCTION_SIZE];
            record.copy_from_slice(chunk);
            Instruction::decode(record, address)
        })
        .collect()
}

/// Append-only builder for an instruction stream
///
/// # Example
///
/// ```
/// use bytecode_system::{InstructionBuilder, Opcode};
///
/// let mut builder = InstructionBuilder::new();
/// let jump = builder.current_address();
/// builder.emit(Opcode::JumpIfFalse, 0);
/// builder.emit(Opcode::Nop, 0);
/// let target = builder.current_address();
/// builder
///     .patch_operand(jump, (target - jump) as i64)
///     .unwrap();
/// let bytes = builder.build();
/// assert_eq!(bytes.len(), 8);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InstructionBuilder {
    bytes: Vec<u8>,
}

impl InstructionBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Append one instruction; the operand is truncated to 24 bits
    pub fn emit(&mut self, opcode: Opcode, operand: i64) -> &mut Self {
        self.bytes
            .extend_from_slice(&Instruction::new(opcode, operand).encode());
        self
    }

    /// Append a decoded instruction unchanged
    pub fn emit_instruction(&mut self, instruction: Instruction) -> &mut Self {
        self.bytes.extend_from_slice(&instruction.encode());
        self
    }

    /// Number of complete instructions emitted so far
    pub fn current_address(&self) -> usize {
        self.bytes.len() / INSTRUCTION_SIZE
    }

    /// Rewrite the operand bytes of an already emitted instruction
    pub fn patch_operand(&mut self, address: usize, operand: i64) -> Result<(), BytecodeError> {
        let emitted = self.current_address();
        if address >= emitted {
            return Err(BytecodeError::AddressOutOfRange { address, emitted });
        }
        let [_, b1, b2, b3] = ((operand as u32) & OPERAND_MASK).to_be_bytes();
        let start = address * INSTRUCTION_SIZE + 1;
        self.bytes[start..start + 3].copy_from_slice(&[b1, b2, b3]);
        Ok(())
    }

    /// Opcode of the most recently emitted instruction
    pub fn last_opcode(&self) -> Option<Opcode> {
        let emitted = self.current_address();
        if emitted == 0 {
            return None;
        }
        Opcode::from_byte(self.bytes[(emitted - 1) * INSTRUCTION_SIZE])
    }

    /// Whether nothing has been emitted
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Finish and return the byte stream
    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}
