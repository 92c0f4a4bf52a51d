//! Tests for the opcode table

use bytecode_system::{Opcode, OperandKind};
use std::collections::HashSet;

#[test]
fn test_opcode_bytes_are_unique() {
    let bytes: HashSet<u8> = Opcode::ALL.iter().map(|op| op.byte()).collect();
    assert_eq!(bytes.len(), Opcode::ALL.len());
}

#[test]
fn test_every_byte_decodes_consistently() {
    for byte in 0..=u8::MAX {
        if let Some(op) = Opcode::from_byte(byte) {
            assert_eq!(op.byte(), byte);
        }
    }
}

#[test]
fn test_operand_kinds() {
    assert_eq!(Opcode::LoadLocal.operand_kind(), OperandKind::Local);
    assert_eq!(Opcode::IncLocal.operand_kind(), OperandKind::Local);
    assert_eq!(Opcode::PushFloat.operand_kind(), OperandKind::FloatConstant);
    assert_eq!(Opcode::NewArray.operand_kind(), OperandKind::ElementType);
    assert_eq!(Opcode::Call.operand_kind(), OperandKind::Function);
    assert_eq!(Opcode::JumpIfFalse.operand_kind(), OperandKind::RelativeJump);
    assert_eq!(Opcode::AddInt.operand_kind(), OperandKind::None);
}

#[test]
fn test_display_uses_mnemonic() {
    assert_eq!(Opcode::ReturnVoid.to_string(), "RETURN_VOID");
    assert_eq!(Opcode::GeFloat.to_string(), "GE_FLOAT");
}
