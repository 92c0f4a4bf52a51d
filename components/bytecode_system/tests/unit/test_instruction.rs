//! Tests for instruction encoding and the builder

use bytecode_system::instruction::{decode_all, sign_extend_24};
use bytecode_system::{BytecodeError, Instruction, InstructionBuilder, Opcode, INSTRUCTION_SIZE};

#[test]
fn test_emitted_stream_redecodes() {
    let emitted = [
        (Opcode::PushInt, 3),
        (Opcode::StoreLocal, 0),
        (Opcode::LoadLocal, 0),
        (Opcode::JumpIfFalse, 4),
        (Opcode::Call, 0x00ab_cdef),
        (Opcode::Return, 0),
    ];
    let mut builder = InstructionBuilder::new();
    for (op, operand) in emitted {
        builder.emit(op, operand);
    }
    let bytes = builder.build();
    assert_eq!(bytes.len(), emitted.len() * INSTRUCTION_SIZE);

    let decoded = decode_all(&bytes).unwrap();
    for (inst, (op, operand)) in decoded.iter().zip(emitted) {
        assert_eq!(inst.opcode, op);
        assert_eq!(inst.operand as i64, operand);
    }
}

#[test]
fn test_patch_touches_only_operand_bytes() {
    let mut builder = InstructionBuilder::new();
    builder
        .emit(Opcode::PushTrue, 0)
        .emit(Opcode::JumpIfTrue, 0)
        .emit(Opcode::ReturnVoid, 0);
    let before = builder.clone().build();

    builder.patch_operand(1, -1).unwrap();
    let after = builder.build();

    assert_eq!(before[..4], after[..4]);
    assert_eq!(before[4], after[4]);
    assert_eq!(&after[5..8], &[0xff, 0xff, 0xff]);
    assert_eq!(before[8..], after[8..]);
}

#[test]
fn test_patch_partial_address_fails() {
    let mut builder = InstructionBuilder::new();
    assert!(matches!(
        builder.patch_operand(0, 1),
        Err(BytecodeError::AddressOutOfRange {
            address: 0,
            emitted: 0
        })
    ));
}

#[test]
fn test_forward_jump_backpatch() {
    let mut builder = InstructionBuilder::new();
    builder.emit(Opcode::PushFalse, 0);
    let jump = builder.current_address();
    builder.emit(Opcode::JumpIfFalse, 0);
    builder.emit(Opcode::Nop, 0).emit(Opcode::Nop, 0);
    let target = builder.current_address();
    builder.patch_operand(jump, (target - jump) as i64).unwrap();

    let decoded = decode_all(&builder.build()).unwrap();
    assert_eq!(decoded[jump].jump_target(jump), target as i64);
}

#[test]
fn test_backward_offset_sign_extends() {
    let inst = Instruction::new(Opcode::Jump, -6);
    assert_eq!(inst.encode()[1..], [0xff, 0xff, 0xfa]);
    assert_eq!(sign_extend_24(inst.operand), -6);
    assert_eq!(inst.jump_target(10), 4);
}

#[test]
fn test_operand_not_sign_extended_on_emit() {
    let mut builder = InstructionBuilder::new();
    builder.emit(Opcode::PushInt, -1);
    let decoded = decode_all(&builder.build()).unwrap();
    assert_eq!(decoded[0].operand, 0x00ff_ffff);
    assert_eq!(decoded[0].index(), 0x00ff_ffff);
}

#[test]
fn test_display() {
    assert_eq!(Instruction::new(Opcode::Jump, -3).to_string(), "JUMP -3");
    assert_eq!(Instruction::new(Opcode::LoadLocal, 2).to_string(), "LOAD_LOCAL 2");
    assert_eq!(Instruction::new(Opcode::AddInt, 0).to_string(), "ADD_INT");
}
