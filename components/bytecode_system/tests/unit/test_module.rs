//! Tests for compiled functions and modules

use bytecode_system::{CompiledFunction, InstructionBuilder, ModuleBuilder, Opcode, Parameter};
use core_types::{ElementType, ValueType};

fn sample_module() -> bytecode_system::BytecodeModule {
    let mut module = ModuleBuilder::new();
    let seven = module.add_int_constant(7);
    let half = module.add_float_constant(0.5);

    let mut helper = InstructionBuilder::new();
    helper.emit(Opcode::PushFloat, half as i64).emit(Opcode::Return, 0);
    module.add_function(CompiledFunction::new(
        "helper",
        vec![],
        ValueType::Float,
        0,
        helper.build(),
    ));

    let mut main = InstructionBuilder::new();
    main.emit(Opcode::PushInt, seven as i64)
        .emit(Opcode::Print, 0)
        .emit(Opcode::Call, 0)
        .emit(Opcode::Pop, 0)
        .emit(Opcode::ReturnVoid, 0);
    module.add_function(CompiledFunction::new(
        "main",
        vec![Parameter::new("xs", ValueType::Array(ElementType::Int))],
        ValueType::Void,
        2,
        main.build(),
    ));
    module.entry_point("main");
    module.build()
}

#[test]
fn test_function_lookup() {
    let module = sample_module();
    assert_eq!(module.function_index("helper"), Some(0));
    assert_eq!(module.entry_index(), Some(1));
    assert_eq!(module.function_index("missing"), None);
    assert!(module.function(2).is_none());
}

#[test]
fn test_constant_lookup() {
    let module = sample_module();
    assert_eq!(module.int_constant(0), Some(7));
    assert_eq!(module.float_constant(0), Some(0.5));
    assert_eq!(module.int_constant(5), None);
}

#[test]
fn test_function_metadata() {
    let module = sample_module();
    let main = module.function(1).unwrap();
    assert_eq!(main.arity(), 1);
    assert_eq!(main.locals_count, 2);
    assert_eq!(main.instruction_count(), 5);
    assert_eq!(main.decode().unwrap()[2].opcode, Opcode::Call);
}

#[test]
fn test_with_instructions_keeps_signature() {
    let module = sample_module();
    let main = module.function(1).unwrap();
    let replaced = main.with_instructions(Vec::new());
    assert_eq!(replaced.name, "main");
    assert_eq!(replaced.parameters, main.parameters);
    assert_eq!(replaced.instruction_count(), 0);
}

#[test]
fn test_module_disassembly_resolves_operands() {
    let listing = sample_module().disassemble();
    assert!(listing.contains("fn main(xs: int[]) -> void [locals=2]"));
    assert!(listing.contains("PUSH_INT 0  ; 7"));
    assert!(listing.contains("PUSH_FLOAT 0  ; 0.5"));
    assert!(listing.contains("CALL 0  ; helper"));
}

#[test]
fn test_disassembly_marks_unknown_bytes() {
    let f = CompiledFunction::new("bad", vec![], ValueType::Void, 0, vec![0xee, 0, 0, 0]);
    assert!(f.disassemble(None).contains(".byte 0xee"));
}
