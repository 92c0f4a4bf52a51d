//! Bytecode format for the tiered VM
//!
//! This crate provides the fixed-width instruction encoding, the opcode
//! table, the compiled function and module model, and the pattern optimizer
//! used by the background tier.
//!
//! # Features
//!
//! - 4-byte instructions with 24-bit big-endian operands
//! - Backpatching builder for forward jumps
//! - Modules with deduplicated constant tables
//! - Increment/decrement fusion with jump remapping
//!
//! # Example
//!
//! ```
//! use bytecode_system::{CompiledFunction, InstructionBuilder, ModuleBuilder, Opcode, PatternOptimizer};
//! use core_types::ValueType;
//!
//! let mut module = ModuleBuilder::new();
//! let one = module.add_int_constant(1);
//!
//! let mut code = InstructionBuilder::new();
//! code.emit(Opcode::LoadLocal, 0)
//!     .emit(Opcode::PushInt, one as i64)
//!     .emit(Opcode::AddInt, 0)
//!     .emit(Opcode::StoreLocal, 0)
//!     .emit(Opcode::ReturnVoid, 0);
//! let function = CompiledFunction::new("bump", vec![], ValueType::Void, 1, code.build());
//! module.add_function(function.clone());
//! let module = module.build();
//!
//! let outcome = PatternOptimizer::new(&module).optimize(&function).unwrap();
//! assert_eq!(outcome.rewrites, 1);
//! assert_eq!(outcome.function.instruction_count(), 2);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod instruction;
pub mod module;
pub mod opcode;
pub mod optimizer;

// Re-export main types at crate root
pub use error::BytecodeError;
pub use instruction::{Instruction, InstructionBuilder, INSTRUCTION_SIZE};
pub use module::{BytecodeModule, CompiledFunction, ModuleBuilder, Parameter};
pub use opcode::{Opcode, OperandKind};
pub use optimizer::{OptimizationOutcome, PatternOptimizer, RewriteRule};
