//! Bytecode interpreter for the tiered VM
//!
//! This crate provides a stack-based virtual machine with:
//! - Call-frame execution over fixed-width bytecode
//! - Reference-counted locals and operand stack (via memory_manager)
//! - A closed set of result codes for every fault
//! - A profiling hook that lets an optimizing tier swap in new function
//!   versions between calls
//!
//! # Example
//!
//! ```
//! use bytecode_system::{CompiledFunction, InstructionBuilder, ModuleBuilder, Opcode};
//! use core_types::{ValueType, VmResult};
//! use interpreter::VM;
//!
//! let mut module = ModuleBuilder::new();
//! let k = module.add_int_constant(7);
//! let mut code = InstructionBuilder::new();
//! code.emit(Opcode::PushInt, k as i64)
//!     .emit(Opcode::Print, 0)
//!     .emit(Opcode::ReturnVoid, 0);
//! module.add_function(CompiledFunction::new("main", vec![], ValueType::Void, 0, code.build()));
//!
//! let mut vm = VM::new();
//! let (result, _) = vm.run_entry_point(&module.build(), &[]);
//! assert_eq!(result, VmResult::Success);
//! assert_eq!(vm.take_output(), vec!["7".to_string()]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod call_frame;
pub mod config;
pub mod dispatch;
pub mod profile;
pub mod vm;

// Re-export main types at crate root
pub use call_frame::CallFrame;
pub use config::VmConfig;
pub use dispatch::{Dispatcher, ExecutionStats};
pub use profile::{CallProfiler, NoopProfiler};
pub use vm::VM;
