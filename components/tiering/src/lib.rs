//! Tiered optimization for the bytecode VM
//!
//! This crate provides:
//! - Call profiling: per-function call counters fed by the interpreter
//! - Scheduling: exactly-once admission of hot functions onto a worker pool
//! - Bounded parallelism: an admission gate with a timed wait
//! - Publication: optimized functions visible to the interpreter by index
//!
//! # Example
//!
//! ```
//! use bytecode_system::{CompiledFunction, InstructionBuilder, ModuleBuilder, Opcode};
//! use core_types::{ValueType, VmResult};
//! use interpreter::VM;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tiering::{FunctionState, OptimizationManager, OptimizerConfig};
//!
//! let mut module = ModuleBuilder::new();
//! let one = module.add_int_constant(1) as i64;
//!
//! // tick(): local0 = 1; local0 = local0 + 1
//! let mut tick = InstructionBuilder::new();
//! tick.emit(Opcode::PushInt, one)
//!     .emit(Opcode::StoreLocal, 0)
//!     .emit(Opcode::LoadLocal, 0)
//!     .emit(Opcode::PushInt, one)
//!     .emit(Opcode::AddInt, 0)
//!     .emit(Opcode::StoreLocal, 0)
//!     .emit(Opcode::ReturnVoid, 0);
//! let tick_index = module.add_function(CompiledFunction::new("tick", vec![], ValueType::Void, 1, tick.build()));
//!
//! let mut main = InstructionBuilder::new();
//! for _ in 0..3 {
//!     main.emit(Opcode::Call, tick_index as i64);
//! }
//! main.emit(Opcode::ReturnVoid, 0);
//! module.add_function(CompiledFunction::new("main", vec![], ValueType::Void, 0, main.build()));
//! module.entry_point("main");
//! let module = Arc::new(module.build());
//!
//! let config = OptimizerConfig::default().with_hot_threshold(2);
//! let manager = Arc::new(OptimizationManager::new(Arc::clone(&module), config).unwrap());
//! let mut vm = VM::new().with_profiler(manager.clone());
//! let (code, _) = vm.run_entry_point(&module, &[]);
//! assert_eq!(code, VmResult::Success);
//!
//! assert!(manager.wait_until_idle(Duration::from_secs(5)));
//! assert_eq!(manager.function_state("tick"), FunctionState::Optimized);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod gate;
pub mod manager;
pub mod stats;

// Re-export main types at crate root
pub use config::{OptimizerConfig, DEFAULT_ADMISSION_TIMEOUT, DEFAULT_HOT_THRESHOLD};
pub use error::OptimizerError;
pub use gate::{AdmissionGate, GatePermit};
pub use manager::OptimizationManager;
pub use stats::{FunctionState, OptimizerStats};
