//! Call frame for function call stack management

use bytecode_system::CompiledFunction;
use memory_manager::LocalSlots;
use std::sync::Arc;

/// Call frame representing a function invocation
///
/// The frame keeps the exact function version it was entered with, so a
/// replacement published while it runs is only seen by later calls.
#[derive(Debug, Clone, PartialEq)]
pub struct CallFrame {
    /// Function being executed
    pub function: Arc<CompiledFunction>,
    /// Function-table index of the callee
    pub function_index: usize,
    /// Local variable slots, parameters first
    pub locals: LocalSlots,
    /// Address of the next instruction to execute
    pub pc: usize,
    /// Address to resume at in the caller; `None` for the outermost frame
    pub return_address: Option<usize>,
    /// Operand stack height when the frame was entered
    pub stack_base: usize,
}

impl CallFrame {
    /// Create a new call frame with empty locals
    pub fn new(
        function: Arc<CompiledFunction>,
        function_index: usize,
        return_address: Option<usize>,
        stack_base: usize,
    ) -> Self {
        let locals = LocalSlots::new(function.locals_count);
        Self {
            function,
            function_index,
            locals,
            pc: 0,
            return_address,
            stack_base,
        }
    }

    /// Whether this is the outermost frame
    pub fn is_entry(&self) -> bool {
        self.return_address.is_none()
    }
}
