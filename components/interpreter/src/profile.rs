//! Call profiling hook
//!
//! The interpreter reports every `CALL` to a profiler and asks it for a
//! replacement before entering the callee. The profiler decides when a
//! function is hot and where optimized versions come from.

use bytecode_system::CompiledFunction;
use std::sync::Arc;

/// Observer of function calls and source of optimized functions
///
/// Implementations are shared with background threads, and both methods
/// are called on the interpreter's hot path, so they must not block.
pub trait CallProfiler: Send + Sync {
    /// Called once per executed `CALL`, before the callee is entered
    fn record_call(&self, function_index: usize, function: &CompiledFunction);

    /// Published replacement for a function-table index, if any
    fn optimized_function(&self, function_index: usize) -> Option<Arc<CompiledFunction>>;
}

/// Profiler that counts nothing and never offers a replacement
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProfiler;

impl CallProfiler for NoopProfiler {
    fn record_call(&self, _function_index: usize, _function: &CompiledFunction) {}

    fn optimized_function(&self, _function_index: usize) -> Option<Arc<CompiledFunction>> {
        None
    }
}
