//! Interpreter limits

/// Default maximum number of nested call frames
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1024;

/// Default maximum number of operand stack entries
pub const DEFAULT_MAX_STACK_SIZE: usize = 65_536;

/// Default maximum element count for `NEW_ARRAY`
pub const DEFAULT_MAX_ARRAY_LENGTH: usize = 1 << 24;

/// Configuration for the virtual machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    /// Frames beyond this depth fault with `CALL_STACK_OVERFLOW`
    pub max_call_depth: usize,
    /// Pushes beyond this size fault with `STACK_OVERFLOW`
    pub max_stack_size: usize,
    /// `NEW_ARRAY` lengths above this fault with `ARRAY_INDEX_OUT_OF_BOUNDS`
    pub max_array_length: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_stack_size: DEFAULT_MAX_STACK_SIZE,
            max_array_length: DEFAULT_MAX_ARRAY_LENGTH,
        }
    }
}

impl VmConfig {
    /// Set the call depth limit
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Set the operand stack limit
    pub fn with_max_stack_size(mut self, size: usize) -> Self {
        self.max_stack_size = size;
        self
    }

    /// Set the largest array `NEW_ARRAY` may allocate
    pub fn with_max_array_length(mut self, length: usize) -> Self {
        self.max_array_length = length;
        self
    }
}
