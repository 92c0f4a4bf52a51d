//! Memory Manager - reference-counted heap and slot management
//!
//! This component provides:
//! - An array heap with explicit reference counts and generation-checked ids
//! - Local variable slots that release what they overwrite
//! - The operand stack with per-frame bases and a size limit
//! - Conversion of arrays to and from host values

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod heap;
pub mod slots;

// Re-export main types
pub use heap::{ArrayData, ArrayHeap, HeapStats};
pub use slots::{LocalSlots, OperandStack};
