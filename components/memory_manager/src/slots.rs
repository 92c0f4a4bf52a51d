//! Refcounted value slots: frame locals and the operand stack.
//!
//! A slot owns one reference on any array it holds. Moving a value between
//! slots (pop then store, pop then push) transfers that reference; copying
//! it (`LOAD_LOCAL`, `DUP`) retains.

use crate::heap::ArrayHeap;
use core_types::{Value, VmError, VmOutcome};

/// Local variable slots of one call frame
#[derive(Debug, Clone, PartialEq)]
pub struct LocalSlots {
    slots: Vec<Value>,
}

impl LocalSlots {
    /// Create `count` uninitialised slots
    pub fn new(count: usize) -> Self {
        Self {
            slots: vec![Value::Null; count],
        }
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the frame has no slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn check(&self, index: usize) -> VmOutcome<()> {
        if index < self.slots.len() {
            Ok(())
        } else {
            Err(VmError::InvalidLocalIndex {
                index,
                count: self.slots.len(),
            })
        }
    }

    /// Inspect a slot without touching reference counts
    pub fn get(&self, index: usize) -> VmOutcome<Value> {
        self.check(index)?;
        Ok(self.slots[index])
    }

    /// Copy a slot out, retaining any array it holds
    pub fn load(&self, index: usize, heap: &mut ArrayHeap) -> VmOutcome<Value> {
        let value = self.get(index)?;
        heap.retain_value(value)?;
        Ok(value)
    }

    /// Move an owned value into a slot, releasing the previous occupant
    ///
    /// On an invalid index the value's reference is released so it does not
    /// outlive the fault.
    pub fn store(&mut self, index: usize, value: Value, heap: &mut ArrayHeap) -> VmOutcome<()> {
        if let Err(err) = self.check(index) {
            heap.release_value(value)?;
            return Err(err);
        }
        let previous = std::mem::replace(&mut self.slots[index], value);
        heap.release_value(previous)
    }

    /// Overwrite an integer slot in place
    pub fn set_int(&mut self, index: usize, value: i64) -> VmOutcome<()> {
        self.check(index)?;
        match self.slots[index] {
            Value::Int(_) => {
                self.slots[index] = Value::Int(value);
                Ok(())
            }
            other => Err(VmError::type_mismatch("int", &other)),
        }
    }

    /// Release every held reference and reset the slots
    ///
    /// Every slot is cleared even if a release fails; the first failure is
    /// reported.
    pub fn release_all(&mut self, heap: &mut ArrayHeap) -> VmOutcome<()> {
        let mut result = Ok(());
        for slot in &mut self.slots {
            let value = std::mem::replace(slot, Value::Null);
            if let Err(err) = heap.release_value(value) {
                result = result.and(Err(err));
            }
        }
        result
    }
}

/// Operand stack shared by all frames of one execution
///
/// Each frame only sees the entries above its base; popping below the base
/// is an underflow.
#[derive(Debug, Clone, PartialEq)]
pub struct OperandStack {
    values: Vec<Value>,
    base: usize,
    max_size: usize,
}

impl OperandStack {
    /// Create an empty stack with a size limit
    pub fn new(max_size: usize) -> Self {
        Self {
            values: Vec::new(),
            base: 0,
            max_size,
        }
    }

    /// Number of entries, across all frames
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the stack is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Size limit
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Base of the active frame
    pub fn base(&self) -> usize {
        self.base
    }

    /// Set the base of the active frame
    pub fn set_base(&mut self, base: usize) {
        self.base = base;
    }

    /// Number of entries visible to the active frame
    pub fn frame_depth(&self) -> usize {
        self.values.len() - self.base.min(self.values.len())
    }

    /// Push an owned value
    ///
    /// On overflow the caller still owns the value's reference.
    pub fn push(&mut self, value: Value) -> VmOutcome<()> {
        if self.values.len() >= self.max_size {
            return Err(VmError::StackOverflow(self.max_size));
        }
        self.values.push(value);
        Ok(())
    }

    /// Push, releasing the value if the stack is full
    pub fn push_or_release(&mut self, value: Value, heap: &mut ArrayHeap) -> VmOutcome<()> {
        if let Err(err) = self.push(value) {
            heap.release_value(value)?;
            return Err(err);
        }
        Ok(())
    }

    /// Pop an owned value
    pub fn pop(&mut self) -> VmOutcome<Value> {
        if self.values.len() <= self.base {
            return Err(VmError::StackUnderflow);
        }
        self.values.pop().ok_or(VmError::StackUnderflow)
    }

    /// Inspect the top entry
    pub fn peek(&self) -> VmOutcome<Value> {
        if self.values.len() <= self.base {
            return Err(VmError::StackUnderflow);
        }
        self.values.last().copied().ok_or(VmError::StackUnderflow)
    }

    /// Push a copy of the top entry, retaining it
    pub fn dup(&mut self, heap: &mut ArrayHeap) -> VmOutcome<()> {
        let top = self.peek()?;
        self.push(top)?;
        heap.retain_value(top)
    }

    /// Pop and release the top entry
    pub fn drop_top(&mut self, heap: &mut ArrayHeap) -> VmOutcome<()> {
        let value = self.pop()?;
        heap.release_value(value)
    }

    /// Release every entry above `depth` and shrink the stack to it
    pub fn truncate(&mut self, depth: usize, heap: &mut ArrayHeap) -> VmOutcome<()> {
        let mut result = Ok(());
        while self.values.len() > depth {
            if let Some(value) = self.values.pop() {
                if let Err(err) = heap.release_value(value) {
                    result = result.and(Err(err));
                }
            }
        }
        self.base = self.base.min(depth);
        result
    }

    /// Release every entry
    pub fn clear(&mut self, heap: &mut ArrayHeap) -> VmOutcome<()> {
        self.truncate(0, heap)
    }
}
