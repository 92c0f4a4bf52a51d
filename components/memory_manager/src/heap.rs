//! Reference-counted array heap.
//!
//! Arrays live in a slab of slots. Each slot carries a generation counter
//! that is bumped when its array is freed, so a `HeapId` kept past the
//! array's lifetime is detected instead of aliasing a newer array.
//!
//! Reference counts are explicit: whoever puts an `Value::Array` into a slot
//! (local variable or operand stack entry) owns one count, and must give it
//! back with [`ArrayHeap::release`] when the slot is overwritten or torn down.

use core_types::{ElementType, HeapId, HostValue, Value, VmError, VmOutcome};
use tracing::trace;

/// Homogeneous element storage of an array
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    /// Integer elements
    Int(Vec<i64>),
    /// Float elements
    Float(Vec<f64>),
    /// Boolean elements
    Bool(Vec<bool>),
}

impl ArrayData {
    /// Zero-filled storage of the given type and length
    pub fn zeroed(element_type: ElementType, length: usize) -> Self {
        match element_type {
            ElementType::Int => ArrayData::Int(vec![0; length]),
            ElementType::Float => ArrayData::Float(vec![0.0; length]),
            ElementType::Bool => ArrayData::Bool(vec![false; length]),
        }
    }

    /// Element type of the storage
    pub fn element_type(&self) -> ElementType {
        match self {
            ArrayData::Int(_) => ElementType::Int,
            ArrayData::Float(_) => ElementType::Float,
            ArrayData::Bool(_) => ElementType::Bool,
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            ArrayData::Int(v) => v.len(),
            ArrayData::Float(v) => v.len(),
            ArrayData::Bool(v) => v.len(),
        }
    }

    /// Whether the array has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> Option<Value> {
        match self {
            ArrayData::Int(v) => v.get(index).map(|n| Value::Int(*n)),
            ArrayData::Float(v) => v.get(index).map(|n| Value::Float(*n)),
            ArrayData::Bool(v) => v.get(index).map(|b| Value::Bool(*b)),
        }
    }

    fn set(&mut self, index: usize, value: Value) -> VmOutcome<()> {
        match (self, value) {
            (ArrayData::Int(v), Value::Int(n)) => v[index] = n,
            (ArrayData::Float(v), Value::Float(n)) => v[index] = n,
            (ArrayData::Bool(v), Value::Bool(b)) => v[index] = b,
            (data, value) => {
                return Err(VmError::InvalidArrayType(format!(
                    "cannot store {} into {} array",
                    value.type_name(),
                    data.element_type()
                )))
            }
        }
        Ok(())
    }

    fn to_host(&self) -> HostValue {
        match self {
            ArrayData::Int(v) => HostValue::IntArray(v.clone()),
            ArrayData::Float(v) => HostValue::FloatArray(v.clone()),
            ArrayData::Bool(v) => HostValue::BoolArray(v.clone()),
        }
    }
}

#[derive(Debug)]
struct HeapArray {
    data: ArrayData,
    ref_count: usize,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    array: Option<HeapArray>,
}

/// Heap statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    /// Arrays currently alive
    pub live_count: usize,
    /// Largest number of arrays alive at once
    pub peak_live_count: usize,
    /// Arrays allocated since creation
    pub total_allocations: u64,
    /// Arrays freed since creation
    pub total_frees: u64,
}

/// Owner of every array allocated by one VM
#[derive(Debug, Default)]
pub struct ArrayHeap {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    stats: HeapStats,
}

impl ArrayHeap {
    /// Create an empty heap
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a zero-filled array with a count of 1
    pub fn allocate(&mut self, element_type: ElementType, length: usize) -> HeapId {
        self.allocate_data(ArrayData::zeroed(element_type, length))
    }

    /// Allocate an array holding the given elements, with a count of 1
    pub fn allocate_data(&mut self, data: ArrayData) -> HeapId {
        let array = HeapArray { data, ref_count: 1 };
        let id = match self.free_list.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.array = Some(array);
                HeapId::new(index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    array: Some(array),
                });
                HeapId::new(index, 0)
            }
        };

        self.stats.total_allocations += 1;
        self.stats.live_count += 1;
        self.stats.peak_live_count = self.stats.peak_live_count.max(self.stats.live_count);
        trace!(%id, "allocated array");
        id
    }

    fn array(&self, id: HeapId) -> VmOutcome<&HeapArray> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.array.as_ref())
            .ok_or(VmError::InvalidHeapId(id))
    }

    fn array_mut(&mut self, id: HeapId) -> VmOutcome<&mut HeapArray> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.array.as_mut())
            .ok_or(VmError::InvalidHeapId(id))
    }

    /// Whether the id refers to a live array
    pub fn is_live(&self, id: HeapId) -> bool {
        self.array(id).is_ok()
    }

    /// Add one reference
    pub fn retain(&mut self, id: HeapId) -> VmOutcome<()> {
        self.array_mut(id)?.ref_count += 1;
        Ok(())
    }

    /// Drop one reference, freeing the array when none remain
    ///
    /// Returns whether the array was freed. Releasing an array that was
    /// already freed reports `NegativeRefCount`; an id that never existed
    /// reports `InvalidHeapId`.
    pub fn release(&mut self, id: HeapId) -> VmOutcome<bool> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .ok_or(VmError::InvalidHeapId(id))?;
        if id.generation < slot.generation {
            return Err(VmError::NegativeRefCount(id));
        }
        if id.generation > slot.generation {
            return Err(VmError::InvalidHeapId(id));
        }
        let array = slot.array.as_mut().ok_or(VmError::InvalidHeapId(id))?;
        if array.ref_count == 0 {
            return Err(VmError::NegativeRefCount(id));
        }

        array.ref_count -= 1;
        if array.ref_count > 0 {
            return Ok(false);
        }

        slot.array = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(id.index);
        self.stats.live_count -= 1;
        self.stats.total_frees += 1;
        trace!(%id, "freed array");
        Ok(true)
    }

    /// Retain the array behind a value, if any
    pub fn retain_value(&mut self, value: Value) -> VmOutcome<()> {
        match value {
            Value::Array(id) => self.retain(id),
            _ => Ok(()),
        }
    }

    /// Release the array behind a value, if any
    pub fn release_value(&mut self, value: Value) -> VmOutcome<()> {
        match value {
            Value::Array(id) => self.release(id).map(|_| ()),
            _ => Ok(()),
        }
    }

    /// Current reference count
    pub fn ref_count(&self, id: HeapId) -> VmOutcome<usize> {
        Ok(self.array(id)?.ref_count)
    }

    /// Element type of an array
    pub fn element_type(&self, id: HeapId) -> VmOutcome<ElementType> {
        Ok(self.array(id)?.data.element_type())
    }

    /// Number of elements
    pub fn length(&self, id: HeapId) -> VmOutcome<usize> {
        Ok(self.array(id)?.data.len())
    }

    /// Read an element
    pub fn load(&self, id: HeapId, index: i64) -> VmOutcome<Value> {
        let data = &self.array(id)?.data;
        usize::try_from(index)
            .ok()
            .and_then(|i| data.get(i))
            .ok_or(VmError::ArrayIndexOutOfBounds {
                index,
                length: data.len(),
            })
    }

    /// Write an element
    ///
    /// Only primitives of the array's element type are accepted, so arrays
    /// can never reference other arrays.
    pub fn store(&mut self, id: HeapId, index: i64, value: Value) -> VmOutcome<()> {
        let data = &mut self.array_mut(id)?.data;
        let length = data.len();
        let slot = usize::try_from(index)
            .ok()
            .filter(|i| *i < length)
            .ok_or(VmError::ArrayIndexOutOfBounds { index, length })?;
        data.set(slot, value)
    }

    /// Copy array contents out to the host
    pub fn to_host(&self, id: HeapId) -> VmOutcome<HostValue> {
        Ok(self.array(id)?.data.to_host())
    }

    /// Convert a host value into a slot value, allocating arrays
    ///
    /// The returned value owns one reference when it is an array.
    pub fn import(&mut self, value: &HostValue) -> Value {
        match value {
            HostValue::Int(n) => Value::Int(*n),
            HostValue::Float(n) => Value::Float(*n),
            HostValue::Bool(b) => Value::Bool(*b),
            HostValue::IntArray(v) => Value::Array(self.allocate_data(ArrayData::Int(v.clone()))),
            HostValue::FloatArray(v) => {
                Value::Array(self.allocate_data(ArrayData::Float(v.clone())))
            }
            HostValue::BoolArray(v) => {
                Value::Array(self.allocate_data(ArrayData::Bool(v.clone())))
            }
        }
    }

    /// Convert an owned slot value into a host value and release it
    ///
    /// `Null` has no host form and yields `None`.
    pub fn export(&mut self, value: Value) -> VmOutcome<Option<HostValue>> {
        let host = match value {
            Value::Null => None,
            Value::Int(n) => Some(HostValue::Int(n)),
            Value::Float(n) => Some(HostValue::Float(n)),
            Value::Bool(b) => Some(HostValue::Bool(b)),
            Value::Array(id) => {
                let host = self.to_host(id)?;
                self.release(id)?;
                Some(host)
            }
        };
        Ok(host)
    }

    /// Number of live arrays
    pub fn live_count(&self) -> usize {
        self.stats.live_count
    }

    /// Statistics snapshot
    pub fn stats(&self) -> HeapStats {
        self.stats
    }
}
