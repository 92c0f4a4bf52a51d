//! Runtime value representation.
//!
//! This module provides the `Value` enum held by every refcounted slot
//! (local variables and operand stack entries), the declared types used by
//! compiled function signatures, and `HostValue`, the owned form of a value
//! crossing the boundary between the VM and its host.

use serde::Serialize;
use std::fmt;

/// Identifier of an array on the VM heap.
///
/// The generation distinguishes a live array from an earlier array that
/// occupied the same heap slot and has since been freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapId {
    /// Slot index in the heap
    pub index: u32,
    /// Generation of the slot when the array was allocated
    pub generation: u32,
}

impl HeapId {
    /// Create a new heap identifier
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Display for HeapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// Element type of a heap array.
///
/// Arrays only ever hold primitives, which keeps heap ownership acyclic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ElementType {
    /// 64-bit signed integers
    Int,
    /// 64-bit floats
    Float,
    /// Booleans
    Bool,
}

impl ElementType {
    /// Numeric tag used as the `NEW_ARRAY` operand
    pub fn tag(self) -> u32 {
        match self {
            ElementType::Int => 0,
            ElementType::Float => 1,
            ElementType::Bool => 2,
        }
    }

    /// Decode a `NEW_ARRAY` operand
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(ElementType::Int),
            1 => Some(ElementType::Float),
            2 => Some(ElementType::Bool),
            _ => None,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::Int => write!(f, "int"),
            ElementType::Float => write!(f, "float"),
            ElementType::Bool => write!(f, "bool"),
        }
    }
}

/// Declared type of a parameter or return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Integer
    Int,
    /// Float
    Float,
    /// Boolean
    Bool,
    /// Array of primitives
    Array(ElementType),
    /// No value (return type only)
    Void,
}

impl ValueType {
    /// Type name used in signatures and diagnostics
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Bool => "bool",
            ValueType::Array(ElementType::Int) => "int[]",
            ValueType::Array(ElementType::Float) => "float[]",
            ValueType::Array(ElementType::Bool) => "bool[]",
            ValueType::Void => "void",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value stored in a local slot or on the operand stack.
///
/// `Array` is the only variant that refers to heap memory; every slot holding
/// it accounts for exactly one reference on the array's count.
///
/// # Examples
///
/// ```
/// use core_types::Value;
///
/// assert_eq!(Value::Int(42).as_int(), Some(42));
/// assert!(!Value::Float(1.5).is_heap_ref());
/// assert_eq!(Value::Bool(true).to_string(), "true");
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// Uninitialised slot
    Null,
    /// Integer value
    Int(i64),
    /// Float value
    Float(f64),
    /// Boolean value
    Bool(bool),
    /// Reference to a heap array
    Array(HeapId),
}

impl Value {
    /// Returns the integer payload, if any
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the float payload, if any
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the boolean payload, if any
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the heap id, if this value references an array
    pub fn as_array(&self) -> Option<HeapId> {
        match self {
            Value::Array(id) => Some(*id),
            _ => None,
        }
    }

    /// Whether this value contributes to a heap reference count
    pub fn is_heap_ref(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    /// Short type name used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Array(_) => "array",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{:?}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Array(id) => write!(f, "array{}", id),
        }
    }
}

/// Owned value exchanged with the host.
///
/// Arrays are carried by content: argument arrays are allocated on the VM heap
/// at entry, and returned arrays are copied out before the heap reference is
/// released.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HostValue {
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// Boolean
    Bool(bool),
    /// Integer array contents
    IntArray(Vec<i64>),
    /// Float array contents
    FloatArray(Vec<f64>),
    /// Boolean array contents
    BoolArray(Vec<bool>),
}

impl HostValue {
    /// The declared type this host value satisfies
    pub fn value_type(&self) -> ValueType {
        match self {
            HostValue::Int(_) => ValueType::Int,
            HostValue::Float(_) => ValueType::Float,
            HostValue::Bool(_) => ValueType::Bool,
            HostValue::IntArray(_) => ValueType::Array(ElementType::Int),
            HostValue::FloatArray(_) => ValueType::Array(ElementType::Float),
            HostValue::BoolArray(_) => ValueType::Array(ElementType::Bool),
        }
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
            write!(f, "[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", item)?;
            }
            write!(f, "]")
        }

        match self {
            HostValue::Int(n) => write!(f, "{}", n),
            HostValue::Float(n) => write!(f, "{:?}", n),
            HostValue::Bool(b) => write!(f, "{}", b),
            HostValue::IntArray(items) => list(f, items),
            HostValue::FloatArray(items) => {
                let rendered: Vec<String> = items.iter().map(|n| format!("{:?}", n)).collect();
                list(f, &rendered)
            }
            HostValue::BoolArray(items) => list(f, items),
        }
    }
}
