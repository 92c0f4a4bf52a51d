//! Compiled functions and bytecode modules
//!
//! A `BytecodeModule` is the unit consumed by the interpreter: constant
//! tables, an ordered function table and the name of the entry function.
//! Functions are immutable once built and shared through `Arc`, so an
//! optimized replacement is always a new value.

use crate::error::BytecodeError;
use crate::instruction::{self, Instruction, INSTRUCTION_SIZE};
use crate::opcode::OperandKind;
use core_types::ValueType;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

/// A named, typed function parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// Parameter name
    pub name: String,
    /// Declared type
    pub ty: ValueType,
}

impl Parameter {
    /// Create a parameter
    pub fn new(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A function compiled to bytecode
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunction {
    /// Unique name within the module
    pub name: String,
    /// Ordered parameters; they occupy the first local slots
    pub parameters: Vec<Parameter>,
    /// Declared return type
    pub return_type: ValueType,
    /// Number of local slots, parameters included
    pub locals_count: usize,
    /// Encoded instruction stream
    pub instructions: Vec<u8>,
}

impl CompiledFunction {
    /// Create a function; `locals_count` is raised to the arity if smaller
    pub fn new(
        name: impl Into<String>,
        parameters: Vec<Parameter>,
        return_type: ValueType,
        locals_count: usize,
        instructions: Vec<u8>,
    ) -> Self {
        let locals_count = locals_count.max(parameters.len());
        Self {
            name: name.into(),
            parameters,
            return_type,
            locals_count,
            instructions,
        }
    }

    /// Number of parameters
    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    /// Number of whole instructions
    pub fn instruction_count(&self) -> usize {
        instruction::instruction_count(&self.instructions)
    }

    /// Raw 4-byte record at an address
    pub fn record_at(&self, address: usize) -> Option<[u8; INSTRUCTION_SIZE]> {
        instruction::record_at(&self.instructions, address)
    }

    /// Decode the whole instruction stream
    pub fn decode(&self) -> Result<Vec<Instruction>, BytecodeError> {
        instruction::decode_all(&self.instructions)
    }

    /// Copy of this function with a different instruction stream
    pub fn with_instructions(&self, instructions: Vec<u8>) -> Self {
        Self {
            instructions,
            ..self.clone()
        }
    }

    /// Human-readable listing of the function
    ///
    /// Jump targets are printed as absolute addresses and constant loads
    /// show the resolved constant when a module is supplied.
    pub fn disassemble(&self, module: Option<&BytecodeModule>) -> String {
        let mut out = String::new();
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| format!("{}: {}", p.name, p.ty))
            .collect();
        let _ = writeln!(
            out,
            "fn {}({}) -> {} [locals={}]",
            self.name,
            params.join(", "),
            self.return_type,
            self.locals_count
        );

        let count = self.instruction_count();
        for address in 0..count {
            let Some(record) = self.record_at(address) else {
                break;
            };
            let inst = match Instruction::decode(record, address) {
                Ok(inst) => inst,
                Err(_) => {
                    let _ = writeln!(out, "{:04}  .byte 0x{:02x}", address, record[0]);
                    continue;
                }
            };
            let _ = write!(out, "{:04}  {}", address, inst);
            match inst.opcode.operand_kind() {
                OperandKind::RelativeJump => {
                    let _ = write!(out, "  ; -> {:04}", inst.jump_target(address));
                }
                OperandKind::IntConstant => {
                    if let Some(value) = module.and_then(|m| m.int_constant(inst.index())) {
                        let _ = write!(out, "  ; {}", value);
                    }
                }
                OperandKind::FloatConstant => {
                    if let Some(value) = module.and_then(|m| m.float_constant(inst.index())) {
                        let _ = write!(out, "  ; {:?}", value);
                    }
                }
                OperandKind::Function => {
                    if let Some(callee) = module.and_then(|m| m.function(inst.index())) {
                        let _ = write!(out, "  ; {}", callee.name);
                    }
                }
                _ => {}
            }
            out.push('\n');
        }
        out
    }
}

/// A complete compiled program
#[derive(Debug, Clone, PartialEq)]
pub struct BytecodeModule {
    /// Deduplicated integer constants
    pub int_constants: Vec<i64>,
    /// Deduplicated float constants
    pub float_constants: Vec<f64>,
    /// Function table; the index is the function's stable identity
    pub functions: Vec<Arc<CompiledFunction>>,
    /// Name of the function run by `run_entry_point`
    pub entry_point: String,
}

impl BytecodeModule {
    /// Integer constant at an index
    pub fn int_constant(&self, index: usize) -> Option<i64> {
        self.int_constants.get(index).copied()
    }

    /// Float constant at an index
    pub fn float_constant(&self, index: usize) -> Option<f64> {
        self.float_constants.get(index).copied()
    }

    /// Function at a table index
    pub fn function(&self, index: usize) -> Option<&Arc<CompiledFunction>> {
        self.functions.get(index)
    }

    /// Table index of a function by name
    pub fn function_index(&self, name: &str) -> Option<usize> {
        self.functions.iter().position(|f| f.name == name)
    }

    /// Table index of the entry function
    pub fn entry_index(&self) -> Option<usize> {
        self.function_index(&self.entry_point)
    }

    /// Listing of every function in table order
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        for (index, function) in self.functions.iter().enumerate() {
            let _ = writeln!(out, "; function {}", index);
            out.push_str(&function.disassemble(Some(self)));
            out.push('\n');
        }
        out
    }
}

/// Incremental builder for a `BytecodeModule`
///
/// Constants are deduplicated: adding a value already present returns the
/// existing index. Floats are compared by bit pattern so `0.0` and `-0.0`
/// stay distinct.
#[derive(Debug, Default)]
pub struct ModuleBuilder {
    int_constants: Vec<i64>,
    int_index: HashMap<i64, usize>,
    float_constants: Vec<f64>,
    float_index: HashMap<u64, usize>,
    functions: Vec<Arc<CompiledFunction>>,
    entry_point: Option<String>,
}

impl ModuleBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern an integer constant
    pub fn add_int_constant(&mut self, value: i64) -> usize {
        if let Some(&index) = self.int_index.get(&value) {
            return index;
        }
        let index = self.int_constants.len();
        self.int_constants.push(value);
        self.int_index.insert(value, index);
        index
    }

    /// Intern a float constant
    pub fn add_float_constant(&mut self, value: f64) -> usize {
        let bits = value.to_bits();
        if let Some(&index) = self.float_index.get(&bits) {
            return index;
        }
        let index = self.float_constants.len();
        self.float_constants.push(value);
        self.float_index.insert(bits, index);
        index
    }

    /// Index the next added function will receive
    pub fn next_function_index(&self) -> usize {
        self.functions.len()
    }

    /// Append a function and return its table index
    pub fn add_function(&mut self, function: CompiledFunction) -> usize {
        let index = self.functions.len();
        self.functions.push(Arc::new(function));
        index
    }

    /// Set the entry function name
    pub fn entry_point(&mut self, name: impl Into<String>) -> &mut Self {
        self.entry_point = Some(name.into());
        self
    }

    /// Finish the module
    ///
    /// Without an explicit entry point the first function is used.
    pub fn build(self) -> BytecodeModule {
        let entry_point = self
            .entry_point
            .or_else(|| self.functions.first().map(|f| f.name.clone()))
            .unwrap_or_default();
        BytecodeModule {
            int_constants: self.int_constants,
            float_constants: self.float_constants,
            functions: self.functions,
            entry_point,
        }
    }
}
