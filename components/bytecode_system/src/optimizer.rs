//! Bytecode pattern optimizer
//!
//! Rewrites fixed-length opcode sequences into cheaper equivalents and
//! re-targets every relative jump so control flow is preserved. The pass is
//! pure: it returns a new `CompiledFunction` and never touches its input.

use crate::error::BytecodeError;
use crate::instruction::{Instruction, InstructionBuilder, MAX_SIGNED_OPERAND, MIN_SIGNED_OPERAND};
use crate::module::{BytecodeModule, CompiledFunction};
use crate::opcode::Opcode;
use std::collections::HashSet;
use tracing::{debug, trace};

/// Length of every rewrite pattern, in instructions
pub const PATTERN_LENGTH: usize = 4;

/// A fixed-length sequence and the single instruction replacing it
///
/// The first and last instructions of the pattern must address the same
/// local slot and the constant pushed by the second must resolve to 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriteRule {
    /// Short rule name used in logs
    pub name: &'static str,
    /// Opcodes to match
    pub pattern: [Opcode; PATTERN_LENGTH],
    /// Opcode emitted with the matched local index
    pub replacement: Opcode,
}

/// Built-in rule table
pub const DEFAULT_RULES: &[RewriteRule] = &[
    RewriteRule {
        name: "increment-local",
        pattern: [
            Opcode::LoadLocal,
            Opcode::PushInt,
            Opcode::AddInt,
            Opcode::StoreLocal,
        ],
        replacement: Opcode::IncLocal,
    },
    RewriteRule {
        name: "decrement-local",
        pattern: [
            Opcode::LoadLocal,
            Opcode::PushInt,
            Opcode::SubInt,
            Opcode::StoreLocal,
        ],
        replacement: Opcode::DecLocal,
    },
];

/// Result of optimizing one function
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationOutcome {
    /// The rewritten function (or an unchanged copy)
    pub function: CompiledFunction,
    /// Number of spans fused
    pub rewrites: usize,
}

impl OptimizationOutcome {
    /// Whether any rewrite was applied
    pub fn changed(&self) -> bool {
        self.rewrites > 0
    }
}

/// Pattern-based peephole optimizer bound to a module's constant table
pub struct PatternOptimizer<'m> {
    module: &'m BytecodeModule,
    rules: &'static [RewriteRule],
}

impl<'m> PatternOptimizer<'m> {
    /// Create an optimizer with the default rules
    pub fn new(module: &'m BytecodeModule) -> Self {
        Self {
            module,
            rules: DEFAULT_RULES,
        }
    }

    /// Optimize one function
    ///
    /// Fails when the stream cannot be decoded, when a jump in the input
    /// leaves the function, or when a remapped offset no longer fits.
    pub fn optimize(&self, function: &CompiledFunction) -> Result<OptimizationOutcome, BytecodeError> {
        let code = function.decode()?;
        let length = code.len();
        let targets = jump_targets(&code)?;

        // mapping[old] = new address; one extra entry for the end of stream
        let mut mapping = vec![0usize; length + 1];
        let mut emitted: Vec<(Instruction, usize)> = Vec::with_capacity(length);
        let mut rewrites = 0;

        let mut address = 0;
        while address < length {
            if let Some(rule) = self.match_at(&code, address, &targets) {
                let new_address = emitted.len();
                for slot in &mut mapping[address..address + PATTERN_LENGTH] {
                    *slot = new_address;
                }
                let local = code[address].operand;
                emitted.push((Instruction::new(rule.replacement, local as i64), address));
                trace!(
                    function = %function.name,
                    rule = rule.name,
                    address,
                    "fused span"
                );
                rewrites += 1;
                address += PATTERN_LENGTH;
            } else {
                mapping[address] = emitted.len();
                emitted.push((code[address], address));
                address += 1;
            }
        }
        mapping[length] = emitted.len();

        if rewrites == 0 || (emitted.is_empty() && length > 0) {
            return Ok(OptimizationOutcome {
                function: function.clone(),
                rewrites: 0,
            });
        }

        let mut builder = InstructionBuilder::new();
        for (inst, original) in emitted {
            if inst.opcode.is_jump() {
                let target = inst.jump_target(original) as usize;
                let offset = mapping[target] as i64 - mapping[original] as i64;
                if !(MIN_SIGNED_OPERAND..=MAX_SIGNED_OPERAND).contains(&offset) {
                    return Err(BytecodeError::OffsetOverflow(offset));
                }
                builder.emit(inst.opcode, offset);
            } else {
                builder.emit_instruction(inst);
            }
        }

        debug!(
            function = %function.name,
            rewrites,
            before = length,
            after = mapping[length],
            "optimized function"
        );

        Ok(OptimizationOutcome {
            function: function.with_instructions(builder.build()),
            rewrites,
        })
    }

    fn match_at(
        &self,
        code: &[Instruction],
        address: usize,
        targets: &HashSet<usize>,
    ) -> Option<&'static RewriteRule> {
        let span = code.get(address..address + PATTERN_LENGTH)?;
        // a jump into the middle of the span would lose its target
        if (address + 1..address + PATTERN_LENGTH).any(|a| targets.contains(&a)) {
            return None;
        }
        self.rules.iter().find(|rule| {
            span.iter().zip(rule.pattern.iter()).all(|(i, op)| i.opcode == *op)
                && span[0].operand == span[3].operand
                && self.module.int_constant(span[1].index()) == Some(1)
        })
    }
}

/// Absolute targets of every jump, validated against `0..=len`
fn jump_targets(code: &[Instruction]) -> Result<HashSet<usize>, BytecodeError> {
    let length = code.len();
    let mut targets = HashSet::new();
    for (address, inst) in code.iter().enumerate() {
        if !inst.opcode.is_jump() {
            continue;
        }
        let target = inst.jump_target(address);
        if target < 0 || target as usize > length {
            return Err(BytecodeError::JumpOutOfRange {
                address,
                target,
                length,
            });
        }
        targets.insert(target as usize);
    }
    Ok(targets)
}
