//! Peephole cleanup over late MIR
//!
//! Catches local leftovers the larger passes produce: no-ops, copies of a
//! value onto itself, double negations, and pops of values that were never
//! worth keeping.

use crate::function::MIRFunction;
use crate::instruction::{InstKind, MIRInstruction, UnaryOperator};
use crate::pass::{FunctionPass, PassInfo, PassKind, PassStats, PreservationLevel};
use crate::pass_manager::AnalysisManager;
use crate::types::MIRType;
use crate::value::MIRValue;
use crate::MIRResult;
use std::collections::HashMap;

pub struct Peephole {
    stats: PassStats,
}

impl Peephole {
    pub fn new() -> Self {
        Self {
            stats: PassStats::new(),
        }
    }

    fn run_block(&mut self, block: &mut crate::block::BasicBlock) -> bool {
        let mut modified = false;

        // Double negation: a second Neg (or Not on a bool) over an earlier
        // one collapses into a copy of the original operand.
        let mut unary_defs: HashMap<MIRValue, (UnaryOperator, MIRValue)> = HashMap::new();
        for inst in &mut block.instructions {
            if let InstKind::UnaryOp { dest, op, operand } = &inst.kind {
                if let Some((inner_op, inner_operand)) = unary_defs.get(operand) {
                    let cancels = match (op, inner_op) {
                        (UnaryOperator::Neg, UnaryOperator::Neg) => {
                            inner_operand.ty().is_numeric()
                        }
                        (UnaryOperator::Not, UnaryOperator::Not) => {
                            inner_operand.ty() == MIRType::Bool
                        }
                        (UnaryOperator::BitNot, UnaryOperator::BitNot) => {
                            inner_operand.ty() == MIRType::Int
                        }
                        _ => false,
                    };
                    if cancels {
                        let rewrite = InstKind::Copy {
                            dest: dest.clone(),
                            source: inner_operand.clone(),
                        };
                        let loc = inst.loc;
                        *inst = match loc {
                            Some(loc) => MIRInstruction::new(rewrite).at(loc),
                            None => MIRInstruction::new(rewrite),
                        };
                        self.stats.incr("negations_cancelled");
                        modified = true;
                        continue;
                    }
                }
            }
            if let InstKind::UnaryOp { dest, op, operand } = &inst.kind {
                if dest.is_ssa_name() {
                    unary_defs.insert(dest.clone(), (*op, operand.clone()));
                }
            }
        }

        // Values defined by pure instructions in this block; popping one is
        // a no-op worth deleting.
        let pure_defs: std::collections::HashSet<MIRValue> = block
            .instructions
            .iter()
            .filter(|inst| inst.is_pure())
            .flat_map(|inst| inst.defs())
            .collect();

        let before = block.instructions.len();
        block.instructions.retain(|inst| match &inst.kind {
            InstKind::Nop => false,
            InstKind::Copy { dest, source } => dest != source,
            InstKind::Pop { value } => {
                !(value.is_constant() || pure_defs.contains(value))
            }
            _ => true,
        });
        let removed = before - block.instructions.len();
        if removed > 0 {
            self.stats.add("instructions_removed", removed);
            modified = true;
        }

        modified
    }
}

impl FunctionPass for Peephole {
    fn info(&self) -> PassInfo {
        PassInfo {
            name: "peephole",
            description: "Local cleanup of no-ops and trivial idioms",
            kind: PassKind::Optimization,
            requires: &[],
            preserves: PreservationLevel::Cfg,
        }
    }

    fn run_on_function(
        &mut self,
        function: &mut MIRFunction,
        _analyses: &mut AnalysisManager,
    ) -> MIRResult<bool> {
        let mut modified = false;
        for block in function.cfg.blocks.values_mut() {
            if self.run_block(block) {
                modified = true;
            }
        }
        Ok(modified)
    }

    fn stats(&self) -> &PassStats {
        &self.stats
    }
}

impl Default for Peephole {
    fn default() -> Self {
        Self::new()
    }
}
