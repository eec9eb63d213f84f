//! Dead code elimination
//!
//! A value is live when a side-effecting instruction or terminator uses it,
//! directly or transitively. Everything else is swept. Phi cycles that feed
//! only themselves die together.

use crate::function::MIRFunction;
use crate::pass::{FunctionPass, PassInfo, PassKind, PassStats, PreservationLevel};
use crate::pass_manager::AnalysisManager;
use crate::value::MIRValue;
use crate::MIRResult;
use std::collections::HashSet;

pub struct DeadCodeElimination {
    stats: PassStats,
}

impl DeadCodeElimination {
    pub fn new() -> Self {
        Self {
            stats: PassStats::new(),
        }
    }
}

impl FunctionPass for DeadCodeElimination {
    fn info(&self) -> PassInfo {
        PassInfo {
            name: "dce",
            description: "Remove instructions whose results are never observed",
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
        // Seed liveness with the uses of every rooted instruction, then
        // iterate: a def is live once something live uses it.
        let mut live: HashSet<MIRValue> = HashSet::new();
        let mut changed = true;

        while changed {
            changed = false;
            for block in function.cfg.blocks.values() {
                for inst in block.all_instructions() {
                    let rooted = inst.has_side_effects()
                        || inst.is_terminator()
                        || inst.defs().iter().any(|d| live.contains(d));
                    if rooted {
                        for used in inst.uses() {
                            if live.insert(used) {
                                changed = true;
                            }
                        }
                    }
                }
            }
        }

        let mut removed = 0usize;
        for block in function.cfg.blocks.values_mut() {
            let keep = |inst: &crate::instruction::MIRInstruction| {
                inst.has_side_effects()
                    || inst.is_terminator()
                    || inst.defs().iter().any(|d| live.contains(d))
                    || inst.defs().is_empty()
            };

            let phi_before = block.phi_nodes.len();
            block.phi_nodes.retain(keep);
            removed += phi_before - block.phi_nodes.len();

            let body_before = block.instructions.len();
            block.instructions.retain(keep);
            removed += body_before - block.instructions.len();
        }

        self.stats.add("instructions_removed", removed);
        Ok(removed > 0)
    }

    fn stats(&self) -> &PassStats {
        &self.stats
    }
}

impl Default for DeadCodeElimination {
    fn default() -> Self {
        Self::new()
    }
}
