//! Jump threading
//!
//! Three rewrites over the MIR CFG: jumps whose target block is an empty
//! trampoline get retargeted through it (chased to a bounded depth),
//! conditional jumps on constant conditions collapse to unconditional
//! jumps, and blocks left unreachable get swept.

use crate::function::MIRFunction;
use crate::instruction::{InstKind, MIRInstruction};
use crate::pass::{FunctionPass, PassInfo, PassKind, PassStats, PreservationLevel};
use crate::pass_manager::AnalysisManager;
use crate::MIRResult;
use log::debug;
use std::collections::HashSet;

pub struct JumpThreading {
    max_chase_depth: usize,
    stats: PassStats,
}

impl JumpThreading {
    pub fn new(max_chase_depth: usize) -> Self {
        Self {
            max_chase_depth,
            stats: PassStats::new(),
        }
    }

    /// Follow a chain of empty single-jump blocks from `start`
    ///
    /// Returns the final target when it differs. Never threads into a block
    /// with phi nodes: the phi's incoming labels name the original
    /// predecessor and would be invalidated.
    fn chase(&self, function: &MIRFunction, start: &str) -> Option<String> {
        let mut current = start.to_string();
        let mut seen: HashSet<String> = HashSet::new();

        for _ in 0..self.max_chase_depth {
            if !seen.insert(current.clone()) {
                break;
            }
            let block = function.cfg.get_block(&current)?;
            if !block.phi_nodes.is_empty() || block.instructions.len() != 1 {
                break;
            }
            let InstKind::Jump { target } = &block.instructions[0].kind else {
                break;
            };
            let target_has_phis = function
                .cfg
                .get_block(target)
                .map(|b| !b.phi_nodes.is_empty())
                .unwrap_or(true);
            if target_has_phis {
                break;
            }
            current = target.clone();
        }

        (current != start).then_some(current)
    }

    fn thread_jumps(&mut self, function: &mut MIRFunction) -> bool {
        let labels: Vec<String> = function.cfg.blocks.keys().cloned().collect();
        let mut modified = false;

        for label in &labels {
            let targets: Vec<String> = function
                .cfg
                .get_block(label)
                .and_then(|b| b.terminator())
                .map(|t| t.jump_targets().iter().map(|s| s.to_string()).collect())
                .unwrap_or_default();

            for old_target in targets {
                if old_target == *label {
                    continue;
                }
                let Some(new_target) = self.chase(function, &old_target) else {
                    continue;
                };
                if new_target == *label {
                    // threading would create a self-loop out of a trampoline
                    continue;
                }

                if let Some(block) = function.cfg.get_block_mut(label) {
                    if let Some(terminator) = block.terminator_mut() {
                        terminator.retarget(&old_target, &new_target);
                    }
                }
                function.cfg.disconnect(label, &old_target);
                function.cfg.connect(label, &new_target);
                self.stats.incr("jumps_threaded");
                modified = true;
            }
        }

        modified
    }

    /// `if <constant> goto A else B` becomes `goto A` or `goto B`
    fn collapse_constant_branches(&mut self, function: &mut MIRFunction) -> bool {
        let labels: Vec<String> = function.cfg.blocks.keys().cloned().collect();
        let mut modified = false;

        for label in &labels {
            let collapse = {
                let Some(block) = function.cfg.get_block(label) else {
                    continue;
                };
                match block.terminator().map(|t| &t.kind) {
                    Some(InstKind::CondJump {
                        condition,
                        true_target,
                        false_target: Some(false_target),
                    }) => condition.as_constant().map(|c| {
                        let taken = if c.is_truthy() {
                            true_target.clone()
                        } else {
                            false_target.clone()
                        };
                        let dropped = if c.is_truthy() {
                            false_target.clone()
                        } else {
                            true_target.clone()
                        };
                        (taken, dropped)
                    }),
                    _ => None,
                }
            };

            let Some((taken, dropped)) = collapse else {
                continue;
            };

            if let Some(block) = function.cfg.get_block_mut(label) {
                let loc = block.instructions.last().and_then(|i| i.loc);
                let jump = MIRInstruction::new(InstKind::Jump {
                    target: taken.clone(),
                });
                *block.instructions.last_mut().expect("terminator present") = match loc {
                    Some(loc) => jump.at(loc),
                    None => jump,
                };
            }
            if taken != dropped {
                function.cfg.disconnect(label, &dropped);
                if let Some(dropped_block) = function.cfg.get_block_mut(&dropped) {
                    dropped_block.remove_phi_entries_for(label);
                }
            }
            self.stats.incr("branches_collapsed");
            modified = true;
        }

        modified
    }

    fn remove_unreachable(&mut self, function: &mut MIRFunction) -> bool {
        let reachable = function.cfg.reachable_blocks();
        let dead: Vec<String> = function
            .cfg
            .blocks
            .keys()
            .filter(|label| !reachable.contains(*label))
            .cloned()
            .collect();

        for label in &dead {
            function.cfg.remove_block(label);
            self.stats.incr("blocks_removed");
        }

        if !dead.is_empty() {
            debug!("jump-threading: removed {} unreachable block(s)", dead.len());
        }
        !dead.is_empty()
    }
}

impl FunctionPass for JumpThreading {
    fn info(&self) -> PassInfo {
        PassInfo {
            name: "jump-threading",
            description: "Thread jump chains and collapse constant branches",
            kind: PassKind::Optimization,
            requires: &[],
            preserves: PreservationLevel::None,
        }
    }

    fn run_on_function(
        &mut self,
        function: &mut MIRFunction,
        _analyses: &mut AnalysisManager,
    ) -> MIRResult<bool> {
        let mut modified = false;
        loop {
            let mut changed = false;
            changed |= self.collapse_constant_branches(function);
            changed |= self.thread_jumps(function);
            changed |= self.remove_unreachable(function);
            if !changed {
                break;
            }
            modified = true;
        }
        Ok(modified)
    }

    fn stats(&self) -> &PassStats {
        &self.stats
    }
}
