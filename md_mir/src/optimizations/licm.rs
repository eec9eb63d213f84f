//! Loop-invariant code motion
//!
//! Processes loops innermost-first. An instruction is invariant when every
//! operand is constant, defined outside the loop, or defined by another
//! invariant instruction. Invariants hoist into a preheader provided they
//! are pure, they dominate every loop exit, and no store in the loop can
//! clobber what they read.

use crate::analysis::{self, Loop};
use crate::function::MIRFunction;
use crate::instruction::{InstKind, MIRInstruction};
use crate::pass::{FunctionPass, PassInfo, PassKind, PassStats, PreservationLevel};
use crate::pass_manager::AnalysisManager;
use crate::ssa::DominanceInfo;
use crate::types::MIRType;
use crate::value::MIRValue;
use crate::MIRResult;
use log::debug;
use std::collections::HashSet;

pub struct LoopInvariantCodeMotion {
    stats: PassStats,
}

impl LoopInvariantCodeMotion {
    pub fn new() -> Self {
        Self {
            stats: PassStats::new(),
        }
    }

    fn process_loop(
        &mut self,
        function: &mut MIRFunction,
        dominance: &DominanceInfo,
        lp: &Loop,
    ) -> bool {
        let hoistable = self.find_hoistable(function, dominance, lp);
        if hoistable.is_empty() {
            return false;
        }

        let Some(preheader) = get_or_create_preheader(function, lp, &mut self.stats) else {
            return false;
        };

        // Remove from the loop body in reverse index order so earlier
        // removals do not shift later positions, then append to the
        // preheader in discovery (dependency) order.
        let mut removed: Vec<(usize, MIRInstruction)> = Vec::new();
        for (order, (block_label, index)) in hoistable.iter().enumerate() {
            if let Some(block) = function.cfg.get_block_mut(block_label) {
                removed.push((order, block.instructions[*index].clone()));
            }
        }
        let mut by_block: Vec<(String, usize)> = hoistable.clone();
        by_block.sort_by(|a, b| b.1.cmp(&a.1));
        for (block_label, index) in by_block {
            if let Some(block) = function.cfg.get_block_mut(&block_label) {
                block.instructions.remove(index);
            }
        }

        removed.sort_by_key(|(order, _)| *order);
        if let Some(preheader_block) = function.cfg.get_block_mut(&preheader) {
            let insert_at = preheader_block
                .instructions
                .iter()
                .position(|i| i.is_terminator())
                .unwrap_or(preheader_block.instructions.len());
            for (offset, (_, inst)) in removed.into_iter().enumerate() {
                preheader_block.instructions.insert(insert_at + offset, inst);
                self.stats.incr("hoisted");
            }
        }

        debug!(
            "licm: hoisted instructions into preheader '{}' of loop '{}'",
            preheader, lp.header
        );
        true
    }

    /// Collect hoistable instructions as (block, index), dependency order
    fn find_hoistable(
        &self,
        function: &MIRFunction,
        dominance: &DominanceInfo,
        lp: &Loop,
    ) -> Vec<(String, usize)> {
        // Values defined anywhere inside the loop.
        let mut defined_in_loop: HashSet<MIRValue> = HashSet::new();
        // Variable names stored inside the loop (may-alias conflicts).
        let mut stored_in_loop: HashSet<String> = HashSet::new();
        for label in &lp.blocks {
            let Some(block) = function.cfg.get_block(label) else {
                continue;
            };
            for inst in block.all_instructions() {
                defined_in_loop.extend(inst.defs());
                if let InstKind::StoreVar { var, .. } = &inst.kind {
                    stored_in_loop.insert(var.name.clone());
                }
            }
        }

        let loop_blocks_in_rpo: Vec<&String> = dominance
            .order
            .iter()
            .filter(|label| lp.blocks.contains(*label))
            .collect();

        let mut invariant_defs: HashSet<MIRValue> = HashSet::new();
        let mut hoistable: Vec<(String, usize)> = Vec::new();
        let mut chosen: HashSet<(String, usize)> = HashSet::new();

        // Fixed point: each round may unlock instructions depending on the
        // previous round's invariants.
        loop {
            let mut changed = false;

            for label in &loop_blocks_in_rpo {
                let Some(block) = function.cfg.get_block(*label) else {
                    continue;
                };
                for (index, inst) in block.instructions.iter().enumerate() {
                    let site = ((*label).clone(), index);
                    if chosen.contains(&site) {
                        continue;
                    }
                    if !is_candidate(inst, &stored_in_loop) {
                        continue;
                    }

                    let invariant = inst.uses().iter().all(|used| match used {
                        MIRValue::Constant(_) | MIRValue::FunctionRef(_) => true,
                        value => {
                            !defined_in_loop.contains(value) || invariant_defs.contains(value)
                        }
                    });
                    if !invariant {
                        continue;
                    }

                    // Hoisting must not make extra executions observable.
                    // Candidates here are pure and non-trapping, so they
                    // may be speculated; anything else must dominate every
                    // exit so no new execution appears on a skipped path.
                    let dominates_exits = lp
                        .exits
                        .iter()
                        .all(|exit| dominance.dominates(label, exit));
                    if !dominates_exits && !is_speculatable(inst) {
                        continue;
                    }

                    chosen.insert(site.clone());
                    hoistable.push(site);
                    invariant_defs.extend(inst.defs());
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }

        hoistable
    }
}

/// Executing this instruction an extra time can never be observed
fn is_speculatable(inst: &MIRInstruction) -> bool {
    match &inst.kind {
        InstKind::BinaryOp { op, .. } => !op.can_trap(),
        InstKind::LoadConst { .. }
        | InstKind::Copy { .. }
        | InstKind::UnaryOp { .. }
        | InstKind::Select { .. }
        | InstKind::LoadVar { .. } => true,
        _ => false,
    }
}

/// Is this instruction the kind LICM may move at all?
fn is_candidate(inst: &MIRInstruction, stored_in_loop: &HashSet<String>) -> bool {
    match &inst.kind {
        InstKind::LoadConst { .. }
        | InstKind::Copy { .. }
        | InstKind::UnaryOp { .. }
        | InstKind::Select { .. } => true,
        // Trapping operations stay put: hoisting could trap on an
        // iteration count of zero.
        InstKind::BinaryOp { op, .. } => !op.can_trap(),
        // A load is movable unless some store in the loop can clobber it.
        InstKind::LoadVar { var, .. } => !stored_in_loop.contains(&var.name),
        _ => false,
    }
}

/// Find or synthesize the loop preheader
///
/// A reusable preheader is a single outside predecessor whose only
/// successor is the header. Otherwise a fresh block is inserted and every
/// outside edge is rerouted through it, merging phi entries when several
/// outside predecessors existed.
fn get_or_create_preheader(
    function: &mut MIRFunction,
    lp: &Loop,
    stats: &mut PassStats,
) -> Option<String> {
    let header_preds: Vec<String> = function
        .cfg
        .get_block(&lp.header)?
        .predecessors
        .iter()
        .filter(|p| !lp.blocks.contains(*p))
        .cloned()
        .collect();

    if header_preds.is_empty() {
        return None;
    }

    if header_preds.len() == 1 {
        let pred = &header_preds[0];
        let pred_block = function.cfg.get_block(pred)?;
        if pred_block.successors.len() == 1 {
            return Some(pred.clone());
        }
    }

    let preheader = function.cfg.generate_label("preheader");
    let mut block = crate::block::BasicBlock::new(preheader.clone());
    block.add_instruction(MIRInstruction::new(InstKind::Jump {
        target: lp.header.clone(),
    }));
    function.cfg.add_block(block);
    stats.incr("preheaders_created");

    for pred in &header_preds {
        if let Some(pred_block) = function.cfg.get_block_mut(pred) {
            if let Some(terminator) = pred_block.terminator_mut() {
                terminator.retarget(&lp.header, &preheader);
            }
        }
        function.cfg.disconnect(pred, &lp.header);
        function.cfg.connect(pred, &preheader);
    }
    function.cfg.connect(&preheader, &lp.header);

    // Fix up header phis: their outside entries now arrive via the
    // preheader. With several outside predecessors the values merge in a
    // fresh phi placed in the preheader itself.
    if header_preds.len() == 1 {
        if let Some(header_block) = function.cfg.get_block_mut(&lp.header) {
            header_block.rename_phi_label(&header_preds[0], &preheader);
        }
    } else {
        let mut merge_phis: Vec<MIRInstruction> = Vec::new();
        if let Some(header_block) = function.cfg.get_block_mut(&lp.header) {
            for phi in &mut header_block.phi_nodes {
                if let InstKind::Phi { incoming, .. } = &mut phi.kind {
                    let (outside, inside): (Vec<_>, Vec<_>) = incoming
                        .drain(..)
                        .partition(|(_, label)| header_preds.contains(label));
                    *incoming = inside;
                    if !outside.is_empty() {
                        // placeholder dest patched below once we can mint a temp
                        merge_phis.push(MIRInstruction::new(InstKind::Phi {
                            dest: outside[0].0.clone(),
                            incoming: outside,
                        }));
                        incoming.push((MIRValue::Constant(crate::value::Constant::empty()), preheader.clone()));
                    }
                }
            }
        }

        let mut merged_dests: Vec<MIRValue> = Vec::new();
        for phi in &mut merge_phis {
            if let InstKind::Phi { dest, incoming } = &mut phi.kind {
                let ty = incoming
                    .first()
                    .map(|(v, _)| v.ty())
                    .unwrap_or(MIRType::Unknown);
                let merged = MIRValue::Temp(function.new_temp(ty));
                *dest = merged.clone();
                merged_dests.push(merged);
            }
        }
        if let Some(preheader_block) = function.cfg.get_block_mut(&preheader) {
            for phi in merge_phis {
                preheader_block.phi_nodes.push(phi);
            }
        }
        // Patch the placeholder entries to read the merge phis.
        if let Some(header_block) = function.cfg.get_block_mut(&lp.header) {
            let mut merged = merged_dests.into_iter();
            for phi in &mut header_block.phi_nodes {
                if let InstKind::Phi { incoming, .. } = &mut phi.kind {
                    for (value, label) in incoming.iter_mut() {
                        if label == &preheader
                            && matches!(value, MIRValue::Constant(c) if c.ty == MIRType::Empty)
                        {
                            if let Some(dest) = merged.next() {
                                *value = dest;
                            }
                        }
                    }
                }
            }
        }
    }

    Some(preheader)
}

impl FunctionPass for LoopInvariantCodeMotion {
    fn info(&self) -> PassInfo {
        PassInfo {
            name: "licm",
            description: "Hoist loop-invariant code out of loops",
            kind: PassKind::Optimization,
            requires: &[
                analysis::LOOP_ANALYSIS,
                analysis::DOMINANCE,
                analysis::USE_DEF_CHAINS,
            ],
            preserves: PreservationLevel::None,
        }
    }

    fn run_on_function(
        &mut self,
        function: &mut MIRFunction,
        analyses: &mut AnalysisManager,
    ) -> MIRResult<bool> {
        let loops = analyses.loops(function)?;
        let dominance = analyses.dominance(function)?;
        if loops.is_empty() {
            return Ok(false);
        }

        let mut modified = false;
        let ordered: Vec<Loop> = loops.innermost_first().into_iter().cloned().collect();
        for lp in &ordered {
            if self.process_loop(function, &dominance, lp) {
                self.stats.incr("loops_processed");
                modified = true;
            }
        }

        Ok(modified)
    }

    fn stats(&self) -> &PassStats {
        &self.stats
    }
}

impl Default for LoopInvariantCodeMotion {
    fn default() -> Self {
        Self::new()
    }
}
