//! Function inlining
//!
//! A module pass over SSA-form MIR. Small callees always inline; larger
//! ones go through a benefit/cost comparison. The callee body is cloned
//! with fresh labels, fresh temporaries, and renamed locals; parameters
//! substitute to the call's arguments; returns join at a synthetic
//! after-call block (a single return site degenerates to a copy).
//! Directly recursive calls never inline at their own site.

use crate::function::MIRFunction;
use crate::instruction::{InstKind, MIRInstruction};
use crate::module::MIRModule;
use crate::pass::{ModulePass, PassInfo, PassKind, PassStats, PreservationLevel};
use crate::pass_manager::AnalysisManager;
use crate::pipeline::OptimizationConfig;
use crate::value::{Constant, MIRValue, Temp, VarScope, Variable};
use crate::MIRResult;
use log::debug;
use std::collections::HashMap;

pub struct FunctionInlining {
    config: OptimizationConfig,
    next_inline_id: usize,
    stats: PassStats,
}

impl FunctionInlining {
    pub fn new(config: OptimizationConfig) -> Self {
        Self {
            config,
            next_inline_id: 0,
            stats: PassStats::new(),
        }
    }

    /// Cost model: always inline tiny callees, otherwise weigh benefit
    /// against the callee's size
    fn should_inline(&self, callee: &MIRFunction, args: &[MIRValue]) -> bool {
        let size = callee.instruction_count();
        if size <= self.config.inline_always_size {
            return true;
        }

        let constant_args = args.iter().filter(|a| a.is_constant()).count();
        let mut benefit =
            self.config.inline_benefit_base + self.config.inline_const_arg_bonus * constant_args;
        if size < self.config.inline_small_callee_size {
            benefit += self.config.inline_small_callee_bonus;
        }
        benefit >= size
    }

    /// Find the next eligible call site in a caller
    fn find_call_site(
        &self,
        module: &MIRModule,
        caller_name: &str,
    ) -> Option<(String, usize, String, Vec<MIRValue>, Option<MIRValue>)> {
        let caller = module.get_function(caller_name)?;
        for (label, block) in &caller.cfg.blocks {
            for (index, inst) in block.instructions.iter().enumerate() {
                let InstKind::Call { dest, func, args } = &inst.kind else {
                    continue;
                };
                // never inline a direct recursion at its own call site
                if func.name == caller_name {
                    continue;
                }
                let Some(callee) = module.get_function(&func.name) else {
                    continue;
                };
                // a self-recursive callee would smuggle its recursive call
                // into every caller and unroll without bound; leave it be
                if is_directly_recursive(callee) {
                    continue;
                }
                if self.should_inline(callee, args) {
                    return Some((
                        label.clone(),
                        index,
                        func.name.clone(),
                        args.clone(),
                        dest.clone(),
                    ));
                }
            }
        }
        None
    }

    /// Splice a cloned callee body in place of one call instruction
    fn inline_call(
        &mut self,
        caller: &mut MIRFunction,
        callee: &MIRFunction,
        call_block: &str,
        call_index: usize,
        args: &[MIRValue],
        dest: Option<MIRValue>,
    ) {
        let inline_id = self.next_inline_id;
        self.next_inline_id += 1;

        // Fresh labels for every callee block, fresh temp id range.
        let mut label_map: HashMap<String, String> = HashMap::new();
        for label in callee.cfg.blocks.keys() {
            let fresh = caller
                .cfg
                .generate_label(&format!("inl{}_{}_", inline_id, label));
            label_map.insert(label.clone(), fresh);
        }
        let temp_base = caller.bump_temp_id(callee.next_temp_id());

        let params: HashMap<&str, &MIRValue> = callee
            .params
            .iter()
            .zip(args.iter())
            .map(|(p, a)| (p.name.as_str(), a))
            .collect();

        let rewriter = ValueRewriter {
            inline_id,
            temp_base,
            params,
        };

        // Clone blocks with rewritten values, labels, and jump targets.
        let mut cloned: Vec<crate::block::BasicBlock> = Vec::new();
        let mut return_sites: Vec<(String, Option<MIRValue>)> = Vec::new();
        for (label, block) in &callee.cfg.blocks {
            let new_label = label_map[label].clone();
            let mut new_block = crate::block::BasicBlock::new(new_label.clone());

            for phi in &block.phi_nodes {
                let mut phi = phi.clone();
                rewriter.rewrite_instruction(&mut phi);
                if let InstKind::Phi { incoming, .. } = &mut phi.kind {
                    for (_, pred) in incoming.iter_mut() {
                        if let Some(mapped) = label_map.get(pred) {
                            *pred = mapped.clone();
                        }
                    }
                }
                new_block.phi_nodes.push(phi);
            }

            for inst in &block.instructions {
                let mut inst = inst.clone();
                rewriter.rewrite_instruction(&mut inst);
                match &mut inst.kind {
                    InstKind::Return { value } => {
                        return_sites.push((new_label.clone(), value.clone()));
                        // replaced with a jump to the after-call block below
                        new_block.instructions.push(inst);
                    }
                    InstKind::Jump { target } => {
                        if let Some(mapped) = label_map.get(target) {
                            *target = mapped.clone();
                        }
                        new_block.instructions.push(inst);
                    }
                    InstKind::CondJump {
                        true_target,
                        false_target,
                        ..
                    } => {
                        if let Some(mapped) = label_map.get(true_target) {
                            *true_target = mapped.clone();
                        }
                        if let Some(false_target) = false_target {
                            if let Some(mapped) = label_map.get(false_target) {
                                *false_target = mapped.clone();
                            }
                        }
                        new_block.instructions.push(inst);
                    }
                    _ => new_block.instructions.push(inst),
                }
            }

            cloned.push(new_block);
        }

        let entry_clone = label_map[callee.cfg.entry_label().expect("callee entry")].clone();
        let after_label = caller.cfg.generate_label("after_call");

        // Split the calling block around the call instruction.
        let (tail, old_successors) = {
            let block = caller
                .cfg
                .get_block_mut(call_block)
                .expect("calling block exists");
            let tail = block.instructions.split_off(call_index + 1);
            block.instructions.pop(); // the call itself
            (tail, block.successors.clone())
        };

        let mut after_block = crate::block::BasicBlock::new(after_label.clone());
        after_block.instructions = tail;
        caller.cfg.add_block(after_block);

        for succ in &old_successors {
            caller.cfg.disconnect(call_block, succ);
            caller.cfg.connect(&after_label, succ);
            if let Some(succ_block) = caller.cfg.get_block_mut(succ) {
                succ_block.rename_phi_label(call_block, &after_label);
            }
        }

        // The calling block now falls into the cloned entry.
        if let Some(block) = caller.cfg.get_block_mut(call_block) {
            block.instructions.push(MIRInstruction::new(InstKind::Jump {
                target: entry_clone.clone(),
            }));
        }

        // Install cloned blocks and wire their internal edges.
        for block in cloned {
            caller.cfg.add_block(block);
        }
        let cloned_labels: Vec<String> = label_map.values().cloned().collect();
        for label in &cloned_labels {
            let targets: Vec<String> = caller
                .cfg
                .get_block(label)
                .and_then(|b| b.terminator())
                .map(|t| t.jump_targets().iter().map(|s| s.to_string()).collect())
                .unwrap_or_default();
            for target in targets {
                caller.cfg.connect(label, &target);
            }
        }
        caller.cfg.connect(call_block, &entry_clone);

        // Rewrite returns: single site copies straight into the call's
        // destination, multiple sites merge through a phi in the after
        // block.
        let single_return = return_sites.len() == 1;
        let mut phi_incoming: Vec<(MIRValue, String)> = Vec::new();
        for (site_label, value) in &return_sites {
            if let Some(block) = caller.cfg.get_block_mut(site_label) {
                let returned = value
                    .clone()
                    .unwrap_or_else(|| MIRValue::Constant(Constant::empty()));
                block.instructions.pop(); // the cloned Return
                if single_return {
                    if let Some(dest) = &dest {
                        block.instructions.push(MIRInstruction::new(InstKind::Copy {
                            dest: dest.clone(),
                            source: returned,
                        }));
                    }
                } else {
                    phi_incoming.push((returned, site_label.clone()));
                }
                block.instructions.push(MIRInstruction::new(InstKind::Jump {
                    target: after_label.clone(),
                }));
            }
            caller.cfg.connect(site_label, &after_label);
        }
        if !single_return {
            if let Some(dest) = &dest {
                if let Some(after) = caller.cfg.get_block_mut(&after_label) {
                    after.phi_nodes.insert(
                        0,
                        MIRInstruction::new(InstKind::Phi {
                            dest: dest.clone(),
                            incoming: phi_incoming,
                        }),
                    );
                }
            }
        }

        self.stats.incr("calls_inlined");
        debug!(
            "inlining: expanded call to '{}' inside '{}'",
            callee.name, caller.name
        );
    }
}

fn is_directly_recursive(function: &MIRFunction) -> bool {
    function
        .cfg
        .blocks
        .values()
        .flat_map(|b| b.instructions.iter())
        .any(|i| matches!(&i.kind, InstKind::Call { func, .. } if func.name == function.name))
}

fn count_calls(function: &MIRFunction) -> usize {
    function
        .cfg
        .blocks
        .values()
        .flat_map(|b| b.instructions.iter())
        .filter(|i| matches!(i.kind, InstKind::Call { .. }))
        .count()
}

/// Rewrites callee values into the caller's namespace
struct ValueRewriter<'a> {
    inline_id: usize,
    temp_base: u32,
    params: HashMap<&'a str, &'a MIRValue>,
}

impl ValueRewriter<'_> {
    fn rename_variable(&self, var: &Variable) -> MIRValue {
        let mut renamed = Variable {
            name: format!("inl{}_{}", self.inline_id, var.name),
            ..var.clone()
        };
        if renamed.scope == VarScope::Parameter {
            renamed.scope = VarScope::Local;
        }
        MIRValue::Variable(renamed)
    }

    /// Rewrite a read operand: entry-version parameter reads become the
    /// argument value, everything else moves into the caller's namespace
    fn rewrite_use(&self, value: &MIRValue) -> MIRValue {
        match value {
            MIRValue::Temp(t) => MIRValue::Temp(Temp::new(t.id + self.temp_base, t.ty)),
            MIRValue::Variable(var) => {
                if var.version <= 1 {
                    if let Some(arg) = self.params.get(var.name.as_str()) {
                        return (*arg).clone();
                    }
                }
                if var.scope == VarScope::Global {
                    return value.clone();
                }
                self.rename_variable(var)
            }
            other => other.clone(),
        }
    }

    /// Rewrite a written operand: never substitutes arguments
    fn rewrite_def(&self, value: &MIRValue) -> MIRValue {
        match value {
            MIRValue::Temp(t) => MIRValue::Temp(Temp::new(t.id + self.temp_base, t.ty)),
            MIRValue::Variable(var) if var.scope != VarScope::Global => self.rename_variable(var),
            other => other.clone(),
        }
    }

    fn rewrite_instruction(&self, inst: &mut MIRInstruction) {
        // A LoadVar of a parameter cannot hold an arbitrary value in its
        // variable slot; it degrades to a copy of the argument.
        if let InstKind::LoadVar { dest, var } = &inst.kind {
            if var.version <= 1 {
                if let Some(arg) = self.params.get(var.name.as_str()) {
                    inst.kind = InstKind::Copy {
                        dest: dest.clone(),
                        source: (*arg).clone(),
                    };
                }
            }
        }

        for used in inst.uses() {
            let rewritten = self.rewrite_use(&used);
            if rewritten != used {
                inst.replace_use(&used, &rewritten);
            }
        }
        for def in inst.defs() {
            let rewritten = self.rewrite_def(&def);
            if rewritten != def {
                inst.replace_def(&def, &rewritten);
            }
        }
    }
}

impl ModulePass for FunctionInlining {
    fn info(&self) -> PassInfo {
        PassInfo {
            name: "inlining",
            description: "Expand eligible calls into their callers",
            kind: PassKind::Optimization,
            requires: &[],
            preserves: PreservationLevel::None,
        }
    }

    fn run_on_module(
        &mut self,
        module: &mut MIRModule,
        _analyses: &mut AnalysisManager,
    ) -> MIRResult<bool> {
        let mut modified = false;
        let caller_names: Vec<String> = module.functions.keys().cloned().collect();

        // Bounded rounds stand in for the recursion depth limit: a call
        // exposed by round N only inlines in round N+1. Each round's
        // budget is the call count present when the round starts, so the
        // calls a cloned body brings along wait for the next round.
        for _round in 0..self.config.inline_depth_bound {
            let mut round_modified = false;
            for caller_name in &caller_names {
                let mut budget = module
                    .get_function(caller_name)
                    .map(count_calls)
                    .unwrap_or(0);
                while budget > 0 {
                    budget -= 1;
                    let Some((block, index, callee_name, args, dest)) =
                        self.find_call_site(module, caller_name)
                    else {
                        break;
                    };
                    let callee = module
                        .get_function(&callee_name)
                        .cloned()
                        .expect("callee looked up by find_call_site");
                    let Some(caller) = module.get_function_mut(caller_name) else {
                        break;
                    };
                    self.inline_call(caller, &callee, &block, index, &args, dest);
                    round_modified = true;
                    modified = true;
                }
            }
            if !round_modified {
                break;
            }
        }

        Ok(modified)
    }

    fn stats(&self) -> &PassStats {
        &self.stats
    }
}
