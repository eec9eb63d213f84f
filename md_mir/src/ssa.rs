//! SSA construction
//!
//! Dominance analysis and the standard Cytron-style SSA builder: place phi
//! nodes on dominance frontiers of variable stores, then rename along the
//! dominator tree with per-variable version stacks.

use crate::cfg::Cfg;
use crate::function::MIRFunction;
use crate::instruction::InstKind;
use crate::value::{MIRValue, Variable};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Dominator sets, immediate dominators, and dominance frontiers of a CFG
///
/// Only blocks reachable from the entry participate; unreachable blocks are
/// skipped by construction and by renaming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DominanceInfo {
    /// Reverse post-order over reachable blocks
    pub order: Vec<String>,
    dominators: HashMap<String, HashSet<String>>,
    idom: HashMap<String, String>,
    children: HashMap<String, Vec<String>>,
    frontiers: HashMap<String, HashSet<String>>,
}

impl DominanceInfo {
    pub fn compute(cfg: &Cfg) -> Self {
        let order = cfg.reverse_post_order();
        let reachable: HashSet<&str> = order.iter().map(String::as_str).collect();
        let entry = order.first().cloned();

        // Iterative dataflow: dom(entry) = {entry}; for other blocks,
        // dom(B) = {B} ∪ ⋂ dom(P) over reachable predecessors.
        let mut dominators: HashMap<String, HashSet<String>> = HashMap::new();
        let all: HashSet<String> = order.iter().cloned().collect();
        for label in &order {
            if Some(label) == entry.as_ref() {
                dominators.insert(label.clone(), [label.clone()].into_iter().collect());
            } else {
                dominators.insert(label.clone(), all.clone());
            }
        }

        let mut changed = true;
        while changed {
            changed = false;
            for label in &order {
                if Some(label) == entry.as_ref() {
                    continue;
                }
                let preds: Vec<&String> = cfg
                    .get_block(label)
                    .map(|b| {
                        b.predecessors
                            .iter()
                            .filter(|p| reachable.contains(p.as_str()))
                            .collect()
                    })
                    .unwrap_or_default();

                let mut new_doms = all.clone();
                for pred in &preds {
                    if let Some(pred_doms) = dominators.get(*pred) {
                        new_doms.retain(|d| pred_doms.contains(d));
                    }
                }
                new_doms.insert(label.clone());

                if dominators.get(label) != Some(&new_doms) {
                    dominators.insert(label.clone(), new_doms);
                    changed = true;
                }
            }
        }

        // Immediate dominator: among the strict dominators, the one
        // dominated by all the others (equivalently, with the largest
        // dominator set).
        let mut idom: HashMap<String, String> = HashMap::new();
        for label in &order {
            if Some(label) == entry.as_ref() {
                continue;
            }
            let strict: Vec<&String> = dominators[label].iter().filter(|d| *d != label).collect();
            if let Some(best) = strict
                .iter()
                .max_by_key(|d| dominators.get(**d).map(|s| s.len()).unwrap_or(0))
            {
                idom.insert(label.clone(), (*best).clone());
            }
        }

        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for label in &order {
            if let Some(parent) = idom.get(label) {
                children.entry(parent.clone()).or_default().push(label.clone());
            }
        }

        // Dominance frontiers via the upward walk from each predecessor of
        // a join block.
        let mut frontiers: HashMap<String, HashSet<String>> =
            order.iter().map(|l| (l.clone(), HashSet::new())).collect();
        for label in &order {
            let preds: Vec<String> = cfg
                .get_block(label)
                .map(|b| {
                    b.predecessors
                        .iter()
                        .filter(|p| reachable.contains(p.as_str()))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            if preds.len() < 2 {
                continue;
            }
            let stop = idom.get(label);
            for pred in preds {
                let mut runner = pred;
                while Some(&runner) != stop {
                    frontiers.entry(runner.clone()).or_default().insert(label.clone());
                    match idom.get(&runner) {
                        Some(next) => runner = next.clone(),
                        None => break,
                    }
                }
            }
        }

        Self {
            order,
            dominators,
            idom,
            children,
            frontiers,
        }
    }

    /// Does `a` dominate `b`? Every block dominates itself.
    pub fn dominates(&self, a: &str, b: &str) -> bool {
        self.dominators
            .get(b)
            .map(|doms| doms.contains(a))
            .unwrap_or(false)
    }

    pub fn strictly_dominates(&self, a: &str, b: &str) -> bool {
        a != b && self.dominates(a, b)
    }

    pub fn immediate_dominator(&self, block: &str) -> Option<&str> {
        self.idom.get(block).map(String::as_str)
    }

    pub fn dominator_tree_children(&self, block: &str) -> &[String] {
        self.children.get(block).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn frontier(&self, block: &str) -> Option<&HashSet<String>> {
        self.frontiers.get(block)
    }

    pub fn is_reachable(&self, block: &str) -> bool {
        self.dominators.contains_key(block)
    }
}

/// Rewrite a function into SSA form; returns the number of phi nodes placed
pub fn construct_ssa(function: &mut MIRFunction) -> usize {
    let dominance = DominanceInfo::compute(&function.cfg);
    let Some(entry) = dominance.order.first().cloned() else {
        return 0;
    };

    // Collect stores per variable name, plus a prototype carrying the
    // variable's type and scope.
    let mut def_blocks: HashMap<String, HashSet<String>> = HashMap::new();
    let mut prototypes: HashMap<String, Variable> = HashMap::new();

    for param in &function.params {
        prototypes.insert(param.name.clone(), param.clone());
        def_blocks
            .entry(param.name.clone())
            .or_default()
            .insert(entry.clone());
    }

    for label in &dominance.order {
        let Some(block) = function.cfg.get_block(label) else {
            continue;
        };
        for inst in block.all_instructions() {
            for def in inst.defs() {
                if let MIRValue::Variable(var) = def {
                    prototypes.entry(var.name.clone()).or_insert_with(|| var.clone());
                    def_blocks
                        .entry(var.name.clone())
                        .or_default()
                        .insert(label.clone());
                }
            }
        }
    }

    // Phi placement: the standard iterated dominance frontier worklist.
    let mut phis_placed = 0usize;
    let mut names: Vec<String> = def_blocks.keys().cloned().collect();
    names.sort();
    for name in &names {
        let proto = prototypes[name].clone();
        let blocks = &def_blocks[name];

        let mut placed: HashSet<String> = HashSet::new();
        let mut worklist: Vec<String> = blocks.iter().cloned().collect();
        worklist.sort();

        while let Some(block_label) = worklist.pop() {
            let Some(frontier) = dominance.frontier(&block_label) else {
                continue;
            };
            let mut frontier: Vec<&String> = frontier.iter().collect();
            frontier.sort();
            for join in frontier {
                if !placed.insert(join.clone()) {
                    continue;
                }
                let preds = function
                    .cfg
                    .get_block(join)
                    .map(|b| b.predecessors.clone())
                    .unwrap_or_default();
                let incoming = preds
                    .iter()
                    .map(|p| (MIRValue::Variable(proto.with_version(0)), p.clone()))
                    .collect();
                if let Some(join_block) = function.cfg.get_block_mut(join) {
                    join_block.phi_nodes.push(crate::instruction::MIRInstruction::new(
                        InstKind::Phi {
                            dest: MIRValue::Variable(proto.with_version(0)),
                            incoming,
                        },
                    ));
                }
                phis_placed += 1;
                if !def_blocks[name].contains(join) {
                    worklist.push(join.clone());
                }
            }
        }
    }

    // Renaming along the dominator tree.
    let mut renamer = Renamer {
        dominance: &dominance,
        prototypes: &prototypes,
        stacks: HashMap::new(),
        counters: HashMap::new(),
    };
    for param in &function.params {
        renamer.stacks.insert(param.name.clone(), vec![1]);
        renamer.counters.insert(param.name.clone(), 1);
    }
    renamer.rename_block(function, &entry);

    debug!(
        "ssa: function '{}' received {} phi node(s)",
        function.name, phis_placed
    );
    phis_placed
}

struct Renamer<'a> {
    dominance: &'a DominanceInfo,
    prototypes: &'a HashMap<String, Variable>,
    stacks: HashMap<String, Vec<u32>>,
    counters: HashMap<String, u32>,
}

impl Renamer<'_> {
    fn current_version(&self, name: &str) -> u32 {
        self.stacks
            .get(name)
            .and_then(|s| s.last())
            .copied()
            .unwrap_or(0)
    }

    fn versioned(&self, name: &str, version: u32) -> Variable {
        self.prototypes
            .get(name)
            .map(|p| p.with_version(version))
            .unwrap_or_else(|| Variable::new(name, crate::types::MIRType::Unknown).with_version(version))
    }

    fn rename_block(&mut self, function: &mut MIRFunction, label: &str) {
        let mut pushed: Vec<String> = Vec::new();

        if let Some(block) = function.cfg.get_block_mut(label) {
            // Phi destinations define new versions first.
            for phi in &mut block.phi_nodes {
                if let InstKind::Phi { dest, .. } = &mut phi.kind {
                    if let MIRValue::Variable(var) = dest {
                        let name = var.name.clone();
                        let version = {
                            let counter = self.counters.entry(name.clone()).or_insert(0);
                            *counter += 1;
                            *counter
                        };
                        self.stacks.entry(name.clone()).or_default().push(version);
                        *var = var.with_version(version);
                        pushed.push(name);
                    }
                }
            }

            // Body: uses see the current version, definitions push new ones.
            for inst in &mut block.instructions {
                let uses = inst.uses();
                let mut seen: HashSet<String> = HashSet::new();
                for used in uses {
                    if let MIRValue::Variable(var) = used {
                        if var.version == 0 && seen.insert(var.name.clone()) {
                            let version = self
                                .stacks
                                .get(&var.name)
                                .and_then(|s| s.last())
                                .copied()
                                .unwrap_or(0);
                            if version > 0 {
                                let old = MIRValue::Variable(var.clone());
                                let new = MIRValue::Variable(var.with_version(version));
                                inst.replace_use(&old, &new);
                            }
                        }
                    }
                }

                for def in inst.defs() {
                    if let MIRValue::Variable(var) = def {
                        if var.version == 0 {
                            let name = var.name.clone();
                            let counter = self.counters.entry(name.clone()).or_insert(0);
                            *counter += 1;
                            let version = *counter;
                            self.stacks.entry(name.clone()).or_default().push(version);
                            let old = MIRValue::Variable(var.clone());
                            let new = MIRValue::Variable(var.with_version(version));
                            inst.replace_def(&old, &new);
                            pushed.push(name);
                        }
                    }
                }
            }
        }

        // Fill the matching incoming slot of every successor phi.
        let successors: Vec<String> = function
            .cfg
            .get_block(label)
            .map(|b| b.successors.clone())
            .unwrap_or_default();
        for succ in &successors {
            if let Some(succ_block) = function.cfg.get_block_mut(succ) {
                for phi in &mut succ_block.phi_nodes {
                    if let InstKind::Phi { dest, incoming } = &mut phi.kind {
                        let name = match dest {
                            MIRValue::Variable(var) => var.name.clone(),
                            _ => continue,
                        };
                        let version = self.current_version(&name);
                        for (value, pred) in incoming.iter_mut() {
                            if pred == label {
                                *value = MIRValue::Variable(self.versioned(&name, version));
                            }
                        }
                    }
                }
            }
        }

        let children: Vec<String> = self
            .dominance
            .dominator_tree_children(label)
            .to_vec();
        for child in children {
            self.rename_block(function, &child);
        }

        for name in pushed.into_iter().rev() {
            if let Some(stack) = self.stacks.get_mut(&name) {
                stack.pop();
            }
        }
    }
}
