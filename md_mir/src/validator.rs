//! MIR validator
//!
//! Structural checks run before and after passes. Violations that mean a
//! pass produced garbage are errors; conditions that legitimately occur in
//! still-under-construction IR (unreachable blocks, phi entries missing
//! for a predecessor, reads of never-stored variables) are warnings.

use crate::function::MIRFunction;
use crate::instruction::InstKind;
use crate::module::MIRModule;
use crate::ssa::DominanceInfo;
use crate::value::{MIRValue, VarScope};
use md_common::{Diagnostic, Diagnostics};
use std::collections::{HashMap, HashSet};

/// Call targets accepted without a module definition
pub const BUILTIN_FUNCTIONS: [&str; 6] = [
    "print",
    "len",
    "to_string",
    "to_int",
    "to_float",
    "abs",
];

/// Validate every function plus module-level rules
pub fn validate_module(module: &MIRModule) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();

    for function in module.functions.values() {
        diagnostics.extend(validate_function(function));

        // Calls must land on a module function or a known builtin.
        for block in function.cfg.blocks.values() {
            for inst in block.instructions.iter() {
                if let InstKind::Call { func, .. } = &inst.kind {
                    let known = module.functions.contains_key(&func.name)
                        || BUILTIN_FUNCTIONS.contains(&func.name.as_str());
                    if !known {
                        diagnostics.add(Diagnostic::error(format!(
                            "function '{}' calls unknown function '{}'",
                            function.name, func.name
                        )));
                    }
                }
            }
        }
    }

    if let Some(main) = &module.main_function {
        if !module.functions.contains_key(main) {
            diagnostics.add(Diagnostic::error(format!(
                "main function '{}' is not defined in module '{}'",
                main, module.name
            )));
        }
    }

    diagnostics
}

/// Validate one function's structural invariants
pub fn validate_function(function: &MIRFunction) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();
    let cfg = &function.cfg;

    let Some(entry) = cfg.entry_label() else {
        diagnostics.add(Diagnostic::error(format!(
            "function '{}' has no entry block",
            function.name
        )));
        return diagnostics;
    };
    if cfg.get_block(entry).is_none() {
        diagnostics.add(Diagnostic::error(format!(
            "function '{}' entry block '{}' does not exist",
            function.name, entry
        )));
        return diagnostics;
    }

    check_terminators(function, &mut diagnostics);
    check_edges(function, &mut diagnostics);
    check_phis(function, &mut diagnostics);
    check_ssa(function, &mut diagnostics);

    let reachable = cfg.reachable_blocks();
    for label in cfg.blocks.keys() {
        if !reachable.contains(label) {
            diagnostics.add(
                Diagnostic::warning(format!(
                    "function '{}' block '{}' is unreachable",
                    function.name, label
                ))
                .with_help("remove the block or add an edge from a reachable block"),
            );
        }
    }

    diagnostics
}

fn check_terminators(function: &MIRFunction, diagnostics: &mut Diagnostics) {
    for (label, block) in &function.cfg.blocks {
        match block.instructions.last() {
            Some(last) if last.is_terminator() => {}
            _ => diagnostics.add(Diagnostic::error(format!(
                "function '{}' block '{}' does not end with a terminator",
                function.name, label
            ))),
        }

        for inst in block.instructions.iter().rev().skip(1) {
            if inst.is_terminator() {
                diagnostics.add(Diagnostic::error(format!(
                    "function '{}' block '{}' has a terminator before its end",
                    function.name, label
                )));
            }
        }

        // Phis belong in the phi list, never in the body.
        if block.instructions.iter().any(|i| i.is_phi()) {
            diagnostics.add(Diagnostic::error(format!(
                "function '{}' block '{}' has a phi after non-phi instructions",
                function.name, label
            )));
        }

        // Jump targets must name real blocks.
        if let Some(terminator) = block.terminator() {
            for target in terminator.jump_targets() {
                if function.cfg.get_block(target).is_none() {
                    diagnostics.add(Diagnostic::error(format!(
                        "function '{}' block '{}' jumps to undefined label '{}'",
                        function.name, label, target
                    )));
                }
            }
        }
    }
}

fn check_edges(function: &MIRFunction, diagnostics: &mut Diagnostics) {
    for (label, block) in &function.cfg.blocks {
        for succ in &block.successors {
            let reciprocal = function
                .cfg
                .get_block(succ)
                .map(|s| s.predecessors.iter().any(|p| p == label))
                .unwrap_or(false);
            if !reciprocal {
                diagnostics.add(Diagnostic::error(format!(
                    "function '{}' edge {} -> {} has no reciprocal predecessor entry",
                    function.name, label, succ
                )));
            }
        }
        for pred in &block.predecessors {
            let reciprocal = function
                .cfg
                .get_block(pred)
                .map(|p| p.successors.iter().any(|s| s == label))
                .unwrap_or(false);
            if !reciprocal {
                diagnostics.add(Diagnostic::error(format!(
                    "function '{}' edge {} -> {} has no reciprocal successor entry",
                    function.name, pred, label
                )));
            }
        }
    }
}

fn check_phis(function: &MIRFunction, diagnostics: &mut Diagnostics) {
    for (label, block) in &function.cfg.blocks {
        let preds: HashSet<&str> = block.predecessors.iter().map(String::as_str).collect();
        for phi in &block.phi_nodes {
            let InstKind::Phi { dest, incoming } = &phi.kind else {
                continue;
            };
            let mut seen: HashSet<&str> = HashSet::new();
            for (_, pred) in incoming {
                if !preds.contains(pred.as_str()) {
                    diagnostics.add(Diagnostic::error(format!(
                        "function '{}' block '{}': phi for {} has an entry for non-predecessor '{}'",
                        function.name, label, dest, pred
                    )));
                }
                if !seen.insert(pred.as_str()) {
                    diagnostics.add(Diagnostic::error(format!(
                        "function '{}' block '{}': phi for {} has duplicate entries for '{}'",
                        function.name, label, dest, pred
                    )));
                }
            }
            for pred in &preds {
                if !seen.contains(pred) {
                    diagnostics.add(Diagnostic::warning(format!(
                        "function '{}' block '{}': phi for {} is missing an entry for predecessor '{}'",
                        function.name, label, dest, pred
                    )));
                }
            }
        }
    }
}

fn check_ssa(function: &MIRFunction, diagnostics: &mut Diagnostics) {
    let dominance = DominanceInfo::compute(&function.cfg);

    // Positions: all phis share position 0, body instructions follow.
    let mut def_sites: HashMap<MIRValue, (String, usize)> = HashMap::new();
    for (label, block) in &function.cfg.blocks {
        for phi in &block.phi_nodes {
            for def in phi.defs() {
                record_def(function, &mut def_sites, diagnostics, def, label, 0);
            }
        }
        for (index, inst) in block.instructions.iter().enumerate() {
            for def in inst.defs() {
                record_def(function, &mut def_sites, diagnostics, def, label, index + 1);
            }
        }
    }

    for (label, block) in &function.cfg.blocks {
        if !dominance.is_reachable(label) {
            continue;
        }
        // Phi uses are attributed to the predecessor edge, not checked for
        // dominance here.
        for (index, inst) in block.instructions.iter().enumerate() {
            let position = index + 1;
            for used in inst.uses() {
                if !used.is_ssa_name() {
                    if let MIRValue::Variable(var) = &used {
                        if var.version == 0 && var.scope != VarScope::Parameter {
                            diagnostics.add(Diagnostic::warning(format!(
                                "function '{}' block '{}': use of '{}' with no reaching definition",
                                function.name, label, var
                            )));
                        }
                    }
                    continue;
                }

                // Entry-version parameters are defined implicitly on entry.
                if let MIRValue::Variable(var) = &used {
                    if var.scope == VarScope::Parameter && var.version == 1 {
                        continue;
                    }
                }

                match def_sites.get(&used) {
                    None => diagnostics.add(Diagnostic::error(format!(
                        "function '{}' block '{}': use of undefined value {}",
                        function.name, label, used
                    ))),
                    Some((def_block, def_position)) => {
                        let dominated = if def_block == label {
                            *def_position < position
                        } else {
                            dominance.strictly_dominates(def_block, label)
                        };
                        if !dominated {
                            diagnostics.add(Diagnostic::error(format!(
                                "function '{}' block '{}': use of {} is not dominated by its definition in '{}'",
                                function.name, label, used, def_block
                            )));
                        }
                    }
                }
            }
        }
    }
}

fn record_def(
    function: &MIRFunction,
    def_sites: &mut HashMap<MIRValue, (String, usize)>,
    diagnostics: &mut Diagnostics,
    def: MIRValue,
    label: &str,
    position: usize,
) {
    if !def.is_ssa_name() {
        return;
    }
    if let Some((existing_block, _)) = def_sites.get(&def) {
        diagnostics.add(Diagnostic::error(format!(
            "function '{}': {} is defined more than once (blocks '{}' and '{}')",
            function.name, def, existing_block, label
        )));
        return;
    }
    def_sites.insert(def, (label.to_string(), position));
}
