//! Sparse conditional constant propagation
//!
//! Tracks a lattice of known-constant SSA values, propagates through copies
//! and phis, rewrites uses to constant operands, and folds arithmetic using
//! the runtime operator library so folded results match the VM bit for bit.
//! Operations the runtime would trap on (division by zero) are left alone.

use crate::function::MIRFunction;
use crate::instruction::{BinaryOperator, InstKind, MIRInstruction, UnaryOperator};
use crate::pass::{FunctionPass, PassInfo, PassKind, PassStats, PreservationLevel};
use crate::pass_manager::AnalysisManager;
use crate::value::{Constant, MIRValue};
use crate::MIRResult;
use md_runtime::ops;
use md_runtime::Value;
use std::collections::HashMap;

/// Lattice state of one SSA value
#[derive(Debug, Clone, PartialEq)]
enum Lattice {
    /// Known to be this constant on every path
    Const(Constant),
    /// Defined by something we cannot evaluate
    Varying,
}

pub struct ConstantPropagation {
    stats: PassStats,
}

impl ConstantPropagation {
    pub fn new() -> Self {
        Self {
            stats: PassStats::new(),
        }
    }

    /// One propagation sweep; returns whether anything changed
    fn sweep(&mut self, function: &mut MIRFunction) -> bool {
        let lattice = self.evaluate(function);
        let mut modified = false;

        let labels: Vec<String> = function.cfg.blocks.keys().cloned().collect();
        for label in labels {
            let Some(block) = function.cfg.get_block_mut(&label) else {
                continue;
            };

            for inst in block.all_instructions_mut() {
                // Rewrite known-constant uses into constant operands. Phi
                // incoming slots keep their SSA names so arity stays intact.
                if !inst.is_phi() {
                    for used in inst.uses() {
                        if used.is_constant() {
                            continue;
                        }
                        if let Some(Lattice::Const(constant)) = lattice.get(&used) {
                            inst.replace_use(&used, &MIRValue::Constant(constant.clone()));
                            self.stats.incr("uses_rewritten");
                            modified = true;
                        }
                    }
                }

                // Fold whole instructions whose operands are now constant.
                if let Some(folded) = fold_instruction(inst) {
                    *inst = folded;
                    self.stats.incr("instructions_folded");
                    modified = true;
                }
            }
        }

        modified
    }

    /// Abstract evaluation to a fixed point over the lattice
    fn evaluate(&self, function: &MIRFunction) -> HashMap<MIRValue, Lattice> {
        let mut lattice: HashMap<MIRValue, Lattice> = HashMap::new();
        let mut changed = true;

        while changed {
            changed = false;
            for block in function.cfg.blocks.values() {
                for inst in block.all_instructions() {
                    for def in inst.defs() {
                        if !def.is_ssa_name() {
                            continue;
                        }
                        let state = transfer(inst, &lattice);
                        // Values only ever move down the lattice:
                        // unknown -> constant -> varying.
                        let new_state = match (lattice.get(&def), state) {
                            (Some(Lattice::Varying), _) => continue,
                            (Some(Lattice::Const(a)), Lattice::Const(ref b)) if a == b => continue,
                            (Some(Lattice::Const(_)), _) => Lattice::Varying,
                            (None, state) => state,
                        };
                        lattice.insert(def, new_state);
                        changed = true;
                    }
                }
            }
        }

        lattice
    }
}

/// Abstract transfer function for one instruction
fn transfer(inst: &MIRInstruction, lattice: &HashMap<MIRValue, Lattice>) -> Lattice {
    let known = |value: &MIRValue| -> Option<Constant> {
        match value {
            MIRValue::Constant(c) => Some(c.clone()),
            other => match lattice.get(other) {
                Some(Lattice::Const(c)) => Some(c.clone()),
                _ => None,
            },
        }
    };

    match &inst.kind {
        InstKind::LoadConst { constant, .. } => Lattice::Const(constant.clone()),
        InstKind::Copy { source, .. } | InstKind::StoreVar { source, .. } => {
            known(source).map(Lattice::Const).unwrap_or(Lattice::Varying)
        }
        InstKind::LoadVar { var, .. } => known(&MIRValue::Variable(var.clone()))
            .map(Lattice::Const)
            .unwrap_or(Lattice::Varying),
        InstKind::BinaryOp {
            op, left, right, ..
        } => match (known(left), known(right)) {
            (Some(l), Some(r)) => eval_binary(*op, &l, &r)
                .map(Lattice::Const)
                .unwrap_or(Lattice::Varying),
            _ => Lattice::Varying,
        },
        InstKind::UnaryOp { op, operand, .. } => match known(operand) {
            Some(v) => eval_unary(*op, &v)
                .map(Lattice::Const)
                .unwrap_or(Lattice::Varying),
            None => Lattice::Varying,
        },
        InstKind::Select {
            condition,
            if_true,
            if_false,
            ..
        } => match known(condition) {
            Some(c) => {
                let chosen = if c.is_truthy() { if_true } else { if_false };
                known(chosen).map(Lattice::Const).unwrap_or(Lattice::Varying)
            }
            None => Lattice::Varying,
        },
        InstKind::Phi { incoming, .. } => {
            // All incoming values must agree on the same constant.
            let mut agreed: Option<Constant> = None;
            for (value, _) in incoming {
                match known(value) {
                    Some(c) => match &agreed {
                        None => agreed = Some(c),
                        Some(existing) if *existing == c => {}
                        _ => return Lattice::Varying,
                    },
                    None => return Lattice::Varying,
                }
            }
            agreed.map(Lattice::Const).unwrap_or(Lattice::Varying)
        }
        _ => Lattice::Varying,
    }
}

/// Evaluate a binary operator over constants via the runtime library
///
/// `None` means "do not fold": either the types reject the operation or it
/// would trap at runtime (the trap must survive to execution).
pub(crate) fn eval_binary(op: BinaryOperator, left: &Constant, right: &Constant) -> Option<Constant> {
    let a = left.to_runtime();
    let b = right.to_runtime();

    let result: Value = match op {
        BinaryOperator::Add => ops::add(&a, &b).ok()?,
        BinaryOperator::Sub => ops::subtract(&a, &b).ok()?,
        BinaryOperator::Mul => ops::multiply(&a, &b).ok()?,
        BinaryOperator::Div => ops::divide(&a, &b).ok()?,
        BinaryOperator::Mod => ops::modulo(&a, &b).ok()?,
        BinaryOperator::Pow => ops::power(&a, &b).ok()?,
        BinaryOperator::Lt => ops::less_than(&a, &b).ok()?,
        BinaryOperator::Gt => ops::greater_than(&a, &b).ok()?,
        BinaryOperator::Lte => ops::less_than_or_equal(&a, &b).ok()?,
        BinaryOperator::Gte => ops::greater_than_or_equal(&a, &b).ok()?,
        BinaryOperator::Eq => ops::equals(&a, &b),
        BinaryOperator::Neq => ops::not_equals(&a, &b),
        BinaryOperator::StrictEq => ops::strict_equals(&a, &b),
        BinaryOperator::StrictNeq => ops::strict_not_equals(&a, &b),
        BinaryOperator::And => ops::logical_and(&a, &b),
        BinaryOperator::Or => ops::logical_or(&a, &b),
        BinaryOperator::BitAnd => ops::bit_and(&a, &b).ok()?,
        BinaryOperator::BitOr => ops::bit_or(&a, &b).ok()?,
        BinaryOperator::BitXor => ops::bit_xor(&a, &b).ok()?,
        BinaryOperator::Shl => ops::shift_left(&a, &b).ok()?,
        BinaryOperator::Shr => ops::shift_right(&a, &b).ok()?,
    };

    Some(Constant::from_runtime(result))
}

pub(crate) fn eval_unary(op: UnaryOperator, operand: &Constant) -> Option<Constant> {
    let v = operand.to_runtime();
    let result: Value = match op {
        UnaryOperator::Neg => ops::negate(&v).ok()?,
        UnaryOperator::Not => ops::logical_not(&v),
        UnaryOperator::BitNot => ops::bit_not(&v).ok()?,
    };
    Some(Constant::from_runtime(result))
}

/// Fold an instruction with all-constant operands into a LoadConst or Copy
fn fold_instruction(inst: &MIRInstruction) -> Option<MIRInstruction> {
    let loc = inst.loc;
    let folded = match &inst.kind {
        InstKind::BinaryOp {
            dest,
            op,
            left,
            right,
        } => {
            let l = left.as_constant()?;
            let r = right.as_constant()?;
            let constant = eval_binary(*op, l, r)?;
            MIRInstruction::new(InstKind::LoadConst {
                dest: dest.clone(),
                constant,
            })
        }
        InstKind::UnaryOp { dest, op, operand } => {
            let v = operand.as_constant()?;
            let constant = eval_unary(*op, v)?;
            MIRInstruction::new(InstKind::LoadConst {
                dest: dest.clone(),
                constant,
            })
        }
        InstKind::Select {
            dest,
            condition,
            if_true,
            if_false,
        } => {
            let c = condition.as_constant()?;
            let chosen = if c.is_truthy() { if_true } else { if_false };
            MIRInstruction::new(InstKind::Copy {
                dest: dest.clone(),
                source: chosen.clone(),
            })
        }
        InstKind::Copy { dest, source } => {
            let c = source.as_constant()?;
            MIRInstruction::new(InstKind::LoadConst {
                dest: dest.clone(),
                constant: c.clone(),
            })
        }
        _ => return None,
    };

    match loc {
        Some(loc) => Some(folded.at(loc)),
        None => Some(folded),
    }
}

impl FunctionPass for ConstantPropagation {
    fn info(&self) -> PassInfo {
        PassInfo {
            name: "constant-propagation",
            description: "Propagate and fold constant values",
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
        // The sweep both rewrites uses and folds; iterate so a fold feeds
        // the next round of propagation. The lattice height bounds this.
        while self.sweep(function) {
            modified = true;
        }
        Ok(modified)
    }

    fn stats(&self) -> &PassStats {
        &self.stats
    }
}

impl Default for ConstantPropagation {
    fn default() -> Self {
        Self::new()
    }
}
