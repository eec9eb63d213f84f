//! Common subexpression elimination
//!
//! Scoped value numbering down the dominator tree: a pure expression seen
//! again while its first computation dominates the repeat is replaced with
//! a copy. Commutative operators normalize operand order first.

use crate::analysis;
use crate::function::MIRFunction;
use crate::instruction::{BinaryOperator, InstKind, MIRInstruction, UnaryOperator};
use crate::pass::{FunctionPass, PassInfo, PassKind, PassStats, PreservationLevel};
use crate::pass_manager::AnalysisManager;
use crate::value::MIRValue;
use crate::MIRResult;
use std::collections::HashMap;
use std::fmt::Write as _;

/// Canonical key for a pure expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ExprKey {
    Binary(BinaryOperator, MIRValue, MIRValue),
    Unary(UnaryOperator, MIRValue),
}

impl ExprKey {
    fn binary(op: BinaryOperator, left: &MIRValue, right: &MIRValue) -> Self {
        let (mut a, mut b) = (left.clone(), right.clone());
        if op.is_commutative() && order_key(&b) < order_key(&a) {
            std::mem::swap(&mut a, &mut b);
        }
        ExprKey::Binary(op, a, b)
    }
}

/// Stable ordering key for operand normalization
fn order_key(value: &MIRValue) -> String {
    let mut key = String::new();
    let _ = write!(key, "{}", value);
    key
}

pub struct CommonSubexpressionElimination {
    stats: PassStats,
}

impl CommonSubexpressionElimination {
    pub fn new() -> Self {
        Self {
            stats: PassStats::new(),
        }
    }

    /// Walk one dominator-tree node with the scoped expression table
    fn visit_block(
        &mut self,
        function: &mut MIRFunction,
        dominance: &crate::ssa::DominanceInfo,
        label: &str,
        scopes: &mut Vec<HashMap<ExprKey, MIRValue>>,
        modified: &mut bool,
    ) {
        scopes.push(HashMap::new());

        if let Some(block) = function.cfg.get_block_mut(label) {
            for inst in &mut block.instructions {
                let key = match &inst.kind {
                    InstKind::BinaryOp {
                        op, left, right, ..
                    } if !op.can_trap() => Some(ExprKey::binary(*op, left, right)),
                    InstKind::UnaryOp { op, operand, .. } => {
                        Some(ExprKey::Unary(*op, operand.clone()))
                    }
                    _ => None,
                };
                let Some(key) = key else { continue };
                let Some(dest) = inst.defs().first().cloned() else {
                    continue;
                };
                // Only SSA names can be reused safely.
                if !dest.is_ssa_name() {
                    continue;
                }

                let existing = scopes.iter().rev().find_map(|scope| scope.get(&key));
                match existing {
                    Some(previous) => {
                        let previous = previous.clone();
                        *inst = match inst.loc {
                            Some(loc) => MIRInstruction::new(InstKind::Copy {
                                dest: dest.clone(),
                                source: previous,
                            })
                            .at(loc),
                            None => MIRInstruction::new(InstKind::Copy {
                                dest: dest.clone(),
                                source: previous,
                            }),
                        };
                        self.stats.incr("expressions_reused");
                        *modified = true;
                    }
                    None => {
                        scopes
                            .last_mut()
                            .expect("scope pushed above")
                            .insert(key, dest);
                    }
                }
            }
        }

        let children: Vec<String> = dominance.dominator_tree_children(label).to_vec();
        for child in children {
            self.visit_block(function, dominance, &child, scopes, modified);
        }

        scopes.pop();
    }
}

impl FunctionPass for CommonSubexpressionElimination {
    fn info(&self) -> PassInfo {
        PassInfo {
            name: "cse",
            description: "Reuse previously computed pure expressions",
            kind: PassKind::Optimization,
            requires: &[analysis::DOMINANCE],
            preserves: PreservationLevel::Cfg,
        }
    }

    fn run_on_function(
        &mut self,
        function: &mut MIRFunction,
        analyses: &mut AnalysisManager,
    ) -> MIRResult<bool> {
        let dominance = analyses.dominance(function)?;
        let Some(entry) = dominance.order.first().cloned() else {
            return Ok(false);
        };

        let mut modified = false;
        let mut scopes = Vec::new();
        self.visit_block(function, &dominance, &entry, &mut scopes, &mut modified);
        Ok(modified)
    }

    fn stats(&self) -> &PassStats {
        &self.stats
    }
}

impl Default for CommonSubexpressionElimination {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BasicBlock;
    use crate::types::MIRType;
    use crate::value::{Constant, Temp};

    fn temp(id: u32) -> MIRValue {
        MIRValue::Temp(Temp::new(id, MIRType::Int))
    }

    fn run(function: &mut MIRFunction) -> bool {
        let mut pass = CommonSubexpressionElimination::new();
        let mut analyses = AnalysisManager::new();
        pass.run_on_function(function, &mut analyses).unwrap()
    }

    fn add(dest: u32, left: MIRValue, right: MIRValue) -> MIRInstruction {
        MIRInstruction::new(InstKind::BinaryOp {
            dest: temp(dest),
            op: BinaryOperator::Add,
            left,
            right,
        })
    }

    #[test]
    fn test_local_cse() {
        let mut function = MIRFunction::new("f", vec![], MIRType::Int);
        let mut entry = BasicBlock::new("entry");
        entry.add_instruction(add(2, temp(0), temp(1)));
        entry.add_instruction(add(3, temp(0), temp(1)));
        entry.add_instruction(MIRInstruction::new(InstKind::Return {
            value: Some(temp(3)),
        }));
        function.cfg.add_block(entry);

        assert!(run(&mut function));
        let entry = function.cfg.get_block("entry").unwrap();
        assert_eq!(
            entry.instructions[1].kind,
            InstKind::Copy {
                dest: temp(3),
                source: temp(2),
            }
        );
    }

    #[test]
    fn test_commutative_normalization() {
        let mut function = MIRFunction::new("f", vec![], MIRType::Int);
        let mut entry = BasicBlock::new("entry");
        entry.add_instruction(MIRInstruction::new(InstKind::BinaryOp {
            dest: temp(2),
            op: BinaryOperator::Mul,
            left: temp(0),
            right: temp(1),
        }));
        entry.add_instruction(MIRInstruction::new(InstKind::BinaryOp {
            dest: temp(3),
            op: BinaryOperator::Mul,
            left: temp(1),
            right: temp(0),
        }));
        entry.add_instruction(MIRInstruction::new(InstKind::Return {
            value: Some(temp(3)),
        }));
        function.cfg.add_block(entry);

        assert!(run(&mut function));
        let entry = function.cfg.get_block("entry").unwrap();
        assert!(matches!(entry.instructions[1].kind, InstKind::Copy { .. }));
    }

    #[test]
    fn test_global_cse_across_dominating_block() {
        // entry computes t2 = t0 + t1, dominated successor recomputes it
        let mut function = MIRFunction::new("f", vec![], MIRType::Int);
        function.cfg.add_block(BasicBlock::new("entry"));
        function.cfg.add_block(BasicBlock::new("next"));
        function.cfg.connect("entry", "next");

        function
            .cfg
            .get_block_mut("entry")
            .unwrap()
            .add_instruction(add(2, temp(0), temp(1)));
        let next = function.cfg.get_block_mut("next").unwrap();
        next.add_instruction(add(3, temp(0), temp(1)));
        next.add_instruction(MIRInstruction::new(InstKind::Return {
            value: Some(temp(3)),
        }));

        assert!(run(&mut function));
        assert!(matches!(
            function.cfg.get_block("next").unwrap().instructions[0].kind,
            InstKind::Copy { .. }
        ));
    }

    #[test]
    fn test_sibling_branches_do_not_share() {
        // then/else are dominator-tree siblings; neither dominates the other
        let mut function = MIRFunction::new("f", vec![], MIRType::Int);
        for label in ["entry", "then", "else"] {
            function.cfg.add_block(BasicBlock::new(label));
        }
        function.cfg.connect("entry", "then");
        function.cfg.connect("entry", "else");

        function
            .cfg
            .get_block_mut("then")
            .unwrap()
            .add_instruction(add(2, temp(0), temp(1)));
        function
            .cfg
            .get_block_mut("else")
            .unwrap()
            .add_instruction(add(3, temp(0), temp(1)));

        assert!(!run(&mut function));
    }

    #[test]
    fn test_trapping_ops_not_reused() {
        // division may trap, so it is never deduplicated
        let mut function = MIRFunction::new("f", vec![], MIRType::Float);
        let mut entry = BasicBlock::new("entry");
        for dest in [2, 3] {
            entry.add_instruction(MIRInstruction::new(InstKind::BinaryOp {
                dest: temp(dest),
                op: BinaryOperator::Div,
                left: temp(0),
                right: temp(1),
            }));
        }
        entry.add_instruction(MIRInstruction::new(InstKind::Return {
            value: Some(temp(3)),
        }));
        function.cfg.add_block(entry);

        assert!(!run(&mut function));
    }

    #[test]
    fn test_constant_operands_participate() {
        let mut function = MIRFunction::new("f", vec![], MIRType::Int);
        let mut entry = BasicBlock::new("entry");
        let one = MIRValue::Constant(Constant::int(1));
        entry.add_instruction(add(2, temp(0), one.clone()));
        entry.add_instruction(add(3, temp(0), one));
        entry.add_instruction(MIRInstruction::new(InstKind::Return {
            value: Some(temp(3)),
        }));
        function.cfg.add_block(entry);

        assert!(run(&mut function));
    }
}
