//! Algebraic simplification and strength reduction
//!
//! Pattern rewrites applied per block to a fixed point: arithmetic
//! identities, power-of-two strength reductions, boolean and comparison
//! simplifications, and constant reassociation. Identity folds fire only on
//! integer-typed operands; float identities like `x + 0.0` are left alone
//! because of NaN and signed-zero edge cases.

use crate::function::MIRFunction;
use crate::instruction::{BinaryOperator, InstKind, MIRInstruction, UnaryOperator};
use crate::pass::{FunctionPass, PassInfo, PassKind, PassStats, PreservationLevel};
use crate::pass_manager::AnalysisManager;
use crate::types::MIRType;
use crate::value::{Constant, ConstantValue, MIRValue};
use crate::MIRResult;
use std::collections::HashMap;

pub struct StrengthReduction {
    stats: PassStats,
}

impl StrengthReduction {
    pub fn new() -> Self {
        Self {
            stats: PassStats::new(),
        }
    }

    fn simplify_block(&mut self, block: &mut crate::block::BasicBlock) -> bool {
        let mut modified = false;

        loop {
            // Defining expressions earlier in this block, for reassociation.
            let mut defs: HashMap<MIRValue, (BinaryOperator, MIRValue, MIRValue)> = HashMap::new();
            let mut changed = false;

            for inst in &mut block.instructions {
                if let InstKind::BinaryOp {
                    dest,
                    op,
                    left,
                    right,
                } = &inst.kind
                {
                    if let Some(rewrite) =
                        self.rewrite(dest, *op, left, right, &defs)
                    {
                        let loc = inst.loc;
                        *inst = match loc {
                            Some(loc) => MIRInstruction::new(rewrite).at(loc),
                            None => MIRInstruction::new(rewrite),
                        };
                        changed = true;
                    }
                }

                if let InstKind::BinaryOp {
                    dest,
                    op,
                    left,
                    right,
                } = &inst.kind
                {
                    if dest.is_ssa_name() {
                        defs.insert(dest.clone(), (*op, left.clone(), right.clone()));
                    }
                }
            }

            if !changed {
                break;
            }
            modified = true;
        }

        modified
    }

    /// Try every rule for one binary operation
    fn rewrite(
        &mut self,
        dest: &MIRValue,
        op: BinaryOperator,
        left: &MIRValue,
        right: &MIRValue,
        defs: &HashMap<MIRValue, (BinaryOperator, MIRValue, MIRValue)>,
    ) -> Option<InstKind> {
        use BinaryOperator::*;

        let copy = |source: &MIRValue| InstKind::Copy {
            dest: dest.clone(),
            source: source.clone(),
        };
        let load = |constant: Constant| InstKind::LoadConst {
            dest: dest.clone(),
            constant,
        };
        let neg = |operand: &MIRValue| InstKind::UnaryOp {
            dest: dest.clone(),
            op: UnaryOperator::Neg,
            operand: operand.clone(),
        };
        let binary = |op: BinaryOperator, l: MIRValue, r: MIRValue| InstKind::BinaryOp {
            dest: dest.clone(),
            op,
            left: l,
            right: r,
        };

        match op {
            Add => {
                if int_typed(left) && is_int(right, 0) {
                    self.stats.incr("identities_removed");
                    return Some(copy(left));
                }
                if int_typed(right) && is_int(left, 0) {
                    self.stats.incr("identities_removed");
                    return Some(copy(right));
                }
                // (a + k1) + k2 -> a + (k1 + k2)
                if let Some(folded) = reassociate(Add, left, right, defs) {
                    self.stats.incr("reassociated");
                    return Some(InstKind::BinaryOp {
                        dest: dest.clone(),
                        op: Add,
                        left: folded.0,
                        right: MIRValue::Constant(folded.1),
                    });
                }
                None
            }
            Sub => {
                if int_typed(left) && is_int(right, 0) {
                    self.stats.incr("identities_removed");
                    return Some(copy(left));
                }
                if int_typed(left) && left == right {
                    self.stats.incr("identities_removed");
                    return Some(load(Constant::int(0)));
                }
                None
            }
            Mul => {
                if int_typed(left) && is_int(right, 1) {
                    self.stats.incr("identities_removed");
                    return Some(copy(left));
                }
                if int_typed(right) && is_int(left, 1) {
                    self.stats.incr("identities_removed");
                    return Some(copy(right));
                }
                if int_typed(left) && is_int(right, 0) || int_typed(right) && is_int(left, 0) {
                    self.stats.incr("identities_removed");
                    return Some(load(Constant::int(0)));
                }
                if int_typed(left) && is_int(right, -1) {
                    self.stats.incr("multiplications_reduced");
                    return Some(neg(left));
                }
                if int_typed(right) && is_int(left, -1) {
                    self.stats.incr("multiplications_reduced");
                    return Some(neg(right));
                }
                // x * 2 -> x + x; x * 2^n -> x << n
                for (value, constant) in [(left, right), (right, left)] {
                    if !int_typed(value) {
                        continue;
                    }
                    let Some(n) = as_int(constant) else { continue };
                    if n == 2 {
                        self.stats.incr("multiplications_reduced");
                        return Some(binary(Add, value.clone(), value.clone()));
                    }
                    if let Some(shift) = exact_power_of_two(n) {
                        self.stats.incr("multiplications_reduced");
                        return Some(binary(
                            Shl,
                            value.clone(),
                            MIRValue::Constant(Constant::int(shift)),
                        ));
                    }
                }
                if let Some(folded) = reassociate(Mul, left, right, defs) {
                    self.stats.incr("reassociated");
                    return Some(InstKind::BinaryOp {
                        dest: dest.clone(),
                        op: Mul,
                        left: folded.0,
                        right: MIRValue::Constant(folded.1),
                    });
                }
                None
            }
            Div => {
                if is_int(right, 1) {
                    self.stats.incr("divisions_simplified");
                    return Some(copy(left));
                }
                if is_int(right, -1) && int_typed(left) {
                    self.stats.incr("divisions_simplified");
                    return Some(neg(left));
                }
                if is_int(left, 0) && as_int(right).map(|n| n != 0).unwrap_or(false) {
                    self.stats.incr("divisions_simplified");
                    return Some(load(Constant::int(0)));
                }
                if int_typed(left) && left == right {
                    self.stats.incr("divisions_simplified");
                    return Some(load(Constant::int(1)));
                }
                None
            }
            Mod => {
                if int_typed(left) && left == right {
                    self.stats.incr("divisions_simplified");
                    return Some(load(Constant::int(0)));
                }
                // x % 2^n -> x & (2^n - 1); valid for floor modulo with a
                // positive power-of-two divisor in two's complement
                if int_typed(left) {
                    if let Some(n) = as_int(right) {
                        if n >= 2 && (n & (n - 1)) == 0 {
                            self.stats.incr("divisions_simplified");
                            return Some(binary(
                                BitAnd,
                                left.clone(),
                                MIRValue::Constant(Constant::int(n - 1)),
                            ));
                        }
                    }
                }
                None
            }
            Pow => {
                if int_typed(left) && is_int(right, 0) {
                    self.stats.incr("powers_reduced");
                    return Some(load(Constant::int(1)));
                }
                if is_int(right, 1) {
                    self.stats.incr("powers_reduced");
                    return Some(copy(left));
                }
                if is_int(right, 2) {
                    self.stats.incr("powers_reduced");
                    return Some(binary(Mul, left.clone(), left.clone()));
                }
                if is_int(left, 1) {
                    self.stats.incr("powers_reduced");
                    return Some(load(Constant::int(1)));
                }
                if is_int(left, 0) && as_int(right).map(|n| n > 0).unwrap_or(false) {
                    self.stats.incr("powers_reduced");
                    return Some(load(Constant::int(0)));
                }
                None
            }
            And => {
                for (value, other) in [(left, right), (right, left)] {
                    if bool_typed(value) {
                        if is_bool(other, true) {
                            self.stats.incr("booleans_simplified");
                            return Some(copy(value));
                        }
                    }
                    if is_bool(other, false) {
                        self.stats.incr("booleans_simplified");
                        return Some(load(Constant::bool(false)));
                    }
                }
                if bool_typed(left) && left == right {
                    self.stats.incr("booleans_simplified");
                    return Some(copy(left));
                }
                None
            }
            Or => {
                for (value, other) in [(left, right), (right, left)] {
                    if is_bool(other, true) {
                        self.stats.incr("booleans_simplified");
                        return Some(load(Constant::bool(true)));
                    }
                    if bool_typed(value) && is_bool(other, false) {
                        self.stats.incr("booleans_simplified");
                        return Some(copy(value));
                    }
                }
                if bool_typed(left) && left == right {
                    self.stats.incr("booleans_simplified");
                    return Some(copy(left));
                }
                None
            }
            Eq | Lte | Gte | StrictEq => {
                if left == right && reflexive_safe(left) {
                    self.stats.incr("comparisons_simplified");
                    return Some(load(Constant::bool(true)));
                }
                None
            }
            Neq | Lt | Gt | StrictNeq => {
                if left == right && reflexive_safe(left) {
                    self.stats.incr("comparisons_simplified");
                    return Some(load(Constant::bool(false)));
                }
                None
            }
            _ => None,
        }
    }
}

/// (a op k1) op k2 with both constants folds the constants together
fn reassociate(
    op: BinaryOperator,
    left: &MIRValue,
    right: &MIRValue,
    defs: &HashMap<MIRValue, (BinaryOperator, MIRValue, MIRValue)>,
) -> Option<(MIRValue, Constant)> {
    let k2 = right.as_constant()?;
    if k2.ty != MIRType::Int {
        return None;
    }
    let (inner_op, a, k1) = defs.get(left)?;
    if *inner_op != op {
        return None;
    }
    let k1 = k1.as_constant()?;
    if k1.ty != MIRType::Int || a.as_constant().is_some() {
        return None;
    }
    let folded = super::constant_propagation::eval_binary(op, k1, k2)?;
    if folded.ty != MIRType::Int {
        return None;
    }
    Some((a.clone(), folded))
}

fn int_typed(value: &MIRValue) -> bool {
    value.ty() == MIRType::Int
}

fn bool_typed(value: &MIRValue) -> bool {
    value.ty() == MIRType::Bool
}

/// Reflexive comparisons are only safe for types without NaN
fn reflexive_safe(value: &MIRValue) -> bool {
    matches!(value.ty(), MIRType::Int | MIRType::Bool | MIRType::String)
}

fn as_int(value: &MIRValue) -> Option<i64> {
    match value.as_constant()?.value {
        ConstantValue::Int(n) => Some(n),
        _ => None,
    }
}

fn is_int(value: &MIRValue, expected: i64) -> bool {
    as_int(value) == Some(expected)
}

fn is_bool(value: &MIRValue, expected: bool) -> bool {
    matches!(
        value.as_constant().map(|c| &c.value),
        Some(ConstantValue::Bool(b)) if *b == expected
    )
}

/// For n = 2^k with k >= 2, the shift amount k
fn exact_power_of_two(n: i64) -> Option<i64> {
    if n > 2 && (n & (n - 1)) == 0 {
        Some(n.trailing_zeros() as i64)
    } else {
        None
    }
}

impl FunctionPass for StrengthReduction {
    fn info(&self) -> PassInfo {
        PassInfo {
            name: "strength-reduction",
            description: "Algebraic simplification and operator strength reduction",
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
            if self.simplify_block(block) {
                modified = true;
            }
        }
        Ok(modified)
    }

    fn stats(&self) -> &PassStats {
        &self.stats
    }
}

impl Default for StrengthReduction {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BasicBlock;
    use crate::value::Temp;

    fn temp(id: u32) -> MIRValue {
        MIRValue::Temp(Temp::new(id, MIRType::Int))
    }

    fn float_temp(id: u32) -> MIRValue {
        MIRValue::Temp(Temp::new(id, MIRType::Float))
    }

    fn bool_temp(id: u32) -> MIRValue {
        MIRValue::Temp(Temp::new(id, MIRType::Bool))
    }

    fn const_int(n: i64) -> MIRValue {
        MIRValue::Constant(Constant::int(n))
    }

    fn run_on(insts: Vec<MIRInstruction>) -> Vec<MIRInstruction> {
        let mut function = MIRFunction::new("f", vec![], MIRType::Int);
        let mut entry = BasicBlock::new("entry");
        for inst in insts {
            entry.add_instruction(inst);
        }
        entry.add_instruction(MIRInstruction::new(InstKind::Return { value: None }));
        function.cfg.add_block(entry);

        let mut pass = StrengthReduction::new();
        let mut analyses = AnalysisManager::new();
        pass.run_on_function(&mut function, &mut analyses).unwrap();
        function.cfg.get_block("entry").unwrap().instructions.clone()
    }

    fn binary(dest: MIRValue, op: BinaryOperator, left: MIRValue, right: MIRValue) -> MIRInstruction {
        MIRInstruction::new(InstKind::BinaryOp {
            dest,
            op,
            left,
            right,
        })
    }

    #[test]
    fn test_add_zero() {
        let out = run_on(vec![binary(
            temp(1),
            BinaryOperator::Add,
            temp(0),
            const_int(0),
        )]);
        assert_eq!(
            out[0].kind,
            InstKind::Copy {
                dest: temp(1),
                source: temp(0),
            }
        );
    }

    #[test]
    fn test_float_add_zero_untouched() {
        let out = run_on(vec![binary(
            float_temp(1),
            BinaryOperator::Add,
            float_temp(0),
            const_int(0),
        )]);
        assert!(matches!(out[0].kind, InstKind::BinaryOp { .. }));
    }

    #[test]
    fn test_multiply_by_two_becomes_add() {
        let out = run_on(vec![binary(
            temp(1),
            BinaryOperator::Mul,
            temp(0),
            const_int(2),
        )]);
        assert_eq!(
            out[0].kind,
            InstKind::BinaryOp {
                dest: temp(1),
                op: BinaryOperator::Add,
                left: temp(0),
                right: temp(0),
            }
        );
    }

    #[test]
    fn test_multiply_by_eight_becomes_shift() {
        let out = run_on(vec![binary(
            temp(1),
            BinaryOperator::Mul,
            temp(0),
            const_int(8),
        )]);
        assert_eq!(
            out[0].kind,
            InstKind::BinaryOp {
                dest: temp(1),
                op: BinaryOperator::Shl,
                left: temp(0),
                right: const_int(3),
            }
        );
    }

    #[test]
    fn test_multiply_by_negative_one() {
        let out = run_on(vec![binary(
            temp(1),
            BinaryOperator::Mul,
            temp(0),
            const_int(-1),
        )]);
        assert_eq!(
            out[0].kind,
            InstKind::UnaryOp {
                dest: temp(1),
                op: UnaryOperator::Neg,
                operand: temp(0),
            }
        );
    }

    #[test]
    fn test_power_two_becomes_multiply() {
        let out = run_on(vec![binary(
            temp(1),
            BinaryOperator::Pow,
            temp(0),
            const_int(2),
        )]);
        assert_eq!(
            out[0].kind,
            InstKind::BinaryOp {
                dest: temp(1),
                op: BinaryOperator::Mul,
                left: temp(0),
                right: temp(0),
            }
        );
    }

    #[test]
    fn test_power_zero_and_one() {
        let out = run_on(vec![
            binary(temp(1), BinaryOperator::Pow, temp(0), const_int(0)),
            binary(temp(2), BinaryOperator::Pow, temp(0), const_int(1)),
        ]);
        assert_eq!(
            out[0].kind,
            InstKind::LoadConst {
                dest: temp(1),
                constant: Constant::int(1),
            }
        );
        assert_eq!(
            out[1].kind,
            InstKind::Copy {
                dest: temp(2),
                source: temp(0),
            }
        );
    }

    #[test]
    fn test_modulo_power_of_two_becomes_mask() {
        let out = run_on(vec![binary(
            temp(1),
            BinaryOperator::Mod,
            temp(0),
            const_int(8),
        )]);
        assert_eq!(
            out[0].kind,
            InstKind::BinaryOp {
                dest: temp(1),
                op: BinaryOperator::BitAnd,
                left: temp(0),
                right: const_int(7),
            }
        );
    }

    #[test]
    fn test_subtract_self() {
        let out = run_on(vec![binary(
            temp(1),
            BinaryOperator::Sub,
            temp(0),
            temp(0),
        )]);
        assert_eq!(
            out[0].kind,
            InstKind::LoadConst {
                dest: temp(1),
                constant: Constant::int(0),
            }
        );
    }

    #[test]
    fn test_divide_by_one_and_self() {
        let out = run_on(vec![
            binary(temp(1), BinaryOperator::Div, temp(0), const_int(1)),
            binary(temp(2), BinaryOperator::Div, temp(0), temp(0)),
        ]);
        assert_eq!(
            out[0].kind,
            InstKind::Copy {
                dest: temp(1),
                source: temp(0),
            }
        );
        assert_eq!(
            out[1].kind,
            InstKind::LoadConst {
                dest: temp(2),
                constant: Constant::int(1),
            }
        );
    }

    #[test]
    fn test_boolean_identities() {
        let t = MIRValue::Constant(Constant::bool(true));
        let f = MIRValue::Constant(Constant::bool(false));
        let out = run_on(vec![
            binary(bool_temp(1), BinaryOperator::And, bool_temp(0), t.clone()),
            binary(bool_temp(2), BinaryOperator::And, bool_temp(0), f.clone()),
            binary(bool_temp(3), BinaryOperator::Or, bool_temp(0), t),
            binary(bool_temp(4), BinaryOperator::Or, bool_temp(0), f),
            binary(bool_temp(5), BinaryOperator::Or, bool_temp(0), bool_temp(0)),
        ]);
        assert_eq!(
            out[0].kind,
            InstKind::Copy {
                dest: bool_temp(1),
                source: bool_temp(0),
            }
        );
        assert_eq!(
            out[1].kind,
            InstKind::LoadConst {
                dest: bool_temp(2),
                constant: Constant::bool(false),
            }
        );
        assert_eq!(
            out[2].kind,
            InstKind::LoadConst {
                dest: bool_temp(3),
                constant: Constant::bool(true),
            }
        );
        assert_eq!(
            out[3].kind,
            InstKind::Copy {
                dest: bool_temp(4),
                source: bool_temp(0),
            }
        );
        assert_eq!(
            out[4].kind,
            InstKind::Copy {
                dest: bool_temp(5),
                source: bool_temp(0),
            }
        );
    }

    #[test]
    fn test_reflexive_comparisons() {
        let out = run_on(vec![
            binary(bool_temp(1), BinaryOperator::Eq, temp(0), temp(0)),
            binary(bool_temp(2), BinaryOperator::Lt, temp(0), temp(0)),
        ]);
        assert_eq!(
            out[0].kind,
            InstKind::LoadConst {
                dest: bool_temp(1),
                constant: Constant::bool(true),
            }
        );
        assert_eq!(
            out[1].kind,
            InstKind::LoadConst {
                dest: bool_temp(2),
                constant: Constant::bool(false),
            }
        );
    }

    #[test]
    fn test_float_reflexive_comparison_untouched() {
        // NaN != NaN, so float x == x must not fold
        let out = run_on(vec![binary(
            bool_temp(1),
            BinaryOperator::Eq,
            float_temp(0),
            float_temp(0),
        )]);
        assert!(matches!(out[0].kind, InstKind::BinaryOp { .. }));
    }

    #[test]
    fn test_reassociation() {
        // (t0 + 3) + 4 -> t0 + 7
        let out = run_on(vec![
            binary(temp(1), BinaryOperator::Add, temp(0), const_int(3)),
            binary(temp(2), BinaryOperator::Add, temp(1), const_int(4)),
        ]);
        assert_eq!(
            out[1].kind,
            InstKind::BinaryOp {
                dest: temp(2),
                op: BinaryOperator::Add,
                left: temp(0),
                right: const_int(7),
            }
        );
    }

    #[test]
    fn test_fixed_point_cascade() {
        // t1 = t0 * 1 -> copy t0; t2 = t1 ** 2 stays t1 * t1 referencing
        // the copy; both rewrites land in one run
        let out = run_on(vec![
            binary(temp(1), BinaryOperator::Mul, temp(0), const_int(1)),
            binary(temp(2), BinaryOperator::Pow, temp(1), const_int(2)),
        ]);
        assert!(matches!(out[0].kind, InstKind::Copy { .. }));
        assert_eq!(
            out[1].kind,
            InstKind::BinaryOp {
                dest: temp(2),
                op: BinaryOperator::Mul,
                left: temp(1),
                right: temp(1),
            }
        );
    }
}
