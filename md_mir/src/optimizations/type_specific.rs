//! Type-specific optimization
//!
//! Uses declared parameter and local types (including collapsed union
//! annotations) to refine the type tags carried by temporaries and
//! variable occurrences. Refined tags are what let strength reduction fire
//! its integer-only rules and let the code generator pick typed opcodes.

use crate::function::MIRFunction;
use crate::instruction::InstKind;
use crate::pass::{FunctionPass, PassInfo, PassKind, PassStats, PreservationLevel};
use crate::pass_manager::AnalysisManager;
use crate::types::{binary_result_type, unary_result_type, MIRType};
use crate::value::{MIRValue, Temp, Variable};
use crate::MIRResult;
use std::collections::HashMap;

pub struct TypeSpecificOptimization {
    stats: PassStats,
}

impl TypeSpecificOptimization {
    pub fn new() -> Self {
        Self {
            stats: PassStats::new(),
        }
    }

    /// Declared types by variable name, unions collapsed when single
    fn collect_declared(&self, function: &MIRFunction) -> HashMap<String, MIRType> {
        let mut declared: HashMap<String, MIRType> = HashMap::new();

        for var in function.params.iter().chain(function.locals.values()) {
            if var.ty != MIRType::Unknown {
                declared.insert(var.name.clone(), var.ty);
            }
            if let Some(union) = &var.union_type {
                if let Some(single) = union.as_single() {
                    declared.insert(var.name.clone(), single);
                }
            }
        }

        declared
    }

    /// Infer types for every SSA value to a fixed point
    fn infer(
        &self,
        function: &MIRFunction,
        declared: &HashMap<String, MIRType>,
    ) -> HashMap<MIRValue, MIRType> {
        let mut resolved: HashMap<MIRValue, MIRType> = HashMap::new();

        let lookup = |value: &MIRValue, resolved: &HashMap<MIRValue, MIRType>| -> MIRType {
            let own = value.ty();
            if own != MIRType::Unknown {
                return own;
            }
            if let Some(ty) = resolved.get(value) {
                return *ty;
            }
            if let MIRValue::Variable(var) = value {
                if let Some(ty) = declared.get(&var.name) {
                    return *ty;
                }
            }
            MIRType::Unknown
        };

        let mut changed = true;
        while changed {
            changed = false;
            for block in function.cfg.blocks.values() {
                for inst in block.all_instructions() {
                    let inferred = match &inst.kind {
                        InstKind::LoadConst { constant, .. } => Some(constant.ty),
                        InstKind::Copy { source, .. } => Some(lookup(source, &resolved)),
                        InstKind::LoadVar { var, .. } => {
                            Some(lookup(&MIRValue::Variable(var.clone()), &resolved))
                        }
                        InstKind::StoreVar { source, .. } => Some(lookup(source, &resolved)),
                        InstKind::BinaryOp {
                            op, left, right, ..
                        } => Some(binary_result_type(
                            *op,
                            lookup(left, &resolved),
                            lookup(right, &resolved),
                        )),
                        InstKind::UnaryOp { op, operand, .. } => {
                            Some(unary_result_type(*op, lookup(operand, &resolved)))
                        }
                        InstKind::Select {
                            if_true, if_false, ..
                        } => {
                            let a = lookup(if_true, &resolved);
                            let b = lookup(if_false, &resolved);
                            (a == b).then_some(a)
                        }
                        InstKind::Phi { incoming, .. } => {
                            let mut tys = incoming.iter().map(|(v, _)| lookup(v, &resolved));
                            match tys.next() {
                                Some(first) if first != MIRType::Unknown => {
                                    tys.all(|t| t == first).then_some(first)
                                }
                                _ => None,
                            }
                        }
                        InstKind::ArrayLength { .. } => Some(MIRType::Int),
                        InstKind::ArrayCreate { .. } => Some(MIRType::Array),
                        _ => None,
                    };

                    let Some(ty) = inferred else { continue };
                    if ty == MIRType::Unknown || ty == MIRType::Error {
                        continue;
                    }
                    for def in inst.defs() {
                        if resolved.get(&def) != Some(&ty) {
                            resolved.insert(def.clone(), ty);
                            changed = true;
                        }
                    }
                }
            }
        }

        resolved
    }
}

/// Apply a refined type to a value, returning the retagged copy
fn retag(value: &MIRValue, ty: MIRType) -> Option<MIRValue> {
    match value {
        MIRValue::Temp(t) if t.ty == MIRType::Unknown => {
            Some(MIRValue::Temp(Temp::new(t.id, ty)))
        }
        MIRValue::Variable(var) if var.ty == MIRType::Unknown => {
            Some(MIRValue::Variable(Variable {
                ty,
                ..var.clone()
            }))
        }
        _ => None,
    }
}

impl FunctionPass for TypeSpecificOptimization {
    fn info(&self) -> PassInfo {
        PassInfo {
            name: "type-specific-optimization",
            description: "Refine value type tags from declared and inferred types",
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
        let declared = self.collect_declared(function);
        let resolved = self.infer(function, &declared);
        if resolved.is_empty() {
            return Ok(false);
        }

        let mut refined = 0usize;
        for block in function.cfg.blocks.values_mut() {
            for inst in block.all_instructions_mut() {
                for used in inst.uses() {
                    if let Some(ty) = resolved.get(&used) {
                        if let Some(retagged) = retag(&used, *ty) {
                            inst.replace_use(&used, &retagged);
                            refined += 1;
                        }
                    }
                }
                for def in inst.defs() {
                    if let Some(ty) = resolved.get(&def) {
                        if let Some(retagged) = retag(&def, *ty) {
                            inst.replace_def(&def, &retagged);
                            refined += 1;
                        }
                    }
                }
            }
        }

        self.stats.add("types_refined", refined);
        Ok(refined > 0)
    }

    fn stats(&self) -> &PassStats {
        &self.stats
    }
}

impl Default for TypeSpecificOptimization {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BasicBlock;
    use crate::instruction::{BinaryOperator, MIRInstruction};
    use crate::value::Constant;

    fn untyped(id: u32) -> MIRValue {
        MIRValue::Temp(Temp::new(id, MIRType::Unknown))
    }

    fn run(function: &mut MIRFunction) -> bool {
        let mut pass = TypeSpecificOptimization::new();
        let mut analyses = AnalysisManager::new();
        pass.run_on_function(function, &mut analyses).unwrap()
    }

    #[test]
    fn test_types_flow_from_constants() {
        // t0 = 2 (int); t1 = t0 + t0 -> t1 refines to int at def and use
        let mut function = MIRFunction::new("f", vec![], MIRType::Int);
        let mut entry = BasicBlock::new("entry");
        entry.add_instruction(MIRInstruction::new(InstKind::LoadConst {
            dest: untyped(0),
            constant: Constant::int(2),
        }));
        entry.add_instruction(MIRInstruction::new(InstKind::BinaryOp {
            dest: untyped(1),
            op: BinaryOperator::Add,
            left: untyped(0),
            right: untyped(0),
        }));
        entry.add_instruction(MIRInstruction::new(InstKind::Return {
            value: Some(untyped(1)),
        }));
        function.cfg.add_block(entry);

        assert!(run(&mut function));

        let entry = function.cfg.get_block("entry").unwrap();
        let InstKind::BinaryOp { dest, left, .. } = &entry.instructions[1].kind else {
            panic!("expected binary op");
        };
        assert_eq!(dest.ty(), MIRType::Int);
        assert_eq!(left.ty(), MIRType::Int);
        let InstKind::Return { value: Some(value) } = &entry.instructions[2].kind else {
            panic!("expected return");
        };
        assert_eq!(value.ty(), MIRType::Int);
    }

    #[test]
    fn test_types_flow_from_declared_params() {
        let n = Variable::parameter("n", MIRType::Int);
        let mut function = MIRFunction::new("f", vec![n.clone()], MIRType::Int);
        let mut entry = BasicBlock::new("entry");
        // the use site carries Unknown even though the param declares int
        let mut use_site = n.with_version(1);
        use_site.ty = MIRType::Unknown;
        entry.add_instruction(MIRInstruction::new(InstKind::BinaryOp {
            dest: untyped(0),
            op: BinaryOperator::Mul,
            left: MIRValue::Variable(use_site),
            right: MIRValue::Constant(Constant::int(2)),
        }));
        entry.add_instruction(MIRInstruction::new(InstKind::Return {
            value: Some(untyped(0)),
        }));
        function.cfg.add_block(entry);

        assert!(run(&mut function));
        let entry = function.cfg.get_block("entry").unwrap();
        let InstKind::BinaryOp { dest, .. } = &entry.instructions[0].kind else {
            panic!("expected binary op");
        };
        assert_eq!(dest.ty(), MIRType::Int);
    }

    #[test]
    fn test_division_refines_to_float() {
        let mut function = MIRFunction::new("f", vec![], MIRType::Float);
        let mut entry = BasicBlock::new("entry");
        entry.add_instruction(MIRInstruction::new(InstKind::BinaryOp {
            dest: untyped(0),
            op: BinaryOperator::Div,
            left: MIRValue::Constant(Constant::int(1)),
            right: MIRValue::Constant(Constant::int(2)),
        }));
        entry.add_instruction(MIRInstruction::new(InstKind::Return {
            value: Some(untyped(0)),
        }));
        function.cfg.add_block(entry);

        assert!(run(&mut function));
        let entry = function.cfg.get_block("entry").unwrap();
        let InstKind::BinaryOp { dest, .. } = &entry.instructions[0].kind else {
            panic!("expected binary op");
        };
        assert_eq!(dest.ty(), MIRType::Float);
    }

    #[test]
    fn test_already_typed_function_unmodified() {
        let mut function = MIRFunction::new("f", vec![], MIRType::Int);
        let mut entry = BasicBlock::new("entry");
        entry.add_instruction(MIRInstruction::new(InstKind::LoadConst {
            dest: MIRValue::Temp(Temp::new(0, MIRType::Int)),
            constant: Constant::int(2),
        }));
        entry.add_instruction(MIRInstruction::new(InstKind::Return {
            value: Some(MIRValue::Temp(Temp::new(0, MIRType::Int))),
        }));
        function.cfg.add_block(entry);

        assert!(!run(&mut function));
    }
}
