//! MIR three-address code instructions
//!
//! The instruction set is a closed tagged union. Every kind answers the
//! same small set of questions the analyses and passes need: which values
//! it defines, which it uses, whether it terminates a block, and whether it
//! has observable side effects.

use crate::value::{Constant, FunctionRef, MIRValue, Variable};
use md_common::SourceLocation;
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};
use std::fmt;

/// Binary operation kinds
///
/// Shift operations are folded into this enum rather than kept as a
/// separate instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Lt,
    Gt,
    Lte,
    Gte,
    Eq,
    Neq,
    StrictEq,
    StrictNeq,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinaryOperator {
    /// Operand order may be swapped without changing the result
    ///
    /// Add is excluded: on strings it concatenates.
    pub fn is_commutative(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Mul
                | BinaryOperator::Eq
                | BinaryOperator::Neq
                | BinaryOperator::StrictEq
                | BinaryOperator::StrictNeq
                | BinaryOperator::And
                | BinaryOperator::Or
                | BinaryOperator::BitAnd
                | BinaryOperator::BitOr
                | BinaryOperator::BitXor
        )
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Lt
                | BinaryOperator::Gt
                | BinaryOperator::Lte
                | BinaryOperator::Gte
                | BinaryOperator::Eq
                | BinaryOperator::Neq
                | BinaryOperator::StrictEq
                | BinaryOperator::StrictNeq
        )
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Add
                | BinaryOperator::Sub
                | BinaryOperator::Mul
                | BinaryOperator::Div
                | BinaryOperator::Mod
                | BinaryOperator::Pow
        )
    }

    /// May the operation raise at runtime (division/modulo by zero)?
    pub fn can_trap(&self) -> bool {
        matches!(self, BinaryOperator::Div | BinaryOperator::Mod)
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::Pow => "**",
            BinaryOperator::Lt => "<",
            BinaryOperator::Gt => ">",
            BinaryOperator::Lte => "<=",
            BinaryOperator::Gte => ">=",
            BinaryOperator::Eq => "==",
            BinaryOperator::Neq => "!=",
            BinaryOperator::StrictEq => "===",
            BinaryOperator::StrictNeq => "!==",
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
            BinaryOperator::BitAnd => "&",
            BinaryOperator::BitOr => "|",
            BinaryOperator::BitXor => "^",
            BinaryOperator::Shl => "<<",
            BinaryOperator::Shr => ">>",
        };
        write!(f, "{}", symbol)
    }
}

/// Unary operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOperator {
    Neg,
    Not,
    BitNot,
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            UnaryOperator::Neg => "-",
            UnaryOperator::Not => "not",
            UnaryOperator::BitNot => "~",
        };
        write!(f, "{}", symbol)
    }
}

/// The closed set of MIR instruction kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstKind {
    /// dest = constant
    LoadConst { dest: MIRValue, constant: Constant },
    /// dest = source
    Copy { dest: MIRValue, source: MIRValue },
    /// dest = variable
    LoadVar { dest: MIRValue, var: Variable },
    /// variable = source
    StoreVar { var: Variable, source: MIRValue },
    /// dest = left op right
    BinaryOp {
        dest: MIRValue,
        op: BinaryOperator,
        left: MIRValue,
        right: MIRValue,
    },
    /// dest = op operand
    UnaryOp {
        dest: MIRValue,
        op: UnaryOperator,
        operand: MIRValue,
    },
    /// dest = condition ? if_true : if_false (side-effect free)
    Select {
        dest: MIRValue,
        condition: MIRValue,
        if_true: MIRValue,
        if_false: MIRValue,
    },
    /// goto target
    Jump { target: String },
    /// if condition goto true_target else false_target
    ///
    /// A missing false target means fallthrough to the next emitted block.
    CondJump {
        condition: MIRValue,
        true_target: String,
        false_target: Option<String>,
    },
    /// dest = phi(value : predecessor, ...)
    Phi {
        dest: MIRValue,
        incoming: Vec<(MIRValue, String)>,
    },
    /// dest = call func(args)
    Call {
        dest: Option<MIRValue>,
        func: FunctionRef,
        args: Vec<MIRValue>,
    },
    /// return value
    Return { value: Option<MIRValue> },
    /// print value
    Print { value: MIRValue },
    /// assert condition, "message"; traps when false
    Assert {
        condition: MIRValue,
        message: Option<String>,
    },
    /// Lexical scope begin hint, no runtime effect
    ScopeBegin { scope_id: u16 },
    /// Lexical scope end hint
    ScopeEnd { scope_id: u16 },
    /// dest = new array of size
    ArrayCreate { dest: MIRValue, size: MIRValue },
    /// dest = array[index]
    ArrayGet {
        dest: MIRValue,
        array: MIRValue,
        index: MIRValue,
    },
    /// array[index] = value
    ArraySet {
        array: MIRValue,
        index: MIRValue,
        value: MIRValue,
    },
    /// append value to array
    ArrayAppend { array: MIRValue, value: MIRValue },
    /// dest = length of array
    ArrayLength { dest: MIRValue, array: MIRValue },
    /// dest = object.attr
    GetAttr {
        dest: MIRValue,
        object: MIRValue,
        attr: String,
    },
    /// object.attr = value
    SetAttr {
        object: MIRValue,
        attr: String,
        value: MIRValue,
    },
    /// No operation
    Nop,
    /// Discard a value
    Pop { value: MIRValue },
}

/// A MIR instruction: a kind plus an optional source location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MIRInstruction {
    pub kind: InstKind,
    pub loc: Option<SourceLocation>,
}

impl MIRInstruction {
    pub fn new(kind: InstKind) -> Self {
        Self { kind, loc: None }
    }

    pub fn at(mut self, loc: SourceLocation) -> Self {
        self.loc = Some(loc);
        self
    }

    /// Values written by this instruction
    pub fn defs(&self) -> SmallVec<[MIRValue; 1]> {
        match &self.kind {
            InstKind::LoadConst { dest, .. }
            | InstKind::Copy { dest, .. }
            | InstKind::LoadVar { dest, .. }
            | InstKind::BinaryOp { dest, .. }
            | InstKind::UnaryOp { dest, .. }
            | InstKind::Select { dest, .. }
            | InstKind::Phi { dest, .. }
            | InstKind::ArrayCreate { dest, .. }
            | InstKind::ArrayGet { dest, .. }
            | InstKind::ArrayLength { dest, .. }
            | InstKind::GetAttr { dest, .. } => smallvec![dest.clone()],
            InstKind::StoreVar { var, .. } => smallvec![MIRValue::Variable(var.clone())],
            InstKind::Call { dest, .. } => dest.iter().cloned().collect(),
            _ => SmallVec::new(),
        }
    }

    /// Values read by this instruction
    pub fn uses(&self) -> SmallVec<[MIRValue; 2]> {
        match &self.kind {
            InstKind::LoadConst { .. }
            | InstKind::Jump { .. }
            | InstKind::ScopeBegin { .. }
            | InstKind::ScopeEnd { .. }
            | InstKind::Nop => SmallVec::new(),
            InstKind::Copy { source, .. } => smallvec![source.clone()],
            InstKind::LoadVar { var, .. } => smallvec![MIRValue::Variable(var.clone())],
            InstKind::StoreVar { source, .. } => smallvec![source.clone()],
            InstKind::BinaryOp { left, right, .. } => smallvec![left.clone(), right.clone()],
            InstKind::UnaryOp { operand, .. } => smallvec![operand.clone()],
            InstKind::Select {
                condition,
                if_true,
                if_false,
                ..
            } => smallvec![condition.clone(), if_true.clone(), if_false.clone()],
            InstKind::CondJump { condition, .. } => smallvec![condition.clone()],
            InstKind::Phi { incoming, .. } => {
                incoming.iter().map(|(value, _)| value.clone()).collect()
            }
            InstKind::Call { func, args, .. } => {
                let mut uses: SmallVec<[MIRValue; 2]> =
                    smallvec![MIRValue::FunctionRef(func.clone())];
                uses.extend(args.iter().cloned());
                uses
            }
            InstKind::Return { value } => value.iter().cloned().collect(),
            InstKind::Print { value } => smallvec![value.clone()],
            InstKind::Assert { condition, .. } => smallvec![condition.clone()],
            InstKind::ArrayCreate { size, .. } => smallvec![size.clone()],
            InstKind::ArrayGet { array, index, .. } => smallvec![array.clone(), index.clone()],
            InstKind::ArraySet {
                array,
                index,
                value,
            } => smallvec![array.clone(), index.clone(), value.clone()],
            InstKind::ArrayAppend { array, value } => smallvec![array.clone(), value.clone()],
            InstKind::ArrayLength { array, .. } => smallvec![array.clone()],
            InstKind::GetAttr { object, .. } => smallvec![object.clone()],
            InstKind::SetAttr { object, value, .. } => smallvec![object.clone(), value.clone()],
            InstKind::Pop { value } => smallvec![value.clone()],
        }
    }

    /// Replace every use of `old` with `new`, mutating operand slots in place
    pub fn replace_use(&mut self, old: &MIRValue, new: &MIRValue) {
        let replace = |slot: &mut MIRValue| {
            if slot == old {
                *slot = new.clone();
            }
        };

        match &mut self.kind {
            InstKind::Copy { source, .. } => replace(source),
            InstKind::LoadVar { var, .. } => {
                if let MIRValue::Variable(new_var) = new {
                    if &MIRValue::Variable(var.clone()) == old {
                        *var = new_var.clone();
                    }
                }
            }
            InstKind::StoreVar { source, .. } => replace(source),
            InstKind::BinaryOp { left, right, .. } => {
                replace(left);
                replace(right);
            }
            InstKind::UnaryOp { operand, .. } => replace(operand),
            InstKind::Select {
                condition,
                if_true,
                if_false,
                ..
            } => {
                replace(condition);
                replace(if_true);
                replace(if_false);
            }
            InstKind::CondJump { condition, .. } => replace(condition),
            InstKind::Phi { incoming, .. } => {
                for (value, _) in incoming.iter_mut() {
                    replace(value);
                }
            }
            InstKind::Call { args, .. } => {
                for arg in args.iter_mut() {
                    replace(arg);
                }
            }
            InstKind::Return { value } => {
                if let Some(value) = value {
                    replace(value);
                }
            }
            InstKind::Print { value } => replace(value),
            InstKind::Assert { condition, .. } => replace(condition),
            InstKind::ArrayCreate { size, .. } => replace(size),
            InstKind::ArrayGet { array, index, .. } => {
                replace(array);
                replace(index);
            }
            InstKind::ArraySet {
                array,
                index,
                value,
            } => {
                replace(array);
                replace(index);
                replace(value);
            }
            InstKind::ArrayAppend { array, value } => {
                replace(array);
                replace(value);
            }
            InstKind::ArrayLength { array, .. } => replace(array),
            InstKind::GetAttr { object, .. } => replace(object),
            InstKind::SetAttr { object, value, .. } => {
                replace(object);
                replace(value);
            }
            InstKind::Pop { value } => replace(value),
            _ => {}
        }
    }

    /// Rewrite the value this instruction defines
    pub fn replace_def(&mut self, old: &MIRValue, new: &MIRValue) {
        let replace = |slot: &mut MIRValue| {
            if slot == old {
                *slot = new.clone();
            }
        };

        match &mut self.kind {
            InstKind::LoadConst { dest, .. }
            | InstKind::Copy { dest, .. }
            | InstKind::LoadVar { dest, .. }
            | InstKind::BinaryOp { dest, .. }
            | InstKind::UnaryOp { dest, .. }
            | InstKind::Select { dest, .. }
            | InstKind::Phi { dest, .. }
            | InstKind::ArrayCreate { dest, .. }
            | InstKind::ArrayGet { dest, .. }
            | InstKind::ArrayLength { dest, .. }
            | InstKind::GetAttr { dest, .. } => replace(dest),
            InstKind::StoreVar { var, .. } => {
                if let (MIRValue::Variable(old_var), MIRValue::Variable(new_var)) = (old, new) {
                    if var == old_var {
                        *var = new_var.clone();
                    }
                }
            }
            InstKind::Call { dest, .. } => {
                if let Some(dest) = dest {
                    replace(dest);
                }
            }
            _ => {}
        }
    }

    /// Does this instruction end a basic block?
    pub fn is_terminator(&self) -> bool {
        matches!(
            self.kind,
            InstKind::Jump { .. } | InstKind::CondJump { .. } | InstKind::Return { .. }
        )
    }

    pub fn is_phi(&self) -> bool {
        matches!(self.kind, InstKind::Phi { .. })
    }

    /// Instructions whose removal would change observable behavior
    pub fn has_side_effects(&self) -> bool {
        matches!(
            self.kind,
            InstKind::Call { .. }
                | InstKind::Print { .. }
                | InstKind::Assert { .. }
                | InstKind::StoreVar { .. }
                | InstKind::ArraySet { .. }
                | InstKind::ArrayAppend { .. }
                | InstKind::SetAttr { .. }
                | InstKind::Return { .. }
        )
    }

    /// Pure computations: safe to deduplicate, hoist, or delete when unused
    pub fn is_pure(&self) -> bool {
        matches!(
            self.kind,
            InstKind::LoadConst { .. }
                | InstKind::Copy { .. }
                | InstKind::BinaryOp { .. }
                | InstKind::UnaryOp { .. }
                | InstKind::Select { .. }
        )
    }

    /// Labels this instruction can transfer control to
    pub fn jump_targets(&self) -> SmallVec<[&str; 2]> {
        match &self.kind {
            InstKind::Jump { target } => smallvec![target.as_str()],
            InstKind::CondJump {
                true_target,
                false_target,
                ..
            } => {
                let mut targets: SmallVec<[&str; 2]> = smallvec![true_target.as_str()];
                if let Some(false_target) = false_target {
                    targets.push(false_target.as_str());
                }
                targets
            }
            _ => SmallVec::new(),
        }
    }

    /// Retarget a jump label (used by jump threading and preheader insertion)
    pub fn retarget(&mut self, old: &str, new: &str) {
        match &mut self.kind {
            InstKind::Jump { target } => {
                if target == old {
                    *target = new.to_string();
                }
            }
            InstKind::CondJump {
                true_target,
                false_target,
                ..
            } => {
                if true_target == old {
                    *true_target = new.to_string();
                }
                if let Some(false_target) = false_target {
                    if false_target == old {
                        *false_target = new.to_string();
                    }
                }
            }
            _ => {}
        }
    }
}

impl fmt::Display for MIRInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            InstKind::LoadConst { dest, constant } => write!(f, "{} = {}", dest, constant),
            InstKind::Copy { dest, source } => write!(f, "{} = {}", dest, source),
            InstKind::LoadVar { dest, var } => write!(f, "{} = {}", dest, var),
            InstKind::StoreVar { var, source } => write!(f, "{} = {}", var, source),
            InstKind::BinaryOp {
                dest,
                op,
                left,
                right,
            } => write!(f, "{} = {} {} {}", dest, left, op, right),
            InstKind::UnaryOp { dest, op, operand } => write!(f, "{} = {} {}", dest, op, operand),
            InstKind::Select {
                dest,
                condition,
                if_true,
                if_false,
            } => write!(f, "{} = {} ? {} : {}", dest, condition, if_true, if_false),
            InstKind::Jump { target } => write!(f, "goto {}", target),
            InstKind::CondJump {
                condition,
                true_target,
                false_target,
            } => match false_target {
                Some(false_target) => write!(
                    f,
                    "if {} goto {} else {}",
                    condition, true_target, false_target
                ),
                None => write!(f, "if {} goto {}", condition, true_target),
            },
            InstKind::Phi { dest, incoming } => {
                let args: Vec<String> = incoming
                    .iter()
                    .map(|(value, label)| format!("{}:{}", value, label))
                    .collect();
                write!(f, "{} = φ({})", dest, args.join(", "))
            }
            InstKind::Call { dest, func, args } => {
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                match dest {
                    Some(dest) => write!(f, "{} = call {}({})", dest, func, args.join(", ")),
                    None => write!(f, "call {}({})", func, args.join(", ")),
                }
            }
            InstKind::Return { value } => match value {
                Some(value) => write!(f, "return {}", value),
                None => write!(f, "return"),
            },
            InstKind::Print { value } => write!(f, "print {}", value),
            InstKind::Assert { condition, message } => match message {
                Some(message) => write!(f, "assert {}, \"{}\"", condition, message),
                None => write!(f, "assert {}", condition),
            },
            InstKind::ScopeBegin { scope_id } => write!(f, "begin_scope {}", scope_id),
            InstKind::ScopeEnd { scope_id } => write!(f, "end_scope {}", scope_id),
            InstKind::ArrayCreate { dest, size } => write!(f, "{} = new_array {}", dest, size),
            InstKind::ArrayGet { dest, array, index } => {
                write!(f, "{} = {}[{}]", dest, array, index)
            }
            InstKind::ArraySet {
                array,
                index,
                value,
            } => write!(f, "{}[{}] = {}", array, index, value),
            InstKind::ArrayAppend { array, value } => write!(f, "append {} to {}", value, array),
            InstKind::ArrayLength { dest, array } => write!(f, "{} = len {}", dest, array),
            InstKind::GetAttr { dest, object, attr } => {
                write!(f, "{} = {}.{}", dest, object, attr)
            }
            InstKind::SetAttr {
                object,
                attr,
                value,
            } => write!(f, "{}.{} = {}", object, attr, value),
            InstKind::Nop => write!(f, "nop"),
            InstKind::Pop { value } => write!(f, "pop {}", value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MIRType;
    use crate::value::Temp;

    fn temp(id: u32) -> MIRValue {
        MIRValue::Temp(Temp::new(id, MIRType::Int))
    }

    #[test]
    fn test_binary_defs_and_uses() {
        let inst = MIRInstruction::new(InstKind::BinaryOp {
            dest: temp(2),
            op: BinaryOperator::Add,
            left: temp(0),
            right: temp(1),
        });

        assert_eq!(inst.defs().as_slice(), &[temp(2)]);
        assert_eq!(inst.uses().as_slice(), &[temp(0), temp(1)]);
        assert!(!inst.is_terminator());
        assert!(inst.is_pure());
    }

    #[test]
    fn test_replace_use() {
        let mut inst = MIRInstruction::new(InstKind::BinaryOp {
            dest: temp(2),
            op: BinaryOperator::Mul,
            left: temp(0),
            right: temp(0),
        });

        inst.replace_use(&temp(0), &MIRValue::Constant(Constant::int(3)));
        assert_eq!(
            inst.uses().as_slice(),
            &[
                MIRValue::Constant(Constant::int(3)),
                MIRValue::Constant(Constant::int(3))
            ]
        );
        // the def is untouched
        assert_eq!(inst.defs().as_slice(), &[temp(2)]);
    }

    #[test]
    fn test_call_uses_include_function_ref() {
        let inst = MIRInstruction::new(InstKind::Call {
            dest: Some(temp(3)),
            func: FunctionRef::new("add"),
            args: vec![temp(0), temp(1)],
        });

        let uses = inst.uses();
        assert_eq!(uses.len(), 3);
        assert_eq!(uses[0], MIRValue::FunctionRef(FunctionRef::new("add")));
        assert!(inst.has_side_effects());
    }

    #[test]
    fn test_terminators() {
        assert!(MIRInstruction::new(InstKind::Jump {
            target: "L1".to_string()
        })
        .is_terminator());
        assert!(MIRInstruction::new(InstKind::Return { value: None }).is_terminator());
        assert!(!MIRInstruction::new(InstKind::Nop).is_terminator());
    }

    #[test]
    fn test_jump_targets_and_retarget() {
        let mut inst = MIRInstruction::new(InstKind::CondJump {
            condition: temp(0),
            true_target: "then".to_string(),
            false_target: Some("else".to_string()),
        });

        assert_eq!(inst.jump_targets().as_slice(), &["then", "else"]);
        inst.retarget("else", "join");
        assert_eq!(inst.jump_targets().as_slice(), &["then", "join"]);
    }

    #[test]
    fn test_display_forms() {
        let inst = MIRInstruction::new(InstKind::BinaryOp {
            dest: temp(2),
            op: BinaryOperator::Add,
            left: temp(0),
            right: MIRValue::Constant(Constant::int(1)),
        });
        assert_eq!(inst.to_string(), "t2 = t0 + 1");

        let phi = MIRInstruction::new(InstKind::Phi {
            dest: MIRValue::Variable(Variable::new("x", MIRType::Int).with_version(3)),
            incoming: vec![(temp(0), "then".to_string()), (temp(1), "else".to_string())],
        });
        assert_eq!(phi.to_string(), "x.3 = φ(t0:then, t1:else)");

        let jump = MIRInstruction::new(InstKind::Jump {
            target: "loop_header".to_string(),
        });
        assert_eq!(jump.to_string(), "goto loop_header");
    }

    #[test]
    fn test_commutativity_excludes_add() {
        assert!(BinaryOperator::Mul.is_commutative());
        assert!(BinaryOperator::Eq.is_commutative());
        assert!(!BinaryOperator::Add.is_commutative());
        assert!(!BinaryOperator::Sub.is_commutative());
    }

    #[test]
    fn test_store_var_defines_variable() {
        let var = Variable::new("x", MIRType::Int).with_version(1);
        let inst = MIRInstruction::new(InstKind::StoreVar {
            var: var.clone(),
            source: temp(0),
        });
        assert_eq!(inst.defs().as_slice(), &[MIRValue::Variable(var)]);
        assert!(inst.has_side_effects());
    }
}
