//! MIR type system for Machine Dialect
//!
//! Type representations plus the inference and coercion rules the optimizer
//! relies on.

use crate::instruction::{BinaryOperator, UnaryOperator};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Types in the MIR
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum MIRType {
    Int,
    Float,
    String,
    Bool,
    /// The null/none type
    Empty,
    Url,
    Function,
    Array,
    Dict,
    /// Type yet to be inferred
    Unknown,
    /// Result of an invalid operation
    Error,
}

impl MIRType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, MIRType::Int | MIRType::Float)
    }

    pub fn is_comparable(&self) -> bool {
        matches!(
            self,
            MIRType::Int | MIRType::Float | MIRType::String | MIRType::Bool
        )
    }
}

impl fmt::Display for MIRType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MIRType::Int => "int",
            MIRType::Float => "float",
            MIRType::String => "string",
            MIRType::Bool => "bool",
            MIRType::Empty => "empty",
            MIRType::Url => "url",
            MIRType::Function => "function",
            MIRType::Array => "array",
            MIRType::Dict => "dict",
            MIRType::Unknown => "unknown",
            MIRType::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// A union of several possible types, used for flow-sensitive annotations
///
/// The member list is kept sorted and deduplicated so two unions with the
/// same members compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnionType {
    types: Vec<MIRType>,
}

impl UnionType {
    pub fn new(mut types: Vec<MIRType>) -> Self {
        types.sort();
        types.dedup();
        Self { types }
    }

    pub fn members(&self) -> &[MIRType] {
        &self.types
    }

    pub fn contains(&self, ty: MIRType) -> bool {
        self.types.contains(&ty)
    }

    /// The single member type, if this union has collapsed to one
    pub fn as_single(&self) -> Option<MIRType> {
        match self.types.as_slice() {
            [ty] => Some(*ty),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl fmt::Display for UnionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.types.iter().map(|t| t.to_string()).collect();
        write!(f, "{}", parts.join(" | "))
    }
}

/// Determine the result type when coercing two operand types
///
/// Equal types stay put, mixed numerics widen to float, a string operand
/// makes the whole expression a string. Anything else has no coercion.
pub fn coerce_types(left: MIRType, right: MIRType) -> Option<MIRType> {
    if left == right {
        return Some(left);
    }

    if left.is_numeric() && right.is_numeric() {
        return Some(MIRType::Float);
    }

    if left == MIRType::String || right == MIRType::String {
        return Some(MIRType::String);
    }

    None
}

/// Result type of a binary operation
pub fn binary_result_type(op: BinaryOperator, left: MIRType, right: MIRType) -> MIRType {
    use BinaryOperator::*;

    match op {
        Eq | Neq | StrictEq | StrictNeq | Lt | Gt | Lte | Gte => MIRType::Bool,
        And | Or => MIRType::Bool,
        // Division always produces a float
        Div => {
            if left.is_numeric() && right.is_numeric() {
                MIRType::Float
            } else {
                MIRType::Error
            }
        }
        Add | Sub | Mul | Mod | Pow => coerce_types(left, right).unwrap_or(MIRType::Error),
        BitAnd | BitOr | BitXor | Shl | Shr => {
            if left == MIRType::Int && right == MIRType::Int {
                MIRType::Int
            } else {
                MIRType::Error
            }
        }
    }
}

/// Result type of a unary operation
pub fn unary_result_type(op: UnaryOperator, operand: MIRType) -> MIRType {
    match op {
        UnaryOperator::Neg => {
            if operand.is_numeric() {
                operand
            } else {
                MIRType::Error
            }
        }
        UnaryOperator::Not => MIRType::Bool,
        UnaryOperator::BitNot => {
            if operand == MIRType::Int {
                MIRType::Int
            } else {
                MIRType::Error
            }
        }
    }
}
