//! MIR value representations
//!
//! Every operand in the MIR is one of four variants: an immutable constant,
//! a compiler temporary, a user-named variable, or a symbolic function
//! reference. Identity rules matter here: temporaries compare by id,
//! variables by (name, version), constants by type tag and payload.

use crate::types::{MIRType, UnionType};
use md_runtime::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Payload of a constant value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConstantValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Empty,
}

impl PartialEq for ConstantValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ConstantValue::Int(a), ConstantValue::Int(b)) => a == b,
            // Bit equality so constants stay usable as hash keys
            (ConstantValue::Float(a), ConstantValue::Float(b)) => a.to_bits() == b.to_bits(),
            (ConstantValue::Str(a), ConstantValue::Str(b)) => a == b,
            (ConstantValue::Bool(a), ConstantValue::Bool(b)) => a == b,
            (ConstantValue::Empty, ConstantValue::Empty) => true,
            _ => false,
        }
    }
}

impl Eq for ConstantValue {}

impl Hash for ConstantValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            ConstantValue::Int(n) => {
                0u8.hash(state);
                n.hash(state);
            }
            ConstantValue::Float(f) => {
                1u8.hash(state);
                f.to_bits().hash(state);
            }
            ConstantValue::Str(s) => {
                2u8.hash(state);
                s.hash(state);
            }
            ConstantValue::Bool(b) => {
                3u8.hash(state);
                b.hash(state);
            }
            ConstantValue::Empty => 4u8.hash(state),
        }
    }
}

impl fmt::Display for ConstantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstantValue::Int(n) => write!(f, "{}", n),
            ConstantValue::Float(x) => write!(f, "{}", x),
            ConstantValue::Str(s) => write!(f, "\"{}\"", s.escape_default()),
            ConstantValue::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            ConstantValue::Empty => write!(f, "null"),
        }
    }
}

/// An immutable literal with a type tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constant {
    pub value: ConstantValue,
    pub ty: MIRType,
}

impl Constant {
    /// Create a constant, inferring the type tag from the payload
    pub fn new(value: ConstantValue) -> Self {
        let ty = match &value {
            ConstantValue::Int(_) => MIRType::Int,
            ConstantValue::Float(_) => MIRType::Float,
            ConstantValue::Str(s) => infer_string_type(s),
            ConstantValue::Bool(_) => MIRType::Bool,
            ConstantValue::Empty => MIRType::Empty,
        };
        Self { value, ty }
    }

    /// Create a constant with an explicit type tag
    pub fn with_type(value: ConstantValue, ty: MIRType) -> Self {
        Self { value, ty }
    }

    pub fn int(n: i64) -> Self {
        Self::new(ConstantValue::Int(n))
    }

    pub fn float(f: f64) -> Self {
        Self::new(ConstantValue::Float(f))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::new(ConstantValue::Str(s.into()))
    }

    pub fn bool(b: bool) -> Self {
        Self::new(ConstantValue::Bool(b))
    }

    pub fn empty() -> Self {
        Self::new(ConstantValue::Empty)
    }

    /// Bridge into the runtime value model, used by the constant folder
    pub fn to_runtime(&self) -> Value {
        match &self.value {
            ConstantValue::Int(n) => Value::Int(*n),
            ConstantValue::Float(f) => Value::Float(*f),
            ConstantValue::Str(s) => Value::Str(s.clone()),
            ConstantValue::Bool(b) => Value::Bool(*b),
            ConstantValue::Empty => Value::Empty,
        }
    }

    /// Bridge back from the runtime value model
    pub fn from_runtime(value: Value) -> Self {
        match value {
            Value::Int(n) => Constant::int(n),
            Value::Float(f) => Constant::float(f),
            Value::Str(s) => Constant::string(s),
            Value::Bool(b) => Constant::bool(b),
            Value::Empty => Constant::empty(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        self.to_runtime().is_truthy()
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.value {
            ConstantValue::Int(n) => Some(n),
            _ => None,
        }
    }
}

/// URL detection heuristic shared with the lowerer
fn infer_string_type(s: &str) -> MIRType {
    const URL_PREFIXES: [&str; 4] = ["http://", "https://", "ftp://", "file://"];
    if URL_PREFIXES.iter().any(|p| s.starts_with(p)) {
        MIRType::Url
    } else {
        MIRType::String
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// A compiler-synthesized SSA temporary
///
/// Identity is the numeric id alone; the type tag is carried alongside but
/// does not participate in equality or hashing. Fresh ids come from
/// `MIRFunction::new_temp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Temp {
    pub id: u32,
    pub ty: MIRType,
}

impl Temp {
    pub fn new(id: u32, ty: MIRType) -> Self {
        Self { id, ty }
    }
}

impl PartialEq for Temp {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Temp {}

impl Hash for Temp {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Temp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.id)
    }
}

/// Where a variable lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarScope {
    Parameter,
    Local,
    Global,
}

/// A user-named storage location
///
/// Identity is (name, SSA version); version 0 denotes pre-SSA. The optional
/// union type carries flow-sensitive type refinements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub ty: MIRType,
    pub version: u32,
    pub scope: VarScope,
    pub union_type: Option<UnionType>,
}

impl Variable {
    pub fn new(name: impl Into<String>, ty: MIRType) -> Self {
        Self {
            name: name.into(),
            ty,
            version: 0,
            scope: VarScope::Local,
            union_type: None,
        }
    }

    pub fn parameter(name: impl Into<String>, ty: MIRType) -> Self {
        Self {
            scope: VarScope::Parameter,
            ..Self::new(name, ty)
        }
    }

    pub fn global(name: impl Into<String>, ty: MIRType) -> Self {
        Self {
            scope: VarScope::Global,
            ..Self::new(name, ty)
        }
    }

    /// Derive the same variable at a different SSA version
    pub fn with_version(&self, version: u32) -> Self {
        Self {
            version,
            ..self.clone()
        }
    }

    pub fn is_pre_ssa(&self) -> bool {
        self.version == 0
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.version == other.version
    }
}

impl Eq for Variable {}

impl Hash for Variable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.version.hash(state);
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version == 0 {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.name, self.version)
        }
    }
}

/// A symbolic reference to another function by name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionRef {
    pub name: String,
}

impl FunctionRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.name)
    }
}

/// Any MIR operand
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MIRValue {
    Constant(Constant),
    Temp(Temp),
    Variable(Variable),
    FunctionRef(FunctionRef),
}

impl MIRValue {
    pub fn ty(&self) -> MIRType {
        match self {
            MIRValue::Constant(c) => c.ty,
            MIRValue::Temp(t) => t.ty,
            MIRValue::Variable(v) => v.ty,
            MIRValue::FunctionRef(_) => MIRType::Function,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, MIRValue::Constant(_))
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match self {
            MIRValue::Constant(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_temp(&self) -> Option<&Temp> {
        match self {
            MIRValue::Temp(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            MIRValue::Variable(v) => Some(v),
            _ => None,
        }
    }

    /// True for values that can only be defined once (SSA names)
    ///
    /// Pre-SSA variables (version 0) may be stored many times and are
    /// excluded.
    pub fn is_ssa_name(&self) -> bool {
        match self {
            MIRValue::Temp(_) => true,
            MIRValue::Variable(v) => v.version > 0,
            _ => false,
        }
    }
}

impl From<Constant> for MIRValue {
    fn from(c: Constant) -> Self {
        MIRValue::Constant(c)
    }
}

impl From<Temp> for MIRValue {
    fn from(t: Temp) -> Self {
        MIRValue::Temp(t)
    }
}

impl From<Variable> for MIRValue {
    fn from(v: Variable) -> Self {
        MIRValue::Variable(v)
    }
}

impl From<FunctionRef> for MIRValue {
    fn from(f: FunctionRef) -> Self {
        MIRValue::FunctionRef(f)
    }
}

impl fmt::Display for MIRValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MIRValue::Constant(c) => write!(f, "{}", c),
            MIRValue::Temp(t) => write!(f, "{}", t),
            MIRValue::Variable(v) => write!(f, "{}", v),
            MIRValue::FunctionRef(r) => write!(f, "{}", r),
        }
    }
}
