//! Per-chunk constant pool
//!
//! Deduplicated by (type tag, payload); indices are 16-bit, so the pool is
//! bounded at 65536 entries. Floats key by bit pattern so NaN payloads
//! still dedup.

use crate::error::{CodegenError, CodegenResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Maximum entries addressable by a u16 pool index
pub const MAX_POOL_ENTRIES: usize = u16::MAX as usize + 1;

/// A constant as stored in a chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BytecodeConstant {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Empty,
}

impl BytecodeConstant {
    /// The on-wire type tag
    pub fn type_tag(&self) -> u8 {
        match self {
            BytecodeConstant::Int(_) => 1,
            BytecodeConstant::Float(_) => 2,
            BytecodeConstant::Str(_) => 3,
            BytecodeConstant::Bool(_) => 4,
            BytecodeConstant::Empty => 5,
        }
    }
}

impl PartialEq for BytecodeConstant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (BytecodeConstant::Int(a), BytecodeConstant::Int(b)) => a == b,
            (BytecodeConstant::Float(a), BytecodeConstant::Float(b)) => {
                a.to_bits() == b.to_bits()
            }
            (BytecodeConstant::Str(a), BytecodeConstant::Str(b)) => a == b,
            (BytecodeConstant::Bool(a), BytecodeConstant::Bool(b)) => a == b,
            (BytecodeConstant::Empty, BytecodeConstant::Empty) => true,
            _ => false,
        }
    }
}

impl Eq for BytecodeConstant {}

impl Hash for BytecodeConstant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_tag().hash(state);
        match self {
            BytecodeConstant::Int(n) => n.hash(state),
            BytecodeConstant::Float(f) => f.to_bits().hash(state),
            BytecodeConstant::Str(s) => s.hash(state),
            BytecodeConstant::Bool(b) => b.hash(state),
            BytecodeConstant::Empty => {}
        }
    }
}

impl fmt::Display for BytecodeConstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BytecodeConstant::Int(n) => write!(f, "{}", n),
            BytecodeConstant::Float(x) => write!(f, "{}", x),
            BytecodeConstant::Str(s) => write!(f, "\"{}\"", s.escape_default()),
            BytecodeConstant::Bool(b) => write!(f, "{}", b),
            BytecodeConstant::Empty => write!(f, "empty"),
        }
    }
}

/// Deduplicating constant table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConstantPool {
    constants: Vec<BytecodeConstant>,
    #[serde(skip)]
    index: HashMap<BytecodeConstant, u16>,
}

impl PartialEq for ConstantPool {
    fn eq(&self, other: &Self) -> bool {
        // the lookup index is a cache; only the entries matter
        self.constants == other.constants
    }
}

impl Eq for ConstantPool {}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a constant, returning the existing index for an equal entry
    pub fn add(&mut self, constant: BytecodeConstant) -> CodegenResult<u16> {
        if let Some(index) = self.index.get(&constant) {
            return Ok(*index);
        }
        if self.constants.len() >= MAX_POOL_ENTRIES {
            return Err(CodegenError::ConstantPoolOverflow {
                max: MAX_POOL_ENTRIES,
            });
        }
        let index = self.constants.len() as u16;
        self.index.insert(constant.clone(), index);
        self.constants.push(constant);
        Ok(index)
    }

    pub fn add_string(&mut self, s: impl Into<String>) -> CodegenResult<u16> {
        self.add(BytecodeConstant::Str(s.into()))
    }

    pub fn get(&self, index: u16) -> Option<&BytecodeConstant> {
        self.constants.get(index as usize)
    }

    pub fn constants(&self) -> &[BytecodeConstant] {
        &self.constants
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// Rebuild the lookup index after deserialization
    pub(crate) fn from_constants(constants: Vec<BytecodeConstant>) -> Self {
        let index = constants
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i as u16))
            .collect();
        Self { constants, index }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_dedup_returns_same_index() {
        let mut pool = ConstantPool::new();
        let a = pool.add(BytecodeConstant::Int(42)).unwrap();
        let b = pool.add(BytecodeConstant::Str("x".to_string())).unwrap();
        let c = pool.add(BytecodeConstant::Int(42)).unwrap();

        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_type_tag_distinguishes_payloads() {
        let mut pool = ConstantPool::new();
        let int_one = pool.add(BytecodeConstant::Int(1)).unwrap();
        let float_one = pool.add(BytecodeConstant::Float(1.0)).unwrap();
        let bool_true = pool.add(BytecodeConstant::Bool(true)).unwrap();

        assert_ne!(int_one, float_one);
        assert_ne!(int_one, bool_true);
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn test_nan_dedups_by_bits() {
        let mut pool = ConstantPool::new();
        let a = pool.add(BytecodeConstant::Float(f64::NAN)).unwrap();
        let b = pool.add(BytecodeConstant::Float(f64::NAN)).unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.len(), 1);
    }

    proptest! {
        /// Inserting any constant twice yields the same index, and a novel
        /// constant grows the pool by exactly one.
        #[test]
        fn prop_dedup_law(values in proptest::collection::vec(-1000i64..1000, 1..50)) {
            let mut pool = ConstantPool::new();
            for value in &values {
                let before = pool.len();
                let novel = pool.get_index_of(*value).is_none();
                let first = pool.add(BytecodeConstant::Int(*value)).unwrap();
                let second = pool.add(BytecodeConstant::Int(*value)).unwrap();
                prop_assert_eq!(first, second);
                prop_assert_eq!(pool.len(), before + usize::from(novel));
            }
        }
    }

    impl ConstantPool {
        fn get_index_of(&self, value: i64) -> Option<u16> {
            self.index.get(&BytecodeConstant::Int(value)).copied()
        }
    }
}
