//! MIR function representation

use crate::cfg::Cfg;
use crate::types::MIRType;
use crate::value::{Temp, Variable};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A function in MIR form
///
/// Owns its CFG, its local symbol table, and the counter that hands out
/// fresh temporaries. Temporary ids are unique per function, never global.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MIRFunction {
    pub name: String,
    pub params: Vec<Variable>,
    pub return_type: MIRType,
    pub cfg: Cfg,
    pub locals: IndexMap<String, Variable>,
    next_temp_id: u32,
}

impl MIRFunction {
    pub fn new(name: impl Into<String>, params: Vec<Variable>, return_type: MIRType) -> Self {
        Self {
            name: name.into(),
            params,
            return_type,
            cfg: Cfg::new(),
            locals: IndexMap::new(),
            next_temp_id: 0,
        }
    }

    /// Allocate a fresh temporary of the given type
    pub fn new_temp(&mut self, ty: MIRType) -> Temp {
        let temp = Temp::new(self.next_temp_id, ty);
        self.next_temp_id += 1;
        temp
    }

    /// Reserve ids so cloned instructions cannot collide (used by inlining)
    pub fn bump_temp_id(&mut self, count: u32) -> u32 {
        let base = self.next_temp_id;
        self.next_temp_id += count;
        base
    }

    pub fn next_temp_id(&self) -> u32 {
        self.next_temp_id
    }

    pub fn add_local(&mut self, var: Variable) {
        self.locals.insert(var.name.clone(), var);
    }

    pub fn get_local(&self, name: &str) -> Option<&Variable> {
        self.locals.get(name)
    }

    pub fn get_param(&self, name: &str) -> Option<&Variable> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Total instruction count across all blocks, phis included
    pub fn instruction_count(&self) -> usize {
        self.cfg.blocks.values().map(|b| b.len()).sum()
    }
}

impl fmt::Display for MIRFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| format!("{}: {}", p.name, p.ty))
            .collect();
        writeln!(
            f,
            "fn {}({}) -> {} {{",
            self.name,
            params.join(", "),
            self.return_type
        )?;
        write!(f, "{}", self.cfg)?;
        writeln!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BasicBlock;
    use crate::instruction::{InstKind, MIRInstruction};

    #[test]
    fn test_temp_counter_is_per_function() {
        let mut f1 = MIRFunction::new("f1", vec![], MIRType::Empty);
        let mut f2 = MIRFunction::new("f2", vec![], MIRType::Empty);

        let t0 = f1.new_temp(MIRType::Int);
        let t1 = f1.new_temp(MIRType::Float);
        let other_t0 = f2.new_temp(MIRType::Int);

        assert_eq!(t0.id, 0);
        assert_eq!(t1.id, 1);
        assert_eq!(other_t0.id, 0);
    }

    #[test]
    fn test_bump_reserves_range() {
        let mut f = MIRFunction::new("f", vec![], MIRType::Empty);
        f.new_temp(MIRType::Int);
        let base = f.bump_temp_id(5);
        assert_eq!(base, 1);
        assert_eq!(f.new_temp(MIRType::Int).id, 6);
    }

    #[test]
    fn test_locals_and_params() {
        let param = Variable::parameter("n", MIRType::Int);
        let mut f = MIRFunction::new("fact", vec![param], MIRType::Int);
        f.add_local(Variable::new("acc", MIRType::Int));

        assert!(f.get_param("n").is_some());
        assert!(f.get_local("acc").is_some());
        assert!(f.get_local("missing").is_none());
    }

    #[test]
    fn test_instruction_count() {
        let mut f = MIRFunction::new("f", vec![], MIRType::Empty);
        let mut entry = BasicBlock::new("entry");
        entry.add_instruction(MIRInstruction::new(InstKind::Nop));
        entry.add_instruction(MIRInstruction::new(InstKind::Return { value: None }));
        f.cfg.add_block(entry);

        assert_eq!(f.instruction_count(), 2);
    }
}
