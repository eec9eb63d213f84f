//! Conservative alias and escape analysis
//!
//! Best-effort by design. A variable may alias when it is both stored and
//! loaded somewhere in the function; a value escapes when it flows into a
//! call argument, a return, or a store to a global.

use crate::function::MIRFunction;
use crate::instruction::InstKind;
use crate::value::{MIRValue, VarScope};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Variables that may be observed through more than one access path
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AliasInfo {
    may_alias: HashSet<String>,
}

impl AliasInfo {
    pub fn compute(function: &MIRFunction) -> Self {
        let mut stored: HashSet<String> = HashSet::new();
        let mut loaded: HashSet<String> = HashSet::new();

        for block in function.cfg.blocks.values() {
            for inst in block.all_instructions() {
                match &inst.kind {
                    InstKind::StoreVar { var, .. } => {
                        stored.insert(var.name.clone());
                    }
                    InstKind::LoadVar { var, .. } => {
                        loaded.insert(var.name.clone());
                    }
                    _ => {
                        for used in inst.uses() {
                            if let MIRValue::Variable(var) = used {
                                loaded.insert(var.name.clone());
                            }
                        }
                    }
                }
            }
        }

        Self {
            may_alias: stored.intersection(&loaded).cloned().collect(),
        }
    }

    pub fn may_alias(&self, name: &str) -> bool {
        self.may_alias.contains(name)
    }

    pub fn aliased_names(&self) -> &HashSet<String> {
        &self.may_alias
    }
}

/// Values that flow outside the function
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EscapeInfo {
    escaping: HashSet<MIRValue>,
}

impl EscapeInfo {
    pub fn compute(function: &MIRFunction) -> Self {
        let mut escaping: HashSet<MIRValue> = HashSet::new();

        for block in function.cfg.blocks.values() {
            for inst in block.all_instructions() {
                match &inst.kind {
                    InstKind::Call { args, .. } => {
                        escaping.extend(args.iter().cloned());
                    }
                    InstKind::Return { value: Some(value) } => {
                        escaping.insert(value.clone());
                    }
                    InstKind::StoreVar { var, source } if var.scope == VarScope::Global => {
                        escaping.insert(source.clone());
                    }
                    _ => {}
                }
            }
        }

        Self { escaping }
    }

    pub fn escapes(&self, value: &MIRValue) -> bool {
        self.escaping.contains(value)
    }

    pub fn escaping_values(&self) -> &HashSet<MIRValue> {
        &self.escaping
    }
}
