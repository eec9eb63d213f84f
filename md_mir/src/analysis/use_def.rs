//! Use-def chains
//!
//! For every SSA value: the unique instruction that defines it and the set
//! of instructions that read it. Positions are (block label, slot), where a
//! slot distinguishes the phi list from the instruction body.

use crate::function::MIRFunction;
use crate::value::MIRValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Position of an instruction within a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstSlot {
    Phi(usize),
    Body(usize),
}

/// Reference to one instruction in a function
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstRef {
    pub block: String,
    pub slot: InstSlot,
}

impl InstRef {
    pub fn phi(block: impl Into<String>, index: usize) -> Self {
        Self {
            block: block.into(),
            slot: InstSlot::Phi(index),
        }
    }

    pub fn body(block: impl Into<String>, index: usize) -> Self {
        Self {
            block: block.into(),
            slot: InstSlot::Body(index),
        }
    }
}

/// Def and use sites for every value in a function
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UseDefChains {
    defs: HashMap<MIRValue, InstRef>,
    uses: HashMap<MIRValue, Vec<InstRef>>,
}

impl UseDefChains {
    pub fn compute(function: &MIRFunction) -> Self {
        let mut chains = UseDefChains::default();

        for (label, block) in &function.cfg.blocks {
            for (index, phi) in block.phi_nodes.iter().enumerate() {
                let site = InstRef::phi(label.clone(), index);
                chains.record(phi, site);
            }
            for (index, inst) in block.instructions.iter().enumerate() {
                let site = InstRef::body(label.clone(), index);
                chains.record(inst, site);
            }
        }

        chains
    }

    fn record(&mut self, inst: &crate::instruction::MIRInstruction, site: InstRef) {
        for def in inst.defs() {
            // In well-formed SSA the first definition wins; duplicates are
            // the validator's problem, not ours.
            self.defs.entry(def).or_insert_with(|| site.clone());
        }
        for used in inst.uses() {
            self.uses.entry(used).or_default().push(site.clone());
        }
    }

    /// The defining instruction of a value, if any
    pub fn def_of(&self, value: &MIRValue) -> Option<&InstRef> {
        self.defs.get(value)
    }

    /// All use sites of a value
    pub fn uses_of(&self, value: &MIRValue) -> &[InstRef] {
        self.uses.get(value).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn use_count(&self, value: &MIRValue) -> usize {
        self.uses_of(value).len()
    }

    pub fn is_unused(&self, value: &MIRValue) -> bool {
        self.uses_of(value).is_empty()
    }
}
