//! Basic blocks
//!
//! A basic block is a straight-line instruction sequence with a single
//! entry and a single exit. Phi nodes live in their own list ahead of the
//! body. Edges are stored as labels; the CFG keeps the two directions in
//! sync.

use crate::instruction::{InstKind, MIRInstruction};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A basic block in the control flow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub label: String,
    pub phi_nodes: Vec<MIRInstruction>,
    pub instructions: Vec<MIRInstruction>,
    pub predecessors: Vec<String>,
    pub successors: Vec<String>,
}

impl BasicBlock {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            phi_nodes: Vec::new(),
            instructions: Vec::new(),
            predecessors: Vec::new(),
            successors: Vec::new(),
        }
    }

    /// Add an instruction, routing phi nodes to the phi list
    pub fn add_instruction(&mut self, inst: MIRInstruction) {
        if inst.is_phi() {
            self.phi_nodes.push(inst);
        } else {
            self.instructions.push(inst);
        }
    }

    /// The terminator, when the last instruction is one
    pub fn terminator(&self) -> Option<&MIRInstruction> {
        self.instructions.last().filter(|i| i.is_terminator())
    }

    pub fn terminator_mut(&mut self) -> Option<&mut MIRInstruction> {
        self.instructions
            .last_mut()
            .filter(|i| i.is_terminator())
    }

    pub fn is_terminated(&self) -> bool {
        self.terminator().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.phi_nodes.is_empty() && self.instructions.is_empty()
    }

    /// Body instructions excluding the terminator
    pub fn body(&self) -> &[MIRInstruction] {
        match self.terminator() {
            Some(_) => &self.instructions[..self.instructions.len() - 1],
            None => &self.instructions,
        }
    }

    /// Iterate phi nodes, then body instructions
    pub fn all_instructions(&self) -> impl Iterator<Item = &MIRInstruction> {
        self.phi_nodes.iter().chain(self.instructions.iter())
    }

    pub fn all_instructions_mut(&mut self) -> impl Iterator<Item = &mut MIRInstruction> {
        self.phi_nodes
            .iter_mut()
            .chain(self.instructions.iter_mut())
    }

    /// Total instruction count including phis
    pub fn len(&self) -> usize {
        self.phi_nodes.len() + self.instructions.len()
    }

    /// Does any instruction here write or observably affect state?
    pub fn has_side_effects(&self) -> bool {
        self.all_instructions().any(|i| i.has_side_effects())
    }

    /// Drop a phi entry coming from a removed predecessor
    pub fn remove_phi_entries_for(&mut self, pred_label: &str) {
        for phi in &mut self.phi_nodes {
            if let InstKind::Phi { incoming, .. } = &mut phi.kind {
                incoming.retain(|(_, label)| label != pred_label);
            }
        }
    }

    /// Rename the predecessor label inside every phi entry
    pub fn rename_phi_label(&mut self, old: &str, new: &str) {
        for phi in &mut self.phi_nodes {
            if let InstKind::Phi { incoming, .. } = &mut phi.kind {
                for (_, label) in incoming.iter_mut() {
                    if label == old {
                        *label = new.to_string();
                    }
                }
            }
        }
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.label)?;
        for phi in &self.phi_nodes {
            writeln!(f, "  {}", phi)?;
        }
        for inst in &self.instructions {
            writeln!(f, "  {}", inst)?;
        }
        Ok(())
    }
}
