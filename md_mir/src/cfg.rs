//! Control flow graph
//!
//! The CFG owns its blocks in insertion order (emission depends on a stable
//! order) and maintains predecessor/successor lists symmetrically. Blocks
//! reference each other only by label, so there are no ownership cycles.

use crate::block::BasicBlock;
use crate::instruction::InstKind;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Control flow graph of one function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cfg {
    pub blocks: IndexMap<String, BasicBlock>,
    pub entry: Option<String>,
    next_label_id: u32,
}

impl Cfg {
    pub fn new() -> Self {
        Self {
            blocks: IndexMap::new(),
            entry: None,
            next_label_id: 0,
        }
    }

    /// Add a block; the first block added becomes the entry by default
    pub fn add_block(&mut self, block: BasicBlock) {
        if self.entry.is_none() {
            self.entry = Some(block.label.clone());
        }
        self.blocks.insert(block.label.clone(), block);
    }

    pub fn get_or_create_block(&mut self, label: &str) -> &mut BasicBlock {
        if !self.blocks.contains_key(label) {
            self.add_block(BasicBlock::new(label));
        }
        self.blocks.get_mut(label).expect("block just inserted")
    }

    pub fn set_entry_block(&mut self, label: impl Into<String>) {
        self.entry = Some(label.into());
    }

    pub fn entry_label(&self) -> Option<&str> {
        self.entry.as_deref()
    }

    pub fn get_block(&self, label: &str) -> Option<&BasicBlock> {
        self.blocks.get(label)
    }

    pub fn get_block_mut(&mut self, label: &str) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(label)
    }

    /// Generate a label unique within this CFG
    pub fn generate_label(&mut self, prefix: &str) -> String {
        loop {
            let label = format!("{}{}", prefix, self.next_label_id);
            self.next_label_id += 1;
            if !self.blocks.contains_key(&label) {
                return label;
            }
        }
    }

    /// Connect two blocks, keeping both edge directions in sync
    pub fn connect(&mut self, from: &str, to: &str) {
        self.get_or_create_block(to);
        let from_block = self.get_or_create_block(from);
        if !from_block.successors.iter().any(|s| s == to) {
            from_block.successors.push(to.to_string());
        }
        let to_block = self.blocks.get_mut(to).expect("target block exists");
        if !to_block.predecessors.iter().any(|p| p == from) {
            to_block.predecessors.push(from.to_string());
        }
    }

    /// Remove the edge between two blocks, both directions
    pub fn disconnect(&mut self, from: &str, to: &str) {
        if let Some(from_block) = self.blocks.get_mut(from) {
            from_block.successors.retain(|s| s != to);
        }
        if let Some(to_block) = self.blocks.get_mut(to) {
            to_block.predecessors.retain(|p| p != from);
        }
    }

    /// Remove a block entirely, cleaning up edges and phi entries
    pub fn remove_block(&mut self, label: &str) -> Option<BasicBlock> {
        let block = self.blocks.shift_remove(label)?;
        for succ in &block.successors {
            if let Some(succ_block) = self.blocks.get_mut(succ) {
                succ_block.predecessors.retain(|p| p != label);
                succ_block.remove_phi_entries_for(label);
            }
        }
        for pred in &block.predecessors {
            if let Some(pred_block) = self.blocks.get_mut(pred) {
                pred_block.successors.retain(|s| s != label);
            }
        }
        Some(block)
    }

    /// Rebuild every edge list from the block terminators
    ///
    /// Useful after a transformation that rewrote jump targets wholesale.
    pub fn rebuild_edges(&mut self) {
        let edges: Vec<(String, Vec<String>)> = self
            .blocks
            .values()
            .map(|block| {
                let targets = block
                    .terminator()
                    .map(|t| t.jump_targets().iter().map(|s| s.to_string()).collect())
                    .unwrap_or_default();
                (block.label.clone(), targets)
            })
            .collect();

        for block in self.blocks.values_mut() {
            block.predecessors.clear();
            block.successors.clear();
        }
        for (from, targets) in edges {
            for to in targets {
                self.connect(&from, &to);
            }
        }
    }

    /// Blocks whose terminator is a Return
    pub fn exit_blocks(&self) -> Vec<String> {
        self.blocks
            .values()
            .filter(|block| {
                matches!(
                    block.terminator().map(|t| &t.kind),
                    Some(InstKind::Return { .. })
                )
            })
            .map(|block| block.label.clone())
            .collect()
    }

    /// Labels reachable from the entry block
    pub fn reachable_blocks(&self) -> HashSet<String> {
        let mut reachable = HashSet::new();
        let Some(entry) = self.entry_label() else {
            return reachable;
        };

        let mut worklist = vec![entry.to_string()];
        while let Some(label) = worklist.pop() {
            if !reachable.insert(label.clone()) {
                continue;
            }
            if let Some(block) = self.blocks.get(&label) {
                worklist.extend(block.successors.iter().cloned());
            }
        }
        reachable
    }

    /// Reverse post-order over reachable blocks, entry first
    pub fn reverse_post_order(&self) -> Vec<String> {
        let Some(entry) = self.entry_label() else {
            return Vec::new();
        };

        let mut visited = HashSet::new();
        let mut postorder = Vec::new();
        // Iterative DFS; the second stack element marks "children done".
        let mut stack = vec![(entry.to_string(), false)];

        while let Some((label, children_done)) = stack.pop() {
            if children_done {
                postorder.push(label);
                continue;
            }
            if !visited.insert(label.clone()) {
                continue;
            }
            stack.push((label.clone(), true));
            if let Some(block) = self.blocks.get(&label) {
                // push in successor order so the LIFO explores the last
                // successor first and siblings come out in source order
                for succ in block.successors.iter() {
                    if !visited.contains(succ) {
                        stack.push((succ.clone(), false));
                    }
                }
            }
        }

        postorder.reverse();
        postorder
    }

    /// Graphviz DOT rendering of the graph
    pub fn to_dot(&self) -> String {
        let mut lines = vec!["digraph CFG {".to_string(), "  node [shape=box];".to_string()];

        for (label, block) in &self.blocks {
            let content = block.to_string().replace('"', "\\\"").replace('\n', "\\l");
            lines.push(format!("  \"{}\" [label=\"{}\\l\"];", label, content));
        }
        for (label, block) in &self.blocks {
            for succ in &block.successors {
                lines.push(format!("  \"{}\" -> \"{}\";", label, succ));
            }
        }

        lines.push("}".to_string());
        lines.join("\n")
    }
}

impl Default for Cfg {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Cfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(entry) = self.entry_label() {
            writeln!(f, "; entry: {}", entry)?;
        }
        for block in self.blocks.values() {
            write!(f, "{}", block)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::MIRInstruction;

    fn jump(target: &str) -> MIRInstruction {
        MIRInstruction::new(InstKind::Jump {
            target: target.to_string(),
        })
    }

    fn ret() -> MIRInstruction {
        MIRInstruction::new(InstKind::Return { value: None })
    }

    #[test]
    fn test_first_block_becomes_entry() {
        let mut cfg = Cfg::new();
        cfg.add_block(BasicBlock::new("entry"));
        cfg.add_block(BasicBlock::new("exit"));
        assert_eq!(cfg.entry_label(), Some("entry"));
    }

    #[test]
    fn test_edge_symmetry() {
        let mut cfg = Cfg::new();
        cfg.add_block(BasicBlock::new("a"));
        cfg.add_block(BasicBlock::new("b"));
        cfg.connect("a", "b");

        assert_eq!(cfg.get_block("a").unwrap().successors, vec!["b"]);
        assert_eq!(cfg.get_block("b").unwrap().predecessors, vec!["a"]);

        // connecting twice does not duplicate the edge
        cfg.connect("a", "b");
        assert_eq!(cfg.get_block("a").unwrap().successors.len(), 1);

        cfg.disconnect("a", "b");
        assert!(cfg.get_block("a").unwrap().successors.is_empty());
        assert!(cfg.get_block("b").unwrap().predecessors.is_empty());
    }

    #[test]
    fn test_exit_blocks() {
        let mut cfg = Cfg::new();
        let mut a = BasicBlock::new("a");
        a.add_instruction(jump("b"));
        let mut b = BasicBlock::new("b");
        b.add_instruction(ret());
        cfg.add_block(a);
        cfg.add_block(b);
        cfg.connect("a", "b");

        assert_eq!(cfg.exit_blocks(), vec!["b".to_string()]);
    }

    #[test]
    fn test_reverse_post_order_diamond() {
        let mut cfg = Cfg::new();
        for label in ["entry", "then", "else", "join"] {
            cfg.add_block(BasicBlock::new(label));
        }
        cfg.connect("entry", "then");
        cfg.connect("entry", "else");
        cfg.connect("then", "join");
        cfg.connect("else", "join");

        let rpo = cfg.reverse_post_order();
        assert_eq!(rpo.first().map(String::as_str), Some("entry"));
        assert_eq!(rpo.last().map(String::as_str), Some("join"));
        assert_eq!(rpo.len(), 4);
    }

    #[test]
    fn test_reachability_skips_orphans() {
        let mut cfg = Cfg::new();
        cfg.add_block(BasicBlock::new("entry"));
        cfg.add_block(BasicBlock::new("orphan"));

        let reachable = cfg.reachable_blocks();
        assert!(reachable.contains("entry"));
        assert!(!reachable.contains("orphan"));
    }

    #[test]
    fn test_remove_block_cleans_edges() {
        let mut cfg = Cfg::new();
        cfg.add_block(BasicBlock::new("a"));
        cfg.add_block(BasicBlock::new("b"));
        cfg.add_block(BasicBlock::new("c"));
        cfg.connect("a", "b");
        cfg.connect("b", "c");

        cfg.remove_block("b");
        assert!(cfg.get_block("a").unwrap().successors.is_empty());
        assert!(cfg.get_block("c").unwrap().predecessors.is_empty());
    }

    #[test]
    fn test_generate_label_unique() {
        let mut cfg = Cfg::new();
        cfg.add_block(BasicBlock::new("L0"));
        let label = cfg.generate_label("L");
        assert_ne!(label, "L0");
        assert!(!cfg.blocks.contains_key(&label));
    }

    #[test]
    fn test_rebuild_edges_from_terminators() {
        let mut cfg = Cfg::new();
        let mut a = BasicBlock::new("a");
        a.add_instruction(jump("b"));
        let mut b = BasicBlock::new("b");
        b.add_instruction(ret());
        cfg.add_block(a);
        cfg.add_block(b);
        // edges were never connected; rebuild derives them
        cfg.rebuild_edges();

        assert_eq!(cfg.get_block("a").unwrap().successors, vec!["b"]);
        assert_eq!(cfg.get_block("b").unwrap().predecessors, vec!["a"]);
    }
}
