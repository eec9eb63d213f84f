//! Natural loop detection
//!
//! Back edges (latch -> header where the header dominates the latch) define
//! natural loops; the body is everything that reaches the latch without
//! passing through the header. Loops nest into a forest with depth and
//! parent links.

use crate::function::MIRFunction;
use crate::ssa::DominanceInfo;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One natural loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loop {
    /// The single entry block of the loop
    pub header: String,
    /// Sources of back edges into the header
    pub latches: Vec<String>,
    /// Every block in the loop, header included
    pub blocks: HashSet<String>,
    /// Blocks outside the loop reached directly from inside it
    pub exits: Vec<String>,
    /// Nesting depth, outermost = 1
    pub depth: u32,
    /// Index of the enclosing loop in the forest, if nested
    pub parent: Option<usize>,
}

impl Loop {
    pub fn contains(&self, label: &str) -> bool {
        self.blocks.contains(label)
    }
}

/// All natural loops of one function
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoopForest {
    pub loops: Vec<Loop>,
}

impl LoopForest {
    pub fn compute(function: &MIRFunction, dominance: &DominanceInfo) -> Self {
        let cfg = &function.cfg;
        let mut loops: Vec<Loop> = Vec::new();

        // Find back edges in RPO so loop discovery order is stable.
        for label in &dominance.order {
            let Some(block) = cfg.get_block(label) else {
                continue;
            };
            for succ in &block.successors {
                if !dominance.dominates(succ, label) {
                    continue;
                }
                // label -> succ is a back edge; succ is the header.
                if let Some(existing) = loops.iter_mut().find(|l| &l.header == succ) {
                    if !existing.latches.contains(label) {
                        existing.latches.push(label.clone());
                        let body = natural_loop_body(function, succ, label);
                        existing.blocks.extend(body);
                    }
                    continue;
                }
                let blocks = natural_loop_body(function, succ, label);
                loops.push(Loop {
                    header: succ.clone(),
                    latches: vec![label.clone()],
                    blocks,
                    exits: Vec::new(),
                    depth: 1,
                    parent: None,
                });
            }
        }

        // Exits: successors outside the loop of any block inside it.
        for lp in &mut loops {
            let mut exits = Vec::new();
            for label in &lp.blocks {
                if let Some(block) = cfg.get_block(label) {
                    for succ in &block.successors {
                        if !lp.blocks.contains(succ) && !exits.contains(succ) {
                            exits.push(succ.clone());
                        }
                    }
                }
            }
            exits.sort();
            lp.exits = exits;
        }

        // Nesting: a loop's parent is the smallest strictly-containing loop.
        let snapshots: Vec<(String, HashSet<String>)> = loops
            .iter()
            .map(|l| (l.header.clone(), l.blocks.clone()))
            .collect();
        for (index, lp) in loops.iter_mut().enumerate() {
            let mut parent: Option<usize> = None;
            for (other_index, (other_header, other_blocks)) in snapshots.iter().enumerate() {
                if other_index == index || other_header == &lp.header {
                    continue;
                }
                if other_blocks.contains(&lp.header) && other_blocks.len() > lp.blocks.len() {
                    let better = match parent {
                        Some(current) => other_blocks.len() < snapshots[current].1.len(),
                        None => true,
                    };
                    if better {
                        parent = Some(other_index);
                    }
                }
            }
            lp.parent = parent;
        }

        // Depth follows parent links.
        let parents: Vec<Option<usize>> = loops.iter().map(|l| l.parent).collect();
        for index in 0..loops.len() {
            let mut depth = 1;
            let mut cursor = parents[index];
            while let Some(parent) = cursor {
                depth += 1;
                cursor = parents[parent];
            }
            loops[index].depth = depth;
        }

        Self { loops }
    }

    /// Loops ordered innermost first, for bottom-up optimization
    pub fn innermost_first(&self) -> Vec<&Loop> {
        let mut ordered: Vec<&Loop> = self.loops.iter().collect();
        ordered.sort_by(|a, b| b.depth.cmp(&a.depth).then(a.header.cmp(&b.header)));
        ordered
    }

    pub fn loop_containing(&self, label: &str) -> Option<&Loop> {
        self.loops
            .iter()
            .filter(|l| l.contains(label))
            .min_by_key(|l| l.blocks.len())
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }
}

/// Body of the natural loop of back edge latch -> header: the header plus
/// every block that reaches the latch without passing through the header.
fn natural_loop_body(function: &MIRFunction, header: &str, latch: &str) -> HashSet<String> {
    let mut body: HashSet<String> = HashSet::new();
    body.insert(header.to_string());

    let mut worklist = vec![latch.to_string()];
    while let Some(label) = worklist.pop() {
        if !body.insert(label.clone()) {
            continue;
        }
        if let Some(block) = function.cfg.get_block(&label) {
            for pred in &block.predecessors {
                if !body.contains(pred) {
                    worklist.push(pred.clone());
                }
            }
        }
    }

    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BasicBlock;
    use crate::cfg::Cfg;
    use crate::types::MIRType;

    fn connect_all(cfg: &mut Cfg, edges: &[(&str, &str)]) {
        for (from, to) in edges {
            cfg.connect(from, to);
        }
    }

    fn function_with_cfg(labels: &[&str], edges: &[(&str, &str)]) -> MIRFunction {
        let mut function = MIRFunction::new("f", vec![], MIRType::Empty);
        for label in labels {
            function.cfg.add_block(BasicBlock::new(*label));
        }
        connect_all(&mut function.cfg, edges);
        function
    }

    #[test]
    fn test_simple_while_loop() {
        let function = function_with_cfg(
            &["entry", "header", "body", "exit"],
            &[
                ("entry", "header"),
                ("header", "body"),
                ("header", "exit"),
                ("body", "header"),
            ],
        );
        let dominance = DominanceInfo::compute(&function.cfg);
        let forest = LoopForest::compute(&function, &dominance);

        assert_eq!(forest.loops.len(), 1);
        let lp = &forest.loops[0];
        assert_eq!(lp.header, "header");
        assert_eq!(lp.latches, vec!["body"]);
        assert!(lp.contains("header"));
        assert!(lp.contains("body"));
        assert!(!lp.contains("entry"));
        assert_eq!(lp.exits, vec!["exit"]);
        assert_eq!(lp.depth, 1);
        assert!(lp.parent.is_none());
    }

    #[test]
    fn test_nested_loops() {
        let function = function_with_cfg(
            &["entry", "outer", "inner", "inner_body", "outer_latch", "exit"],
            &[
                ("entry", "outer"),
                ("outer", "inner"),
                ("inner", "inner_body"),
                ("inner_body", "inner"),
                ("inner", "outer_latch"),
                ("outer_latch", "outer"),
                ("outer", "exit"),
            ],
        );
        let dominance = DominanceInfo::compute(&function.cfg);
        let forest = LoopForest::compute(&function, &dominance);

        assert_eq!(forest.loops.len(), 2);
        let ordered = forest.innermost_first();
        assert_eq!(ordered[0].header, "inner");
        assert_eq!(ordered[0].depth, 2);
        assert_eq!(ordered[1].header, "outer");
        assert_eq!(ordered[1].depth, 1);

        let inner_index = forest.loops.iter().position(|l| l.header == "inner").unwrap();
        let outer_index = forest.loops.iter().position(|l| l.header == "outer").unwrap();
        assert_eq!(forest.loops[inner_index].parent, Some(outer_index));

        // innermost loop containing a shared block
        assert_eq!(forest.loop_containing("inner_body").unwrap().header, "inner");
        assert_eq!(forest.loop_containing("outer_latch").unwrap().header, "outer");
    }

    #[test]
    fn test_self_loop() {
        let function = function_with_cfg(
            &["entry", "spin", "exit"],
            &[("entry", "spin"), ("spin", "spin"), ("spin", "exit")],
        );
        let dominance = DominanceInfo::compute(&function.cfg);
        let forest = LoopForest::compute(&function, &dominance);

        assert_eq!(forest.loops.len(), 1);
        assert_eq!(forest.loops[0].header, "spin");
        assert_eq!(forest.loops[0].latches, vec!["spin"]);
        assert_eq!(forest.loops[0].blocks.len(), 1);
    }

    #[test]
    fn test_no_loops() {
        let function = function_with_cfg(&["entry", "exit"], &[("entry", "exit")]);
        let dominance = DominanceInfo::compute(&function.cfg);
        let forest = LoopForest::compute(&function, &dominance);
        assert!(forest.is_empty());
    }
}
