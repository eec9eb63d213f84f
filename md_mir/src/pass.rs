//! Optimization pass interface
//!
//! Passes are small objects behind one of two narrow traits: a
//! `FunctionPass` transforms one function at a time, a `ModulePass` sees
//! the whole module (inlining, specialization). Every pass declares its
//! metadata up front so the manager can resolve analysis prerequisites and
//! invalidate caches afterwards.

use crate::function::MIRFunction;
use crate::module::MIRModule;
use crate::pass_manager::AnalysisManager;
use crate::MIRResult;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of pass this is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassKind {
    Analysis,
    Optimization,
}

/// How much cached analysis information a transformation keeps valid
///
/// `All` invalidates nothing, `Cfg` promises the block structure is intact
/// (dominance and the loop forest survive), `None` drops everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreservationLevel {
    All,
    Cfg,
    None,
}

/// Static description of a pass
#[derive(Debug, Clone, Copy)]
pub struct PassInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: PassKind,
    pub requires: &'static [&'static str],
    pub preserves: PreservationLevel,
}

/// Per-pass statistics counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PassStats {
    counters: IndexMap<String, usize>,
}

impl PassStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(&mut self, counter: &str) {
        self.add(counter, 1);
    }

    pub fn add(&mut self, counter: &str, amount: usize) {
        *self.counters.entry(counter.to_string()).or_insert(0) += amount;
    }

    pub fn get(&self, counter: &str) -> usize {
        self.counters.get(counter).copied().unwrap_or(0)
    }

    pub fn counters(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counters.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.counters.values().all(|v| *v == 0)
    }

    pub fn merge(&mut self, other: &PassStats) {
        for (counter, amount) in other.counters() {
            self.add(counter, amount);
        }
    }
}

impl fmt::Display for PassStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .counters
            .iter()
            .filter(|(_, v)| **v > 0)
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// A transformation over a single function
pub trait FunctionPass {
    fn info(&self) -> PassInfo;

    /// Run the pass; returns whether the function was modified
    fn run_on_function(
        &mut self,
        function: &mut MIRFunction,
        analyses: &mut AnalysisManager,
    ) -> MIRResult<bool>;

    fn stats(&self) -> &PassStats;
}

/// A transformation over a whole module
pub trait ModulePass {
    fn info(&self) -> PassInfo;

    /// Run the pass; returns whether the module was modified
    fn run_on_module(
        &mut self,
        module: &mut MIRModule,
        analyses: &mut AnalysisManager,
    ) -> MIRResult<bool>;

    fn stats(&self) -> &PassStats;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_counters() {
        let mut stats = PassStats::new();
        assert!(stats.is_empty());

        stats.incr("folded");
        stats.incr("folded");
        stats.add("removed", 3);

        assert_eq!(stats.get("folded"), 2);
        assert_eq!(stats.get("removed"), 3);
        assert_eq!(stats.get("absent"), 0);
        assert_eq!(stats.to_string(), "folded=2, removed=3");
    }

    #[test]
    fn test_stats_merge() {
        let mut a = PassStats::new();
        a.incr("hoisted");
        let mut b = PassStats::new();
        b.add("hoisted", 4);
        a.merge(&b);
        assert_eq!(a.get("hoisted"), 5);
    }
}
