//! Optimization pipeline driver
//!
//! Assembles the standard pass order for a requested optimization level
//! and iterates it to a fixed point. One function failing a pass is
//! reported as a diagnostic; the rest of the module still compiles.

use crate::module::MIRModule;
use crate::optimizations;
use crate::pass::PassStats;
use crate::pass_manager::PassManager;
use crate::MIRResult;
use log::debug;
use md_common::{Diagnostic, Diagnostics};
use serde::{Deserialize, Serialize};

/// How aggressively to optimize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizationLevel {
    None,
    Basic,
    Standard,
    Aggressive,
}

impl OptimizationLevel {
    /// Map the conventional 0-3 numeric levels
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => OptimizationLevel::None,
            1 => OptimizationLevel::Basic,
            2 => OptimizationLevel::Standard,
            _ => OptimizationLevel::Aggressive,
        }
    }
}

/// Pipeline and cost-model knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationConfig {
    pub level: OptimizationLevel,
    /// Cap on fixed-point iterations of the whole pipeline
    pub max_iterations: usize,
    /// Callees at or below this size always inline
    pub inline_always_size: usize,
    pub inline_benefit_base: usize,
    pub inline_const_arg_bonus: usize,
    pub inline_small_callee_bonus: usize,
    pub inline_small_callee_size: usize,
    /// Rounds of inlining; bounds expansion through call chains
    pub inline_depth_bound: usize,
    /// How far jump threading chases a chain of trampolines
    pub jump_thread_depth: usize,
    /// Concrete call sites required before specializing a function
    pub specialize_threshold: usize,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            level: OptimizationLevel::Aggressive,
            max_iterations: 10,
            inline_always_size: 10,
            inline_benefit_base: 20,
            inline_const_arg_bonus: 5,
            inline_small_callee_bonus: 10,
            inline_small_callee_size: 25,
            inline_depth_bound: 3,
            jump_thread_depth: 8,
            specialize_threshold: 2,
        }
    }
}

impl OptimizationConfig {
    pub fn with_level(level: OptimizationLevel) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    /// The pass order this level runs
    pub fn pass_order(&self) -> Vec<&'static str> {
        match self.level {
            OptimizationLevel::None => vec![],
            OptimizationLevel::Basic => vec!["constant-propagation", "peephole"],
            OptimizationLevel::Standard => vec![
                "constant-propagation",
                "strength-reduction",
                "dce",
                "jump-threading",
                "peephole",
            ],
            OptimizationLevel::Aggressive => vec![
                "constant-propagation",
                "strength-reduction",
                "cse",
                "dce",
                "jump-threading",
                "licm",
                "type-specific-optimization",
                "inlining",
                "type-specialization",
                "peephole",
            ],
        }
    }
}

/// What one pipeline run did
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub modified: bool,
    pub iterations: usize,
    pub diagnostics: Diagnostics,
    pub pass_stats: Vec<(String, PassStats)>,
}

impl PipelineReport {
    /// All counters across passes merged into one view
    pub fn total_stats(&self) -> PassStats {
        let mut total = PassStats::new();
        for (_, stats) in &self.pass_stats {
            total.merge(stats);
        }
        total
    }
}

/// Optimize a module in place per the configuration
pub fn optimize_module(
    module: &mut MIRModule,
    config: &OptimizationConfig,
) -> MIRResult<PipelineReport> {
    let order = config.pass_order();
    if order.is_empty() {
        return Ok(PipelineReport::default());
    }

    let mut manager = PassManager::new();
    optimizations::register_all_passes(&mut manager, config);

    let iterations = manager.run_until_fixed_point(&order, module, config.max_iterations)?;
    debug!(
        "pipeline: '{}' optimized in {} iteration(s)",
        module.name, iterations
    );

    let mut diagnostics = Diagnostics::new();
    for failure in manager.failures() {
        let message = if failure.function.is_empty() {
            format!("pass '{}' failed: {}", failure.pass, failure.error)
        } else {
            format!(
                "pass '{}' failed on function '{}': {}",
                failure.pass, failure.function, failure.error
            )
        };
        diagnostics.add(Diagnostic::error(message));
    }

    let pass_stats = order
        .iter()
        .filter_map(|name| manager.pass_stats(name).map(|s| (name.to_string(), s)))
        .collect();

    Ok(PipelineReport {
        modified: iterations > 0,
        iterations,
        diagnostics,
        pass_stats,
    })
}
