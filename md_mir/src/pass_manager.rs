//! Pass manager and analysis cache
//!
//! The manager registers passes by name, computes the analyses a pass
//! declares in `requires` before running it, and invalidates cached
//! analysis results afterwards according to the pass's preservation level.
//! A failing pass is recorded and compilation continues with the remaining
//! functions.

use crate::analysis::{self, AliasInfo, AnalysisResult, EscapeInfo, LoopForest, UseDefChains};
use crate::function::MIRFunction;
use crate::module::MIRModule;
use crate::pass::{FunctionPass, ModulePass, PassInfo, PreservationLevel};
use crate::ssa::DominanceInfo;
use crate::{MIRError, MIRResult};
use indexmap::IndexMap;
use log::{debug, trace};
use std::collections::HashMap;
use std::rc::Rc;

/// Cache of analysis results keyed by (analysis name, function name)
#[derive(Debug, Default)]
pub struct AnalysisManager {
    cache: HashMap<(String, String), AnalysisResult>,
}

impl AnalysisManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch an analysis result, computing and caching it when missing
    pub fn get(&mut self, name: &str, function: &MIRFunction) -> MIRResult<AnalysisResult> {
        let key = (name.to_string(), function.name.clone());
        if let Some(result) = self.cache.get(&key) {
            trace!("analysis cache hit: {} on {}", name, function.name);
            return Ok(result.clone());
        }

        trace!("computing analysis: {} on {}", name, function.name);
        let result = self.compute(name, function)?;
        self.cache.insert(key, result.clone());
        Ok(result)
    }

    fn compute(&mut self, name: &str, function: &MIRFunction) -> MIRResult<AnalysisResult> {
        match name {
            analysis::DOMINANCE => Ok(AnalysisResult::Dominance(Rc::new(DominanceInfo::compute(
                &function.cfg,
            )))),
            analysis::USE_DEF_CHAINS => Ok(AnalysisResult::UseDef(Rc::new(
                UseDefChains::compute(function),
            ))),
            analysis::LOOP_ANALYSIS => {
                let dominance = self
                    .get(analysis::DOMINANCE, function)?
                    .as_dominance()
                    .expect("dominance result");
                Ok(AnalysisResult::Loops(Rc::new(LoopForest::compute(
                    function, &dominance,
                ))))
            }
            analysis::ALIAS_ANALYSIS => {
                Ok(AnalysisResult::Alias(Rc::new(AliasInfo::compute(function))))
            }
            analysis::ESCAPE_ANALYSIS => Ok(AnalysisResult::Escape(Rc::new(EscapeInfo::compute(
                function,
            )))),
            other => Err(MIRError::UnknownAnalysis(other.to_string())),
        }
    }

    /// Typed convenience accessors
    pub fn dominance(&mut self, function: &MIRFunction) -> MIRResult<Rc<DominanceInfo>> {
        Ok(self
            .get(analysis::DOMINANCE, function)?
            .as_dominance()
            .expect("dominance result"))
    }

    pub fn use_def(&mut self, function: &MIRFunction) -> MIRResult<Rc<UseDefChains>> {
        Ok(self
            .get(analysis::USE_DEF_CHAINS, function)?
            .as_use_def()
            .expect("use-def result"))
    }

    pub fn loops(&mut self, function: &MIRFunction) -> MIRResult<Rc<LoopForest>> {
        Ok(self
            .get(analysis::LOOP_ANALYSIS, function)?
            .as_loops()
            .expect("loop forest result"))
    }

    pub fn alias(&mut self, function: &MIRFunction) -> MIRResult<Rc<AliasInfo>> {
        Ok(self
            .get(analysis::ALIAS_ANALYSIS, function)?
            .as_alias()
            .expect("alias result"))
    }

    pub fn escape(&mut self, function: &MIRFunction) -> MIRResult<Rc<EscapeInfo>> {
        Ok(self
            .get(analysis::ESCAPE_ANALYSIS, function)?
            .as_escape()
            .expect("escape result"))
    }

    /// Drop cached results for one function per the preservation level
    pub fn invalidate_function(&mut self, function_name: &str, level: PreservationLevel) {
        match level {
            PreservationLevel::All => {}
            PreservationLevel::Cfg => {
                self.cache.retain(|(_, func), result| {
                    func != function_name || result.survives_cfg_preserving()
                });
            }
            PreservationLevel::None => {
                self.cache.retain(|(_, func), _| func != function_name);
            }
        }
    }

    /// Drop cached results for every function per the preservation level
    pub fn invalidate_all(&mut self, level: PreservationLevel) {
        match level {
            PreservationLevel::All => {}
            PreservationLevel::Cfg => {
                self.cache.retain(|_, result| result.survives_cfg_preserving());
            }
            PreservationLevel::None => self.cache.clear(),
        }
    }

    pub fn cached_entry_count(&self) -> usize {
        self.cache.len()
    }
}

enum PassEntry {
    Function(Box<dyn FunctionPass>),
    Module(Box<dyn ModulePass>),
}

impl PassEntry {
    fn info(&self) -> PassInfo {
        match self {
            PassEntry::Function(p) => p.info(),
            PassEntry::Module(p) => p.info(),
        }
    }
}

/// A recorded per-function pass failure
#[derive(Debug, Clone)]
pub struct PassFailure {
    pub pass: String,
    pub function: String,
    pub error: MIRError,
}

/// Registers passes and runs them over modules
pub struct PassManager {
    passes: IndexMap<&'static str, PassEntry>,
    analyses: AnalysisManager,
    failures: Vec<PassFailure>,
}

impl PassManager {
    pub fn new() -> Self {
        Self {
            passes: IndexMap::new(),
            analyses: AnalysisManager::new(),
            failures: Vec::new(),
        }
    }

    pub fn register_function_pass(&mut self, pass: Box<dyn FunctionPass>) {
        let name = pass.info().name;
        self.passes.insert(name, PassEntry::Function(pass));
    }

    pub fn register_module_pass(&mut self, pass: Box<dyn ModulePass>) {
        let name = pass.info().name;
        self.passes.insert(name, PassEntry::Module(pass));
    }

    pub fn registered_passes(&self) -> Vec<&'static str> {
        self.passes.keys().copied().collect()
    }

    pub fn failures(&self) -> &[PassFailure] {
        &self.failures
    }

    pub fn analyses_mut(&mut self) -> &mut AnalysisManager {
        &mut self.analyses
    }

    pub fn pass_stats(&self, name: &str) -> Option<crate::pass::PassStats> {
        self.passes.get(name).map(|entry| match entry {
            PassEntry::Function(p) => p.stats().clone(),
            PassEntry::Module(p) => p.stats().clone(),
        })
    }

    /// Run one registered pass over the module
    ///
    /// Function passes run over every function; one function failing does
    /// not stop the others. Returns whether anything was modified.
    pub fn run_pass(&mut self, name: &str, module: &mut MIRModule) -> MIRResult<bool> {
        let entry = self
            .passes
            .get_mut(name)
            .ok_or_else(|| MIRError::UnknownPass(name.to_string()))?;
        let info = entry.info();

        match entry {
            PassEntry::Function(pass) => {
                let mut modified = false;
                let function_names: Vec<String> = module.functions.keys().cloned().collect();

                for function_name in function_names {
                    let Some(function) = module.functions.get_mut(&function_name) else {
                        continue;
                    };

                    // Warm the declared analyses before the pass runs.
                    let mut prefetch_failed = None;
                    for required in info.requires {
                        if let Err(error) = self.analyses.get(required, function) {
                            prefetch_failed = Some(error);
                            break;
                        }
                    }
                    if let Some(error) = prefetch_failed {
                        self.failures.push(PassFailure {
                            pass: name.to_string(),
                            function: function_name.clone(),
                            error,
                        });
                        continue;
                    }

                    match pass.run_on_function(function, &mut self.analyses) {
                        Ok(changed) => {
                            trace!(
                                "pass {} on {}: modified={}",
                                name,
                                function_name,
                                changed
                            );
                            if changed {
                                modified = true;
                                self.analyses
                                    .invalidate_function(&function_name, info.preserves);
                            }
                        }
                        Err(error) => {
                            debug!("pass {} failed on {}: {}", name, function_name, error);
                            self.failures.push(PassFailure {
                                pass: name.to_string(),
                                function: function_name.clone(),
                                error,
                            });
                        }
                    }
                }
                Ok(modified)
            }
            PassEntry::Module(pass) => match pass.run_on_module(module, &mut self.analyses) {
                Ok(changed) => {
                    trace!("module pass {}: modified={}", name, changed);
                    if changed {
                        self.analyses.invalidate_all(info.preserves);
                    }
                    Ok(changed)
                }
                Err(error) => {
                    debug!("module pass {} failed: {}", name, error);
                    self.failures.push(PassFailure {
                        pass: name.to_string(),
                        function: String::new(),
                        error,
                    });
                    Ok(false)
                }
            },
        }
    }

    /// Run a pass list repeatedly until a fixed point or the iteration cap
    ///
    /// Returns the number of iterations that made progress.
    pub fn run_until_fixed_point(
        &mut self,
        names: &[&str],
        module: &mut MIRModule,
        max_iterations: usize,
    ) -> MIRResult<usize> {
        let mut iterations = 0;
        for round in 0..max_iterations {
            let mut modified = false;
            for name in names {
                if self.run_pass(name, module)? {
                    modified = true;
                }
            }
            if !modified {
                break;
            }
            iterations = round + 1;
            debug!("optimization round {} modified the module", iterations);
        }
        Ok(iterations)
    }
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BasicBlock;
    use crate::instruction::{InstKind, MIRInstruction};
    use crate::pass::{PassKind, PassStats};
    use crate::types::MIRType;

    fn simple_module() -> MIRModule {
        let mut module = MIRModule::new("m");
        let mut function = MIRFunction::new("main", vec![], MIRType::Empty);
        let mut entry = BasicBlock::new("entry");
        entry.add_instruction(MIRInstruction::new(InstKind::Nop));
        entry.add_instruction(MIRInstruction::new(InstKind::Return { value: None }));
        function.cfg.add_block(entry);
        module.add_function(function);
        module
    }

    /// A pass that removes nops once, then reports no further change.
    struct RemoveNops {
        stats: PassStats,
    }

    impl FunctionPass for RemoveNops {
        fn info(&self) -> PassInfo {
            PassInfo {
                name: "remove-nops",
                description: "Remove no-op instructions",
                kind: PassKind::Optimization,
                requires: &[crate::analysis::DOMINANCE],
                preserves: PreservationLevel::Cfg,
            }
        }

        fn run_on_function(
            &mut self,
            function: &mut MIRFunction,
            _analyses: &mut AnalysisManager,
        ) -> MIRResult<bool> {
            let mut modified = false;
            for block in function.cfg.blocks.values_mut() {
                let before = block.instructions.len();
                block
                    .instructions
                    .retain(|inst| !matches!(inst.kind, InstKind::Nop));
                if block.instructions.len() != before {
                    self.stats.add("nops_removed", before - block.instructions.len());
                    modified = true;
                }
            }
            Ok(modified)
        }

        fn stats(&self) -> &PassStats {
            &self.stats
        }
    }

    #[test]
    fn test_run_pass_and_fixed_point() {
        let mut manager = PassManager::new();
        manager.register_function_pass(Box::new(RemoveNops {
            stats: PassStats::new(),
        }));

        let mut module = simple_module();
        let modified = manager.run_pass("remove-nops", &mut module).unwrap();
        assert!(modified);
        assert!(!manager.run_pass("remove-nops", &mut module).unwrap());
        assert_eq!(
            manager.pass_stats("remove-nops").unwrap().get("nops_removed"),
            1
        );

        // fixed point over an already-clean module terminates immediately
        let rounds = manager
            .run_until_fixed_point(&["remove-nops"], &mut module, 10)
            .unwrap();
        assert_eq!(rounds, 0);
    }

    #[test]
    fn test_unknown_pass_errors() {
        let mut manager = PassManager::new();
        let mut module = simple_module();
        assert!(matches!(
            manager.run_pass("missing", &mut module),
            Err(MIRError::UnknownPass(_))
        ));
    }

    #[test]
    fn test_analysis_cache_and_invalidation() {
        let mut manager = AnalysisManager::new();
        let module = simple_module();
        let function = module.get_function("main").unwrap();

        manager.dominance(function).unwrap();
        manager.use_def(function).unwrap();
        assert_eq!(manager.cached_entry_count(), 2);

        // CFG-preserving invalidation keeps dominance, drops use-def
        manager.invalidate_function("main", PreservationLevel::Cfg);
        assert_eq!(manager.cached_entry_count(), 1);

        manager.invalidate_function("main", PreservationLevel::None);
        assert_eq!(manager.cached_entry_count(), 0);
    }

    #[test]
    fn test_unknown_analysis_errors() {
        let mut manager = AnalysisManager::new();
        let module = simple_module();
        let function = module.get_function("main").unwrap();
        assert!(matches!(
            manager.get("made-up", function),
            Err(MIRError::UnknownAnalysis(_))
        ));
    }
}
