//! Type specialization
//!
//! Creates a type-specific clone of a generically-typed function when
//! enough call sites agree on one concrete argument signature, then
//! retargets those call sites at the clone. The generic original stays for
//! any remaining callers.

use crate::function::MIRFunction;
use crate::instruction::InstKind;
use crate::module::MIRModule;
use crate::pass::{ModulePass, PassInfo, PassKind, PassStats, PreservationLevel};
use crate::pass_manager::AnalysisManager;
use crate::types::MIRType;
use crate::value::FunctionRef;
use crate::MIRResult;
use log::debug;
use std::collections::HashMap;

pub struct TypeSpecialization {
    threshold: usize,
    stats: PassStats,
}

impl TypeSpecialization {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            stats: PassStats::new(),
        }
    }

    /// Concrete argument signatures per callee, counted across the module
    fn collect_signatures(&self, module: &MIRModule) -> HashMap<String, Vec<Vec<MIRType>>> {
        let mut signatures: HashMap<String, Vec<Vec<MIRType>>> = HashMap::new();

        for function in module.functions.values() {
            for block in function.cfg.blocks.values() {
                for inst in block.instructions.iter() {
                    let InstKind::Call { func, args, .. } = &inst.kind else {
                        continue;
                    };
                    let types: Vec<MIRType> = args.iter().map(|a| a.ty()).collect();
                    if types
                        .iter()
                        .all(|t| !matches!(t, MIRType::Unknown | MIRType::Error))
                    {
                        signatures.entry(func.name.clone()).or_default().push(types);
                    }
                }
            }
        }

        signatures
    }
}

/// Mangled name of a specialized clone
fn specialized_name(base: &str, signature: &[MIRType]) -> String {
    let parts: Vec<String> = signature.iter().map(|t| t.to_string()).collect();
    format!("{}__{}", base, parts.join("_"))
}

impl ModulePass for TypeSpecialization {
    fn info(&self) -> PassInfo {
        PassInfo {
            name: "type-specialization",
            description: "Clone hot generic functions for concrete call signatures",
            kind: PassKind::Optimization,
            preserves: PreservationLevel::None,
            requires: &[],
        }
    }

    fn run_on_module(
        &mut self,
        module: &mut MIRModule,
        _analyses: &mut AnalysisManager,
    ) -> MIRResult<bool> {
        let signatures = self.collect_signatures(module);
        let mut modified = false;

        let candidates: Vec<String> = module
            .functions
            .values()
            .filter(|f| {
                !f.params.is_empty()
                    && f.params.iter().any(|p| p.ty == MIRType::Unknown)
                    && Some(f.name.as_str()) != module.main_function.as_deref()
            })
            .map(|f| f.name.clone())
            .collect();

        for name in candidates {
            let Some(sites) = signatures.get(&name) else {
                continue;
            };
            if sites.len() < self.threshold {
                continue;
            }
            // every concrete call site must agree on one signature
            let signature = &sites[0];
            if !sites.iter().all(|s| s == signature)
                || signature.len() != module.functions[&name].params.len()
            {
                continue;
            }

            let clone_name = specialized_name(&name, signature);
            if module.functions.contains_key(&clone_name) {
                continue;
            }

            let mut clone = module.functions[&name].clone();
            clone.name = clone_name.clone();
            for (param, ty) in clone.params.iter_mut().zip(signature.iter()) {
                param.ty = *ty;
            }
            module.add_function(clone);
            self.stats.incr("functions_specialized");

            // retarget the agreeing call sites
            let mut retargeted = 0usize;
            for function in module.functions.values_mut() {
                if function.name == clone_name {
                    continue;
                }
                for block in function.cfg.blocks.values_mut() {
                    for inst in block.instructions.iter_mut() {
                        let InstKind::Call { func, args, .. } = &mut inst.kind else {
                            continue;
                        };
                        if func.name != name {
                            continue;
                        }
                        let types: Vec<MIRType> = args.iter().map(|a| a.ty()).collect();
                        if &types == signature {
                            *func = FunctionRef::new(clone_name.clone());
                            retargeted += 1;
                        }
                    }
                }
            }
            self.stats.add("call_sites_retargeted", retargeted);
            debug!(
                "specialization: '{}' -> '{}' ({} call sites)",
                name, clone_name, retargeted
            );
            modified = true;
        }

        Ok(modified)
    }

    fn stats(&self) -> &PassStats {
        &self.stats
    }
}
