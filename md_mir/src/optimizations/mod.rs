//! MIR optimization passes

pub mod constant_propagation;
pub mod cse;
pub mod dce;
pub mod inlining;
pub mod jump_threading;
pub mod licm;
pub mod peephole;
pub mod specialization;
pub mod strength_reduction;
pub mod type_specific;

pub use constant_propagation::ConstantPropagation;
pub use cse::CommonSubexpressionElimination;
pub use dce::DeadCodeElimination;
pub use inlining::FunctionInlining;
pub use jump_threading::JumpThreading;
pub use licm::LoopInvariantCodeMotion;
pub use peephole::Peephole;
pub use specialization::TypeSpecialization;
pub use strength_reduction::StrengthReduction;
pub use type_specific::TypeSpecificOptimization;

use crate::pass_manager::PassManager;
use crate::pipeline::OptimizationConfig;

/// Register every optimization pass with the pass manager
pub fn register_all_passes(manager: &mut PassManager, config: &OptimizationConfig) {
    manager.register_function_pass(Box::new(ConstantPropagation::new()));
    manager.register_function_pass(Box::new(CommonSubexpressionElimination::new()));
    manager.register_function_pass(Box::new(DeadCodeElimination::new()));
    manager.register_function_pass(Box::new(StrengthReduction::new()));
    manager.register_function_pass(Box::new(LoopInvariantCodeMotion::new()));
    manager.register_function_pass(Box::new(JumpThreading::new(config.jump_thread_depth)));
    manager.register_function_pass(Box::new(Peephole::new()));
    manager.register_function_pass(Box::new(TypeSpecificOptimization::new()));
    manager.register_module_pass(Box::new(FunctionInlining::new(config.clone())));
    manager.register_module_pass(Box::new(TypeSpecialization::new(
        config.specialize_threshold,
    )));
}
