//! Medium-level Intermediate Representation for Machine Dialect
//!
//! This crate provides the MIR: a three-address code with Static Single
//! Assignment support, sitting between the HIR lowering and bytecode
//! generation. It owns the control flow graph with dominance analysis, SSA
//! construction, the analysis and optimization pass infrastructure, and the
//! IR validator.

use thiserror::Error;

pub mod analysis;
pub mod block;
pub mod cfg;
pub mod function;
pub mod instruction;
pub mod module;
pub mod optimizations;
pub mod pass;
pub mod pass_manager;
pub mod pipeline;
pub mod ssa;
pub mod types;
pub mod validator;
pub mod value;

pub use block::BasicBlock;
pub use cfg::Cfg;
pub use function::MIRFunction;
pub use instruction::{BinaryOperator, InstKind, MIRInstruction, UnaryOperator};
pub use module::MIRModule;
pub use pass::{PassInfo, PassKind, PreservationLevel};
pub use pass_manager::PassManager;
pub use pipeline::{optimize_module, OptimizationConfig, OptimizationLevel};
pub use ssa::{construct_ssa, DominanceInfo};
pub use types::{MIRType, UnionType};
pub use value::{Constant, ConstantValue, FunctionRef, MIRValue, Temp, VarScope, Variable};

/// Errors raised by the MIR infrastructure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MIRError {
    #[error("Unknown pass: {0}")]
    UnknownPass(String),

    #[error("Unknown analysis: {0}")]
    UnknownAnalysis(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Malformed MIR in function '{function}': {message}")]
    MalformedIR { function: String, message: String },
}

/// Result type alias for MIR operations
pub type MIRResult<T> = Result<T, MIRError>;
