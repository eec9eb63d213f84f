//! Function-level analyses
//!
//! Each analysis produces an immutable result the pass manager caches per
//! function. The result set is closed, so the cache holds a tagged enum
//! rather than type-erased boxes.

pub mod alias;
pub mod loops;
pub mod use_def;

use crate::ssa::DominanceInfo;
use std::rc::Rc;

pub use alias::{AliasInfo, EscapeInfo};
pub use loops::{Loop, LoopForest};
pub use use_def::{InstRef, InstSlot, UseDefChains};

/// Analysis names as the pass `requires` lists spell them
pub const DOMINANCE: &str = "dominance";
pub const USE_DEF_CHAINS: &str = "use-def-chains";
pub const LOOP_ANALYSIS: &str = "loop-analysis";
pub const ALIAS_ANALYSIS: &str = "alias-analysis";
pub const ESCAPE_ANALYSIS: &str = "escape-analysis";

/// All known analysis names
pub const ALL_ANALYSES: [&str; 5] = [
    DOMINANCE,
    USE_DEF_CHAINS,
    LOOP_ANALYSIS,
    ALIAS_ANALYSIS,
    ESCAPE_ANALYSIS,
];

/// A cached analysis result
///
/// Reference counted so a pass can hold the result while mutating the
/// function; the cache entry is a snapshot, not a live view.
#[derive(Debug, Clone)]
pub enum AnalysisResult {
    Dominance(Rc<DominanceInfo>),
    UseDef(Rc<UseDefChains>),
    Loops(Rc<LoopForest>),
    Alias(Rc<AliasInfo>),
    Escape(Rc<EscapeInfo>),
}

impl AnalysisResult {
    pub fn as_dominance(&self) -> Option<Rc<DominanceInfo>> {
        match self {
            AnalysisResult::Dominance(info) => Some(info.clone()),
            _ => None,
        }
    }

    pub fn as_use_def(&self) -> Option<Rc<UseDefChains>> {
        match self {
            AnalysisResult::UseDef(info) => Some(info.clone()),
            _ => None,
        }
    }

    pub fn as_loops(&self) -> Option<Rc<LoopForest>> {
        match self {
            AnalysisResult::Loops(info) => Some(info.clone()),
            _ => None,
        }
    }

    pub fn as_alias(&self) -> Option<Rc<AliasInfo>> {
        match self {
            AnalysisResult::Alias(info) => Some(info.clone()),
            _ => None,
        }
    }

    pub fn as_escape(&self) -> Option<Rc<EscapeInfo>> {
        match self {
            AnalysisResult::Escape(info) => Some(info.clone()),
            _ => None,
        }
    }

    /// Does this result survive a transformation at the given preservation
    /// level? Dominance and the loop forest only depend on CFG structure.
    pub fn survives_cfg_preserving(&self) -> bool {
        matches!(
            self,
            AnalysisResult::Dominance(_) | AnalysisResult::Loops(_)
        )
    }
}
