//! Source location tracking for the Machine Dialect compiler

use serde::{Deserialize, Serialize};
use std::fmt;

/// A (line, column) position in source text
///
/// Every MIR instruction carries one of these so that diagnostics emitted
/// long after parsing can still point at the offending source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    pub fn start() -> Self {
        Self::new(1, 1)
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}
