//! Code generation errors
//!
//! The emitter is fail-fast: any of these indicates a bug in an earlier
//! stage or a malformed serialized module, never a recoverable condition.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodegenError {
    #[error("Out of registers (max {max})")]
    OutOfRegisters { max: usize },

    #[error("Constant pool overflow (max {max} entries)")]
    ConstantPoolOverflow { max: usize },

    #[error("Unresolved jump label: {0}")]
    UnresolvedLabel(String),

    #[error("Function '{0}' has no entry block")]
    MissingEntryBlock(String),

    #[error("Value {0} was never allocated a register")]
    UnallocatedValue(String),

    #[error("Invalid magic bytes in serialized module")]
    BadMagic,

    #[error("Unsupported bytecode version: {0}")]
    UnsupportedVersion(u32),

    #[error("Unexpected end of serialized module")]
    UnexpectedEof,

    #[error("Invalid constant type tag: {0}")]
    InvalidConstantTag(u8),

    #[error("Invalid chunk type: {0}")]
    InvalidChunkType(u8),

    #[error("Invalid UTF-8 in serialized string")]
    InvalidUtf8,
}

pub type CodegenResult<T> = Result<T, CodegenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            CodegenError::OutOfRegisters { max: 256 }.to_string(),
            "Out of registers (max 256)"
        );
        assert_eq!(
            CodegenError::UnresolvedLabel("L3".to_string()).to_string(),
            "Unresolved jump label: L3"
        );
    }
}
