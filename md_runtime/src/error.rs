//! Runtime error taxonomy for Machine Dialect

use thiserror::Error;

/// Errors raised while evaluating Machine Dialect operations
///
/// The variants mirror the language's user-visible error kinds. The same
/// taxonomy is used by the VM and by the compiler's constant folder (which
/// treats any `Err` as "do not fold").
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("{0}")]
    TypeError(String),

    #[error("{0}")]
    DivisionByZero(String),

    #[error("Name '{0}' is not defined")]
    NameError(String),

    #[error("{0}")]
    ArgumentError(String),

    #[error("{0}")]
    ValueError(String),
}

impl RuntimeError {
    pub fn unsupported_binary(op: &str, left: &str, right: &str) -> Self {
        RuntimeError::TypeError(format!(
            "Unsupported operand type(s) for {}: '{}' and '{}'",
            op, left, right
        ))
    }

    pub fn unsupported_unary(op: &str, operand: &str) -> Self {
        RuntimeError::TypeError(format!(
            "Unsupported operand type for unary {}: '{}'",
            op, operand
        ))
    }

    pub fn division_by_zero() -> Self {
        RuntimeError::DivisionByZero("Division by zero".to_string())
    }

    pub fn modulo_by_zero() -> Self {
        RuntimeError::DivisionByZero("Modulo by zero".to_string())
    }
}

/// Result type alias for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_messages() {
        assert_eq!(
            RuntimeError::division_by_zero().to_string(),
            "Division by zero"
        );
        assert_eq!(RuntimeError::modulo_by_zero().to_string(), "Modulo by zero");
        assert_eq!(
            RuntimeError::NameError("count".to_string()).to_string(),
            "Name 'count' is not defined"
        );
    }

    #[test]
    fn test_operand_type_message() {
        let err = RuntimeError::unsupported_binary("-", "text", "integer");
        assert_eq!(
            err.to_string(),
            "Unsupported operand type(s) for -: 'text' and 'integer'"
        );
    }
}
