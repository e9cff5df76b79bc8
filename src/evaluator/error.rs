// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Error types for expression evaluation

use crate::parser::ParseError;
use thiserror::Error;

/// Result type for evaluation operations
pub type EvaluationResult<T> = Result<T, EvaluationError>;

/// Errors that can occur while evaluating a rule or FHIRPath expression
///
/// [`EvaluationError::MissingBinding`] is the expected absence of optional
/// data; every other variant is a genuine type or syntax problem.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    /// Reference to a name that is not bound, or use of absent data
    #[error("Missing binding: {name}")]
    MissingBinding {
        /// Name or description of the absent value
        name: String,
    },

    /// Type error during evaluation
    #[error("Type error: expected {expected}, got {actual}")]
    TypeError {
        /// Expected type
        expected: String,
        /// Actual type found
        actual: String,
    },

    /// Method not available on the receiver
    #[error("Unknown method {method} on {target}")]
    UnknownMethod {
        /// Receiver type or namespace
        target: String,
        /// Method name
        method: String,
    },

    /// Free function that does not exist
    #[error("Unknown function {name}")]
    UnknownFunction {
        /// Function name
        name: String,
    },

    /// Wrong number of arguments
    #[error("{name} expects {min}..={max} arguments, got {actual}")]
    InvalidArity {
        /// Function or method name
        name: String,
        /// Minimum accepted
        min: usize,
        /// Maximum accepted
        max: usize,
        /// Arguments given
        actual: usize,
    },

    /// Division or modulo by zero
    #[error("Division by zero")]
    DivisionByZero,

    /// Invalid operation
    #[error("Invalid operation: {message}")]
    InvalidOperation {
        /// Error message
        message: String,
    },

    /// Expression text that does not parse
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}

impl EvaluationError {
    /// Create a missing binding error
    pub fn missing(name: impl Into<String>) -> Self {
        Self::MissingBinding { name: name.into() }
    }

    /// Create a type error
    pub fn type_error(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeError {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an invalid operation error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Create an unknown method error
    pub fn unknown_method(target: impl Into<String>, method: impl Into<String>) -> Self {
        Self::UnknownMethod {
            target: target.into(),
            method: method.into(),
        }
    }

    /// Check whether this is the expected absence of optional data
    pub fn is_missing_binding(&self) -> bool {
        matches!(self, Self::MissingBinding { .. })
    }
}

/// Check argument count for a function or method
pub fn check_arity(name: &str, actual: usize, min: usize, max: usize) -> EvaluationResult<()> {
    if actual < min || actual > max {
        return Err(EvaluationError::InvalidArity {
            name: name.to_string(),
            min,
            max,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert!(EvaluationError::missing("Patient").is_missing_binding());
        assert!(!EvaluationError::DivisionByZero.is_missing_binding());
        assert!(!EvaluationError::from(ParseError::EmptyExpression).is_missing_binding());
    }

    #[test]
    fn test_check_arity() {
        assert!(check_arity("get", 1, 1, 1).is_ok());
        assert_eq!(
            check_arity("substring", 3, 1, 2),
            Err(EvaluationError::InvalidArity {
                name: "substring".into(),
                min: 1,
                max: 2,
                actual: 3
            })
        );
    }
}
