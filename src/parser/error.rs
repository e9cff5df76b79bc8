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

//! Parser error types

use thiserror::Error;

/// Result type for parser operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Parse error with location information
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Token that does not fit the grammar at this point
    #[error("Unexpected token at position {position}: {token}")]
    UnexpectedToken {
        /// Description of the offending token
        token: String,
        /// Byte offset of the token
        position: usize,
    },

    /// Input ended while an expression was still open
    #[error("Unexpected end of input: expected {expected}")]
    UnexpectedEof {
        /// What the parser was looking for
        expected: String,
    },

    /// Character that starts no token
    #[error("Invalid character '{character}' at position {position}")]
    InvalidCharacter {
        /// The character
        character: char,
        /// Byte offset of the character
        position: usize,
    },

    /// String literal without closing quote
    #[error("Unclosed string literal starting at position {position}")]
    UnclosedString {
        /// Byte offset of the opening quote
        position: usize,
    },

    /// Malformed escape sequence inside a string literal
    #[error("Invalid escape sequence '{sequence}' at position {position}")]
    InvalidEscape {
        /// The escape sequence
        sequence: String,
        /// Byte offset of the literal
        position: usize,
    },

    /// Numeric literal that does not fit its type
    #[error("Invalid number '{literal}' at position {position}")]
    InvalidNumber {
        /// The literal text
        literal: String,
        /// Byte offset of the literal
        position: usize,
    },

    /// Left side of `=` is not a plain name
    #[error("Invalid assignment target at position {position}")]
    InvalidAssignmentTarget {
        /// Byte offset of the `=`
        position: usize,
    },

    /// Expression text is blank
    #[error("Empty expression")]
    EmptyExpression,
}

impl ParseError {
    /// Create an unexpected token error
    pub fn unexpected(token: impl Into<String>, position: usize) -> Self {
        Self::UnexpectedToken {
            token: token.into(),
            position,
        }
    }

    /// Create an unexpected end of input error
    pub fn eof(expected: impl Into<String>) -> Self {
        Self::UnexpectedEof {
            expected: expected.into(),
        }
    }
}
