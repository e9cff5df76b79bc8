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

//! Error types for fetching and loading resource data
//!
//! Only whole-operation failures surface here. Failures scoped to one relation
//! or one rule are absorbed where they happen and logged.

use crate::parser::ParseError;
use crate::store::StoreError;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that abort the current row, page or list item
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The resource store failed as a whole (closed, unreachable, timed out).
    /// The caller is expected to retry the unit of work.
    #[error("Resource store unavailable: {message}")]
    StoreUnavailable {
        /// Underlying failure
        message: String,
    },

    /// A root resource requested by id does not exist
    #[error("Resource not found: {resource_type}/{id}")]
    ResourceNotFound {
        /// Resource type
        resource_type: String,
        /// Logical id
        id: String,
    },

    /// JSON that cannot be used as a resource
    #[error("Invalid resource: {message}")]
    InvalidResource {
        /// What is wrong with it
        message: String,
    },

    /// Expression that could not be parsed where parsing is mandatory
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}

impl EngineError {
    /// Create a store unavailable error
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    /// Check whether retrying the operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }
}

impl From<StoreError> for EngineError {
    fn from(error: StoreError) -> Self {
        Self::StoreUnavailable {
            message: error.to_string(),
        }
    }
}
