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

// Argument access for methods and namespace functions

use super::error::{EvaluationError, EvaluationResult, check_arity};
use crate::model::{Resource, Value};
use std::sync::Arc;

static NULL: Value = Value::Null;

/// Evaluated arguments of one call, arity already checked
pub(super) struct Arguments<'a> {
    name: &'a str,
    values: &'a [Value],
}

impl<'a> Arguments<'a> {
    pub(super) fn new(
        name: &'a str,
        values: &'a [Value],
        min: usize,
        max: usize,
    ) -> EvaluationResult<Self> {
        check_arity(name, values.len(), min, max)?;
        Ok(Self { name, values })
    }

    pub(super) fn len(&self) -> usize {
        self.values.len()
    }

    /// Argument at `index`; null when not given
    pub(super) fn get(&self, index: usize) -> &'a Value {
        self.values.get(index).unwrap_or(&NULL)
    }

    fn missing(&self, index: usize) -> EvaluationError {
        EvaluationError::missing(format!("argument {} of {}", index + 1, self.name))
    }

    /// A string argument; other scalars are rendered
    pub(super) fn text(&self, index: usize) -> EvaluationResult<String> {
        match self.get(index) {
            Value::Null => Err(self.missing(index)),
            Value::List(_) | Value::Namespace(_) | Value::Element(_) | Value::Resource(_) => {
                Err(EvaluationError::type_error(
                    "String",
                    self.get(index).type_name(),
                ))
            }
            other => Ok(other.to_string()),
        }
    }

    /// A string argument that may be null
    pub(super) fn optional_text(&self, index: usize) -> EvaluationResult<Option<String>> {
        match self.get(index) {
            Value::Null => Ok(None),
            _ => self.text(index).map(Some),
        }
    }

    pub(super) fn integer(&self, index: usize) -> EvaluationResult<i64> {
        match self.get(index) {
            Value::Integer(i) => Ok(*i),
            Value::Null => Err(self.missing(index)),
            other => Err(EvaluationError::type_error("Integer", other.type_name())),
        }
    }

    pub(super) fn boolean_or(&self, index: usize, default: bool) -> EvaluationResult<bool> {
        match self.get(index) {
            Value::Null => Ok(default),
            Value::Boolean(b) => Ok(*b),
            other => Err(EvaluationError::type_error("Boolean", other.type_name())),
        }
    }

    pub(super) fn resource(&self, index: usize) -> EvaluationResult<&'a Arc<Resource>> {
        match self.get(index) {
            Value::Resource(resource) => Ok(resource),
            Value::Null => Err(self.missing(index)),
            other => Err(EvaluationError::type_error("Resource", other.type_name())),
        }
    }

    /// Resources of a list argument; null is the empty list
    pub(super) fn resources(&self, index: usize) -> EvaluationResult<Vec<Arc<Resource>>> {
        match self.get(index) {
            Value::Null => Ok(Vec::new()),
            value @ (Value::List(_) | Value::Resource(_)) => Ok(value.resource_items()),
            other => Err(EvaluationError::type_error("List", other.type_name())),
        }
    }
}
