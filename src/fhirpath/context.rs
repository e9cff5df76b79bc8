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

// Evaluation context for FHIRPath expressions

use crate::model::{ComputedValues, Value};

/// Context for evaluating FHIRPath expressions
#[derive(Debug, Clone)]
pub struct EvaluationContext<'a> {
    /// Current input collection being evaluated
    pub input: Vec<Value>,

    /// Root input value (`%resource`, `%context`)
    pub root: &'a Value,

    /// Item bound to `$this` inside `where`, `select` and friends
    pub this: Option<Value>,

    /// External constants (`%name`)
    pub constants: &'a ComputedValues,
}

impl<'a> EvaluationContext<'a> {
    /// Create a context rooted at a value
    pub fn new(root: &'a Value, constants: &'a ComputedValues) -> Self {
        Self {
            input: root.clone().into_list(),
            root,
            this: None,
            constants,
        }
    }

    /// Create a child context with a new input collection
    pub fn with_input(&self, input: Vec<Value>) -> Self {
        Self {
            input,
            root: self.root,
            this: self.this.clone(),
            constants: self.constants,
        }
    }

    /// Create a child context focused on one item, bound to `$this`
    pub fn with_this(&self, item: Value) -> Self {
        Self {
            input: vec![item.clone()],
            root: self.root,
            this: Some(item),
            constants: self.constants,
        }
    }

    /// Resolve a `$` variable or `%` constant
    pub fn get_variable(&self, name: &str) -> Option<Vec<Value>> {
        match name {
            "this" => Some(
                self.this
                    .clone()
                    .map(|item| vec![item])
                    .unwrap_or_else(|| self.input.clone()),
            ),
            "resource" | "context" | "rootResource" => Some(self.root.clone().into_list()),
            "ucum" => Some(vec![Value::from("http://unitsofmeasure.org")]),
            "sct" => Some(vec![Value::from("http://snomed.info/sct")]),
            "loinc" => Some(vec![Value::from("http://loinc.org")]),
            _ => self
                .constants
                .get(name)
                .map(|value| value.clone().into_list()),
        }
    }
}
