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

//! FHIRPath extraction helper
//!
//! Register configuration uses FHIRPath for sort keys, conditional filters,
//! reference paths and the `fhirPath.*` rule helpers. [`FhirPathExtractor`]
//! parses each distinct expression once and shares the parsed form across
//! threads.

mod context;
mod engine;
mod functions;
mod sort;

pub use context::EvaluationContext;
pub use engine::FhirPathEngine;
pub(crate) use functions::is_of_type;

use crate::ast::ExpressionNode;
use crate::evaluator::error::EvaluationResult;
use crate::model::{ComputedValues, Value};
use crate::parser::parse_fhirpath;
use chrono::NaiveDate;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::sync::Arc;

/// Default capacity of the parsed expression cache
pub const DEFAULT_CACHE_SIZE: usize = 1024;

static NO_CONSTANTS: Lazy<ComputedValues> = Lazy::new(ComputedValues::new);

/// Evaluates FHIRPath expressions against resources and values
#[derive(Debug)]
pub struct FhirPathExtractor {
    engine: FhirPathEngine,
    cache: DashMap<String, Arc<ExpressionNode>>,
    capacity: usize,
}

impl Default for FhirPathExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }
}

impl FhirPathExtractor {
    /// Create an extractor caching up to `capacity` parsed expressions
    pub fn new(capacity: usize) -> Self {
        Self {
            engine: FhirPathEngine::new(),
            cache: DashMap::new(),
            capacity,
        }
    }

    /// Fix the date returned by `today()`
    pub fn with_today(mut self, today: Option<NaiveDate>) -> Self {
        self.engine = FhirPathEngine::with_today(today);
        self
    }

    /// Parse an expression, reusing a cached parse when present
    pub fn compile(&self, expression: &str) -> EvaluationResult<Arc<ExpressionNode>> {
        if let Some(cached) = self.cache.get(expression) {
            log::trace!("FHIRPath cache hit: {expression}");
            return Ok(Arc::clone(&cached));
        }

        let parsed = Arc::new(parse_fhirpath(expression)?);

        // Simple eviction: clear everything once full
        if self.cache.len() >= self.capacity {
            self.cache.clear();
        }
        if self.capacity > 0 {
            self.cache
                .insert(expression.to_string(), Arc::clone(&parsed));
        }
        Ok(parsed)
    }

    /// Evaluate an expression with `%name` constants
    ///
    /// A blank expression yields the empty collection.
    pub fn evaluate(
        &self,
        input: &Value,
        expression: &str,
        constants: &ComputedValues,
    ) -> EvaluationResult<Vec<Value>> {
        if expression.trim().is_empty() {
            return Ok(Vec::new());
        }
        let parsed = self.compile(expression)?;
        let context = EvaluationContext::new(input, constants);
        self.engine.evaluate_with_context(&parsed, &context)
    }

    /// All results of an expression
    pub fn extract_data(&self, input: &Value, expression: &str) -> EvaluationResult<Vec<Value>> {
        self.evaluate(input, expression, &NO_CONSTANTS)
    }

    /// First result rendered as a string; empty when there is none
    pub fn extract_value(&self, input: &Value, expression: &str) -> EvaluationResult<String> {
        Ok(self
            .extract_data(input, expression)?
            .first()
            .map(ToString::to_string)
            .unwrap_or_default())
    }

    /// Whether any result is the boolean `true`
    pub fn evaluate_boolean(
        &self,
        input: &Value,
        expression: &str,
        constants: &ComputedValues,
    ) -> EvaluationResult<bool> {
        Ok(self
            .evaluate(input, expression, constants)?
            .iter()
            .any(|item| matches!(item, Value::Boolean(true))))
    }

    /// Number of cached expressions
    pub fn cached_expressions(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::error::EvaluationError;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn patient() -> Value {
        Value::from_json(&json!({
            "resourceType": "Patient",
            "id": "p1",
            "active": true,
            "gender": "female",
            "birthDate": "2020-02-29",
            "name": [
                {"use": "official", "family": "Doe", "given": ["Jane", "Q"]},
                {"use": "nickname", "given": ["JJ"]}
            ],
            "telecom": [],
            "managingOrganization": {"reference": "Organization/org-1"}
        }))
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[rstest]
    #[case("Patient.id", "p1")]
    #[case("id", "p1")]
    #[case("Patient.name.where(use = 'official').family", "Doe")]
    #[case("name.given.first()", "Jane")]
    #[case("name.given.last()", "JJ")]
    #[case("name.given.count()", "3")]
    #[case("name.where(use = 'nickname').given.first().upper()", "JJ")]
    #[case("gender = 'female'", "true")]
    #[case("telecom.exists()", "false")]
    #[case("name.exists(family = 'Doe')", "true")]
    #[case("managingOrganization.reference", "Organization/org-1")]
    #[case("name.select(given.first()).join(',')", "Jane,JJ")]
    #[case("iif(active, 'yes', 'no')", "yes")]
    #[case("birthDate < today()", "true")]
    #[case("'a' & 'b'", "ab")]
    #[case("1 + 2 * 3", "7")]
    #[case("5 / 2", "2.5")]
    #[case("5 div 2", "2")]
    #[case("gender in ('male' | 'female')", "true")]
    #[case("(name.given | name.given).count()", "3")]
    #[case("Patient.name.family.startsWith('Do') and active", "true")]
    fn test_extract_value(#[case] expression: &str, #[case] expected: &str) {
        let extractor = FhirPathExtractor::default().with_today(Some(today()));
        assert_eq!(extractor.extract_value(&patient(), expression).unwrap(), expected);
    }

    #[test]
    fn test_missing_path_is_empty() {
        let extractor = FhirPathExtractor::default();
        assert!(
            extractor
                .extract_data(&patient(), "Patient.deceased")
                .unwrap()
                .is_empty()
        );
        assert_eq!(extractor.extract_value(&patient(), "address.city").unwrap(), "");
        assert!(extractor.extract_data(&patient(), "  ").unwrap().is_empty());
    }

    #[test]
    fn test_choice_types_and_type_filters() {
        let observation = Value::from_json(&json!({
            "resourceType": "Observation",
            "id": "o1",
            "valueQuantity": {"value": 72, "unit": "kg"}
        }));
        let extractor = FhirPathExtractor::default();
        assert_eq!(
            extractor
                .extract_value(&observation, "Observation.value.ofType(Quantity).value")
                .unwrap(),
            "72"
        );
        assert!(
            extractor
                .evaluate_boolean(&observation, "value is Quantity", &ComputedValues::new())
                .unwrap()
        );
        assert!(
            !extractor
                .evaluate_boolean(&observation, "value.is(CodeableConcept)", &ComputedValues::new())
                .unwrap()
        );
    }

    #[test]
    fn test_external_constants() {
        let mut constants = ComputedValues::new();
        constants.insert("patientId".to_string(), Value::from("p1"));
        let extractor = FhirPathExtractor::default();

        assert!(
            extractor
                .evaluate_boolean(&patient(), "id = %patientId", &constants)
                .unwrap()
        );
        assert!(matches!(
            extractor.evaluate_boolean(&patient(), "id = %unknown", &constants),
            Err(EvaluationError::MissingBinding { .. })
        ));
        assert!(
            extractor
                .evaluate_boolean(&patient(), "%resource.id = 'p1'", &constants)
                .unwrap()
        );
    }

    #[test]
    fn test_errors() {
        let extractor = FhirPathExtractor::default();
        assert!(matches!(
            extractor.extract_data(&patient(), "name.("),
            Err(EvaluationError::Parse(_))
        ));
        assert!(matches!(
            extractor.extract_data(&patient(), "name.frobnicate()"),
            Err(EvaluationError::UnknownFunction { .. })
        ));
    }

    #[test]
    fn test_cache_is_bounded() {
        let extractor = FhirPathExtractor::new(2);
        extractor.compile("id").unwrap();
        extractor.compile("id").unwrap();
        assert_eq!(extractor.cached_expressions(), 1);
        extractor.compile("gender").unwrap();
        extractor.compile("active").unwrap();
        assert!(extractor.cached_expressions() <= 2);
    }
}
