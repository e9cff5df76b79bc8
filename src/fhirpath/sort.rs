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

// Filtering and sorting resource lists by FHIRPath

use super::FhirPathExtractor;
use crate::evaluator::error::EvaluationResult;
use crate::evaluator::operations::{as_date, compare_values};
use crate::model::{ComputedValues, DataType, Resource, SortConfig, SortOrder, Value};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;

impl FhirPathExtractor {
    /// Keep the resources for which `expression` yields `true`
    pub fn filter_resources(
        &self,
        resources: Vec<Arc<Resource>>,
        expression: &str,
        constants: &ComputedValues,
    ) -> EvaluationResult<Vec<Arc<Resource>>> {
        let mut kept = Vec::with_capacity(resources.len());
        for resource in resources {
            let input = Value::Resource(Arc::clone(&resource));
            if self.evaluate_boolean(&input, expression, constants)? {
                kept.push(resource);
            }
        }
        Ok(kept)
    }

    /// Stable sort by the first value of the sort expression
    ///
    /// Resources without a usable key go last in either direction.
    pub fn sort_resources(
        &self,
        resources: &mut Vec<Arc<Resource>>,
        sort: &SortConfig,
    ) -> EvaluationResult<()> {
        let mut keyed = Vec::with_capacity(resources.len());
        for resource in resources.drain(..) {
            let input = Value::Resource(Arc::clone(&resource));
            let key = self
                .extract_data(&input, &sort.fhir_path_expression)?
                .into_iter()
                .next()
                .and_then(|value| sort_key(value, sort.data_type));
            keyed.push((key, resource));
        }

        keyed.sort_by(|(a, _), (b, _)| match (a, b) {
            (Some(a), Some(b)) => {
                let ordering = compare_values(a, b).unwrap_or(Ordering::Equal);
                match sort.order {
                    SortOrder::Ascending => ordering,
                    SortOrder::Descending => ordering.reverse(),
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });

        resources.extend(keyed.into_iter().map(|(_, resource)| resource));
        Ok(())
    }
}

/// Coerce an extracted value to the configured key type
fn sort_key(value: Value, data_type: DataType) -> Option<Value> {
    match data_type {
        DataType::Date | DataType::DateTime => match value {
            Value::DateTime(_) => Some(value),
            other => as_date(&other).map(Value::Date),
        },
        DataType::Integer => match value {
            Value::Integer(_) => Some(value),
            Value::String(s) => s.trim().parse().ok().map(Value::Integer),
            _ => None,
        },
        DataType::Decimal => match value {
            Value::Integer(_) | Value::Decimal(_) => value.as_decimal().map(Value::Decimal),
            Value::String(s) => Decimal::from_str(s.trim()).ok().map(Value::Decimal),
            _ => None,
        },
        DataType::Boolean => match value {
            Value::Boolean(_) => Some(value),
            Value::String(s) => s.parse().ok().map(Value::Boolean),
            _ => None,
        },
        DataType::String => match value {
            Value::Null => None,
            other => Some(Value::String(other.to_string())),
        },
    }
}
