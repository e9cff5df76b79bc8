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

//! Facts/Session working memory for one rule firing
//!
//! A [`Session`] is built from shared, immutable inputs for exactly one
//! firing and consumed by it. It is neither `Clone`, `Send` nor `Sync`, so
//! concurrent firings cannot share one:
//!
//! ```compile_fail
//! use octofhir_resource_rules::Session;
//!
//! fn assert_send<T: Send>() {}
//! assert_send::<Session<'static>>();
//! ```

use crate::evaluator::dates::DateService;
use crate::evaluator::error::{EvaluationError, EvaluationResult};
use crate::fhirpath::FhirPathExtractor;
use crate::model::{ComputedValues, Namespace, RepositoryResourceData, Value};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::marker::PhantomData;

/// Single-use binding environment for one rule firing
#[derive(Debug)]
pub struct Session<'a> {
    facts: IndexMap<String, Value>,
    output: ComputedValues,
    fhir_path: &'a FhirPathExtractor,
    dates: DateService,
    _not_shareable: PhantomData<*const ()>,
}

impl<'a> Session<'a> {
    /// Build the facts for one root resource
    ///
    /// Bound facts, later entries replacing earlier ones on a name clash:
    /// the root resource under its type name, each relation key with its
    /// resources, each count key with its count entries, the roots and
    /// relations of secondary data merged by key, and the extra parameters
    /// as strings.
    pub fn new(
        data: &RepositoryResourceData,
        params: &HashMap<String, String>,
        fhir_path: &'a FhirPathExtractor,
        dates: DateService,
    ) -> Self {
        let mut facts = IndexMap::new();
        facts.insert(
            data.resource.resource_type().to_string(),
            Value::Resource(data.resource.clone()),
        );

        let related = data.merged_related();
        let counts = data.merged_counts();

        for (key, resources) in &related {
            facts.insert(key.clone(), Value::resources(resources));
        }
        for (key, entries) in &counts {
            facts.insert(
                key.clone(),
                Value::list(entries.iter().map(|entry| entry.to_value())),
            );
        }
        for (key, value) in params {
            facts.insert(key.clone(), Value::String(value.clone()));
        }

        Self {
            facts,
            output: ComputedValues::new(),
            fhir_path,
            dates,
            _not_shareable: PhantomData,
        }
    }

    /// Resolve a name: computed values first, then facts, then namespaces
    pub fn resolve(&self, name: &str) -> EvaluationResult<Value> {
        if let Some(value) = self.output.get(name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.facts.get(name) {
            return Ok(value.clone());
        }
        Namespace::ALL
            .iter()
            .find(|namespace| namespace.binding_name() == name)
            .map(|namespace| Value::Namespace(*namespace))
            .ok_or_else(|| EvaluationError::missing(name))
    }

    /// Look up a fact
    pub fn fact(&self, name: &str) -> Option<&Value> {
        self.facts.get(name)
    }

    /// Bind an additional fact
    pub fn insert_fact(&mut self, name: impl Into<String>, value: Value) {
        self.facts.insert(name.into(), value);
    }

    /// Write a computed value; visible to every later action
    pub fn put(&mut self, name: impl Into<String>, value: Value) {
        self.output.insert(name.into(), value);
    }

    /// A computed value written so far
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.output.get(name)
    }

    /// Computed values written so far
    pub fn output(&self) -> &ComputedValues {
        &self.output
    }

    /// FHIRPath extraction helper
    pub fn fhir_path(&self) -> &FhirPathExtractor {
        self.fhir_path
    }

    /// Date helper
    pub fn dates(&self) -> &DateService {
        &self.dates
    }

    /// Consume the session, returning its computed values
    pub fn into_output(self) -> ComputedValues {
        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RelatedResourceCount, Resource};
    use chrono::NaiveDate;
    use serde_json::json;
    use std::sync::Arc;

    fn resource(json: serde_json::Value) -> Arc<Resource> {
        Arc::new(Resource::from_json(json).unwrap())
    }

    fn dates() -> DateService {
        DateService::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
    }

    #[test]
    fn test_facts_binding() {
        let mut data =
            RepositoryResourceData::new(resource(json!({"resourceType": "Patient", "id": "p1"})));
        data.related_resources_map.insert(
            "carePlans".into(),
            vec![resource(json!({"resourceType": "CarePlan", "id": "c1"}))],
        );
        data.related_resources_count_map.insert(
            "tasks".into(),
            vec![RelatedResourceCount::new("Task", Some("p1".into()), 5)],
        );
        let mut secondary =
            RepositoryResourceData::new(resource(json!({"resourceType": "Group", "id": "g1"})));
        secondary.related_resources_map.insert(
            "carePlans".into(),
            vec![resource(json!({"resourceType": "CarePlan", "id": "c2"}))],
        );
        data.secondary_repository_resource_data.push(secondary);
        let params = HashMap::from([("practitionerId".to_string(), "pr1".to_string())]);
        let extractor = FhirPathExtractor::default();

        let session = Session::new(&data, &params, &extractor, dates());

        assert!(matches!(session.resolve("Patient"), Ok(Value::Resource(_))));
        assert_eq!(session.resolve("carePlans").unwrap().as_list().unwrap().len(), 2);
        assert_eq!(session.resolve("Group").unwrap().as_list().unwrap().len(), 1);
        assert_eq!(session.resolve("practitionerId").unwrap(), Value::from("pr1"));
        let counts = session.resolve("tasks").unwrap();
        assert_eq!(
            counts.as_list().unwrap()[0].member("count"),
            Some(Value::Integer(5))
        );
        assert_eq!(
            session.resolve("StringUtils").unwrap(),
            Value::Namespace(Namespace::StringUtils)
        );
        assert!(session.resolve("Encounter").unwrap_err().is_missing_binding());
    }

    #[test]
    fn test_output_shadows_facts() {
        let data =
            RepositoryResourceData::new(resource(json!({"resourceType": "Patient", "id": "p1"})));
        let extractor = FhirPathExtractor::default();
        let mut session = Session::new(&data, &HashMap::new(), &extractor, dates());

        session.put("Patient", Value::from("shadowed"));
        assert_eq!(session.resolve("Patient").unwrap(), Value::from("shadowed"));
        assert!(matches!(session.fact("Patient"), Some(Value::Resource(_))));
        assert_eq!(session.into_output().len(), 1);
    }
}
