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

//! Turning fetched resource data into computed values

use crate::config::EngineConfig;
use crate::evaluator::DateService;
use crate::fhirpath::FhirPathExtractor;
use crate::model::{ComputedValues, RepositoryResourceData, ResourceData, RuleConfig, Value};
use crate::rules::{RuleSet, RulesEngine};
use crate::session::Session;
use std::collections::HashMap;
use std::sync::Arc;

/// Fires rules over one fetched graph and packages the result
#[derive(Debug, Clone)]
pub struct ResourceDataRulesExecutor {
    fhir_path: Arc<FhirPathExtractor>,
    dates: DateService,
}

impl ResourceDataRulesExecutor {
    /// Create an executor sharing a FHIRPath extractor
    pub fn new(fhir_path: Arc<FhirPathExtractor>, dates: DateService) -> Self {
        Self { fhir_path, dates }
    }

    /// Create an executor with its own extractor
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(Arc::new(config.fhir_path_extractor()), config.date_service())
    }

    /// The shared FHIRPath extractor
    pub fn fhir_path(&self) -> &Arc<FhirPathExtractor> {
        &self.fhir_path
    }

    /// Compile `rules` and evaluate them for `data`
    pub fn process_resource_data(
        &self,
        data: &RepositoryResourceData,
        rules: &[RuleConfig],
        params: &HashMap<String, String>,
    ) -> ResourceData {
        self.process_with_rule_set(data, &RuleSet::compile(rules), params)
    }

    /// Evaluate already compiled rules for `data`
    pub fn process_with_rule_set(
        &self,
        data: &RepositoryResourceData,
        rules: &RuleSet,
        params: &HashMap<String, String>,
    ) -> ResourceData {
        ResourceData::new(
            data.resource.logical_id(),
            data.resource.resource_type().to_string(),
            self.compute_values(data, rules, params),
        )
    }

    /// Rule output with `params` laid over it
    ///
    /// Parameters are explicit overrides from the caller and win over rule
    /// output of the same name.
    pub fn compute_values(
        &self,
        data: &RepositoryResourceData,
        rules: &RuleSet,
        params: &HashMap<String, String>,
    ) -> ComputedValues {
        let session = Session::new(data, params, &self.fhir_path, self.dates);
        let mut computed = RulesEngine::fire(rules, session);
        for (key, value) in params {
            computed.insert(key.clone(), Value::String(value.clone()));
        }
        computed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Resource;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn executor() -> ResourceDataRulesExecutor {
        let config = EngineConfig::builder()
            .with_today(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
            .build();
        ResourceDataRulesExecutor::from_config(&config)
    }

    fn patient_data() -> RepositoryResourceData {
        let patient = Resource::from_json(json!({
            "resourceType": "Patient",
            "id": "Patient/p1/_history/2",
            "birthDate": "2024-05-18"
        }))
        .unwrap();
        RepositoryResourceData::new(Arc::new(patient))
    }

    #[test]
    fn test_process_resource_data() {
        let rules = [
            RuleConfig::new("age").with_action("service.extractAge(Patient)"),
            RuleConfig::new("mode").with_action("'rule'"),
        ];
        let params = HashMap::from([("mode".to_string(), "param".to_string())]);

        let data = executor().process_resource_data(&patient_data(), &rules, &params);

        assert_eq!(data.base_resource_id(), "p1");
        assert_eq!(data.base_resource_type(), "Patient");
        assert_eq!(data.computed_value("age"), Some(&Value::from("2w")));
        assert_eq!(data.computed_value("mode"), Some(&Value::from("param")));
        assert_eq!(data.computed_value("missing"), None);
    }

    #[test]
    fn test_rule_set_is_reusable() {
        let executor = executor();
        let rules = RuleSet::compile(&[RuleConfig::new("one").with_action("1")]);
        let first = executor.process_with_rule_set(&patient_data(), &rules, &HashMap::new());
        let second = executor.process_with_rule_set(&patient_data(), &rules, &HashMap::new());
        assert_eq!(first, second);
    }
}
