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

//! Integration tests for rule firing through the executor

use chrono::NaiveDate;
use octofhir_resource_rules::{
    EngineConfig, RelatedResourceCount, RepositoryResourceData, Resource,
    ResourceDataRulesExecutor, RuleConfig, RuleSet, Value,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

fn executor() -> ResourceDataRulesExecutor {
    let config = EngineConfig::builder()
        .with_today(NaiveDate::from_ymd_opt(2024, 6, 15).unwrap())
        .build();
    ResourceDataRulesExecutor::from_config(&config)
}

fn resource(json: serde_json::Value) -> Arc<Resource> {
    Arc::new(Resource::from_json(json).unwrap())
}

fn patient_data() -> RepositoryResourceData {
    let mut data = RepositoryResourceData::new(resource(json!({
        "resourceType": "Patient",
        "id": "p1",
        "gender": "female",
        "birthDate": "1990-03-15",
        "name": [{"family": "Okafor", "given": ["Ada", "N."]}]
    })));
    data.related_resources_map.insert(
        "carePlans".into(),
        vec![
            resource(json!({"resourceType": "CarePlan", "id": "cp1", "status": "active",
                "title": "ANC", "period": {"start": "2024-01-10"}})),
            resource(json!({"resourceType": "CarePlan", "id": "cp2", "status": "completed",
                "title": "Immunization", "period": {"start": "2023-06-01"}})),
        ],
    );
    data.related_resources_count_map.insert(
        "openTasks".into(),
        vec![RelatedResourceCount::new("Task", None, 4)],
    );
    data
}

fn fire(rules: &[RuleConfig]) -> HashMap<String, Value> {
    executor()
        .process_resource_data(&patient_data(), rules, &HashMap::new())
        .computed_values()
        .clone()
        .into_iter()
        .collect()
}

#[test]
fn test_sequential_rule_visibility() {
    let computed = fire(&[
        RuleConfig::new("y").with_action("x * 2").with_priority(2),
        RuleConfig::new("x").with_action("5").with_priority(1),
    ]);

    assert_eq!(computed.get("x"), Some(&Value::from(5i64)));
    assert_eq!(computed.get("y"), Some(&Value::from(10i64)));
}

#[test]
fn test_missing_binding_is_tolerated() {
    let computed = fire(&[
        RuleConfig::new("vitalCount").with_action("vitals.size()"),
        RuleConfig::new("carePlanCount").with_action("carePlans.size()"),
        RuleConfig::new("hasVisits").with_condition("visits.size() > 0").with_action("true"),
        RuleConfig::new("gender").with_action("service.extractGender(Patient)"),
    ]);

    assert!(!computed.contains_key("vitalCount"));
    assert!(!computed.contains_key("hasVisits"));
    assert_eq!(computed.get("carePlanCount"), Some(&Value::from(2i64)));
    assert_eq!(computed.get("gender"), Some(&Value::from("Female")));
}

#[test]
fn test_failing_rule_keeps_earlier_effects() {
    let computed = fire(&[
        RuleConfig::new("partial")
            .with_action("first = 'kept'")
            .with_action("1 / 0")
            .with_action("second = 'never'"),
        RuleConfig::new("after").with_action("first + '!'"),
    ]);

    assert_eq!(computed.get("first"), Some(&Value::from("kept")));
    assert!(!computed.contains_key("second"));
    assert!(!computed.contains_key("partial"));
    assert_eq!(computed.get("after"), Some(&Value::from("kept!")));
}

#[test]
fn test_false_condition_writes_nothing() {
    let computed = fire(&[
        RuleConfig::new("adult")
            .with_condition("service.extractAge(Patient) == '34y'")
            .with_action("'yes'"),
        RuleConfig::new("minor")
            .with_condition("Patient.gender == 'male'")
            .with_action("'yes'"),
    ]);

    assert_eq!(computed.get("adult"), Some(&Value::from("yes")));
    assert!(!computed.contains_key("minor"));
}

#[test]
fn test_later_duplicate_wins() {
    let computed = fire(&[
        RuleConfig::new("label").with_action("'first'"),
        RuleConfig::new("label").with_action("'second'"),
    ]);
    assert_eq!(computed.get("label"), Some(&Value::from("second")));
}

#[rstest]
#[case::string_utils("StringUtils.capitalize(Patient.name[0].family.toLowerCase())", Value::from("Okafor"))]
#[case::join("StringUtils.join(Patient.name[0].given, ' ')", Value::from("Ada N."))]
#[case::math("Math.max(openTasks[0].count, 3)", Value::from(4i64))]
#[case::ternary("carePlans.size() > 1 ? 'many' : 'one'", Value::from("many"))]
#[case::fhir_path(
    "fhirPath.extractValue(carePlans[0], 'CarePlan.period.start')",
    Value::from("2024-01-10")
)]
#[case::fhir_path_boolean(
    "service.evaluateToBoolean(carePlans, \"status = 'active'\", false)",
    Value::from(true)
)]
#[case::labeled_csv(
    "service.mapResourcesToLabeledCSV(carePlans, \"status = 'active'\", 'ANC')",
    Value::from("ANC")
)]
#[case::days("dates.daysBetween(carePlans[0].period.start, dates.today())", Value::from(157i64))]
#[case::prettify("dates.prettifyDate('2024-06-12')", Value::from("3 days ago"))]
#[case::age("service.extractAge(Patient)", Value::from("34y"))]
fn test_action_values(#[case] action: &str, #[case] expected: Value) {
    let computed = fire(&[RuleConfig::new("value").with_action(action)]);
    assert_eq!(computed.get("value"), Some(&expected), "action: {action}");
}

#[test]
fn test_data_namespace_writes() {
    let computed = fire(&[
        RuleConfig::new("setup")
            .with_action("data.put('status', Patient.gender.toUpperCase())")
            .with_action("data.containsKey('status') ? 'set' : 'unset'"),
        RuleConfig::new("echo").with_action("data.get('status')"),
    ]);

    assert_eq!(computed.get("status"), Some(&Value::from("FEMALE")));
    assert_eq!(computed.get("setup"), Some(&Value::from("set")));
    assert_eq!(computed.get("echo"), Some(&Value::from("FEMALE")));
}

#[test]
fn test_compiled_rules_shared_across_threads() {
    let executor = executor();
    let rules = RuleSet::compile(&[
        RuleConfig::new("x").with_action("index + '-' + Patient.id"),
        RuleConfig::new("y").with_action("x + '!'"),
    ]);

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let executor = &executor;
                let rules = &rules;
                scope.spawn(move || {
                    let params = HashMap::from([("index".to_string(), i.to_string())]);
                    let data = executor.process_with_rule_set(&patient_data(), rules, &params);
                    (i, data)
                })
            })
            .collect();

        for handle in handles {
            let (i, data) = handle.join().unwrap();
            assert_eq!(data.computed_value("y"), Some(&Value::from(format!("{i}-p1!"))));
            assert_eq!(data.computed_value("index"), Some(&Value::from(i.to_string())));
        }
    });
}
