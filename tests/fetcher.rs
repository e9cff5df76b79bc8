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

//! Integration tests for resource graph fetching

mod common;

use common::{fetcher, ids, observation, patient, store, task};
use octofhir_resource_rules::{
    ComputedValues, DataType, FhirResourceConfig, RelatedResourceCount, ResourceConfig,
    ResourceStore, SortConfig, SortOrder, Value,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::collections::HashSet;

fn care_plans() -> ResourceConfig {
    ResourceConfig::new("CarePlan")
        .with_id("carePlans")
        .with_search_parameter("subject")
}

fn tasks() -> ResourceConfig {
    ResourceConfig::new("Task")
        .with_id("tasks")
        .with_search_parameter("based-on")
}

fn patient_config(related: ResourceConfig) -> FhirResourceConfig {
    FhirResourceConfig::new(ResourceConfig::new("Patient")).with_related(related)
}

#[tokio::test]
async fn test_end_to_end_care_plans() {
    let store = store();
    let data = fetcher(store.clone())
        .fetch_graph(
            patient(&store).await,
            &patient_config(care_plans()),
            &ComputedValues::new(),
        )
        .await
        .unwrap();

    assert_eq!(data.related("carePlans").len(), 2);
    assert!(data.related_resources_count_map.is_empty());
}

#[tokio::test]
async fn test_visited_keys_are_always_present() {
    let store = store();
    let config = FhirResourceConfig::new(ResourceConfig::new("Patient"))
        .with_related(care_plans().with_related(tasks()))
        .with_related(
            ResourceConfig::new("Observation")
                .with_id("vitals")
                .with_search_parameter("subject"),
        )
        .with_related(
            ResourceConfig::new("Encounter")
                .with_id("recentVisits")
                .with_search_parameter("subject")
                .with_filter("status = 'finished'"),
        );

    let data = fetcher(store.clone())
        .fetch_graph(patient(&store).await, &config, &ComputedValues::new())
        .await
        .unwrap();

    let keys: Vec<&str> = data.related_resources_map.keys().map(String::as_str).collect();
    assert_eq!(keys, ["carePlans", "vitals", "recentVisits", "tasks"]);
    assert!(data.related("vitals").is_empty());
    assert!(data.related("recentVisits").is_empty());
    assert_eq!(data.related("tasks").len(), 7);
}

#[tokio::test]
async fn test_fetch_is_idempotent() {
    let store = store();
    let fetcher = fetcher(store.clone());
    let config = patient_config(care_plans().with_related(tasks()));
    let root = patient(&store).await;

    let first = fetcher
        .fetch_graph(root.clone(), &config, &ComputedValues::new())
        .await
        .unwrap();
    let second = fetcher
        .fetch_graph(root, &config, &ComputedValues::new())
        .await
        .unwrap();

    for key in ["carePlans", "tasks"] {
        let a: HashSet<String> = ids(first.related(key)).into_iter().collect();
        let b: HashSet<String> = ids(second.related(key)).into_iter().collect();
        assert_eq!(a, b, "relation '{key}'");
        assert_eq!(first.related(key).len(), second.related(key).len());
    }
}

#[rstest]
#[case::summed(true, vec![RelatedResourceCount::new("Task", None, 7)])]
#[case::separate(false, vec![
    RelatedResourceCount::new("Task", Some("cp1".into()), 3),
    RelatedResourceCount::new("Task", Some("cp2".into()), 4),
])]
#[tokio::test]
async fn test_count_aggregation(#[case] sum_counts: bool, #[case] expected: Vec<RelatedResourceCount>) {
    let store = store();
    let config = patient_config(
        care_plans()
            .with_sort(SortConfig::new("title", DataType::String, SortOrder::Ascending))
            .with_related(tasks().counted(sum_counts)),
    );

    let data = fetcher(store.clone())
        .fetch_graph(patient(&store).await, &config, &ComputedValues::new())
        .await
        .unwrap();

    assert_eq!(data.counts("tasks"), expected.as_slice());
    assert!(!data.related_resources_map.contains_key("tasks"));
}

#[tokio::test]
async fn test_count_only_relation() {
    let store = store();
    for i in 0..5 {
        store
            .insert_json(observation(&format!("o{i}"), "8480-6"))
            .unwrap();
    }
    let config = patient_config(
        ResourceConfig::new("Observation")
            .with_id("observationCount")
            .with_search_parameter("subject")
            .counted(false),
    );

    let data = fetcher(store.clone())
        .fetch_graph(patient(&store).await, &config, &ComputedValues::new())
        .await
        .unwrap();

    assert_eq!(
        data.counts("observationCount"),
        [RelatedResourceCount::new("Observation", Some("p1".into()), 5)]
    );
    assert!(!data.related_resources_map.contains_key("observationCount"));
}

#[tokio::test]
async fn test_filter_sees_computed_values() {
    let store = store();
    let config = patient_config(care_plans().with_related(
        tasks()
            .with_filter("status = %wantedStatus")
            .with_sort(SortConfig::new("authoredOn", DataType::Date, SortOrder::Descending)),
    ));
    let constants = ComputedValues::from([("wantedStatus".to_string(), Value::from("ready"))]);

    let data = fetcher(store.clone())
        .fetch_graph(patient(&store).await, &config, &constants)
        .await
        .unwrap();

    // Sorted per parent, then appended in parent order
    assert_eq!(ids(data.related("tasks")), ["t2", "t1", "t4"]);
}

#[tokio::test]
async fn test_self_referencing_tasks_terminate() {
    let store = store();
    let mut parent = task("loop-a", "cp1", "ready", "2024-04-01");
    parent["partOf"] = serde_json::json!([{"reference": "Task/loop-b"}]);
    let mut child = task("loop-b", "cp1", "ready", "2024-04-02");
    child["partOf"] = serde_json::json!([{"reference": "Task/loop-a"}]);
    store.insert_json(parent).unwrap();
    store.insert_json(child).unwrap();

    let sub_tasks = ResourceConfig::new("Task")
        .with_id("subTasks")
        .with_search_parameter("part-of");
    let config = patient_config(care_plans().with_related(tasks().with_related(
        sub_tasks.clone().with_related(sub_tasks),
    )));

    let data = fetcher(store.clone())
        .fetch_graph(patient(&store).await, &config, &ComputedValues::new())
        .await
        .unwrap();

    let mut sub_task_ids = ids(data.related("subTasks"));
    sub_task_ids.sort();
    assert_eq!(sub_task_ids, ["loop-a", "loop-b"]);
}

#[tokio::test]
async fn test_forward_reference() {
    let store = store();
    let task = store.get("Task", "t4").await.unwrap().unwrap();
    let config = FhirResourceConfig::new(ResourceConfig::new("Task")).with_related(
        ResourceConfig::new("CarePlan")
            .with_id("plan")
            .with_reference_path("basedOn"),
    );

    let data = fetcher(store)
        .fetch_graph(task, &config, &ComputedValues::new())
        .await
        .unwrap();

    assert_eq!(ids(data.related("plan")), ["cp2"]);
}

#[tokio::test]
async fn test_failed_relation_degrades() {
    let store = store();
    store.fail_queries_for("Task");
    let config = patient_config(care_plans().with_related(tasks()));

    let data = fetcher(store.clone())
        .fetch_graph(patient(&store).await, &config, &ComputedValues::new())
        .await
        .unwrap();

    assert_eq!(data.related("carePlans").len(), 2);
    assert!(data.related("tasks").is_empty());
    assert!(data.related_resources_map.contains_key("tasks"));
}

#[tokio::test]
async fn test_unavailable_store_aborts() {
    let store = store();
    let root = patient(&store).await;
    store.set_unavailable(true);

    let error = fetcher(store)
        .fetch_graph(root, &patient_config(care_plans()), &ComputedValues::new())
        .await
        .unwrap_err();

    assert!(error.is_retryable());
}
