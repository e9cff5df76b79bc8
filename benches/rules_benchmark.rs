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

//! Register page benchmarks
//!
//! Synthetic patients with care plans and tasks, evaluated as one register
//! page at different page sizes, plus rule firing alone over a fetched row.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use octofhir_resource_rules::{
    EngineConfig, FhirResourceConfig, InMemoryResourceStore, ResourceConfig, ResourceDataLoader,
    ResourceDataRulesExecutor, ResourceStore, RuleConfig, RuleSet, SearchQuery,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::hint::black_box;
use std::sync::Arc;

fn generate_store(patients: usize) -> Value {
    let mut resources = Vec::new();
    for i in 0..patients {
        resources.push(json!({
            "resourceType": "Patient",
            "id": format!("p{i}"),
            "gender": if i % 2 == 0 { "female" } else { "male" },
            "birthDate": format!("19{:02}-0{}-15", 50 + i % 50, 1 + i % 9),
            "name": [{"family": format!("Family{i}"), "given": [format!("Given{i}")]}]
        }));
        for c in 0..3 {
            resources.push(json!({
                "resourceType": "CarePlan",
                "id": format!("c{i}-{c}"),
                "status": if c == 0 { "completed" } else { "active" },
                "subject": {"reference": format!("Patient/p{i}")}
            }));
            for t in 0..4 {
                resources.push(json!({
                    "resourceType": "Task",
                    "id": format!("t{i}-{c}-{t}"),
                    "status": if t % 2 == 0 { "ready" } else { "completed" },
                    "basedOn": [{"reference": format!("CarePlan/c{i}-{c}")}]
                }));
            }
        }
    }
    json!(resources)
}

fn register_config() -> FhirResourceConfig {
    FhirResourceConfig::new(ResourceConfig::new("Patient")).with_related(
        ResourceConfig::new("CarePlan")
            .with_id("carePlans")
            .with_search_parameter("subject")
            .with_filter("status = 'active'")
            .with_related(
                ResourceConfig::new("Task")
                    .with_id("tasks")
                    .with_search_parameter("based-on"),
            ),
    )
}

fn register_rules() -> RuleSet {
    RuleSet::compile(&[
        RuleConfig::new("name")
            .with_action("fhirPath.extractValue(Patient, 'Patient.name.given.first()')"),
        RuleConfig::new("age").with_action("service.extractAge(Patient)"),
        RuleConfig::new("gender").with_action("service.extractGender(Patient)"),
        RuleConfig::new("activePlans").with_action("size(carePlans)"),
        RuleConfig::new("openTasks")
            .with_action("size(service.filterResources(tasks, \"status = 'ready'\"))"),
        RuleConfig::new("summary")
            .with_condition("activePlans > 0")
            .with_action("name + ' (' + age + ', ' + openTasks + ' open)'")
            .with_priority(2),
    ])
}

fn bench_load_page(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("load_page");

    for patients in [10usize, 50, 200] {
        let store = Arc::new(InMemoryResourceStore::from_json(generate_store(patients)).unwrap());
        let roots = runtime
            .block_on(store.search(&SearchQuery::all("Patient")))
            .unwrap();
        let loader = ResourceDataLoader::new(store, EngineConfig::default());
        let config = register_config();
        let rules = register_rules();
        let params = HashMap::new();

        group.bench_with_input(BenchmarkId::from_parameter(patients), &roots, |b, roots| {
            b.to_async(&runtime).iter(|| async {
                let page = loader
                    .load_page(roots.clone(), &config, &rules, &params)
                    .await
                    .unwrap();
                black_box(page)
            });
        });
    }

    group.finish();
}

fn bench_fire_rules(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let store = Arc::new(InMemoryResourceStore::from_json(generate_store(1)).unwrap());
    let loader = ResourceDataLoader::new(store.clone(), EngineConfig::default());
    let data = runtime.block_on(async {
        let root = store.get("Patient", "p0").await.unwrap().unwrap();
        loader
            .fetcher()
            .fetch_graph(root, &register_config(), &Default::default())
            .await
            .unwrap()
    });
    let executor = ResourceDataRulesExecutor::from_config(&EngineConfig::default());
    let rules = register_rules();
    let params = HashMap::new();

    c.bench_function("fire_register_rules", |b| {
        b.iter(|| black_box(executor.process_with_rule_set(black_box(&data), &rules, &params)))
    });
}

criterion_group!(benches, bench_load_page, bench_fire_rules);
criterion_main!(benches);
