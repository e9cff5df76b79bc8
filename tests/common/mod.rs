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

//! Shared fixtures for integration tests

#![allow(dead_code)]

use octofhir_resource_rules::{
    EngineConfig, InMemoryResourceStore, Resource, ResourceGraphFetcher, ResourceStore,
};
use serde_json::{Value, json};
use std::sync::Arc;

/// A small household: one patient, two care plans, tasks under both plans,
/// observations and a group the patient belongs to
pub fn household() -> Value {
    json!({
        "resourceType": "Bundle",
        "type": "collection",
        "entry": [
            {"resource": {
                "resourceType": "Patient",
                "id": "p1",
                "gender": "female",
                "birthDate": "1990-03-15",
                "name": [{"family": "Okafor", "given": ["Ada"]}]
            }},
            {"resource": {
                "resourceType": "Group",
                "id": "g1",
                "name": "Household Okafor",
                "member": [{"entity": {"reference": "Patient/p1"}}]
            }},
            {"resource": {
                "resourceType": "CarePlan",
                "id": "cp1",
                "status": "active",
                "title": "ANC",
                "subject": {"reference": "Patient/p1"},
                "period": {"start": "2024-01-10"}
            }},
            {"resource": {
                "resourceType": "CarePlan",
                "id": "cp2",
                "status": "completed",
                "title": "Immunization",
                "subject": {"reference": "Patient/p1"},
                "period": {"start": "2023-06-01"}
            }},
            {"resource": task("t1", "cp1", "ready", "2024-01-12")},
            {"resource": task("t2", "cp1", "ready", "2024-02-12")},
            {"resource": task("t3", "cp1", "completed", "2024-03-12")},
            {"resource": task("t4", "cp2", "ready", "2023-06-10")},
            {"resource": task("t5", "cp2", "completed", "2023-07-10")},
            {"resource": task("t6", "cp2", "completed", "2023-08-10")},
            {"resource": task("t7", "cp2", "cancelled", "2023-09-10")}
        ]
    })
}

pub fn task(id: &str, care_plan: &str, status: &str, authored_on: &str) -> Value {
    json!({
        "resourceType": "Task",
        "id": id,
        "status": status,
        "authoredOn": authored_on,
        "basedOn": [{"reference": format!("CarePlan/{care_plan}")}],
        "for": {"reference": "Patient/p1"}
    })
}

pub fn observation(id: &str, code: &str) -> Value {
    json!({
        "resourceType": "Observation",
        "id": id,
        "status": "final",
        "code": {"coding": [{"code": code}]},
        "subject": {"reference": "Patient/p1"}
    })
}

pub fn store() -> Arc<InMemoryResourceStore> {
    Arc::new(InMemoryResourceStore::from_json(household()).unwrap())
}

pub fn fetcher(store: Arc<InMemoryResourceStore>) -> ResourceGraphFetcher {
    let config = EngineConfig::default();
    ResourceGraphFetcher::new(store, Arc::new(config.fhir_path_extractor()), &config)
}

pub async fn patient(store: &InMemoryResourceStore) -> Arc<Resource> {
    store.get("Patient", "p1").await.unwrap().unwrap()
}

pub fn ids(resources: &[Arc<Resource>]) -> Vec<String> {
    resources.iter().map(|resource| resource.logical_id()).collect()
}
