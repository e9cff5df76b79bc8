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

//! In-memory resource store

use super::{ResourceStore, SearchFilter, SearchQuery, StoreError, StoreResult};
use crate::error::EngineError;
use crate::model::Resource;
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Thread-safe store indexed by type and logical id
///
/// Search results keep insertion order. Faults can be injected to exercise
/// the error handling of callers: failing queries for one type, a store that
/// is unavailable as a whole, or latency on every call.
#[derive(Debug, Default)]
pub struct InMemoryResourceStore {
    resources: RwLock<FxHashMap<String, IndexMap<String, Arc<Resource>>>>,
    failing_types: RwLock<FxHashSet<String>>,
    unavailable: AtomicBool,
    latency: RwLock<Option<Duration>>,
}

impl InMemoryResourceStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given resources
    pub fn with_resources(resources: impl IntoIterator<Item = Resource>) -> Self {
        let store = Self::new();
        for resource in resources {
            store.insert(resource);
        }
        store
    }

    /// Load resources from JSON; a `Bundle` contributes its entries
    pub fn from_json(json: serde_json::Value) -> Result<Self, EngineError> {
        let store = Self::new();
        store.insert_json(json)?;
        Ok(store)
    }

    /// Insert JSON resources; arrays and bundles are flattened
    pub fn insert_json(&self, json: serde_json::Value) -> Result<usize, EngineError> {
        match json {
            serde_json::Value::Array(items) => {
                let mut inserted = 0;
                for item in items {
                    inserted += self.insert_json(item)?;
                }
                Ok(inserted)
            }
            serde_json::Value::Object(ref obj)
                if obj.get("resourceType").and_then(|rt| rt.as_str()) == Some("Bundle") =>
            {
                let entries = obj
                    .get("entry")
                    .and_then(|entry| entry.as_array())
                    .cloned()
                    .unwrap_or_default();
                let mut inserted = 0;
                for entry in entries {
                    if let Some(resource) = entry.get("resource") {
                        inserted += self.insert_json(resource.clone())?;
                    }
                }
                Ok(inserted)
            }
            other => {
                self.insert(Resource::from_json(other)?);
                Ok(1)
            }
        }
    }

    /// Insert or replace a resource
    pub fn insert(&self, resource: Resource) -> Arc<Resource> {
        let resource = Arc::new(resource);
        self.resources
            .write()
            .entry(resource.resource_type().to_string())
            .or_default()
            .insert(resource.logical_id(), Arc::clone(&resource));
        resource
    }

    /// Number of stored resources
    pub fn len(&self) -> usize {
        self.resources.read().values().map(IndexMap::len).sum()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every query for `resource_type` fail
    pub fn fail_queries_for(&self, resource_type: impl Into<String>) {
        self.failing_types.write().insert(resource_type.into());
    }

    /// Take the whole store offline or back online
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write() = latency;
    }

    async fn check(&self, resource_type: &str) -> StoreResult<()> {
        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                message: "store is closed".to_string(),
            });
        }
        if self.failing_types.read().contains(resource_type) {
            return Err(StoreError::query_failed(resource_type, "injected failure"));
        }
        Ok(())
    }

    fn matching(&self, query: &SearchQuery) -> Vec<Arc<Resource>> {
        let resources = self.resources.read();
        let Some(by_id) = resources.get(&query.resource_type) else {
            return Vec::new();
        };
        match &query.filter {
            SearchFilter::Ids(ids) => ids
                .iter()
                .filter_map(|id| by_id.get(id))
                .cloned()
                .collect(),
            _ => by_id
                .values()
                .filter(|resource| query.matches(resource))
                .cloned()
                .collect(),
        }
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn search(&self, query: &SearchQuery) -> StoreResult<Vec<Arc<Resource>>> {
        self.check(&query.resource_type).await?;
        Ok(self.matching(query))
    }

    async fn count(&self, query: &SearchQuery) -> StoreResult<u64> {
        self.check(&query.resource_type).await?;
        Ok(self.matching(query).len() as u64)
    }

    async fn get(&self, resource_type: &str, id: &str) -> StoreResult<Option<Arc<Resource>>> {
        self.check(resource_type).await?;
        Ok(self
            .resources
            .read()
            .get(resource_type)
            .and_then(|by_id| by_id.get(id))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> InMemoryResourceStore {
        InMemoryResourceStore::from_json(json!({
            "resourceType": "Bundle",
            "entry": [
                {"resource": {"resourceType": "Patient", "id": "p1"}},
                {"resource": {"resourceType": "CarePlan", "id": "c1", "subject": {"reference": "Patient/p1"}}},
                {"resource": {"resourceType": "CarePlan", "id": "c2", "subject": {"reference": "Patient/p2"}}}
            ]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_search_and_get() {
        let store = store();
        assert_eq!(store.len(), 3);

        let plans = store
            .search(&SearchQuery::referenced_by("CarePlan", "subject", "Patient/p1"))
            .await
            .unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].logical_id(), "c1");

        assert_eq!(store.count(&SearchQuery::all("CarePlan")).await.unwrap(), 2);
        assert!(store.get("Patient", "p1").await.unwrap().is_some());
        assert!(store.get("Patient", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let store = store();
        store.fail_queries_for("CarePlan");
        let err = store.search(&SearchQuery::all("CarePlan")).await.unwrap_err();
        assert!(!err.is_fatal());
        assert!(store.search(&SearchQuery::all("Patient")).await.is_ok());

        store.set_unavailable(true);
        let err = store.get("Patient", "p1").await.unwrap_err();
        assert!(err.is_fatal());
    }
}
