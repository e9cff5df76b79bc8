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

// Read-only store over resources that were already fetched

use super::{ResourceStore, SearchQuery, StoreResult};
use crate::model::{RelatedResourcesMap, Resource};
use async_trait::async_trait;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Serves queries from a fetched relation map instead of the real store
///
/// Resources are indexed by type, whatever relation key they were fetched
/// under, so list items can resolve their own relations without another
/// round trip.
#[derive(Debug, Clone, Default)]
pub struct RelatedResourcesSnapshot {
    by_type: FxHashMap<String, IndexMap<String, Arc<Resource>>>,
}

impl RelatedResourcesSnapshot {
    /// Index the resources of a relation map
    pub fn new(related: &RelatedResourcesMap) -> Self {
        let mut snapshot = Self::default();
        for resources in related.values() {
            for resource in resources {
                snapshot.add(Arc::clone(resource));
            }
        }
        snapshot
    }

    /// Add one resource; a resource already present is kept
    pub fn add(&mut self, resource: Arc<Resource>) {
        self.by_type
            .entry(resource.resource_type().to_string())
            .or_default()
            .entry(resource.logical_id())
            .or_insert(resource);
    }

    /// Number of distinct resources
    pub fn len(&self) -> usize {
        self.by_type.values().map(IndexMap::len).sum()
    }

    /// Check if the snapshot holds no resources
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    fn matching(&self, query: &SearchQuery) -> Vec<Arc<Resource>> {
        self.by_type
            .get(&query.resource_type)
            .map(|by_id| {
                by_id
                    .values()
                    .filter(|resource| query.matches(resource))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl ResourceStore for RelatedResourcesSnapshot {
    async fn search(&self, query: &SearchQuery) -> StoreResult<Vec<Arc<Resource>>> {
        Ok(self.matching(query))
    }

    async fn count(&self, query: &SearchQuery) -> StoreResult<u64> {
        Ok(self.matching(query).len() as u64)
    }

    async fn get(&self, resource_type: &str, id: &str) -> StoreResult<Option<Arc<Resource>>> {
        Ok(self
            .by_type
            .get(resource_type)
            .and_then(|by_id| by_id.get(id))
            .cloned())
    }
}
