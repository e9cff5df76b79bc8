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

//! Resource graph fetching
//!
//! [`ResourceGraphFetcher`] walks a [`FhirResourceConfig`] tree breadth first
//! with an explicit queue, querying the store once per (parent, relation)
//! pair. Results of every relation are flattened under its relation key, no
//! matter which parent or depth produced them.
//!
//! A relation whose query fails is logged and left empty; only a store that
//! is unavailable or times out aborts the fetch.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::fhirpath::FhirPathExtractor;
use crate::model::{
    ComputedValues, FhirResourceConfig, RelatedResourceCount, RelatedResourcesMap,
    RepositoryResourceData, Resource, ResourceConfig, Value, split_reference,
};
use crate::store::{ResourceStore, SearchQuery, StoreError, StoreResult};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Fetches the graph of resources configured around a root resource
#[derive(Clone)]
pub struct ResourceGraphFetcher {
    store: Arc<dyn ResourceStore>,
    fhir_path: Arc<FhirPathExtractor>,
    query_timeout: Duration,
}

impl std::fmt::Debug for ResourceGraphFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceGraphFetcher")
            .field("query_timeout", &self.query_timeout)
            .finish_non_exhaustive()
    }
}

impl ResourceGraphFetcher {
    /// Create a fetcher over a store
    pub fn new(
        store: Arc<dyn ResourceStore>,
        fhir_path: Arc<FhirPathExtractor>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            fhir_path,
            query_timeout: config.query_timeout,
        }
    }

    /// The store queried by this fetcher
    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    /// Load a resource by type and id
    pub async fn get_resource(&self, resource_type: &str, id: &str) -> Result<Option<Arc<Resource>>> {
        Ok(self.timed(self.store.get(resource_type, id)).await?)
    }

    /// Fetch the relations configured for `root`
    ///
    /// `constants` are the computed values visible to conditional filters as
    /// `%name`.
    pub async fn fetch_graph(
        &self,
        root: Arc<Resource>,
        config: &FhirResourceConfig,
        constants: &ComputedValues,
    ) -> Result<RepositoryResourceData> {
        self.fetch_related(root, &config.related_resources, constants)
            .await
    }

    /// Fetch the given relations of `root` and their nested relations
    pub async fn fetch_related(
        &self,
        root: Arc<Resource>,
        relations: &[ResourceConfig],
        constants: &ComputedValues,
    ) -> Result<RepositoryResourceData> {
        let mut data = RepositoryResourceData::new(Arc::clone(&root));
        let mut visited: FxHashMap<String, FxHashSet<String>> = FxHashMap::default();
        let mut queue: VecDeque<(Arc<Resource>, &[ResourceConfig])> = VecDeque::new();
        queue.push_back((root, relations));

        while let Some((parent, relations)) = queue.pop_front() {
            for relation in relations {
                let key = relation.relation_key().to_string();

                if relation.result_as_count {
                    let count = self.count_related(&parent, relation, constants).await?;
                    record_count(&mut data, &key, relation, &parent, count);
                    continue;
                }

                let candidates = self.resolve_related(&parent, relation, constants).await?;
                let seen = visited.entry(key.clone()).or_default();
                let related = data.related_resources_map.entry(key).or_default();
                for candidate in candidates {
                    if !seen.insert(candidate.logical_id()) {
                        continue;
                    }
                    related.push(Arc::clone(&candidate));
                    if !relation.related_resources.is_empty() {
                        queue.push_back((candidate, relation.related_resources.as_slice()));
                    }
                }
            }
        }

        Ok(data)
    }

    /// Fetch the relations of a list item
    ///
    /// Relations naming a `related_resource_id` pick their candidates from
    /// that key of `parent_related`; the rest go through the store. Nested
    /// relations of scoped candidates are fetched from the store too.
    pub async fn fetch_list_item(
        &self,
        item: Arc<Resource>,
        relations: &[ResourceConfig],
        parent_related: &RelatedResourcesMap,
        constants: &ComputedValues,
    ) -> Result<RepositoryResourceData> {
        let (scoped, unscoped): (Vec<ResourceConfig>, Vec<ResourceConfig>) = relations
            .iter()
            .cloned()
            .partition(|relation| relation.related_resource_id.is_some());
        let mut data = self
            .fetch_related(Arc::clone(&item), &unscoped, constants)
            .await?;

        for relation in &scoped {
            let key = relation.relation_key().to_string();
            let candidates = self.scoped_candidates(&item, relation, parent_related);

            if relation.result_as_count {
                let count = self.apply_filter(relation, candidates, constants).len() as u64;
                record_count(&mut data, &key, relation, &item, count);
                continue;
            }

            let candidates = self.refine(relation, candidates, constants);
            if !relation.related_resources.is_empty() {
                for candidate in &candidates {
                    let nested = self
                        .fetch_related(Arc::clone(candidate), &relation.related_resources, constants)
                        .await?;
                    merge_related(&mut data, nested);
                }
            }
            let related = data.related_resources_map.entry(key).or_default();
            for candidate in candidates {
                let id = candidate.logical_id();
                if !related.iter().any(|existing| existing.logical_id() == id) {
                    related.push(candidate);
                }
            }
        }

        Ok(data)
    }

    /// Resources under the relation's parent key that point at `item`
    ///
    /// A reference path is read on each candidate; without one the search
    /// parameter is matched the way a store would.
    fn scoped_candidates(
        &self,
        item: &Arc<Resource>,
        relation: &ResourceConfig,
        parent_related: &RelatedResourcesMap,
    ) -> Vec<Arc<Resource>> {
        let scope = relation
            .related_resource_id
            .as_deref()
            .unwrap_or(relation.resource_type.as_str());
        let Some(resources) = parent_related.get(scope) else {
            log::warn!(
                "Relation '{}' reads unknown relation key '{scope}'",
                relation.relation_key()
            );
            return Vec::new();
        };
        let of_type = resources
            .iter()
            .filter(|resource| resource.resource_type() == relation.resource_type);

        if relation.is_reverse_include() {
            let Some(search_parameter) = relation.search_parameter.as_deref() else {
                log::warn!(
                    "Relation '{}' has neither a search parameter nor a reference path",
                    relation.relation_key()
                );
                return Vec::new();
            };
            let query =
                SearchQuery::referenced_by(&relation.resource_type, search_parameter, item.reference());
            return of_type.filter(|candidate| query.matches(candidate)).cloned().collect();
        }

        let expression = relation.fhir_path_expression.as_deref().unwrap_or_default();
        let item_id = item.logical_id();
        of_type
            .filter(|candidate| {
                match self
                    .fhir_path
                    .extract_data(&Value::Resource(Arc::clone(candidate)), expression)
                {
                    Ok(values) => referenced_ids(&values, item.resource_type()).contains(&item_id),
                    Err(error) => {
                        log::warn!(
                            "Reference path '{expression}' of relation '{}' failed: {error}",
                            relation.relation_key()
                        );
                        false
                    }
                }
            })
            .cloned()
            .collect()
    }

    /// Filtered and sorted candidates of one relation for one parent
    async fn resolve_related(
        &self,
        parent: &Arc<Resource>,
        relation: &ResourceConfig,
        constants: &ComputedValues,
    ) -> Result<Vec<Arc<Resource>>> {
        let Some(query) = self.build_query(parent, relation) else {
            return Ok(Vec::new());
        };
        let candidates = match self.timed(self.store.search(&query)).await {
            Ok(candidates) => candidates,
            Err(error) => return self.degrade(relation, error),
        };
        Ok(self.refine(relation, candidates, constants))
    }

    /// Every resource of the base type of `config`, filtered and sorted by
    /// its own settings
    ///
    /// Used for secondary graphs, whose roots are not known by id.
    pub async fn search_roots(
        &self,
        config: &ResourceConfig,
        constants: &ComputedValues,
    ) -> Result<Vec<Arc<Resource>>> {
        let query = SearchQuery::all(&config.resource_type);
        let candidates = match self.timed(self.store.search(&query)).await {
            Ok(candidates) => candidates,
            Err(error) => return self.degrade(config, error),
        };
        Ok(self.refine(config, candidates, constants))
    }

    /// Apply the filter and the sort of a relation
    fn refine(
        &self,
        relation: &ResourceConfig,
        candidates: Vec<Arc<Resource>>,
        constants: &ComputedValues,
    ) -> Vec<Arc<Resource>> {
        let mut candidates = self.apply_filter(relation, candidates, constants);
        if let Some(sort) = &relation.sort_config {
            if let Err(error) = self.fhir_path.sort_resources(&mut candidates, sort) {
                log::warn!(
                    "Sorting relation '{}' by '{}' failed, keeping store order: {error}",
                    relation.relation_key(),
                    sort.fhir_path_expression
                );
            }
        }
        candidates
    }

    async fn count_related(
        &self,
        parent: &Arc<Resource>,
        relation: &ResourceConfig,
        constants: &ComputedValues,
    ) -> Result<u64> {
        let Some(query) = self.build_query(parent, relation) else {
            return Ok(0);
        };
        if relation.conditional_fhir_path_expression.is_none() {
            return match self.timed(self.store.count(&query)).await {
                Ok(count) => Ok(count),
                Err(error) => self.degrade(relation, error).map(|_: Vec<()>| 0),
            };
        }
        // A filtered count needs the resources themselves
        let candidates = match self.timed(self.store.search(&query)).await {
            Ok(candidates) => candidates,
            Err(error) => return self.degrade(relation, error).map(|_: Vec<()>| 0),
        };
        Ok(self.apply_filter(relation, candidates, constants).len() as u64)
    }

    /// Query selecting the candidates of `relation` for `parent`
    ///
    /// `None` when there is nothing to query: no search parameter for a
    /// reverse include, or no references on the parent.
    fn build_query(&self, parent: &Arc<Resource>, relation: &ResourceConfig) -> Option<SearchQuery> {
        if relation.is_reverse_include() {
            let Some(search_parameter) = relation.search_parameter.as_deref() else {
                log::warn!(
                    "Relation '{}' has neither a search parameter nor a reference path",
                    relation.relation_key()
                );
                return None;
            };
            return Some(SearchQuery::referenced_by(
                &relation.resource_type,
                search_parameter,
                parent.reference(),
            ));
        }

        let expression = relation.fhir_path_expression.as_deref().unwrap_or_default();
        let values = match self
            .fhir_path
            .extract_data(&Value::Resource(Arc::clone(parent)), expression)
        {
            Ok(values) => values,
            Err(error) => {
                log::warn!(
                    "Reference path '{expression}' of relation '{}' failed: {error}",
                    relation.relation_key()
                );
                return None;
            }
        };
        let ids = referenced_ids(&values, &relation.resource_type);
        if ids.is_empty() {
            return None;
        }
        Some(SearchQuery::by_ids(&relation.resource_type, ids))
    }

    fn apply_filter(
        &self,
        relation: &ResourceConfig,
        candidates: Vec<Arc<Resource>>,
        constants: &ComputedValues,
    ) -> Vec<Arc<Resource>> {
        let Some(expression) = relation.conditional_fhir_path_expression.as_deref() else {
            return candidates;
        };
        match self
            .fhir_path
            .filter_resources(candidates, expression, constants)
        {
            Ok(kept) => kept,
            Err(error) => {
                log::warn!(
                    "Filter '{expression}' of relation '{}' failed, relation left empty: {error}",
                    relation.relation_key()
                );
                Vec::new()
            }
        }
    }

    /// Empty result for a failed relation query, or the error if it is fatal
    fn degrade<T>(&self, relation: &ResourceConfig, error: StoreError) -> Result<Vec<T>> {
        if error.is_fatal() {
            return Err(error.into());
        }
        log::warn!(
            "Fetching relation '{}' failed, continuing with an empty list: {error}",
            relation.relation_key()
        );
        Ok(Vec::new())
    }

    /// Apply the query timeout to a store call
    async fn timed<T>(&self, call: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
        tokio::time::timeout(self.query_timeout, call)
            .await
            .unwrap_or(Err(StoreError::Timeout {
                after: self.query_timeout,
            }))
    }
}

fn record_count(
    data: &mut RepositoryResourceData,
    key: &str,
    relation: &ResourceConfig,
    parent: &Resource,
    count: u64,
) {
    let entries = data
        .related_resources_count_map
        .entry(key.to_string())
        .or_default();
    if relation.sum_counts {
        match entries.first_mut() {
            Some(total) => total.count += count,
            None => entries.push(RelatedResourceCount::new(&relation.resource_type, None, count)),
        }
    } else {
        entries.push(RelatedResourceCount::new(
            &relation.resource_type,
            Some(parent.logical_id()),
            count,
        ));
    }
}

/// Append the relations of `nested`, skipping resources already present
fn merge_related(data: &mut RepositoryResourceData, nested: RepositoryResourceData) {
    for (key, resources) in nested.related_resources_map {
        let related = data.related_resources_map.entry(key).or_default();
        for resource in resources {
            let id = resource.logical_id();
            if !related.iter().any(|existing| existing.logical_id() == id) {
                related.push(resource);
            }
        }
    }
    for (key, counts) in nested.related_resources_count_map {
        data.related_resources_count_map
            .entry(key)
            .or_default()
            .extend(counts);
    }
}

/// Logical ids of the references of `resource_type` among extracted values
///
/// Values may be references (`{"reference": "Group/g1"}`), reference strings
/// or bare ids.
fn referenced_ids(values: &[Value], resource_type: &str) -> Vec<String> {
    let mut ids = Vec::new();
    for value in values {
        let reference = match value {
            Value::String(reference) => reference.as_str(),
            Value::Element(json) => match json.get("reference").and_then(|r| r.as_str()) {
                Some(reference) => reference,
                None => continue,
            },
            Value::Resource(resource) if resource.resource_type() == resource_type => {
                ids.push(resource.logical_id());
                continue;
            }
            _ => continue,
        };
        let id = match split_reference(reference) {
            Some((target_type, id)) if target_type == resource_type => id,
            Some(_) => continue,
            None if !reference.is_empty() => reference.to_string(),
            None => continue,
        };
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}
