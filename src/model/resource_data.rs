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

//! Fetched resource graphs and evaluated resource data

use super::resource::Resource;
use super::value::{ComputedValues, Value};
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;

/// Relation key -> resources, flattened across parents and depths
pub type RelatedResourcesMap = IndexMap<String, Vec<Arc<Resource>>>;

/// Relation key -> count entries of a count-only relation
pub type RelatedResourcesCountMap = IndexMap<String, Vec<RelatedResourceCount>>;

/// Cardinality reported by a count-only relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedResourceCount {
    /// Type of the counted resources
    pub resource_type: String,
    /// Parent the count belongs to; `None` for a summed entry
    pub parent_resource_id: Option<String>,
    /// Number of matches
    pub count: u64,
}

impl RelatedResourceCount {
    /// Create a count entry
    pub fn new(
        resource_type: impl Into<String>,
        parent_resource_id: Option<String>,
        count: u64,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            parent_resource_id,
            count,
        }
    }

    /// Element view used when the entry is bound as a fact
    pub fn to_value(&self) -> Value {
        Value::Element(serde_json::json!({
            "resourceType": self.resource_type,
            "parentResourceId": self.parent_resource_id,
            "count": self.count,
        }))
    }
}

/// A root resource and the graph fetched around it
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryResourceData {
    /// The root resource
    pub resource: Arc<Resource>,
    /// Related resources per relation key
    pub related_resources_map: RelatedResourcesMap,
    /// Counts per count-only relation key
    pub related_resources_count_map: RelatedResourcesCountMap,
    /// Independent graphs loaded alongside the root
    pub secondary_repository_resource_data: Vec<RepositoryResourceData>,
}

impl RepositoryResourceData {
    /// Create data for a root without relations
    pub fn new(resource: Arc<Resource>) -> Self {
        Self {
            resource,
            related_resources_map: RelatedResourcesMap::new(),
            related_resources_count_map: RelatedResourcesCountMap::new(),
            secondary_repository_resource_data: Vec::new(),
        }
    }

    /// Related resources under a key; empty when the key is absent
    pub fn related(&self, key: &str) -> &[Arc<Resource>] {
        self.related_resources_map
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Count entries under a key; empty when the key is absent
    pub fn counts(&self, key: &str) -> &[RelatedResourceCount] {
        self.related_resources_count_map
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Relations with the secondary data merged in
    ///
    /// Each secondary root is appended under its resource type, and the
    /// relations of secondary data are appended under their keys.
    pub fn merged_related(&self) -> RelatedResourcesMap {
        let mut related = self.related_resources_map.clone();
        for secondary in &self.secondary_repository_resource_data {
            related
                .entry(secondary.resource.resource_type().to_string())
                .or_default()
                .push(Arc::clone(&secondary.resource));
            for (key, resources) in &secondary.related_resources_map {
                related
                    .entry(key.clone())
                    .or_default()
                    .extend(resources.iter().cloned());
            }
        }
        related
    }

    /// Count entries with the counts of secondary data appended
    pub fn merged_counts(&self) -> RelatedResourcesCountMap {
        let mut counts = self.related_resources_count_map.clone();
        for secondary in &self.secondary_repository_resource_data {
            for (key, entries) in &secondary.related_resources_count_map {
                counts
                    .entry(key.clone())
                    .or_default()
                    .extend(entries.iter().cloned());
            }
        }
        counts
    }
}

/// Evaluated data for one root resource
///
/// Created fresh per row, page or list item and never changed once handed
/// out; the fields are only readable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceData {
    base_resource_id: String,
    base_resource_type: String,
    #[serde(rename = "computedValuesMap")]
    computed_values: ComputedValues,
    #[serde(rename = "listResourceDataMap", skip_serializing_if = "IndexMap::is_empty")]
    list_resource_data: IndexMap<String, Vec<ResourceData>>,
}

impl ResourceData {
    pub(crate) fn new(
        base_resource_id: String,
        base_resource_type: String,
        computed_values: ComputedValues,
    ) -> Self {
        Self {
            base_resource_id,
            base_resource_type,
            computed_values,
            list_resource_data: IndexMap::new(),
        }
    }

    pub(crate) fn with_list_resource_data(
        mut self,
        list_resource_data: IndexMap<String, Vec<ResourceData>>,
    ) -> Self {
        self.list_resource_data = list_resource_data;
        self
    }

    /// Logical id of the root resource
    pub fn base_resource_id(&self) -> &str {
        &self.base_resource_id
    }

    /// Type of the root resource
    pub fn base_resource_type(&self) -> &str {
        &self.base_resource_type
    }

    /// A computed value; `None` renders as blank
    pub fn computed_value(&self, name: &str) -> Option<&Value> {
        self.computed_values.get(name)
    }

    /// All computed values
    pub fn computed_values(&self) -> &ComputedValues {
        &self.computed_values
    }

    /// Materialized items of a list section
    pub fn list_resource_data(&self, list_id: &str) -> Option<&[ResourceData]> {
        self.list_resource_data.get(list_id).map(Vec::as_slice)
    }

    /// All materialized list sections
    pub fn list_resource_data_map(&self) -> &IndexMap<String, Vec<ResourceData>> {
        &self.list_resource_data
    }
}
