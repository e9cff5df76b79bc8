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

//! Resource store boundary
//!
//! The engine builds [`SearchQuery`]s; a [`ResourceStore`] only executes them.
//! Stores must be safe for concurrent reads, since one store serves every row
//! of a page.

mod memory;
mod snapshot;

pub use memory::InMemoryResourceStore;
pub use snapshot::RelatedResourcesSnapshot;

use crate::model::{Resource, split_reference};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures reported by a resource store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// One query failed; the store itself is still usable
    #[error("Query for {resource_type} failed: {message}")]
    QueryFailed {
        /// Resource type searched
        resource_type: String,
        /// Underlying failure
        message: String,
    },

    /// The store cannot serve any query (closed, unreachable)
    #[error("Store unavailable: {message}")]
    Unavailable {
        /// Underlying failure
        message: String,
    },

    /// A query did not finish in time
    #[error("Query timed out after {after:?}")]
    Timeout {
        /// Configured timeout
        after: Duration,
    },
}

impl StoreError {
    /// Create a query failure
    pub fn query_failed(resource_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::QueryFailed {
            resource_type: resource_type.into(),
            message: message.into(),
        }
    }

    /// Check whether the failure aborts the whole operation rather than one relation
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }
}

/// How candidates of a query are selected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchFilter {
    /// Resources whose search parameter references the given resource
    /// (reverse include)
    ReferencedBy {
        /// Search parameter on the searched type, e.g. `subject` or `part-of`
        search_parameter: String,
        /// Relative reference of the referenced resource, e.g. `Patient/p1`
        reference: String,
    },
    /// Resources with one of the given logical ids (forward reference)
    Ids(Vec<String>),
    /// Every resource of the type
    All,
}

/// A query against one resource type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Type searched
    pub resource_type: String,
    /// Candidate selection
    pub filter: SearchFilter,
}

impl SearchQuery {
    /// Resources of `resource_type` whose `search_parameter` references `reference`
    pub fn referenced_by(
        resource_type: impl Into<String>,
        search_parameter: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            filter: SearchFilter::ReferencedBy {
                search_parameter: search_parameter.into(),
                reference: reference.into(),
            },
        }
    }

    /// Resources of `resource_type` with the given ids
    pub fn by_ids(resource_type: impl Into<String>, ids: Vec<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            filter: SearchFilter::Ids(ids),
        }
    }

    /// Every resource of `resource_type`
    pub fn all(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            filter: SearchFilter::All,
        }
    }

    /// Check whether a resource satisfies the query
    pub fn matches(&self, resource: &Resource) -> bool {
        if resource.resource_type() != self.resource_type {
            return false;
        }
        match &self.filter {
            SearchFilter::All => true,
            SearchFilter::Ids(ids) => {
                let id = resource.logical_id();
                ids.iter().any(|candidate| *candidate == id)
            }
            SearchFilter::ReferencedBy {
                search_parameter,
                reference,
            } => {
                let Some(target) = split_reference(reference) else {
                    return false;
                };
                resource
                    .get_property(&search_parameter_to_property(search_parameter))
                    .is_some_and(|value| references(value, &target))
            }
        }
    }
}

/// Executes queries built by the engine
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Resources matching the query
    async fn search(&self, query: &SearchQuery) -> StoreResult<Vec<Arc<Resource>>>;

    /// Number of resources matching the query
    async fn count(&self, query: &SearchQuery) -> StoreResult<u64>;

    /// A resource by type and logical id
    async fn get(&self, resource_type: &str, id: &str) -> StoreResult<Option<Arc<Resource>>>;
}

/// Map a search parameter name to the element it searches (`part-of` -> `partOf`)
pub(crate) fn search_parameter_to_property(search_parameter: &str) -> String {
    let mut property = String::with_capacity(search_parameter.len());
    let mut upper = false;
    for c in search_parameter.chars() {
        if c == '-' {
            upper = true;
        } else if upper {
            property.extend(c.to_uppercase());
            upper = false;
        } else {
            property.push(c);
        }
    }
    property
}

fn references(value: &JsonValue, target: &(&str, String)) -> bool {
    match value {
        JsonValue::Array(items) => items.iter().any(|item| references(item, target)),
        JsonValue::Object(obj) => obj
            .get("reference")
            .is_some_and(|reference| references(reference, target)),
        JsonValue::String(reference) => split_reference(reference)
            .is_some_and(|(resource_type, id)| resource_type == target.0 && id == target.1),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("subject", "subject")]
    #[case("part-of", "partOf")]
    #[case("based-on", "basedOn")]
    fn test_search_parameter_to_property(#[case] parameter: &str, #[case] expected: &str) {
        assert_eq!(search_parameter_to_property(parameter), expected);
    }

    #[test]
    fn test_query_matching() {
        let task = Resource::from_json(json!({
            "resourceType": "Task",
            "id": "t1",
            "basedOn": [{"reference": "CarePlan/c1"}, {"reference": "CarePlan/c2/_history/3"}],
            "for": {"reference": "Patient/p1"}
        }))
        .unwrap();

        assert!(SearchQuery::referenced_by("Task", "based-on", "CarePlan/c2").matches(&task));
        assert!(SearchQuery::referenced_by("Task", "for", "Patient/p1").matches(&task));
        assert!(!SearchQuery::referenced_by("Task", "for", "Group/p1").matches(&task));
        assert!(!SearchQuery::referenced_by("CarePlan", "for", "Patient/p1").matches(&task));
        assert!(SearchQuery::by_ids("Task", vec!["t1".into()]).matches(&task));
        assert!(SearchQuery::all("Task").matches(&task));
    }

    #[test]
    fn test_fatal_errors() {
        assert!(!StoreError::query_failed("Task", "boom").is_fatal());
        assert!(StoreError::Unavailable { message: "closed".into() }.is_fatal());
        assert!(StoreError::Timeout { after: Duration::from_secs(1) }.is_fatal());
    }
}
