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

//! Resource relationship and rule configuration
//!
//! These structures arrive already parsed and validated. They derive serde so a
//! host can hand over the JSON it already holds, but the engine never checks
//! them beyond what evaluation needs.

use serde::{Deserialize, Serialize};

/// One relation in the resource graph configuration tree
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceConfig {
    /// Relation key; defaults to the resource type
    #[serde(default)]
    pub id: Option<String>,

    /// Type of the related resources
    #[serde(alias = "resource")]
    pub resource_type: String,

    /// Search parameter on the related type that references the parent
    /// (reverse include), e.g. `subject`
    #[serde(default)]
    pub search_parameter: Option<String>,

    /// FHIRPath to the reference(s) on the parent (forward reference),
    /// e.g. `Patient.link.other`
    #[serde(default)]
    pub fhir_path_expression: Option<String>,

    /// Force a reverse include even when a reference path is configured
    #[serde(default)]
    pub is_rev_include: bool,

    /// In list item relations: the parent relation key candidates are taken
    /// from. With a reference path set, the path is read on each candidate
    /// and must point back at the item.
    #[serde(default)]
    pub related_resource_id: Option<String>,

    /// Nested relations, fetched for every resource of this relation
    #[serde(default)]
    pub related_resources: Vec<ResourceConfig>,

    /// Sort applied to the candidates of one parent
    #[serde(default)]
    pub sort_config: Option<SortConfig>,

    /// FHIRPath filter evaluated per candidate
    #[serde(default)]
    pub conditional_fhir_path_expression: Option<String>,

    /// Report only the number of matches
    #[serde(default)]
    pub result_as_count: bool,

    /// Merge the counts of all parents into one entry
    #[serde(default)]
    pub sum_counts: bool,
}

impl ResourceConfig {
    /// Create a relation of the given resource type
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            ..Self::default()
        }
    }

    /// Relation key: `id` if set, else the resource type
    pub fn relation_key(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.resource_type)
    }

    /// Check whether candidates are found by searching for resources that
    /// reference the parent
    pub fn is_reverse_include(&self) -> bool {
        self.is_rev_include
            || self
                .fhir_path_expression
                .as_deref()
                .is_none_or(|expression| expression.trim().is_empty())
    }

    /// Set the relation key
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the reverse include search parameter
    pub fn with_search_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.search_parameter = Some(parameter.into());
        self
    }

    /// Set the forward reference path
    pub fn with_reference_path(mut self, expression: impl Into<String>) -> Self {
        self.fhir_path_expression = Some(expression.into());
        self
    }

    /// Take list item candidates from the given parent relation key
    pub fn with_related_resource_id(mut self, key: impl Into<String>) -> Self {
        self.related_resource_id = Some(key.into());
        self
    }

    /// Add a nested relation
    pub fn with_related(mut self, related: ResourceConfig) -> Self {
        self.related_resources.push(related);
        self
    }

    /// Set the sort configuration
    pub fn with_sort(mut self, sort: SortConfig) -> Self {
        self.sort_config = Some(sort);
        self
    }

    /// Set the per-candidate filter
    pub fn with_filter(mut self, expression: impl Into<String>) -> Self {
        self.conditional_fhir_path_expression = Some(expression.into());
        self
    }

    /// Report counts instead of resources
    pub fn counted(mut self, sum_counts: bool) -> Self {
        self.result_as_count = true;
        self.sum_counts = sum_counts;
        self
    }
}

/// Root of a resource graph configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FhirResourceConfig {
    /// The root relation
    pub base_resource: ResourceConfig,
    /// Relations fetched for the root
    #[serde(default)]
    pub related_resources: Vec<ResourceConfig>,
}

impl FhirResourceConfig {
    /// Create a configuration rooted at the given resource type
    pub fn new(base_resource: ResourceConfig) -> Self {
        Self {
            base_resource,
            related_resources: Vec::new(),
        }
    }

    /// Add a relation of the root
    pub fn with_related(mut self, related: ResourceConfig) -> Self {
        self.related_resources.push(related);
        self
    }
}

/// Data type a sort key is compared as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    /// Dates and date-times
    Date,
    /// Date-times
    DateTime,
    /// Whole numbers
    Integer,
    /// Decimal numbers
    Decimal,
    /// Booleans
    Boolean,
    /// Text
    #[default]
    String,
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortOrder {
    /// Smallest first
    #[default]
    Ascending,
    /// Largest first
    Descending,
}

/// Sort configuration for related resources
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortConfig {
    /// FHIRPath producing the sort key of each resource
    pub fhir_path_expression: String,
    /// How keys are compared
    #[serde(default)]
    pub data_type: DataType,
    /// Direction
    #[serde(default)]
    pub order: SortOrder,
}

impl SortConfig {
    /// Create a sort configuration
    pub fn new(fhir_path_expression: impl Into<String>, data_type: DataType, order: SortOrder) -> Self {
        Self {
            fhir_path_expression: fhir_path_expression.into(),
            data_type,
            order,
        }
    }
}

fn default_condition() -> String {
    "true".to_string()
}

fn default_priority() -> i32 {
    1
}

/// A named rule: a condition and the actions run when it holds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConfig {
    /// Unique rule name; value-producing actions write under it
    pub name: String,
    /// Free text
    #[serde(default)]
    pub description: String,
    /// Rule condition; an empty condition is treated as `true`
    #[serde(default = "default_condition")]
    pub condition: String,
    /// Actions run in order when the condition holds
    #[serde(default)]
    pub actions: Vec<String>,
    /// Lower fires earlier; declaration order breaks ties
    #[serde(default = "default_priority")]
    pub priority: i32,
}

impl RuleConfig {
    /// Create a rule with the default condition and priority
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            condition: default_condition(),
            actions: Vec::new(),
            priority: default_priority(),
        }
    }

    /// Set the condition
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = condition.into();
        self
    }

    /// Append an action
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.actions.push(action.into());
        self
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}
