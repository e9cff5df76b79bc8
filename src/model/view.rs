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

//! View configuration tree
//!
//! Only the parts the engine reads are modelled: container nodes and lists.
//! Presentation attributes of the host's views are ignored on deserialization.

use super::config::{ResourceConfig, RuleConfig, SortConfig};
use serde::{Deserialize, Serialize};

/// A node of the view configuration tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "viewType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViewProperties {
    /// Text leaf
    Text {
        /// Displayed text, possibly templated
        #[serde(default)]
        content: String,
    },
    /// Vertical container
    Column {
        /// Child views
        #[serde(default)]
        children: Vec<ViewProperties>,
    },
    /// Horizontal container
    Row {
        /// Child views
        #[serde(default)]
        children: Vec<ViewProperties>,
    },
    /// Card container
    Card {
        /// Card body
        #[serde(default)]
        content: Vec<ViewProperties>,
    },
    /// Tabbed container
    Tabs {
        /// Views of all tabs
        #[serde(default, rename = "tabContents")]
        tab_contents: Vec<ViewProperties>,
    },
    /// List section, materialized per item
    List(ListProperties),
    /// Any other leaf view
    #[serde(other)]
    Other,
}

impl ViewProperties {
    /// Direct child views, including the views of a list's register card
    pub fn children(&self) -> &[ViewProperties] {
        match self {
            ViewProperties::Column { children } | ViewProperties::Row { children } => children,
            ViewProperties::Card { content } => content,
            ViewProperties::Tabs { tab_contents } => tab_contents,
            ViewProperties::List(list) => &list.register_card.views,
            ViewProperties::Text { .. } | ViewProperties::Other => &[],
        }
    }

    /// Get the list properties if this node is a list
    pub fn as_list(&self) -> Option<&ListProperties> {
        match self {
            ViewProperties::List(list) => Some(list),
            _ => None,
        }
    }
}

/// Rules and views rendered for every item of a list
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterCardConfig {
    /// Rules fired per item
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
    /// Views rendered per item
    #[serde(default)]
    pub views: Vec<ViewProperties>,
}

/// A list section of the view tree
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListProperties {
    /// Key of the list in `ResourceData::list_resource_data`
    pub id: String,
    /// Where the items come from
    #[serde(default)]
    pub resources: Vec<ListResource>,
    /// Per-item rules and views
    #[serde(default)]
    pub register_card: RegisterCardConfig,
}

/// Source of list items in the parent's related resources
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResource {
    /// Optional name of this source
    #[serde(default)]
    pub id: Option<String>,
    /// Relation key to read items from; defaults to the resource type
    #[serde(default)]
    pub related_resource_id: Option<String>,
    /// Type of the items
    #[serde(alias = "resource")]
    pub resource_type: String,
    /// FHIRPath filter evaluated per item
    #[serde(default)]
    pub conditional_fhir_path_expression: Option<String>,
    /// Item ordering
    #[serde(default)]
    pub sort_config: Option<SortConfig>,
    /// Relations of each item, resolved from the parent's already-fetched data
    #[serde(default)]
    pub related_resources: Vec<ResourceConfig>,
}

impl ListResource {
    /// Create a list source reading items of the given type
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            ..Self::default()
        }
    }

    /// Relation key the items are read from
    pub fn source_key(&self) -> &str {
        self.related_resource_id
            .as_deref()
            .unwrap_or(&self.resource_type)
    }
}
