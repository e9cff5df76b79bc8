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

//! Data model: values, resources, configuration and results

pub mod config;
pub mod resource;
pub mod resource_data;
pub mod value;
pub mod view;

pub use config::{DataType, FhirResourceConfig, ResourceConfig, RuleConfig, SortConfig, SortOrder};
pub use resource::{Resource, extract_logical_id, split_reference};
pub use resource_data::{
    RelatedResourceCount, RelatedResourcesCountMap, RelatedResourcesMap, RepositoryResourceData,
    ResourceData,
};
pub use value::{ComputedValues, Namespace, Value};
pub use view::{ListProperties, ListResource, RegisterCardConfig, ViewProperties};
