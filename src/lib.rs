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

//! Resource data rules engine for FHIR registers and profiles
//!
//! Fetches the configured graph of resources related to a root resource,
//! fires declarative rules over it and returns the computed values a UI
//! renders, including per-item data for list sections.
//!
//! ```no_run
//! use octofhir_resource_rules::{
//!     EngineConfig, FhirResourceConfig, InMemoryResourceStore, ResourceConfig,
//!     ResourceDataLoader, ResourceStore, RuleConfig, RuleSet,
//! };
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! # async fn run(store: Arc<InMemoryResourceStore>) -> octofhir_resource_rules::Result<()> {
//! let config = FhirResourceConfig::new(ResourceConfig::new("Patient")).with_related(
//!     ResourceConfig::new("CarePlan")
//!         .with_id("carePlans")
//!         .with_search_parameter("subject"),
//! );
//! let rules = RuleSet::compile(&[
//!     RuleConfig::new("carePlanCount").with_action("size(carePlans)"),
//! ]);
//!
//! let loader = ResourceDataLoader::new(store.clone(), EngineConfig::default());
//! if let Ok(Some(patient)) = store.get("Patient", "p1").await {
//!     let row = loader
//!         .load_resource_data(patient, &config, &rules, &HashMap::new())
//!         .await?;
//!     println!("{:?}", row.computed_value("carePlanCount"));
//! }
//! # Ok(())
//! # }
//! ```

pub mod ast;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod fetcher;
pub mod fhirpath;
pub mod list;
pub mod loader;
pub mod model;
pub mod parser;
pub mod rules;
pub mod session;
pub mod store;

// Re-export main types
pub use config::{EngineConfig, EngineConfigBuilder};
pub use error::{EngineError, Result};
pub use evaluator::{DateService, EvaluationError, EvaluationResult, evaluate};
pub use executor::ResourceDataRulesExecutor;
pub use fetcher::ResourceGraphFetcher;
pub use fhirpath::FhirPathExtractor;
pub use list::{ListMaterializer, Lists};
pub use loader::ResourceDataLoader;
pub use model::{
    ComputedValues, DataType, FhirResourceConfig, ListProperties, ListResource,
    RegisterCardConfig, RelatedResourceCount, RelatedResourcesCountMap, RelatedResourcesMap,
    RepositoryResourceData, Resource, ResourceConfig, ResourceData, RuleConfig, SortConfig,
    SortOrder, Value, ViewProperties,
};
pub use parser::{ParseError, parse_fhirpath, parse_rule_expression};
pub use rules::{RuleSet, RulesEngine};
pub use session::Session;
pub use store::{
    InMemoryResourceStore, RelatedResourcesSnapshot, ResourceStore, SearchFilter, SearchQuery,
    StoreError, StoreResult,
};
