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

//! Loading register rows and profiles
//!
//! The loader ties a [`ResourceGraphFetcher`] to a
//! [`ResourceDataRulesExecutor`] over one shared FHIRPath cache. A page of
//! rows is evaluated concurrently, bounded by
//! [`EngineConfig::max_concurrent_rows`], and returned in input order.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::executor::ResourceDataRulesExecutor;
use crate::fetcher::ResourceGraphFetcher;
use crate::list::ListMaterializer;
use crate::model::{
    ComputedValues, FhirResourceConfig, RepositoryResourceData, Resource, ResourceData,
    ViewProperties,
};
use crate::rules::RuleSet;
use crate::store::ResourceStore;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::sync::Arc;

/// Fetches and evaluates resource data for register rows and profiles
#[derive(Debug, Clone)]
pub struct ResourceDataLoader {
    fetcher: ResourceGraphFetcher,
    executor: ResourceDataRulesExecutor,
    materializer: ListMaterializer,
    config: EngineConfig,
}

impl ResourceDataLoader {
    /// Create a loader over `store`
    pub fn new(store: Arc<dyn ResourceStore>, config: EngineConfig) -> Self {
        let executor = ResourceDataRulesExecutor::from_config(&config);
        let fetcher =
            ResourceGraphFetcher::new(store, Arc::clone(executor.fhir_path()), &config);
        let materializer = ListMaterializer::new(executor.clone(), config.clone());
        Self {
            fetcher,
            executor,
            materializer,
            config,
        }
    }

    /// The fetcher used for the store
    pub fn fetcher(&self) -> &ResourceGraphFetcher {
        &self.fetcher
    }

    /// The executor firing the rules
    pub fn executor(&self) -> &ResourceDataRulesExecutor {
        &self.executor
    }

    /// The configuration this loader was built with
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluate one register row
    pub async fn load_resource_data(
        &self,
        root: Arc<Resource>,
        config: &FhirResourceConfig,
        rules: &RuleSet,
        params: &HashMap<String, String>,
    ) -> Result<ResourceData> {
        let data = self
            .fetcher
            .fetch_graph(root, config, &params_as_constants(params))
            .await?;
        Ok(self.executor.process_with_rule_set(&data, rules, params))
    }

    /// Evaluate a page of register rows
    ///
    /// Rows run concurrently and share `rules`. The first row failing with a
    /// store error fails the page.
    pub async fn load_page(
        &self,
        roots: Vec<Arc<Resource>>,
        config: &FhirResourceConfig,
        rules: &RuleSet,
        params: &HashMap<String, String>,
    ) -> Result<Vec<ResourceData>> {
        log::debug!(
            "Loading page of {} rows with {} rules",
            roots.len(),
            rules.len()
        );
        stream::iter(roots)
            .map(|root| self.load_resource_data(root, config, rules, params))
            .buffered(self.config.max_concurrent_rows.max(1))
            .try_collect()
            .await
    }

    /// Evaluate a profile: the root by id, its secondary graphs and its lists
    ///
    /// Every resource of each secondary configuration's base type becomes a
    /// secondary root with its own graph. Lists of `views` read their items
    /// from the merged relations of the profile.
    #[allow(clippy::too_many_arguments)]
    pub async fn load_profile(
        &self,
        resource_type: &str,
        id: &str,
        config: &FhirResourceConfig,
        secondary_configs: &[FhirResourceConfig],
        rules: &RuleSet,
        views: &[ViewProperties],
        params: &HashMap<String, String>,
    ) -> Result<ResourceData> {
        let root = self
            .fetcher
            .get_resource(resource_type, id)
            .await?
            .ok_or_else(|| EngineError::ResourceNotFound {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
            })?;

        let constants = params_as_constants(params);
        let mut data = self.fetcher.fetch_graph(root, config, &constants).await?;
        data.secondary_repository_resource_data = self
            .load_secondary(secondary_configs, &constants)
            .await?;

        let computed = self.executor.compute_values(&data, rules, params);
        let related = data.merged_related();
        let lists = self
            .materializer
            .collect_list_resource_data(views, &related, &computed, params)
            .await?;

        Ok(ResourceData::new(
            data.resource.logical_id(),
            data.resource.resource_type().to_string(),
            computed,
        )
        .with_list_resource_data(lists))
    }

    async fn load_secondary(
        &self,
        secondary_configs: &[FhirResourceConfig],
        constants: &ComputedValues,
    ) -> Result<Vec<RepositoryResourceData>> {
        let mut secondary = Vec::new();
        for config in secondary_configs {
            let roots = self
                .fetcher
                .search_roots(&config.base_resource, constants)
                .await?;
            log::debug!(
                "Secondary '{}' has {} roots",
                config.base_resource.relation_key(),
                roots.len()
            );
            for root in roots {
                secondary.push(self.fetcher.fetch_graph(root, config, constants).await?);
            }
        }
        Ok(secondary)
    }
}

fn params_as_constants(params: &HashMap<String, String>) -> ComputedValues {
    params
        .iter()
        .map(|(key, value)| (key.clone(), value.as_str().into()))
        .collect()
}
