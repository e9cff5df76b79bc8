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

//! Engine configuration

use crate::evaluator::DateService;
use crate::fhirpath::{DEFAULT_CACHE_SIZE, FhirPathExtractor};
use chrono::NaiveDate;
use std::time::Duration;

/// Default timeout applied to every resource store call
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of rows evaluated concurrently by a page load
pub const DEFAULT_MAX_CONCURRENT_ROWS: usize = 8;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Timeout of a single resource store call; expiry makes the store unavailable
    pub query_timeout: Duration,
    /// Upper bound of rows evaluated at the same time in one page
    pub max_concurrent_rows: usize,
    /// Capacity of the parsed FHIRPath expression cache
    pub fhir_path_cache_size: usize,
    /// Fixed current date for date helpers; `None` uses the local date
    pub today: Option<NaiveDate>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            max_concurrent_rows: DEFAULT_MAX_CONCURRENT_ROWS,
            fhir_path_cache_size: DEFAULT_CACHE_SIZE,
            today: None,
        }
    }
}

impl EngineConfig {
    /// Start building a configuration
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// Date helper honouring the fixed date
    pub fn date_service(&self) -> DateService {
        self.today.map(DateService::new).unwrap_or_default()
    }

    /// FHIRPath extractor sized and dated by this configuration
    pub fn fhir_path_extractor(&self) -> FhirPathExtractor {
        FhirPathExtractor::new(self.fhir_path_cache_size).with_today(self.today)
    }
}

/// Builder for [`EngineConfig`] with fluent API
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the store call timeout
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.config.query_timeout = timeout;
        self
    }

    /// Set the concurrent row bound; zero is raised to one
    pub fn with_max_concurrent_rows(mut self, rows: usize) -> Self {
        self.config.max_concurrent_rows = rows.max(1);
        self
    }

    /// Set the FHIRPath expression cache capacity
    pub fn with_fhir_path_cache_size(mut self, size: usize) -> Self {
        self.config.fhir_path_cache_size = size;
        self
    }

    /// Fix the current date
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.config.today = Some(today);
        self
    }

    /// Build the final configuration
    pub fn build(self) -> EngineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let config = EngineConfig::builder()
            .with_query_timeout(Duration::from_secs(2))
            .with_max_concurrent_rows(0)
            .with_fhir_path_cache_size(16)
            .with_today(today)
            .build();

        assert_eq!(config.query_timeout, Duration::from_secs(2));
        assert_eq!(config.max_concurrent_rows, 1);
        assert_eq!(config.date_service().today(), today);
        assert_eq!(EngineConfig::default().max_concurrent_rows, DEFAULT_MAX_CONCURRENT_ROWS);
    }
}
