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

//! List sections of a view tree
//!
//! Every list node found in the view tree is materialized item by item: the
//! items are taken from the parent's already-fetched relations, each item's
//! own relations are resolved against a snapshot of those relations, and the
//! list's rules run once per item. An item's computed values are the parent's
//! values overlaid with its own.
//!
//! A relation naming a `related_resource_id` reads only that key of the
//! parent's relations, so same-typed children fetched under different keys
//! stay apart. Item rules see the request parameters like the parent's rules
//! do; the parent's computed values are not visible to them.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::executor::ResourceDataRulesExecutor;
use crate::fetcher::ResourceGraphFetcher;
use crate::model::{
    ComputedValues, ListProperties, ListResource, RelatedResourcesMap, Resource, ResourceData,
    ViewProperties,
};
use crate::rules::RuleSet;
use crate::store::RelatedResourcesSnapshot;
use futures::future::BoxFuture;
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Iterator over the list nodes of a view tree
///
/// Walks depth first with an explicit stack in document order. The views of
/// a list's register card belong to its items and are not entered.
#[derive(Debug, Clone)]
pub struct Lists<'a> {
    stack: Vec<&'a ViewProperties>,
}

impl<'a> Lists<'a> {
    /// Iterate the lists of several root views
    pub fn new(views: &'a [ViewProperties]) -> Self {
        Self {
            stack: views.iter().rev().collect(),
        }
    }
}

impl<'a> Iterator for Lists<'a> {
    type Item = &'a ListProperties;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(view) = self.stack.pop() {
            if let ViewProperties::List(list) = view {
                return Some(list);
            }
            self.stack.extend(view.children().iter().rev());
        }
        None
    }
}

impl ViewProperties {
    /// Every list in this subtree, this node included
    pub fn lists(&self) -> Lists<'_> {
        Lists::new(std::slice::from_ref(self))
    }
}

/// Produces the [`ResourceData`] of list items
#[derive(Debug, Clone)]
pub struct ListMaterializer {
    executor: ResourceDataRulesExecutor,
    config: EngineConfig,
}

impl ListMaterializer {
    /// Create a materializer evaluating items with `executor`
    pub fn new(executor: ResourceDataRulesExecutor, config: EngineConfig) -> Self {
        Self { executor, config }
    }

    /// Items of `list` as a lazy stream, one [`ResourceData`] at a time
    ///
    /// Items are selected up front; relations and rules of an item are only
    /// evaluated when the stream is polled for it. Calling this again starts
    /// the sequence over.
    pub fn materialize<'a>(
        &'a self,
        list: &'a ListProperties,
        parent_related: &'a RelatedResourcesMap,
        parent_computed: &'a ComputedValues,
        params: &'a HashMap<String, String>,
    ) -> impl Stream<Item = Result<ResourceData>> + Send + 'a {
        let items = self.select_items(list, parent_related, parent_computed);
        let fetcher = ResourceGraphFetcher::new(
            Arc::new(RelatedResourcesSnapshot::new(parent_related)),
            Arc::clone(self.executor.fhir_path()),
            &self.config,
        );
        let rules = RuleSet::compile(&list.register_card.rules);

        stream::iter(items).then(move |(item, source)| {
            let fetcher = fetcher.clone();
            let rules = rules.clone();
            async move {
                self.materialize_item(
                    &fetcher,
                    list,
                    source,
                    item,
                    &rules,
                    parent_related,
                    parent_computed,
                    params,
                )
                .await
            }
        })
    }

    /// Drain every list of `views` into a map keyed by list id
    pub fn collect_list_resource_data<'a>(
        &'a self,
        views: &'a [ViewProperties],
        related: &'a RelatedResourcesMap,
        computed: &'a ComputedValues,
        params: &'a HashMap<String, String>,
    ) -> BoxFuture<'a, Result<IndexMap<String, Vec<ResourceData>>>> {
        Box::pin(async move {
            let mut lists = IndexMap::new();
            for list in Lists::new(views) {
                let items: Vec<ResourceData> = self
                    .materialize(list, related, computed, params)
                    .try_collect()
                    .await?;
                lists.insert(list.id.clone(), items);
            }
            Ok(lists)
        })
    }

    /// Candidate items per list source, filtered and sorted
    fn select_items<'a>(
        &self,
        list: &'a ListProperties,
        parent_related: &RelatedResourcesMap,
        parent_computed: &ComputedValues,
    ) -> Vec<(Arc<Resource>, &'a ListResource)> {
        let fhir_path = self.executor.fhir_path();
        let mut items = Vec::new();
        for source in &list.resources {
            let Some(resources) = parent_related.get(source.source_key()) else {
                log::warn!(
                    "List '{}' reads unknown relation key '{}'",
                    list.id,
                    source.source_key()
                );
                continue;
            };
            let mut resources: Vec<Arc<Resource>> = resources
                .iter()
                .filter(|resource| resource.resource_type() == source.resource_type)
                .cloned()
                .collect();

            if let Some(expression) = source.conditional_fhir_path_expression.as_deref() {
                resources = match fhir_path.filter_resources(resources, expression, parent_computed) {
                    Ok(kept) => kept,
                    Err(error) => {
                        log::warn!("Filter '{expression}' of list '{}' failed: {error}", list.id);
                        Vec::new()
                    }
                };
            }
            if let Some(sort) = &source.sort_config {
                if let Err(error) = fhir_path.sort_resources(&mut resources, sort) {
                    log::warn!("Sorting list '{}' failed: {error}", list.id);
                }
            }
            items.extend(resources.into_iter().map(|resource| (resource, source)));
        }
        items
    }

    #[allow(clippy::too_many_arguments)]
    async fn materialize_item(
        &self,
        fetcher: &ResourceGraphFetcher,
        list: &ListProperties,
        source: &ListResource,
        item: Arc<Resource>,
        rules: &RuleSet,
        parent_related: &RelatedResourcesMap,
        parent_computed: &ComputedValues,
        params: &HashMap<String, String>,
    ) -> Result<ResourceData> {
        let data = fetcher
            .fetch_list_item(item, &source.related_resources, parent_related, parent_computed)
            .await?;

        let mut computed = parent_computed.clone();
        computed.extend(self.executor.compute_values(&data, rules, params));

        let nested = self
            .collect_list_resource_data(
                &list.register_card.views,
                &data.related_resources_map,
                &computed,
                params,
            )
            .await?;

        Ok(ResourceData::new(
            data.resource.logical_id(),
            data.resource.resource_type().to_string(),
            computed,
        )
        .with_list_resource_data(nested))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataType, RuleConfig, SortConfig, SortOrder, Value};
    use futures::pin_mut;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn views() -> Vec<ViewProperties> {
        serde_json::from_value(json!([
            {"viewType": "COLUMN", "children": [
                {"viewType": "LIST", "id": "first", "resources": [{"resource": "Task"}]},
                {"viewType": "CARD", "content": [
                    {"viewType": "TABS", "tabContents": [
                        {"viewType": "LIST", "id": "second", "resources": [{"resource": "Task"}],
                         "registerCard": {"views": [
                            {"viewType": "LIST", "id": "inner", "resources": [{"resource": "Task"}]}
                         ]}}
                    ]}
                ]}
            ]},
            {"viewType": "ROW", "children": [
                {"viewType": "LIST", "id": "third", "resources": [{"resource": "Task"}]}
            ]}
        ]))
        .unwrap()
    }

    #[test]
    fn test_lists_in_document_order() {
        let views = views();
        let ids: Vec<&str> = Lists::new(&views).map(|list| list.id.as_str()).collect();
        assert_eq!(ids, ["first", "second", "third"]);
        assert_eq!(views[1].lists().count(), 1);
    }

    fn task(id: &str, status: &str, authored: &str) -> Arc<Resource> {
        Arc::new(
            Resource::from_json(json!({
                "resourceType": "Task",
                "id": id,
                "status": status,
                "authoredOn": authored
            }))
            .unwrap(),
        )
    }

    fn materializer() -> ListMaterializer {
        let config = EngineConfig::default();
        ListMaterializer::new(ResourceDataRulesExecutor::from_config(&config), config)
    }

    fn list() -> ListProperties {
        let mut source = ListResource::new("Task");
        source.related_resource_id = Some("tasks".into());
        source.conditional_fhir_path_expression = Some("status != 'cancelled'".into());
        source.sort_config = Some(SortConfig::new(
            "authoredOn",
            DataType::Date,
            SortOrder::Descending,
        ));
        let mut list = ListProperties {
            id: "tasks".into(),
            resources: vec![source],
            ..ListProperties::default()
        };
        list.register_card.rules = vec![
            RuleConfig::new("label").with_action("Task.status"),
            RuleConfig::new("itemOnly").with_action("Task.id"),
        ];
        list
    }

    #[tokio::test]
    async fn test_materialize_merges_parent_values() {
        let mut related = RelatedResourcesMap::new();
        related.insert(
            "tasks".into(),
            vec![
                task("t1", "ready", "2024-01-01"),
                task("t2", "cancelled", "2024-02-01"),
                task("t3", "completed", "2024-03-01"),
            ],
        );
        let parent = ComputedValues::from([
            ("label".to_string(), Value::from("X")),
            ("patientName".to_string(), Value::from("Jane")),
        ]);
        let params = HashMap::new();
        let materializer = materializer();
        let list = list();

        let items: Vec<ResourceData> = materializer
            .materialize(&list, &related, &parent, &params)
            .try_collect()
            .await
            .unwrap();

        let ids: Vec<&str> = items.iter().map(ResourceData::base_resource_id).collect();
        assert_eq!(ids, ["t3", "t1"]);
        assert_eq!(items[0].computed_value("label"), Some(&Value::from("completed")));
        assert_eq!(items[0].computed_value("patientName"), Some(&Value::from("Jane")));
        assert_eq!(items[1].computed_value("itemOnly"), Some(&Value::from("t1")));
    }

    #[tokio::test]
    async fn test_materialize_is_lazy_and_restartable() {
        let mut related = RelatedResourcesMap::new();
        related.insert(
            "tasks".into(),
            vec![task("t1", "ready", "2024-01-01"), task("t2", "ready", "2024-02-01")],
        );
        let parent = ComputedValues::new();
        let params = HashMap::new();
        let materializer = materializer();
        let list = list();

        let stream = materializer.materialize(&list, &related, &parent, &params);
        pin_mut!(stream);
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.base_resource_id(), "t2");

        let restarted = materializer.materialize(&list, &related, &parent, &params);
        pin_mut!(restarted);
        assert_eq!(restarted.next().await.unwrap().unwrap().base_resource_id(), "t2");
    }

    fn plan_task(id: &str, plan: &str) -> Arc<Resource> {
        Arc::new(
            Resource::from_json(json!({
                "resourceType": "Task",
                "id": id,
                "basedOn": [{"reference": format!("CarePlan/{plan}")}]
            }))
            .unwrap(),
        )
    }

    #[rstest::rstest]
    #[case::search_parameter(json!({
        "resource": "Task", "id": "itemTasks", "relatedResourceId": "openTasks",
        "searchParameter": "based-on", "isRevInclude": true
    }))]
    #[case::reference_path(json!({
        "resource": "Task", "id": "itemTasks", "relatedResourceId": "openTasks",
        "fhirPathExpression": "Task.basedOn.reference"
    }))]
    #[tokio::test]
    async fn test_item_relation_reads_only_its_parent_key(#[case] relation: serde_json::Value) {
        let mut related = RelatedResourcesMap::new();
        related.insert(
            "carePlans".into(),
            vec![Arc::new(
                Resource::from_json(json!({"resourceType": "CarePlan", "id": "c1"})).unwrap(),
            )],
        );
        related.insert("openTasks".into(), vec![plan_task("t1", "c1"), plan_task("t3", "c2")]);
        related.insert("doneTasks".into(), vec![plan_task("t2", "c1")]);

        let list: ListProperties = serde_json::from_value(json!({
            "id": "plans",
            "resources": [{
                "resource": "CarePlan",
                "relatedResourceId": "carePlans",
                "relatedResources": [relation]
            }],
            "registerCard": {"rules": [
                {"name": "taskCount", "actions": ["itemTasks.size()"]},
                {"name": "taskId", "actions": ["itemTasks[0].id"]}
            ]}
        }))
        .unwrap();
        let materializer = materializer();
        let params = HashMap::new();

        let items: Vec<ResourceData> = materializer
            .materialize(&list, &related, &ComputedValues::new(), &params)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].computed_value("taskCount"), Some(&Value::from(1i64)));
        assert_eq!(items[0].computed_value("taskId"), Some(&Value::from("t1")));
    }

    #[tokio::test]
    async fn test_unscoped_item_relation_sees_every_key() {
        let mut related = RelatedResourcesMap::new();
        related.insert(
            "carePlans".into(),
            vec![Arc::new(
                Resource::from_json(json!({"resourceType": "CarePlan", "id": "c1"})).unwrap(),
            )],
        );
        related.insert("openTasks".into(), vec![plan_task("t1", "c1")]);
        related.insert("doneTasks".into(), vec![plan_task("t2", "c1")]);

        let list: ListProperties = serde_json::from_value(json!({
            "id": "plans",
            "resources": [{
                "resource": "CarePlan",
                "relatedResourceId": "carePlans",
                "relatedResources": [
                    {"resource": "Task", "id": "itemTasks", "searchParameter": "based-on"}
                ]
            }],
            "registerCard": {"rules": [
                {"name": "taskCount", "actions": ["itemTasks.size()"]}
            ]}
        }))
        .unwrap();
        let materializer = materializer();
        let params = HashMap::new();

        let items: Vec<ResourceData> = materializer
            .materialize(&list, &related, &ComputedValues::new(), &params)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(items[0].computed_value("taskCount"), Some(&Value::from(2i64)));
    }

    #[tokio::test]
    async fn test_unknown_relation_key_yields_no_items() {
        let materializer = materializer();
        let list = list();
        let items: Vec<ResourceData> = materializer
            .materialize(&list, &RelatedResourcesMap::new(), &ComputedValues::new(), &HashMap::new())
            .try_collect()
            .await
            .unwrap();
        assert!(items.is_empty());
    }
}
