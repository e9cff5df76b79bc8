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

//! Register helper functions bound as `service`
//!
//! These read the session's facts and evaluate FHIRPath against resources,
//! covering the lookups register configurations need most often: children
//! of a resource, the parent of a child, labels for matching resources, and
//! patient demographics.

use super::arguments::Arguments;
use super::dates::DEFAULT_DATE_FORMAT;
use super::error::{EvaluationError, EvaluationResult};
use crate::model::{DataType, Resource, SortConfig, SortOrder, Value, extract_logical_id};
use crate::session::Session;
use std::sync::Arc;

pub(super) fn call(function: &str, args: &[Value], session: &Session<'_>) -> EvaluationResult<Value> {
    match function {
        "retrieveRelatedResources" => {
            let args = Arguments::new(function, args, 3, 3)?;
            let resource = args.resource(0)?;
            let key = args.text(1)?;
            let expression = args.text(2)?;
            let related = retrieve_related_resources(session, resource, &key, &expression)?;
            Ok(Value::resources(&related))
        }
        "retrieveParentResource" => {
            let args = Arguments::new(function, args, 3, 3)?;
            let child = args.resource(0)?;
            let key = args.text(1)?;
            let expression = args.text(2)?;
            let parent_id =
                extract_logical_id(&session.fhir_path().extract_value(&Value::Resource(Arc::clone(child)), &expression)?);
            Ok(fact_resources(session, &key)
                .into_iter()
                .find(|candidate| candidate.logical_id() == parent_id)
                .map(Value::Resource)
                .unwrap_or(Value::Null))
        }
        "evaluateToBoolean" => {
            let args = Arguments::new(function, args, 2, 3)?;
            let resources = args.resources(0)?;
            let expression = args.text(1)?;
            let match_all = args.boolean_or(2, false)?;
            if args.get(0).is_null() {
                return Ok(Value::Boolean(false));
            }
            let mut outcomes = Vec::with_capacity(resources.len());
            for resource in &resources {
                outcomes.push(matches(session, resource, &expression)?);
            }
            Ok(Value::Boolean(if match_all {
                outcomes.iter().all(|matched| *matched)
            } else {
                outcomes.iter().any(|matched| *matched)
            }))
        }
        "mapResourcesToLabeledCSV" | "mapResourceToLabeledCSV" => {
            let args = Arguments::new(function, args, 3, 3)?;
            if args.get(0).is_null() {
                return Ok(Value::Null);
            }
            let resources = args.resources(0)?;
            let expression = args.text(1)?;
            let label = args.text(2)?;
            let mut labels = Vec::new();
            for resource in &resources {
                if matches(session, resource, &expression)? {
                    labels.push(label.as_str());
                }
            }
            Ok(Value::String(labels.join(",")))
        }
        "filterResources" => {
            let args = Arguments::new(function, args, 2, 2)?;
            let resources = args.resources(0)?;
            let expression = args.text(1)?;
            let kept = session
                .fhir_path()
                .filter_resources(resources, &expression, session.output())?;
            Ok(Value::resources(&kept))
        }
        "sortResources" => {
            let args = Arguments::new(function, args, 2, 4)?;
            let mut resources = args.resources(0)?;
            let sort = SortConfig::new(
                args.text(1)?,
                parse_data_type(args.optional_text(2)?.as_deref())?,
                parse_sort_order(args.optional_text(3)?.as_deref())?,
            );
            session.fhir_path().sort_resources(&mut resources, &sort)?;
            Ok(Value::resources(&resources))
        }
        "extractAge" => {
            let args = Arguments::new(function, args, 1, 1)?;
            let patient = args.resource(0)?;
            Ok(Value::String(
                birth_date(session, patient)
                    .map(|date| session.dates().age(date))
                    .unwrap_or_default(),
            ))
        }
        "extractGender" => {
            let args = Arguments::new(function, args, 1, 1)?;
            let patient = args.resource(0)?;
            let label = match patient.get_property("gender").and_then(|g| g.as_str()) {
                Some("male") => "Male",
                Some("female") => "Female",
                Some("other") => "Other",
                Some("unknown") => "Unknown",
                _ => "",
            };
            Ok(Value::from(label))
        }
        "extractDOB" => {
            let args = Arguments::new(function, args, 2, 2)?;
            let patient = args.resource(0)?;
            let pattern = args.text(1)?;
            Ok(Value::String(
                birth_date(session, patient)
                    .map(|date| session.dates().format(date, &pattern))
                    .unwrap_or_default(),
            ))
        }
        "joinToString" => {
            let args = Arguments::new(function, args, 1, 2)?;
            let separator = args.optional_text(1)?.unwrap_or_else(|| ",".to_string());
            let parts: Vec<String> = args
                .get(0)
                .clone()
                .into_list()
                .into_iter()
                .filter(|item| !item.is_null())
                .map(|item| item.to_string())
                .collect();
            Ok(Value::String(parts.join(&separator)))
        }
        "translate" => {
            let args = Arguments::new(function, args, 1, 1)?;
            Ok(Value::String(args.text(0)?))
        }
        "formatDate" => {
            let args = Arguments::new(function, args, 2, 3)?;
            let output = args
                .optional_text(2)?
                .unwrap_or_else(|| DEFAULT_DATE_FORMAT.to_string());
            session
                .dates()
                .format_date(&args.text(0)?, &args.text(1)?, &output)
                .map(Value::String)
        }
        "prettifyDate" | "convertDateForDifference" => {
            let args = Arguments::new(function, args, 1, 1)?;
            let date = session.dates().parse(args.get(0))?;
            Ok(Value::String(session.dates().prettify(date)))
        }
        _ => Err(EvaluationError::unknown_method("service", function)),
    }
}

/// Resources under `key` whose reference at `expression` points at `resource`
fn retrieve_related_resources(
    session: &Session<'_>,
    resource: &Resource,
    key: &str,
    expression: &str,
) -> EvaluationResult<Vec<Arc<Resource>>> {
    let parent_id = resource.logical_id();
    let mut related = Vec::new();
    for candidate in fact_resources(session, key) {
        let reference = session
            .fhir_path()
            .extract_value(&Value::Resource(Arc::clone(&candidate)), expression)?;
        if extract_logical_id(&reference) == parent_id {
            related.push(candidate);
        }
    }
    Ok(related)
}

fn fact_resources(session: &Session<'_>, key: &str) -> Vec<Arc<Resource>> {
    session
        .fact(key)
        .map(Value::resource_items)
        .unwrap_or_default()
}

fn matches(session: &Session<'_>, resource: &Arc<Resource>, expression: &str) -> EvaluationResult<bool> {
    session.fhir_path().evaluate_boolean(
        &Value::Resource(Arc::clone(resource)),
        expression,
        session.output(),
    )
}

fn birth_date(session: &Session<'_>, patient: &Resource) -> Option<chrono::NaiveDate> {
    let birth_date = patient.get_property("birthDate")?.as_str()?;
    session.dates().parse(&Value::from(birth_date)).ok()
}

fn parse_data_type(text: Option<&str>) -> EvaluationResult<DataType> {
    Ok(match text.map(str::to_ascii_uppercase).as_deref() {
        None | Some("STRING") => DataType::String,
        Some("DATE") => DataType::Date,
        Some("DATETIME") | Some("DATE_TIME") => DataType::DateTime,
        Some("INTEGER") => DataType::Integer,
        Some("DECIMAL") => DataType::Decimal,
        Some("BOOLEAN") => DataType::Boolean,
        Some(other) => {
            return Err(EvaluationError::invalid(format!("unknown sort data type '{other}'")));
        }
    })
}

fn parse_sort_order(text: Option<&str>) -> EvaluationResult<SortOrder> {
    Ok(match text.map(str::to_ascii_uppercase).as_deref() {
        None | Some("ASCENDING") | Some("ASC") => SortOrder::Ascending,
        Some("DESCENDING") | Some("DESC") => SortOrder::Descending,
        Some(other) => {
            return Err(EvaluationError::invalid(format!("unknown sort order '{other}'")));
        }
    })
}
