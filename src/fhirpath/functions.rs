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

//! FHIRPath functions used by register configuration

use super::context::EvaluationContext;
use super::engine::{FhirPathEngine, to_boolean};
use crate::ast::ExpressionNode;
use crate::evaluator::error::{EvaluationError, EvaluationResult, check_arity};
use crate::evaluator::operations;
use crate::model::Value;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::str::FromStr;

/// Call a function on a focus collection
pub(super) fn call(
    engine: &FhirPathEngine,
    name: &str,
    args: &[ExpressionNode],
    focus: Vec<Value>,
    context: &EvaluationContext<'_>,
) -> EvaluationResult<Vec<Value>> {
    match name {
        // Filtering and projection
        "where" => {
            check_arity(name, args.len(), 1, 1)?;
            let mut result = Vec::new();
            for item in focus {
                let criteria = engine.evaluate_with_context(&args[0], &context.with_this(item.clone()))?;
                if to_boolean(&criteria)? == Some(true) {
                    result.push(item);
                }
            }
            Ok(result)
        }
        "select" => {
            check_arity(name, args.len(), 1, 1)?;
            let mut result = Vec::new();
            for item in focus {
                result.extend(engine.evaluate_with_context(&args[0], &context.with_this(item))?);
            }
            Ok(result)
        }
        "all" => {
            check_arity(name, args.len(), 1, 1)?;
            for item in focus {
                let criteria = engine.evaluate_with_context(&args[0], &context.with_this(item))?;
                if to_boolean(&criteria)? != Some(true) {
                    return Ok(vec![Value::Boolean(false)]);
                }
            }
            Ok(vec![Value::Boolean(true)])
        }
        "ofType" => {
            check_arity(name, args.len(), 1, 1)?;
            let type_name = type_argument(&args[0])?;
            Ok(focus
                .into_iter()
                .filter(|item| is_of_type(item, &type_name))
                .collect())
        }
        "is" => {
            check_arity(name, args.len(), 1, 1)?;
            let type_name = type_argument(&args[0])?;
            Ok(single(name, &focus)?
                .map(|item| Value::Boolean(is_of_type(item, &type_name)))
                .into_iter()
                .collect())
        }
        "iif" => {
            check_arity(name, args.len(), 2, 3)?;
            let criterion_context = context.with_input(focus);
            let criterion = engine.evaluate_with_context(&args[0], &criterion_context)?;
            if to_boolean(&criterion)? == Some(true) {
                engine.evaluate_with_context(&args[1], &criterion_context)
            } else if let Some(otherwise) = args.get(2) {
                engine.evaluate_with_context(otherwise, &criterion_context)
            } else {
                Ok(Vec::new())
            }
        }

        // Existence
        "exists" => {
            check_arity(name, args.len(), 0, 1)?;
            let focus = match args.first() {
                Some(criteria) => call(engine, "where", std::slice::from_ref(criteria), focus, context)?,
                None => focus,
            };
            Ok(vec![Value::Boolean(!focus.is_empty())])
        }
        "empty" => {
            check_arity(name, args.len(), 0, 0)?;
            Ok(vec![Value::Boolean(focus.is_empty())])
        }
        "count" => {
            check_arity(name, args.len(), 0, 0)?;
            Ok(vec![Value::from(focus.len())])
        }
        "not" => {
            check_arity(name, args.len(), 0, 0)?;
            Ok(to_boolean(&focus)?
                .map(|b| Value::Boolean(!b))
                .into_iter()
                .collect())
        }
        "hasValue" => {
            check_arity(name, args.len(), 0, 0)?;
            let has_value = matches!(
                focus.as_slice(),
                [item] if !matches!(item, Value::Element(_) | Value::Resource(_) | Value::Null)
            );
            Ok(vec![Value::Boolean(has_value)])
        }

        // Subsetting
        "first" => {
            check_arity(name, args.len(), 0, 0)?;
            Ok(focus.into_iter().take(1).collect())
        }
        "last" => {
            check_arity(name, args.len(), 0, 0)?;
            Ok(focus.into_iter().last().into_iter().collect())
        }
        "tail" => {
            check_arity(name, args.len(), 0, 0)?;
            Ok(focus.into_iter().skip(1).collect())
        }
        "skip" | "take" => {
            check_arity(name, args.len(), 1, 1)?;
            let n = integer_argument(engine, name, &args[0], context)?;
            let n = usize::try_from(n).unwrap_or(0);
            Ok(if name == "skip" {
                focus.into_iter().skip(n).collect()
            } else {
                focus.into_iter().take(n).collect()
            })
        }
        "single" => {
            check_arity(name, args.len(), 0, 0)?;
            Ok(single(name, &focus)?.cloned().into_iter().collect())
        }
        "distinct" => {
            check_arity(name, args.len(), 0, 0)?;
            let mut result: Vec<Value> = Vec::with_capacity(focus.len());
            for item in focus {
                if !result.iter().any(|seen| operations::values_equal(seen, &item)) {
                    result.push(item);
                }
            }
            Ok(result)
        }

        // Strings
        "contains" | "startsWith" | "endsWith" | "matches" => {
            check_arity(name, args.len(), 1, 1)?;
            let Some(text) = single_string(name, &focus)? else {
                return Ok(Vec::new());
            };
            let Some(pattern) = string_argument(engine, name, &args[0], context)? else {
                return Ok(Vec::new());
            };
            let result = match name {
                "contains" => text.contains(pattern.as_str()),
                "startsWith" => text.starts_with(pattern.as_str()),
                "endsWith" => text.ends_with(pattern.as_str()),
                _ => Regex::new(&pattern)
                    .map_err(|e| EvaluationError::invalid(format!("invalid regex: {e}")))?
                    .is_match(&text),
            };
            Ok(vec![Value::Boolean(result)])
        }
        "lower" | "upper" | "trim" | "length" => {
            check_arity(name, args.len(), 0, 0)?;
            let Some(text) = single_string(name, &focus)? else {
                return Ok(Vec::new());
            };
            Ok(vec![match name {
                "lower" => Value::String(text.to_lowercase()),
                "upper" => Value::String(text.to_uppercase()),
                "trim" => Value::String(text.trim().to_string()),
                _ => Value::from(text.chars().count()),
            }])
        }
        "substring" => {
            check_arity(name, args.len(), 1, 2)?;
            let Some(text) = single_string(name, &focus)? else {
                return Ok(Vec::new());
            };
            let start = usize::try_from(integer_argument(engine, name, &args[0], context)?).unwrap_or(0);
            let length = match args.get(1) {
                Some(arg) => usize::try_from(integer_argument(engine, name, arg, context)?).unwrap_or(0),
                None => usize::MAX,
            };
            Ok(vec![Value::String(text.chars().skip(start).take(length).collect())])
        }
        "replace" => {
            check_arity(name, args.len(), 2, 2)?;
            let Some(text) = single_string(name, &focus)? else {
                return Ok(Vec::new());
            };
            let pattern = string_argument(engine, name, &args[0], context)?.unwrap_or_default();
            let substitution = string_argument(engine, name, &args[1], context)?.unwrap_or_default();
            Ok(vec![Value::String(text.replace(&pattern, &substitution))])
        }
        "join" => {
            check_arity(name, args.len(), 0, 1)?;
            let separator = match args.first() {
                Some(arg) => string_argument(engine, name, arg, context)?.unwrap_or_default(),
                None => String::new(),
            };
            let parts: Vec<String> = focus.iter().map(ToString::to_string).collect();
            Ok(vec![Value::String(parts.join(&separator))])
        }

        // Conversion
        "toString" => {
            check_arity(name, args.len(), 0, 0)?;
            Ok(single(name, &focus)?
                .map(|item| Value::String(item.to_string()))
                .into_iter()
                .collect())
        }
        "toInteger" => {
            check_arity(name, args.len(), 0, 0)?;
            Ok(single(name, &focus)?.and_then(to_integer).into_iter().collect())
        }
        "toDecimal" => {
            check_arity(name, args.len(), 0, 0)?;
            Ok(single(name, &focus)?
                .and_then(|item| match item {
                    Value::Integer(_) | Value::Decimal(_) => item.as_decimal(),
                    Value::String(s) => Decimal::from_str(s.trim()).ok(),
                    Value::Boolean(b) => Some(Decimal::from(u8::from(*b))),
                    _ => None,
                })
                .map(Value::Decimal)
                .into_iter()
                .collect())
        }
        "toDate" => {
            check_arity(name, args.len(), 0, 0)?;
            Ok(single(name, &focus)?
                .and_then(operations::as_date)
                .map(Value::Date)
                .into_iter()
                .collect())
        }

        // Clock
        "today" => {
            check_arity(name, args.len(), 0, 0)?;
            Ok(vec![Value::Date(engine.today())])
        }
        "now" => {
            check_arity(name, args.len(), 0, 0)?;
            Ok(vec![Value::DateTime(chrono::Local::now().fixed_offset())])
        }

        _ => Err(EvaluationError::UnknownFunction {
            name: name.to_string(),
        }),
    }
}

fn single<'v>(name: &str, focus: &'v [Value]) -> EvaluationResult<Option<&'v Value>> {
    match focus {
        [] => Ok(None),
        [item] => Ok(Some(item)),
        _ => Err(EvaluationError::invalid(format!(
            "{name}() requires a single item, found {}",
            focus.len()
        ))),
    }
}

fn single_string(name: &str, focus: &[Value]) -> EvaluationResult<Option<String>> {
    Ok(single(name, focus)?.map(|item| item.to_string()))
}

fn string_argument(
    engine: &FhirPathEngine,
    name: &str,
    arg: &ExpressionNode,
    context: &EvaluationContext<'_>,
) -> EvaluationResult<Option<String>> {
    let value = engine.evaluate_with_context(arg, context)?;
    single_string(name, &value)
}

fn integer_argument(
    engine: &FhirPathEngine,
    name: &str,
    arg: &ExpressionNode,
    context: &EvaluationContext<'_>,
) -> EvaluationResult<i64> {
    let value = engine.evaluate_with_context(arg, context)?;
    match single(name, &value)? {
        Some(Value::Integer(i)) => Ok(*i),
        Some(other) => Err(EvaluationError::type_error("Integer", other.type_name())),
        None => Err(EvaluationError::invalid(format!(
            "{name}() requires an integer argument"
        ))),
    }
}

fn to_integer(item: &Value) -> Option<Value> {
    match item {
        Value::Integer(i) => Some(Value::Integer(*i)),
        Value::Boolean(b) => Some(Value::Integer(i64::from(*b))),
        Value::String(s) => s.trim().parse::<i64>().ok().map(Value::Integer),
        Value::Decimal(d) if d.fract().is_zero() => d.to_i64().map(Value::Integer),
        _ => None,
    }
}

/// Type name passed to `ofType`/`is`, written as an identifier
fn type_argument(arg: &ExpressionNode) -> EvaluationResult<String> {
    match arg {
        ExpressionNode::Identifier(name) => Ok(name.clone()),
        ExpressionNode::Path { base, path } => match base.as_identifier() {
            Some(namespace) => Ok(format!("{namespace}.{path}")),
            None => Err(EvaluationError::invalid("expected a type name")),
        },
        _ => Err(EvaluationError::invalid("expected a type name")),
    }
}

/// Check an item against a FHIR or System type name
///
/// Complex data types carry no type tag in JSON, so they are recognised by
/// their characteristic fields.
pub(crate) fn is_of_type(item: &Value, type_name: &str) -> bool {
    let type_name = type_name
        .strip_prefix("System.")
        .or_else(|| type_name.strip_prefix("FHIR."))
        .unwrap_or(type_name);

    match item {
        Value::Resource(resource) => {
            resource.resource_type() == type_name
                || matches!(type_name, "Resource" | "DomainResource")
        }
        Value::Boolean(_) => type_name.eq_ignore_ascii_case("boolean"),
        Value::Integer(_) => matches!(
            type_name,
            "Integer" | "integer" | "positiveInt" | "unsignedInt"
        ),
        Value::Decimal(_) => type_name.eq_ignore_ascii_case("decimal"),
        Value::Date(_) => type_name.eq_ignore_ascii_case("date"),
        Value::DateTime(_) => matches!(type_name, "DateTime" | "dateTime" | "instant"),
        Value::String(text) => match type_name {
            "String" | "string" | "code" | "id" | "uri" | "url" | "canonical" | "markdown" => true,
            "Date" | "date" => text.len() <= 10 && operations::parse_date(text).is_some(),
            "DateTime" | "dateTime" => operations::parse_date(text).is_some(),
            _ => false,
        },
        Value::Element(json) => {
            let Some(obj) = json.as_object() else {
                return false;
            };
            let has = |key: &str| obj.contains_key(key);
            match type_name {
                "Quantity" | "Age" | "Duration" => {
                    has("value") && (has("unit") || has("code") || has("system"))
                }
                "CodeableConcept" => has("coding") || (has("text") && obj.len() == 1),
                "Coding" => has("code") && !has("value") && !has("coding"),
                "Reference" => has("reference") || (has("identifier") && has("type")),
                "Period" => has("start") || has("end"),
                "HumanName" => has("family") || has("given"),
                "Identifier" => has("system") && has("value") && !has("unit"),
                _ => false,
            }
        }
        Value::Null | Value::List(_) | Value::Namespace(_) => false,
    }
}
