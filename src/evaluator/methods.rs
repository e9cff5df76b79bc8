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

//! Methods callable on values in rule expressions (`tasks.size()`,
//! `name.toUpperCase()`)

use super::arguments::Arguments;
use super::error::{EvaluationError, EvaluationResult};
use super::operations::values_equal;
use crate::model::Value;
use regex::Regex;

/// Call a method on a non-null receiver
pub(super) fn call_method(receiver: &Value, method: &str, args: &[Value]) -> EvaluationResult<Value> {
    match method {
        "toString" => {
            Arguments::new(method, args, 0, 0)?;
            return Ok(Value::String(receiver.to_string()));
        }
        "equals" => {
            let args = Arguments::new(method, args, 1, 1)?;
            return Ok(Value::Boolean(values_equal(receiver, args.get(0))));
        }
        _ => {}
    }

    match receiver {
        Value::List(items) => list_method(items, method, args),
        Value::String(text) => string_method(text, method, args),
        other => Err(EvaluationError::unknown_method(other.type_name(), method)),
    }
}

fn list_method(items: &[Value], method: &str, args: &[Value]) -> EvaluationResult<Value> {
    match method {
        "size" => {
            Arguments::new(method, args, 0, 0)?;
            Ok(Value::from(items.len()))
        }
        "isEmpty" => {
            Arguments::new(method, args, 0, 0)?;
            Ok(Value::Boolean(items.is_empty()))
        }
        "get" => {
            let args = Arguments::new(method, args, 1, 1)?;
            let index = args.integer(0)?;
            usize::try_from(index)
                .ok()
                .and_then(|i| items.get(i))
                .cloned()
                .ok_or_else(|| {
                    EvaluationError::invalid(format!(
                        "index {index} out of bounds for list of size {}",
                        items.len()
                    ))
                })
        }
        "first" => {
            Arguments::new(method, args, 0, 0)?;
            Ok(items.first().cloned().unwrap_or(Value::Null))
        }
        "last" => {
            Arguments::new(method, args, 0, 0)?;
            Ok(items.last().cloned().unwrap_or(Value::Null))
        }
        "contains" => {
            let args = Arguments::new(method, args, 1, 1)?;
            Ok(Value::Boolean(
                items.iter().any(|item| values_equal(item, args.get(0))),
            ))
        }
        _ => Err(EvaluationError::unknown_method("List", method)),
    }
}

fn string_method(text: &str, method: &str, args: &[Value]) -> EvaluationResult<Value> {
    match method {
        "length" => {
            Arguments::new(method, args, 0, 0)?;
            Ok(Value::from(text.chars().count()))
        }
        "isEmpty" => {
            Arguments::new(method, args, 0, 0)?;
            Ok(Value::Boolean(text.is_empty()))
        }
        "toUpperCase" => {
            Arguments::new(method, args, 0, 0)?;
            Ok(Value::String(text.to_uppercase()))
        }
        "toLowerCase" => {
            Arguments::new(method, args, 0, 0)?;
            Ok(Value::String(text.to_lowercase()))
        }
        "trim" => {
            Arguments::new(method, args, 0, 0)?;
            Ok(Value::String(text.trim().to_string()))
        }
        "contains" | "startsWith" | "endsWith" => {
            let args = Arguments::new(method, args, 1, 1)?;
            let needle = args.text(0)?;
            Ok(Value::Boolean(match method {
                "contains" => text.contains(&needle),
                "startsWith" => text.starts_with(&needle),
                _ => text.ends_with(&needle),
            }))
        }
        "substring" => {
            let args = Arguments::new(method, args, 1, 2)?;
            let length = text.chars().count();
            let begin = args.integer(0)?;
            let end = if args.len() > 1 {
                args.integer(1)?
            } else {
                i64::try_from(length).unwrap_or(i64::MAX)
            };
            let (Ok(begin), Ok(end)) = (usize::try_from(begin), usize::try_from(end)) else {
                return Err(EvaluationError::invalid(format!(
                    "substring({begin}, {end}) out of range"
                )));
            };
            if begin > end || end > length {
                return Err(EvaluationError::invalid(format!(
                    "substring({begin}, {end}) out of range for length {length}"
                )));
            }
            Ok(Value::String(
                text.chars().skip(begin).take(end - begin).collect(),
            ))
        }
        "replace" => {
            let args = Arguments::new(method, args, 2, 2)?;
            Ok(Value::String(text.replace(&args.text(0)?, &args.text(1)?)))
        }
        "split" => {
            let args = Arguments::new(method, args, 1, 1)?;
            let separator = args.text(0)?;
            Ok(Value::list(
                text.split(separator.as_str())
                    .map(|part| Value::String(part.to_string())),
            ))
        }
        "matches" => {
            let args = Arguments::new(method, args, 1, 1)?;
            let pattern = format!("^(?:{})$", args.text(0)?);
            let regex = Regex::new(&pattern)
                .map_err(|e| EvaluationError::invalid(format!("invalid regex: {e}")))?;
            Ok(Value::Boolean(regex.is_match(text)))
        }
        _ => Err(EvaluationError::unknown_method("String", method)),
    }
}
