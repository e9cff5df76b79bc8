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

//! Utility namespaces bound into every session
//!
//! `StringUtils` functions are null-safe in the Apache Commons manner: a null
//! input gives a null (or `false`) result instead of an error.

use super::arguments::Arguments;
use super::dates::DEFAULT_DATE_FORMAT;
use super::error::{EvaluationError, EvaluationResult};
use super::operations::{compare_values, negate};
use super::service;
use crate::model::{Namespace, Value};
use crate::session::Session;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::RoundingStrategy;

/// Call a function of a namespace
pub(super) fn call_namespace(
    namespace: Namespace,
    function: &str,
    args: &[Value],
    session: &mut Session<'_>,
) -> EvaluationResult<Value> {
    match namespace {
        Namespace::Data => data(function, args, session),
        Namespace::FhirPath => fhir_path(function, args, session),
        Namespace::Service => service::call(function, args, session),
        Namespace::Dates => dates(function, args, session),
        Namespace::StringUtils => string_utils(function, args),
        Namespace::Math => math(function, args),
    }
}

fn data(function: &str, args: &[Value], session: &mut Session<'_>) -> EvaluationResult<Value> {
    match function {
        "put" => {
            let args = Arguments::new(function, args, 2, 2)?;
            let key = args.text(0)?;
            session.put(key, args.get(1).clone());
            Ok(Value::Null)
        }
        "get" => {
            let args = Arguments::new(function, args, 1, 1)?;
            let key = args.text(0)?;
            Ok(session.get(&key).cloned().unwrap_or(Value::Null))
        }
        "containsKey" => {
            let args = Arguments::new(function, args, 1, 1)?;
            let key = args.text(0)?;
            Ok(Value::Boolean(session.get(&key).is_some()))
        }
        _ => Err(EvaluationError::unknown_method("data", function)),
    }
}

fn fhir_path(function: &str, args: &[Value], session: &Session<'_>) -> EvaluationResult<Value> {
    if !matches!(function, "extractValue" | "extractData" | "evaluateBoolean") {
        return Err(EvaluationError::unknown_method("fhirPath", function));
    }
    let parsed = Arguments::new(function, args, 2, 2)?;
    let input = parsed.get(0);
    let expression = parsed.text(1)?;
    let extractor = session.fhir_path();

    match function {
        "extractValue" => {
            if input.is_null() {
                return Ok(Value::String(String::new()));
            }
            extractor.extract_value(input, &expression).map(Value::String)
        }
        "extractData" => {
            if input.is_null() {
                return Ok(Value::List(Vec::new()));
            }
            extractor.extract_data(input, &expression).map(Value::List)
        }
        _ => {
            if input.is_null() {
                return Ok(Value::Boolean(false));
            }
            extractor
                .evaluate_boolean(input, &expression, session.output())
                .map(Value::Boolean)
        }
    }
}

fn dates(function: &str, args: &[Value], session: &Session<'_>) -> EvaluationResult<Value> {
    let dates = session.dates();
    match function {
        "today" => {
            Arguments::new(function, args, 0, 0)?;
            Ok(Value::Date(dates.today()))
        }
        "parse" => {
            let args = Arguments::new(function, args, 1, 1)?;
            dates.parse(args.get(0)).map(Value::Date)
        }
        "daysBetween" => {
            let args = Arguments::new(function, args, 2, 2)?;
            let from = dates.parse(args.get(0))?;
            let to = dates.parse(args.get(1))?;
            Ok(Value::Integer(dates.days_between(from, to)))
        }
        "isBefore" | "isAfter" => {
            let args = Arguments::new(function, args, 2, 2)?;
            let a = dates.parse(args.get(0))?;
            let b = dates.parse(args.get(1))?;
            Ok(Value::Boolean(if function == "isBefore" { a < b } else { a > b }))
        }
        "plusDays" => {
            let args = Arguments::new(function, args, 2, 2)?;
            let date = dates.parse(args.get(0))?;
            dates.plus_days(date, args.integer(1)?).map(Value::Date)
        }
        "formatDate" => {
            let args = Arguments::new(function, args, 2, 3)?;
            let output = args
                .optional_text(2)?
                .unwrap_or_else(|| DEFAULT_DATE_FORMAT.to_string());
            match args.get(0) {
                Value::String(input) => dates
                    .format_date(input, &args.text(1)?, &output)
                    .map(Value::String),
                other => {
                    let date = dates.parse(other)?;
                    Ok(Value::String(dates.format(date, &output)))
                }
            }
        }
        "prettifyDate" => {
            let args = Arguments::new(function, args, 1, 1)?;
            let date = dates.parse(args.get(0))?;
            Ok(Value::String(dates.prettify(date)))
        }
        "age" => {
            let args = Arguments::new(function, args, 1, 1)?;
            let date = dates.parse(args.get(0))?;
            Ok(Value::String(dates.age(date)))
        }
        _ => Err(EvaluationError::unknown_method("dates", function)),
    }
}

fn string_utils(function: &str, args: &[Value]) -> EvaluationResult<Value> {
    match function {
        "upperCase" | "lowerCase" | "capitalize" | "trim" => {
            let args = Arguments::new(function, args, 1, 1)?;
            let Some(text) = args.optional_text(0)? else {
                return Ok(Value::Null);
            };
            let result = match function {
                "upperCase" => text.to_uppercase(),
                "lowerCase" => text.to_lowercase(),
                "trim" => text.trim().to_string(),
                _ => capitalize(&text),
            };
            Ok(Value::String(result))
        }
        "isBlank" | "isNotBlank" | "isEmpty" | "isNotEmpty" => {
            let args = Arguments::new(function, args, 1, 1)?;
            let text = args.optional_text(0)?.unwrap_or_default();
            let result = match function {
                "isBlank" => text.trim().is_empty(),
                "isNotBlank" => !text.trim().is_empty(),
                "isEmpty" => text.is_empty(),
                _ => !text.is_empty(),
            };
            Ok(Value::Boolean(result))
        }
        "defaultString" => {
            let args = Arguments::new(function, args, 1, 2)?;
            match args.optional_text(0)? {
                Some(text) => Ok(Value::String(text)),
                None => Ok(Value::String(args.optional_text(1)?.unwrap_or_default())),
            }
        }
        "join" => {
            let args = Arguments::new(function, args, 1, 2)?;
            let separator = args.optional_text(1)?.unwrap_or_default();
            let parts: Vec<String> = args
                .get(0)
                .clone()
                .into_list()
                .iter()
                .map(ToString::to_string)
                .collect();
            Ok(Value::String(parts.join(&separator)))
        }
        "abbreviate" => {
            let args = Arguments::new(function, args, 2, 2)?;
            let Some(text) = args.optional_text(0)? else {
                return Ok(Value::Null);
            };
            let max_width = usize::try_from(args.integer(1)?).unwrap_or(0);
            if max_width < 4 {
                return Err(EvaluationError::invalid("minimum abbreviation width is 4"));
            }
            if text.chars().count() <= max_width {
                return Ok(Value::String(text));
            }
            let mut abbreviated: String = text.chars().take(max_width - 3).collect();
            abbreviated.push_str("...");
            Ok(Value::String(abbreviated))
        }
        _ => Err(EvaluationError::unknown_method("StringUtils", function)),
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn math(function: &str, args: &[Value]) -> EvaluationResult<Value> {
    match function {
        "max" | "min" => {
            let args = Arguments::new(function, args, 2, 2)?;
            let (a, b) = (number(args.get(0))?, number(args.get(1))?);
            let ordering = compare_values(a, b)
                .ok_or_else(|| EvaluationError::type_error("number", b.type_name()))?;
            let pick_first = if function == "max" {
                ordering.is_ge()
            } else {
                ordering.is_le()
            };
            Ok(if pick_first { a.clone() } else { b.clone() })
        }
        "abs" => {
            let args = Arguments::new(function, args, 1, 1)?;
            let value = number(args.get(0))?;
            match value {
                Value::Integer(i) if *i < 0 => negate(value),
                Value::Decimal(d) => Ok(Value::Decimal(d.abs())),
                other => Ok(other.clone()),
            }
        }
        "round" | "floor" | "ceil" => {
            let args = Arguments::new(function, args, 1, 1)?;
            match number(args.get(0))? {
                Value::Decimal(d) => {
                    let rounded = match function {
                        "round" => d.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero),
                        "floor" => d.floor(),
                        _ => d.ceil(),
                    };
                    rounded
                        .to_i64()
                        .map(Value::Integer)
                        .ok_or_else(|| EvaluationError::invalid(format!("{d} out of range")))
                }
                other => Ok(other.clone()),
            }
        }
        _ => Err(EvaluationError::unknown_method("Math", function)),
    }
}

fn number(value: &Value) -> EvaluationResult<&Value> {
    match value {
        Value::Integer(_) | Value::Decimal(_) => Ok(value),
        Value::Null => Err(EvaluationError::missing("number")),
        other => Err(EvaluationError::type_error("number", other.type_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal::Decimal;

    #[rstest]
    #[case("capitalize", vec![Value::from("jane")], Value::from("Jane"))]
    #[case("upperCase", vec![Value::Null], Value::Null)]
    #[case("isBlank", vec![Value::from("  ")], Value::Boolean(true))]
    #[case("isBlank", vec![Value::Null], Value::Boolean(true))]
    #[case("isNotBlank", vec![Value::from("x")], Value::Boolean(true))]
    #[case("defaultString", vec![Value::Null, Value::from("n/a")], Value::from("n/a"))]
    #[case("abbreviate", vec![Value::from("Abbreviation"), Value::Integer(7)], Value::from("Abbr..."))]
    #[case("join", vec![Value::list([Value::from("a"), Value::Integer(1)]), Value::from("|")], Value::from("a|1"))]
    fn test_string_utils(#[case] function: &str, #[case] args: Vec<Value>, #[case] expected: Value) {
        assert_eq!(string_utils(function, &args).unwrap(), expected);
    }

    #[rstest]
    #[case("max", vec![Value::Integer(3), Value::Integer(7)], Value::Integer(7))]
    #[case("min", vec![Value::Integer(3), Value::Decimal(Decimal::new(25, 1))], Value::Decimal(Decimal::new(25, 1)))]
    #[case("abs", vec![Value::Integer(-4)], Value::Integer(4))]
    #[case("round", vec![Value::Decimal(Decimal::new(25, 1))], Value::Integer(3))]
    #[case("floor", vec![Value::Decimal(Decimal::new(-25, 1))], Value::Integer(-3))]
    #[case("ceil", vec![Value::Decimal(Decimal::new(21, 1))], Value::Integer(3))]
    fn test_math(#[case] function: &str, #[case] args: Vec<Value>, #[case] expected: Value) {
        assert_eq!(math(function, &args).unwrap(), expected);
    }

    #[test]
    fn test_math_errors() {
        assert!(math("max", &[Value::Null, Value::Integer(1)])
            .unwrap_err()
            .is_missing_binding());
        assert!(matches!(
            math("abs", &[Value::from("x")]),
            Err(EvaluationError::TypeError { .. })
        ));
        assert!(matches!(
            math("pow", &[]),
            Err(EvaluationError::UnknownMethod { .. })
        ));
    }
}
