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

//! Equality, ordering and arithmetic over [`Value`]
//!
//! Shared by the rule interpreter, the FHIRPath evaluator and resource sorting
//! so that `==` in a rule and `=` in a filter agree.

use super::error::{EvaluationError, EvaluationResult};
use crate::ast::BinaryOperator;
use crate::model::Value;
use chrono::{DateTime, NaiveDate};
use rust_decimal::Decimal;
use std::cmp::Ordering;

/// Parse a FHIR date or date-time string to a calendar date
///
/// Accepts `YYYY-MM-DD`, full date-times, and the partial forms `YYYY-MM`
/// and `YYYY` (first day of the period).
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim().trim_start_matches('@');
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(date_time) = DateTime::parse_from_rfc3339(text) {
        return Some(date_time.date_naive());
    }
    if text.len() > 10 && text.is_char_boundary(10) {
        if let Ok(date) = NaiveDate::parse_from_str(&text[..10], "%Y-%m-%d") {
            return Some(date);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{text}-01"), "%Y-%m-%d") {
        return Some(date);
    }
    NaiveDate::parse_from_str(&format!("{text}-01-01"), "%Y-%m-%d").ok()
}

/// Read a value as a calendar date
pub fn as_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Date(date) => Some(*date),
        Value::DateTime(date_time) => Some(date_time.date_naive()),
        Value::String(text) => parse_date(text),
        _ => None,
    }
}

/// Equality used by `==`, `!=`, `=` and membership tests
///
/// Numbers compare by value across integer and decimal. Dates compare with
/// date strings. Resources compare by identity (type and id).
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Integer(_) | Value::Decimal(_), Value::Integer(_) | Value::Decimal(_)) => {
            left.as_decimal() == right.as_decimal()
        }
        (Value::Date(_) | Value::DateTime(_), Value::String(_))
        | (Value::String(_), Value::Date(_) | Value::DateTime(_)) => {
            as_date(left).is_some() && as_date(left) == as_date(right)
        }
        (Value::Resource(a), Value::Resource(b)) => {
            a.resource_type() == b.resource_type() && a.logical_id() == b.logical_id()
        }
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        _ => left == right,
    }
}

/// Ordering used by comparison operators and sorting
///
/// Returns `None` for values that have no natural order between them.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
        (Value::Integer(_) | Value::Decimal(_), Value::Integer(_) | Value::Decimal(_)) => {
            Some(left.as_decimal()?.cmp(&right.as_decimal()?))
        }
        (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
        (Value::Date(_) | Value::DateTime(_), _) | (_, Value::Date(_) | Value::DateTime(_)) => {
            Some(as_date(left)?.cmp(&as_date(right)?))
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// How `/` treats two integers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerDivision {
    /// Truncate to an integer (rule expressions)
    Truncate,
    /// Produce a decimal (FHIRPath)
    Decimal,
}

fn overflow(op: BinaryOperator) -> EvaluationError {
    EvaluationError::invalid(format!("arithmetic overflow in '{op}'"))
}

/// Apply an arithmetic operator
///
/// `+` concatenates when either operand is a string.
pub fn arithmetic(
    op: BinaryOperator,
    left: &Value,
    right: &Value,
    division: IntegerDivision,
) -> EvaluationResult<Value> {
    if op == BinaryOperator::Add
        && (matches!(left, Value::String(_)) || matches!(right, Value::String(_)))
    {
        return Ok(Value::String(format!("{left}{right}")));
    }

    if let (Value::Integer(a), Value::Integer(b)) = (left, right) {
        let (a, b) = (*a, *b);
        let result = match op {
            BinaryOperator::Add => a.checked_add(b),
            BinaryOperator::Subtract => a.checked_sub(b),
            BinaryOperator::Multiply => a.checked_mul(b),
            BinaryOperator::Divide if division == IntegerDivision::Decimal => {
                if b == 0 {
                    return Err(EvaluationError::DivisionByZero);
                }
                return Decimal::from(a)
                    .checked_div(Decimal::from(b))
                    .map(Value::Decimal)
                    .ok_or_else(|| overflow(op));
            }
            BinaryOperator::Divide | BinaryOperator::IntegerDivide => {
                if b == 0 {
                    return Err(EvaluationError::DivisionByZero);
                }
                a.checked_div(b)
            }
            BinaryOperator::Modulo => {
                if b == 0 {
                    return Err(EvaluationError::DivisionByZero);
                }
                a.checked_rem(b)
            }
            _ => return Err(EvaluationError::invalid(format!("'{op}' is not arithmetic"))),
        };
        return result.map(Value::Integer).ok_or_else(|| overflow(op));
    }

    let (Some(a), Some(b)) = (left.as_decimal(), right.as_decimal()) else {
        let offending = if left.as_decimal().is_none() { left } else { right };
        return Err(EvaluationError::type_error("number", offending.type_name()));
    };

    let result = match op {
        BinaryOperator::Add => a.checked_add(b),
        BinaryOperator::Subtract => a.checked_sub(b),
        BinaryOperator::Multiply => a.checked_mul(b),
        BinaryOperator::Divide | BinaryOperator::IntegerDivide | BinaryOperator::Modulo
            if b.is_zero() =>
        {
            return Err(EvaluationError::DivisionByZero);
        }
        BinaryOperator::Divide => a.checked_div(b),
        BinaryOperator::IntegerDivide => {
            return a
                .checked_div(b)
                .map(|quotient| quotient.trunc())
                .and_then(|quotient| i64::try_from(quotient).ok())
                .map(Value::Integer)
                .ok_or_else(|| overflow(op));
        }
        BinaryOperator::Modulo => a.checked_rem(b),
        _ => return Err(EvaluationError::invalid(format!("'{op}' is not arithmetic"))),
    };
    result
        .map(|d| Value::Decimal(d.normalize()))
        .ok_or_else(|| overflow(op))
}

/// Negate a number
pub fn negate(value: &Value) -> EvaluationResult<Value> {
    match value {
        Value::Integer(i) => i
            .checked_neg()
            .map(Value::Integer)
            .ok_or_else(|| EvaluationError::invalid("arithmetic overflow in negation")),
        Value::Decimal(d) => Ok(Value::Decimal(-*d)),
        other => Err(EvaluationError::type_error("number", other.type_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("2024-03-05", Some((2024, 3, 5)))]
    #[case("2024-03-05T10:15:00+02:00", Some((2024, 3, 5)))]
    #[case("2024-03-05T10:15:00", Some((2024, 3, 5)))]
    #[case("2024-03", Some((2024, 3, 1)))]
    #[case("2024", Some((2024, 1, 1)))]
    #[case("@2024-03-05", Some((2024, 3, 5)))]
    #[case("soon", None)]
    fn test_parse_date(#[case] input: &str, #[case] expected: Option<(i32, u32, u32)>) {
        let expected = expected.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d));
        assert_eq!(parse_date(input), expected);
    }

    #[test]
    fn test_numeric_equality_across_types() {
        assert!(values_equal(
            &Value::Integer(2),
            &Value::Decimal(Decimal::new(20, 1))
        ));
        assert!(!values_equal(&Value::Integer(2), &Value::String("2".into())));
        assert!(values_equal(&Value::Null, &Value::Null));
        assert!(!values_equal(&Value::Null, &Value::Integer(0)));
    }

    #[test]
    fn test_date_comparison_with_strings() {
        let date = Value::Date(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap());
        assert_eq!(
            compare_values(&date, &Value::String("2024-01-09".into())),
            Some(Ordering::Greater)
        );
        assert!(values_equal(&date, &Value::String("2024-01-10".into())));
        assert_eq!(
            compare_values(&Value::String("b".into()), &Value::Integer(1)),
            None
        );
    }

    #[rstest]
    #[case(BinaryOperator::Add, 5, 2, IntegerDivision::Truncate, Value::Integer(7))]
    #[case(BinaryOperator::Divide, 5, 2, IntegerDivision::Truncate, Value::Integer(2))]
    #[case(BinaryOperator::Divide, 5, 2, IntegerDivision::Decimal, Value::Decimal(Decimal::new(25, 1)))]
    #[case(BinaryOperator::Modulo, 7, 3, IntegerDivision::Truncate, Value::Integer(1))]
    #[case(BinaryOperator::Multiply, 5, 2, IntegerDivision::Truncate, Value::Integer(10))]
    fn test_integer_arithmetic(
        #[case] op: BinaryOperator,
        #[case] a: i64,
        #[case] b: i64,
        #[case] division: IntegerDivision,
        #[case] expected: Value,
    ) {
        assert_eq!(
            arithmetic(op, &Value::Integer(a), &Value::Integer(b), division).unwrap(),
            expected
        );
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(
            arithmetic(
                BinaryOperator::Add,
                &Value::from("Age: "),
                &Value::Integer(4),
                IntegerDivision::Truncate
            )
            .unwrap(),
            Value::from("Age: 4")
        );
    }

    #[test]
    fn test_arithmetic_errors() {
        assert_eq!(
            arithmetic(
                BinaryOperator::Divide,
                &Value::Integer(1),
                &Value::Integer(0),
                IntegerDivision::Truncate
            ),
            Err(EvaluationError::DivisionByZero)
        );
        assert!(matches!(
            arithmetic(
                BinaryOperator::Multiply,
                &Value::Boolean(true),
                &Value::Integer(2),
                IntegerDivision::Truncate
            ),
            Err(EvaluationError::TypeError { .. })
        ));
        assert!(negate(&Value::Integer(i64::MIN)).is_err());
    }
}
