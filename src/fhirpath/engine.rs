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

//! FHIRPath evaluation over JSON resources
//!
//! Every expression evaluates to a collection. Navigation flattens arrays and
//! drops absent members, so a missing field yields the empty collection rather
//! than an error.

use super::context::EvaluationContext;
use super::functions;
use crate::ast::{BinaryOperator, ExpressionNode, LiteralValue, UnaryOperator};
use crate::evaluator::error::{EvaluationError, EvaluationResult};
use crate::evaluator::operations::{self, IntegerDivision};
use crate::model::Value;
use chrono::{DateTime, NaiveDate};
use rust_decimal::Decimal;
use std::str::FromStr;

/// FHIRPath evaluation engine
#[derive(Debug, Clone, Copy, Default)]
pub struct FhirPathEngine {
    /// Date returned by `today()`; the local date when unset
    today: Option<NaiveDate>,
}

impl FhirPathEngine {
    /// Create an engine using the local clock
    pub fn new() -> Self {
        Self { today: None }
    }

    /// Create an engine with a fixed `today()`
    pub fn with_today(today: Option<NaiveDate>) -> Self {
        Self { today }
    }

    /// Date used by `today()`
    pub fn today(&self) -> NaiveDate {
        self.today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    /// Evaluate with explicit context
    pub fn evaluate_with_context(
        &self,
        expression: &ExpressionNode,
        context: &EvaluationContext<'_>,
    ) -> EvaluationResult<Vec<Value>> {
        match expression {
            ExpressionNode::Literal(literal) => self.evaluate_literal(literal),

            ExpressionNode::Identifier(name) => Ok(navigate(&context.input, name, true)),

            ExpressionNode::Variable(name) => context
                .get_variable(name)
                .ok_or_else(|| EvaluationError::missing(format!("%{name}"))),

            ExpressionNode::Path { base, path } => {
                let base = self.evaluate_with_context(base, context)?;
                Ok(navigate(&base, path, false))
            }

            ExpressionNode::FunctionCall(call) => functions::call(
                self,
                &call.name,
                &call.args,
                context.input.clone(),
                context,
            ),

            ExpressionNode::MethodCall(call) => {
                let focus = self.evaluate_with_context(&call.base, context)?;
                functions::call(self, &call.method, &call.args, focus, context)
            }

            ExpressionNode::BinaryOp(data) => {
                self.evaluate_binary_op(data.op, &data.left, &data.right, context)
            }

            ExpressionNode::UnaryOp { op, operand } => {
                self.evaluate_unary_op(*op, operand, context)
            }

            ExpressionNode::Index { base, index } => {
                let base = self.evaluate_with_context(base, context)?;
                let index = self.evaluate_with_context(index, context)?;
                let position = match index.as_slice() {
                    [Value::Integer(i)] => *i,
                    [] => return Ok(Vec::new()),
                    [other] => {
                        return Err(EvaluationError::type_error("Integer", other.type_name()));
                    }
                    _ => return Err(EvaluationError::invalid("index must be a single value")),
                };
                Ok(usize::try_from(position)
                    .ok()
                    .and_then(|i| base.into_iter().nth(i))
                    .into_iter()
                    .collect())
            }

            ExpressionNode::TypeCheck {
                expression,
                type_name,
            } => {
                let items = self.evaluate_with_context(expression, context)?;
                match items.as_slice() {
                    [] => Ok(Vec::new()),
                    [item] => Ok(vec![Value::Boolean(functions::is_of_type(item, type_name))]),
                    _ => Err(EvaluationError::invalid(
                        "'is' requires a single item on the left",
                    )),
                }
            }

            ExpressionNode::Conditional(_)
            | ExpressionNode::Assignment { .. }
            | ExpressionNode::Sequence(_) => Err(EvaluationError::invalid(
                "statement syntax is not valid in a FHIRPath expression",
            )),
        }
    }

    fn evaluate_literal(&self, literal: &LiteralValue) -> EvaluationResult<Vec<Value>> {
        let value = match literal {
            LiteralValue::Boolean(b) => Value::Boolean(*b),
            LiteralValue::Integer(i) => Value::Integer(*i),
            LiteralValue::Decimal(s) => Decimal::from_str(s)
                .map(Value::Decimal)
                .map_err(|_| EvaluationError::invalid(format!("Invalid decimal literal: {s}")))?,
            LiteralValue::String(s) => Value::String(s.clone()),
            LiteralValue::Date(s) => operations::parse_date(s)
                .map(Value::Date)
                .ok_or_else(|| EvaluationError::invalid(format!("Invalid date literal: {s}")))?,
            LiteralValue::DateTime(s) => match DateTime::parse_from_rfc3339(s) {
                Ok(date_time) => Value::DateTime(date_time),
                Err(_) => operations::parse_date(s).map(Value::Date).ok_or_else(|| {
                    EvaluationError::invalid(format!("Invalid date-time literal: {s}"))
                })?,
            },
            LiteralValue::Null => return Ok(Vec::new()),
        };
        Ok(vec![value])
    }

    fn evaluate_binary_op(
        &self,
        op: BinaryOperator,
        left: &ExpressionNode,
        right: &ExpressionNode,
        context: &EvaluationContext<'_>,
    ) -> EvaluationResult<Vec<Value>> {
        let left = self.evaluate_with_context(left, context)?;
        let right = self.evaluate_with_context(right, context)?;

        match op {
            BinaryOperator::And
            | BinaryOperator::Or
            | BinaryOperator::Xor
            | BinaryOperator::Implies => {
                let left = to_boolean(&left)?;
                let right = to_boolean(&right)?;
                let result = match op {
                    BinaryOperator::And => match (left, right) {
                        (Some(false), _) | (_, Some(false)) => Some(false),
                        (Some(true), Some(true)) => Some(true),
                        _ => None,
                    },
                    BinaryOperator::Or => match (left, right) {
                        (Some(true), _) | (_, Some(true)) => Some(true),
                        (Some(false), Some(false)) => Some(false),
                        _ => None,
                    },
                    BinaryOperator::Xor => match (left, right) {
                        (Some(a), Some(b)) => Some(a != b),
                        _ => None,
                    },
                    _ => match (left, right) {
                        (Some(false), _) | (_, Some(true)) => Some(true),
                        (Some(true), Some(false)) => Some(false),
                        _ => None,
                    },
                };
                Ok(result.map(Value::Boolean).into_iter().collect())
            }

            BinaryOperator::Equal | BinaryOperator::NotEqual => {
                if left.is_empty() || right.is_empty() {
                    return Ok(Vec::new());
                }
                let equal = left.len() == right.len()
                    && left
                        .iter()
                        .zip(&right)
                        .all(|(a, b)| operations::values_equal(a, b));
                Ok(vec![Value::Boolean(if op == BinaryOperator::Equal {
                    equal
                } else {
                    !equal
                })])
            }

            BinaryOperator::LessThan
            | BinaryOperator::LessThanOrEqual
            | BinaryOperator::GreaterThan
            | BinaryOperator::GreaterThanOrEqual => {
                let (Some(a), Some(b)) = (singleton(&left, op)?, singleton(&right, op)?) else {
                    return Ok(Vec::new());
                };
                let Some(ordering) = operations::compare_values(a, b) else {
                    return Ok(Vec::new());
                };
                let result = match op {
                    BinaryOperator::LessThan => ordering.is_lt(),
                    BinaryOperator::LessThanOrEqual => ordering.is_le(),
                    BinaryOperator::GreaterThan => ordering.is_gt(),
                    _ => ordering.is_ge(),
                };
                Ok(vec![Value::Boolean(result)])
            }

            BinaryOperator::Concatenate => {
                let a = singleton(&left, op)?.map(|v| v.to_string()).unwrap_or_default();
                let b = singleton(&right, op)?.map(|v| v.to_string()).unwrap_or_default();
                Ok(vec![Value::String(a + &b)])
            }

            BinaryOperator::Union => {
                let mut result: Vec<Value> = Vec::with_capacity(left.len() + right.len());
                for item in left.into_iter().chain(right) {
                    if !result.iter().any(|seen| operations::values_equal(seen, &item)) {
                        result.push(item);
                    }
                }
                Ok(result)
            }

            BinaryOperator::In | BinaryOperator::Contains => {
                let (needle, haystack) = if op == BinaryOperator::In {
                    (left, right)
                } else {
                    (right, left)
                };
                match singleton(&needle, op)? {
                    None => Ok(Vec::new()),
                    Some(item) => Ok(vec![Value::Boolean(
                        haystack
                            .iter()
                            .any(|candidate| operations::values_equal(candidate, item)),
                    )]),
                }
            }

            _ => {
                let (Some(a), Some(b)) = (singleton(&left, op)?, singleton(&right, op)?) else {
                    return Ok(Vec::new());
                };
                operations::arithmetic(op, a, b, IntegerDivision::Decimal).map(|v| vec![v])
            }
        }
    }

    fn evaluate_unary_op(
        &self,
        op: UnaryOperator,
        operand: &ExpressionNode,
        context: &EvaluationContext<'_>,
    ) -> EvaluationResult<Vec<Value>> {
        let operand = self.evaluate_with_context(operand, context)?;
        match op {
            UnaryOperator::Positive => Ok(operand),
            UnaryOperator::Negate => match operand.as_slice() {
                [] => Ok(Vec::new()),
                [item] => operations::negate(item).map(|v| vec![v]),
                _ => Err(EvaluationError::invalid("cannot negate a collection")),
            },
            UnaryOperator::Not => Ok(to_boolean(&operand)?
                .map(|b| Value::Boolean(!b))
                .into_iter()
                .collect()),
        }
    }
}

/// Navigate to a member on every item, flattening arrays
///
/// At the start of a path a type name selects resources of that type, so
/// `Patient.name` works against a Patient.
pub(crate) fn navigate(items: &[Value], name: &str, allow_type_name: bool) -> Vec<Value> {
    let mut result = Vec::new();
    for item in items {
        if allow_type_name {
            if let Value::Resource(resource) = item {
                if resource.resource_type() == name {
                    result.push(item.clone());
                    continue;
                }
            }
        }
        match item.member(name) {
            Some(Value::List(values)) => {
                result.extend(values.into_iter().filter(|v| !v.is_null()))
            }
            Some(Value::Null) | None => {}
            Some(value) => result.push(value),
        }
    }
    result
}

/// Singleton evaluation of a collection as a boolean
///
/// Empty is `None`; a single boolean is itself; any other single item is
/// `true`.
pub(crate) fn to_boolean(items: &[Value]) -> EvaluationResult<Option<bool>> {
    match items {
        [] => Ok(None),
        [Value::Boolean(b)] => Ok(Some(*b)),
        [_] => Ok(Some(true)),
        _ => Err(EvaluationError::invalid(
            "expected a single value, found a collection",
        )),
    }
}

fn singleton(items: &[Value], op: BinaryOperator) -> EvaluationResult<Option<&Value>> {
    match items {
        [] => Ok(None),
        [item] => Ok(Some(item)),
        _ => Err(EvaluationError::invalid(format!(
            "operator '{op}' requires single values"
        ))),
    }
}
