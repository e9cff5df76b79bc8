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

//! Interpreter for rule conditions and actions
//!
//! Values are single [`Value`]s rather than FHIRPath collections. Reading a
//! member of `null` gives `null` so optional chains stay quiet, while calling
//! a method on `null` or doing arithmetic with it is a missing binding.

use super::error::{EvaluationError, EvaluationResult};
use super::methods::call_method;
use super::namespaces::call_namespace;
use super::operations::{self, IntegerDivision};
use crate::ast::{BinaryOperator, ExpressionNode, LiteralValue, UnaryOperator};
use crate::fhirpath::is_of_type;
use crate::model::{Namespace, Value};
use crate::session::Session;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Evaluate a rules-dialect expression against a session
///
/// Assignments write into the session output and evaluate to the assigned
/// value; a sequence evaluates to its last statement.
pub fn evaluate(expression: &ExpressionNode, session: &mut Session<'_>) -> EvaluationResult<Value> {
    match expression {
        ExpressionNode::Literal(literal) => evaluate_literal(literal),

        ExpressionNode::Identifier(name) | ExpressionNode::Variable(name) => session.resolve(name),

        ExpressionNode::Path { base, path } => {
            let base = evaluate(base, session)?;
            member(&base, path, session)
        }

        ExpressionNode::FunctionCall(call) => {
            let args = evaluate_args(&call.args, session)?;
            call_function(&call.name, &args)
        }

        ExpressionNode::MethodCall(call) => {
            let receiver = evaluate(&call.base, session)?;
            let args = evaluate_args(&call.args, session)?;
            match receiver {
                Value::Namespace(namespace) => {
                    call_namespace(namespace, &call.method, &args, session)
                }
                Value::Null => Err(EvaluationError::missing(format!(
                    "receiver of {}()",
                    call.method
                ))),
                receiver => call_method(&receiver, &call.method, &args),
            }
        }

        ExpressionNode::BinaryOp(data) => {
            evaluate_binary_op(data.op, &data.left, &data.right, session)
        }

        ExpressionNode::UnaryOp { op, operand } => {
            let operand = evaluate(operand, session)?;
            match op {
                UnaryOperator::Not => Ok(Value::Boolean(!operand.is_truthy())),
                UnaryOperator::Positive => Ok(operand),
                UnaryOperator::Negate if operand.is_null() => {
                    Err(EvaluationError::missing("operand of unary '-'"))
                }
                UnaryOperator::Negate => operations::negate(&operand),
            }
        }

        ExpressionNode::Index { base, index } => {
            let base = evaluate(base, session)?;
            let index = evaluate(index, session)?;
            evaluate_index(&base, &index, session)
        }

        ExpressionNode::TypeCheck {
            expression,
            type_name,
        } => {
            let value = evaluate(expression, session)?;
            Ok(Value::Boolean(!value.is_null() && is_of_type(&value, type_name)))
        }

        ExpressionNode::Conditional(data) => {
            if evaluate(&data.condition, session)?.is_truthy() {
                evaluate(&data.then_expr, session)
            } else {
                evaluate(&data.else_expr, session)
            }
        }

        ExpressionNode::Assignment { target, value } => {
            let value = evaluate(value, session)?;
            session.put(target.clone(), value.clone());
            Ok(value)
        }

        ExpressionNode::Sequence(statements) => {
            let mut last = Value::Null;
            for statement in statements {
                last = evaluate(statement, session)?;
            }
            Ok(last)
        }
    }
}

fn evaluate_args(
    args: &[ExpressionNode],
    session: &mut Session<'_>,
) -> EvaluationResult<Vec<Value>> {
    args.iter().map(|arg| evaluate(arg, session)).collect()
}

fn evaluate_literal(literal: &LiteralValue) -> EvaluationResult<Value> {
    Ok(match literal {
        LiteralValue::Boolean(b) => Value::Boolean(*b),
        LiteralValue::Integer(i) => Value::Integer(*i),
        LiteralValue::Decimal(text) => Decimal::from_str(text)
            .map(Value::Decimal)
            .map_err(|_| EvaluationError::invalid(format!("Invalid decimal literal: {text}")))?,
        LiteralValue::String(text) => Value::String(text.clone()),
        LiteralValue::Date(text) | LiteralValue::DateTime(text) => operations::parse_date(text)
            .map(Value::Date)
            .ok_or_else(|| EvaluationError::invalid(format!("Invalid date literal: {text}")))?,
        LiteralValue::Null => Value::Null,
    })
}

fn member(base: &Value, name: &str, session: &Session<'_>) -> EvaluationResult<Value> {
    match base {
        Value::Null => Ok(Value::Null),
        Value::Resource(_) | Value::Element(_) => Ok(base.member(name).unwrap_or(Value::Null)),
        Value::List(items) => {
            let mut members = Vec::new();
            for item in items {
                match member(item, name, session)? {
                    Value::Null => {}
                    Value::List(nested) => members.extend(nested),
                    value => members.push(value),
                }
            }
            Ok(Value::List(members))
        }
        Value::Namespace(Namespace::Data) => {
            Ok(session.get(name).cloned().unwrap_or(Value::Null))
        }
        other => Err(EvaluationError::type_error("object", other.type_name())),
    }
}

fn call_function(name: &str, args: &[Value]) -> EvaluationResult<Value> {
    match name {
        "empty" => {
            super::error::check_arity(name, args.len(), 1, 1)?;
            Ok(Value::Boolean(match &args[0] {
                Value::Null => true,
                Value::String(text) => text.is_empty(),
                Value::List(items) => items.is_empty(),
                _ => false,
            }))
        }
        "size" => {
            super::error::check_arity(name, args.len(), 1, 1)?;
            match &args[0] {
                Value::Null => Ok(Value::Integer(0)),
                Value::String(text) => Ok(Value::from(text.chars().count())),
                Value::List(items) => Ok(Value::from(items.len())),
                other => Err(EvaluationError::type_error("List", other.type_name())),
            }
        }
        _ => Err(EvaluationError::UnknownFunction {
            name: name.to_string(),
        }),
    }
}

fn evaluate_binary_op(
    op: BinaryOperator,
    left: &ExpressionNode,
    right: &ExpressionNode,
    session: &mut Session<'_>,
) -> EvaluationResult<Value> {
    // Short-circuit before evaluating the right side
    match op {
        BinaryOperator::And => {
            if !evaluate(left, session)?.is_truthy() {
                return Ok(Value::Boolean(false));
            }
            return Ok(Value::Boolean(evaluate(right, session)?.is_truthy()));
        }
        BinaryOperator::Or => {
            if evaluate(left, session)?.is_truthy() {
                return Ok(Value::Boolean(true));
            }
            return Ok(Value::Boolean(evaluate(right, session)?.is_truthy()));
        }
        _ => {}
    }

    let left = evaluate(left, session)?;
    let right = evaluate(right, session)?;

    match op {
        BinaryOperator::Xor => Ok(Value::Boolean(left.is_truthy() != right.is_truthy())),
        BinaryOperator::Implies => Ok(Value::Boolean(!left.is_truthy() || right.is_truthy())),

        BinaryOperator::Equal => Ok(Value::Boolean(operations::values_equal(&left, &right))),
        BinaryOperator::NotEqual => Ok(Value::Boolean(!operations::values_equal(&left, &right))),

        BinaryOperator::LessThan
        | BinaryOperator::LessThanOrEqual
        | BinaryOperator::GreaterThan
        | BinaryOperator::GreaterThanOrEqual => {
            if left.is_null() || right.is_null() {
                return Ok(Value::Boolean(false));
            }
            let ordering = operations::compare_values(&left, &right).ok_or_else(|| {
                EvaluationError::type_error(left.type_name(), right.type_name())
            })?;
            Ok(Value::Boolean(match op {
                BinaryOperator::LessThan => ordering.is_lt(),
                BinaryOperator::LessThanOrEqual => ordering.is_le(),
                BinaryOperator::GreaterThan => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }

        BinaryOperator::Concatenate => Ok(Value::String(format!("{left}{right}"))),

        BinaryOperator::Union => {
            let mut result = left.into_list();
            for item in right.into_list() {
                if !result.iter().any(|seen| operations::values_equal(seen, &item)) {
                    result.push(item);
                }
            }
            Ok(Value::List(result))
        }

        BinaryOperator::In => Ok(Value::Boolean(contains(&right, &left))),
        BinaryOperator::Contains => Ok(Value::Boolean(contains(&left, &right))),

        _ => {
            let concatenation = op == BinaryOperator::Add
                && (matches!(left, Value::String(_)) || matches!(right, Value::String(_)));
            if !concatenation && (left.is_null() || right.is_null()) {
                return Err(EvaluationError::missing(format!("operand of '{op}'")));
            }
            operations::arithmetic(op, &left, &right, IntegerDivision::Truncate)
        }
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::List(items), _) => items.iter().any(|item| operations::values_equal(item, needle)),
        (Value::String(text), Value::String(part)) => text.contains(part.as_str()),
        _ => false,
    }
}

fn evaluate_index(base: &Value, index: &Value, session: &Session<'_>) -> EvaluationResult<Value> {
    match (base, index) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::List(items), Value::Integer(i)) => Ok(usize::try_from(*i)
            .ok()
            .and_then(|i| items.get(i))
            .cloned()
            .unwrap_or(Value::Null)),
        (Value::String(text), Value::Integer(i)) => Ok(usize::try_from(*i)
            .ok()
            .and_then(|i| text.chars().nth(i))
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null)),
        (Value::Resource(_) | Value::Element(_) | Value::Namespace(_), Value::String(key)) => {
            member(base, key, session)
        }
        (_, other) => Err(EvaluationError::type_error("index", other.type_name())),
    }
}
