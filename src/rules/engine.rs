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

//! Rule firing

use super::{CompiledExpression, CompiledRule, RuleSet};
use crate::ast::ExpressionNode;
use crate::evaluator::{EvaluationError, EvaluationResult, evaluate};
use crate::model::{ComputedValues, Value};
use crate::session::Session;

/// Fires a compiled [`RuleSet`] against one session
///
/// Firing never fails as a whole. A rule whose condition cannot be evaluated
/// is skipped; a rule whose action fails stops at that action and keeps the
/// effects of the actions before it. Later rules fire either way.
#[derive(Debug, Clone, Copy, Default)]
pub struct RulesEngine;

impl RulesEngine {
    /// Fire every rule in order and return the computed values
    ///
    /// The session is consumed: one firing, one session.
    pub fn fire(rules: &RuleSet, mut session: Session<'_>) -> ComputedValues {
        for rule in rules.rules() {
            fire_rule(rule, &mut session);
        }
        session.into_output()
    }
}

fn fire_rule(rule: &CompiledRule, session: &mut Session<'_>) {
    match evaluate_condition(rule.condition(), session) {
        Ok(true) => {}
        Ok(false) => return,
        Err(error) => {
            report(rule, "condition", &error);
            return;
        }
    }

    for action in rule.actions() {
        if let Err(error) = execute_action(rule, action, session) {
            report(rule, "action", &error);
            return;
        }
    }

    log::debug!(
        "Rule executed: {} -> {}",
        rule.name(),
        session.get(rule.name()).unwrap_or(&Value::Null)
    );
}

fn evaluate_condition(
    condition: Option<&CompiledExpression>,
    session: &mut Session<'_>,
) -> EvaluationResult<bool> {
    let Some(condition) = condition else {
        return Ok(true);
    };
    let expression = condition.as_ref().map_err(|e| EvaluationError::Parse(e.clone()))?;
    Ok(match evaluate(expression, session)? {
        Value::Boolean(b) => b,
        other => other.is_truthy(),
    })
}

fn execute_action(
    rule: &CompiledRule,
    action: &CompiledExpression,
    session: &mut Session<'_>,
) -> EvaluationResult<()> {
    let expression = action.as_ref().map_err(|e| EvaluationError::Parse(e.clone()))?;
    let value = evaluate(expression, session)?;
    if produces_value(expression) {
        session.put(rule.name(), value);
    }
    Ok(())
}

/// Check whether an action's result is stored under the rule name
///
/// Assignments and `data.put(..)` calls write their own keys; for a sequence
/// the last statement decides.
fn produces_value(expression: &ExpressionNode) -> bool {
    match expression {
        ExpressionNode::Assignment { .. } => false,
        ExpressionNode::MethodCall(call) => {
            !(call.method == "put" && call.base.as_identifier() == Some("data"))
        }
        ExpressionNode::Sequence(statements) => statements.last().is_some_and(produces_value),
        _ => true,
    }
}

fn report(rule: &CompiledRule, kind: &str, error: &EvaluationError) {
    if error.is_missing_binding() {
        log::debug!("Rule '{}' {kind} skipped: {error}", rule.name());
    } else {
        log::error!("Rule '{}' {kind} failed: {error}", rule.name());
    }
}
