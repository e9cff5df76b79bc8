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

//! Rule compilation
//!
//! A [`RuleSet`] holds the parsed conditions and actions of a list of
//! [`RuleConfig`]s in firing order. It is immutable once compiled and can be
//! shared by any number of concurrent firings.

mod engine;

pub use engine::RulesEngine;

use crate::ast::ExpressionNode;
use crate::model::RuleConfig;
use crate::parser::{ParseError, parse_rule_expression};
use std::sync::Arc;

/// An expression parsed at compile time, or the reason it could not be
pub(crate) type CompiledExpression = Result<ExpressionNode, ParseError>;

/// One compiled rule
#[derive(Debug, Clone)]
pub struct CompiledRule {
    name: String,
    priority: i32,
    condition: Option<CompiledExpression>,
    actions: Vec<CompiledExpression>,
}

impl CompiledRule {
    fn compile(config: &RuleConfig) -> Self {
        let condition = match config.condition.trim() {
            "" | "true" => None,
            text => Some(compile_expression(&config.name, "condition", text)),
        };
        let actions = config
            .actions
            .iter()
            .map(|action| compile_expression(&config.name, "action", action))
            .collect();

        Self {
            name: config.name.clone(),
            priority: config.priority,
            condition,
            actions,
        }
    }

    /// Rule name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Firing priority, lower first
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Parsed condition; `None` when the rule always fires
    pub(crate) fn condition(&self) -> Option<&CompiledExpression> {
        self.condition.as_ref()
    }

    pub(crate) fn actions(&self) -> &[CompiledExpression] {
        &self.actions
    }
}

fn compile_expression(rule: &str, kind: &str, text: &str) -> CompiledExpression {
    parse_rule_expression(text).inspect_err(|e| {
        log::error!("Rule '{rule}' has an invalid {kind} '{text}': {e}");
    })
}

/// Compiled rules in firing order
///
/// Rules are ordered by ascending priority; rules of equal priority keep
/// their declaration order. A rule whose name was declared earlier replaces
/// that earlier declaration.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Arc<[CompiledRule]>,
}

impl RuleSet {
    /// Compile rule configurations
    ///
    /// Never fails: an expression that does not parse is logged here and
    /// reported again as an evaluation error when its rule fires.
    pub fn compile(configs: &[RuleConfig]) -> Self {
        let mut rules: Vec<CompiledRule> = Vec::with_capacity(configs.len());
        for config in configs {
            if let Some(position) = rules.iter().position(|rule| rule.name == config.name) {
                log::warn!(
                    "Duplicate rule name '{}'; the later declaration replaces the earlier one",
                    config.name
                );
                rules.remove(position);
            }
            rules.push(CompiledRule::compile(config));
        }
        rules.sort_by_key(|rule| rule.priority);

        Self {
            rules: rules.into(),
        }
    }

    /// Rules in firing order
    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if there are no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl From<&[RuleConfig]> for RuleSet {
    fn from(configs: &[RuleConfig]) -> Self {
        Self::compile(configs)
    }
}
