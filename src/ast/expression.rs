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

//! Expression AST node definitions

use super::operator::{BinaryOperator, UnaryOperator};
use smallvec::SmallVec;

/// AST representation of an expression
///
/// Large variants are boxed to keep the enum small.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExpressionNode {
    /// Literal value (string, number, boolean, null, date)
    Literal(LiteralValue),

    /// Identifier (binding name, property name)
    Identifier(String),

    /// Variable reference (`$this`, `%name`), stored without its sigil
    Variable(String),

    /// Member access (object.property)
    Path {
        /// Base expression
        base: Box<ExpressionNode>,
        /// Property name
        path: String,
    },

    /// Binary operation (boxed for size optimization)
    BinaryOp(Box<BinaryOpData>),

    /// Unary operation (negation, not)
    UnaryOp {
        /// The operator
        op: UnaryOperator,
        /// The operand
        operand: Box<ExpressionNode>,
    },

    /// Free function call `name(args)`
    FunctionCall(Box<FunctionCallData>),

    /// Method call on an expression `expression.method(args)`
    MethodCall(Box<MethodCallData>),

    /// Index access (collection\[index\])
    Index {
        /// Base expression
        base: Box<ExpressionNode>,
        /// Index expression
        index: Box<ExpressionNode>,
    },

    /// Type check (`expression is Type`)
    TypeCheck {
        /// Expression to check
        expression: Box<ExpressionNode>,
        /// Type name
        type_name: String,
    },

    /// Ternary conditional `condition ? then : else`
    Conditional(Box<ConditionalData>),

    /// Assignment of a value into the rule output (`name = expression`)
    Assignment {
        /// Output key
        target: String,
        /// Assigned value
        value: Box<ExpressionNode>,
    },

    /// Statements separated by `;`, evaluated in order
    Sequence(Vec<ExpressionNode>),
}

/// Binary operation data
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BinaryOpData {
    /// The operator
    pub op: BinaryOperator,
    /// Left operand
    pub left: ExpressionNode,
    /// Right operand
    pub right: ExpressionNode,
}

/// Function call data
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionCallData {
    /// Function name
    pub name: String,
    /// Function arguments (SmallVec for common case of 2-4 args)
    pub args: SmallVec<[ExpressionNode; 4]>,
}

/// Method call data
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodCallData {
    /// Base expression to call method on
    pub base: ExpressionNode,
    /// Method name
    pub method: String,
    /// Method arguments
    pub args: SmallVec<[ExpressionNode; 4]>,
}

/// Conditional expression data
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConditionalData {
    /// Condition
    pub condition: ExpressionNode,
    /// Then branch
    pub then_expr: ExpressionNode,
    /// Else branch
    pub else_expr: ExpressionNode,
}

/// Literal values
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LiteralValue {
    /// Boolean literal
    Boolean(bool),
    /// Integer literal
    Integer(i64),
    /// Decimal literal (stored as string to preserve precision)
    Decimal(String),
    /// String literal
    String(String),
    /// Date literal (YYYY-MM-DD), FHIRPath only
    Date(String),
    /// DateTime literal (ISO 8601), FHIRPath only
    DateTime(String),
    /// Null literal
    Null,
}

impl ExpressionNode {
    /// Create a literal expression
    pub fn literal(value: LiteralValue) -> Self {
        Self::Literal(value)
    }

    /// Create an identifier expression
    pub fn identifier(name: impl Into<String>) -> Self {
        Self::Identifier(name.into())
    }

    /// Create a variable reference
    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    /// Create a function call expression
    pub fn function_call(
        name: impl Into<String>,
        args: impl Into<SmallVec<[ExpressionNode; 4]>>,
    ) -> Self {
        Self::FunctionCall(Box::new(FunctionCallData {
            name: name.into(),
            args: args.into(),
        }))
    }

    /// Create a method call expression
    pub fn method_call(
        base: ExpressionNode,
        method: impl Into<String>,
        args: impl Into<SmallVec<[ExpressionNode; 4]>>,
    ) -> Self {
        Self::MethodCall(Box::new(MethodCallData {
            base,
            method: method.into(),
            args: args.into(),
        }))
    }

    /// Create a binary operation expression
    pub fn binary_op(op: BinaryOperator, left: ExpressionNode, right: ExpressionNode) -> Self {
        Self::BinaryOp(Box::new(BinaryOpData { op, left, right }))
    }

    /// Create a unary operation expression
    pub fn unary_op(op: UnaryOperator, operand: ExpressionNode) -> Self {
        Self::UnaryOp {
            op,
            operand: Box::new(operand),
        }
    }

    /// Create a member access expression
    pub fn path(base: ExpressionNode, path: impl Into<String>) -> Self {
        Self::Path {
            base: Box::new(base),
            path: path.into(),
        }
    }

    /// Create an index access expression
    pub fn index(base: ExpressionNode, index: ExpressionNode) -> Self {
        Self::Index {
            base: Box::new(base),
            index: Box::new(index),
        }
    }

    /// Create a type check expression
    pub fn type_check(expression: ExpressionNode, type_name: impl Into<String>) -> Self {
        Self::TypeCheck {
            expression: Box::new(expression),
            type_name: type_name.into(),
        }
    }

    /// Create a ternary conditional expression
    pub fn conditional(
        condition: ExpressionNode,
        then_expr: ExpressionNode,
        else_expr: ExpressionNode,
    ) -> Self {
        Self::Conditional(Box::new(ConditionalData {
            condition,
            then_expr,
            else_expr,
        }))
    }

    /// Create an assignment
    pub fn assignment(target: impl Into<String>, value: ExpressionNode) -> Self {
        Self::Assignment {
            target: target.into(),
            value: Box::new(value),
        }
    }

    /// Get identifier name if this is an identifier
    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Self::Identifier(name) => Some(name),
            _ => None,
        }
    }

    /// Get literal value if this is a literal
    pub fn as_literal(&self) -> Option<&LiteralValue> {
        match self {
            Self::Literal(value) => Some(value),
            _ => None,
        }
    }

    /// Check if this is a literal expression
    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }

    /// Count the nodes in this expression tree
    pub fn complexity(&self) -> usize {
        match self {
            Self::Literal(_) | Self::Identifier(_) | Self::Variable(_) => 1,
            Self::Path { base, .. } => 1 + base.complexity(),
            Self::BinaryOp(data) => 1 + data.left.complexity() + data.right.complexity(),
            Self::UnaryOp { operand, .. } => 1 + operand.complexity(),
            Self::FunctionCall(data) => {
                1 + data.args.iter().map(|arg| arg.complexity()).sum::<usize>()
            }
            Self::MethodCall(data) => {
                1 + data.base.complexity()
                    + data.args.iter().map(|arg| arg.complexity()).sum::<usize>()
            }
            Self::Index { base, index } => 1 + base.complexity() + index.complexity(),
            Self::TypeCheck { expression, .. } => 1 + expression.complexity(),
            Self::Conditional(data) => {
                1 + data.condition.complexity()
                    + data.then_expr.complexity()
                    + data.else_expr.complexity()
            }
            Self::Assignment { value, .. } => 1 + value.complexity(),
            Self::Sequence(statements) => statements.iter().map(|s| s.complexity()).sum(),
        }
    }
}
