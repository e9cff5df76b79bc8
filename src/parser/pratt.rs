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

//! Pratt parser for rule and FHIRPath expressions

use super::Dialect;
use super::error::{ParseError, ParseResult};
use super::tokenizer::{Token, Tokenizer};
use crate::ast::{BinaryOperator, ExpressionNode, LiteralValue, UnaryOperator};

/// Operator precedence levels (higher = tighter binding)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    /// Assignment `=` in rules (right associative)
    Assignment = 1,
    /// Ternary `?:` in rules (right associative)
    Conditional = 2,
    /// implies (right associative)
    Implies = 3,
    /// or, xor, ||
    Or = 4,
    /// and, &&
    And = 5,
    /// in, contains
    Membership = 6,
    /// =, ==, !=
    Equality = 7,
    /// <, >, <=, >=
    Inequality = 8,
    /// |
    Union = 9,
    /// is
    Type = 10,
    /// +, -, &
    Additive = 11,
    /// *, /, %, div, mod
    Multiplicative = 12,
    /// Unary +, -, !, not
    Unary = 13,
    /// ., []
    Invocation = 14,
}

impl Precedence {
    /// Get the next higher precedence level for left-associative operators
    pub const fn next_level(self) -> Self {
        match self {
            Precedence::Assignment => Precedence::Conditional,
            Precedence::Conditional => Precedence::Implies,
            Precedence::Implies => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Membership,
            Precedence::Membership => Precedence::Equality,
            Precedence::Equality => Precedence::Inequality,
            Precedence::Inequality => Precedence::Union,
            Precedence::Union => Precedence::Type,
            Precedence::Type => Precedence::Additive,
            Precedence::Additive => Precedence::Multiplicative,
            Precedence::Multiplicative => Precedence::Unary,
            Precedence::Unary => Precedence::Invocation,
            Precedence::Invocation => Precedence::Invocation,
        }
    }

    /// Check if this precedence is right associative
    pub const fn is_right_associative(self) -> bool {
        matches!(
            self,
            Precedence::Assignment | Precedence::Conditional | Precedence::Implies
        )
    }
}

fn get_precedence(token: &Token<'_>, dialect: Dialect) -> Option<Precedence> {
    match (token, dialect) {
        (Token::Dot | Token::LeftBracket, _) => Some(Precedence::Invocation),

        (Token::Equal, Dialect::Rules) => Some(Precedence::Assignment),
        (Token::Equal, Dialect::FhirPath) => Some(Precedence::Equality),
        (Token::DoubleEqual | Token::NotEqual, _) => Some(Precedence::Equality),

        (Token::Plus | Token::Minus, _) => Some(Precedence::Additive),
        (Token::Ampersand, Dialect::FhirPath) => Some(Precedence::Additive),

        (Token::And | Token::DoubleAmpersand, _) => Some(Precedence::And),
        (Token::Or | Token::Xor | Token::DoublePipe, _) => Some(Precedence::Or),

        (Token::Multiply | Token::Divide | Token::Div | Token::Mod, _) => {
            Some(Precedence::Multiplicative)
        }
        (Token::Percent, Dialect::Rules) => Some(Precedence::Multiplicative),

        (
            Token::LessThan
            | Token::LessThanOrEqual
            | Token::GreaterThan
            | Token::GreaterThanOrEqual,
            _,
        ) => Some(Precedence::Inequality),

        (Token::In | Token::Contains, _) => Some(Precedence::Membership),
        (Token::Is, _) => Some(Precedence::Type),
        (Token::Pipe, Dialect::FhirPath) => Some(Precedence::Union),
        (Token::Implies, _) => Some(Precedence::Implies),
        (Token::Question, Dialect::Rules) => Some(Precedence::Conditional),

        _ => None,
    }
}

fn token_to_binary_op(token: &Token<'_>) -> Option<BinaryOperator> {
    match token {
        Token::Equal | Token::DoubleEqual => Some(BinaryOperator::Equal),
        Token::NotEqual => Some(BinaryOperator::NotEqual),
        Token::Plus => Some(BinaryOperator::Add),
        Token::Minus => Some(BinaryOperator::Subtract),
        Token::And | Token::DoubleAmpersand => Some(BinaryOperator::And),
        Token::Or | Token::DoublePipe => Some(BinaryOperator::Or),
        Token::LessThan => Some(BinaryOperator::LessThan),
        Token::LessThanOrEqual => Some(BinaryOperator::LessThanOrEqual),
        Token::GreaterThan => Some(BinaryOperator::GreaterThan),
        Token::GreaterThanOrEqual => Some(BinaryOperator::GreaterThanOrEqual),
        Token::Multiply => Some(BinaryOperator::Multiply),
        Token::Divide => Some(BinaryOperator::Divide),
        Token::Div => Some(BinaryOperator::IntegerDivide),
        Token::Mod | Token::Percent => Some(BinaryOperator::Modulo),
        Token::In => Some(BinaryOperator::In),
        Token::Contains => Some(BinaryOperator::Contains),
        Token::Pipe => Some(BinaryOperator::Union),
        Token::Ampersand => Some(BinaryOperator::Concatenate),
        Token::Xor => Some(BinaryOperator::Xor),
        Token::Implies => Some(BinaryOperator::Implies),
        _ => None,
    }
}

/// Pratt parser
///
/// Parses a primary expression with its postfix invocations (`.`, `[]`), then
/// folds binary operators while their precedence is at least the current
/// minimum. Right-associative levels recurse at the same level, all others at
/// the next one.
///
/// Precedence levels, loosest first: assignment, ternary, `implies`,
/// `or`/`xor`/`||`, `and`/`&&`, `in`/`contains`, equality, comparison, `|`,
/// `is`, additive, multiplicative, unary, invocation.
pub struct PrattParser<'input> {
    tokenizer: Tokenizer<'input>,
    current_token: Option<Token<'input>>,
    current_position: usize,
    dialect: Dialect,
}

impl<'input> PrattParser<'input> {
    /// Create a parser over the input
    pub fn new(input: &'input str, dialect: Dialect) -> Self {
        Self {
            tokenizer: Tokenizer::new(input, dialect),
            current_token: None,
            current_position: 0,
            dialect,
        }
    }

    fn advance(&mut self) -> ParseResult<()> {
        self.current_token = self.tokenizer.next_token()?;
        self.current_position = self.tokenizer.token_start();
        Ok(())
    }

    fn current(&self) -> Option<Token<'input>> {
        self.current_token
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        match self.current_token {
            Some(token) => ParseError::unexpected(
                format!("expected {expected}, found {token:?}"),
                self.current_position,
            ),
            None => ParseError::eof(expected),
        }
    }

    fn expect(&mut self, expected: Token<'input>, description: &str) -> ParseResult<()> {
        match self.current_token {
            Some(token) if std::mem::discriminant(&token) == std::mem::discriminant(&expected) => {
                self.advance()
            }
            _ => Err(self.unexpected(description)),
        }
    }

    fn parse_primary(&mut self) -> ParseResult<ExpressionNode> {
        let Some(token) = self.current() else {
            return Err(ParseError::eof("expression"));
        };

        match token {
            Token::Identifier(name) => {
                self.advance()?;
                if let Some(Token::LeftParen) = self.current() {
                    let args = self.parse_arguments()?;
                    Ok(ExpressionNode::function_call(name, args))
                } else {
                    Ok(ExpressionNode::identifier(name))
                }
            }
            Token::Variable(name) | Token::ExternalConstant(name) => {
                self.advance()?;
                Ok(ExpressionNode::variable(name))
            }
            Token::Integer(value) => {
                self.advance()?;
                Ok(ExpressionNode::literal(LiteralValue::Integer(value)))
            }
            Token::Decimal(value) => {
                self.advance()?;
                Ok(ExpressionNode::literal(LiteralValue::Decimal(
                    value.to_string(),
                )))
            }
            Token::String(raw) => {
                let position = self.current_position;
                self.advance()?;
                let value = Self::process_string_escapes(raw, position)?;
                Ok(ExpressionNode::literal(LiteralValue::String(value)))
            }
            Token::Date(value) => {
                self.advance()?;
                Ok(ExpressionNode::literal(LiteralValue::Date(value.to_string())))
            }
            Token::DateTime(value) => {
                self.advance()?;
                Ok(ExpressionNode::literal(LiteralValue::DateTime(
                    value.to_string(),
                )))
            }
            Token::True => {
                self.advance()?;
                Ok(ExpressionNode::literal(LiteralValue::Boolean(true)))
            }
            Token::False => {
                self.advance()?;
                Ok(ExpressionNode::literal(LiteralValue::Boolean(false)))
            }
            Token::Null => {
                self.advance()?;
                Ok(ExpressionNode::literal(LiteralValue::Null))
            }
            Token::LeftParen => {
                self.advance()?;
                let inner = self.parse_expression_with_precedence(Precedence::Assignment)?;
                self.expect(Token::RightParen, "')'")?;
                Ok(inner)
            }
            Token::Minus => {
                self.advance()?;
                let operand = self.parse_expression_with_precedence(Precedence::Unary)?;
                Ok(ExpressionNode::unary_op(UnaryOperator::Negate, operand))
            }
            Token::Plus => {
                self.advance()?;
                let operand = self.parse_expression_with_precedence(Precedence::Unary)?;
                Ok(ExpressionNode::unary_op(UnaryOperator::Positive, operand))
            }
            Token::Bang | Token::Not => {
                self.advance()?;
                let operand = self.parse_expression_with_precedence(Precedence::Unary)?;
                Ok(ExpressionNode::unary_op(UnaryOperator::Not, operand))
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    /// Parse `( arg, ... )`, the current token being the opening parenthesis
    fn parse_arguments(&mut self) -> ParseResult<Vec<ExpressionNode>> {
        self.expect(Token::LeftParen, "'('")?;
        let mut args = Vec::new();

        if let Some(Token::RightParen) = self.current() {
            self.advance()?;
            return Ok(args);
        }

        loop {
            args.push(self.parse_expression_with_precedence(Precedence::Conditional)?);

            match self.current() {
                Some(Token::Comma) => self.advance()?,
                Some(Token::RightParen) => {
                    self.advance()?;
                    break;
                }
                _ => return Err(self.unexpected("',' or ')' in arguments")),
            }
        }

        Ok(args)
    }

    fn parse_postfix(&mut self, mut left: ExpressionNode) -> ParseResult<ExpressionNode> {
        loop {
            match self.current() {
                Some(Token::Dot) => {
                    self.advance()?;
                    let name = match self.current() {
                        Some(Token::Identifier(name)) => name,
                        Some(token) => match token.keyword_text() {
                            Some(keyword) => keyword,
                            None => return Err(self.unexpected("member name after '.'")),
                        },
                        None => return Err(ParseError::eof("member name after '.'")),
                    };
                    self.advance()?;
                    left = if let Some(Token::LeftParen) = self.current() {
                        let args = self.parse_arguments()?;
                        ExpressionNode::method_call(left, name, args)
                    } else {
                        ExpressionNode::path(left, name)
                    };
                }
                Some(Token::LeftBracket) => {
                    self.advance()?;
                    let index = self.parse_expression_with_precedence(Precedence::Conditional)?;
                    self.expect(Token::RightBracket, "']'")?;
                    left = ExpressionNode::index(left, index);
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_type_name(&mut self) -> ParseResult<String> {
        let parenthesized = matches!(self.current(), Some(Token::LeftParen));
        if parenthesized {
            self.advance()?;
        }

        let mut type_name = match self.current() {
            Some(Token::Identifier(name)) => name.to_string(),
            _ => return Err(self.unexpected("type name")),
        };
        self.advance()?;

        // Qualified names such as System.Boolean
        while let Some(Token::Dot) = self.current() {
            self.advance()?;
            match self.current() {
                Some(Token::Identifier(part)) => {
                    type_name.push('.');
                    type_name.push_str(part);
                    self.advance()?;
                }
                _ => return Err(self.unexpected("identifier in qualified type name")),
            }
        }

        if parenthesized {
            self.expect(Token::RightParen, "')'")?;
        }
        Ok(type_name)
    }

    fn parse_expression_with_precedence(
        &mut self,
        min_precedence: Precedence,
    ) -> ParseResult<ExpressionNode> {
        let mut left = self.parse_primary()?;
        left = self.parse_postfix(left)?;

        while let Some(token) = self.current() {
            let precedence = match get_precedence(&token, self.dialect) {
                Some(prec) if prec >= min_precedence => prec,
                _ => break,
            };

            match token {
                Token::Dot | Token::LeftBracket => {
                    left = self.parse_postfix(left)?;
                    continue;
                }
                Token::Equal if self.dialect == Dialect::Rules => {
                    let position = self.current_position;
                    let target = match left.as_identifier() {
                        Some(name) => name.to_string(),
                        None => return Err(ParseError::InvalidAssignmentTarget { position }),
                    };
                    self.advance()?;
                    let value = self.parse_expression_with_precedence(Precedence::Assignment)?;
                    left = ExpressionNode::assignment(target, value);
                    continue;
                }
                Token::Question => {
                    self.advance()?;
                    let then_expr =
                        self.parse_expression_with_precedence(Precedence::Conditional)?;
                    self.expect(Token::Colon, "':' in conditional expression")?;
                    let else_expr =
                        self.parse_expression_with_precedence(Precedence::Conditional)?;
                    left = ExpressionNode::conditional(left, then_expr, else_expr);
                    continue;
                }
                Token::Is => {
                    self.advance()?;
                    let type_name = self.parse_type_name()?;
                    left = ExpressionNode::type_check(left, type_name);
                    continue;
                }
                _ => {}
            }

            let op = token_to_binary_op(&token).ok_or_else(|| self.unexpected("operator"))?;
            self.advance()?;

            let next_min_precedence = if precedence.is_right_associative() {
                precedence
            } else {
                precedence.next_level()
            };

            let right = self.parse_expression_with_precedence(next_min_precedence)?;
            left = ExpressionNode::binary_op(op, left, right);
        }

        Ok(left)
    }

    /// Parse a single expression
    pub fn parse_expression(&mut self) -> ParseResult<ExpressionNode> {
        self.parse_expression_with_precedence(Precedence::Assignment)
    }

    /// Parse complete input
    ///
    /// Rule input may hold several `;`-separated statements, which produce a
    /// [`ExpressionNode::Sequence`]. A single statement is returned as is.
    pub fn parse(&mut self) -> ParseResult<ExpressionNode> {
        self.advance()?;
        if self.current_token.is_none() {
            return Err(ParseError::EmptyExpression);
        }

        let mut statements = Vec::new();
        loop {
            statements.push(self.parse_expression()?);
            match self.current() {
                None => break,
                Some(Token::Semicolon) if self.dialect == Dialect::Rules => {
                    self.advance()?;
                    if self.current_token.is_none() {
                        break;
                    }
                }
                Some(_) => return Err(self.unexpected("end of expression")),
            }
        }

        if statements.len() == 1 {
            Ok(statements.remove(0))
        } else {
            Ok(ExpressionNode::Sequence(statements))
        }
    }

    /// Process escape sequences in string literals, including Unicode escapes
    fn process_string_escapes(input: &str, position: usize) -> ParseResult<String> {
        let mut result = String::with_capacity(input.len());
        let mut chars = input.chars();

        while let Some(ch) = chars.next() {
            if ch != '\\' {
                result.push(ch);
                continue;
            }
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some('r') => result.push('\r'),
                Some('f') => result.push('\u{000C}'),
                Some('\\') => result.push('\\'),
                Some('\'') => result.push('\''),
                Some('"') => result.push('"'),
                Some('`') => result.push('`'),
                Some('/') => result.push('/'),
                Some('u') => {
                    let hex: String = chars.by_ref().take(4).collect();
                    let decoded = (hex.len() == 4)
                        .then(|| u32::from_str_radix(&hex, 16).ok())
                        .flatten()
                        .and_then(char::from_u32);
                    match decoded {
                        Some(unicode_char) => result.push(unicode_char),
                        None => {
                            return Err(ParseError::InvalidEscape {
                                sequence: format!("\\u{hex}"),
                                position,
                            });
                        }
                    }
                }
                Some(other) => {
                    // Unknown escapes are kept literally
                    result.push('\\');
                    result.push(other);
                }
                None => {
                    return Err(ParseError::InvalidEscape {
                        sequence: "\\".to_string(),
                        position,
                    });
                }
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_fhirpath, parse_rule_expression};

    #[test]
    fn test_precedence_ordering() {
        assert!(Precedence::Multiplicative > Precedence::Additive);
        assert!(Precedence::Additive > Precedence::Equality);
        assert!(Precedence::Equality > Precedence::And);
        assert!(Precedence::And > Precedence::Or);
        assert!(Precedence::Or > Precedence::Conditional);
        assert!(Precedence::Conditional > Precedence::Assignment);
    }

    #[test]
    fn test_arithmetic_precedence() {
        let result = parse_rule_expression("2 + 3 * 4").unwrap();
        let ExpressionNode::BinaryOp(data) = result else {
            panic!("expected binary operation");
        };
        assert_eq!(data.op, BinaryOperator::Add);
        assert_eq!(data.left, ExpressionNode::literal(LiteralValue::Integer(2)));
        assert!(matches!(
            &data.right,
            ExpressionNode::BinaryOp(inner) if inner.op == BinaryOperator::Multiply
        ));
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let result = parse_rule_expression("y = x * 2").unwrap();
        let ExpressionNode::Assignment { target, value } = result else {
            panic!("expected assignment");
        };
        assert_eq!(target, "y");
        assert!(matches!(*value, ExpressionNode::BinaryOp(_)));
    }

    #[test]
    fn test_invalid_assignment_target() {
        let err = parse_rule_expression("a.b = 1").unwrap_err();
        assert!(matches!(err, ParseError::InvalidAssignmentTarget { .. }));
    }

    #[test]
    fn test_equal_is_comparison_in_fhirpath() {
        let result = parse_fhirpath("status = 'active'").unwrap();
        assert!(matches!(
            result,
            ExpressionNode::BinaryOp(data) if data.op == BinaryOperator::Equal
        ));
    }

    #[test]
    fn test_ternary() {
        let result = parse_rule_expression("count > 0 ? 'some' : 'none'").unwrap();
        let ExpressionNode::Conditional(data) = result else {
            panic!("expected conditional");
        };
        assert!(matches!(data.condition, ExpressionNode::BinaryOp(_)));
        assert_eq!(
            data.else_expr,
            ExpressionNode::literal(LiteralValue::String("none".into()))
        );
    }

    #[test]
    fn test_statement_sequence() {
        let result = parse_rule_expression("a = 1; b = a + 1;").unwrap();
        let ExpressionNode::Sequence(statements) = result else {
            panic!("expected sequence");
        };
        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn test_method_chain() {
        let result = parse_rule_expression("data.put('label', Patient.name[0].family)").unwrap();
        let ExpressionNode::MethodCall(data) = result else {
            panic!("expected method call");
        };
        assert_eq!(data.method, "put");
        assert_eq!(data.base, ExpressionNode::identifier("data"));
        assert!(matches!(data.args[1], ExpressionNode::Path { .. }));
    }

    #[test]
    fn test_negation_binds_to_invocation() {
        let result = parse_rule_expression("!carePlans.isEmpty()").unwrap();
        let ExpressionNode::UnaryOp { op, operand } = result else {
            panic!("expected unary operation");
        };
        assert_eq!(op, UnaryOperator::Not);
        assert!(matches!(*operand, ExpressionNode::MethodCall(_)));
    }

    #[test]
    fn test_fhirpath_keywords_as_method_names() {
        let result = parse_fhirpath("name.given.contains('Jo')").unwrap();
        assert!(matches!(
            result,
            ExpressionNode::MethodCall(data) if data.method == "contains"
        ));
        let result = parse_fhirpath("a contains 'Jo'").unwrap();
        assert!(matches!(
            result,
            ExpressionNode::BinaryOp(data) if data.op == BinaryOperator::Contains
        ));
    }

    #[test]
    fn test_fhirpath_type_check() {
        let result = parse_fhirpath("value is Quantity").unwrap();
        assert!(matches!(result, ExpressionNode::TypeCheck { type_name, .. } if type_name == "Quantity"));
    }

    #[test]
    fn test_string_escapes() {
        let result = parse_rule_expression(r"'a\'bA'").unwrap();
        assert_eq!(
            result,
            ExpressionNode::literal(LiteralValue::String("a'bA".into()))
        );
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse_rule_expression("   "), Err(ParseError::EmptyExpression));
        assert!(matches!(
            parse_rule_expression("(a + b"),
            Err(ParseError::UnexpectedEof { .. })
        ));
        assert!(matches!(
            parse_fhirpath("a; b"),
            Err(ParseError::UnexpectedToken { .. })
        ));
    }
}
