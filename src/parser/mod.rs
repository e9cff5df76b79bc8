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

//! Expression parsing
//!
//! Two dialects share one tokenizer and one Pratt parser:
//!
//! - [`Dialect::Rules`]: rule conditions and actions (`==`, `&&`, `||`, `!`,
//!   ternaries, `name = value` assignments, `;`-separated statements)
//! - [`Dialect::FhirPath`]: the FHIRPath subset used for sort keys, filters and
//!   reference paths (`=`, `and`/`or`, `|`, `&`, `%constants`, `$this`)

pub mod error;
pub mod pratt;
pub mod tokenizer;

pub use error::{ParseError, ParseResult};
pub use pratt::PrattParser;

use crate::ast::ExpressionNode;

/// Expression dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// Rule condition/action language
    Rules,
    /// FHIRPath subset
    FhirPath,
}

/// Parse an expression in the given dialect
pub fn parse(input: &str, dialect: Dialect) -> ParseResult<ExpressionNode> {
    PrattParser::new(input, dialect).parse()
}

/// Parse a rule condition or action
pub fn parse_rule_expression(input: &str) -> ParseResult<ExpressionNode> {
    parse(input, Dialect::Rules)
}

/// Parse a FHIRPath expression
pub fn parse_fhirpath(input: &str) -> ParseResult<ExpressionNode> {
    parse(input, Dialect::FhirPath)
}
