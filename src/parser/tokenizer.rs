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

//! Tokenizer shared by the rule and FHIRPath dialects
//!
//! Tokens borrow from the input; string literal bodies are returned raw and
//! unescaped by the parser. Keyword recognition depends on the dialect, so
//! `contains` is an operator in FHIRPath but a plain name in rule expressions.

use super::error::{ParseError, ParseResult};
use super::Dialect;
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use unicode_xid::UnicodeXID;

/// Token produced by the tokenizer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token<'input> {
    // Literals
    /// Integer literal (e.g., 42)
    Integer(i64),
    /// Decimal literal as string slice, parsed on demand (e.g., 3.14)
    Decimal(&'input str),
    /// String literal body without quotes, escapes unprocessed
    String(&'input str),
    /// Date literal without the `@` (FHIRPath)
    Date(&'input str),
    /// DateTime literal without the `@` (FHIRPath)
    DateTime(&'input str),
    /// Identifier (plain or backtick-delimited)
    Identifier(&'input str),
    /// `$name` variable (FHIRPath)
    Variable(&'input str),
    /// `%name` external constant (FHIRPath)
    ExternalConstant(&'input str),

    // Keywords
    /// true
    True,
    /// false
    False,
    /// null (rules)
    Null,
    /// and
    And,
    /// or
    Or,
    /// xor (FHIRPath)
    Xor,
    /// implies (FHIRPath)
    Implies,
    /// not (rules prefix operator)
    Not,
    /// in (FHIRPath)
    In,
    /// contains (FHIRPath)
    Contains,
    /// is (FHIRPath)
    Is,
    /// div (FHIRPath)
    Div,
    /// mod (FHIRPath)
    Mod,

    // Operators
    /// +
    Plus,
    /// -
    Minus,
    /// *
    Multiply,
    /// /
    Divide,
    /// %
    Percent,
    /// &
    Ampersand,
    /// &&
    DoubleAmpersand,
    /// |
    Pipe,
    /// ||
    DoublePipe,
    /// !
    Bang,
    /// =
    Equal,
    /// ==
    DoubleEqual,
    /// !=
    NotEqual,
    /// <
    LessThan,
    /// <=
    LessThanOrEqual,
    /// >
    GreaterThan,
    /// >=
    GreaterThanOrEqual,

    // Punctuation
    /// .
    Dot,
    /// ,
    Comma,
    /// ;
    Semicolon,
    /// :
    Colon,
    /// ?
    Question,
    /// (
    LeftParen,
    /// )
    RightParen,
    /// [
    LeftBracket,
    /// ]
    RightBracket,
}

impl<'input> Token<'input> {
    /// Text of a keyword token, used when a keyword appears in name position
    /// such as `list.contains(x)` or `value.is(...)`.
    pub fn keyword_text(&self) -> Option<&'static str> {
        match self {
            Token::True => Some("true"),
            Token::False => Some("false"),
            Token::Null => Some("null"),
            Token::And => Some("and"),
            Token::Or => Some("or"),
            Token::Xor => Some("xor"),
            Token::Implies => Some("implies"),
            Token::Not => Some("not"),
            Token::In => Some("in"),
            Token::Contains => Some("contains"),
            Token::Is => Some("is"),
            Token::Div => Some("div"),
            Token::Mod => Some("mod"),
            _ => None,
        }
    }
}

static RULES_KEYWORDS: Lazy<FxHashMap<&'static str, Token<'static>>> = Lazy::new(|| {
    let mut table = FxHashMap::default();
    table.insert("true", Token::True);
    table.insert("false", Token::False);
    table.insert("null", Token::Null);
    table.insert("and", Token::And);
    table.insert("or", Token::Or);
    table.insert("not", Token::Not);
    table
});

static FHIRPATH_KEYWORDS: Lazy<FxHashMap<&'static str, Token<'static>>> = Lazy::new(|| {
    let mut table = FxHashMap::default();
    table.insert("true", Token::True);
    table.insert("false", Token::False);
    table.insert("and", Token::And);
    table.insert("or", Token::Or);
    table.insert("xor", Token::Xor);
    table.insert("implies", Token::Implies);
    table.insert("in", Token::In);
    table.insert("contains", Token::Contains);
    table.insert("is", Token::Is);
    table.insert("div", Token::Div);
    table.insert("mod", Token::Mod);
    table
});

/// Tokenizer over a borrowed expression string
pub struct Tokenizer<'input> {
    input: &'input str,
    bytes: &'input [u8],
    pos: usize,
    token_start: usize,
    dialect: Dialect,
}

impl<'input> Tokenizer<'input> {
    /// Create a tokenizer for the given dialect
    pub fn new(input: &'input str, dialect: Dialect) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
            token_start: 0,
            dialect,
        }
    }

    /// Byte offset where the most recently returned token starts
    pub fn token_start(&self) -> usize {
        self.token_start
    }

    fn keyword_lookup(&self, word: &str) -> Option<Token<'input>> {
        let table = match self.dialect {
            Dialect::Rules => &*RULES_KEYWORDS,
            Dialect::FhirPath => &*FHIRPATH_KEYWORDS,
        };
        table.get(word).copied()
    }

    fn peek_byte(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn current_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn skip_whitespace_and_comments(&mut self) -> ParseResult<()> {
        loop {
            match self.peek_byte(0) {
                Some(b) if b.is_ascii_whitespace() => self.pos += 1,
                Some(b'/') if self.peek_byte(1) == Some(b'/') => {
                    while let Some(b) = self.peek_byte(0) {
                        if b == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                Some(b'/') if self.peek_byte(1) == Some(b'*') => {
                    let start = self.pos;
                    self.pos += 2;
                    loop {
                        match self.peek_byte(0) {
                            Some(b'*') if self.peek_byte(1) == Some(b'/') => {
                                self.pos += 2;
                                break;
                            }
                            Some(_) => self.pos += 1,
                            None => {
                                return Err(ParseError::unexpected("unterminated comment", start));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn scan_identifier(&mut self) -> &'input str {
        let start = self.pos;
        while let Some(ch) = self.current_char() {
            if ch == '_' || ch.is_ascii_alphanumeric() || UnicodeXID::is_xid_continue(ch) {
                self.pos += ch.len_utf8();
            } else {
                break;
            }
        }
        &self.input[start..self.pos]
    }

    fn scan_number(&mut self) -> ParseResult<Token<'input>> {
        let start = self.pos;
        while matches!(self.peek_byte(0), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        let is_decimal = self.peek_byte(0) == Some(b'.')
            && matches!(self.peek_byte(1), Some(b) if b.is_ascii_digit());
        if is_decimal {
            self.pos += 1;
            while matches!(self.peek_byte(0), Some(b) if b.is_ascii_digit()) {
                self.pos += 1;
            }
            return Ok(Token::Decimal(&self.input[start..self.pos]));
        }
        let literal = &self.input[start..self.pos];
        literal
            .parse::<i64>()
            .map(Token::Integer)
            .map_err(|_| ParseError::InvalidNumber {
                literal: literal.to_string(),
                position: start,
            })
    }

    fn scan_string(&mut self, quote: u8) -> ParseResult<&'input str> {
        let start = self.pos;
        self.pos += 1;
        let body_start = self.pos;
        while let Some(b) = self.peek_byte(0) {
            match b {
                b'\\' => self.pos += 2,
                b if b == quote => {
                    let body = &self.input[body_start..self.pos];
                    self.pos += 1;
                    return Ok(body);
                }
                _ => self.pos += 1,
            }
        }
        Err(ParseError::UnclosedString { position: start })
    }

    fn scan_date_time(&mut self) -> Token<'input> {
        // '@' already consumed
        let start = self.pos;
        while let Some(b) = self.peek_byte(0) {
            if b.is_ascii_digit() || matches!(b, b'-' | b':' | b'.' | b'+' | b'T' | b'Z') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = &self.input[start..self.pos];
        if text.contains('T') {
            Token::DateTime(text)
        } else {
            Token::Date(text)
        }
    }

    fn single(&mut self, token: Token<'input>) -> Token<'input> {
        self.pos += 1;
        token
    }

    fn double(&mut self, token: Token<'input>) -> Token<'input> {
        self.pos += 2;
        token
    }

    /// Produce the next token, or `None` at end of input
    pub fn next_token(&mut self) -> ParseResult<Option<Token<'input>>> {
        self.skip_whitespace_and_comments()?;
        self.token_start = self.pos;

        let Some(byte) = self.peek_byte(0) else {
            return Ok(None);
        };

        let token = match byte {
            b'.' => self.single(Token::Dot),
            b'(' => self.single(Token::LeftParen),
            b')' => self.single(Token::RightParen),
            b',' => self.single(Token::Comma),
            b'[' => self.single(Token::LeftBracket),
            b']' => self.single(Token::RightBracket),
            b';' => self.single(Token::Semicolon),
            b':' => self.single(Token::Colon),
            b'?' => self.single(Token::Question),
            b'+' => self.single(Token::Plus),
            b'-' => self.single(Token::Minus),
            b'*' => self.single(Token::Multiply),
            b'/' => self.single(Token::Divide),
            b'=' => match self.peek_byte(1) {
                Some(b'=') => self.double(Token::DoubleEqual),
                _ => self.single(Token::Equal),
            },
            b'!' => match self.peek_byte(1) {
                Some(b'=') => self.double(Token::NotEqual),
                _ => self.single(Token::Bang),
            },
            b'<' => match self.peek_byte(1) {
                Some(b'=') => self.double(Token::LessThanOrEqual),
                _ => self.single(Token::LessThan),
            },
            b'>' => match self.peek_byte(1) {
                Some(b'=') => self.double(Token::GreaterThanOrEqual),
                _ => self.single(Token::GreaterThan),
            },
            b'&' => match self.peek_byte(1) {
                Some(b'&') => self.double(Token::DoubleAmpersand),
                _ => self.single(Token::Ampersand),
            },
            b'|' => match self.peek_byte(1) {
                Some(b'|') => self.double(Token::DoublePipe),
                _ => self.single(Token::Pipe),
            },
            b'%' => {
                self.pos += 1;
                match self.dialect {
                    Dialect::FhirPath => match self.peek_byte(0) {
                        Some(b'\'') | Some(b'`') => {
                            let quote = self.bytes[self.pos];
                            Token::ExternalConstant(self.scan_string(quote)?)
                        }
                        _ => Token::ExternalConstant(self.scan_identifier()),
                    },
                    Dialect::Rules => Token::Percent,
                }
            }
            b'$' => {
                self.pos += 1;
                Token::Variable(self.scan_identifier())
            }
            b'@' => {
                self.pos += 1;
                self.scan_date_time()
            }
            b'\'' | b'"' => Token::String(self.scan_string(byte)?),
            b'`' => Token::Identifier(self.scan_string(b'`')?),
            b'0'..=b'9' => self.scan_number()?,
            _ => {
                let ch = self.current_char().unwrap_or('\u{fffd}');
                if ch == '_' || ch.is_ascii_alphabetic() || UnicodeXID::is_xid_start(ch) {
                    let word = self.scan_identifier();
                    self.keyword_lookup(word)
                        .unwrap_or(Token::Identifier(word))
                } else {
                    return Err(ParseError::InvalidCharacter {
                        character: ch,
                        position: self.pos,
                    });
                }
            }
        };

        Ok(Some(token))
    }

    /// Tokenize the whole input
    pub fn tokenize_all(&mut self) -> ParseResult<Vec<Token<'input>>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str, dialect: Dialect) -> Vec<Token<'_>> {
        Tokenizer::new(input, dialect).tokenize_all().unwrap()
    }

    #[test]
    fn test_rule_operators() {
        assert_eq!(
            tokens("a == 1 && !b || c != 'x'", Dialect::Rules),
            vec![
                Token::Identifier("a"),
                Token::DoubleEqual,
                Token::Integer(1),
                Token::DoubleAmpersand,
                Token::Bang,
                Token::Identifier("b"),
                Token::DoublePipe,
                Token::Identifier("c"),
                Token::NotEqual,
                Token::String("x"),
            ]
        );
    }

    #[test]
    fn test_dialect_keywords() {
        assert_eq!(
            tokens("contains", Dialect::Rules),
            vec![Token::Identifier("contains")]
        );
        assert_eq!(tokens("contains", Dialect::FhirPath), vec![Token::Contains]);
        assert_eq!(tokens("null", Dialect::Rules), vec![Token::Null]);
        assert_eq!(tokens("%", Dialect::Rules), vec![Token::Percent]);
    }

    #[test]
    fn test_fhirpath_literals() {
        assert_eq!(
            tokens("%today > @2023-01-01 and $this", Dialect::FhirPath),
            vec![
                Token::ExternalConstant("today"),
                Token::GreaterThan,
                Token::Date("2023-01-01"),
                Token::And,
                Token::Variable("this"),
            ]
        );
        assert_eq!(
            tokens("@2023-01-01T10:00:00Z", Dialect::FhirPath),
            vec![Token::DateTime("2023-01-01T10:00:00Z")]
        );
    }

    #[test]
    fn test_numbers_and_strings() {
        assert_eq!(
            tokens("3.25 \"it's\" 7", Dialect::Rules),
            vec![Token::Decimal("3.25"), Token::String("it's"), Token::Integer(7)]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            tokens("a /* note */ + // trailing\n b", Dialect::Rules),
            vec![Token::Identifier("a"), Token::Plus, Token::Identifier("b")]
        );
    }

    #[test]
    fn test_unclosed_string() {
        let err = Tokenizer::new("'abc", Dialect::Rules)
            .tokenize_all()
            .unwrap_err();
        assert_eq!(err, ParseError::UnclosedString { position: 0 });
    }

    #[test]
    fn test_invalid_character() {
        let err = Tokenizer::new("a # b", Dialect::Rules)
            .tokenize_all()
            .unwrap_err();
        assert!(matches!(
            err,
            ParseError::InvalidCharacter { character: '#', .. }
        ));
    }
}
