//! Eligibility rule parser.
//!
//! Recursive descent parser for comma-separated rule lists such as
//! `npr > 0, timeToMarket <= 20180801, name !contains "ST"`. Errors carry the
//! character offset of the offending token.

use crate::domain::eligibility::{Comparison, EligibilityRule};
use crate::domain::error::ParseError;

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            position: self.pos,
        }
    }

    fn found(&self) -> String {
        self.peek()
            .map(|c| format!("'{}'", c))
            .unwrap_or_else(|| "end of input".to_string())
    }

    fn consume_exact(&mut self, s: &str) -> bool {
        if self.remaining().starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn parse_identifier(&mut self) -> Result<String, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(self.error(format!("expected column name, found {}", self.found())));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0;

        if self.peek() == Some('-') {
            self.advance();
        }

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            return Err(ParseError {
                message: "expected number".to_string(),
                position: start,
            });
        }

        let num_str = &self.input[start..self.pos];
        num_str.parse::<f64>().map_err(|_| ParseError {
            message: format!("invalid number: {}", num_str),
            position: start,
        })
    }

    /// A double-quoted string, or a bare word up to whitespace or `;`.
    fn parse_text(&mut self) -> Result<String, ParseError> {
        self.skip_whitespace();
        let start = self.pos;

        if self.peek() == Some('"') {
            self.advance();
            let body_start = self.pos;
            while let Some(ch) = self.peek() {
                if ch == '"' {
                    let text = self.input[body_start..self.pos].to_string();
                    self.advance();
                    return Ok(text);
                }
                self.advance();
            }
            return Err(ParseError {
                message: "unterminated string".to_string(),
                position: start,
            });
        }

        while let Some(ch) = self.peek() {
            if ch.is_whitespace() || ch == ',' {
                break;
            }
            self.advance();
        }
        if self.pos == start {
            return Err(self.error(format!("expected text, found {}", self.found())));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_comparison(&mut self) -> Option<Comparison> {
        // Two-character operators first so `>=` is not read as `>`.
        let ops = [
            (">=", Comparison::Ge),
            ("<=", Comparison::Le),
            ("==", Comparison::Eq),
            ("!=", Comparison::Ne),
            (">", Comparison::Gt),
            ("<", Comparison::Lt),
        ];
        ops.into_iter()
            .find(|(symbol, _)| self.consume_exact(symbol))
            .map(|(_, op)| op)
    }

    fn parse_rule(&mut self) -> Result<EligibilityRule, ParseError> {
        let column = self.parse_identifier()?;
        self.skip_whitespace();

        if self.consume_exact("!contains") {
            let needle = self.parse_text()?;
            return Ok(EligibilityRule::Contains {
                column,
                needle,
                negated: true,
            });
        }
        if self.consume_exact("contains") {
            let needle = self.parse_text()?;
            return Ok(EligibilityRule::Contains {
                column,
                needle,
                negated: false,
            });
        }

        let op = self.parse_comparison().ok_or_else(|| {
            self.error(format!(
                "expected operator (>, >=, <, <=, ==, !=, contains, !contains), found {}",
                self.found()
            ))
        })?;
        let value = self.parse_number()?;
        Ok(EligibilityRule::Compare { column, op, value })
    }

    fn parse(&mut self) -> Result<Vec<EligibilityRule>, ParseError> {
        let mut rules = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek().is_none() {
                break;
            }
            if self.peek() == Some(',') {
                self.advance();
                continue;
            }

            rules.push(self.parse_rule()?);

            self.skip_whitespace();
            match self.peek() {
                None => break,
                Some(',') => {
                    self.advance();
                }
                Some(_) => {
                    return Err(self.error(format!("expected ',', found {}", self.found())));
                }
            }
        }
        Ok(rules)
    }
}

/// Parse a comma-separated list of eligibility rules. Empty input yields no rules.
pub fn parse(input: &str) -> Result<Vec<EligibilityRule>, ParseError> {
    let mut parser = Parser::new(input);
    parser.parse()
}
