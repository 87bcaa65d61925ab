//! Projection parser
//!
//! ```text
//! selection := field (',' field)*
//! field     := [alias ':'] name ['(' params ')'] ['{' [selection] '}']
//! params    := pname (':'|'=') pvalue (',' pname (':'|'=') pvalue)*
//! ```
//!
//! Param values are single or double quoted strings, numbers or booleans.

use serde_json::Value;

use super::errors::{QueryError, QueryResult};
use super::predicate_parser::{scan_number, scan_string};
use super::projection::{Projection, ProjectionField, WILDCARD};
use super::value::number_value;
use crate::schema::Params;

type ParseResult<T> = Result<T, (usize, String)>;

impl Projection {
    /// Parse a projection expression. Blank text is the empty projection.
    pub fn parse(text: &str) -> QueryResult<Projection> {
        if text.trim().is_empty() {
            return Ok(Projection::new());
        }
        ProjectionParser { exp: text, pos: 0 }
            .parse_selection(false)
            .map_err(|(pos, message)| QueryError::syntax(pos, message))
    }
}

/// Shorthand for [`Projection::parse`]
pub fn parse_projection(text: &str) -> QueryResult<Projection> {
    Projection::parse(text)
}

struct ProjectionParser<'a> {
    exp: &'a str,
    pos: usize,
}

impl<'a> ProjectionParser<'a> {
    /// Parse a comma separated list of fields. When `opened`, the list is
    /// enclosed in braces and the closing brace is consumed.
    fn parse_selection(&mut self, opened: bool) -> ParseResult<Projection> {
        let mut fields = Vec::new();
        loop {
            self.eat_whitespaces();
            if opened && fields.is_empty() && self.expect(b'}') {
                return Ok(Projection(fields));
            }
            fields.push(self.parse_field()?);
            self.eat_whitespaces();
            match self.peek() {
                b',' => self.pos += 1,
                b'}' if opened => {
                    self.pos += 1;
                    return Ok(Projection(fields));
                }
                b'}' => return Err(self.error("looking for field name and got `}'")),
                _ if !self.more() => {
                    if opened {
                        return Err(self.error("looking for `}'"));
                    }
                    return Ok(Projection(fields));
                }
                c => return Err(self.error(format!("invalid char `{}`", c as char))),
            }
        }
    }

    fn parse_field(&mut self) -> ParseResult<ProjectionField> {
        let start = self.pos;
        let mut name = self.scan_name();
        let mut alias = None;
        self.eat_whitespaces();
        if self.expect(b':') {
            if name.is_empty() {
                self.pos = start;
                return Err(self.error("looking for field name"));
            }
            self.eat_whitespaces();
            alias = Some(name);
            name = self.scan_name();
        }
        if name.is_empty() {
            return Err(self.error("looking for field name"));
        }
        let mut field = ProjectionField {
            name,
            alias,
            ..ProjectionField::default()
        };
        self.eat_whitespaces();
        if self.expect(b'(') {
            field.params = self.parse_params()?;
            self.eat_whitespaces();
        }
        if self.expect(b'{') {
            field.children = Some(self.parse_selection(true)?);
        }
        Ok(field)
    }

    /// Parse params up to and including the closing parenthesis
    fn parse_params(&mut self) -> ParseResult<Params> {
        let mut params = Params::new();
        loop {
            self.eat_whitespaces();
            let name = self.scan_name();
            if name.is_empty() || name == WILDCARD {
                return Err(self.error("looking for parameter name"));
            }
            self.eat_whitespaces();
            if !self.expect(b':') && !self.expect(b'=') {
                return Err(self.error("looking for `:' or `='"));
            }
            self.eat_whitespaces();
            let value = self.parse_param_value()?;
            params.insert(name, value);
            self.eat_whitespaces();
            match self.peek() {
                b')' => {
                    self.pos += 1;
                    return Ok(params);
                }
                b',' => self.pos += 1,
                _ => return Err(self.error("looking for `,' or `)'")),
            }
        }
    }

    fn parse_param_value(&mut self) -> ParseResult<Value> {
        match self.peek() {
            quote @ (b'"' | b'\'') => {
                let (s, end) = scan_string(self.exp, self.pos, quote).map_err(|e| self.error(e))?;
                self.pos = end;
                Ok(Value::String(s))
            }
            b'0'..=b'9' | b'-' => {
                let end = scan_number(self.exp.as_bytes(), self.pos)
                    .ok_or_else(|| self.error("not a number"))?;
                let f: f64 = self.exp[self.pos..end]
                    .parse()
                    .map_err(|e| self.error(format!("not a number: {}", e)))?;
                let value = number_value(f).ok_or_else(|| self.error("not a number: out of range"))?;
                self.pos = end;
                Ok(value)
            }
            b't' if self.exp[self.pos..].starts_with("true") => {
                self.pos += 4;
                Ok(Value::Bool(true))
            }
            b'f' if self.exp[self.pos..].starts_with("false") => {
                self.pos += 5;
                Ok(Value::Bool(false))
            }
            _ => Err(self.error("looking for value")),
        }
    }

    /// Scan `[A-Za-z0-9_-]+` or a lone `*`
    fn scan_name(&mut self) -> String {
        if self.peek() == b'*' {
            self.pos += 1;
            return WILDCARD.to_string();
        }
        let bytes = self.exp.as_bytes();
        let start = self.pos;
        while self.pos < bytes.len()
            && (bytes[self.pos].is_ascii_alphanumeric() || matches!(bytes[self.pos], b'_' | b'-'))
        {
            self.pos += 1;
        }
        self.exp[start..self.pos].to_string()
    }

    fn error(&self, message: impl Into<String>) -> (usize, String) {
        (self.pos, message.into())
    }

    fn more(&self) -> bool {
        self.pos < self.exp.len()
    }

    fn peek(&self) -> u8 {
        self.exp.as_bytes().get(self.pos).copied().unwrap_or(0)
    }

    fn expect(&mut self, c: u8) -> bool {
        if self.more() && self.peek() == c {
            self.pos += 1;
            return true;
        }
        false
    }

    fn eat_whitespaces(&mut self) {
        while matches!(self.peek(), b' ' | b'\n' | b'\r' | b'\t') {
            self.pos += 1;
        }
    }
}
