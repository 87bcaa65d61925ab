//! # Predicate Parser
//!
//! Hand-written recursive-descent parser for the MongoDB-like filter DSL:
//!
//! ```text
//! {foo: "bar", "age": {$gte: 18}, $or: [{a: 1}, {b: {$exists: true}}]}
//! ```
//!
//! Labels may be quoted or bare. Parsing works on byte positions without a
//! tokenizer; errors are reported as `char <pos>: <context>: <message>` where
//! the context is the chain of labels enclosing the failure.

use serde_json::{Map, Value};

use super::errors::{QueryError, QueryResult};
use super::predicate::*;
use super::value::number_value;

type ParseResult<T> = Result<T, String>;

impl Predicate {
    /// Parse a predicate expression. The empty string is the empty predicate.
    pub fn parse(text: &str) -> QueryResult<Predicate> {
        if text.is_empty() {
            return Ok(Predicate::new());
        }
        PredicateParser::new(text).parse()
    }
}

/// Shorthand for [`Predicate::parse`]
pub fn parse_predicate(text: &str) -> QueryResult<Predicate> {
    Predicate::parse(text)
}

pub(crate) struct PredicateParser<'a> {
    query: &'a str,
    pos: usize,
}

/// Render a byte the way error messages show it
pub(crate) fn show_char(c: u8) -> String {
    if c == 0 {
        "'\\x00'".to_string()
    } else {
        format!("{:?}", c as char)
    }
}

impl<'a> PredicateParser<'a> {
    pub(crate) fn new(query: &'a str) -> Self {
        Self { query, pos: 0 }
    }

    fn parse(mut self) -> QueryResult<Predicate> {
        self.eat_whitespaces();
        let exprs = self
            .parse_expressions()
            .map_err(|msg| QueryError::syntax(self.pos, msg))?;
        self.eat_whitespaces();
        if self.more() {
            return Err(QueryError::syntax(
                self.pos,
                format!("expected EOF got {}", show_char(self.peek())),
            ));
        }
        Ok(Predicate(exprs))
    }

    /// Parse one or more expressions enclosed in braces:
    /// `{foo: "bar", bar: "baz"}`, `{$or: [...]}`, `{}`.
    fn parse_expressions(&mut self) -> ParseResult<Vec<Expression>> {
        let mut exprs = Vec::new();
        if !self.expect(b'{') {
            return Err(format!("expected '{{' got {}", show_char(self.peek())));
        }
        self.eat_whitespaces();
        if self.expect(b'}') {
            return Ok(exprs);
        }
        loop {
            self.eat_whitespaces();
            exprs.push(self.parse_expression()?);
            self.eat_whitespaces();
            if !self.expect(b',') {
                break;
            }
        }
        if !self.expect(b'}') {
            return Err(format!("expected '}}' got {}", show_char(self.peek())));
        }
        Ok(exprs)
    }

    /// Parse a single `label: command` expression
    fn parse_expression(&mut self) -> ParseResult<Expression> {
        let start = self.pos;
        let label = self.parse_label()?;
        self.eat_whitespaces();
        match label.as_str() {
            OP_AND | OP_OR => {
                let subs = self
                    .parse_sub_expressions()
                    .map_err(|e| format!("{}: {}", label, e))?;
                if subs.len() < 2 {
                    return Err(format!("{}: two expressions or more required", label));
                }
                if label == OP_AND {
                    Ok(Expression::And(subs))
                } else {
                    Ok(Expression::Or(subs))
                }
            }
            OP_EXISTS | OP_IN | OP_NOT_IN | OP_NOT_EQUAL | OP_REGEX | OP_ELEM_MATCH
            | OP_LOWER_THAN | OP_LOWER_OR_EQUAL | OP_GREATER_THAN | OP_GREATER_OR_EQUAL => {
                self.pos = start;
                Err(format!("{}: invalid placement", label))
            }
            _ => self
                .parse_command(&label)
                .map_err(|e| format!("{}: {}", label, e)),
        }
    }

    /// Parse `[{exp}, {exp, exp}...]`. A block of several expressions becomes
    /// an `And`, an empty block is dropped.
    fn parse_sub_expressions(&mut self) -> ParseResult<Vec<Expression>> {
        if !self.expect(b'[') {
            return Err(format!("expected '[' got {}", show_char(self.peek())));
        }
        let mut subs = Vec::new();
        self.eat_whitespaces();
        if self.expect(b']') {
            return Ok(subs);
        }
        loop {
            self.eat_whitespaces();
            let mut exprs = self.parse_expressions()?;
            match exprs.len() {
                0 => {}
                1 => subs.push(exprs.remove(0)),
                _ => subs.push(Expression::And(exprs)),
            }
            self.eat_whitespaces();
            if !self.expect(b',') {
                break;
            }
        }
        if !self.expect(b']') {
            return Err(format!("expected ']' got {}", show_char(self.peek())));
        }
        Ok(subs)
    }

    /// Parse the command following a field label: an operator block such as
    /// `{$ne: "foo"}`, or any value which makes an equality.
    fn parse_command(&mut self, field: &str) -> ParseResult<Expression> {
        let start = self.pos;
        if self.expect(b'{') {
            self.eat_whitespaces();
            // `{}` is an empty document value
            if !self.expect(b'}') {
                let label = self.parse_label()?;
                self.eat_whitespaces();
                if let Some(expr) = self.parse_operator(field, &label)? {
                    return Ok(expr);
                }
            }
        }
        // Not an operator block: parse the whole thing as a value
        self.pos = start;
        let value = self.parse_value()?;
        Ok(Expression::Equal {
            field: field.to_string(),
            value,
        })
    }

    /// Parse the operand of `op` and the closing brace. Returns `None` when
    /// `op` is not an operator.
    fn parse_operator(&mut self, field: &str, op: &str) -> ParseResult<Option<Expression>> {
        let field = field.to_string();
        let expr = match op {
            OP_EXISTS => {
                let exists = self.parse_bool().map_err(|e| format!("{}: {}", op, e))?;
                if exists {
                    Expression::Exist { field }
                } else {
                    Expression::NotExist { field }
                }
            }
            OP_IN | OP_NOT_IN => {
                let values = self.parse_values().map_err(|e| format!("{}: {}", op, e))?;
                if op == OP_IN {
                    Expression::In { field, values }
                } else {
                    Expression::NotIn { field, values }
                }
            }
            OP_NOT_EQUAL => {
                let value = self.parse_value().map_err(|e| format!("{}: {}", op, e))?;
                Expression::NotEqual { field, value }
            }
            OP_LOWER_THAN | OP_LOWER_OR_EQUAL | OP_GREATER_THAN | OP_GREATER_OR_EQUAL => {
                let value = self.parse_number().map_err(|e| format!("{}: {}", op, e))?;
                match op {
                    OP_LOWER_THAN => Expression::LowerThan { field, value },
                    OP_LOWER_OR_EQUAL => Expression::LowerOrEqual { field, value },
                    OP_GREATER_THAN => Expression::GreaterThan { field, value },
                    _ => Expression::GreaterOrEqual { field, value },
                }
            }
            OP_REGEX => {
                let source = self.parse_string().map_err(|e| format!("{}: {}", op, e))?;
                let pattern = Pattern::new(&source)
                    .map_err(|e| format!("{}: invalid regex: {}", op, e))?;
                Expression::Regex { field, pattern }
            }
            OP_ELEM_MATCH => {
                let exprs = self
                    .parse_expressions()
                    .map_err(|e| format!("{}: {}", op, e))?;
                Expression::ElemMatch { field, exprs }
            }
            _ => return Ok(None),
        };
        self.eat_whitespaces();
        if !self.expect(b'}') {
            return Err(format!("{}: expected '}}' got {}", op, show_char(self.peek())));
        }
        Ok(Some(expr))
    }

    /// Parse a quoted or bare label and move the cursor past the `:`
    fn parse_label(&mut self) -> ParseResult<String> {
        let label = if self.peek() == b'"' {
            self.parse_string()
                .map_err(|e| format!("invalid label: {}", e))?
        } else {
            let bytes = self.query.as_bytes();
            let mut end = self.pos;
            while end < bytes.len() && is_label_char(bytes[end]) {
                end += 1;
            }
            if end == self.pos {
                return Err(format!("expected a label got {}", show_char(self.peek())));
            }
            let label = self.query[self.pos..end].to_string();
            self.pos = end;
            label
        };
        self.eat_whitespaces();
        if !self.expect(b':') {
            return Err(format!("expected ':' got {}", show_char(self.peek())));
        }
        Ok(label)
    }

    /// Parse a JSON-like value, document keys may be bare
    fn parse_value(&mut self) -> ParseResult<Value> {
        let c = self.peek();
        match c {
            b'"' => self.parse_string().map(Value::String),
            b'{' => self.parse_dict().map(Value::Object),
            b'[' => self.parse_values().map(Value::Array),
            b't' | b'f' => self.parse_bool().map(Value::Bool),
            b'n' => self.parse_null(),
            b'0'..=b'9' | b'-' => {
                let f = self.parse_number()?;
                number_value(f).ok_or_else(|| "not a number: out of range".to_string())
            }
            _ => Err(format!("unexpected char {}", show_char(c))),
        }
    }

    /// Parse a list of values `[value, value...]`
    fn parse_values(&mut self) -> ParseResult<Vec<Value>> {
        if !self.expect(b'[') {
            return Err(format!("expected '[' got {}", show_char(self.peek())));
        }
        let mut values = Vec::new();
        self.eat_whitespaces();
        if self.expect(b']') {
            return Ok(values);
        }
        loop {
            self.eat_whitespaces();
            let value = self
                .parse_value()
                .map_err(|e| format!("item #{}: {}", values.len(), e))?;
            values.push(value);
            self.eat_whitespaces();
            if !self.expect(b',') {
                break;
            }
        }
        if !self.expect(b']') {
            return Err(format!("expected ',' or ']' got {}", show_char(self.peek())));
        }
        Ok(values)
    }

    /// Parse a document of `key: value` with optionally quoted keys
    fn parse_dict(&mut self) -> ParseResult<Map<String, Value>> {
        if !self.expect(b'{') {
            return Err(format!("expected '{{' got {}", show_char(self.peek())));
        }
        let mut dict = Map::new();
        self.eat_whitespaces();
        if self.expect(b'}') {
            return Ok(dict);
        }
        loop {
            self.eat_whitespaces();
            let label = self.parse_label()?;
            self.eat_whitespaces();
            let value = self.parse_value()?;
            dict.insert(label, value);
            self.eat_whitespaces();
            if !self.expect(b',') {
                break;
            }
        }
        if !self.expect(b'}') {
            return Err(format!("expected '}}' got {}", show_char(self.peek())));
        }
        Ok(dict)
    }

    fn parse_bool(&mut self) -> ParseResult<bool> {
        if self.rest().starts_with("true") {
            self.pos += 4;
            return Ok(true);
        }
        if self.rest().starts_with("false") {
            self.pos += 5;
            return Ok(false);
        }
        Err("not a boolean".to_string())
    }

    fn parse_null(&mut self) -> ParseResult<Value> {
        if self.rest().starts_with("null") {
            self.pos += 4;
            return Ok(Value::Null);
        }
        Err("not null".to_string())
    }

    /// Parse a finite number as float. The scan is permissive, the float
    /// parser rejects malformed input such as `1ee0`.
    fn parse_number(&mut self) -> ParseResult<f64> {
        let end = scan_number(self.query.as_bytes(), self.pos).ok_or("not a number")?;
        let f: f64 = self.query[self.pos..end]
            .parse()
            .map_err(|e| format!("not a number: parsing {:?}: {}", &self.query[self.pos..end], e))?;
        if !f.is_finite() {
            return Err("not a number: out of range".to_string());
        }
        self.pos = end;
        Ok(f)
    }

    /// Parse a double-quoted string
    fn parse_string(&mut self) -> ParseResult<String> {
        let (value, end) = scan_string(self.query, self.pos, b'"')?;
        self.pos = end;
        Ok(value)
    }

    fn rest(&self) -> &str {
        &self.query[self.pos..]
    }

    fn more(&self) -> bool {
        self.pos < self.query.len()
    }

    /// Advance the cursor if the current char is `c`
    fn expect(&mut self, c: u8) -> bool {
        if self.more() && self.peek() == c {
            self.pos += 1;
            return true;
        }
        false
    }

    /// Current char, 0 at end of input
    fn peek(&self) -> u8 {
        self.query.as_bytes().get(self.pos).copied().unwrap_or(0)
    }

    fn eat_whitespaces(&mut self) {
        while matches!(self.peek(), b' ' | b'\n' | b'\r' | b'\t') {
            self.pos += 1;
        }
    }
}

fn is_label_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, b'$' | b'.' | b'_' | b'-')
}

/// Scan a number starting at `start`, returning its end offset
pub(crate) fn scan_number(bytes: &[u8], start: usize) -> Option<usize> {
    let mut end = start;
    if bytes.get(end) == Some(&b'-') {
        end += 1;
    }
    if !bytes.get(end).map_or(false, u8::is_ascii_digit) {
        return None;
    }
    end += 1;
    while let Some(&c) = bytes.get(end) {
        let exponent_sign = (c == b'-' || c == b'+') && bytes[end - 1] == b'e';
        if c.is_ascii_digit() || c == b'.' || c == b'e' || exponent_sign {
            end += 1;
        } else {
            break;
        }
    }
    Some(end)
}

/// Scan a string quoted with `quote` starting at `start`. Returns the
/// unescaped value and the offset right after the closing quote.
pub(crate) fn scan_string(text: &str, start: usize, quote: u8) -> ParseResult<(String, usize)> {
    let bytes = text.as_bytes();
    if bytes.get(start) != Some(&quote) {
        return Err("not a string".to_string());
    }
    let mut end = start + 1;
    let mut escaped = false;
    let mut simple = true;
    let mut done = false;
    while end < bytes.len() {
        let c = bytes[end];
        end += 1;
        if escaped {
            escaped = false;
        } else if c == b'\\' {
            escaped = true;
            simple = false;
        } else if c == quote {
            done = true;
            break;
        }
    }
    if !done {
        return Err("not a string: unexpected EOF".to_string());
    }
    let inner = &text[start + 1..end - 1];
    if simple {
        return Ok((inner.to_string(), end));
    }
    unescape(inner, quote)
        .map(|s| (s, end))
        .map_err(|e| format!("not a string: {}", e))
}

/// Resolve backslash escapes the JSON way; a single-quoted string may also
/// escape its own quote.
fn unescape(inner: &str, quote: u8) -> Result<String, serde_json::Error> {
    let json = if quote == b'"' {
        format!("\"{}\"", inner)
    } else {
        format!("\"{}\"", inner.replace("\\'", "'").replace('"', "\\\""))
    };
    serde_json::from_str(&json)
}
