//! Parser for literal list/mapping expressions as written by language models.
//!
//! Models asked for "a list of dictionaries" answer in Python literal syntax
//! about as often as in JSON. This parser accepts both: single, double and
//! triple-quoted strings (with adjacent-string concatenation), `True`,
//! `False`, `None`, tuples, trailing commas and `#` comments, alongside the
//! JSON spellings `true`, `false` and `null`. The result is a
//! `serde_json::Value`; mapping keys are converted to strings.

use serde_json::{Map, Number, Value};
use thiserror::Error;

const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at byte {offset}")]
pub struct LiteralError {
    pub offset: usize,
    pub message: String,
}

/// Parse a complete literal expression. Trailing non-whitespace is an error.
pub fn parse_literal(input: &str) -> Result<Value, LiteralError> {
    let mut cursor = Cursor { src: input, pos: 0 };
    cursor.skip_trivia();
    let value = cursor.value(0)?;
    cursor.skip_trivia();
    if cursor.pos < input.len() {
        return Err(cursor.error("unexpected trailing characters"));
    }
    Ok(value)
}

/// Parse one literal expression at the start of `input`, ignoring whatever
/// follows it. Returns the value and the number of bytes it spans.
pub fn parse_literal_prefix(input: &str) -> Result<(Value, usize), LiteralError> {
    let mut cursor = Cursor { src: input, pos: 0 };
    cursor.skip_trivia();
    let value = cursor.value(0)?;
    Ok((value, cursor.pos))
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> LiteralError {
        LiteralError {
            offset: self.pos,
            message: message.into(),
        }
    }

    /// Skip whitespace and `#` line comments.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(ch) if ch.is_whitespace() => {
                    self.bump();
                }
                Some('#') => {
                    while let Some(ch) = self.bump() {
                        if ch == '\n' {
                            break;
                        }
                    }
                }
                _ => return,
            }
        }
    }

    fn value(&mut self, depth: usize) -> Result<Value, LiteralError> {
        if depth > MAX_DEPTH {
            return Err(self.error("literal nested too deeply"));
        }
        match self.peek() {
            Some('[') => {
                self.bump();
                Ok(Value::Array(self.sequence(']', depth)?))
            }
            Some('(') => self.tuple(depth),
            Some('{') => self.mapping(depth),
            Some('\'' | '"') => self.strings(false),
            Some(ch) if ch.is_ascii_digit() || matches!(ch, '-' | '+' | '.') => self.number(),
            Some(ch) if ch.is_alphabetic() || ch == '_' => self.word(),
            Some(ch) => Err(self.error(format!("unexpected character {ch:?}"))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    /// Comma-separated values up to `close`; the opening bracket is consumed.
    fn sequence(&mut self, close: char, depth: usize) -> Result<Vec<Value>, LiteralError> {
        let mut items = Vec::new();
        loop {
            self.skip_trivia();
            if self.eat(close) {
                return Ok(items);
            }
            items.push(self.value(depth + 1)?);
            self.skip_trivia();
            if self.eat(',') {
                continue;
            }
            if self.eat(close) {
                return Ok(items);
            }
            return Err(self.error(format!("expected ',' or '{close}'")));
        }
    }

    /// `(a, b)` is a tuple; `(a)` is just a parenthesized value.
    fn tuple(&mut self, depth: usize) -> Result<Value, LiteralError> {
        self.bump();
        self.skip_trivia();
        if self.eat(')') {
            return Ok(Value::Array(Vec::new()));
        }
        let first = self.value(depth + 1)?;
        self.skip_trivia();
        if self.eat(')') {
            return Ok(first);
        }
        if !self.eat(',') {
            return Err(self.error("expected ',' or ')'"));
        }
        let mut items = vec![first];
        items.extend(self.sequence(')', depth)?);
        Ok(Value::Array(items))
    }

    fn mapping(&mut self, depth: usize) -> Result<Value, LiteralError> {
        self.bump();
        let mut map = Map::new();
        loop {
            self.skip_trivia();
            if self.eat('}') {
                return Ok(Value::Object(map));
            }
            let key_offset = self.pos;
            let key = self.value(depth + 1)?;
            self.skip_trivia();
            if !self.eat(':') {
                return Err(
                    self.error("expected ':' after mapping key (set literals are not supported)")
                );
            }
            self.skip_trivia();
            let value = self.value(depth + 1)?;
            let key = key_text(key).ok_or(LiteralError {
                offset: key_offset,
                message: "mapping key must be a string, number, boolean or None".to_string(),
            })?;
            map.insert(key, value);
            self.skip_trivia();
            if self.eat(',') {
                continue;
            }
            if self.eat('}') {
                return Ok(Value::Object(map));
            }
            return Err(self.error("expected ',' or '}'"));
        }
    }

    /// One or more adjacent string literals, concatenated.
    fn strings(&mut self, raw: bool) -> Result<Value, LiteralError> {
        let mut text = self.string_body(raw)?;
        loop {
            let save = self.pos;
            self.skip_trivia();
            match self.peek() {
                Some('\'' | '"') => text.push_str(&self.string_body(false)?),
                _ => {
                    self.pos = save;
                    return Ok(Value::String(text));
                }
            }
        }
    }

    fn string_body(&mut self, raw: bool) -> Result<String, LiteralError> {
        let start = self.pos;
        let quote = self
            .bump()
            .ok_or_else(|| self.error("expected string"))?;
        let triple: String = std::iter::repeat_n(quote, 3).collect();
        let is_triple = self.rest().starts_with(&triple[1..]);
        if is_triple {
            self.pos += 2 * quote.len_utf8();
        }

        let mut out = String::new();
        loop {
            if is_triple {
                if self.rest().starts_with(triple.as_str()) {
                    self.pos += triple.len();
                    return Ok(out);
                }
            } else if self.peek() == Some(quote) {
                self.bump();
                return Ok(out);
            }
            let ch = match self.bump() {
                Some(ch) => ch,
                None => {
                    return Err(LiteralError {
                        offset: start,
                        message: "unterminated string".to_string(),
                    });
                }
            };
            match ch {
                '\n' if !is_triple => {
                    return Err(LiteralError {
                        offset: start,
                        message: "unterminated string".to_string(),
                    });
                }
                '\\' if raw => {
                    out.push('\\');
                    if let Some(next) = self.bump() {
                        out.push(next);
                    }
                }
                '\\' => self.escape(&mut out)?,
                other => out.push(other),
            }
        }
    }

    fn escape(&mut self, out: &mut String) -> Result<(), LiteralError> {
        let ch = self.bump().ok_or_else(|| self.error("dangling escape"))?;
        match ch {
            '\n' => {}
            '\\' | '\'' | '"' | '/' => out.push(ch),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            '0' => out.push('\0'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0C}'),
            'v' => out.push('\u{0B}'),
            'x' => out.push(self.hex_char(2)?),
            'u' => out.push(self.hex_char(4)?),
            'U' => out.push(self.hex_char(8)?),
            other => {
                out.push('\\');
                out.push(other);
            }
        }
        Ok(())
    }

    fn hex_char(&mut self, digits: usize) -> Result<char, LiteralError> {
        let hex = self
            .rest()
            .get(..digits)
            .filter(|hex| hex.chars().all(|c| c.is_ascii_hexdigit()))
            .ok_or_else(|| self.error("invalid hex escape"))?;
        let code = u32::from_str_radix(hex, 16).map_err(|_| self.error("invalid hex escape"))?;
        let ch = char::from_u32(code).ok_or_else(|| self.error("escape is not a valid character"))?;
        self.pos += digits;
        Ok(ch)
    }

    fn number(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        if matches!(self.peek(), Some('-' | '+')) {
            self.bump();
        }
        let mut is_float = false;
        while let Some(ch) = self.peek() {
            match ch {
                '0'..='9' | '_' => {}
                '.' => is_float = true,
                'e' | 'E' => {
                    is_float = true;
                    self.bump();
                    if matches!(self.peek(), Some('-' | '+')) {
                        self.bump();
                    }
                    continue;
                }
                _ => break,
            }
            self.bump();
        }
        let text: String = self.src[start..self.pos]
            .chars()
            .filter(|c| *c != '_' && *c != '+')
            .collect();
        let invalid = || LiteralError {
            offset: start,
            message: format!("invalid number {:?}", &self.src[start..self.pos]),
        };
        if !is_float {
            if let Ok(int) = text.parse::<i64>() {
                return Ok(Value::Number(int.into()));
            }
        }
        let float: f64 = text.parse().map_err(|_| invalid())?;
        Number::from_f64(float).map(Value::Number).ok_or_else(invalid)
    }

    /// Keyword constants, or a string prefix such as `r'...'`.
    fn word(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let word = &self.src[start..self.pos];
        match word {
            "True" | "true" => Ok(Value::Bool(true)),
            "False" | "false" => Ok(Value::Bool(false)),
            "None" | "null" => Ok(Value::Null),
            prefix if matches!(self.peek(), Some('\'' | '"')) && is_string_prefix(prefix) => {
                let raw = prefix.chars().any(|c| c.eq_ignore_ascii_case(&'r'));
                self.strings(raw)
            }
            _ => Err(LiteralError {
                offset: start,
                message: format!("unexpected name {word:?}"),
            }),
        }
    }
}

fn is_string_prefix(prefix: &str) -> bool {
    matches!(
        prefix.to_ascii_lowercase().as_str(),
        "r" | "u" | "b" | "br" | "rb"
    )
}

fn key_text(key: Value) -> Option<String> {
    match key {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(true) => Some("True".to_string()),
        Value::Bool(false) => Some("False".to_string()),
        Value::Null => Some("None".to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_python_style_list_of_dicts() {
        let value = parse_literal(
            "[{'description': 'class Foo', 'methods': ['bar', 'baz'], 'abstract': False, 'parent': None}]",
        )
        .expect("parse");
        assert_eq!(
            value,
            json!([{
                "description": "class Foo",
                "methods": ["bar", "baz"],
                "abstract": false,
                "parent": null,
            }])
        );
    }

    #[test]
    fn accepts_json_spellings_and_trailing_commas() {
        let value = parse_literal("[{\"a\": true, \"b\": null, \"c\": 1.5,},]").expect("parse");
        assert_eq!(value, json!([{"a": true, "b": null, "c": 1.5}]));
    }

    #[test]
    fn concatenates_adjacent_strings_and_decodes_escapes() {
        let value = parse_literal("['it\\'s ' \"a\\ttab\"\n  'and\\x21']").expect("parse");
        assert_eq!(value, json!(["it's a\ttaband!"]));
    }

    #[test]
    fn triple_quoted_strings_span_lines() {
        let value = parse_literal("{'doc': '''line one\nline two'''}").expect("parse");
        assert_eq!(value, json!({"doc": "line one\nline two"}));
    }

    #[test]
    fn tuples_become_arrays_and_parens_group() {
        let value = parse_literal("[(0, 0), (1), ()]").expect("parse");
        assert_eq!(value, json!([[0, 0], 1, []]));
    }

    #[test]
    fn non_string_keys_are_stringified() {
        let value = parse_literal("{1: 'one', True: 'yes', None: 'nothing'}").expect("parse");
        assert_eq!(value, json!({"1": "one", "True": "yes", "None": "nothing"}));
    }

    #[test]
    fn comments_and_negative_numbers() {
        let value = parse_literal("[\n  -3,  # offset\n  2e3,\n  1_000,\n]").expect("parse");
        assert_eq!(value, json!([-3, 2000.0, 1000]));
    }

    #[test]
    fn raw_strings_keep_backslashes() {
        let value = parse_literal(r"[r'\d+']").expect("parse");
        assert_eq!(value, json!([r"\d+"]));
    }

    #[test]
    fn rejects_unterminated_string() {
        let err = parse_literal("['open").unwrap_err();
        assert!(err.message.contains("unterminated"), "{err}");
        assert_eq!(err.offset, 1);
    }

    #[test]
    fn rejects_trailing_prose() {
        let err = parse_literal("[1, 2] thanks!").unwrap_err();
        assert!(err.message.contains("trailing"), "{err}");
    }

    #[test]
    fn prefix_parse_stops_after_the_value() {
        let input = "[1, 'a]'] thanks! [2]";
        let (value, consumed) = parse_literal_prefix(input).expect("parse");
        assert_eq!(value, json!([1, "a]"]));
        assert_eq!(input[..consumed].trim_end(), "[1, 'a]']");
    }

    #[test]
    fn rejects_set_literals_and_bare_names() {
        assert!(parse_literal("{1, 2}").is_err());
        assert!(parse_literal("[foo]").is_err());
    }
}
