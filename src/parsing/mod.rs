//! # Insert-Query Parsing
//!
//! A tolerant textual surface for row insertion. Two forms are accepted:
//!
//! ```text
//! 1, 'Intel', 589.99                       one row
//! (1, 'Intel', 589.99), (2, 'AMD', 699.99) several rows
//! ```
//!
//! Values are assigned positionally to schema columns:
//!
//! | Column | Literal |
//! |--------|---------|
//! | integer | `[-]digits`, range-checked against the column width |
//! | float | `[-]digits[.digits]` |
//! | CHAR | one quoted byte (`'x'` or `"x"`) |
//! | WCHAR | one quoted character whose code point fits `u16` |
//! | STRING | quoted bytes; everything up to the matching quote of the same kind is preserved |
//! | arrays (`count > 1`) | `{v, v, …}` or `[v, v, …]` with matching bracket kinds; at most `count` elements, the tail zero-padded. A `CHAR[n]` column also takes a quoted string that fills the array |
//!
//! Anything else - unterminated quotes, mismatched brackets, stray input,
//! wrong arity, out-of-range numbers - fails with `InvalidQuery` and
//! nothing is inserted.

mod lexer;

use eyre::Result;

use crate::error::StoreError;
use crate::records::{Column, DataType, Row, Schema, Value};

use lexer::{tokenize, Token};

/// Summary returned by `Table::add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddResult {
    pub rows_added: usize,
}

fn invalid(msg: impl Into<String>) -> eyre::Report {
    StoreError::InvalidQuery(msg.into()).into()
}

/// Parses the insert syntax into rows matching `schema`. No rows are
/// returned unless the whole input is valid.
pub fn parse_rows(schema: &Schema, input: &str) -> Result<Vec<Row>> {
    let tokens = tokenize(input)?;
    let mut cursor = Cursor::new(&tokens);

    let mut rows = Vec::new();
    if matches!(cursor.peek(), Some(Token::OpenParen)) {
        loop {
            cursor.expect_open_paren()?;
            rows.push(parse_row(schema, &mut cursor, true)?);
            cursor.expect_close_paren()?;
            match cursor.next() {
                Some(Token::Comma) => continue,
                None => break,
                Some(other) => return Err(invalid(format!("expected ',' between rows, got {other}"))),
            }
        }
    } else {
        rows.push(parse_row(schema, &mut cursor, false)?);
        if let Some(extra) = cursor.next() {
            return Err(invalid(format!("trailing input after the row: {extra}")));
        }
    }

    Ok(rows)
}

struct Cursor<'t, 'a> {
    tokens: &'t [Token<'a>],
    at: usize,
}

impl<'t, 'a> Cursor<'t, 'a> {
    fn new(tokens: &'t [Token<'a>]) -> Self {
        Self { tokens, at: 0 }
    }

    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.at)
    }

    fn next(&mut self) -> Option<&Token<'a>> {
        let token = self.tokens.get(self.at);
        if token.is_some() {
            self.at += 1;
        }
        token
    }

    fn expect_open_paren(&mut self) -> Result<()> {
        match self.next() {
            Some(Token::OpenParen) => Ok(()),
            Some(other) => Err(invalid(format!("expected '(', got {other}"))),
            None => Err(invalid("expected '(' before a row")),
        }
    }

    fn expect_close_paren(&mut self) -> Result<()> {
        match self.next() {
            Some(Token::CloseParen) => Ok(()),
            Some(other) => Err(invalid(format!("expected ')', got {other}"))),
            None => Err(invalid("row is missing its closing ')'")),
        }
    }
}

/// One value per schema column, comma separated. In the parenthesized form
/// the row ends at `)`; otherwise it ends with the input.
fn parse_row(schema: &Schema, cursor: &mut Cursor, parenthesized: bool) -> Result<Row> {
    let mut values = Vec::with_capacity(schema.column_count());
    for (idx, col) in schema.columns().iter().enumerate() {
        if idx > 0 {
            match cursor.next() {
                Some(Token::Comma) => {}
                Some(other) => {
                    return Err(invalid(format!("expected ',' before value {}, got {other}", idx + 1)))
                }
                None => {
                    return Err(invalid(format!(
                        "row has {idx} values, schema has {} columns",
                        schema.column_count()
                    )))
                }
            }
        }
        values.push(parse_value(col, cursor)?);
    }

    match cursor.peek() {
        Some(Token::CloseParen) if parenthesized => {}
        None if !parenthesized => {}
        Some(Token::Comma) => {
            return Err(invalid(format!(
                "row has more values than the schema's {} columns",
                schema.column_count()
            )))
        }
        Some(other) => return Err(invalid(format!("unexpected {other} after the row"))),
        None => return Err(invalid("row is missing its closing ')'")),
    }
    Ok(Row::new(values))
}

fn parse_value(col: &Column, cursor: &mut Cursor) -> Result<Value> {
    if col.count > 1 {
        return parse_array(col, cursor);
    }
    match cursor.next() {
        Some(Token::Number(text)) => scalar_from_number(col, text),
        Some(Token::Quoted(bytes)) => scalar_from_quoted(col, bytes),
        Some(other) => Err(invalid(format!(
            "column '{}' expects a value, got {other}",
            col.name
        ))),
        None => Err(invalid(format!("missing value for column '{}'", col.name))),
    }
}

fn parse_array(col: &Column, cursor: &mut Cursor) -> Result<Value> {
    let open = match cursor.next() {
        Some(Token::OpenBracket(kind)) => *kind,
        // A CHAR array may be filled from a quoted byte string.
        Some(Token::Quoted(bytes)) if col.data_type == DataType::Char => {
            if bytes.len() > col.count {
                return Err(invalid(format!(
                    "column '{}' holds {} bytes, got {}",
                    col.name,
                    col.count,
                    bytes.len()
                )));
            }
            return Ok(Value::Str(quoted_to_string(bytes)));
        }
        Some(other) => {
            return Err(invalid(format!(
                "column '{}' expects a bracketed array, got {other}",
                col.name
            )))
        }
        None => return Err(invalid(format!("missing value for column '{}'", col.name))),
    };

    let mut items = Vec::new();
    loop {
        match cursor.next() {
            Some(Token::Number(text)) => items.push(scalar_from_number(col, text)?),
            Some(Token::Quoted(bytes)) => items.push(scalar_from_quoted(col, bytes)?),
            Some(other) => {
                return Err(invalid(format!(
                    "array for column '{}' expects a value, got {other}",
                    col.name
                )))
            }
            None => return Err(invalid(format!("array for column '{}' is unterminated", col.name))),
        }
        match cursor.next() {
            Some(Token::Comma) => continue,
            Some(Token::CloseBracket(close)) => {
                let matching = if open == b'{' { b'}' } else { b']' };
                if *close != matching {
                    return Err(invalid(format!(
                        "array for column '{}' opens with '{}' but closes with '{}'",
                        col.name, open as char, *close as char
                    )));
                }
                break;
            }
            Some(other) => {
                return Err(invalid(format!(
                    "array for column '{}' expects ',' or a closing bracket, got {other}",
                    col.name
                )))
            }
            None => return Err(invalid(format!("array for column '{}' is unterminated", col.name))),
        }
    }

    if items.len() > col.count {
        return Err(invalid(format!(
            "array for column '{}' holds at most {} elements, got {}",
            col.name,
            col.count,
            items.len()
        )));
    }
    Ok(Value::Array(items))
}

fn scalar_from_number(col: &Column, text: &str) -> Result<Value> {
    match col.data_type {
        DataType::Int8 => Ok(Value::Int8(parse_int(col, text, i8::MIN as i128, i8::MAX as i128)? as i8)),
        DataType::Int16 => {
            Ok(Value::Int16(parse_int(col, text, i16::MIN as i128, i16::MAX as i128)? as i16))
        }
        DataType::Int32 => {
            Ok(Value::Int32(parse_int(col, text, i32::MIN as i128, i32::MAX as i128)? as i32))
        }
        DataType::Int64 => {
            Ok(Value::Int64(parse_int(col, text, i64::MIN as i128, i64::MAX as i128)? as i64))
        }
        DataType::Float32 => Ok(Value::Float32(parse_float(col, text)? as f32)),
        DataType::Float64 => Ok(Value::Float64(parse_float(col, text)?)),
        DataType::Char | DataType::WChar | DataType::Str => Err(invalid(format!(
            "column '{}' expects a quoted literal, got the number {text}",
            col.name
        ))),
    }
}

fn scalar_from_quoted(col: &Column, bytes: &[u8]) -> Result<Value> {
    match col.data_type {
        DataType::Char => {
            if bytes.len() != 1 {
                return Err(invalid(format!(
                    "column '{}' expects exactly one quoted byte, got {}",
                    col.name,
                    bytes.len()
                )));
            }
            Ok(Value::Char(bytes[0]))
        }
        DataType::WChar => {
            let text = std::str::from_utf8(bytes)
                .map_err(|_| invalid(format!("column '{}' literal is not valid UTF-8", col.name)))?;
            let mut chars = text.chars();
            let (Some(c), None) = (chars.next(), chars.next()) else {
                return Err(invalid(format!(
                    "column '{}' expects exactly one quoted character",
                    col.name
                )));
            };
            let code = c as u32;
            if code > u16::MAX as u32 {
                return Err(invalid(format!(
                    "column '{}' character U+{code:04X} does not fit 16 bits",
                    col.name
                )));
            }
            Ok(Value::WChar(code as u16))
        }
        DataType::Str => Ok(Value::Str(quoted_to_string(bytes))),
        _ => Err(invalid(format!(
            "column '{}' expects a number, got a quoted literal",
            col.name
        ))),
    }
}

fn quoted_to_string(bytes: &[u8]) -> String {
    // Quote delimiters are ASCII, so slicing the input between them always
    // lands on character boundaries.
    String::from_utf8_lossy(bytes).into_owned()
}

/// Signed decimal digits only; one optional leading '-'. Anything else,
/// including a duplicate sign, is rejected, and the value must fit the
/// column's range.
fn parse_int(col: &Column, text: &str, min: i128, max: i128) -> Result<i128> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(format!(
            "column '{}' expects an integer, got '{text}'",
            col.name
        )));
    }
    if digits.len() > 19 {
        return Err(invalid(format!(
            "column '{}' value '{text}' is out of range",
            col.name
        )));
    }

    let mut value: i128 = 0;
    for b in digits.bytes() {
        value = value * 10 + (b - b'0') as i128;
    }
    if negative {
        value = -value;
    }
    if value < min || value > max {
        return Err(invalid(format!(
            "column '{}' value {value} is outside [{min}, {max}]",
            col.name
        )));
    }
    Ok(value)
}

/// Digits with at most one decimal point and one optional leading '-'.
fn parse_float(col: &Column, text: &str) -> Result<f64> {
    let body = text.strip_prefix('-').unwrap_or(text);
    let valid = match body.split_once('.') {
        Some((whole, frac)) => {
            !whole.is_empty()
                && !frac.is_empty()
                && whole.bytes().all(|b| b.is_ascii_digit())
                && frac.bytes().all(|b| b.is_ascii_digit())
        }
        None => !body.is_empty() && body.bytes().all(|b| b.is_ascii_digit()),
    };
    if !valid {
        return Err(invalid(format!(
            "column '{}' expects a number, got '{text}'",
            col.name
        )));
    }
    text.parse::<f64>()
        .map_err(|_| invalid(format!("column '{}' value '{text}' is not a number", col.name)))
}
