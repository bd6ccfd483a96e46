//! Typed parsers for the list-literal columns of the recipe dataset.
//!
//! The dataset stores `ingredients`, `tags`, `steps` and `nutrition` as list
//! literals, usually Python-style (`['salt', "chef's knife"]`) and sometimes
//! JSON. Every parser returns a [`FieldParse`]: either the parsed value, or
//! the documented default together with the reason parsing failed. Callers
//! that only want a value use [`FieldParse::into_value`]; callers that care
//! can tell an empty list apart from a broken one.

use std::iter::Peekable;
use std::str::CharIndices;
use thiserror::Error;

/// Number of nutrition values per recipe.
pub const NUTRITION_WIDTH: usize = 7;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldParseError {
    #[error("field is empty")]
    Empty,
    #[error("syntax error at byte {position}: {message}")]
    Syntax { position: usize, message: String },
    #[error("element {index} is not a {expected}")]
    ElementType { index: usize, expected: &'static str },
}

/// Outcome of parsing one semi-structured field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldParse<T> {
    Parsed(T),
    Fallback { value: T, error: FieldParseError },
}

impl<T> FieldParse<T> {
    pub fn value(&self) -> &T {
        match self {
            FieldParse::Parsed(value) | FieldParse::Fallback { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            FieldParse::Parsed(value) | FieldParse::Fallback { value, .. } => value,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, FieldParse::Fallback { .. })
    }

    pub fn error(&self) -> Option<&FieldParseError> {
        match self {
            FieldParse::Parsed(_) => None,
            FieldParse::Fallback { error, .. } => Some(error),
        }
    }

    fn from_result(result: Result<T, FieldParseError>, default: impl FnOnce() -> T) -> Self {
        match result {
            Ok(value) => FieldParse::Parsed(value),
            Err(error) => FieldParse::Fallback { value: default(), error },
        }
    }
}

/// A scalar inside a list literal.
#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Str(String),
    Num(f64),
    Null,
}

/// Parses a list of names (ingredients, tags, steps). Default: empty list.
/// `None`/`null` elements are dropped; numbers are kept in their text form.
pub fn parse_string_list(text: &str) -> FieldParse<Vec<String>> {
    let result = parse_list_literal(text).map(|items| {
        items
            .into_iter()
            .filter_map(|item| match item {
                Literal::Str(s) => Some(s),
                Literal::Num(n) => Some(n.to_string()),
                Literal::Null => None,
            })
            .collect()
    });
    FieldParse::from_result(result, Vec::new)
}

/// Parses a nutrition vector, truncated or zero-padded to seven values.
/// `None`/`null` entries become `NaN` so they can be imputed later.
/// Default: seven zeros.
pub fn parse_nutrition(text: &str) -> FieldParse<[f64; NUTRITION_WIDTH]> {
    let result = parse_list_literal(text).and_then(|items| {
        let mut values = [0.0; NUTRITION_WIDTH];
        for (index, item) in items.into_iter().enumerate().take(NUTRITION_WIDTH) {
            values[index] = match item {
                Literal::Num(n) => n,
                Literal::Null => f64::NAN,
                Literal::Str(s) => s
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| FieldParseError::ElementType { index, expected: "number" })?,
            };
        }
        Ok(values)
    });
    FieldParse::from_result(result, || [0.0; NUTRITION_WIDTH])
}

fn parse_list_literal(text: &str) -> Result<Vec<Literal>, FieldParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(FieldParseError::Empty);
    }
    let mut parser = LiteralParser {
        text: trimmed,
        chars: trimmed.char_indices().peekable(),
    };
    let items = parser.list()?;
    parser.skip_whitespace();
    if let Some((position, _)) = parser.chars.peek() {
        return Err(FieldParseError::Syntax {
            position: *position,
            message: "trailing characters after list".to_string(),
        });
    }
    Ok(items)
}

struct LiteralParser<'a> {
    text: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> LiteralParser<'a> {
    fn syntax(&self, position: usize, message: impl Into<String>) -> FieldParseError {
        FieldParseError::Syntax { position, message: message.into() }
    }

    fn position(&mut self) -> usize {
        self.chars.peek().map_or(self.text.len(), |(i, _)| *i)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.chars.peek(), Some((_, c)) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), FieldParseError> {
        self.skip_whitespace();
        match self.chars.next() {
            Some((_, c)) if c == expected => Ok(()),
            Some((i, c)) => Err(self.syntax(i, format!("expected '{expected}', found '{c}'"))),
            None => Err(self.syntax(self.text.len(), format!("expected '{expected}', found end of input"))),
        }
    }

    fn list(&mut self) -> Result<Vec<Literal>, FieldParseError> {
        self.expect('[')?;
        let mut items = Vec::new();
        self.skip_whitespace();
        if matches!(self.chars.peek(), Some((_, ']'))) {
            self.chars.next();
            return Ok(items);
        }
        loop {
            items.push(self.scalar()?);
            self.skip_whitespace();
            match self.chars.next() {
                Some((_, ',')) => {
                    // Python allows a trailing comma.
                    self.skip_whitespace();
                    if matches!(self.chars.peek(), Some((_, ']'))) {
                        self.chars.next();
                        return Ok(items);
                    }
                }
                Some((_, ']')) => return Ok(items),
                Some((i, c)) => return Err(self.syntax(i, format!("expected ',' or ']', found '{c}'"))),
                None => return Err(self.syntax(self.text.len(), "unterminated list")),
            }
        }
    }

    fn scalar(&mut self) -> Result<Literal, FieldParseError> {
        self.skip_whitespace();
        let start = self.position();
        match self.chars.peek().map(|(_, c)| *c) {
            Some(quote @ ('\'' | '"')) => {
                self.chars.next();
                self.string(quote, start).map(Literal::Str)
            }
            Some(c) if c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.') => self.bare_word(start),
            Some(c) => Err(self.syntax(start, format!("unexpected character '{c}'"))),
            None => Err(self.syntax(start, "expected a value, found end of input")),
        }
    }

    fn string(&mut self, quote: char, start: usize) -> Result<String, FieldParseError> {
        let mut out = String::new();
        while let Some((i, c)) = self.chars.next() {
            match c {
                '\\' => match self.chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, 'u')) => out.push(self.unicode_escape(i)?),
                    Some((_, other)) => out.push(other),
                    None => break,
                },
                c if c == quote => return Ok(out),
                c => out.push(c),
            }
        }
        Err(self.syntax(start, "unterminated string"))
    }

    fn unicode_escape(&mut self, position: usize) -> Result<char, FieldParseError> {
        let mut code = 0u32;
        for _ in 0..4 {
            let digit = self
                .chars
                .next()
                .and_then(|(_, c)| c.to_digit(16))
                .ok_or_else(|| self.syntax(position, "invalid \\u escape"))?;
            code = code * 16 + digit;
        }
        Ok(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER))
    }

    fn bare_word(&mut self, start: usize) -> Result<Literal, FieldParseError> {
        let mut end = start;
        while let Some((i, c)) = self.chars.peek().copied() {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.' | '_') {
                end = i + c.len_utf8();
                self.chars.next();
            } else {
                break;
            }
        }
        let word = &self.text[start..end];
        match word {
            "None" | "null" | "nan" | "NaN" => Ok(Literal::Null),
            _ => word
                .parse::<f64>()
                .map(Literal::Num)
                .map_err(|_| self.syntax(start, format!("'{word}' is not a number"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_python_style_list() {
        let parsed = parse_string_list("['winter squash', \"chef's salt\", 'mexican seasoning']");
        assert_eq!(
            parsed,
            FieldParse::Parsed(vec![
                "winter squash".to_string(),
                "chef's salt".to_string(),
                "mexican seasoning".to_string()
            ])
        );
    }

    #[test]
    fn test_parse_json_list_with_escapes() {
        let parsed = parse_string_list(r#"["say \"hi\"", "tab\there", "café"]"#).into_value();
        assert_eq!(parsed, vec!["say \"hi\"", "tab\there", "café"]);
    }

    #[test]
    fn test_empty_list_is_parsed_not_fallback() {
        let parsed = parse_string_list("[]");
        assert_eq!(parsed, FieldParse::Parsed(Vec::new()));
        assert!(!parsed.is_fallback());
    }

    #[test]
    fn test_malformed_list_falls_back_to_empty() {
        for input in ["", "   ", "not a list", "['unterminated", "['a' 'b']", "['a'] extra"] {
            let parsed = parse_string_list(input);
            assert!(parsed.is_fallback(), "{input:?} should fall back");
            assert!(parsed.value().is_empty());
        }
        assert_eq!(parse_string_list("").error(), Some(&FieldParseError::Empty));
    }

    #[test]
    fn test_none_elements_are_dropped() {
        let parsed = parse_string_list("['a', None, 'b',]").into_value();
        assert_eq!(parsed, vec!["a", "b"]);
    }

    #[test]
    fn test_nutrition_truncates_and_pads() {
        let long = parse_nutrition("[51.5, 0.0, 13.0, 0.0, 2.0, 0.0, 4.0, 99.0]");
        assert_eq!(long.into_value(), [51.5, 0.0, 13.0, 0.0, 2.0, 0.0, 4.0]);

        let short = parse_nutrition("[173.4, 18.0, 0.0, 17.0, 22.0, 35.0]");
        assert_eq!(short.into_value(), [173.4, 18.0, 0.0, 17.0, 22.0, 35.0, 0.0]);
    }

    #[test]
    fn test_nutrition_null_becomes_nan_and_strings_are_numbers() {
        let values = parse_nutrition("[1, null, '3.5', -2e1]").into_value();
        assert_eq!(values[0], 1.0);
        assert!(values[1].is_nan());
        assert_eq!(values[2], 3.5);
        assert_eq!(values[3], -20.0);
    }

    #[test]
    fn test_nutrition_malformed_defaults_to_zero() {
        let parsed = parse_nutrition("[1.0, 'lots', 3.0]");
        assert_eq!(parsed.error(), Some(&FieldParseError::ElementType { index: 1, expected: "number" }));
        assert_eq!(parsed.into_value(), [0.0; NUTRITION_WIDTH]);
        assert_eq!(parse_nutrition("garbage").into_value(), [0.0; NUTRITION_WIDTH]);
    }
}
