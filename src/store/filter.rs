//! Filter expression grammar
//!
//! The engine emits only two forms, and embedded backends evaluate them
//! client-side:
//!
//! ```text
//! expr  := eq | in
//! eq    := IDENT "==" STRING_LITERAL
//! in    := IDENT "in" "[" STRING_LITERAL ("," STRING_LITERAL)* "]"
//! ```
//!
//! String literals may be single- or double-quoted.

use crate::error::StoreError;

/// A parsed filter expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterExpr {
    Eq { field: String, value: String },
    In { field: String, values: Vec<String> },
}

impl FilterExpr {
    /// Emit `field == 'value'`
    pub fn eq(field: &str, value: &str) -> String {
        format!("{} == '{}'", field, escape(value))
    }

    /// Emit `field in ['a','b']`
    pub fn is_in(field: &str, values: &[String]) -> String {
        let quoted: Vec<String> = values.iter().map(|v| format!("'{}'", escape(v))).collect();
        format!("{} in [{}]", field, quoted.join(","))
    }

    /// Parse an expression; stores that cannot honour the parsed form
    /// reject with `UnsupportedFilter`
    pub fn parse(input: &str) -> Result<FilterExpr, StoreError> {
        let mut tokens = Tokenizer::new(input);

        let field = tokens.ident()?;
        match tokens.next()? {
            Token::EqEq => {
                let value = tokens.string()?;
                tokens.end()?;
                Ok(FilterExpr::Eq { field, value })
            }
            Token::In => {
                tokens.expect(Token::OpenBracket)?;
                let mut values = vec![tokens.string()?];
                loop {
                    match tokens.next()? {
                        Token::Comma => values.push(tokens.string()?),
                        Token::CloseBracket => break,
                        other => {
                            return Err(invalid(input, format!("expected ',' or ']', got {other:?}")))
                        }
                    }
                }
                tokens.end()?;
                Ok(FilterExpr::In { field, values })
            }
            other => Err(invalid(input, format!("expected '==' or 'in', got {other:?}"))),
        }
    }

    /// Field the expression constrains
    pub fn field(&self) -> &str {
        match self {
            FilterExpr::Eq { field, .. } | FilterExpr::In { field, .. } => field,
        }
    }

    /// Evaluate against a document field lookup
    pub fn matches(&self, lookup: impl Fn(&str) -> Option<String>) -> bool {
        match self {
            FilterExpr::Eq { field, value } => lookup(field).is_some_and(|v| &v == value),
            FilterExpr::In { field, values } => {
                lookup(field).is_some_and(|v| values.contains(&v))
            }
        }
    }
}

fn escape(value: &str) -> String {
    value.replace('\'', "\\'")
}

fn invalid(expr: &str, reason: impl Into<String>) -> StoreError {
    StoreError::InvalidFilter {
        expr: expr.to_string(),
        reason: reason.into(),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    EqEq,
    In,
    OpenBracket,
    CloseBracket,
    Comma,
    End,
}

struct Tokenizer<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    fn next(&mut self) -> Result<Token, StoreError> {
        while self.chars.peek().is_some_and(|(_, c)| c.is_whitespace()) {
            self.chars.next();
        }

        let Some(&(start, c)) = self.chars.peek() else {
            return Ok(Token::End);
        };

        match c {
            '[' => {
                self.chars.next();
                Ok(Token::OpenBracket)
            }
            ']' => {
                self.chars.next();
                Ok(Token::CloseBracket)
            }
            ',' => {
                self.chars.next();
                Ok(Token::Comma)
            }
            '=' => {
                self.chars.next();
                match self.chars.next() {
                    Some((_, '=')) => Ok(Token::EqEq),
                    _ => Err(invalid(self.input, "expected '=='")),
                }
            }
            '\'' | '"' => {
                let quote = c;
                self.chars.next();
                let mut value = String::new();
                loop {
                    match self.chars.next() {
                        Some((_, '\\')) => {
                            if let Some((_, escaped)) = self.chars.next() {
                                value.push(escaped);
                            }
                        }
                        Some((_, ch)) if ch == quote => break,
                        Some((_, ch)) => value.push(ch),
                        None => return Err(invalid(self.input, "unterminated string literal")),
                    }
                }
                Ok(Token::Str(value))
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = start;
                while let Some(&(i, ch)) = self.chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' {
                        end = i + ch.len_utf8();
                        self.chars.next();
                    } else {
                        break;
                    }
                }
                let word = &self.input[start..end];
                if word == "in" {
                    Ok(Token::In)
                } else {
                    Ok(Token::Ident(word.to_string()))
                }
            }
            other => Err(invalid(self.input, format!("unexpected character '{other}'"))),
        }
    }

    fn ident(&mut self) -> Result<String, StoreError> {
        match self.next()? {
            Token::Ident(name) => Ok(name),
            other => Err(invalid(self.input, format!("expected identifier, got {other:?}"))),
        }
    }

    fn string(&mut self) -> Result<String, StoreError> {
        match self.next()? {
            Token::Str(value) => Ok(value),
            other => Err(invalid(
                self.input,
                format!("expected string literal, got {other:?}"),
            )),
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), StoreError> {
        let got = self.next()?;
        if got == token {
            Ok(())
        } else {
            Err(invalid(self.input, format!("expected {token:?}, got {got:?}")))
        }
    }

    fn end(&mut self) -> Result<(), StoreError> {
        match self.next()? {
            Token::End => Ok(()),
            other => Err(invalid(
                self.input,
                format!("trailing input after expression: {other:?}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_eq() {
        let expr = FilterExpr::parse("relativePath == 'src/lib.rs'").unwrap();
        assert_eq!(
            expr,
            FilterExpr::Eq {
                field: "relativePath".into(),
                value: "src/lib.rs".into(),
            }
        );
    }

    #[test]
    fn test_parse_eq_double_quotes() {
        let expr = FilterExpr::parse(r#"fileExtension == ".rs""#).unwrap();
        assert_eq!(
            expr,
            FilterExpr::Eq {
                field: "fileExtension".into(),
                value: ".rs".into(),
            }
        );
    }

    #[test]
    fn test_parse_in() {
        let expr = FilterExpr::parse("fileExtension in ['.rs', '.py', '.go']").unwrap();
        assert_eq!(
            expr,
            FilterExpr::In {
                field: "fileExtension".into(),
                values: vec![".rs".into(), ".py".into(), ".go".into()],
            }
        );
    }

    #[test]
    fn test_emit_parse_roundtrip() {
        let emitted = FilterExpr::eq("relativePath", "a/b.ts");
        assert_eq!(emitted, "relativePath == 'a/b.ts'");
        let parsed = FilterExpr::parse(&emitted).unwrap();
        assert!(parsed.matches(|f| match f {
            "relativePath" => Some("a/b.ts".to_string()),
            _ => None,
        }));

        let emitted = FilterExpr::is_in("fileExtension", &[".ts".into(), ".py".into()]);
        assert_eq!(emitted, "fileExtension in ['.ts','.py']");
        let parsed = FilterExpr::parse(&emitted).unwrap();
        assert!(parsed.matches(|_| Some(".py".to_string())));
        assert!(!parsed.matches(|_| Some(".go".to_string())));
    }

    #[test]
    fn test_escaped_quote_roundtrip() {
        let emitted = FilterExpr::eq("relativePath", "it's.rs");
        let parsed = FilterExpr::parse(&emitted).unwrap();
        assert_eq!(
            parsed,
            FilterExpr::Eq {
                field: "relativePath".into(),
                value: "it's.rs".into(),
            }
        );
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(FilterExpr::parse("").is_err());
        assert!(FilterExpr::parse("relativePath = 'x'").is_err());
        assert!(FilterExpr::parse("relativePath == ").is_err());
        assert!(FilterExpr::parse("ext in []").is_err());
        assert!(FilterExpr::parse("ext in ['.rs'").is_err());
        assert!(FilterExpr::parse("a == 'b' && c == 'd'").is_err());
        assert!(FilterExpr::parse("path == 'unterminated").is_err());
    }

    #[test]
    fn test_matches_missing_field_is_false() {
        let expr = FilterExpr::parse("lang == 'rust'").unwrap();
        assert!(!expr.matches(|_| None));
    }
}
