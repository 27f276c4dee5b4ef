//! Tokeniser for Tern source
//!
//! A single forward pass over the source text. Semicolons are treated as pure
//! whitespace (statement terminators are optional), `!` starts a line comment,
//! and unrecognised characters are skipped silently so a half-typed buffer
//! still produces a usable token stream.

use crate::types::ValType;

/// Token categories. Keywords and primitive type names both come out as
/// `Keyword`; the parser decides from context whether `i32` is a type
/// annotation or a conversion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Num,
    Ident,
    Keyword,
    Op,
    Punc,
    Eof,
}

/// A token with its source position (1-based line and column).
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: u32,
    pub col: u32,
    /// Numeric literal used float syntax (decimal point or exponent).
    pub is_float: bool,
    /// Explicit `_i32` / `_i64` / `_f32` / `_f64` literal suffix.
    pub suffix: Option<ValType>,
    /// Identifier matches the `__INTERP_<n>__` interpolation marker shape.
    pub interp: bool,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, line: u32, col: u32) -> Self {
        Token {
            kind,
            text: text.into(),
            line,
            col,
            is_float: false,
            suffix: None,
            interp: false,
        }
    }
}

const KEYWORDS: &[&str] = &[
    "and",
    "array",
    "begin",
    "break",
    "call",
    "const",
    "do",
    "else",
    "end",
    "export",
    "false",
    "for",
    "function",
    "if",
    "import",
    "layout",
    "mod",
    "not",
    "or",
    "packed",
    "subroutine",
    "tailcall",
    "then",
    "true",
    "var",
    "while",
];

fn is_keyword(text: &str) -> bool {
    KEYWORDS.contains(&text) || ValType::from_name(text).is_some()
}

/// Does the lexeme match `__INTERP_<digits>__`?
fn is_interp_marker(text: &str) -> bool {
    text.strip_prefix("__INTERP_")
        .and_then(|rest| rest.strip_suffix("__"))
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Tokenise the whole source. Never fails: the stream always ends with an
/// `Eof` token carrying the final position.
pub fn tokenize(source: &str) -> Vec<Token> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut line: u32 = 1;
    let mut col: u32 = 1;

    while i < chars.len() {
        let c = chars[i];

        // Whitespace; semicolons count as whitespace.
        if c.is_whitespace() || c == ';' {
            if c == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
            i += 1;
            continue;
        }

        // Line comment to end of line.
        if c == '!' {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
                col += 1;
            }
            continue;
        }

        let start_line = line;
        let start_col = col;

        // Number: digits, optional fraction, optional exponent, optional
        // `_i32`-style suffix.
        if c.is_ascii_digit() {
            let mut text = String::new();
            let mut is_float = false;
            while i < chars.len() && chars[i].is_ascii_digit() {
                text.push(chars[i]);
                i += 1;
                col += 1;
            }
            if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
                is_float = true;
                text.push('.');
                i += 1;
                col += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    text.push(chars[i]);
                    i += 1;
                    col += 1;
                }
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    is_float = true;
                    while i < j {
                        text.push(chars[i]);
                        i += 1;
                        col += 1;
                    }
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        text.push(chars[i]);
                        i += 1;
                        col += 1;
                    }
                }
            }
            // Type suffix: underscore plus a scalar type tag.
            let mut suffix = None;
            if i < chars.len() && chars[i] == '_' && i + 3 < chars.len() {
                let tag: String = chars[i + 1..i + 4].iter().collect();
                if let Some(t) = ValType::from_name(&tag) {
                    suffix = Some(t);
                    i += 4;
                    col += 4;
                }
            }
            let mut tok = Token::new(TokenKind::Num, text, start_line, start_col);
            tok.is_float = is_float;
            tok.suffix = suffix;
            tokens.push(tok);
            continue;
        }

        // Identifier or keyword. Dots are part of the lexeme (namespaced
        // names) but a trailing dot is left unconsumed so a partially typed
        // `math.` still lexes as an identifier.
        if c.is_ascii_alphanumeric() || c == '_' {
            let mut text = String::new();
            while i < chars.len() {
                let ch = chars[i];
                if ch.is_ascii_alphanumeric() || ch == '_' {
                    text.push(ch);
                    i += 1;
                    col += 1;
                } else if ch == '.'
                    && i + 1 < chars.len()
                    && (chars[i + 1].is_ascii_alphanumeric() || chars[i + 1] == '_')
                {
                    text.push('.');
                    i += 1;
                    col += 1;
                } else {
                    break;
                }
            }
            let kind = if is_keyword(&text) {
                TokenKind::Keyword
            } else {
                TokenKind::Ident
            };
            let mut tok = Token::new(kind, text, start_line, start_col);
            tok.interp = kind == TokenKind::Ident && is_interp_marker(&tok.text);
            tokens.push(tok);
            continue;
        }

        // Multi-character operators, longest first.
        let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
        if matches!(
            two.as_str(),
            "**" | ":=" | "+=" | "-=" | "*=" | "/=" | "==" | "<=" | ">=" | "<<" | ">>"
        ) {
            tokens.push(Token::new(TokenKind::Op, two, start_line, start_col));
            i += 2;
            col += 2;
            continue;
        }

        if "+-*/<>=&|^~@".contains(c) {
            tokens.push(Token::new(
                TokenKind::Op,
                c.to_string(),
                start_line,
                start_col,
            ));
            i += 1;
            col += 1;
            continue;
        }

        if "()[],:".contains(c) {
            tokens.push(Token::new(
                TokenKind::Punc,
                c.to_string(),
                start_line,
                start_col,
            ));
            i += 1;
            col += 1;
            continue;
        }

        // Unknown character: skip it.
        i += 1;
        col += 1;
    }

    tokens.push(Token::new(TokenKind::Eof, "", line, col));
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<(TokenKind, String)> {
        tokenize(source)
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn test_simple_function_header() {
        let toks = kinds("function add(a, b: i32): i32");
        assert_eq!(toks[0], (TokenKind::Keyword, "function".to_string()));
        assert_eq!(toks[1], (TokenKind::Ident, "add".to_string()));
        assert_eq!(toks[2], (TokenKind::Punc, "(".to_string()));
        assert_eq!(toks[5], (TokenKind::Ident, "b".to_string()));
        assert_eq!(toks[6], (TokenKind::Punc, ":".to_string()));
        assert_eq!(toks[7], (TokenKind::Keyword, "i32".to_string()));
    }

    #[test]
    fn test_number_suffix_and_float() {
        let toks = tokenize("42 3.5 1e6 7_i64 2.0_f32");
        assert!(!toks[0].is_float);
        assert!(toks[1].is_float);
        assert!(toks[2].is_float);
        assert_eq!(toks[3].suffix, Some(ValType::I64));
        assert!(!toks[3].is_float);
        assert_eq!(toks[4].suffix, Some(ValType::F32));
        assert!(toks[4].is_float);
    }

    #[test]
    fn test_multichar_operators() {
        let toks = kinds("a := b ** c <= d << e /= f");
        let ops: Vec<&str> = toks
            .iter()
            .filter(|(k, _)| *k == TokenKind::Op)
            .map(|(_, t)| t.as_str())
            .collect();
        assert_eq!(ops, vec![":=", "**", "<=", "<<", "/="]);
    }

    #[test]
    fn test_semicolons_and_comments_are_whitespace() {
        let toks = kinds("a := 1; b := 2 ! trailing comment\nc := 3");
        let idents: Vec<&str> = toks
            .iter()
            .filter(|(k, _)| *k == TokenKind::Ident)
            .map(|(_, t)| t.as_str())
            .collect();
        assert_eq!(idents, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_dotted_identifier_keeps_dots() {
        let toks = kinds("f64x2.add math.pi");
        assert_eq!(toks[0], (TokenKind::Ident, "f64x2.add".to_string()));
        assert_eq!(toks[1], (TokenKind::Ident, "math.pi".to_string()));
    }

    #[test]
    fn test_trailing_dot_not_consumed() {
        // A dangling namespace dot stays out of the identifier.
        let toks = tokenize("math.");
        assert_eq!(toks[0].text, "math");
        assert_eq!(toks[0].kind, TokenKind::Ident);
    }

    #[test]
    fn test_interp_marker_flag() {
        let toks = tokenize("__INTERP_0__ __INTERP_12__ __INTERP___ normal");
        assert!(toks[0].interp);
        assert!(toks[1].interp);
        assert!(!toks[2].interp);
        assert!(!toks[3].interp);
    }

    #[test]
    fn test_unknown_characters_skipped() {
        let toks = kinds("a $ b # c");
        let idents: Vec<&str> = toks
            .iter()
            .filter(|(k, _)| *k == TokenKind::Ident)
            .map(|(_, t)| t.as_str())
            .collect();
        assert_eq!(idents, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_identifiers_are_ascii_only() {
        // Non-ASCII letters are not identifier characters; they are skipped
        // like any other unknown character.
        let toks = kinds("caf\u{e9} \u{3a9}x");
        let idents: Vec<&str> = toks
            .iter()
            .filter(|(k, _)| *k == TokenKind::Ident)
            .map(|(_, t)| t.as_str())
            .collect();
        assert_eq!(idents, vec!["caf", "x"]);
    }

    #[test]
    fn test_eof_position() {
        let toks = tokenize("a\nbb");
        let eof = toks.last().unwrap();
        assert_eq!(eof.kind, TokenKind::Eof);
        assert_eq!(eof.line, 2);
        assert_eq!(eof.col, 3);
    }

    #[test]
    fn test_positions_are_one_based() {
        let toks = tokenize("x\n  y");
        assert_eq!((toks[0].line, toks[0].col), (1, 1));
        assert_eq!((toks[1].line, toks[1].col), (2, 3));
    }
}
