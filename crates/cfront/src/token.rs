//! Tokenizer for the restricted C dialect.
//!
//! Produces a flat token stream with line/column positions. The input is the
//! concatenation of all translation units, so line numbers are "flat" and are
//! mapped back to (file, line) pairs by the caller.

use crate::ParseError;

/// A token with source position information
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Line number (1-indexed, flat across concatenated units)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Identifier or keyword
    Ident(String),
    /// Integer constant, spelled as written (`10`, `0x1f`)
    IntLit(String),
    /// String literal with escape sequences decoded
    StrLit(String),
    /// Operator or punctuation
    Punct(&'static str),
    Eof,
}

impl Token {
    fn new(kind: TokenKind, line: usize, column: usize) -> Self {
        Token { kind, line, column }
    }

    /// Short description for "found ..." parse errors
    pub fn describe(&self) -> String {
        match &self.kind {
            TokenKind::Ident(s) => format!("\"{}\"", s),
            TokenKind::IntLit(s) => format!("\"{}\"", s),
            TokenKind::StrLit(_) => "string literal".to_string(),
            TokenKind::Punct(p) => format!("\"{}\"", p),
            TokenKind::Eof => "end of input".to_string(),
        }
    }
}

/// Three-character operators, matched before the shorter ones
const PUNCT3: [&str; 2] = ["<<=", ">>="];

const PUNCT2: [&str; 19] = [
    "++", "--", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "+=", "-=", "*=", "/=", "%=",
    "&=", "|=", "^=", "->",
];

const PUNCT1: &str = "+-*/%&|^~!<>=(){}[];,?:.";

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, line: usize, column: usize, message: impl Into<String>) -> ParseError {
        ParseError {
            line,
            column,
            message: message.into(),
        }
    }

    /// Skip whitespace and comments; comments count their embedded newlines
    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            match self.peek(0) {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek(1) == Some('/') => {
                    while let Some(c) = self.peek(0) {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek(1) == Some('*') => {
                    let (line, column) = (self.line, self.column);
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek(0) {
                            Some('*') if self.peek(1) == Some('/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            Some(_) => {
                                self.bump();
                            }
                            None => {
                                return Err(self.error(line, column, "unterminated block comment"));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn lex_ident(&mut self) -> TokenKind {
        let mut text = String::new();
        while let Some(c) = self.peek(0) {
            if c.is_ascii_alphanumeric() || c == '_' {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        TokenKind::Ident(text)
    }

    fn lex_number(&mut self) -> Result<TokenKind, ParseError> {
        let (line, column) = (self.line, self.column);
        let mut text = String::new();
        if self.peek(0) == Some('0') && matches!(self.peek(1), Some('x') | Some('X')) {
            text.push(self.bump().unwrap());
            text.push(self.bump().unwrap());
            let mut digits = 0;
            while let Some(c) = self.peek(0) {
                if c.is_ascii_hexdigit() {
                    text.push(c);
                    self.bump();
                    digits += 1;
                } else {
                    break;
                }
            }
            if digits == 0 {
                return Err(self.error(line, column, format!("invalid hex literal \"{}\"", text)));
            }
        } else {
            while let Some(c) = self.peek(0) {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }
        // reject suffixes and adjacent identifier characters (10L, 0x1fg)
        if let Some(c) = self.peek(0) {
            if c.is_ascii_alphanumeric() || c == '_' {
                return Err(self.error(
                    line,
                    column,
                    format!("invalid integer literal \"{}{}\"", text, c),
                ));
            }
        }
        Ok(TokenKind::IntLit(text))
    }

    fn lex_string(&mut self) -> Result<TokenKind, ParseError> {
        let (line, column) = (self.line, self.column);
        self.bump(); // opening quote
        let mut value = String::new();
        loop {
            match self.peek(0) {
                None | Some('\n') => {
                    return Err(self.error(line, column, "unterminated string literal"));
                }
                Some('"') => {
                    self.bump();
                    return Ok(TokenKind::StrLit(value));
                }
                Some('\\') => {
                    self.bump();
                    let esc = self
                        .bump()
                        .ok_or_else(|| self.error(line, column, "unterminated string literal"))?;
                    match esc {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '0' => value.push('\0'),
                        'x' => {
                            let mut code = 0u32;
                            let mut digits = 0;
                            while let Some(h) = self.peek(0) {
                                if let Some(d) = h.to_digit(16) {
                                    code = code * 16 + d;
                                    digits += 1;
                                    self.bump();
                                } else {
                                    break;
                                }
                            }
                            if digits == 0 {
                                return Err(self.error(line, column, "invalid \\x escape"));
                            }
                            value.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                        }
                        other => value.push(other),
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.bump();
                }
            }
        }
    }

    fn lex_punct(&mut self) -> Result<TokenKind, ParseError> {
        let (line, column) = (self.line, self.column);
        let lookahead: String = (0..3).filter_map(|i| self.peek(i)).collect();
        for p in PUNCT3 {
            if lookahead.starts_with(p) {
                for _ in 0..3 {
                    self.bump();
                }
                return Ok(TokenKind::Punct(p));
            }
        }
        for p in PUNCT2 {
            if lookahead.starts_with(p) {
                for _ in 0..2 {
                    self.bump();
                }
                return Ok(TokenKind::Punct(p));
            }
        }
        let c = self.peek(0).unwrap();
        if let Some(idx) = PUNCT1.find(c) {
            self.bump();
            return Ok(TokenKind::Punct(&PUNCT1[idx..idx + c.len_utf8()]));
        }
        Err(self.error(line, column, format!("unexpected character '{}'", c)))
    }
}

/// Tokenize a source text into a token vector ending in `Eof`.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        lexer.skip_trivia()?;
        let (line, column) = (lexer.line, lexer.column);
        let kind = match lexer.peek(0) {
            None => {
                tokens.push(Token::new(TokenKind::Eof, line, column));
                return Ok(tokens);
            }
            Some(c) if c.is_ascii_alphabetic() || c == '_' => lexer.lex_ident(),
            Some(c) if c.is_ascii_digit() => lexer.lex_number()?,
            Some('"') => lexer.lex_string()?,
            Some('\'') => {
                return Err(lexer.error(line, column, "character literals are not supported"));
            }
            Some('#') => {
                return Err(lexer.error(line, column, "preprocessor directives are not supported"));
            }
            Some(_) => lexer.lex_punct()?,
        };
        tokens.push(Token::new(kind, line, column));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_tokenize_declaration() {
        let toks = kinds("int x = 10;");
        assert_eq!(
            toks,
            vec![
                TokenKind::Ident("int".into()),
                TokenKind::Ident("x".into()),
                TokenKind::Punct("="),
                TokenKind::IntLit("10".into()),
                TokenKind::Punct(";"),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_hex_preserves_spelling() {
        let toks = kinds("0xFf 0x10");
        assert_eq!(toks[0], TokenKind::IntLit("0xFf".into()));
        assert_eq!(toks[1], TokenKind::IntLit("0x10".into()));
    }

    #[test]
    fn test_tokenize_longest_operator_wins() {
        let toks = kinds("a <<= b >> c >= d");
        assert_eq!(toks[1], TokenKind::Punct("<<="));
        assert_eq!(toks[3], TokenKind::Punct(">>"));
        assert_eq!(toks[5], TokenKind::Punct(">="));
    }

    #[test]
    fn test_tokenize_positions_across_lines() {
        let toks = tokenize("int a;\n  a = 1;").unwrap();
        assert_eq!((toks[0].line, toks[0].column), (1, 1));
        assert_eq!((toks[3].line, toks[3].column), (2, 3));
    }

    #[test]
    fn test_tokenize_comments_preserve_lines() {
        let toks = tokenize("// one\n/* two\nthree */ x").unwrap();
        assert_eq!(toks[0].kind, TokenKind::Ident("x".into()));
        assert_eq!(toks[0].line, 3);
    }

    #[test]
    fn test_tokenize_string_escapes() {
        let toks = kinds(r#""a\tb\"c""#);
        assert_eq!(toks[0], TokenKind::StrLit("a\tb\"c".into()));
    }

    #[test]
    fn test_tokenize_integer_suffix_rejected() {
        let err = tokenize("10L").unwrap_err();
        assert!(err.message.contains("invalid integer literal"));
    }

    #[test]
    fn test_tokenize_preprocessor_rejected() {
        let err = tokenize("#include <stdio.h>").unwrap_err();
        assert!(err.message.contains("preprocessor"));
    }
}
