//! Defines the tokens and scanner that handles the transforming of the
//! source to tokens.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::types::{Line, Span};

/// `Token` types that exist in the tide language.
#[derive(IntoPrimitive, TryFromPrimitive, PartialEq, Eq, Clone, Copy, Debug)]
#[repr(u8)]
pub enum TokenKind {
    // Character Tokens.
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,

    Colon,
    Comma,
    Dot,
    Semicolon,
    At,

    Minus,
    Plus,
    Slash,
    Star,
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    RightArrow,

    // Literals.
    Identifier,
    String,
    Float,
    Integer,

    // Keywords.
    And,
    Or,
    Class,
    Def,
    Else,
    False,
    For,
    If,
    Let,
    Null,
    Return,
    Super,
    True,
    While,

    Error,
    Eof,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(&format!("{self:?}"))
    }
}

/// Actual tokens emitted by the scanner.
///
/// Contains the `TokenKind` that it represents together with the raw bytes
/// that comprise it and the source span it originates from.
#[derive(Clone, Debug)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a [u8],
    pub span: Span,
}

impl<'a> Token<'a> {
    pub fn as_str(&'a self) -> &'a str {
        std::str::from_utf8(self.lexeme).unwrap()
    }
}

/// Main struct for turning the source characters into tokens.
#[derive(Debug, Clone)]
pub struct Scanner<'a> {
    source: &'a [u8],
    start: usize,
    /// Always points at the next character to be consumed.
    current: usize,
    line: Line,
    line_start: usize,
}

impl<'a> Scanner<'a> {
    #[must_use]
    pub const fn new(source: &'a [u8]) -> Self {
        Self {
            source,
            start: 0,
            current: 0,
            line: Line(1),
            line_start: 0,
        }
    }

    /// Main scan that turns raw characters into tokens.
    ///
    /// Every call to this function consumes enough of the source to
    /// return exactly one token.
    pub fn scan(&mut self) -> Token<'a> {
        use TokenKind as TK;

        self.skip_whitespace();
        self.start = self.current;
        let token_kind = match self.advance() {
            None => TK::Eof,
            Some(c) => match c {
                b'(' => TK::LeftParen,
                b')' => TK::RightParen,
                b'{' => TK::LeftBrace,
                b'}' => TK::RightBrace,
                b':' => TK::Colon,
                b',' => TK::Comma,
                b'.' => TK::Dot,
                b';' => TK::Semicolon,
                b'@' => TK::At,
                b'-' => TK::Minus,
                b'+' => TK::Plus,
                b'/' => TK::Slash,
                b'*' => TK::Star,
                b'!' => {
                    if self.match_(b'=') {
                        TK::BangEqual
                    } else {
                        TK::Bang
                    }
                }
                b'=' => {
                    if self.match_(b'=') {
                        TK::EqualEqual
                    } else if self.match_(b'>') {
                        TK::RightArrow
                    } else {
                        TK::Equal
                    }
                }
                b'<' => {
                    if self.match_(b'=') {
                        TK::LessEqual
                    } else {
                        TK::Less
                    }
                }
                b'>' => {
                    if self.match_(b'=') {
                        TK::GreaterEqual
                    } else {
                        TK::Greater
                    }
                }
                b'"' => return self.string(),
                c if c.is_ascii_digit() => return self.number(c),
                c if c.is_ascii_alphabetic() || c == b'_' => return self.identifier(),
                _ => return self.error_token("Unexpected character."),
            },
        };
        self.make_token(token_kind)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                b' ' | b'\r' | b'\t' => {
                    self.advance();
                }
                b'\n' => {
                    self.newline();
                    self.advance();
                }
                b'/' => {
                    // Comments run to the end of the line.
                    if self.peek_next() == Some(b'/') {
                        while self.peek().is_some_and(|c| c != b'\n') {
                            self.advance();
                        }
                    } else {
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    fn string(&mut self) -> Token<'a> {
        while let Some(c) = self.peek() {
            match c {
                b'"' => break,
                b'\\' => {
                    self.advance();
                    self.advance();
                }
                b'\n' => {
                    self.newline();
                    self.advance();
                }
                _ => {
                    self.advance();
                }
            }
        }
        if self.peek().is_none() {
            return self.error_token("Unterminated string.");
        }
        // The closing quote.
        self.advance();
        self.make_token(TokenKind::String)
    }

    fn number(&mut self, first: u8) -> Token<'a> {
        if first == b'0' && matches!(self.peek(), Some(b'x' | b'X')) {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.advance();
            }
            return self.make_token(TokenKind::Integer);
        }
        if first == b'0' && matches!(self.peek(), Some(b'b' | b'B')) {
            self.advance();
            while self.peek().is_some_and(|c| c == b'0' || c == b'1') {
                self.advance();
            }
            return self.make_token(TokenKind::Integer);
        }

        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        // A fractional part turns the literal into a float.
        if self.peek() == Some(b'.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
            return self.make_token(TokenKind::Float);
        }
        self.make_token(TokenKind::Integer)
    }

    fn identifier(&mut self) -> Token<'a> {
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_')
        {
            self.advance();
        }
        self.make_token(self.identifier_type())
    }

    /// Uses a trie strategy to identify keywords.
    fn identifier_type(&self) -> TokenKind {
        use TokenKind as TK;
        let lexeme = &self.source[self.start..self.current];
        match lexeme[0] {
            b'a' => Self::check_keyword(lexeme, 1, b"nd", TK::And),
            b'c' => Self::check_keyword(lexeme, 1, b"lass", TK::Class),
            b'd' => Self::check_keyword(lexeme, 1, b"ef", TK::Def),
            b'e' => Self::check_keyword(lexeme, 1, b"lse", TK::Else),
            b'f' => match lexeme.get(1) {
                Some(b'a') => Self::check_keyword(lexeme, 2, b"lse", TK::False),
                Some(b'o') => Self::check_keyword(lexeme, 2, b"r", TK::For),
                _ => TK::Identifier,
            },
            b'i' => Self::check_keyword(lexeme, 1, b"f", TK::If),
            b'l' => Self::check_keyword(lexeme, 1, b"et", TK::Let),
            b'n' => Self::check_keyword(lexeme, 1, b"ull", TK::Null),
            b'o' => Self::check_keyword(lexeme, 1, b"r", TK::Or),
            b'r' => Self::check_keyword(lexeme, 1, b"eturn", TK::Return),
            b's' => Self::check_keyword(lexeme, 1, b"uper", TK::Super),
            b't' => Self::check_keyword(lexeme, 1, b"rue", TK::True),
            b'w' => Self::check_keyword(lexeme, 1, b"hile", TK::While),
            _ => TK::Identifier,
        }
    }

    fn check_keyword(lexeme: &[u8], start: usize, rest: &[u8], kind: TokenKind) -> TokenKind {
        if &lexeme[start..] == rest {
            kind
        } else {
            TokenKind::Identifier
        }
    }

    fn advance(&mut self) -> Option<u8> {
        let c = self.source.get(self.current).copied();
        if c.is_some() {
            self.current += 1;
        }
        c
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.current).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.source.get(self.current + 1).copied()
    }

    fn match_(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.current += 1;
            true
        } else {
            false
        }
    }

    fn newline(&mut self) {
        *self.line += 1;
        self.line_start = self.current + 1;
    }

    const fn span(&self) -> Span {
        Span::new(self.line, self.start.saturating_sub(self.line_start))
    }

    fn make_token(&self, kind: TokenKind) -> Token<'a> {
        Token {
            kind,
            lexeme: &self.source[self.start..self.current],
            span: self.span(),
        }
    }

    fn error_token(&self, message: &'static str) -> Token<'a> {
        Token {
            kind: TokenKind::Error,
            lexeme: message.as_bytes(),
            span: self.span(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut scanner = Scanner::new(source.as_bytes());
        let mut result = Vec::new();
        loop {
            let token = scanner.scan();
            let kind = token.kind;
            result.push(kind);
            if kind == TokenKind::Eof {
                return result;
            }
        }
    }

    #[test]
    fn test_scan_declaration() {
        use TokenKind as TK;
        assert_eq!(
            kinds("def add(a, b) { return a + b }"),
            vec![
                TK::Def,
                TK::Identifier,
                TK::LeftParen,
                TK::Identifier,
                TK::Comma,
                TK::Identifier,
                TK::RightParen,
                TK::LeftBrace,
                TK::Return,
                TK::Identifier,
                TK::Plus,
                TK::Identifier,
                TK::RightBrace,
                TK::Eof,
            ]
        );
    }

    #[test]
    fn test_scan_decorator_and_arrow() {
        use TokenKind as TK;
        assert_eq!(
            kinds("@deco(\"x\") def f() => 1"),
            vec![
                TK::At,
                TK::Identifier,
                TK::LeftParen,
                TK::String,
                TK::RightParen,
                TK::Def,
                TK::Identifier,
                TK::LeftParen,
                TK::RightParen,
                TK::RightArrow,
                TK::Integer,
                TK::Eof,
            ]
        );
    }

    #[test]
    fn test_number_bases() {
        use TokenKind as TK;
        assert_eq!(
            kinds("10 0x1f 0b101 2.5"),
            vec![TK::Integer, TK::Integer, TK::Integer, TK::Float, TK::Eof]
        );
    }

    #[test]
    fn test_line_tracking() {
        let mut scanner = Scanner::new(b"a\nb");
        assert_eq!(*scanner.scan().span.line, 1);
        assert_eq!(*scanner.scan().span.line, 2);
    }
}
