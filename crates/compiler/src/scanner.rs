//! The lexical scanner
//!
//! Turns a character stream into a `Token` stream one character at a
//! time, tracking `(line, column)`. Whitespace and `#` line comments
//! are skipped (a `#{` pair is reserved for dictionary literals and
//! never consumed as a comment start). `scan()` is idempotent once it
//! reaches end-of-input: every call after that keeps returning `END`.

use crate::token::{Token, TokenKind};
use silk_core::{Diagnostic, DiagnosticBag, Location};

pub struct Scanner {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    pub diagnostics: DiagnosticBag,
}

impl Scanner {
    pub fn new(source: &str) -> Self {
        Scanner {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            diagnostics: DiagnosticBag::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn location(&self) -> Location {
        Location::new(self.line, self.column)
    }

    fn matches(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('#') if self.peek_at(1) != Some('{') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn make(&self, kind: TokenKind, lexeme: String, location: Location) -> Token {
        Token::new(kind, lexeme, location)
    }

    fn error(&mut self, location: Location, message: impl Into<String>) -> Token {
        let message = message.into();
        self.diagnostics.push(Diagnostic::error(location, message.clone()));
        self.make(TokenKind::Error, message, location)
    }

    /// Scan and return the next token. Idempotent after `END`.
    pub fn scan(&mut self) -> Token {
        self.skip_whitespace_and_comments();
        let location = self.location();

        let Some(c) = self.advance() else {
            return self.make(TokenKind::End, String::new(), location);
        };

        match c {
            '(' => self.make(TokenKind::LParen, c.to_string(), location),
            ')' => self.make(TokenKind::RParen, c.to_string(), location),
            '{' => self.make(TokenKind::LBrace, c.to_string(), location),
            '}' => self.make(TokenKind::RBrace, c.to_string(), location),
            '[' => self.make(TokenKind::LBracket, c.to_string(), location),
            ']' => self.make(TokenKind::RBracket, c.to_string(), location),
            ',' => self.make(TokenKind::Comma, c.to_string(), location),
            ';' => self.make(TokenKind::Semicolon, c.to_string(), location),
            '|' => self.make(TokenKind::Pipe, c.to_string(), location),
            '%' => self.make(TokenKind::Percent, c.to_string(), location),

            ':' => {
                if self.matches(':') {
                    self.make(TokenKind::ColonColon, "::".into(), location)
                } else {
                    self.make(TokenKind::Colon, c.to_string(), location)
                }
            }

            '.' => {
                if self.peek() == Some('{') {
                    self.advance();
                    self.make(TokenKind::DotBrace, ".{".into(), location)
                } else if self.matches('.') {
                    self.make(TokenKind::DotDot, "..".into(), location)
                } else if self.peek().is_some_and(|d| d.is_ascii_digit()) {
                    self.scan_real_from_dot(location)
                } else {
                    self.make(TokenKind::Dot, c.to_string(), location)
                }
            }

            '#' => {
                // Only reachable when followed by '{': a bare '#' is
                // consumed as a line comment by skip_whitespace_and_comments.
                self.advance();
                self.make(TokenKind::HashBrace, "#{".into(), location)
            }

            '$' => {
                if self.matches('{') {
                    self.make(TokenKind::DollarBrace, "${".into(), location)
                } else {
                    self.error(location, format!("unexpected character '{c}'"))
                }
            }

            '+' => {
                if self.matches('=') {
                    self.make(TokenKind::PlusEq, "+=".into(), location)
                } else {
                    self.make(TokenKind::Plus, c.to_string(), location)
                }
            }

            '-' => {
                if self.peek().is_some_and(|d| d.is_ascii_digit()) {
                    self.scan_number(location, true)
                } else if self.matches('>') {
                    self.make(TokenKind::Arrow, "->".into(), location)
                } else if self.matches('=') {
                    self.make(TokenKind::MinusEq, "-=".into(), location)
                } else {
                    self.make(TokenKind::Minus, c.to_string(), location)
                }
            }

            '*' => {
                if self.matches('*') {
                    if self.matches('=') {
                        self.make(TokenKind::StarStarEq, "**=".into(), location)
                    } else {
                        self.make(TokenKind::StarStar, "**".into(), location)
                    }
                } else if self.matches('=') {
                    self.make(TokenKind::StarEq, "*=".into(), location)
                } else {
                    self.make(TokenKind::Star, c.to_string(), location)
                }
            }

            '/' => {
                if self.matches('/') {
                    if self.matches('=') {
                        self.make(TokenKind::SlashSlashEq, "//=".into(), location)
                    } else {
                        self.make(TokenKind::SlashSlash, "//".into(), location)
                    }
                } else if self.matches('=') {
                    self.make(TokenKind::SlashEq, "/=".into(), location)
                } else {
                    self.make(TokenKind::Slash, c.to_string(), location)
                }
            }

            '=' => {
                if self.matches('=') {
                    if self.matches('=') {
                        self.make(TokenKind::EqEqEq, "===".into(), location)
                    } else {
                        self.make(TokenKind::EqEq, "==".into(), location)
                    }
                } else if self.matches('>') {
                    self.make(TokenKind::FatArrow, "=>".into(), location)
                } else {
                    self.make(TokenKind::Eq, c.to_string(), location)
                }
            }

            '!' => {
                if self.matches('=') {
                    self.make(TokenKind::BangEq, "!=".into(), location)
                } else {
                    self.error(location, "unexpected character '!'")
                }
            }

            '<' => {
                if self.matches('=') {
                    self.make(TokenKind::Lte, "<=".into(), location)
                } else if self.matches('-') {
                    self.make(TokenKind::LeftArrow, "<-".into(), location)
                } else {
                    self.make(TokenKind::Lt, c.to_string(), location)
                }
            }

            '>' => {
                if self.matches('=') {
                    self.make(TokenKind::Gte, ">=".into(), location)
                } else {
                    self.make(TokenKind::Gt, c.to_string(), location)
                }
            }

            '\'' => self.scan_string(location),
            '"' => self.scan_character(location),

            d if d.is_ascii_digit() => {
                self.pos -= 1;
                self.column -= 1;
                self.scan_number(location, false)
            }

            c if is_identifier_start(c) => {
                self.pos -= 1;
                self.column -= 1;
                self.scan_identifier(location)
            }

            other => self.error(location, format!("unexpected character '{other}'")),
        }
    }

    fn scan_string(&mut self, location: Location) -> Token {
        let mut lexeme = String::from('\'');
        loop {
            match self.peek() {
                None | Some('\n') => {
                    return self.error(location, "unterminated string literal");
                }
                Some('\'') => {
                    self.advance();
                    lexeme.push('\'');
                    break;
                }
                Some(c) => {
                    self.advance();
                    lexeme.push(c);
                }
            }
        }
        self.make(TokenKind::String, lexeme, location)
    }

    fn scan_character(&mut self, location: Location) -> Token {
        let mut lexeme = String::from('"');
        match self.advance() {
            Some(c) => lexeme.push(c),
            None => return self.error(location, "unterminated character literal"),
        }
        self.make(TokenKind::Character, lexeme, location)
    }

    fn scan_number(&mut self, location: Location, negative: bool) -> Token {
        let mut lexeme = String::new();
        if negative {
            // The '-' was already consumed by the caller before dispatching here.
            lexeme.push('-');
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            lexeme.push(self.advance().unwrap());
        }
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            lexeme.push(self.advance().unwrap());
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                lexeme.push(self.advance().unwrap());
            }
            return self.make(TokenKind::Real, lexeme, location);
        }
        if negative {
            self.make(TokenKind::Integer, lexeme, location)
        } else {
            self.make(TokenKind::Natural, lexeme, location)
        }
    }

    fn scan_real_from_dot(&mut self, location: Location) -> Token {
        let mut lexeme = String::from('.');
        self.advance();
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            lexeme.push(self.advance().unwrap());
        }
        self.make(TokenKind::Real, lexeme, location)
    }

    fn scan_identifier(&mut self, location: Location) -> Token {
        let mut lexeme = String::new();
        while self.peek().is_some_and(is_identifier_continue) {
            lexeme.push(self.advance().unwrap());
        }
        let kind = TokenKind::keyword_from_str(&lexeme).unwrap_or(TokenKind::Identifier);
        self.make(kind, lexeme, location)
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_identifier_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut scanner = Scanner::new(source);
        let mut out = Vec::new();
        loop {
            let tok = scanner.scan();
            let end = tok.is_end();
            out.push(tok.kind);
            if end {
                break;
            }
        }
        out
    }

    #[test]
    fn recognizes_keywords_and_identifiers() {
        assert_eq!(
            kinds("let x"),
            vec![TokenKind::Let, TokenKind::Identifier, TokenKind::End]
        );
    }

    #[test]
    fn greedy_equals_family() {
        assert_eq!(kinds("="), vec![TokenKind::Eq, TokenKind::End]);
        assert_eq!(kinds("=="), vec![TokenKind::EqEq, TokenKind::End]);
        assert_eq!(kinds("==="), vec![TokenKind::EqEqEq, TokenKind::End]);
        assert_eq!(kinds("=>"), vec![TokenKind::FatArrow, TokenKind::End]);
    }

    #[test]
    fn numeric_literal_forms() {
        assert_eq!(kinds("7"), vec![TokenKind::Natural, TokenKind::End]);
        assert_eq!(kinds("7.5"), vec![TokenKind::Real, TokenKind::End]);
        assert_eq!(kinds("-7"), vec![TokenKind::Integer, TokenKind::End]);
        assert_eq!(kinds(".5"), vec![TokenKind::Real, TokenKind::End]);
    }

    #[test]
    fn minus_followed_by_space_is_an_operator_not_a_literal() {
        assert_eq!(
            kinds("a - 5"),
            vec![
                TokenKind::Identifier,
                TokenKind::Minus,
                TokenKind::Natural,
                TokenKind::End
            ]
        );
    }

    #[test]
    fn string_literal_preserves_quotes_in_lexeme() {
        let mut scanner = Scanner::new("'hello, world'");
        let tok = scanner.scan();
        assert_eq!(tok.kind, TokenKind::String);
        assert_eq!(tok.lexeme, "'hello, world'");
    }

    #[test]
    fn character_literal_is_prefixed_by_a_double_quote() {
        let mut scanner = Scanner::new("\"a");
        let tok = scanner.scan();
        assert_eq!(tok.kind, TokenKind::Character);
        assert_eq!(tok.lexeme, "\"a");
    }

    #[test]
    fn hash_brace_is_not_treated_as_a_comment() {
        assert_eq!(kinds("#{ }"), vec![TokenKind::HashBrace, TokenKind::RBrace, TokenKind::End]);
    }

    #[test]
    fn line_comment_is_skipped() {
        assert_eq!(kinds("# a comment\nlet"), vec![TokenKind::Let, TokenKind::End]);
    }

    #[test]
    fn unterminated_string_is_reported_and_scanning_resumes_at_end_of_line() {
        let mut scanner = Scanner::new("'oops\nlet x");
        let bad = scanner.scan();
        assert_eq!(bad.kind, TokenKind::Error);
        assert!(scanner.diagnostics.has_errors());
        let next = scanner.scan();
        assert_eq!(next.kind, TokenKind::Let);
    }

    #[test]
    fn scan_is_idempotent_after_end() {
        let mut scanner = Scanner::new("");
        assert_eq!(scanner.scan().kind, TokenKind::End);
        assert_eq!(scanner.scan().kind, TokenKind::End);
    }
}
