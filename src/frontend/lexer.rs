//! Lexer for the isl notation subset.
//!
//! The lexer converts source text into a stream of tokens.

use crate::frontend::token::{Token, TokenKind};
use crate::utils::errors::{ParseError, ParseErrorKind};
use crate::utils::location::{SourceLocation, Span};
use unicode_xid::UnicodeXID;
use std::iter::Peekable;
use std::str::Chars;

/// A lexer for tokenizing isl text.
pub struct Lexer<'a> {
    /// The source text
    source: &'a str,
    /// Character iterator
    chars: Peekable<Chars<'a>>,
    /// Current byte offset
    offset: usize,
    /// Current line number (1-indexed)
    line: usize,
    /// Current column number (1-indexed)
    column: usize,
    /// Start of current token
    token_start: SourceLocation,
    /// Whether we've hit EOF
    at_eof: bool,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().peekable(),
            offset: 0,
            line: 1,
            column: 1,
            token_start: SourceLocation::start(),
            at_eof: false,
        }
    }

    fn current_location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column, self.offset)
    }

    fn mark_token_start(&mut self) {
        self.token_start = self.current_location();
    }

    /// Create a span from token start to current location.
    fn make_span(&self) -> Span {
        Span::from_locations(self.token_start, self.current_location())
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    /// Peek one character past the current one.
    fn peek_next(&self) -> Option<char> {
        let mut chars = self.source[self.offset..].chars();
        chars.next();
        chars.next()
    }

    /// Consume and return the current character.
    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Consume the current character if it matches.
    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Skip whitespace and comments (`#` and `//` to end of line, `/* */`).
    fn skip_whitespace(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('#') => self.skip_line(),
                Some('/') if self.peek_next() == Some('/') => self.skip_line(),
                Some('/') if self.peek_next() == Some('*') => {
                    self.advance();
                    self.advance();
                    while let Some(c) = self.advance() {
                        if c == '*' && self.match_char('/') {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn skip_line(&mut self) {
        while self.peek().is_some() && self.peek() != Some('\n') {
            self.advance();
        }
    }

    /// Create a token with the given kind.
    fn make_token(&self, kind: TokenKind) -> Token {
        let span = self.make_span();
        let lexeme = self.source[span.start_offset..span.end_offset].to_string();
        Token::new(kind, span, lexeme)
    }

    fn make_error(&self, message: String, found: char) -> ParseError {
        ParseError {
            message,
            span: self.make_span(),
            kind: ParseErrorKind::UnexpectedChar,
            expected: Vec::new(),
            found: Some(found.to_string()),
        }
    }

    fn scan_integer(&mut self) -> Token {
        while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            self.advance();
        }
        self.make_token(TokenKind::Integer)
    }

    /// Scan an identifier or keyword. Primes are allowed after the first
    /// character, so `i'` names a target iterator.
    fn scan_identifier(&mut self) -> Token {
        while self.peek().map(|c| c.is_xid_continue() || c == '_' || c == '\'').unwrap_or(false) {
            self.advance();
        }
        let span = self.make_span();
        let lexeme = &self.source[span.start_offset..span.end_offset];
        let kind = TokenKind::keyword(lexeme).unwrap_or(TokenKind::Identifier);
        Token::new(kind, span, lexeme.to_string())
    }

    /// Scan the next token.
    pub fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_whitespace();
        self.mark_token_start();

        let c = match self.advance() {
            Some(c) => c,
            None => {
                self.at_eof = true;
                return Ok(self.make_token(TokenKind::Eof));
            }
        };

        match c {
            '(' => Ok(self.make_token(TokenKind::LeftParen)),
            ')' => Ok(self.make_token(TokenKind::RightParen)),
            '[' => Ok(self.make_token(TokenKind::LeftBracket)),
            ']' => Ok(self.make_token(TokenKind::RightBracket)),
            '{' => Ok(self.make_token(TokenKind::LeftBrace)),
            '}' => Ok(self.make_token(TokenKind::RightBrace)),
            ',' => Ok(self.make_token(TokenKind::Comma)),
            ';' => Ok(self.make_token(TokenKind::Semicolon)),
            ':' => Ok(self.make_token(TokenKind::Colon)),
            '+' => Ok(self.make_token(TokenKind::Plus)),
            '*' => Ok(self.make_token(TokenKind::Star)),
            '=' => {
                // isl accepts `==` as well
                self.match_char('=');
                Ok(self.make_token(TokenKind::Equal))
            }
            '-' => {
                if self.match_char('>') {
                    Ok(self.make_token(TokenKind::Arrow))
                } else {
                    Ok(self.make_token(TokenKind::Minus))
                }
            }
            '<' => {
                if self.match_char('=') {
                    Ok(self.make_token(TokenKind::LessEqual))
                } else {
                    Ok(self.make_token(TokenKind::Less))
                }
            }
            '>' => {
                if self.match_char('=') {
                    Ok(self.make_token(TokenKind::GreaterEqual))
                } else {
                    Ok(self.make_token(TokenKind::Greater))
                }
            }
            c if c.is_ascii_digit() => Ok(self.scan_integer()),
            c if c.is_xid_start() || c == '_' => Ok(self.scan_identifier()),
            _ => Err(self.make_error(format!("Unexpected character: '{}'", c), c)),
        }
    }

    /// Check if we've reached EOF.
    pub fn is_at_end(&self) -> bool {
        self.at_eof
    }

    /// Collect all tokens into a vector, ending with `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = token.is_eof();
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.at_eof {
            None
        } else {
            let result = self.next_token();
            if result.as_ref().map(|t| t.is_eof()).unwrap_or(true) {
                self.at_eof = true;
            }
            Some(result)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token> {
        Lexer::new(source).tokenize().unwrap()
    }

    fn token_kinds(source: &str) -> Vec<TokenKind> {
        lex(source).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_empty() {
        let tokens = lex("  \n\t ");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Eof);
    }

    #[test]
    fn test_domain() {
        let kinds = token_kinds("[N] -> { S0[i] : 0 <= i < N }");
        assert_eq!(kinds, vec![
            TokenKind::LeftBracket,
            TokenKind::Identifier,
            TokenKind::RightBracket,
            TokenKind::Arrow,
            TokenKind::LeftBrace,
            TokenKind::Identifier,
            TokenKind::LeftBracket,
            TokenKind::Identifier,
            TokenKind::RightBracket,
            TokenKind::Colon,
            TokenKind::Integer,
            TokenKind::LessEqual,
            TokenKind::Identifier,
            TokenKind::Less,
            TokenKind::Identifier,
            TokenKind::RightBrace,
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn test_primed_identifiers_and_keywords() {
        let tokens = lex("i' j'' and N_1");
        assert_eq!(tokens[0].lexeme, "i'");
        assert_eq!(tokens[1].lexeme, "j''");
        assert_eq!(tokens[2].kind, TokenKind::And);
        assert_eq!(tokens[3].lexeme, "N_1");
    }

    #[test]
    fn test_operators() {
        let kinds = token_kinds("- -> = == >= > 2*i");
        assert_eq!(&kinds[..6], &[
            TokenKind::Minus,
            TokenKind::Arrow,
            TokenKind::Equal,
            TokenKind::Equal,
            TokenKind::GreaterEqual,
            TokenKind::Greater,
        ]);
        assert_eq!(&kinds[6..9], &[TokenKind::Integer, TokenKind::Star, TokenKind::Identifier]);
    }

    #[test]
    fn test_comments() {
        let tokens = lex("# domain\nS0 // first\n/* block */ S1");
        assert_eq!(tokens[0].lexeme, "S0");
        assert_eq!(tokens[1].lexeme, "S1");
    }

    #[test]
    fn test_location_tracking() {
        let tokens = lex("S0\n  S1");
        assert_eq!(tokens[0].span.start_line, 1);
        assert_eq!(tokens[1].span.start_line, 2);
        assert_eq!(tokens[1].span.start_column, 3);
    }

    #[test]
    fn test_unexpected_character() {
        let err = Lexer::new("{ S0[i] : i % 2 }").tokenize().unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedChar);
        assert_eq!(err.found.as_deref(), Some("%"));
        assert_eq!(err.span.start_column, 13);
    }
}
