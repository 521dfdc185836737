//! Parser for the isl notation subset.
//!
//! This module implements a recursive descent parser that turns a token
//! stream into an unresolved syntax tree: names are kept as strings and
//! only bound to dimensions or parameters when the tree is lowered.
//!
//! ```text
//! union      := params? '{' piece (';' piece)* ';'? '}'
//! params     := '[' (ident (',' ident)*)? ']' '->'
//! piece      := tuple ('->' tuple)? (':' constraint ('and' constraint)*)?
//! tuple      := ident '[' (expr (',' expr)*)? ']'
//! constraint := operands (cmp operands)+
//! operands   := expr (',' expr)*
//! expr       := term (('+' | '-') term)*
//! term       := factor ('*' factor)*
//! factor     := '-' factor | integer factor? | ident | '(' expr ')'
//! ```

use crate::frontend::lexer::Lexer;
use crate::frontend::token::{Token, TokenKind};
use crate::utils::errors::{ParseError, ParseErrorKind, PolyResult, PolySchedError};
use crate::utils::location::Span;

/// A named term of a linear form.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub name: String,
    pub coeff: i64,
    pub span: Span,
}

/// An affine expression over names that are not yet resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearForm {
    pub terms: Vec<Term>,
    pub constant: i64,
    pub span: Span,
}

impl LinearForm {
    pub fn constant(value: i64, span: Span) -> Self {
        Self { terms: Vec::new(), constant: value, span }
    }

    pub fn name(name: String, span: Span) -> Self {
        Self { terms: vec![Term { name, coeff: 1, span }], constant: 0, span }
    }

    pub fn is_constant(&self) -> bool {
        self.terms.iter().all(|t| t.coeff == 0)
    }

    /// The name when the form is exactly one name with coefficient one.
    pub fn as_name(&self) -> Option<&str> {
        match self.terms.as_slice() {
            [t] if t.coeff == 1 && self.constant == 0 => Some(&t.name),
            _ => None,
        }
    }

    /// `self + sign * other`.
    fn add(mut self, other: LinearForm, sign: i64) -> PolyResult<Self> {
        for term in other.terms {
            let coeff = checked(term.coeff.checked_mul(sign))?;
            match self.terms.iter_mut().find(|t| t.name == term.name) {
                Some(t) => t.coeff = checked(t.coeff.checked_add(coeff))?,
                None => self.terms.push(Term { coeff, ..term }),
            }
        }
        self.constant = checked(other.constant.checked_mul(sign).and_then(|c| self.constant.checked_add(c)))?;
        self.span = self.span.merge(&other.span);
        self.terms.retain(|t| t.coeff != 0);
        Ok(self)
    }

    fn offset(mut self, delta: i64) -> PolyResult<Self> {
        self.constant = checked(self.constant.checked_add(delta))?;
        Ok(self)
    }

    fn scale(mut self, factor: i64) -> PolyResult<Self> {
        for t in &mut self.terms {
            t.coeff = checked(t.coeff.checked_mul(factor))?;
        }
        self.constant = checked(self.constant.checked_mul(factor))?;
        self.terms.retain(|t| t.coeff != 0);
        Ok(self)
    }
}

fn checked(v: Option<i64>) -> PolyResult<i64> {
    v.ok_or_else(|| PolySchedError::overflow("integer literal arithmetic"))
}

/// Comparison of a constraint row against zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// `form >= 0`
    NonNegative,
    /// `form = 0`
    Zero,
}

/// One normalized comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub form: LinearForm,
    pub relation: Relation,
}

/// `S0[i, j]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    pub name: String,
    pub entries: Vec<LinearForm>,
    pub span: Span,
}

/// A tuple (set piece) or a pair of tuples (relation piece) with its
/// constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct Piece {
    pub tuples: Vec<Tuple>,
    pub constraints: Vec<Comparison>,
    pub span: Span,
}

impl Piece {
    pub fn is_relation(&self) -> bool {
        self.tuples.len() == 2
    }
}

/// A parsed union set or union map.
#[derive(Debug, Clone, PartialEq)]
pub struct UnionText {
    /// `None` when the text has no parameter prefix
    pub params: Option<Vec<String>>,
    pub pieces: Vec<Piece>,
}

/// A parser for the isl notation subset.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    previous: Token,
}

impl<'a> Parser<'a> {
    /// Create a new parser from a lexer.
    pub fn new(mut lexer: Lexer<'a>) -> PolyResult<Self> {
        let first_token = lexer.next_token()?;
        Ok(Self {
            lexer,
            current: first_token.clone(),
            previous: first_token,
        })
    }

    /// Parse a complete union set or map.
    pub fn parse_union(&mut self) -> PolyResult<UnionText> {
        let params = if self.check(TokenKind::LeftBracket) {
            Some(self.parse_params()?)
        } else {
            None
        };

        self.consume(TokenKind::LeftBrace, "Expected '{'")?;
        let mut pieces = Vec::new();
        while !self.check(TokenKind::RightBrace) {
            pieces.push(self.parse_piece()?);
            if !self.match_token(TokenKind::Semicolon)? {
                break;
            }
        }
        self.consume(TokenKind::RightBrace, "Expected '}' after the last piece")?;

        if !self.is_at_end() {
            return Err(self.error(ParseErrorKind::UnexpectedToken, "Unexpected input after '}'", &[TokenKind::Eof]));
        }
        Ok(UnionText { params, pieces })
    }

    fn parse_params(&mut self) -> PolyResult<Vec<String>> {
        self.consume(TokenKind::LeftBracket, "Expected '['")?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RightBracket) {
            loop {
                params.push(self.consume_identifier("Expected parameter name")?);
                if !self.match_token(TokenKind::Comma)? {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightBracket, "Expected ']' after parameters")?;
        self.consume(TokenKind::Arrow, "Expected '->' after parameters")?;
        Ok(params)
    }

    fn parse_piece(&mut self) -> PolyResult<Piece> {
        let start = self.current.span;
        let mut tuples = vec![self.parse_tuple()?];
        if self.match_token(TokenKind::Arrow)? {
            tuples.push(self.parse_tuple()?);
        }

        let mut constraints = Vec::new();
        if self.match_token(TokenKind::Colon)? {
            loop {
                self.parse_constraint(&mut constraints)?;
                if !self.match_token(TokenKind::And)? {
                    break;
                }
            }
        }

        Ok(Piece { tuples, constraints, span: start.merge(&self.previous.span) })
    }

    fn parse_tuple(&mut self) -> PolyResult<Tuple> {
        let start = self.current.span;
        let name = self.consume_identifier("Expected statement name")?;
        self.consume(TokenKind::LeftBracket, "Expected '[' after statement name")?;
        let mut entries = Vec::new();
        if !self.check(TokenKind::RightBracket) {
            loop {
                entries.push(self.parse_expression()?);
                if !self.match_token(TokenKind::Comma)? {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightBracket, "Expected ']' after tuple")?;
        Ok(Tuple { name, entries, span: start.merge(&self.previous.span) })
    }

    /// `a <= b < c` becomes `b - a >= 0` and `c - b - 1 >= 0`. Operands may
    /// be lists: `0 <= i, j < N` bounds both `i` and `j`.
    fn parse_constraint(&mut self, out: &mut Vec<Comparison>) -> PolyResult<()> {
        let mut lhs = self.parse_operands()?;
        if !self.current.is_comparison() {
            return Err(self.error(
                ParseErrorKind::UnexpectedToken,
                "Expected a comparison",
                &[TokenKind::Less, TokenKind::LessEqual, TokenKind::Equal, TokenKind::GreaterEqual, TokenKind::Greater],
            ));
        }
        while self.current.is_comparison() {
            let op = self.current.kind;
            self.advance()?;
            let rhs = self.parse_operands()?;
            for l in &lhs {
                for r in &rhs {
                    out.push(compare(op, l, r)?);
                }
            }
            lhs = rhs;
        }
        Ok(())
    }

    fn parse_operands(&mut self) -> PolyResult<Vec<LinearForm>> {
        let mut operands = vec![self.parse_expression()?];
        while self.match_token(TokenKind::Comma)? {
            operands.push(self.parse_expression()?);
        }
        Ok(operands)
    }

    fn parse_expression(&mut self) -> PolyResult<LinearForm> {
        let mut expr = self.parse_term()?;
        loop {
            let sign = if self.match_token(TokenKind::Plus)? {
                1
            } else if self.match_token(TokenKind::Minus)? {
                -1
            } else {
                break;
            };
            let rhs = self.parse_term()?;
            expr = expr.add(rhs, sign)?;
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> PolyResult<LinearForm> {
        let mut expr = self.parse_factor()?;
        while self.match_token(TokenKind::Star)? {
            let rhs = self.parse_factor()?;
            expr = self.multiply(expr, rhs)?;
        }
        Ok(expr)
    }

    fn parse_factor(&mut self) -> PolyResult<LinearForm> {
        let start = self.current.span;
        if self.match_token(TokenKind::Minus)? {
            let inner = self.parse_factor()?;
            let mut negated = inner.scale(-1)?;
            negated.span = start.merge(&negated.span);
            return Ok(negated);
        }
        if self.check(TokenKind::Integer) {
            let value: i64 = self.current.lexeme.parse().map_err(|_| {
                self.error(ParseErrorKind::UnexpectedToken, "Integer literal out of range", &[])
            })?;
            self.advance()?;
            let literal = LinearForm::constant(value, start);
            // isl writes `2i` for `2 * i`
            if self.check(TokenKind::Identifier) || self.check(TokenKind::LeftParen) {
                let rhs = self.parse_factor()?;
                return self.multiply(literal, rhs);
            }
            return Ok(literal);
        }
        if self.check(TokenKind::Identifier) {
            let name = self.current.lexeme.clone();
            self.advance()?;
            return Ok(LinearForm::name(name, start));
        }
        if self.match_token(TokenKind::LeftParen)? {
            let inner = self.parse_expression()?;
            self.consume(TokenKind::RightParen, "Expected ')' after expression")?;
            return Ok(inner);
        }
        Err(self.error(
            ParseErrorKind::UnexpectedToken,
            "Expected an affine expression",
            &[TokenKind::Integer, TokenKind::Identifier, TokenKind::LeftParen, TokenKind::Minus],
        ))
    }

    fn multiply(&self, lhs: LinearForm, rhs: LinearForm) -> PolyResult<LinearForm> {
        let span = lhs.span.merge(&rhs.span);
        let mut product = if lhs.is_constant() {
            rhs.scale(lhs.constant)?
        } else if rhs.is_constant() {
            lhs.scale(rhs.constant)?
        } else {
            return Err(ParseError {
                message: "Product of two non-constant expressions is not affine".to_string(),
                span,
                kind: ParseErrorKind::NonAffine,
                expected: Vec::new(),
                found: None,
            }
            .into());
        };
        product.span = span;
        Ok(product)
    }

    // Helper methods
    fn check(&self, kind: TokenKind) -> bool { self.current.kind == kind }
    fn is_at_end(&self) -> bool { self.current.kind == TokenKind::Eof }

    fn advance(&mut self) -> PolyResult<&Token> {
        self.previous = self.current.clone();
        self.current = self.lexer.next_token()?;
        Ok(&self.previous)
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> PolyResult<&Token> {
        if self.check(kind) {
            self.advance()
        } else {
            Err(self.error(ParseErrorKind::UnexpectedToken, message, &[kind]))
        }
    }

    fn consume_identifier(&mut self, message: &str) -> PolyResult<String> {
        if self.check(TokenKind::Identifier) {
            let name = self.current.lexeme.clone();
            self.advance()?;
            Ok(name)
        } else {
            Err(self.error(ParseErrorKind::ExpectedIdentifier, message, &[TokenKind::Identifier]))
        }
    }

    fn match_token(&mut self, kind: TokenKind) -> PolyResult<bool> {
        if self.check(kind) { self.advance()?; Ok(true) } else { Ok(false) }
    }

    fn error(&self, kind: ParseErrorKind, message: &str, expected: &[TokenKind]) -> PolySchedError {
        let kind = if self.is_at_end() { ParseErrorKind::UnexpectedEof } else { kind };
        ParseError {
            message: message.to_string(),
            span: self.current.span,
            kind,
            expected: expected.iter().map(|k| k.describe().to_string()).collect(),
            found: Some(self.current.kind.describe().to_string()),
        }
        .into()
    }
}

fn compare(op: TokenKind, lhs: &LinearForm, rhs: &LinearForm) -> PolyResult<Comparison> {
    let (form, relation) = match op {
        TokenKind::Equal => (lhs.clone().add(rhs.clone(), -1)?, Relation::Zero),
        TokenKind::GreaterEqual => (lhs.clone().add(rhs.clone(), -1)?, Relation::NonNegative),
        TokenKind::LessEqual => (rhs.clone().add(lhs.clone(), -1)?, Relation::NonNegative),
        TokenKind::Greater => (lhs.clone().add(rhs.clone(), -1)?.offset(-1)?, Relation::NonNegative),
        _ => (rhs.clone().add(lhs.clone(), -1)?.offset(-1)?, Relation::NonNegative),
    };
    Ok(Comparison { form, relation })
}

/// Parse a union set or map.
pub fn parse_union(source: &str) -> PolyResult<UnionText> {
    Parser::new(Lexer::new(source))?.parse_union()
}
