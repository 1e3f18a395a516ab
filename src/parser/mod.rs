//! Pratt parser: tokens to AST.
//!
//! Each token kind maps to an optional prefix rule and an optional infix
//! rule; `parse_expression` drives them by precedence climbing.

pub mod precedence;

use crate::ast::{Block, Expr, ExprKind, InfixOp, PrefixOp, Program, Stmt, StmtKind};
use crate::error::ParserError;
use crate::lexer::{Token, TokenKind};

use precedence::{token_precedence, Precedence};

/// Result type for parsing.
pub type ParseResult<T> = Result<T, ParserError>;

/// The parser consumes a token stream and produces a `Program`.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Parse the whole token stream.
    pub fn parse(&mut self) -> ParseResult<Program> {
        let mut program = Program::default();
        while !self.cur_is(&TokenKind::Eof) {
            program.statements.push(self.parse_statement()?);
            self.advance();
        }
        Ok(program)
    }

    // --- Statements ---

    fn parse_statement(&mut self) -> ParseResult<Stmt> {
        match self.cur().kind {
            TokenKind::Let => self.parse_let_statement(),
            TokenKind::Return => self.parse_return_statement(),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_let_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.cur().span;

        let name = match &self.peek().kind {
            TokenKind::Identifier(name) => name.clone(),
            other => {
                return Err(ParserError::unexpected_token(
                    "identifier",
                    other.to_string(),
                    self.peek().span,
                ))
            }
        };
        self.advance();
        self.expect_peek(&TokenKind::Assign)?;
        self.advance();

        let mut value = self.parse_expression(Precedence::Lowest)?;

        // Name the function literal after its binding so it can call itself.
        if let ExprKind::Function { name: fn_name, .. } = &mut value.kind {
            *fn_name = Some(name.clone());
        }

        let span = start.merge(value.span);
        self.skip_optional_semicolon();
        Ok(Stmt::new(StmtKind::Let { name, value }, span))
    }

    fn parse_return_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.cur().span;
        self.advance();
        let value = self.parse_expression(Precedence::Lowest)?;
        let span = start.merge(value.span);
        self.skip_optional_semicolon();
        Ok(Stmt::new(StmtKind::Return(value), span))
    }

    fn parse_expression_statement(&mut self) -> ParseResult<Stmt> {
        let expr = self.parse_expression(Precedence::Lowest)?;
        let span = expr.span;
        self.skip_optional_semicolon();
        Ok(Stmt::new(StmtKind::Expression(expr), span))
    }

    fn parse_block(&mut self) -> ParseResult<Block> {
        let start = self.cur().span;
        self.advance();

        let mut statements = Vec::new();
        while !self.cur_is(&TokenKind::RightBrace) {
            if self.cur_is(&TokenKind::Eof) {
                return Err(ParserError::unexpected_token(
                    "'}'",
                    "<eof>",
                    self.cur().span,
                ));
            }
            statements.push(self.parse_statement()?);
            self.advance();
        }

        let span = start.merge(self.cur().span);
        Ok(Block { statements, span })
    }

    // --- Expressions ---

    fn parse_expression(&mut self, precedence: Precedence) -> ParseResult<Expr> {
        let mut left = self.parse_prefix()?;

        while !self.peek_is(&TokenKind::Semicolon) && precedence < self.peek_precedence() {
            self.advance();
            left = self.parse_infix(left)?;
        }

        Ok(left)
    }

    /// Dispatch on the current token's prefix rule.
    fn parse_prefix(&mut self) -> ParseResult<Expr> {
        let span = self.cur().span;
        match self.cur().kind.clone() {
            TokenKind::Identifier(name) => Ok(Expr::new(ExprKind::Identifier(name), span)),
            TokenKind::IntLiteral(value) => Ok(Expr::new(ExprKind::IntegerLiteral(value), span)),
            TokenKind::StringLiteral(value) => Ok(Expr::new(ExprKind::StringLiteral(value), span)),
            TokenKind::True => Ok(Expr::new(ExprKind::BooleanLiteral(true), span)),
            TokenKind::False => Ok(Expr::new(ExprKind::BooleanLiteral(false), span)),
            TokenKind::Bang => self.parse_prefix_operator(PrefixOp::Bang),
            TokenKind::Minus => self.parse_prefix_operator(PrefixOp::Minus),
            TokenKind::LeftParen => self.parse_grouped(),
            TokenKind::If => self.parse_if(),
            TokenKind::Fn => self.parse_function_literal(),
            TokenKind::LeftBracket => self.parse_array_literal(),
            TokenKind::LeftBrace => self.parse_hash_literal(),
            other => Err(ParserError::NoPrefixParse {
                found: other.to_string(),
                span,
            }),
        }
    }

    /// Dispatch on the current token's infix rule; `left` is already parsed.
    fn parse_infix(&mut self, left: Expr) -> ParseResult<Expr> {
        match self.cur().kind {
            TokenKind::Plus => self.parse_infix_operator(left, InfixOp::Add),
            TokenKind::Minus => self.parse_infix_operator(left, InfixOp::Sub),
            TokenKind::Star => self.parse_infix_operator(left, InfixOp::Mul),
            TokenKind::Slash => self.parse_infix_operator(left, InfixOp::Div),
            TokenKind::Less => self.parse_infix_operator(left, InfixOp::Less),
            TokenKind::Greater => self.parse_infix_operator(left, InfixOp::Greater),
            TokenKind::EqualEqual => self.parse_infix_operator(left, InfixOp::Equal),
            TokenKind::BangEqual => self.parse_infix_operator(left, InfixOp::NotEqual),
            TokenKind::LeftParen => self.parse_call(left),
            TokenKind::LeftBracket => self.parse_index(left),
            ref other => Err(ParserError::general(
                format!("'{}' is not an infix operator", other),
                self.cur().span,
            )),
        }
    }

    fn parse_prefix_operator(&mut self, operator: PrefixOp) -> ParseResult<Expr> {
        let start = self.cur().span;
        self.advance();
        let right = self.parse_expression(Precedence::Prefix)?;
        let span = start.merge(right.span);
        Ok(Expr::new(
            ExprKind::Prefix {
                operator,
                right: Box::new(right),
            },
            span,
        ))
    }

    fn parse_infix_operator(&mut self, left: Expr, operator: InfixOp) -> ParseResult<Expr> {
        let precedence = self.cur_precedence();
        self.advance();
        let right = self.parse_expression(precedence)?;
        let span = left.span.merge(right.span);
        Ok(Expr::new(
            ExprKind::Infix {
                operator,
                left: Box::new(left),
                right: Box::new(right),
            },
            span,
        ))
    }

    fn parse_grouped(&mut self) -> ParseResult<Expr> {
        self.advance();
        let expr = self.parse_expression(Precedence::Lowest)?;
        self.expect_peek(&TokenKind::RightParen)?;
        Ok(expr)
    }

    fn parse_if(&mut self) -> ParseResult<Expr> {
        let start = self.cur().span;
        self.expect_peek(&TokenKind::LeftParen)?;
        self.advance();
        let condition = self.parse_expression(Precedence::Lowest)?;
        self.expect_peek(&TokenKind::RightParen)?;
        self.expect_peek(&TokenKind::LeftBrace)?;
        let consequence = self.parse_block()?;

        let alternative = if self.peek_is(&TokenKind::Else) {
            self.advance();
            self.expect_peek(&TokenKind::LeftBrace)?;
            Some(self.parse_block()?)
        } else {
            None
        };

        let end = alternative
            .as_ref()
            .map(|b| b.span)
            .unwrap_or(consequence.span);
        let span = start.merge(end);
        Ok(Expr::new(
            ExprKind::If {
                condition: Box::new(condition),
                consequence,
                alternative,
            },
            span,
        ))
    }

    fn parse_function_literal(&mut self) -> ParseResult<Expr> {
        let start = self.cur().span;
        self.expect_peek(&TokenKind::LeftParen)?;
        let parameters = self.parse_parameters()?;
        self.expect_peek(&TokenKind::LeftBrace)?;
        let body = self.parse_block()?;
        let span = start.merge(body.span);
        Ok(Expr::new(
            ExprKind::Function {
                name: None,
                parameters,
                body,
            },
            span,
        ))
    }

    fn parse_parameters(&mut self) -> ParseResult<Vec<String>> {
        let mut parameters = Vec::new();

        if self.peek_is(&TokenKind::RightParen) {
            self.advance();
            return Ok(parameters);
        }

        loop {
            self.advance();
            match &self.cur().kind {
                TokenKind::Identifier(name) => parameters.push(name.clone()),
                other => {
                    return Err(ParserError::unexpected_token(
                        "parameter name",
                        other.to_string(),
                        self.cur().span,
                    ))
                }
            }
            if !self.peek_is(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }

        self.expect_peek(&TokenKind::RightParen)?;
        Ok(parameters)
    }

    fn parse_call(&mut self, function: Expr) -> ParseResult<Expr> {
        let arguments = self.parse_expression_list(&TokenKind::RightParen)?;
        let span = function.span.merge(self.cur().span);
        Ok(Expr::new(
            ExprKind::Call {
                function: Box::new(function),
                arguments,
            },
            span,
        ))
    }

    fn parse_array_literal(&mut self) -> ParseResult<Expr> {
        let start = self.cur().span;
        let elements = self.parse_expression_list(&TokenKind::RightBracket)?;
        let span = start.merge(self.cur().span);
        Ok(Expr::new(ExprKind::Array(elements), span))
    }

    fn parse_hash_literal(&mut self) -> ParseResult<Expr> {
        let start = self.cur().span;
        let mut pairs = Vec::new();

        while !self.peek_is(&TokenKind::RightBrace) {
            self.advance();
            let key = self.parse_expression(Precedence::Lowest)?;
            self.expect_peek(&TokenKind::Colon)?;
            self.advance();
            let value = self.parse_expression(Precedence::Lowest)?;
            pairs.push((key, value));

            if !self.peek_is(&TokenKind::RightBrace) {
                self.expect_peek(&TokenKind::Comma)?;
            }
        }
        self.expect_peek(&TokenKind::RightBrace)?;

        let span = start.merge(self.cur().span);
        Ok(Expr::new(ExprKind::Hash(pairs), span))
    }

    fn parse_index(&mut self, left: Expr) -> ParseResult<Expr> {
        self.advance();
        let index = self.parse_expression(Precedence::Lowest)?;
        self.expect_peek(&TokenKind::RightBracket)?;
        let span = left.span.merge(self.cur().span);
        Ok(Expr::new(
            ExprKind::Index {
                left: Box::new(left),
                index: Box::new(index),
            },
            span,
        ))
    }

    /// Parse a comma-separated expression list up to `end`.
    fn parse_expression_list(&mut self, end: &TokenKind) -> ParseResult<Vec<Expr>> {
        let mut list = Vec::new();

        if self.peek_is(end) {
            self.advance();
            return Ok(list);
        }

        self.advance();
        list.push(self.parse_expression(Precedence::Lowest)?);

        while self.peek_is(&TokenKind::Comma) {
            self.advance();
            self.advance();
            list.push(self.parse_expression(Precedence::Lowest)?);
        }

        self.expect_peek(end)?;
        Ok(list)
    }

    // --- Token helpers ---

    fn cur(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Token {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)]
    }

    fn cur_is(&self, kind: &TokenKind) -> bool {
        &self.cur().kind == kind
    }

    fn peek_is(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn cur_precedence(&self) -> Precedence {
        token_precedence(&self.cur().kind)
    }

    fn peek_precedence(&self) -> Precedence {
        token_precedence(&self.peek().kind)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn expect_peek(&mut self, kind: &TokenKind) -> ParseResult<()> {
        if self.peek_is(kind) {
            self.advance();
            Ok(())
        } else {
            Err(ParserError::unexpected_token(
                format!("'{}'", kind),
                self.peek().kind.to_string(),
                self.peek().span,
            ))
        }
    }

    fn skip_optional_semicolon(&mut self) {
        if self.peek_is(&TokenKind::Semicolon) {
            self.advance();
        }
    }
}

/// Convenience: lex and parse a source string.
pub fn parse_source(source: &str) -> ParseResult<Program> {
    let tokens = crate::lexer::Scanner::new(source).scan_tokens()?;
    Parser::new(tokens).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Program {
        parse_source(source).expect("parser error")
    }

    #[test]
    fn test_let_statements() {
        let program = parse("let x = 5; let y = true; let foobar = y;");
        assert_eq!(program.statements.len(), 3);
        assert_eq!(program.to_string(), "let x = 5; let y = true; let foobar = y;");
    }

    #[test]
    fn test_return_statement() {
        let program = parse("return 5 + 10;");
        assert_eq!(program.to_string(), "return (5 + 10);");
    }

    #[test]
    fn test_operator_precedence() {
        let cases = [
            ("-a * b", "((-a) * b)"),
            ("!-a", "(!(-a))"),
            ("a + b + c", "((a + b) + c)"),
            ("a + b * c + d / e - f", "(((a + (b * c)) + (d / e)) - f)"),
            ("5 < 4 != 3 > 4", "((5 < 4) != (3 > 4))"),
            ("3 + 4 * 5 == 3 * 1 + 4 * 5", "((3 + (4 * 5)) == ((3 * 1) + (4 * 5)))"),
            ("(5 + 5) * 2", "((5 + 5) * 2)"),
            ("!(true == true)", "(!(true == true))"),
            ("a + add(b * c) + d", "((a + add((b * c))) + d)"),
            ("a * [1, 2, 3, 4][b * c] * d", "((a * ([1, 2, 3, 4][(b * c)])) * d)"),
            ("add(a * b[2], b[1], 2 * [1, 2][1])", "add((a * (b[2])), (b[1]), (2 * ([1, 2][1])))"),
        ];
        for (source, expected) in cases {
            assert_eq!(parse(source).to_string(), expected, "source: {}", source);
        }
    }

    #[test]
    fn test_if_else_expression() {
        let program = parse("if (x < y) { x } else { y }");
        assert_eq!(program.to_string(), "if (x < y) { x } else { y }");
    }

    #[test]
    fn test_function_literal() {
        let program = parse("fn(x, y) { x + y; }");
        assert_eq!(program.to_string(), "fn(x, y) { (x + y) }");
    }

    #[test]
    fn test_let_names_function_literal() {
        let program = parse("let myFunc = fn(x) { x };");
        let StmtKind::Let { value, .. } = &program.statements[0].kind else {
            panic!("expected let statement");
        };
        let ExprKind::Function { name, .. } = &value.kind else {
            panic!("expected function literal");
        };
        assert_eq!(name.as_deref(), Some("myFunc"));
    }

    #[test]
    fn test_call_expression() {
        let program = parse("add(1, 2 * 3, 4 + 5)");
        assert_eq!(program.to_string(), "add(1, (2 * 3), (4 + 5))");
    }

    #[test]
    fn test_array_and_index() {
        let program = parse("[1, 2 * 2][1]");
        assert_eq!(program.to_string(), "([1, (2 * 2)][1])");
    }

    #[test]
    fn test_hash_literal_keeps_source_order() {
        let program = parse("{\"one\": 1, \"two\": 2, \"three\": 3}");
        let StmtKind::Expression(expr) = &program.statements[0].kind else {
            panic!("expected expression statement");
        };
        let ExprKind::Hash(pairs) = &expr.kind else {
            panic!("expected hash literal");
        };
        let keys: Vec<String> = pairs.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_empty_hash_and_array() {
        assert_eq!(parse("{}").to_string(), "{}");
        assert_eq!(parse("[]").to_string(), "[]");
    }

    #[test]
    fn test_no_prefix_rule_error() {
        let err = parse_source("let x = ;").unwrap_err();
        assert!(matches!(err, ParserError::NoPrefixParse { .. }));
    }

    #[test]
    fn test_missing_assign_error() {
        let err = parse_source("let x 5;").unwrap_err();
        assert!(matches!(err, ParserError::UnexpectedToken { .. }));
    }
}
