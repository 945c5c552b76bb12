//! Recursive descent parser turning tokens into the AST.
//!
//! Errors are reported immediately with their source span; the parser
//! then goes into panic mode and synchronizes at the next statement
//! boundary so that one mistake does not drown the user in follow-ups.

use crate::ast::{BinaryOp, Expr, ExprKind, FunctionDecl, Stmt, UnaryOp};
use crate::scanner::{Scanner, Token, TokenKind as TK};
use crate::types::Span;

pub struct Parser<'a> {
    scanner: Scanner<'a>,
    previous: Option<Token<'a>>,
    current: Option<Token<'a>>,
    had_error: bool,
    panic_mode: bool,
}

impl<'a> Parser<'a> {
    #[must_use]
    pub fn new(scanner: Scanner<'a>) -> Self {
        Self {
            scanner,
            previous: None,
            current: None,
            had_error: false,
            panic_mode: false,
        }
    }

    /// Parse the whole input. Returns `None` if any error was reported.
    pub fn parse(mut self) -> Option<Vec<Stmt>> {
        self.advance();
        let mut statements = Vec::new();
        while !self.match_(TK::Eof) {
            if let Some(statement) = self.declaration() {
                statements.push(statement);
            }
            if self.panic_mode {
                self.synchronize();
            }
        }
        if self.had_error {
            None
        } else {
            Some(statements)
        }
    }

    fn declaration(&mut self) -> Option<Stmt> {
        let statement = if self.check(TK::At) || self.check(TK::Def) {
            let decorators = self.decorators()?;
            self.consume(TK::Def, "Expect 'def' after decorators.")?;
            Some(Stmt::Function(self.function_decl(decorators)?))
        } else if self.match_(TK::Class) {
            self.class_declaration()
        } else if self.match_(TK::Let) {
            let decl = self.var_declaration();
            self.match_(TK::Semicolon);
            decl
        } else {
            self.statement()
        };
        statement
    }

    /// Parse a possibly empty run of `@expr` decorators in source order.
    fn decorators(&mut self) -> Option<Vec<Expr>> {
        let mut decorators = Vec::new();
        while self.match_(TK::At) {
            decorators.push(self.call()?);
        }
        Some(decorators)
    }

    /// Parse a function declaration after the `def` keyword.
    ///
    /// The body is either a block or an `=>` expression, which desugars
    /// into a single return statement.
    fn function_decl(&mut self, decorators: Vec<Expr>) -> Option<FunctionDecl> {
        self.consume(TK::Identifier, "Expect function name.")?;
        let name = self.previous_str();
        let span = self.previous_span();

        self.consume(TK::LeftParen, "Expect '(' after function name.")?;
        let mut params = Vec::new();
        if !self.check(TK::RightParen) {
            loop {
                self.consume(TK::Identifier, "Expect parameter name.")?;
                if params.len() == 255 {
                    self.error("Can't have more than 255 parameters.");
                    return None;
                }
                params.push((self.previous_str(), self.previous_span()));
                if !self.match_(TK::Comma) {
                    break;
                }
            }
        }
        self.consume(TK::RightParen, "Expect ')' after parameters.")?;

        let body = if self.match_(TK::RightArrow) {
            let value_span = self.current_span();
            let value = self.expression()?;
            vec![Stmt::Return {
                value: Some(value),
                span: value_span,
            }]
        } else {
            self.consume(TK::LeftBrace, "Expect '{' before function body.")?;
            self.block_statements()?
        };

        Some(FunctionDecl {
            name,
            params,
            body,
            decorators,
            span,
        })
    }

    fn class_declaration(&mut self) -> Option<Stmt> {
        self.consume(TK::Identifier, "Expect class name.")?;
        let name = self.previous_str();
        let span = self.previous_span();

        let superclass = if self.match_(TK::Colon) {
            self.consume(TK::Identifier, "Expect superclass name.")?;
            Some((self.previous_str(), self.previous_span()))
        } else {
            None
        };

        self.consume(TK::LeftBrace, "Expect '{' before class body.")?;
        let mut methods = Vec::new();
        while !self.check(TK::RightBrace) && !self.check(TK::Eof) {
            let decorators = self.decorators()?;
            self.consume(TK::Def, "Expect method declaration.")?;
            methods.push(self.function_decl(decorators)?);
        }
        self.consume(TK::RightBrace, "Expect '}' after class body.")?;

        Some(Stmt::Class {
            name,
            superclass,
            methods,
            span,
        })
    }

    fn var_declaration(&mut self) -> Option<Stmt> {
        self.consume(TK::Identifier, "Expect variable name.")?;
        let name = self.previous_str();
        let span = self.previous_span();
        let initializer = if self.match_(TK::Equal) {
            Some(self.expression()?)
        } else {
            None
        };
        Some(Stmt::VarDecl {
            name,
            initializer,
            span,
        })
    }

    fn statement(&mut self) -> Option<Stmt> {
        if self.match_(TK::If) {
            self.if_statement()
        } else if self.match_(TK::While) {
            self.while_statement()
        } else if self.match_(TK::For) {
            self.for_statement()
        } else if self.match_(TK::Return) {
            self.return_statement()
        } else if self.match_(TK::LeftBrace) {
            let span = self.previous_span();
            let statements = self.block_statements()?;
            Some(Stmt::Block { statements, span })
        } else {
            let expr = self.expression()?;
            self.match_(TK::Semicolon);
            Some(Stmt::Expression { expr })
        }
    }

    fn if_statement(&mut self) -> Option<Stmt> {
        let span = self.previous_span();
        self.consume(TK::LeftParen, "Expect '(' after 'if'.")?;
        let condition = self.expression()?;
        self.consume(TK::RightParen, "Expect ')' after condition.")?;
        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.match_(TK::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Some(Stmt::If {
            condition,
            then_branch,
            else_branch,
            span,
        })
    }

    fn while_statement(&mut self) -> Option<Stmt> {
        let span = self.previous_span();
        self.consume(TK::LeftParen, "Expect '(' after 'while'.")?;
        let condition = self.expression()?;
        self.consume(TK::RightParen, "Expect ')' after condition.")?;
        let body = Box::new(self.statement()?);
        Some(Stmt::While {
            condition,
            body,
            span,
        })
    }

    fn for_statement(&mut self) -> Option<Stmt> {
        let span = self.previous_span();
        self.consume(TK::LeftParen, "Expect '(' after 'for'.")?;

        let initializer = if self.match_(TK::Semicolon) {
            None
        } else if self.match_(TK::Let) {
            let decl = self.var_declaration()?;
            self.consume(TK::Semicolon, "Expect ';' after loop initializer.")?;
            Some(Box::new(decl))
        } else {
            let expr = self.expression()?;
            self.consume(TK::Semicolon, "Expect ';' after loop initializer.")?;
            Some(Box::new(Stmt::Expression { expr }))
        };

        let condition = if self.check(TK::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(TK::Semicolon, "Expect ';' after loop condition.")?;

        let step = if self.check(TK::RightParen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(TK::RightParen, "Expect ')' after for clauses.")?;

        let body = Box::new(self.statement()?);
        Some(Stmt::For {
            initializer,
            condition,
            step,
            body,
            span,
        })
    }

    fn return_statement(&mut self) -> Option<Stmt> {
        let span = self.previous_span();
        let value = if self.check(TK::Semicolon) || self.check(TK::RightBrace) || self.check(TK::Eof)
        {
            None
        } else {
            Some(self.expression()?)
        };
        self.match_(TK::Semicolon);
        Some(Stmt::Return { value, span })
    }

    /// Statements of a block whose opening brace is already consumed.
    fn block_statements(&mut self) -> Option<Vec<Stmt>> {
        let mut statements = Vec::new();
        while !self.check(TK::RightBrace) && !self.check(TK::Eof) {
            if let Some(statement) = self.declaration() {
                statements.push(statement);
            }
            if self.panic_mode {
                return None;
            }
        }
        self.consume(TK::RightBrace, "Expect '}' after block.")?;
        Some(statements)
    }
}

// Expressions, by descending precedence.
impl Parser<'_> {
    fn expression(&mut self) -> Option<Expr> {
        self.assignment()
    }

    /// Assignment is right associative; target validation is left to the
    /// compiler, which knows the full set of assignable forms.
    fn assignment(&mut self) -> Option<Expr> {
        let expr = self.or()?;
        if self.match_(TK::Equal) {
            let span = self.previous_span();
            let value = self.assignment()?;
            return Some(Expr {
                kind: ExprKind::Binary {
                    op: BinaryOp::Assign,
                    lhs: Box::new(expr),
                    rhs: Box::new(value),
                },
                span,
            });
        }
        Some(expr)
    }

    fn or(&mut self) -> Option<Expr> {
        let mut expr = self.and()?;
        while self.match_(TK::Or) {
            expr = self.binary(expr, BinaryOp::Or, Self::and)?;
        }
        Some(expr)
    }

    fn and(&mut self) -> Option<Expr> {
        let mut expr = self.equality()?;
        while self.match_(TK::And) {
            expr = self.binary(expr, BinaryOp::And, Self::equality)?;
        }
        Some(expr)
    }

    fn equality(&mut self) -> Option<Expr> {
        let mut expr = self.comparison()?;
        loop {
            let op = if self.match_(TK::EqualEqual) {
                BinaryOp::Equal
            } else if self.match_(TK::BangEqual) {
                BinaryOp::NotEqual
            } else {
                return Some(expr);
            };
            expr = self.binary(expr, op, Self::comparison)?;
        }
    }

    fn comparison(&mut self) -> Option<Expr> {
        let mut expr = self.term()?;
        loop {
            let op = if self.match_(TK::Less) {
                BinaryOp::LessThan
            } else if self.match_(TK::Greater) {
                BinaryOp::GreaterThan
            } else if self.match_(TK::LessEqual) {
                BinaryOp::LessEqual
            } else if self.match_(TK::GreaterEqual) {
                BinaryOp::GreaterEqual
            } else {
                return Some(expr);
            };
            expr = self.binary(expr, op, Self::term)?;
        }
    }

    fn term(&mut self) -> Option<Expr> {
        let mut expr = self.factor()?;
        loop {
            let op = if self.match_(TK::Plus) {
                BinaryOp::Add
            } else if self.match_(TK::Minus) {
                BinaryOp::Sub
            } else {
                return Some(expr);
            };
            expr = self.binary(expr, op, Self::factor)?;
        }
    }

    fn factor(&mut self) -> Option<Expr> {
        let mut expr = self.unary()?;
        loop {
            let op = if self.match_(TK::Star) {
                BinaryOp::Mul
            } else if self.match_(TK::Slash) {
                BinaryOp::Div
            } else {
                return Some(expr);
            };
            expr = self.binary(expr, op, Self::unary)?;
        }
    }

    fn binary(
        &mut self,
        lhs: Expr,
        op: BinaryOp,
        next: fn(&mut Self) -> Option<Expr>,
    ) -> Option<Expr> {
        let span = self.previous_span();
        let rhs = next(self)?;
        Some(Expr {
            kind: ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
        })
    }

    fn unary(&mut self) -> Option<Expr> {
        let op = if self.match_(TK::Minus) {
            UnaryOp::Neg
        } else if self.match_(TK::Bang) {
            UnaryOp::Not
        } else {
            return self.call();
        };
        let span = self.previous_span();
        let operand = self.unary()?;

        // Fold negation of numeric literals right here.
        if op == UnaryOp::Neg {
            match operand.kind {
                ExprKind::Int(value) => {
                    if let Some(negated) = value.checked_neg() {
                        return Some(Expr {
                            kind: ExprKind::Int(negated),
                            span,
                        });
                    }
                }
                ExprKind::Float(value) => {
                    return Some(Expr {
                        kind: ExprKind::Float(-value),
                        span,
                    });
                }
                _ => {}
            }
        }

        Some(Expr {
            kind: ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        })
    }

    fn call(&mut self) -> Option<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.match_(TK::LeftParen) {
                let span = self.previous_span();
                let args = self.argument_list()?;
                expr = Expr {
                    kind: ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                    span,
                };
            } else if self.match_(TK::Dot) {
                self.consume(TK::Identifier, "Expect member name after '.'.")?;
                let span = self.previous_span();
                expr = Expr {
                    kind: ExprKind::Member {
                        receiver: Box::new(expr),
                        name: self.previous_str(),
                    },
                    span,
                };
            } else {
                return Some(expr);
            }
        }
    }

    /// All comma separated expressions until a closing `)`.
    /// Does NOT permit trailing commas.
    fn argument_list(&mut self) -> Option<Vec<Expr>> {
        let mut args = Vec::new();
        if !self.check(TK::RightParen) {
            loop {
                if args.len() == 255 {
                    self.error("Can't have more than 255 arguments.");
                    return None;
                }
                args.push(self.expression()?);
                if !self.match_(TK::Comma) {
                    break;
                }
            }
        }
        self.consume(TK::RightParen, "Expect ')' after arguments.")?;
        Some(args)
    }

    fn primary(&mut self) -> Option<Expr> {
        self.advance();
        let span = self.previous_span();
        let kind = match self.previous.as_ref().unwrap().kind {
            TK::Integer => ExprKind::Int(self.integer_literal()?),
            TK::Float => {
                let text = self.previous_str();
                match text.parse::<f64>() {
                    Ok(value) => ExprKind::Float(value),
                    Err(_) => {
                        self.error("Invalid float literal.");
                        return None;
                    }
                }
            }
            TK::String => ExprKind::Str(self.string_literal()?),
            TK::True => ExprKind::Bool(true),
            TK::False => ExprKind::Bool(false),
            TK::Null => ExprKind::Null,
            TK::Identifier => ExprKind::Identifier(self.previous_str()),
            TK::Super => {
                self.consume(TK::Dot, "Expect '.' after 'super'.")?;
                self.consume(TK::Identifier, "Expect superclass method name.")?;
                ExprKind::Super {
                    name: self.previous_str(),
                }
            }
            TK::LeftParen => {
                let expr = self.expression()?;
                self.consume(TK::RightParen, "Expect ')' after expression.")?;
                return Some(expr);
            }
            _ => {
                self.error("Expect expression.");
                return None;
            }
        };
        Some(Expr { kind, span })
    }

    fn integer_literal(&mut self) -> Option<i32> {
        let text = self.previous_str();
        let parsed = if let Some(digits) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))
        {
            i64::from_str_radix(digits, 16)
        } else if let Some(digits) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
            i64::from_str_radix(digits, 2)
        } else {
            text.parse::<i64>()
        };
        let value = match parsed {
            Ok(value) => value,
            Err(_) => {
                self.error("Invalid integer literal.");
                return None;
            }
        };
        // Decimal literals must fit i32; hex and binary may use the full
        // 32-bit pattern.
        if text.starts_with("0x") || text.starts_with("0X") || text.starts_with("0b")
            || text.starts_with("0B")
        {
            if value > i64::from(u32::MAX) {
                self.error("Integer literal out of range.");
                return None;
            }
            Some(value as u32 as i32)
        } else {
            match i32::try_from(value) {
                Ok(value) => Some(value),
                Err(_) => {
                    self.error("Integer literal out of range.");
                    None
                }
            }
        }
    }

    /// Strip the quotes and resolve escapes.
    fn string_literal(&mut self) -> Option<String> {
        let lexeme = self.previous_str();
        let inner = &lexeme[1..lexeme.len() - 1];
        let mut result = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                result.push(c);
                continue;
            }
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some('r') => result.push('\r'),
                Some('0') => result.push('\0'),
                Some('\\') => result.push('\\'),
                Some('"') => result.push('"'),
                _ => {
                    self.error("Invalid escape sequence in string.");
                    return None;
                }
            }
        }
        Some(result)
    }
}

// Token plumbing and error reporting.
impl<'a> Parser<'a> {
    fn advance(&mut self) {
        self.previous = self.current.take();
        loop {
            let token = self.scanner.scan();
            if token.kind == TK::Error {
                let message = token.as_str().to_string();
                self.current = Some(token);
                self.error_at_current(&message);
            } else {
                self.current = Some(token);
                break;
            }
        }
    }

    fn consume(&mut self, kind: TK, message: &str) -> Option<()> {
        if self.check(kind) {
            self.advance();
            Some(())
        } else {
            self.error_at_current(message);
            None
        }
    }

    fn match_(&mut self, kind: TK) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, kind: TK) -> bool {
        self.current.as_ref().is_some_and(|token| token.kind == kind)
    }

    fn previous_str(&self) -> String {
        self.previous.as_ref().unwrap().as_str().to_string()
    }

    fn previous_span(&self) -> Span {
        self.previous.as_ref().unwrap().span
    }

    fn current_span(&self) -> Span {
        self.current.as_ref().map_or_else(Span::default, |t| t.span)
    }

    fn error(&mut self, message: &str) {
        let token = self.previous.clone();
        self.error_at(token.as_ref(), message);
    }

    fn error_at_current(&mut self, message: &str) {
        let token = self.current.clone();
        self.error_at(token.as_ref(), message);
    }

    fn error_at(&mut self, token: Option<&Token>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        match token {
            Some(token) if token.kind == TK::Eof => {
                eprintln!("[line {}] Error at end: {message}", *token.span.line);
            }
            Some(token) if token.kind == TK::Error => {
                eprintln!("[line {}] Error: {message}", *token.span.line);
            }
            Some(token) => {
                eprintln!(
                    "[line {}] Error at '{}': {message}",
                    *token.span.line,
                    token.as_str()
                );
            }
            None => eprintln!("Error: {message}"),
        }
    }

    /// Skip tokens until a statement boundary to resume parsing after an
    /// error without cascading reports.
    fn synchronize(&mut self) {
        self.panic_mode = false;
        while !self.check(TK::Eof) {
            if self.previous.as_ref().is_some_and(|t| t.kind == TK::Semicolon) {
                return;
            }
            if self.current.as_ref().is_some_and(|t| {
                matches!(
                    t.kind,
                    TK::Class | TK::Def | TK::Let | TK::For | TK::If | TK::While | TK::Return
                )
            }) {
                return;
            }
            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::Scanner;

    fn parse(source: &str) -> Option<Vec<Stmt>> {
        Parser::new(Scanner::new(source.as_bytes())).parse()
    }

    #[test]
    fn test_parse_decorated_function() {
        let program = parse("@deco(\"x\") @other def f(a, b) { return a }").unwrap();
        assert_eq!(program.len(), 1);
        match &program[0] {
            Stmt::Function(decl) => {
                assert_eq!(decl.name, "f");
                assert_eq!(decl.params.len(), 2);
                assert_eq!(decl.decorators.len(), 2);
                assert!(matches!(decl.decorators[0].kind, ExprKind::Call { .. }));
                assert!(matches!(
                    decl.decorators[1].kind,
                    ExprKind::Identifier(_)
                ));
            }
            x => panic!("Expected function declaration, got {x:?}"),
        }
    }

    #[test]
    fn test_parse_arrow_body() {
        let program = parse("def inc(x) => x + 1").unwrap();
        match &program[0] {
            Stmt::Function(decl) => {
                assert_eq!(decl.body.len(), 1);
                assert!(matches!(decl.body[0], Stmt::Return { value: Some(_), .. }));
            }
            x => panic!("Expected function declaration, got {x:?}"),
        }
    }

    #[test]
    fn test_parse_class_with_superclass() {
        let program = parse("class B : A { def m(this) { return 1 } }").unwrap();
        match &program[0] {
            Stmt::Class {
                name,
                superclass,
                methods,
                ..
            } => {
                assert_eq!(name, "B");
                assert_eq!(superclass.as_ref().unwrap().0, "A");
                assert_eq!(methods.len(), 1);
                assert_eq!(methods[0].params[0].0, "this");
            }
            x => panic!("Expected class declaration, got {x:?}"),
        }
    }

    #[test]
    fn test_negative_literal_folding() {
        let program = parse("-3").unwrap();
        match &program[0] {
            Stmt::Expression { expr } => assert!(matches!(expr.kind, ExprKind::Int(-3))),
            x => panic!("Expected expression statement, got {x:?}"),
        }
    }

    #[test]
    fn test_parse_error_reports_none() {
        assert!(parse("def ( {").is_none());
        assert!(parse("let 3 = 4").is_none());
    }

    #[test]
    fn test_string_escapes() {
        let program = parse("\"a\\n\\\"b\\\"\"").unwrap();
        match &program[0] {
            Stmt::Expression { expr } => match &expr.kind {
                ExprKind::Str(s) => assert_eq!(s, "a\n\"b\""),
                x => panic!("Expected string literal, got {x:?}"),
            },
            x => panic!("Expected expression statement, got {x:?}"),
        }
    }
}
